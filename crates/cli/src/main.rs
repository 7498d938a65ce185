#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use ts_core::ids::{AttendeeCode, EventId};
use ts_core::model::is_checked_in;
use ts_storage::schema::{Table, attendee};
use ts_storage::{
    Address, Predicate, Provider, Record, Value, attendee_from_record, event_from_record,
};
use ts_sync::{
    Credential, HttpEventService, SyncEngine, SyncScope, exchange_token, request_check_in,
    set_note,
};

fn usage() -> &'static str {
    "turnstile — local-first event check-in store and sync\n\n\
USAGE:\n\
  turnstile [--data-dir DIR] [--host URL] [--session COOKIE] COMMAND [ARGS]\n\n\
COMMANDS:\n\
  events                                   list stored events\n\
  roster --event ID [--pending]            attendee roster, by name\n\
  timeline --event ID                      check-ins, latest first\n\
  checkin --event ID --code CODE [--revert]\n\
                                           check an attendee in (or revert)\n\
  note --event ID --code CODE [TEXT...]    set or clear an attendee note\n\
  sync [--checkins-only]                   run one sync against the remote\n\
  login                                    exchange an auth token for a session cookie\n\
  show ADDRESS                             query a collection or item address\n\n\
ENV:\n\
  TURNSTILE_DATA_DIR    storage directory (default: .turnstile)\n\
  TURNSTILE_HOST        remote service base URL\n\
  TURNSTILE_SESSION     session cookie used by sync and checkin\n\
  TURNSTILE_AUTH_TOKEN  auth token consumed by login\n\
  TURNSTILE_EVENT       default for --event\n\
  RUST_LOG              log filter; logs go to stderr\n"
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug)]
struct CliConfig {
    data_dir: PathBuf,
    host: Option<String>,
    session: Option<String>,
    auth_token: Option<String>,
}

#[derive(Debug)]
enum Command {
    Events,
    Roster {
        event_id: EventId,
        pending: bool,
    },
    Timeline {
        event_id: EventId,
    },
    Checkin {
        event_id: EventId,
        code: AttendeeCode,
        revert: bool,
    },
    Note {
        event_id: EventId,
        code: AttendeeCode,
        text: String,
    },
    Sync {
        checkins_only: bool,
    },
    Login,
    Show {
        address: String,
    },
}

fn parse_args() -> Result<(CliConfig, Command), String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print!("{}", usage());
        std::process::exit(0);
    }
    if args.is_empty() {
        print!("{}", usage());
        std::process::exit(2);
    }

    let mut data_dir = env_var("TURNSTILE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".turnstile"));
    let mut host = env_var("TURNSTILE_HOST");
    let mut session = env_var("TURNSTILE_SESSION");
    let auth_token = env_var("TURNSTILE_AUTH_TOKEN");
    let mut event = env_var("TURNSTILE_EVENT");
    let mut code: Option<String> = None;
    let mut revert = false;
    let mut pending = false;
    let mut checkins_only = false;
    let mut command: Option<String> = None;
    let mut positionals: Vec<String> = Vec::new();

    let mut i = 0usize;
    while i < args.len() {
        let a = args[i].as_str();
        match a {
            "--data-dir" => {
                i += 1;
                let v = args.get(i).ok_or("--data-dir requires DIR")?;
                data_dir = PathBuf::from(v);
            }
            "--host" => {
                i += 1;
                let v = args.get(i).ok_or("--host requires URL")?;
                host = Some(v.to_string());
            }
            "--session" => {
                i += 1;
                let v = args.get(i).ok_or("--session requires COOKIE")?;
                session = Some(v.to_string());
            }
            "--event" => {
                i += 1;
                let v = args.get(i).ok_or("--event requires ID")?;
                event = Some(v.to_string());
            }
            "--code" => {
                i += 1;
                let v = args.get(i).ok_or("--code requires CODE")?;
                code = Some(v.to_string());
            }
            "--revert" => revert = true,
            "--pending" => pending = true,
            "--checkins-only" => checkins_only = true,
            _ if a.starts_with("--") => return Err(format!("unknown flag: {a}")),
            _ if command.is_none() => command = Some(a.to_string()),
            _ => positionals.push(a.to_string()),
        }
        i += 1;
    }

    let parse_event = |event: Option<String>| -> Result<EventId, String> {
        let value = event.ok_or("missing --event ID (or TURNSTILE_EVENT)")?;
        EventId::try_new(value).map_err(|e| format!("invalid event id: {}", e.message()))
    };
    let parse_code = |code: Option<String>| -> Result<AttendeeCode, String> {
        let value = code.ok_or("missing --code CODE")?;
        AttendeeCode::try_new(value).map_err(|e| format!("invalid attendee code: {}", e.message()))
    };

    let command = match command.as_deref() {
        Some("events") => Command::Events,
        Some("roster") => Command::Roster {
            event_id: parse_event(event)?,
            pending,
        },
        Some("timeline") => Command::Timeline {
            event_id: parse_event(event)?,
        },
        Some("checkin") => Command::Checkin {
            event_id: parse_event(event)?,
            code: parse_code(code)?,
            revert,
        },
        Some("note") => Command::Note {
            event_id: parse_event(event)?,
            code: parse_code(code)?,
            text: positionals.join(" "),
        },
        Some("sync") => Command::Sync { checkins_only },
        Some("login") => Command::Login,
        Some("show") => Command::Show {
            address: positionals
                .first()
                .cloned()
                .ok_or("show requires ADDRESS")?,
        },
        Some(other) => return Err(format!("unknown command: {other}\n\n{}", usage())),
        None => return Err(usage().to_string()),
    };

    Ok((
        CliConfig {
            data_dir,
            host,
            session,
            auth_token,
        },
        command,
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (config, command) = parse_args().unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(2);
    });
    if let Err(err) = run(&config, command) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(config: &CliConfig, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    // Login needs no local store.
    if let Command::Login = command {
        let host = require(&config.host, "set TURNSTILE_HOST or pass --host")?;
        let token = require(&config.auth_token, "set TURNSTILE_AUTH_TOKEN")?;
        let credential = exchange_token(&host, &token)?;
        println!("{}", credential.as_str());
        eprintln!("export TURNSTILE_SESSION to use this cookie for sync");
        return Ok(());
    }

    let provider = Arc::new(Provider::open(&config.data_dir)?);
    match command {
        Command::Events => {
            let records = provider.query(
                &Address::parse("events")?,
                None,
                None,
                Some("start_time ASC"),
            )?;
            for record in &records {
                let event = event_from_record(record)?;
                println!(
                    "{}  {}  {} — {}  @ {} ({})",
                    event.id,
                    event.name,
                    fmt_time(Some(event.start_time)),
                    fmt_time(Some(event.end_time)),
                    event.place,
                    event.organizer_name,
                );
            }
        }
        Command::Roster { event_id, pending } => {
            let clause = if pending {
                format!("{} = ? AND {} IS NULL", attendee::EVENT_ID, attendee::CHECKIN)
            } else {
                format!("{} = ?", attendee::EVENT_ID)
            };
            let order = format!("{} ASC", attendee::NAME);
            let records = provider.query(
                &Address::collection(Table::Attendee),
                None,
                Some(&Predicate::new(
                    clause,
                    vec![Value::Text(event_id.as_str().to_string())],
                )),
                Some(order.as_str()),
            )?;
            for record in &records {
                let row = attendee_from_record(record)?;
                let mark = if is_checked_in(row.checkin) { "x" } else { " " };
                let note = row.note.as_deref().unwrap_or("");
                println!("[{mark}] {}  {}  {}  {note}", row.code, row.name, row.email);
            }
        }
        Command::Timeline { event_id } => {
            let clause = format!(
                "{} = ? AND {} IS NOT NULL",
                attendee::EVENT_ID,
                attendee::CHECKIN
            );
            let order = format!("{} DESC", attendee::CHECKIN);
            let records = provider.query(
                &Address::collection(Table::Attendee),
                None,
                Some(&Predicate::new(
                    clause,
                    vec![Value::Text(event_id.as_str().to_string())],
                )),
                Some(order.as_str()),
            )?;
            for record in &records {
                let row = attendee_from_record(record)?;
                let pending = if row.dirty { "  (pending sync)" } else { "" };
                println!("{}  {}  {}{pending}", fmt_time(row.checkin), row.code, row.name);
            }
        }
        Command::Checkin {
            event_id,
            code,
            revert,
        } => {
            match request_check_in(&provider, &code, &event_id, revert)? {
                None => println!("no row updated"),
                Some(row) => {
                    match row.checkin {
                        Some(time) => println!("{} checked in at {}", row.name, fmt_time(Some(time))),
                        None => println!("{} check-in reverted", row.name),
                    }
                    // The fire-and-forget trigger of the mutation path: push
                    // the dirty row right away when a session is configured.
                    match engine(config, &provider) {
                        Ok(Some(engine)) => match engine.sync(SyncScope::CheckinsOnly) {
                            Ok(report) => eprintln!("synced ({} pushed)", report.pushed),
                            Err(err) => eprintln!("sync deferred: {err}"),
                        },
                        Ok(None) => eprintln!("no session; run `turnstile sync` once online"),
                        Err(err) => eprintln!("sync deferred: {err}"),
                    }
                }
            }
        }
        Command::Note {
            event_id,
            code,
            text,
        } => {
            let affected = set_note(&provider, &event_id, &code, &text)?;
            if affected == 0 {
                println!("no such attendee");
            } else if text.trim().is_empty() {
                println!("note cleared");
            } else {
                println!("note saved");
            }
        }
        Command::Sync { checkins_only } => {
            let engine = engine(config, &provider)?
                .ok_or("sync needs TURNSTILE_HOST and TURNSTILE_SESSION")?;
            let scope = if checkins_only {
                SyncScope::CheckinsOnly
            } else {
                SyncScope::Full
            };
            let report = engine.sync(scope)?;
            println!(
                "pushed {} (failed {}), events {} (+{} removed), attendees {}",
                report.pushed,
                report.push_failures,
                report.events_upserted,
                report.events_deleted,
                report.attendees_upserted,
            );
        }
        Command::Login => unreachable!("handled above"),
        Command::Show { address } => {
            let address = Address::parse(&address)?;
            let records = provider.query(&address, None, None, None)?;
            for record in &records {
                println!("{}", fmt_record(record));
            }
            eprintln!("{} row(s)", records.len());
        }
    }
    Ok(())
}

fn engine(
    config: &CliConfig,
    provider: &Arc<Provider>,
) -> Result<Option<SyncEngine<HttpEventService>>, Box<dyn std::error::Error>> {
    let (Some(host), Some(session)) = (&config.host, &config.session) else {
        return Ok(None);
    };
    let service = HttpEventService::new(host.clone(), Credential::new(session.clone()))?;
    Ok(Some(SyncEngine::new(provider.clone(), service)))
}

fn require(value: &Option<String>, message: &'static str) -> Result<String, String> {
    value.clone().ok_or_else(|| message.to_string())
}

fn fmt_time(unix_seconds: Option<i64>) -> String {
    let Some(seconds) = unix_seconds else {
        return "-".to_string();
    };
    match OffsetDateTime::from_unix_timestamp(seconds) {
        Ok(dt) => dt.format(&Rfc3339).unwrap_or_else(|_| seconds.to_string()),
        Err(_) => seconds.to_string(),
    }
}

fn fmt_record(record: &Record) -> String {
    record
        .iter()
        .map(|(name, value)| format!("{name}={}", fmt_value(value)))
        .collect::<Vec<_>>()
        .join("  ")
}

fn fmt_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Blob(v) => format!("<{} bytes>", v.len()),
    }
}
