#![forbid(unsafe_code)]

use crate::error::SyncError;
use crate::remote::{EventService, NoopProfileResolver, ProfileResolver, RemoteAttendee, RemoteEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info_span, warn};
use ts_core::model::normalize_plusid;
use ts_storage::schema::{Table, attendee, event};
use ts_storage::{Address, ContentValues, OpResult, Operation, Predicate, Provider, Value};

/// What one run covers. `CheckinsOnly` is the scope a local mutation
/// requests: push the dirty rows, skip the snapshot pull.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncScope {
    Full,
    CheckinsOnly,
}

/// Counters for one run, for logs and the operator CLI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub push_failures: usize,
    pub events_upserted: usize,
    pub events_deleted: usize,
    pub attendees_upserted: usize,
}

/// Reconciles local and remote state: push dirty check-ins, then (in full
/// scope) pull and merge the event/roster snapshot. A run is safely
/// re-invocable; retry and scheduling belong to the caller.
pub struct SyncEngine<S, P = NoopProfileResolver> {
    provider: Arc<Provider>,
    service: S,
    resolver: P,
}

impl<S: EventService> SyncEngine<S> {
    pub fn new(provider: Arc<Provider>, service: S) -> Self {
        Self {
            provider,
            service,
            resolver: NoopProfileResolver,
        }
    }
}

impl<S: EventService, P: ProfileResolver> SyncEngine<S, P> {
    pub fn with_resolver(provider: Arc<Provider>, service: S, resolver: P) -> Self {
        Self {
            provider,
            service,
            resolver,
        }
    }

    /// Runs the protocol once. An error aborts the remainder of the run;
    /// batches already committed stay committed.
    pub fn sync(&self, scope: SyncScope) -> Result<SyncReport, SyncError> {
        let span = info_span!("sync", ?scope);
        let _guard = span.enter();
        let mut report = SyncReport::default();
        self.push_checkins(&mut report)?;
        if scope == SyncScope::Full {
            self.pull_snapshot(&mut report)?;
        }
        debug!(?report, "sync run finished");
        Ok(report)
    }

    /// Push phase: one round trip per dirty attendee, sequentially. A
    /// service failure for one attendee leaves its dirty flag set and moves
    /// on; only store failures abort.
    fn push_checkins(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        let rows = self.provider.query(
            &Address::collection(Table::Attendee),
            Some(&[attendee::EVENT_ID, attendee::CODE, attendee::CHECKIN]),
            Some(&Predicate::new(format!("{} = 1", attendee::DIRTY), vec![])),
            None,
        )?;
        if rows.is_empty() {
            debug!("no dirty check-ins to push");
            return Ok(());
        }
        for row in &rows {
            let event_id = row.text(attendee::EVENT_ID)?;
            let code = row.text(attendee::CODE)?;
            let checked_in = ts_core::model::is_checked_in(row.opt_integer(attendee::CHECKIN)?);
            match self.service.post_checkin(event_id, code, !checked_in) {
                Ok(server_time) => {
                    let mut values = ContentValues::new();
                    values.put_flag(attendee::DIRTY, false);
                    if server_time == 0 {
                        values.put_null(attendee::CHECKIN);
                    } else {
                        values.put_integer(attendee::CHECKIN, server_time);
                    }
                    self.provider
                        .update(&Address::attendee(event_id, code), &values, None)?;
                    report.pushed += 1;
                }
                Err(err) => {
                    warn!(event_id, code, error = %err, "check-in push failed; kept dirty for the next run");
                    report.push_failures += 1;
                }
            }
        }
        debug!(pushed = report.pushed, failed = report.push_failures, "push phase done");
        Ok(())
    }

    /// Pull phase: upsert the fetched events, drop local events (and their
    /// attendees) missing from the fetched set in one atomic batch, then
    /// upsert each roster, one event at a time.
    fn pull_snapshot(&self, report: &mut SyncReport) -> Result<(), SyncError> {
        let events = self.service.list_events()?;
        let rows: Vec<ContentValues> = events.iter().map(event_row).collect();
        self.provider
            .bulk_insert(&Address::collection(Table::Event), &rows)?;
        report.events_upserted = rows.len();

        let results = self.provider.apply_batch(&absent_event_deletions(&events))?;
        if let Some(OpResult::Affected(deleted)) = results.first() {
            report.events_deleted = *deleted;
        }

        for remote_event in &events {
            let fetched = self.service.list_attendees(&remote_event.id)?;
            let rows = self.roster_rows(&remote_event.id, fetched)?;
            self.provider
                .bulk_insert(&Address::collection(Table::Attendee), &rows)?;
            report.attendees_upserted += rows.len();
        }
        debug!(events = report.events_upserted, "pull phase done");
        Ok(())
    }

    /// Builds the upsert payload for one roster: normalizes profile ids,
    /// patches batch-resolved image URLs in before the write, and carries
    /// over locally-owned columns the remote projection lacks (the note
    /// always; checkin and the flag itself while a row is dirty, so an
    /// un-pushed local edit survives the refresh).
    fn roster_rows(
        &self,
        event_id: &str,
        fetched: Vec<RemoteAttendee>,
    ) -> Result<Vec<ContentValues>, SyncError> {
        let local = self.provider.query(
            &Address::collection(Table::Attendee),
            Some(&[attendee::CODE, attendee::CHECKIN, attendee::DIRTY, attendee::NOTE]),
            Some(&Predicate::new(
                format!("{} = ?", attendee::EVENT_ID),
                vec![Value::Text(event_id.to_string())],
            )),
            None,
        )?;
        let mut preserved: HashMap<String, LocalColumns> = HashMap::new();
        for row in &local {
            preserved.insert(
                row.text(attendee::CODE)?.to_string(),
                LocalColumns {
                    checkin: row.opt_integer(attendee::CHECKIN)?,
                    dirty: row.flag(attendee::DIRTY)?,
                    note: row.opt_text(attendee::NOTE)?.map(str::to_string),
                },
            );
        }

        let profile_ids: Vec<String> = fetched
            .iter()
            .filter_map(|entry| normalize_plusid(entry.plusid.clone()))
            .collect();
        let images = if profile_ids.is_empty() {
            HashMap::new()
        } else {
            match self.resolver.resolve(&profile_ids) {
                Ok(images) => images,
                Err(err) => {
                    warn!(error = %err, "image enrichment failed; rosters sync without images");
                    HashMap::new()
                }
            }
        };

        let mut rows = Vec::with_capacity(fetched.len());
        for entry in fetched {
            let plusid = normalize_plusid(entry.plusid);
            let mut values = ContentValues::new();
            values.put_text(attendee::EVENT_ID, event_id);
            values.put_text(attendee::CODE, entry.id.clone());
            values.put_text(attendee::EMAIL, entry.email);
            values.put_text(attendee::NAME, entry.name);
            let image_url = plusid.as_ref().and_then(|id| images.get(id)).cloned();
            values.put_opt_text(attendee::PLUSID, plusid);
            values.put_opt_text(attendee::IMAGE_URL, image_url);
            if entry.checkin_time == 0 {
                values.put_null(attendee::CHECKIN);
            } else {
                values.put_integer(attendee::CHECKIN, entry.checkin_time);
            }
            if let Some(columns) = preserved.get(&entry.id) {
                values.put_opt_text(attendee::NOTE, columns.note.clone());
                if columns.dirty {
                    match columns.checkin {
                        Some(time) => values.put_integer(attendee::CHECKIN, time),
                        None => values.put_null(attendee::CHECKIN),
                    }
                    values.put_flag(attendee::DIRTY, true);
                }
            }
            rows.push(values);
        }
        Ok(rows)
    }
}

struct LocalColumns {
    checkin: Option<i64>,
    dirty: bool,
    note: Option<String>,
}

fn event_row(remote: &RemoteEvent) -> ContentValues {
    let mut values = ContentValues::new();
    values.put_text(event::ID, remote.id.clone());
    values.put_text(event::NAME, remote.name.clone());
    values.put_text(event::ORGANIZER_NAME, remote.organizer_name.clone());
    values.put_text(event::PLACE, remote.place.clone());
    values.put_integer(event::START_TIME, remote.start_time);
    values.put_integer(event::END_TIME, remote.end_time);
    values
}

/// One atomic batch removing events absent from the fetched set together
/// with their attendees. An empty fetched set clears both tables.
fn absent_event_deletions(events: &[RemoteEvent]) -> Vec<Operation> {
    if events.is_empty() {
        return vec![
            Operation::Delete {
                address: Address::collection(Table::Event),
                predicate: None,
            },
            Operation::Delete {
                address: Address::collection(Table::Attendee),
                predicate: None,
            },
        ];
    }
    let ids: Vec<Value> = events
        .iter()
        .map(|remote| Value::Text(remote.id.clone()))
        .collect();
    let placeholders = vec!["?"; ids.len()].join(", ");
    vec![
        Operation::Delete {
            address: Address::collection(Table::Event),
            predicate: Some(Predicate::new(
                format!("{} NOT IN ({placeholders})", event::ID),
                ids.clone(),
            )),
        },
        Operation::Delete {
            address: Address::collection(Table::Attendee),
            predicate: Some(Predicate::new(
                format!("{} NOT IN ({placeholders})", attendee::EVENT_ID),
                ids,
            )),
        },
    ]
}
