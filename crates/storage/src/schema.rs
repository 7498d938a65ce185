#![forbid(unsafe_code)]

use crate::error::StoreError;
use rusqlite::{Connection, Transaction};

/// Bumped whenever a migration step is added below.
pub const SCHEMA_VERSION: i64 = 6;

pub const ROW_ID: &str = "_id";

/// Column constants for the `events` table.
pub mod event {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const ORGANIZER_NAME: &str = "organizer_name";
    pub const PLACE: &str = "place";
    pub const START_TIME: &str = "start_time";
    pub const END_TIME: &str = "end_time";
}

/// Column constants for the `attendees` table.
pub mod attendee {
    pub const EVENT_ID: &str = "event_id";
    pub const CODE: &str = "code";
    pub const EMAIL: &str = "email";
    pub const NAME: &str = "name";
    pub const PLUSID: &str = "plusid";
    pub const IMAGE_URL: &str = "image_url";
    pub const CHECKIN: &str = "checkin";
    pub const DIRTY: &str = "dirty";
    pub const NOTE: &str = "note";
}

#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub name: &'static str,
    pub decl: &'static str,
}

const EVENT_COLUMNS: &[Column] = &[
    Column {
        name: ROW_ID,
        decl: "INTEGER PRIMARY KEY AUTOINCREMENT",
    },
    Column {
        name: event::ID,
        decl: "TEXT NOT NULL",
    },
    Column {
        name: event::NAME,
        decl: "TEXT NOT NULL",
    },
    Column {
        name: event::ORGANIZER_NAME,
        decl: "TEXT NOT NULL",
    },
    Column {
        name: event::PLACE,
        decl: "TEXT NOT NULL",
    },
    // Unix-time (seconds)
    Column {
        name: event::START_TIME,
        decl: "INTEGER NOT NULL",
    },
    // Unix-time (seconds)
    Column {
        name: event::END_TIME,
        decl: "INTEGER NOT NULL",
    },
];

const ATTENDEE_COLUMNS: &[Column] = &[
    Column {
        name: ROW_ID,
        decl: "INTEGER PRIMARY KEY AUTOINCREMENT",
    },
    Column {
        name: attendee::EVENT_ID,
        decl: "TEXT NOT NULL",
    },
    Column {
        name: attendee::CODE,
        decl: "TEXT NOT NULL",
    },
    Column {
        name: attendee::EMAIL,
        decl: "TEXT NOT NULL",
    },
    Column {
        name: attendee::NAME,
        decl: "TEXT NOT NULL",
    },
    Column {
        name: attendee::PLUSID,
        decl: "TEXT",
    },
    Column {
        name: attendee::IMAGE_URL,
        decl: "TEXT",
    },
    // Unix-time (seconds)
    Column {
        name: attendee::CHECKIN,
        decl: "INTEGER",
    },
    Column {
        name: attendee::DIRTY,
        decl: "INTEGER NOT NULL DEFAULT 0",
    },
    Column {
        name: attendee::NOTE,
        decl: "TEXT",
    },
];

/// Each database table is one variant. The composite key columns double as
/// the item segments of a resource address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Event,
    Attendee,
}

impl Table {
    pub const ALL: [Table; 2] = [Table::Event, Table::Attendee];

    pub fn base_name(self) -> &'static str {
        match self {
            Table::Event => "events",
            Table::Attendee => "attendees",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Table::Event => EVENT_COLUMNS,
            Table::Attendee => ATTENDEE_COLUMNS,
        }
    }

    /// The columns declared unique as a set. A write that lands on an
    /// existing key replaces the whole row.
    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            Table::Event => &[event::ID],
            Table::Attendee => &[attendee::EVENT_ID, attendee::CODE],
        }
    }

    pub fn key_predicate(self) -> String {
        self.key_columns()
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn create_sql(self) -> String {
        let mut sql = String::from("CREATE TABLE ");
        sql.push_str(self.base_name());
        sql.push_str(" (");
        for column in self.columns() {
            sql.push_str(column.name);
            sql.push(' ');
            sql.push_str(column.decl);
            sql.push_str(", ");
        }
        sql.push_str("UNIQUE (");
        sql.push_str(&self.key_columns().join(", "));
        sql.push_str(") ON CONFLICT REPLACE)");
        sql
    }

    fn drop_sql(self) -> String {
        format!("DROP TABLE {}", self.base_name())
    }
}

/// Installs a fresh schema or walks the stored version up to the current
/// one, step by step, inside one transaction. A version newer than this
/// build supports is rejected outright.
pub(crate) fn install(conn: &mut Connection) -> Result<(), StoreError> {
    let found: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    if found == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    if found == 0 {
        create_tables(&tx)?;
    } else {
        for version in (found + 1)..=SCHEMA_VERSION {
            migration_step(&tx, version)?;
        }
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

fn create_tables(tx: &Transaction<'_>) -> Result<(), StoreError> {
    for table in Table::ALL {
        tx.execute(&table.create_sql(), [])?;
    }
    Ok(())
}

/// One step of schema history. Destructive steps are fine for replicated
/// content; only in-flight dirty check-ins and notes are at risk, and the
/// remote remains the source of truth.
fn migration_step(tx: &Transaction<'_>, version: i64) -> Result<(), StoreError> {
    match version {
        2 => {
            tx.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} TEXT",
                    Table::Attendee.base_name(),
                    attendee::IMAGE_URL
                ),
                [],
            )?;
        }
        // The events table first appeared in version 3.
        3 => {
            tx.execute(&Table::Attendee.drop_sql(), [])?;
            tx.execute(&Table::Event.create_sql(), [])?;
            tx.execute(&Table::Attendee.create_sql(), [])?;
        }
        4 => {
            tx.execute(&Table::Attendee.drop_sql(), [])?;
            tx.execute(&Table::Event.drop_sql(), [])?;
            tx.execute(&Table::Event.create_sql(), [])?;
            tx.execute(&Table::Attendee.create_sql(), [])?;
        }
        5 | 6 => {
            tx.execute(&Table::Attendee.drop_sql(), [])?;
            tx.execute(&Table::Attendee.create_sql(), [])?;
        }
        _ => {
            return Err(StoreError::InvalidInput(
                "no migration step for schema version",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_create_sql_declares_replace_on_conflict() {
        let sql = Table::Event.create_sql();
        assert!(sql.starts_with("CREATE TABLE events ("));
        assert!(sql.contains("id TEXT NOT NULL"));
        assert!(sql.ends_with("UNIQUE (id) ON CONFLICT REPLACE)"));
    }

    #[test]
    fn attendee_create_sql_declares_composite_key() {
        let sql = Table::Attendee.create_sql();
        assert!(sql.starts_with("CREATE TABLE attendees ("));
        assert!(sql.contains("dirty INTEGER NOT NULL DEFAULT 0"));
        assert!(sql.ends_with("UNIQUE (event_id, code) ON CONFLICT REPLACE)"));
    }

    #[test]
    fn key_predicates_join_with_and() {
        assert_eq!(Table::Event.key_predicate(), "id = ?");
        assert_eq!(Table::Attendee.key_predicate(), "event_id = ? AND code = ?");
    }
}
