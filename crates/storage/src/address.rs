#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::schema::Table;
use rusqlite::types::Value;

/// A caller-supplied selection: a SQL fragment with `?` placeholders and the
/// arguments filling them, in order.
#[derive(Clone, Debug, Default)]
pub struct Predicate {
    clause: String,
    args: Vec<Value>,
}

impl Predicate {
    pub fn new(clause: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            clause: clause.into(),
            args,
        }
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// A logical resource address over the store. Collection addresses name a
/// whole table; item addresses carry the composite key as path segments and
/// resolve to a key predicate.
///
/// Recognized forms:
/// - `events`
/// - `events/{id}`
/// - `attendees`
/// - `events/{event_id}/attendees/{code}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Collection(Table),
    Item(Table, Vec<String>),
}

impl Address {
    pub fn collection(table: Table) -> Self {
        Self::Collection(table)
    }

    pub fn event(id: impl Into<String>) -> Self {
        Self::Item(Table::Event, vec![id.into()])
    }

    pub fn attendee(event_id: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Item(Table::Attendee, vec![event_id.into(), code.into()])
    }

    /// Parses the `/`-separated textual form. Unrecognized roots, wrong
    /// segment counts, and empty segments are all programming errors at the
    /// call site, reported as `InvalidAddress`.
    pub fn parse(input: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidAddress(input.to_string());
        let segments: Vec<&str> = input.trim().trim_matches('/').split('/').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(invalid());
        }
        match segments.as_slice() {
            ["events"] => Ok(Self::Collection(Table::Event)),
            ["attendees"] => Ok(Self::Collection(Table::Attendee)),
            ["events", id] => Ok(Self::event(*id)),
            ["events", event_id, "attendees", code] => Ok(Self::attendee(*event_id, *code)),
            _ => Err(invalid()),
        }
    }

    pub fn table(&self) -> Table {
        match self {
            Self::Collection(table) | Self::Item(table, _) => *table,
        }
    }

    /// Resolves this address plus an optional caller predicate into one WHERE
    /// fragment. An item address contributes its composite-key predicate,
    /// conjoined with the caller's clause by `AND`.
    pub fn selection(&self, predicate: Option<&Predicate>) -> (Option<String>, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        if let Self::Item(table, keys) = self {
            clauses.push(table.key_predicate());
            args.extend(keys.iter().map(|key| Value::Text(key.clone())));
        }
        if let Some(predicate) = predicate {
            clauses.push(format!("({})", predicate.clause()));
            args.extend(predicate.args().iter().cloned());
        }
        if clauses.is_empty() {
            (None, args)
        } else {
            (Some(clauses.join(" AND ")), args)
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collection(table) => f.write_str(table.base_name()),
            Self::Item(Table::Event, keys) => {
                write!(f, "events/{}", keys.join("/"))
            }
            Self::Item(Table::Attendee, keys) => {
                let event_id = keys.first().map(String::as_str).unwrap_or("");
                let code = keys.get(1).map(String::as_str).unwrap_or("");
                write!(f, "events/{event_id}/attendees/{code}")
            }
        }
    }
}
