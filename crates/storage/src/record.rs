#![forbid(unsafe_code)]

use crate::error::StoreError;
use crate::schema::{attendee, event};
use rusqlite::types::Value;
use ts_core::model::{Attendee, Event};

/// One row as read back from a query, keyed by the projected column names.
/// Accessors report missing columns and type mismatches as errors instead of
/// panicking.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    fn require(&self, column: &'static str) -> Result<&Value, StoreError> {
        self.get(column).ok_or(StoreError::MissingColumn(column))
    }

    pub fn text(&self, column: &'static str) -> Result<&str, StoreError> {
        match self.require(column)? {
            Value::Text(value) => Ok(value),
            _ => Err(StoreError::ColumnType(column)),
        }
    }

    pub fn opt_text(&self, column: &'static str) -> Result<Option<&str>, StoreError> {
        match self.require(column)? {
            Value::Text(value) => Ok(Some(value)),
            Value::Null => Ok(None),
            _ => Err(StoreError::ColumnType(column)),
        }
    }

    pub fn integer(&self, column: &'static str) -> Result<i64, StoreError> {
        match self.require(column)? {
            Value::Integer(value) => Ok(*value),
            _ => Err(StoreError::ColumnType(column)),
        }
    }

    pub fn opt_integer(&self, column: &'static str) -> Result<Option<i64>, StoreError> {
        match self.require(column)? {
            Value::Integer(value) => Ok(Some(*value)),
            Value::Null => Ok(None),
            _ => Err(StoreError::ColumnType(column)),
        }
    }

    /// Flags are stored as INTEGER 0/1; anything non-zero reads as set.
    pub fn flag(&self, column: &'static str) -> Result<bool, StoreError> {
        Ok(self.integer(column)? != 0)
    }
}

/// Converts a full-projection `events` row. The projection must carry every
/// event column.
pub fn event_from_record(record: &Record) -> Result<Event, StoreError> {
    Ok(Event {
        id: record.text(event::ID)?.to_string(),
        name: record.text(event::NAME)?.to_string(),
        organizer_name: record.text(event::ORGANIZER_NAME)?.to_string(),
        place: record.text(event::PLACE)?.to_string(),
        start_time: record.integer(event::START_TIME)?,
        end_time: record.integer(event::END_TIME)?,
    })
}

/// Converts a full-projection `attendees` row.
pub fn attendee_from_record(record: &Record) -> Result<Attendee, StoreError> {
    Ok(Attendee {
        event_id: record.text(attendee::EVENT_ID)?.to_string(),
        code: record.text(attendee::CODE)?.to_string(),
        email: record.text(attendee::EMAIL)?.to_string(),
        name: record.text(attendee::NAME)?.to_string(),
        plusid: record.opt_text(attendee::PLUSID)?.map(str::to_string),
        image_url: record.opt_text(attendee::IMAGE_URL)?.map(str::to_string),
        checkin: record.opt_integer(attendee::CHECKIN)?,
        dirty: record.flag(attendee::DIRTY)?,
        note: record.opt_text(attendee::NOTE)?.map(str::to_string),
    })
}
