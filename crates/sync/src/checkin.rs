#![forbid(unsafe_code)]

use crate::error::CheckinError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use ts_core::ids::{AttendeeCode, EventId};
use ts_core::model::{self, Attendee};
use ts_storage::schema::{Table, attendee};
use ts_storage::{
    Address, ContentValues, Predicate, Provider, StoreError, Value, attendee_from_record,
};

/// Performs one guarded, idempotent check-in or revert.
///
/// The guard reads the attendee's current state by its composite key; the
/// write is scoped by the attendee code alone (codes are treated as globally
/// addressable for this single update). The timestamp written here is
/// provisional; a successful push replaces it with the server's value.
///
/// Returns `Ok(None)` only when the guarded row vanished between the read
/// and the write (a concurrent deletion). On success the caller is expected
/// to trigger a check-ins-only sync; [`crate::CheckinDispatcher`] does both.
pub fn request_check_in(
    provider: &Provider,
    code: &AttendeeCode,
    event_id: &EventId,
    revert: bool,
) -> Result<Option<Attendee>, CheckinError> {
    let address = Address::attendee(event_id.as_str(), code.as_str());
    let rows = provider.query(&address, Some(&[attendee::CHECKIN]), None, None)?;
    let Some(row) = rows.first() else {
        return Err(CheckinError::BadCheckIn);
    };
    let checked_in = model::is_checked_in(row.opt_integer(attendee::CHECKIN)?);
    if !revert && checked_in {
        return Err(CheckinError::AlreadyCheckedIn);
    }
    if revert && !checked_in {
        return Err(CheckinError::NotYetCheckedIn);
    }

    let mut values = ContentValues::new();
    if revert {
        values.put_null(attendee::CHECKIN);
    } else {
        values.put_integer(attendee::CHECKIN, unix_now());
    }
    values.put_flag(attendee::DIRTY, true);
    let affected = provider.update(
        &Address::collection(Table::Attendee),
        &values,
        Some(&Predicate::new(
            format!("{} = ?", attendee::CODE),
            vec![Value::Text(code.as_str().to_string())],
        )),
    )?;
    if affected == 0 {
        return Ok(None);
    }

    let rows = provider.query(&address, None, None, None)?;
    match rows.first() {
        Some(record) => Ok(Some(attendee_from_record(record)?)),
        None => Ok(None),
    }
}

/// Stores or clears the free-text note on one attendee. Notes are local-only
/// data: no dirty flag, no sync trigger.
pub fn set_note(
    provider: &Provider,
    event_id: &EventId,
    code: &AttendeeCode,
    note: &str,
) -> Result<usize, StoreError> {
    let mut values = ContentValues::new();
    let trimmed = note.trim();
    if trimmed.is_empty() {
        values.put_null(attendee::NOTE);
    } else {
        values.put_text(attendee::NOTE, trimmed);
    }
    provider.update(
        &Address::attendee(event_id.as_str(), code.as_str()),
        &values,
        None,
    )
}

fn unix_now() -> i64 {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    seconds.min(i64::MAX as u64) as i64
}
