#![forbid(unsafe_code)]

mod address;
mod error;
mod provider;
mod record;
pub mod schema;
mod values;

pub use address::{Address, Predicate};
pub use error::StoreError;
pub use provider::{ChangeEvent, OpResult, Operation, Provider};
pub use record::{Record, attendee_from_record, event_from_record};
pub use schema::{SCHEMA_VERSION, Table};
pub use values::ContentValues;

pub use rusqlite::types::Value;
