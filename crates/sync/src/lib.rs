#![forbid(unsafe_code)]

mod checkin;
mod engine;
mod error;
mod remote;
mod scheduler;

pub use checkin::{request_check_in, set_note};
pub use engine::{SyncEngine, SyncReport, SyncScope};
pub use error::{CheckinError, SyncError};
pub use remote::{
    Credential, EventService, HttpEventService, NoopProfileResolver, ProfileResolver,
    RemoteAttendee, RemoteEvent, exchange_token,
};
pub use scheduler::{CheckinDispatcher, SyncRequests, SyncScheduler};
