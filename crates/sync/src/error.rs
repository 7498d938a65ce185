#![forbid(unsafe_code)]

use ts_storage::StoreError;

#[derive(Debug)]
pub enum SyncError {
    Store(StoreError),
    Http(reqwest::Error),
    Auth(String),
    Remote(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "store: {err}"),
            Self::Http(err) => write!(f, "http: {err}"),
            Self::Auth(message) => write!(f, "auth: {message}"),
            Self::Remote(message) => write!(f, "remote: {message}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

/// Outcomes of the guarded check-in/revert transition. The first three are
/// precondition violations: reported to the caller, nothing written, nothing
/// retried.
#[derive(Debug)]
pub enum CheckinError {
    AlreadyCheckedIn,
    NotYetCheckedIn,
    BadCheckIn,
    Store(StoreError),
}

impl std::fmt::Display for CheckinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyCheckedIn => f.write_str("attendee is already checked in"),
            Self::NotYetCheckedIn => f.write_str("attendee is not checked in"),
            Self::BadCheckIn => f.write_str("no such attendee for this event"),
            Self::Store(err) => write!(f, "store: {err}"),
        }
    }
}

impl std::error::Error for CheckinError {}

impl From<StoreError> for CheckinError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
