#![forbid(unsafe_code)]

pub mod ids {
    /// Remote-assigned event identifier. Identifiers travel inside
    /// `/`-separated resource addresses, so a slash is never valid.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct EventId(String);

    impl EventId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn into_string(self) -> String {
            self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, EventIdError> {
            let value = value.into();
            let trimmed = value.trim();
            validate_event_id(trimmed)?;
            Ok(Self(trimmed.to_string()))
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum EventIdError {
        Empty,
        TooLong,
        ContainsSlash,
        ContainsControl,
    }

    impl EventIdError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "event id must not be empty",
                Self::TooLong => "event id is too long",
                Self::ContainsSlash => "event id must not contain '/'",
                Self::ContainsControl => "event id contains control characters",
            }
        }
    }

    fn validate_event_id(value: &str) -> Result<(), EventIdError> {
        if value.is_empty() {
            return Err(EventIdError::Empty);
        }
        if value.len() > 256 {
            return Err(EventIdError::TooLong);
        }
        if value.contains('/') {
            return Err(EventIdError::ContainsSlash);
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(EventIdError::ContainsControl);
        }
        Ok(())
    }

    /// Attendee code as decoded from a badge. Unique per event, paired with
    /// the event id into the composite attendee key.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct AttendeeCode(String);

    impl AttendeeCode {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn into_string(self) -> String {
            self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, AttendeeCodeError> {
            let value = value.into();
            let trimmed = value.trim();
            validate_attendee_code(trimmed)?;
            Ok(Self(trimmed.to_string()))
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum AttendeeCodeError {
        Empty,
        TooLong,
        ContainsSlash,
        ContainsControl,
    }

    impl AttendeeCodeError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "attendee code must not be empty",
                Self::TooLong => "attendee code is too long",
                Self::ContainsSlash => "attendee code must not contain '/'",
                Self::ContainsControl => "attendee code contains control characters",
            }
        }
    }

    fn validate_attendee_code(value: &str) -> Result<(), AttendeeCodeError> {
        if value.is_empty() {
            return Err(AttendeeCodeError::Empty);
        }
        if value.len() > 256 {
            return Err(AttendeeCodeError::TooLong);
        }
        if value.contains('/') {
            return Err(AttendeeCodeError::ContainsSlash);
        }
        if value.chars().any(|c| c.is_control()) {
            return Err(AttendeeCodeError::ContainsControl);
        }
        Ok(())
    }
}

pub mod model {
    /// An event as replicated from the remote service. Never mutated locally;
    /// a full pull replaces or removes it wholesale.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Event {
        pub id: String,
        pub name: String,
        pub organizer_name: String,
        pub place: String,
        pub start_time: i64,
        pub end_time: i64,
    }

    /// An attendee row. `(event_id, code)` is the composite key. `checkin`
    /// is Unix seconds; `None` means not checked in. `dirty` marks a local
    /// check-in or revert not yet confirmed by the server.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Attendee {
        pub event_id: String,
        pub code: String,
        pub email: String,
        pub name: String,
        pub plusid: Option<String>,
        pub image_url: Option<String>,
        pub checkin: Option<i64>,
        pub dirty: bool,
        pub note: Option<String>,
    }

    impl Attendee {
        pub fn is_checked_in(&self) -> bool {
            is_checked_in(self.checkin)
        }
    }

    /// A stored zero counts as not checked in, the same as a missing value.
    pub fn is_checked_in(checkin: Option<i64>) -> bool {
        matches!(checkin, Some(time) if time > 0)
    }

    /// The remote sends an empty string when an attendee has no social
    /// profile; store that as no value.
    pub fn normalize_plusid(plusid: Option<String>) -> Option<String> {
        plusid.filter(|value| !value.trim().is_empty())
    }
}
