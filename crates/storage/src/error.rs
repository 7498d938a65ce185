#![forbid(unsafe_code)]

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidAddress(String),
    InvalidInput(&'static str),
    MissingColumn(&'static str),
    ColumnType(&'static str),
    UnsupportedVersion { found: i64, supported: i64 },
    Poisoned,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidAddress(address) => write!(f, "invalid address: {address}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::MissingColumn(column) => write!(f, "missing column: {column}"),
            Self::ColumnType(column) => write!(f, "unexpected type for column: {column}"),
            Self::UnsupportedVersion { found, supported } => {
                write!(
                    f,
                    "unsupported schema version (found={found}, supported={supported})"
                )
            }
            Self::Poisoned => write!(f, "store lock poisoned by a panicked writer"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}
