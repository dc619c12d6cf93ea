use std::fmt;

/// Error type for storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    LockPoisoned(&'static str),
    MissingRow { table: &'static str, id: u64 },
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::LockPoisoned(operation) => {
                write!(f, "store lock poisoned during {}", operation)
            }
            StoreError::MissingRow { table, id } => {
                write!(f, "no row with id {} in {}", id, table)
            }
            StoreError::Serialization(msg) => write!(f, "serialization failed: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
