use thiserror::Error;

/// Errors that can occur when interacting with the event log.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The topic has not been created.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// The topic already exists with a different partition count.
    #[error("Topic {topic} already exists with {existing} partitions (requested {requested})")]
    PartitionMismatch {
        topic: String,
        existing: u32,
        requested: u32,
    },

    /// The partition is outside the topic's range.
    #[error("Partition {partition} out of range for topic {topic}")]
    InvalidPartition { topic: String, partition: u32 },

    /// The record failed validation before append.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The log could not be reached. Safe to retry.
    #[error("Log unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventLogError {
    /// Returns true if the failed operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            EventLogError::Unavailable(_) => true,
            EventLogError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, EventLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_retryable() {
        assert!(EventLogError::Unavailable("broker down".into()).is_retryable());
        assert!(EventLogError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_validation_errors_are_not_retryable() {
        assert!(!EventLogError::InvalidRecord("empty key".into()).is_retryable());
        assert!(!EventLogError::UnknownTopic("orders".into()).is_retryable());
        assert!(!EventLogError::Database(sqlx::Error::RowNotFound).is_retryable());
    }
}
