//! Store error types

use thiserror::Error;

/// Persistence layer errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure in the document store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Room document could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Relational store failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Room id is empty or would escape the document directory
    #[error("invalid room id: {0:?}")]
    InvalidRoomId(String),

    /// Reminder creation with a time at or before now
    #[error("reminder time must be in the future")]
    ReminderInPast,

    /// A stored instant is outside the representable range
    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}
