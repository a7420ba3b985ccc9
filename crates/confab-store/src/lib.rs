//! Confab persistence layer
//!
//! Three concerns live here: environment configuration for both services,
//! the per-room message document store, and the relational store the
//! reminder scheduler reads.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod messages;
pub mod reminders;

pub use config::{ConfigError, NotifyConfig, SignalConfig, SmtpConfig};
pub use error::StoreError;
pub use messages::{MessageStore, RoomMessage};
pub use reminders::{DueReminder, Event, NewEvent, Reminder, ReminderStore};

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
