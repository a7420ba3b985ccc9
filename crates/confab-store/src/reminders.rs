//! Relational store for events and reminders
//!
//! The scheduler reads reminder rows joined to their event and deletes them
//! after a successful send. Instants are stored as Unix seconds.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::Result;

/// An event row, read-only from this service's perspective
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Primary key; doubles as the room id clients join
    pub id: i64,
    /// Event title
    pub title: String,
    /// Scheduled start
    pub date: DateTime<Utc>,
    /// Optional free-form description
    pub description: Option<String>,
    /// Optional location
    pub location: Option<String>,
    /// Organizer address
    pub organizer_email: String,
}

/// Fields for inserting an event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub organizer_email: String,
}

/// A reminder row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    /// Primary key
    pub id: i64,
    /// Event this reminder belongs to
    pub event_id: i64,
    /// Recipient address
    pub user_email: String,
    /// When the notification is due
    pub reminder_time: DateTime<Utc>,
}

/// A due reminder joined to its event
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub reminder: Reminder,
    pub event: Event,
}

/// SQLite-backed persistence for events and reminders
pub struct ReminderStore {
    pool: SqlitePool,
}

impl ReminderStore {
    /// Connect with a fresh pool and create the schema
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Wrap an existing pool; call [`ReminderStore::run_migrations`] before use
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                date INTEGER NOT NULL,
                description TEXT,
                location TEXT,
                organizer_email TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL REFERENCES events(id),
                user_email TEXT NOT NULL,
                reminder_time INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reminders_time ON reminders(reminder_time)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an event and return it with its assigned id
    pub async fn create_event(&self, event: NewEvent) -> Result<Event> {
        let result = sqlx::query(
            "INSERT INTO events (title, date, description, location, organizer_email)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&event.title)
        .bind(event.date.timestamp())
        .bind(&event.description)
        .bind(&event.location)
        .bind(&event.organizer_email)
        .execute(&self.pool)
        .await?;

        Ok(Event {
            id: result.last_insert_rowid(),
            title: event.title,
            date: truncate_to_seconds(event.date),
            description: event.description,
            location: event.location,
            organizer_email: event.organizer_email,
        })
    }

    /// Look up one event
    pub async fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let row = sqlx::query(
            "SELECT id, title, date, description, location, organizer_email
             FROM events WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| event_from_row(&r)).transpose()
    }

    /// Insert a reminder
    ///
    /// Reminder times at or before `now` are rejected; this is the API
    /// boundary rule, enforced at the store so every caller gets it.
    pub async fn create_reminder(
        &self,
        event_id: i64,
        user_email: &str,
        reminder_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Reminder> {
        if reminder_time <= now {
            return Err(StoreError::ReminderInPast);
        }

        let result = sqlx::query(
            "INSERT INTO reminders (event_id, user_email, reminder_time) VALUES (?, ?, ?)",
        )
        .bind(event_id)
        .bind(user_email)
        .bind(reminder_time.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(Reminder {
            id: result.last_insert_rowid(),
            event_id,
            user_email: user_email.to_string(),
            reminder_time: truncate_to_seconds(reminder_time),
        })
    }

    /// All reminders due within the look-ahead window, joined to their event
    ///
    /// The window has no lower bound: a row whose time has already passed
    /// (a failed send from an earlier tick, or a crash before cleanup) is
    /// still due and is picked up on the next tick.
    pub async fn due_reminders(
        &self,
        now: DateTime<Utc>,
        lookahead: Duration,
    ) -> Result<Vec<DueReminder>> {
        let horizon = now.timestamp() + lookahead.as_secs() as i64;

        let rows = sqlx::query(
            "SELECT r.id AS reminder_id, r.event_id, r.user_email, r.reminder_time,
                    e.id, e.title, e.date, e.description, e.location, e.organizer_email
             FROM reminders r
             JOIN events e ON e.id = r.event_id
             WHERE r.reminder_time <= ?
             ORDER BY r.reminder_time ASC",
        )
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DueReminder {
                    reminder: Reminder {
                        id: row.get("reminder_id"),
                        event_id: row.get("event_id"),
                        user_email: row.get("user_email"),
                        reminder_time: instant_from_secs(row.get("reminder_time"))?,
                    },
                    event: event_from_row(row)?,
                })
            })
            .collect()
    }

    /// Delete a reminder row; deleting an absent row is not an error
    pub async fn delete_reminder(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Event> {
    Ok(Event {
        id: row.get("id"),
        title: row.get("title"),
        date: instant_from_secs(row.get("date"))?,
        description: row.get("description"),
        location: row.get("location"),
        organizer_email: row.get("organizer_email"),
    })
}

fn instant_from_secs(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(StoreError::TimestampOutOfRange(secs))
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}
