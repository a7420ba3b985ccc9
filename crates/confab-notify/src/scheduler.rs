//! Reminder scheduler
//!
//! A periodic scan over the reminder table: read everything due inside the
//! look-ahead window, mail each recipient, and delete the row only after
//! the sink accepts the message. Delivery is at-least-once: a failure or a
//! crash between send and delete re-notifies on the next tick, a deleted
//! row never fires again. No error ever takes the loop down.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use confab_store::{DueReminder, ReminderStore, StoreError};

use crate::mail::Mailer;

/// The background reminder worker
pub struct Scheduler {
    store: Arc<ReminderStore>,
    mailer: Arc<dyn Mailer>,
    tick: Duration,
    lookahead: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<ReminderStore>,
        mailer: Arc<dyn Mailer>,
        tick: Duration,
        lookahead: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            tick,
            lookahead,
        }
    }

    /// Run until the shutdown flag flips
    ///
    /// Ticks never overlap: the next interval fire waits for the previous
    /// pass to finish, and overruns skip instead of bunching. On shutdown
    /// the in-flight reminder completes, then the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_secs = self.tick.as_secs(), "reminder scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.run_tick_with(&|| *shutdown.borrow()).await;

            if *shutdown.borrow() {
                break;
            }
        }
        info!("reminder scheduler stopped");
    }

    /// Execute a single scan-and-send pass
    pub async fn run_tick(&self) {
        self.run_tick_with(&|| false).await;
    }

    async fn run_tick_with(&self, should_stop: &(dyn Fn() -> bool + Sync)) {
        if let Err(e) = self.process_due(should_stop).await {
            // Contained: the next tick retries from a clean read
            error!(error = %e, "reminder tick failed");
        }
    }

    async fn process_due(&self, should_stop: &(dyn Fn() -> bool + Sync)) -> Result<(), StoreError> {
        let now = Utc::now();
        let due = self.store.due_reminders(now, self.lookahead).await?;
        if due.is_empty() {
            info!("no upcoming reminders to send");
            return Ok(());
        }

        let (mut sent, mut failed, mut skipped) = (0u32, 0u32, 0u32);
        for item in due {
            if should_stop() {
                info!("shutdown requested, stopping after current reminder");
                break;
            }

            let recipient = item.reminder.user_email.trim().to_string();
            if recipient.is_empty() {
                warn!(
                    reminder = item.reminder.id,
                    event = item.reminder.event_id,
                    "skipping reminder with blank recipient"
                );
                skipped += 1;
                continue;
            }

            let (subject, plain, html) = compose(&item);
            match self.mailer.send(&subject, &recipient, &plain, &html).await {
                Ok(()) => {
                    // Delete only after the sink accepted the message. A
                    // failed delete re-sends next tick, which at-least-once
                    // allows.
                    if let Err(e) = self.store.delete_reminder(item.reminder.id).await {
                        error!(reminder = item.reminder.id, error = %e, "reminder sent but not deleted");
                    }
                    sent += 1;
                }
                Err(e) => {
                    error!(
                        reminder = item.reminder.id,
                        to = %recipient,
                        error = %e,
                        "reminder email failed, will retry next tick"
                    );
                    failed += 1;
                }
            }
        }

        info!(sent, failed, skipped, "reminder tick complete");
        Ok(())
    }
}

/// Compose subject and bodies from the joined event row
fn compose(item: &DueReminder) -> (String, String, String) {
    let event = &item.event;
    let when = event.date.format("%Y-%m-%d at %H:%M:%S");
    let location = event.location.as_deref().unwrap_or("Not specified");

    let subject = format!("Reminder: Your Event '{}' is Happening Soon!", event.title);

    let plain = format!(
        "This is a reminder for the upcoming event:\n\n\
         Event Title: {}\n\
         Date & Time: {}\n\
         Location: {}\n\
         Room ID: {}\n\n\
         We look forward to your participation!\n\n\
         Best regards,\n\
         The Confab Team\n",
        event.title, when, location, event.id
    );

    let html = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; background-color: #f4f4f4; margin: 0; padding: 20px;">
  <div style="background-color: #ffffff; border-radius: 8px; padding: 20px;">
    <h2 style="color: #333;">Reminder: Your Event '{title}' is Happening Soon!</h2>
    <p style="color: #555; line-height: 1.6;">This is a reminder for the upcoming event:</p>
    <ul style="list-style-type: none; padding: 0;">
      <li style="margin: 10px 0; padding: 10px; background-color: #f9f9f9;"><strong>Event Title:</strong> {title}</li>
      <li style="margin: 10px 0; padding: 10px; background-color: #f9f9f9;"><strong>Date &amp; Time:</strong> {when}</li>
      <li style="margin: 10px 0; padding: 10px; background-color: #f9f9f9;"><strong>Location:</strong> {location}</li>
      <li style="margin: 10px 0; padding: 10px; background-color: #f9f9f9;"><strong>Room ID:</strong> {room}</li>
    </ul>
    <p style="color: #555; line-height: 1.6;">We look forward to your participation!</p>
    <p style="font-weight: bold; color: #555;">Best regards,</p>
    <p style="color: #555;">The Confab Team</p>
  </div>
</body>
</html>"#,
        title = event.title,
        when = when,
        location = location,
        room = event.id,
    );

    (subject, plain, html)
}
