//! Per-bot time-to-live timer.

use chrono::{DateTime, Utc};
use tokio::{sync::mpsc, task::JoinHandle};

use super::messages::BotMessage;

/// Single timer posting [`BotMessage::Expire`] to a bot at its deadline
///
/// Cancelled explicitly on teardown and implicitly on drop. If it fires after
/// the bot is gone the send fails on the closed inbox and nothing happens.
pub struct ExpiryTimer {
    deadline: DateTime<Utc>,
    task: JoinHandle<()>,
}

impl ExpiryTimer {
    /// Schedule the timer, or `None` when the bot never expires
    pub fn schedule(
        expires_at: Option<DateTime<Utc>>,
        inbox: mpsc::Sender<BotMessage>,
    ) -> Option<Self> {
        let deadline = expires_at?;
        let wait = (deadline - Utc::now()).to_std().unwrap_or_default();

        let task = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = inbox.send(BotMessage::Expire).await;
        });

        Some(Self { deadline, task })
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
