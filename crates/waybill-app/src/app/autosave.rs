//! Debounced auto-save
//!
//! Every edit re-arms a timer; when it expires without further edits the
//! whole month is batch-saved in the background. Failures are logged and
//! reported as events but never retried: the next edit arms a new attempt.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use waybill_types::SaveState;

use super::ledger_session::{LedgerSession, SessionError};

/// Result of one timer expiry
#[derive(Debug, Clone, PartialEq)]
pub enum AutoSaveEvent {
    Saved,
    /// Nothing to commit when the timer fired
    Skipped,
    Failed(String),
}

pub struct AutoSaver {
    session: LedgerSession,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    events: mpsc::UnboundedSender<AutoSaveEvent>,
}

impl AutoSaver {
    /// Create the saver and the receiving end of its event stream
    pub fn new(
        session: LedgerSession,
        delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<AutoSaveEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let saver = Self {
            session,
            delay,
            pending: Mutex::new(None),
            events,
        };
        (saver, receiver)
    }

    pub fn session(&self) -> &LedgerSession {
        &self.session
    }

    /// (Re)start the quiet-period timer. Must be called inside a tokio runtime.
    pub fn schedule(&self) {
        let session = self.session.clone();
        let events = self.events.clone();
        let delay = self.delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Aborting the timer must not interrupt a save that has started
            let save = tokio::spawn(async move {
                let event = if !session.has_unsaved_changes() {
                    AutoSaveEvent::Skipped
                } else {
                    match session.save_month().await {
                        Ok(()) => {
                            log::info!("Auto-saved {} {}", session.vehicle_id(), session.month());
                            AutoSaveEvent::Saved
                        }
                        Err(e) => {
                            log::warn!("Auto-save failed: {}", e);
                            AutoSaveEvent::Failed(e.to_string())
                        }
                    }
                };
                // Receiver may be gone when the session is closing
                let _ = events.send(event);
            });
            let _ = save.await;
        });

        if let Some(previous) = self.replace_pending(Some(handle)) {
            previous.abort();
        }
        log::debug!("Auto-save armed for {:?}", delay);
    }

    /// Drop a pending timer; a save that already started is left to finish
    pub fn cancel(&self) -> bool {
        match self.replace_pending(None) {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                log::debug!("Pending auto-save cancelled");
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Manual per-day save; cancels the pending timer first
    pub async fn save_day_now(&self, day: u32) -> Result<SaveState, SessionError> {
        self.cancel();
        self.session.save_day(day).await
    }

    /// Manual batch save; cancels the pending timer first
    pub async fn save_month_now(&self) -> Result<(), SessionError> {
        self.cancel();
        self.session.save_month().await
    }

    fn replace_pending(&self, handle: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *pending, handle)
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.cancel();
    }
}
