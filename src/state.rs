use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::session::SessionTicket;

/// Remote quota exhaustion. Derived state owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub reset_unix: Option<i64>,
}

/// Everything the surrounding UI observes about playback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub is_speaking: bool,
    pub is_generating_audio: bool,
    pub quota: Option<QuotaState>,
    /// Last failure or notice, empty when there is nothing to report.
    pub last_error_message: String,
}

/// The single message the UI should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    /// Quota exhausted; `None` when the provider did not say when it resets.
    QuotaExhausted(Option<QuotaCountdown>),
    Notice(String),
    GeneratingAudio,
}

impl PlaybackState {
    pub fn quota_reset_timestamp(&self) -> Option<i64> {
        self.quota.and_then(|q| q.reset_unix)
    }

    pub fn is_busy(&self) -> bool {
        self.is_speaking || self.is_generating_audio
    }

    /// Quota countdown wins over a notice, which wins over the generating notice.
    pub fn status_message(&self, now: DateTime<Utc>) -> Option<StatusMessage> {
        if let Some(quota) = self.quota {
            let countdown = quota
                .reset_unix
                .and_then(|reset| QuotaCountdown::at(reset, now));
            return Some(StatusMessage::QuotaExhausted(countdown));
        }
        if !self.last_error_message.is_empty() {
            return Some(StatusMessage::Notice(self.last_error_message.clone()));
        }
        self.is_generating_audio
            .then_some(StatusMessage::GeneratingAudio)
    }
}

/// Time left until the remote quota resets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCountdown {
    pub reset_at: DateTime<Utc>,
    /// `HH:MM:SS`, hours not wrapped at 24.
    pub clock: String,
    /// Remaining hours with two decimals.
    pub hours: String,
    pub reset_label: String,
}

impl QuotaCountdown {
    /// Countdown from `now` to `reset_unix` (seconds), clamped at zero.
    pub fn at(reset_unix: i64, now: DateTime<Utc>) -> Option<Self> {
        let reset_at = DateTime::<Utc>::from_timestamp(reset_unix, 0)?;
        let remaining_ms = (reset_at - now).num_milliseconds().max(0);

        let total_seconds = remaining_ms / 1000;
        let clock = format!(
            "{:02}:{:02}:{:02}",
            total_seconds / 3600,
            (total_seconds % 3600) / 60,
            total_seconds % 60
        );
        let hours = format!("{:.2}", remaining_ms as f64 / 3_600_000.0);
        let reset_label = reset_at.format("%A, %-d %B %Y %H:%M:%S UTC").to_string();

        Some(Self {
            reset_at,
            clock,
            hours,
            reset_label,
        })
    }
}

/// Shared, observable playback state.
///
/// Drivers only write through [`StateHandle::update_for`], which checks the
/// session ticket under the channel lock, so a stale session can never
/// overwrite state set by a newer one.
#[derive(Debug, Clone)]
pub struct StateHandle {
    tx: Arc<watch::Sender<PlaybackState>>,
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PlaybackState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.tx.subscribe()
    }

    /// Unconditional update. Controller only.
    pub fn update(&self, f: impl FnOnce(&mut PlaybackState)) {
        self.tx.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        });
    }

    /// Apply `f` only if `ticket` is still the active session. Returns whether it was applied.
    pub fn update_for(&self, ticket: &SessionTicket, f: impl FnOnce(&mut PlaybackState)) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|state| {
            if !ticket.is_active() {
                return false;
            }
            applied = true;
            let before = state.clone();
            f(state);
            *state != before
        });
        if !applied {
            log::debug!("Dropped state update from stale session {}", ticket.id());
        }
        applied
    }
}
