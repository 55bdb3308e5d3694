//! Transient notifications.
//!
//! At most one notification is visible at a time; showing a new one replaces
//! the current one immediately. Dismissal is purely cosmetic and is computed
//! from the time the notification was shown.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// Time a toast stays fully visible before it starts fading.
pub const TOAST_VISIBLE: Duration = Duration::from_millis(2700);
/// Fade-out animation length of a toast.
pub const TOAST_FADE: Duration = Duration::from_millis(300);
/// Lifetime of an alert-style notification.
pub const ALERT_VISIBLE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Error => write!(f, "error"),
            NotificationKind::Info => write!(f, "info"),
        }
    }
}

/// Which surface shows the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// Floating toast: 2.7 s visible, then a 0.3 s fade.
    Toast,
    /// Dismissable alert banner, removed after 5 s.
    Alert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub surface: Surface,
    pub shown_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Visible,
    FadingOut,
    Gone,
}

impl Notification {
    pub fn phase_at(&self, now: Instant) -> Phase {
        let age = now.saturating_duration_since(self.shown_at);
        match self.surface {
            Surface::Toast if age < TOAST_VISIBLE => Phase::Visible,
            Surface::Toast if age < TOAST_VISIBLE + TOAST_FADE => Phase::FadingOut,
            Surface::Alert if age < ALERT_VISIBLE => Phase::Visible,
            _ => Phase::Gone,
        }
    }

    /// CSS class list of the rendered element.
    pub fn css_class(&self, now: Instant) -> String {
        let base = match self.surface {
            Surface::Toast => format!("notification {}", self.kind),
            Surface::Alert => format!("alert alert-{} alert-dismissible fade show", self.kind),
        };
        if self.phase_at(now) == Phase::FadingOut {
            format!("{base} fade-out")
        } else {
            base
        }
    }
}

#[derive(Debug, Default)]
pub struct NotificationSurface {
    current: Option<Notification>,
    shown_total: u64,
}

impl NotificationSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a toast now.
    pub fn notify(&mut self, kind: NotificationKind, message: impl Into<String>) {
        self.show(kind, message, Surface::Toast, Instant::now());
    }

    /// Show an alert banner now.
    pub fn alert(&mut self, kind: NotificationKind, message: impl Into<String>) {
        self.show(kind, message, Surface::Alert, Instant::now());
    }

    /// Show a notification at `at`, replacing whatever is currently shown.
    pub fn show(&mut self, kind: NotificationKind, message: impl Into<String>, surface: Surface, at: Instant) {
        let message = message.into();
        if let Some(prev) = self.current.take() {
            debug!(previous = %prev.message, "replacing visible notification");
        }
        match kind {
            NotificationKind::Error => warn!(%kind, %message, "notification"),
            _ => info!(%kind, %message, "notification"),
        }
        self.current = Some(Notification { kind, message, surface, shown_at: at });
        self.shown_total += 1;
    }

    /// Currently visible notification, if it has not expired by `now`.
    pub fn visible_at(&self, now: Instant) -> Option<&Notification> {
        self.current.as_ref().filter(|n| n.phase_at(now) != Phase::Gone)
    }

    /// Most recently shown notification regardless of expiry.
    pub fn latest(&self) -> Option<&Notification> {
        self.current.as_ref()
    }

    /// Remove the current notification once it has expired.
    pub fn prune(&mut self, now: Instant) {
        if self.current.as_ref().is_some_and(|n| n.phase_at(now) == Phase::Gone) {
            self.current = None;
        }
    }

    /// Surface a failed operation. Silent failures (auth redirect, stale
    /// document) are only logged.
    pub fn report_error(&mut self, err: &ClientError, fallback: &str) {
        if err.is_silent() {
            debug!(error = %err, "operation aborted without notification");
            return;
        }
        self.notify(NotificationKind::Error, err.user_message(fallback));
    }

    /// How many notifications have been shown over the surface's lifetime.
    pub fn shown_total(&self) -> u64 {
        self.shown_total
    }
}
