//! Desktop notifications
//!
//! Feedback goes through `notify-send` so it works on any freedesktop
//! environment without a D-Bus dependency in-process. Notifications are
//! fire-and-forget: a missing notify-send is logged once and never fails
//! a command cycle.

use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

/// Notification urgency, mapped onto notify-send's levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

impl Urgency {
    fn as_arg(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::Critical => "critical",
        }
    }
}

static WARNED_UNAVAILABLE: AtomicBool = AtomicBool::new(false);

/// Show a desktop notification. Never blocks and never fails the caller.
pub fn notify(summary: &str, body: &str, urgency: Urgency) {
    let result = Command::new("notify-send")
        .arg("--app-name=hark")
        .arg(format!("--urgency={}", urgency.as_arg()))
        .arg("--expire-time=4000")
        .arg(summary)
        .arg(body)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match result {
        // Reap in the background so short-lived notify-send processes do
        // not pile up as zombies
        Ok(child) => crate::dispatch::reap(child),
        Err(e) => {
            if !WARNED_UNAVAILABLE.swap(true, Ordering::Relaxed) {
                tracing::warn!("notify-send unavailable, notifications disabled: {}", e);
            }
            tracing::info!("[notification] {}: {}", summary, body);
        }
    }
}
