//! Transient status shown while an extraction runs.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

pub trait StatusIndicator: Send + Sync {
    /// Replace whatever is showing with `message`.
    fn show(&self, message: &str, kind: StatusKind);

    fn hide(&self);
}

/// Terminal spinner. Info messages spin; success and error messages are
/// printed once and stay on screen.
pub struct SpinnerIndicator {
    bar: Mutex<Option<ProgressBar>>,
}

impl SpinnerIndicator {
    pub fn new() -> Self {
        Self { bar: Mutex::new(None) }
    }
}

impl Default for SpinnerIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusIndicator for SpinnerIndicator {
    fn show(&self, message: &str, kind: StatusKind) {
        let mut slot = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = slot.take() {
            old.finish_and_clear();
        }

        let bar = ProgressBar::new_spinner();
        match kind {
            StatusKind::Info => {
                if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.blue} {msg}") {
                    bar.set_style(style);
                }
                bar.enable_steady_tick(Duration::from_millis(80));
                bar.set_message(message.to_string());
                *slot = Some(bar);
            }
            StatusKind::Success | StatusKind::Error => {
                let template = if kind == StatusKind::Success { "{msg:.green}" } else { "{msg:.red}" };
                if let Ok(style) = ProgressStyle::default_spinner().template(template) {
                    bar.set_style(style);
                }
                bar.finish_with_message(message.to_string());
            }
        }
    }

    fn hide(&self) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(|e| e.into_inner()).take() {
            bar.finish_and_clear();
        }
    }
}

/// Keeps every call, for callers that report status some other way.
#[derive(Default)]
pub struct RecordingIndicator {
    events: Mutex<Vec<IndicatorEvent>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorEvent {
    Show(String, StatusKind),
    Hide,
}

impl RecordingIndicator {
    pub fn events(&self) -> Vec<IndicatorEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The message currently on screen, if any.
    pub fn current(&self) -> Option<(String, StatusKind)> {
        match self.events().last() {
            Some(IndicatorEvent::Show(msg, kind)) => Some((msg.clone(), *kind)),
            _ => None,
        }
    }
}

impl StatusIndicator for RecordingIndicator {
    fn show(&self, message: &str, kind: StatusKind) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(IndicatorEvent::Show(message.to_string(), kind));
    }

    fn hide(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(IndicatorEvent::Hide);
    }
}
