#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for crucible
//!
//! All user-visible output from the emission core travels through events;
//! nothing below the host CLI logs or prints directly. The host attaches a
//! receiver and renders events however it likes.

use serde::{Deserialize, Serialize};

/// Type alias for event sender
pub type EventSender = tokio::sync::mpsc::UnboundedSender<Event>;

/// Type alias for event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<Event>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Which section of the `.apk` container an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Signature,
    Control,
    Data,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signature => write!(f, "signature"),
            Self::Control => write!(f, "control"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// Core event enum for emission progress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Emission lifecycle
    EmitStarting {
        package: String,
        identity: String,
    },
    EmitCompleted {
        package: String,
        path: std::path::PathBuf,
    },

    // Dependency generation
    ScanningSharedObjects {
        package: String,
    },
    ScanningCommands {
        package: String,
    },
    InterpreterFound {
        binary: String,
        interpreter: String,
    },
    DependencySummary {
        runtime: Vec<String>,
        provides: Vec<String>,
    },

    // Section emission
    InstalledSizeComputed {
        package: String,
        bytes: u64,
    },
    SectionWritten {
        section: Section,
        digest: Option<String>,
    },

    // Errors and warnings
    Warning {
        message: String,
        context: Option<String>,
    },

    // Debug logging (when the host enables it)
    DebugLog {
        message: String,
    },
}

impl Event {
    /// Create a warning event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            context: None,
        }
    }

    /// Create a debug log event
    pub fn debug(message: impl Into<String>) -> Self {
        Self::DebugLog {
            message: message.into(),
        }
    }
}

/// Helper to send events with error handling
pub trait EventSenderExt {
    /// Send an event, ignoring send errors (receiver dropped)
    fn emit(&self, event: Event);
}

impl EventSenderExt for EventSender {
    fn emit(&self, event: Event) {
        // Receiver gone means the host stopped listening; emission continues.
        let _ = self.send(event);
    }
}

impl EventSenderExt for Option<&'_ EventSender> {
    fn emit(&self, event: Event) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
