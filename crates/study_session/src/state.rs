//! Session phases - the setup/chatting lifecycle of a conversation
//!
//! A session starts in `Setup`, where documents are collected. `start()`
//! moves it to `Chatting` exactly once; there is no way back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Collecting documents; no remote thread exists yet.
    #[default]
    Setup,

    /// A thread exists and utterances are accepted.
    Chatting,
}

/// Events that drive phase transitions.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    DocumentAttached,
    Started,
    UtteranceSubmitted,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DocumentAttached => "document_attached",
            Self::Started => "started",
            Self::UtteranceSubmitted => "utterance_submitted",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} with event {event}")]
    InvalidTransition {
        from: SessionPhase,
        event: SessionEvent,
    },
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Chatting)
    }

    /// Phase after `event`, or an error if the event is not allowed here.
    pub fn next(&self, event: SessionEvent) -> Result<SessionPhase, TransitionError> {
        use SessionEvent::*;
        use SessionPhase::*;

        match (self, event) {
            (Setup, DocumentAttached) => Ok(Setup),
            (Setup, Started) => Ok(Chatting),
            // Starting twice is harmless; the session guards the remote call.
            (Chatting, Started) => Ok(Chatting),
            (Chatting, UtteranceSubmitted) => Ok(Chatting),
            (from, event) => Err(TransitionError::InvalidTransition { from: *from, event }),
        }
    }
}
