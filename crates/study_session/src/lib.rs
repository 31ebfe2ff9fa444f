//! study_session - Chat sessions over uploaded documents
//!
//! - `documents` - uploads with bounded retry
//! - `session` - the conversation and its transcript
//! - `run` - one run from creation to terminal status
//! - `citations` - footnote rendering for assistant answers
//! - `state` - session phases

pub mod citations;
pub mod documents;
pub mod error;
pub mod run;
pub mod session;
pub mod state;

pub use citations::{
    resolve, AnnotationSpan, CitationResolver, FileNames, FileRegistry, ResolvedMessage, SpanKind,
};
pub use documents::{DocumentStore, RetryPolicy};
pub use error::{Result, SessionError};
pub use run::{RunController, RunOptions, DEFAULT_RUN_INSTRUCTIONS};
pub use session::{learn_file_names, ConversationSession};
pub use state::{SessionEvent, SessionPhase, TransitionError};
