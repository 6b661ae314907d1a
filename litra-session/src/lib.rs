//! litra-session: live translation session controller
//!
//! Keeps a chapter's paragraphs, their translation progress and the human
//! review workflow consistent while translations are requested locally and
//! progress is pushed by the backend.
//!
//! **Architecture:**
//! - [`channel`]: reconnecting realtime event channel (own task)
//! - [`session`]: session actor owning all mutable state, plus the
//!   [`SessionController`] that user operations go through
//! - [`status`]: per-paragraph status reducer
//! - [`review`]: agent output normalizer
//! - [`hitl`]: human review queue
//! - [`batch`]: bounded-concurrency batch runner
//! - [`coverage`]: glossary coverage checker
//! - [`api`]: backend seams and their HTTP implementation

pub mod api;
pub mod batch;
pub mod channel;
pub mod coverage;
pub mod error;
pub mod hitl;
pub mod review;
pub mod session;
pub mod status;

pub use crate::error::{SessionError, SessionResult};
pub use crate::session::{SessionContext, SessionController};
