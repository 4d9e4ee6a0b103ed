//! Per-request state machine.
//!
//! ```text
//!   CREATE ──(registered)──▶ PROCESS ──(accepted)──▶ FINISH ──(written)──▶ released
//! ```
//!
//! A [`Call`] only moves forward. Each transition is driven by exactly one
//! completion and yields the [`Action`] the event loop must take next. A
//! completion that does not match the current state is rejected with
//! [`Error::UnexpectedCompletion`] rather than silently applied.

use super::completion::{Completion, InboundCall, Tag};
use bidrelay_core::{Error, Result};
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    Create,
    Process,
    Finish,
}

impl CallState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Process => "process",
            Self::Finish => "finish",
        }
    }
}

#[derive(Debug)]
pub enum Action {
    /// Arm this call to receive the next incoming request.
    Accept,
    /// Register a replacement call, then process this request.
    Process(InboundCall),
    /// The call is done; drop it.
    Release,
}

#[derive(Debug)]
pub struct Call {
    tag: Tag,
    state: CallState,
    product_name: Option<String>,
    accepted_at: Option<Instant>,
}

impl Call {
    pub const fn new(tag: Tag) -> Self {
        Self {
            tag,
            state: CallState::Create,
            product_name: None,
            accepted_at: None,
        }
    }

    pub const fn tag(&self) -> Tag {
        self.tag
    }

    pub const fn state(&self) -> CallState {
        self.state
    }

    pub fn product_name(&self) -> Option<&str> {
        self.product_name.as_deref()
    }

    /// Time since the request was accepted, if it has been.
    pub fn elapsed(&self) -> Option<core::time::Duration> {
        self.accepted_at.map(|at| at.elapsed())
    }

    /// Advances the call. `None` is the initial kick right after creation.
    pub fn proceed(&mut self, completion: Option<Completion>) -> Result<Action> {
        match (self.state, completion) {
            (CallState::Create, None) => {
                self.state = CallState::Process;
                Ok(Action::Accept)
            }
            (CallState::Process, Some(Completion::Accepted { tag, call })) if tag == self.tag => {
                self.state = CallState::Finish;
                self.product_name = Some(call.query.product_name.clone());
                self.accepted_at = Some(Instant::now());
                Ok(Action::Process(call))
            }
            (CallState::Finish, Some(Completion::Written { tag, .. })) if tag == self.tag => {
                Ok(Action::Release)
            }
            (state, completion) => Err(Error::UnexpectedCompletion {
                tag: self.tag,
                completion: completion.as_ref().map_or("initial", Completion::kind),
                state: state.as_str(),
            }),
        }
    }
}
