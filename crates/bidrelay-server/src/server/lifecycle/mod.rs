//! Request lifecycle: call records, their completions, and the loop that
//! drives them.
//!
//! - [`completion`] - tags, completion events and [`ReplyWriter`].
//! - [`call`] - the CREATE -> PROCESS -> FINISH state machine.
//! - [`event_loop`] - owns every [`Call`] and dispatches completions.
//! - [`processor`] - the pool-side work for one accepted request.

pub mod call;
pub mod completion;
pub mod event_loop;
pub mod processor;

pub use call::{Action, Call, CallState};
pub use completion::{Completion, CompletionSender, InboundCall, ReplyWriter, Tag};
pub use event_loop::EventLoop;
pub use processor::BidProcessor;
