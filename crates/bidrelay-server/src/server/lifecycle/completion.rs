//! Completion events and the handles that post them.
//!
//! Every call registered with the event loop is identified by a [`Tag`].
//! Whatever happens to a call (a request arriving for it, its reply being
//! written) is reported back to the loop as a [`Completion`] carrying that
//! tag, through an unbounded [`CompletionSender`].

use bidrelay_core::proto::store::{ProductQuery, ProductReply};
use tokio::sync::{mpsc, oneshot};
use tonic::Status;

/// Opaque identity of one call record.
pub type Tag = u64;

/// A request handed over by the gRPC handler, together with the channel its
/// reply must be written to.
#[derive(Debug)]
pub struct InboundCall {
    pub query: ProductQuery,
    pub reply: oneshot::Sender<Result<ProductReply, Status>>,
}

impl InboundCall {
    pub fn new(query: ProductQuery) -> (Self, oneshot::Receiver<Result<ProductReply, Status>>) {
        let (reply, rx) = oneshot::channel();
        (Self { query, reply }, rx)
    }
}

#[derive(Debug)]
pub enum Completion {
    /// The call's accept slot was filled by an incoming request.
    Accepted { tag: Tag, call: InboundCall },
    /// The call's reply was handed to the transport. `ok` is `false` when
    /// the client had already gone away or the reply was abandoned.
    Written { tag: Tag, ok: bool },
}

impl Completion {
    pub const fn tag(&self) -> Tag {
        match self {
            Self::Accepted { tag, .. } | Self::Written { tag, .. } => *tag,
        }
    }

    pub const fn ok(&self) -> bool {
        match self {
            Self::Accepted { .. } => true,
            Self::Written { ok, .. } => *ok,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accept",
            Self::Written { .. } => "write",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompletionSender(mpsc::UnboundedSender<Completion>);

impl CompletionSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    /// Posts a completion. Returns `false` if the event loop is gone.
    pub fn post(&self, completion: Completion) -> bool {
        self.0.send(completion).is_ok()
    }
}

/// Write half of an accepted call.
///
/// Exactly one `Written` completion is posted per writer: by
/// [`ReplyWriter::finish`], or on drop if the writer is abandoned (for
/// example when its job panics or is rejected by the pool). An abandoned
/// writer answers the client with `ABORTED`.
#[derive(Debug)]
pub struct ReplyWriter {
    tag: Tag,
    reply: Option<oneshot::Sender<Result<ProductReply, Status>>>,
    completions: CompletionSender,
}

impl ReplyWriter {
    pub fn new(
        tag: Tag,
        reply: oneshot::Sender<Result<ProductReply, Status>>,
        completions: CompletionSender,
    ) -> Self {
        Self {
            tag,
            reply: Some(reply),
            completions,
        }
    }

    pub const fn tag(&self) -> Tag {
        self.tag
    }

    pub fn finish(mut self, reply: Result<ProductReply, Status>) {
        self.write(reply);
    }

    fn write(&mut self, reply: Result<ProductReply, Status>) {
        let Some(tx) = self.reply.take() else {
            return;
        };
        let ok = tx.send(reply).is_ok();
        self.completions.post(Completion::Written { tag: self.tag, ok });
    }
}

impl Drop for ReplyWriter {
    fn drop(&mut self) {
        if self.reply.is_some() {
            self.write(Err(Status::aborted("request was abandoned before a reply")));
        }
    }
}
