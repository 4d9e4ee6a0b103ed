//! The single task that owns every call record.
//!
//! The loop waits on three sources: the shutdown token, the completion
//! queue, and the inbound request queue. Exactly one call is armed to accept
//! at any time while the server is accepting. When a request fills it, a
//! replacement is armed *before* the request is handed to the worker pool,
//! so there is never a window in which no call can accept.
//!
//! Failures are contained to the call they concern: a failed completion, an
//! out-of-order completion or a completion for an unknown tag is logged,
//! counted, and the affected call is released. The loop itself keeps
//! running.

use super::{
    call::{Action, Call},
    completion::{Completion, CompletionSender, InboundCall, ReplyWriter, Tag},
    processor::BidProcessor,
};
use crate::server::stats::StoreStats;
use bidrelay_pool::WorkerPool;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct EventLoop {
    inbound: mpsc::Receiver<InboundCall>,
    completions: mpsc::UnboundedReceiver<Completion>,
    completion_tx: CompletionSender,
    calls: HashMap<Tag, Call>,
    acceptor: Option<Tag>,
    next_tag: Tag,
    accepting: bool,
    processor: Arc<BidProcessor>,
    pool: Arc<WorkerPool>,
    stats: Arc<StoreStats>,
}

impl EventLoop {
    pub fn new(
        inbound: mpsc::Receiver<InboundCall>,
        processor: Arc<BidProcessor>,
        pool: Arc<WorkerPool>,
        stats: Arc<StoreStats>,
    ) -> Self {
        let (completion_tx, completions) = CompletionSender::channel();
        Self {
            inbound,
            completions,
            completion_tx,
            calls: HashMap::new(),
            acceptor: None,
            next_tag: 0,
            accepting: true,
            processor,
            pool,
            stats,
        }
    }

    /// Runs until `shutdown` fires (or every inbound sender is dropped) and
    /// all calls already accepted have been written.
    pub async fn run(mut self, shutdown: CancellationToken) {
        self.spawn_call();

        loop {
            if !self.accepting && self.calls.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                () = shutdown.cancelled(), if self.accepting => {
                    tracing::info!(in_flight = self.calls.len().saturating_sub(1), "event loop draining");
                    self.stop_accepting();
                }
                Some(completion) = self.completions.recv() => self.dispatch(completion),
                inbound = self.inbound.recv(), if self.accepting && self.acceptor.is_some() => {
                    match (inbound, self.acceptor) {
                        (Some(call), Some(tag)) => {
                            self.acceptor = None;
                            self.dispatch(Completion::Accepted { tag, call });
                        }
                        _ => self.stop_accepting(),
                    }
                }
                else => break,
            }
        }

        tracing::info!("event loop stopped");
    }

    /// Registers a fresh call and arms it to accept.
    fn spawn_call(&mut self) {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);

        let mut call = Call::new(tag);
        match call.proceed(None) {
            Ok(action) => self.apply(call, action),
            Err(e) => {
                tracing::error!(error = %e, "failed to arm call");
                self.stats.dispatch_failure();
            }
        }
    }

    fn dispatch(&mut self, completion: Completion) {
        let tag = completion.tag();
        let Some(mut call) = self.calls.remove(&tag) else {
            tracing::warn!(tag, completion = completion.kind(), "completion for unknown call");
            self.stats.dispatch_failure();
            return;
        };

        if !completion.ok() {
            tracing::warn!(
                tag,
                completion = completion.kind(),
                state = call.state().as_str(),
                "call failed"
            );
            self.stats.dispatch_failure();
            self.release(call);
            return;
        }

        match call.proceed(Some(completion)) {
            Ok(action) => self.apply(call, action),
            Err(e) => {
                tracing::warn!(error = %e, "dropping call");
                self.stats.dispatch_failure();
                self.release(call);
            }
        }
    }

    fn apply(&mut self, call: Call, action: Action) {
        let tag = call.tag();
        match action {
            Action::Accept => {
                self.acceptor = Some(tag);
                self.calls.insert(tag, call);
            }
            Action::Process(inbound) => {
                if self.accepting {
                    self.spawn_call();
                }
                self.stats.call_accepted();
                tracing::debug!(tag, product = call.product_name(), "accepted");
                self.calls.insert(tag, call);

                let writer = ReplyWriter::new(tag, inbound.reply, self.completion_tx.clone());
                let processor = Arc::clone(&self.processor);
                let query = inbound.query;

                // A rejected job is dropped along with its writer, which
                // reports the call as failed.
                if let Err(e) = self.pool.submit(move || processor.process(query, writer)) {
                    tracing::warn!(tag, error = %e, "worker pool rejected request");
                }
            }
            Action::Release => self.release(call),
        }
    }

    fn release(&mut self, call: Call) {
        if self.acceptor == Some(call.tag()) {
            self.acceptor = None;
            if self.accepting {
                self.spawn_call();
            }
        }
        if let Some(elapsed) = call.elapsed() {
            self.stats.call_released(elapsed);
        }
        tracing::trace!(tag = call.tag(), "released");
    }

    /// Stops accepting: the armed call is released and requests still
    /// queued are refused when the loop drops its receiver.
    fn stop_accepting(&mut self) {
        self.accepting = false;
        self.inbound.close();
        if let Some(tag) = self.acceptor.take() {
            self.calls.remove(&tag);
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // Calls still registered here were cut off by an aborted loop.
        for call in self.calls.values() {
            if let Some(elapsed) = call.elapsed() {
                tracing::warn!(tag = call.tag(), product = call.product_name(), "abandoning call");
                self.stats.call_released(elapsed);
            }
        }

        // Joining the pool blocks; never do it on a runtime thread.
        if Arc::strong_count(&self.pool) == 1 && !self.pool.is_shut_down() {
            let pool = Arc::clone(&self.pool);
            if let Err(e) = std::thread::Builder::new()
                .name("bidrelay-pool-shutdown".into())
                .spawn(move || pool.shutdown())
            {
                tracing::error!(error = %e, "failed to hand off worker pool shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{
        config::FanOut,
        registry::VendorRegistry,
        vendor::{BidAggregator, BidSource},
    };
    use bidrelay_core::{
        Bid, Result, VendorEndpoint,
        proto::store::{ProductQuery, ProductReply},
    };
    use core::time::Duration;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::{sync::oneshot, task::JoinHandle};
    use tonic::{Code, Status};

    /// Bids a price equal to the product name's length. Panics for the
    /// product `boom` and stalls briefly for `slow`.
    struct EchoVendors;

    #[tonic::async_trait]
    impl BidSource for EchoVendors {
        async fn fetch_bid(&self, product: &str, endpoint: &VendorEndpoint) -> Result<Bid> {
            if product == "boom" {
                panic!("vendor exploded");
            }
            if product == "slow" {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            Ok(Bid::new(endpoint.as_str(), product.len() as f64))
        }
    }

    struct Harness {
        inbound: mpsc::Sender<InboundCall>,
        stats: Arc<StoreStats>,
        pool: Arc<WorkerPool>,
        shutdown: CancellationToken,
        handle: JoinHandle<()>,
        _registry: NamedTempFile,
    }

    impl Harness {
        fn start(workers: usize) -> Self {
            let mut registry = NamedTempFile::new().unwrap();
            writeln!(registry, "vendorA\nvendorB").unwrap();

            let stats = Arc::new(StoreStats::default());
            let pool = Arc::new(WorkerPool::new(workers).unwrap());
            let processor = Arc::new(BidProcessor::new(
                VendorRegistry::new(registry.path()),
                BidAggregator::new(Arc::new(EchoVendors), FanOut::Concurrent),
                tokio::runtime::Handle::current(),
                Arc::clone(&stats),
            ));
            let (inbound, rx) = mpsc::channel(16);
            let shutdown = CancellationToken::new();
            let event_loop =
                EventLoop::new(rx, processor, Arc::clone(&pool), Arc::clone(&stats));
            let handle = tokio::spawn(event_loop.run(shutdown.clone()));

            Self {
                inbound,
                stats,
                pool,
                shutdown,
                handle,
                _registry: registry,
            }
        }

        async fn send(&self, product: &str) -> oneshot::Receiver<core::result::Result<ProductReply, Status>> {
            let (call, rx) = InboundCall::new(ProductQuery {
                product_name: product.to_owned(),
            });
            self.inbound.send(call).await.unwrap();
            rx
        }

        async fn stop(self) -> Arc<StoreStats> {
            self.shutdown.cancel();
            tokio::time::timeout(Duration::from_secs(5), self.handle)
                .await
                .expect("event loop did not stop")
                .unwrap();
            let pool = self.pool;
            tokio::task::spawn_blocking(move || pool.shutdown())
                .await
                .unwrap();
            self.stats
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn answers_every_request() {
        let harness = Harness::start(4);

        let mut pending = Vec::new();
        for product in ["a", "bb", "ccc", "dddd", "eeeee"] {
            pending.push((product.len(), harness.send(product).await));
        }
        for (len, rx) in pending {
            let reply = rx.await.unwrap().unwrap();
            let ids: Vec<_> = reply.products.iter().map(|p| p.vendor_id.as_str()).collect();
            assert_eq!(ids, ["vendorA", "vendorB"]);
            assert!(reply.products.iter().all(|p| p.price == len as f64));
        }

        let snapshot = harness.stop().await.snapshot();
        assert_eq!(snapshot.requests, 5);
        assert_eq!(snapshot.released, 5);
        assert_eq!(snapshot.inflight(), 0);
        assert_eq!(snapshot.dispatch_failures, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_request_fails_alone() {
        let harness = Harness::start(1);

        let exploded = harness.send("boom").await.await.unwrap().unwrap_err();
        assert_eq!(exploded.code(), Code::Aborted);

        let reply = harness.send("fine").await.await.unwrap().unwrap();
        assert_eq!(reply.products.len(), 2);

        let snapshot = harness.stop().await.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.released, 2);
        assert_eq!(snapshot.dispatch_failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn idle_loop_stops_on_shutdown() {
        let harness = Harness::start(1);
        let inbound = harness.inbound.clone();
        let snapshot = harness.stop().await.snapshot();

        assert_eq!(snapshot.requests, 0);
        let (call, _rx) = InboundCall::new(ProductQuery::default());
        assert!(inbound.send(call).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn loop_ends_when_handlers_are_gone() {
        let harness = Harness::start(1);
        let Harness {
            inbound, handle, ..
        } = harness;
        drop(inbound);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("event loop did not stop")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn last_pool_reference_is_shut_down_off_the_runtime() {
        let harness = Harness::start(1);
        let Harness {
            inbound,
            pool,
            handle,
            ..
        } = harness;

        let (release, gate) = std::sync::mpsc::channel::<()>();
        pool.submit(move || {
            let _ = gate.recv();
        })
        .unwrap();
        let weak = Arc::downgrade(&pool);
        drop(pool);
        drop(inbound);

        // The loop now owns the last pool reference, with a job still running.
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("event loop blocked on the worker pool")
            .unwrap();

        release.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while weak.upgrade().is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker pool was never shut down");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn aborted_loop_settles_in_flight_calls() {
        let harness = Harness::start(1);
        let _reply = harness.send("slow").await;
        while harness.stats.snapshot().requests == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(harness.stats.snapshot().inflight(), 1);

        harness.handle.abort();
        let Harness { handle, stats, .. } = harness;
        assert!(handle.await.unwrap_err().is_cancelled());

        assert_eq!(stats.snapshot().inflight(), 0);
    }
}
