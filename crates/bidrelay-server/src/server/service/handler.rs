//! gRPC service implementation for product bid lookups.
//!
//! This module defines [`StoreService`], the concrete implementation of the
//! [`Store`] gRPC service. Handlers do no work of their own: each
//! `getProducts` request is handed to the event loop, which runs it on the
//! worker pool and writes the reply back through a oneshot channel.
//!
//! ## Responsibilities
//!
//! - Spawn the worker pool and the event loop task.
//! - Forward requests to the event loop and await their replies.
//! - Refuse new requests and drain in-flight ones on shutdown.

use crate::server::{
    config::ServerConfig,
    lifecycle::{BidProcessor, EventLoop, InboundCall},
    registry::VendorRegistry,
    stats::StoreStats,
    vendor::{BidAggregator, BidSource, GrpcVendorClient},
};
use bidrelay_core::{
    Error,
    proto::store::{ProductQuery, ProductReply, store_server::Store},
};
use bidrelay_pool::WorkerPool;
use std::{sync::Arc, thread};
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

/// Bid-aggregation gRPC service.
///
/// Cloning is cheap; all clones share one event loop and one worker pool.
#[derive(Clone)]
pub struct StoreService {
    config: ServerConfig,
    inbound: mpsc::Sender<InboundCall>,
    pool: Arc<WorkerPool>,
    stats: Arc<StoreStats>,
    shutdown_token: CancellationToken,
    event_loop: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl StoreService {
    /// Creates the service with a gRPC vendor client.
    ///
    /// Must be called from within a Tokio runtime; the event loop is spawned
    /// onto it and pool workers drive vendor calls through its handle.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let client = GrpcVendorClient::new(config.vendor_timeout);
        Self::with_bid_source(config, Arc::new(client))
    }

    /// Creates the service with a custom [`BidSource`].
    pub fn with_bid_source(
        config: ServerConfig,
        source: Arc<dyn BidSource>,
    ) -> anyhow::Result<Self> {
        let runtime = Handle::try_current()?;
        let stats = Arc::new(StoreStats::default());
        let pool = Arc::new(WorkerPool::with_name(config.num_workers, "bidrelay-worker")?);

        let processor = Arc::new(BidProcessor::new(
            VendorRegistry::new(config.vendor_registry.clone()),
            BidAggregator::new(source, config.fan_out),
            runtime.clone(),
            Arc::clone(&stats),
        ));

        let (inbound, rx) = mpsc::channel(config.inbound_buffer_size);
        let shutdown_token = CancellationToken::new();
        let event_loop = EventLoop::new(rx, processor, Arc::clone(&pool), Arc::clone(&stats));
        let handle = runtime.spawn(event_loop.run(shutdown_token.clone()));

        Ok(Self {
            config,
            inbound,
            pool,
            stats,
            shutdown_token,
            event_loop: Arc::new(tokio::sync::Mutex::new(Some(handle))),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<StoreStats> {
        &self.stats
    }

    /// Initiates a graceful shutdown.
    ///
    /// New requests are refused immediately. The whole shutdown is bounded
    /// by `shutdown_timeout`: accepted requests get that long to finish
    /// before the event loop is aborted, and whatever remains of it is spent
    /// draining and joining the worker pool. A pool still busy when the
    /// budget runs out is left to finish on its own thread. Calling this
    /// more than once is harmless.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.shutdown_token.cancel();

        let Some(mut handle) = self.event_loop.lock().await.take() else {
            return Ok(());
        };
        let deadline = Instant::now() + self.config.shutdown_timeout;

        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "event loop task failed"),
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.config.shutdown_timeout,
                    "in-flight requests did not finish in time; aborting event loop"
                );
                handle.abort();
                // Wait for the aborted loop to be dropped so its abandoned
                // calls are settled.
                let _ = handle.await;
            }
        }

        let (joined_tx, joined) = oneshot::channel();
        let pool = Arc::clone(&self.pool);
        thread::Builder::new()
            .name("bidrelay-pool-shutdown".into())
            .spawn(move || {
                pool.shutdown();
                let _ = joined_tx.send(());
            })
            .map_err(|e| Error::ChannelError {
                context: format!("Worker pool shutdown failed to start: {e}"),
            })?;

        match tokio::time::timeout_at(deadline, joined).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(Error::ChannelError {
                    context: "Worker pool shutdown thread panicked".into(),
                });
            }
            Err(_) => tracing::warn!(
                pending = self.pool.stats().pending,
                "worker pool still busy at shutdown deadline; leaving it to finish"
            ),
        }

        tracing::info!(stats = ?self.stats.snapshot(), "store service stopped");
        Ok(())
    }
}

#[tonic::async_trait]
impl Store for StoreService {
    /// Relays a product lookup to every registered vendor.
    ///
    /// Always answers `OK` with whatever bids were collected, in registry
    /// order; vendors that fail are left out. Only a service that is
    /// shutting down answers `UNAVAILABLE`.
    async fn get_products(
        &self,
        req: Request<ProductQuery>,
    ) -> Result<Response<ProductReply>, Status> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown.into());
        }

        let (call, reply) = InboundCall::new(req.into_inner());
        self.inbound
            .send(call)
            .await
            .map_err(|_| Status::from(Error::ServiceShutdown))?;

        match reply.await {
            Ok(result) => result.map(Response::new),
            Err(_) => Err(Error::ServiceShutdown.into()),
        }
    }
}
