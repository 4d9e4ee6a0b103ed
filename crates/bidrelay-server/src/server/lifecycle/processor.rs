use super::completion::ReplyWriter;
use crate::server::{registry::VendorRegistry, stats::StoreStats, vendor::BidAggregator};
use bidrelay_core::proto::store::{ProductInfo, ProductQuery, ProductReply};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Turns one accepted query into a reply.
///
/// Runs on a pool thread: the registry is read from disk and the vendor
/// fan-out is driven on the server's runtime through [`Handle::block_on`],
/// so the thread is occupied for the whole request.
pub struct BidProcessor {
    registry: VendorRegistry,
    aggregator: BidAggregator,
    runtime: Handle,
    stats: Arc<StoreStats>,
}

impl BidProcessor {
    pub fn new(
        registry: VendorRegistry,
        aggregator: BidAggregator,
        runtime: Handle,
        stats: Arc<StoreStats>,
    ) -> Self {
        Self {
            registry,
            aggregator,
            runtime,
            stats,
        }
    }

    pub fn process(&self, query: ProductQuery, writer: ReplyWriter) {
        let span = tracing::info_span!(
            "get_products",
            tag = writer.tag(),
            product = %query.product_name
        );
        let _guard = span.enter();

        let reply = self.build_reply(&query.product_name);
        tracing::debug!(bids = reply.products.len(), "reply ready");
        writer.finish(Ok(reply));
    }

    /// Must not be called from inside the runtime.
    pub fn build_reply(&self, product_name: &str) -> ProductReply {
        // An unreadable registry is an empty one.
        let endpoints = self.registry.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "vendor registry unavailable");
            self.stats.registry_error();
            Vec::new()
        });

        let aggregation = self
            .runtime
            .block_on(self.aggregator.aggregate(product_name, &endpoints));

        for failure in &aggregation.failures {
            tracing::warn!(error = %failure, "skipping vendor");
            self.stats.vendor_failure();
        }
        self.stats.bids_returned(aggregation.bids.len());

        ProductReply {
            products: aggregation
                .bids
                .into_iter()
                .map(ProductInfo::from)
                .collect(),
        }
    }
}
