//! # Bid and Vendor Endpoint Types
//!
//! - [`Bid`] - One vendor's answer for one product: who quoted and at what
//!   price. Converts from the wire [`BidReply`] and into the wire
//!   [`ProductInfo`].
//! - [`VendorEndpoint`] - The network address of one vendor, as read from the
//!   registry. Immutable once loaded, so the same set can be shared by any
//!   number of in-flight requests.

use crate::proto::{store::ProductInfo, vendor::BidReply};
use core::fmt;

/// A single vendor quote.
#[derive(Clone, Debug, PartialEq)]
pub struct Bid {
    pub vendor_id: String,
    pub price: f64,
}

impl Bid {
    pub fn new(vendor_id: impl Into<String>, price: f64) -> Self {
        Self {
            vendor_id: vendor_id.into(),
            price,
        }
    }
}

impl From<BidReply> for Bid {
    fn from(reply: BidReply) -> Self {
        Self {
            vendor_id: reply.vendor_id,
            price: reply.price,
        }
    }
}

impl From<Bid> for ProductInfo {
    fn from(bid: Bid) -> Self {
        Self {
            price: bid.price,
            vendor_id: bid.vendor_id,
        }
    }
}

impl From<Bid> for BidReply {
    fn from(bid: Bid) -> Self {
        Self {
            price: bid.price,
            vendor_id: bid.vendor_id,
        }
    }
}

/// Network address of one bidding vendor (`host:port`, optionally with a
/// scheme).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VendorEndpoint {
    address: String,
}

impl VendorEndpoint {
    /// Parses one registry line. Surrounding whitespace is ignored and blank
    /// lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let address = line.trim();
        if address.is_empty() {
            None
        } else {
            Some(Self {
                address: address.to_owned(),
            })
        }
    }

    /// The address exactly as it appeared in the registry.
    pub fn as_str(&self) -> &str {
        &self.address
    }

    /// The address as a URI suitable for a gRPC channel. Bare `host:port`
    /// addresses are assumed to speak plaintext HTTP/2.
    pub fn uri(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        }
    }
}

impl fmt::Display for VendorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_blank_lines() {
        assert_eq!(VendorEndpoint::parse(""), None);
        assert_eq!(VendorEndpoint::parse("   \t"), None);
        let endpoint = VendorEndpoint::parse("  vendorA:9001\r").unwrap();
        assert_eq!(endpoint.as_str(), "vendorA:9001");
        assert_eq!(endpoint.to_string(), "vendorA:9001");
    }

    #[test]
    fn uri_adds_scheme_only_when_missing() {
        let bare = VendorEndpoint::parse("127.0.0.1:9001").unwrap();
        assert_eq!(bare.uri(), "http://127.0.0.1:9001");

        let https = VendorEndpoint::parse("https://vendor.example:443").unwrap();
        assert_eq!(https.uri(), "https://vendor.example:443");
    }

    #[test]
    fn bid_converts_to_wire_types() {
        let bid = Bid::from(BidReply {
            price: 10.0,
            vendor_id: "A".into(),
        });
        assert_eq!(bid, Bid::new("A", 10.0));

        let info = ProductInfo::from(bid);
        assert_eq!(info.vendor_id, "A");
        assert_eq!(info.price, 10.0);
    }
}
