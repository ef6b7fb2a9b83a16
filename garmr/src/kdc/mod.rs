//! The KDC front end: replay suppression and request dispatch.
//!
//! # Overview
//!
//! The two types to start with are [ReplayCache] and [Dispatcher]. A
//! [ReplayCache] answers "have we already served this exact packet?" and
//! keeps the reply around to re-send; a [Dispatcher] runs every inbound
//! packet through that cache, classifies the misses by message family and
//! routes them to a [RequestHandler]. Only replies that were actually
//! produced get cached, so error paths stay retryable.
//!
//! # Example
//!
//! A minimal round trip with the echoing test handler; the second delivery
//! of the same packet is answered from the cache without touching the
//! handler again.
//!
//! ```
//! use garmr::config::KdcConfig;
//! use garmr::kdc::Dispatcher;
//! use garmr::msgs::TGS_REQ_TAG;
//! use garmr::testutils::{client_addr, EchoHandler};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut kdc = Dispatcher::new(&KdcConfig::default(), EchoHandler::default());
//!
//! let pkt = [TGS_REQ_TAG, 1, 2, 3];
//! let first = kdc.dispatch(&pkt, client_addr())?;
//! let second = kdc.dispatch(&pkt, client_addr())?;
//!
//! assert_eq!(first, second);
//! assert_eq!(kdc.cache.stats().hits, 1);
//! assert_eq!(kdc.handler.processed, 1);
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod lookaside;

pub use dispatch::{Dispatcher, RequestHandler};
pub use lookaside::{murmur3_32, InsertError, LookasideStats, ReplayCache};
