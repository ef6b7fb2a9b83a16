//! Packet classification and dispatch.
//!
//! The dispatcher sits between the transport and the per-family request
//! processors. Every inbound packet passes three gates: the replay cache
//! (a hit short-circuits everything), classification by first byte, then
//! decode and processing by the installed [RequestHandler]. Only a
//! successfully computed reply is written back into the cache, so an
//! erroring request is reprocessed on every redelivery while a served one
//! is replay-suppressed.

use std::net::SocketAddr;

use log::{debug, info};

use crate::codec;
use crate::config::KdcConfig;
use crate::kdc::lookaside::ReplayCache;
use crate::msgs::{MessageKind, V4_VERSION_TAG};
use crate::{GarmrError, Result};

/// The processing seam between dispatch and the actual KDC logic.
///
/// The dispatcher only cares that packets can be decoded into `Req` and
/// processed into reply bytes; everything else about the exchange is the
/// handler's business.
pub trait RequestHandler {
    /// Decoded request representation, shared by both request families.
    type Req;

    fn decode_as_req(&mut self, pkt: &[u8]) -> Result<Self::Req, codec::Error>;
    fn decode_tgs_req(&mut self, pkt: &[u8]) -> Result<Self::Req, codec::Error>;

    fn process_as_req(&mut self, req: Self::Req, from: SocketAddr) -> Result<Vec<u8>>;
    fn process_tgs_req(&mut self, req: Self::Req, from: SocketAddr) -> Result<Vec<u8>>;

    /// Process a legacy version-4 packet. The default refuses it; only
    /// handlers that actually speak the legacy protocol override this.
    fn process_v4(&mut self, _pkt: &[u8], _from: SocketAddr) -> Result<Vec<u8>> {
        Err(GarmrError::UnrecognizedMessage(V4_VERSION_TAG))
    }
}

/// Ties the replay cache and a [RequestHandler] together.
#[derive(Debug)]
pub struct Dispatcher<H> {
    pub cache: ReplayCache,
    pub handler: H,
    /// Accept legacy version-4 packets; from [KdcConfig::allow_v4].
    pub allow_v4: bool,
}

impl<H: RequestHandler> Dispatcher<H> {
    pub fn new(config: &KdcConfig, handler: H) -> Self {
        Self {
            cache: ReplayCache::new(&config.lookaside),
            handler,
            allow_v4: config.allow_v4,
        }
    }

    /// Construct around an existing cache. Tests inject clocks this way.
    pub fn with_cache(cache: ReplayCache, handler: H, allow_v4: bool) -> Self {
        Self {
            cache,
            handler,
            allow_v4,
        }
    }

    /// Handle one inbound packet and return the reply to transmit.
    ///
    /// Exactly one of three things happens: the packet is answered from the
    /// replay cache; it is processed, cached and answered; or an error is
    /// returned and nothing is cached.
    pub fn dispatch(&mut self, pkt: &[u8], from: SocketAddr) -> Result<Vec<u8>> {
        if let Some(reply) = self.cache.lookup(pkt) {
            info!("replayed request from {from}, re-transmitting the stored reply");
            return Ok(reply);
        }

        let reply = match MessageKind::classify(pkt)? {
            MessageKind::TgsReq => {
                let req = self.handler.decode_tgs_req(pkt)?;
                self.handler.process_tgs_req(req, from)?
            }
            MessageKind::AsReq => {
                let req = self.handler.decode_as_req(pkt)?;
                self.handler.process_as_req(req, from)?
            }
            MessageKind::V4Request if self.allow_v4 => self.handler.process_v4(pkt, from)?,
            MessageKind::V4Request => {
                return Err(GarmrError::UnrecognizedMessage(V4_VERSION_TAG))
            }
        };

        // Best effort only: a reply we cannot cache is still a reply.
        if let Err(err) = self.cache.insert(pkt, Some(&reply)) {
            debug!("reply for {from} not cached: {err}");
        }

        Ok(reply)
    }
}
