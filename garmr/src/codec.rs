//! Seam to the wire-format encoder/decoder.
//!
//! Tickets, authenticators and AP-REQ messages travel as DER in real
//! deployments; this crate treats their encoding as an external service and
//! only fixes the contract. A [MessageCodec] turns ticket bytes into a
//! structured ticket and structured records back into bytes. The associated
//! `Ticket` type keeps the decoded representation opaque to this crate.

use crate::msgs::{ApReqParts, Authenticator};

/// Error kind for encode/decode failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("buffer truncated: need {need} bytes, found {have}")]
    Truncated { need: usize, have: usize },

    #[error("unexpected tag {0:#04x}")]
    UnexpectedTag(u8),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Encoder/decoder for the message structures the request builder handles.
pub trait MessageCodec {
    /// Decoded ticket representation. Opaque here; the codec both produces
    /// it (from ticket bytes) and consumes it (when encoding an AP-REQ).
    type Ticket;

    /// Decode an encoded ticket.
    fn decode_ticket(&self, der: &[u8]) -> Result<Self::Ticket, Error>;

    /// Encode an authenticator into the plaintext that will be encrypted.
    fn encode_authenticator(&self, authenticator: &Authenticator) -> Result<Vec<u8>, Error>;

    /// Encode the complete AP-REQ message.
    fn encode_ap_req(&self, req: &ApReqParts<Self::Ticket>) -> Result<Vec<u8>, Error>;
}
