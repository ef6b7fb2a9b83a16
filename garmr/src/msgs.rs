//! Data structures representing the messages going over the wire.
//!
//! The KDC never parses a packet before deciding what it is: every message
//! family starts with a distinctive first byte (the outermost DER
//! APPLICATION tag, or the bare protocol version for the legacy v4 format),
//! so [MessageKind::classify] is a single-byte, non-mutating peek. Full
//! decoding is the codec's job (see [crate::codec]); this module only models
//! the structures the dispatcher and the request builder pass around.

use std::ops::{BitOr, BitOrAssign};

use crate::creds::{AuthData, Checksum, EType, Keyblock, PrincipalName};
use crate::time::Timestamp;
use crate::GarmrError;

// WIRE TAGS /////////////////////////////////////

/// First byte of an AS-REQ (DER APPLICATION 10, constructed).
pub const AS_REQ_TAG: u8 = 0x6a;
/// First byte of an AS-REP (DER APPLICATION 11, constructed).
pub const AS_REP_TAG: u8 = 0x6b;
/// First byte of a TGS-REQ (DER APPLICATION 12, constructed).
pub const TGS_REQ_TAG: u8 = 0x6c;
/// First byte of a TGS-REP (DER APPLICATION 13, constructed).
pub const TGS_REP_TAG: u8 = 0x6d;
/// First byte of an AP-REQ (DER APPLICATION 14, constructed).
pub const AP_REQ_TAG: u8 = 0x6e;
/// First byte of an encoded ticket (DER APPLICATION 1, constructed).
pub const TICKET_TAG: u8 = 0x61;
/// First byte of a legacy version-4 message: the protocol version itself.
pub const V4_VERSION_TAG: u8 = 4;

// CLASSIFICATION ////////////////////////////////

/// Recognized request families.
#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum MessageKind {
    /// Ticket-granting-service request.
    TgsReq,
    /// Initial-authentication request.
    AsReq,
    /// Legacy version-4 request, only honored when compatibility mode is on.
    V4Request,
}

impl MessageKind {
    /// Classify a raw packet by its first byte.
    ///
    /// Cheap and non-mutating; does not validate anything beyond the tag.
    pub fn classify(pkt: &[u8]) -> Result<Self, GarmrError> {
        // TGS-REQs are the most common traffic, so test for them first.
        match pkt.first().copied().ok_or(GarmrError::EmptyRequest)? {
            TGS_REQ_TAG => Ok(MessageKind::TgsReq),
            AS_REQ_TAG => Ok(MessageKind::AsReq),
            V4_VERSION_TAG => Ok(MessageKind::V4Request),
            tag => Err(GarmrError::UnrecognizedMessage(tag)),
        }
    }
}

// OPTION FLAGS //////////////////////////////////

/// AP-REQ option flags (RFC 4120 bit layout).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub struct ApOptions(pub u32);

impl ApOptions {
    pub const NONE: ApOptions = ApOptions(0);
    /// The ticket is encrypted in the session key (user-to-user); the
    /// caller must supply that ticket, it cannot be fetched.
    pub const USE_SESSION_KEY: ApOptions = ApOptions(0x4000_0000);
    pub const MUTUAL_REQUIRED: ApOptions = ApOptions(0x2000_0000);

    pub fn contains(self, other: ApOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ApOptions {
    type Output = ApOptions;

    fn bitor(self, rhs: ApOptions) -> ApOptions {
        ApOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for ApOptions {
    fn bitor_assign(&mut self, rhs: ApOptions) {
        self.0 |= rhs.0;
    }
}

/// KDC option flags requested for a ticket (RFC 4120 bit layout).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub struct KdcOptions(pub u32);

impl KdcOptions {
    pub const NONE: KdcOptions = KdcOptions(0);
    pub const FORWARDABLE: KdcOptions = KdcOptions(0x4000_0000);
    pub const RENEWABLE: KdcOptions = KdcOptions(0x0080_0000);
    pub const ENC_TKT_IN_SKEY: KdcOptions = KdcOptions(0x0000_0008);

    pub fn contains(self, other: KdcOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for KdcOptions {
    type Output = KdcOptions;

    fn bitor(self, rhs: KdcOptions) -> KdcOptions {
        KdcOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for KdcOptions {
    fn bitor_assign(&mut self, rhs: KdcOptions) {
        self.0 |= rhs.0;
    }
}

// MESSAGE BODIES ////////////////////////////////

/// An encrypted message part: which key protects it and the ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedData {
    pub etype: EType,
    /// Version of the key that produced the ciphertext.
    pub kvno: u32,
    pub ciphertext: Vec<u8>,
}

/// The authenticator a client builds to prove possession of the session key.
///
/// `client`, `checksum` and `authorization_data` are borrowed from the
/// caller's records; the authenticator never owns them and therefore cannot
/// free them. The `subkey` is the one owned field, a per-request key copy
/// that is wiped on drop.
#[derive(Clone, Debug)]
pub struct Authenticator<'a> {
    pub client: &'a PrincipalName,
    pub checksum: Option<&'a Checksum>,
    pub subkey: Option<Keyblock>,
    pub seq_number: i32,
    pub authorization_data: Option<&'a [AuthData]>,
    /// Client-side timestamp, whole seconds.
    pub ctime: Timestamp,
    /// Microseconds within `ctime`.
    pub cusec: u32,
}

/// Everything that goes into the final AP-REQ encoding: the options, the
/// (decoded) ticket, and the encrypted authenticator.
#[derive(Debug)]
pub struct ApReqParts<'a, T> {
    pub ap_options: ApOptions,
    pub ticket: &'a T,
    pub authenticator: EncryptedData,
}
