//! Credentials and the key material they carry.
//!
//! A [Credentials] record is what a client holds after talking to the KDC:
//! who it is, whom the ticket is for, the session [Keyblock] and the encoded
//! ticket itself. The record is deliberately dumb storage; fetching and
//! refreshing credentials is the job of a [CredentialSource] (a credential
//! cache backed by a TGS exchange, in a real deployment).

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::msgs::KdcOptions;
use crate::time::Timestamp;

/// Error kind for credential resolution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No credentials matching the request are available in the cache and
    /// none could be obtained.
    #[error("no matching credentials found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Key type identifier, e.g. which family of keys a [Keyblock] belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct KeyType(pub u16);

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encryption type identifier, selecting the cipher/padding scheme used to
/// protect a message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EType(pub u16);

impl fmt::Display for EType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw key material plus its type tags.
///
/// The key bytes are wiped when the block is dropped. `etype` is `None` when
/// the credential does not pin a particular encryption type; consumers then
/// fall back to the key type's default (see
/// [CryptoBackend::default_etype](crate::crypto::CryptoBackend::default_etype)).
#[derive(Clone)]
pub struct Keyblock {
    pub keytype: KeyType,
    pub etype: Option<EType>,
    pub contents: Vec<u8>,
}

impl Keyblock {
    pub fn new(keytype: KeyType, etype: Option<EType>, contents: Vec<u8>) -> Self {
        Keyblock {
            keytype,
            etype,
            contents,
        }
    }
}

impl Zeroize for Keyblock {
    fn zeroize(&mut self) {
        self.contents.zeroize();
    }
}

impl Drop for Keyblock {
    fn drop(&mut self) {
        self.contents.zeroize();
    }
}

impl ZeroizeOnDrop for Keyblock {}

impl fmt::Debug for Keyblock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyblock")
            .field("keytype", &self.keytype)
            .field("etype", &self.etype)
            .field("contents", &format_args!("<{} secret bytes>", self.contents.len()))
            .finish()
    }
}

/// A Kerberos principal: zero or more name components within a realm.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrincipalName {
    pub realm: String,
    pub components: Vec<String>,
}

impl PrincipalName {
    pub fn new(realm: impl Into<String>, components: &[&str]) -> Self {
        PrincipalName {
            realm: realm.into(),
            components: components.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl fmt::Display for PrincipalName {
    /// `comp1/comp2@REALM`, the conventional printed form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.components.join("/"), self.realm)
    }
}

/// A keyed checksum over caller-chosen data, carried inside an authenticator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checksum {
    pub cksumtype: u16,
    pub contents: Vec<u8>,
}

/// One element of a principal's authorization data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthData {
    pub ad_type: u16,
    pub contents: Vec<u8>,
}

/// Validity times of a ticket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TicketTimes {
    pub authtime: Timestamp,
    pub starttime: Timestamp,
    pub endtime: Timestamp,
    pub renew_till: Timestamp,
}

/// A credential: the ticket for one client/server pair and the session key
/// that goes with it.
///
/// `ticket` holds the encoded (wire-format) ticket and is empty until a
/// ticket has been obtained. `authdata` is copied into authenticators built
/// from this credential.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub client: PrincipalName,
    pub server: PrincipalName,
    pub keyblock: Keyblock,
    pub ticket: Vec<u8>,
    pub authdata: Vec<AuthData>,
    pub times: TicketTimes,
}

impl Credentials {
    /// A credential with no ticket yet; `ticket`, `authdata` and `times`
    /// start out empty.
    pub fn new(client: PrincipalName, server: PrincipalName, keyblock: Keyblock) -> Self {
        Credentials {
            client,
            server,
            keyblock,
            ticket: Vec::new(),
            authdata: Vec::new(),
            times: TicketTimes::default(),
        }
    }
}

/// Resolves credentials, normally against a credential cache with a TGS
/// exchange as fallback.
///
/// `get_credentials` fills in the missing fields of `creds` (at least the
/// ticket and session key). It may update `creds` with partial results even
/// when it returns an error; callers own the record and drop it as a whole
/// regardless of the outcome.
pub trait CredentialSource {
    fn get_credentials(
        &mut self,
        options: KdcOptions,
        creds: &mut Credentials,
    ) -> Result<(), Error>;
}
