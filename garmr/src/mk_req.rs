//! Building authenticated application requests (AP-REQs).
//!
//! An AP-REQ is what a client presents to a service: the ticket it got from
//! the KDC plus a freshly built authenticator, encrypted in the ticket's
//! session key, proving the client actually holds that key. Producing one
//! is a pipeline — fetch the ticket if missing, decode it, optionally
//! generate a subkey, encode the authenticator, pad and encrypt it, encode
//! the final message — and every stage owns buffers that must be released
//! exactly once on every exit path, with the key-bearing ones wiped.
//! Plaintext stages live in [Zeroizing] buffers and the prepared key
//! releases itself on drop, so the unwind discipline is the same whether a
//! stage fails or the whole pipeline succeeds.
//!
//! ```
//! use garmr::mk_req::{ApReqParams, RequestBuilder};
//! use garmr::msgs::ApOptions;
//! use garmr::testutils::{sample_credentials, sample_ticket, TestCodec, TestCredSource, XorBackend};
//!
//! # fn main() -> anyhow::Result<()> {
//! let builder = RequestBuilder::new(XorBackend::default(), TestCodec);
//! let mut ccache = TestCredSource::with_ticket(sample_ticket());
//! let mut creds = sample_credentials();
//!
//! let params = ApReqParams {
//!     ap_options: ApOptions::MUTUAL_REQUIRED,
//!     want_subkey: true,
//!     ..Default::default()
//! };
//! let res = builder.mk_req_extended(params, &mut ccache, &mut creds)?;
//! assert!(!res.request.is_empty());
//! assert!(res.subkey.is_some());
//! # Ok(())
//! # }
//! ```

use zeroize::Zeroizing;

use crate::codec::MessageCodec;
use crate::creds::{Checksum, CredentialSource, Credentials, Keyblock};
use crate::crypto::CryptoBackend;
use crate::msgs::{ApOptions, ApReqParts, Authenticator, EncryptedData, KdcOptions};
use crate::time::{Clock, SystemClock};
use crate::{GarmrError, Result};

/// Caller-tunable knobs for one [RequestBuilder::mk_req_extended] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApReqParams<'a> {
    pub ap_options: ApOptions,
    /// Application checksum over caller-chosen data, carried inside the
    /// authenticator. Borrowed; never released here.
    pub checksum: Option<&'a Checksum>,
    /// Forwarded to credential resolution when the ticket must be fetched.
    pub kdc_options: KdcOptions,
    /// Initial sequence number for the session.
    pub sequence: i32,
    /// Generate a fresh subkey and seal it into the authenticator.
    pub want_subkey: bool,
    /// Hand the populated authenticator back in the result.
    pub want_authenticator: bool,
}

/// What a successful build hands back.
#[derive(Debug)]
pub struct MkReqResult<'a> {
    /// The encoded AP-REQ, ready for the wire.
    pub request: Vec<u8>,
    /// The generated subkey, when one was requested. The service's reply
    /// will be protected with this, so the caller needs its own copy.
    pub subkey: Option<Keyblock>,
    /// The authenticator exactly as it was encrypted, when requested.
    pub authenticator: Option<Authenticator<'a>>,
}

/// Builds AP-REQs from credentials, against a pluggable crypto backend and
/// wire codec.
#[derive(Debug)]
pub struct RequestBuilder<B, C> {
    backend: B,
    codec: C,
    clock: Box<dyn Clock>,
}

impl<B: CryptoBackend, C: MessageCodec> RequestBuilder<B, C> {
    pub fn new(backend: B, codec: C) -> Self {
        Self::with_clock(backend, codec, Box::new(SystemClock))
    }

    /// Construct with an explicit clock. Tests pin `ctime` this way.
    pub fn with_clock(backend: B, codec: C, clock: Box<dyn Clock>) -> Self {
        Self {
            backend,
            codec,
            clock,
        }
    }

    /// Build an AP-REQ for `creds`, fetching the ticket through `ccache`
    /// first if the record does not hold one yet.
    ///
    /// `ccache.get_credentials` may fill in fields of `creds` even when it
    /// fails; the caller owns the record and drops it as a whole either
    /// way. On success the result borrows from `creds`, so the record stays
    /// untouchable until the result is dropped.
    ///
    /// # Panic & Safety
    ///
    /// Panics if the backend reports a
    /// [ciphertext_len](CryptoBackend::ciphertext_len) shorter than the
    /// plaintext, which violates the [CryptoBackend] contract.
    pub fn mk_req_extended<'a, S: CredentialSource>(
        &self,
        params: ApReqParams<'a>,
        ccache: &mut S,
        creds: &'a mut Credentials,
    ) -> Result<MkReqResult<'a>> {
        // A user-to-user exchange runs on the session key of a ticket the
        // caller already holds; there is nothing we could fetch for them.
        if params.ap_options.contains(ApOptions::USE_SESSION_KEY) && creds.ticket.is_empty() {
            return Err(GarmrError::NoTicketSupplied);
        }

        if creds.ticket.is_empty() {
            ccache.get_credentials(params.kdc_options, creds)?;
        }
        let creds: &'a Credentials = creds;

        let keytype = creds.keyblock.keytype;
        if !self.backend.supports_keytype(keytype) {
            return Err(GarmrError::UnsupportedKeyType(keytype));
        }
        let etype = creds
            .keyblock
            .etype
            .unwrap_or_else(|| self.backend.default_etype(keytype));
        if !self.backend.supports_etype(etype) {
            return Err(GarmrError::UnsupportedEType(etype));
        }

        let ticket = self.codec.decode_ticket(&creds.ticket)?;

        let subkey = if params.want_subkey {
            Some(self.backend.generate_subkey(&creds.keyblock)?)
        } else {
            None
        };

        let (ctime, cusec) = self.clock.now_us();
        let authenticator = Authenticator {
            client: &creds.client,
            checksum: params.checksum,
            subkey: subkey.clone(),
            seq_number: params.sequence,
            authorization_data: (!creds.authdata.is_empty()).then_some(creds.authdata.as_slice()),
            ctime,
            cusec,
        };

        let plain = Zeroizing::new(self.codec.encode_authenticator(&authenticator)?);

        // Keep the record for the caller or drop it here, never both. A
        // drop releases only the owned subkey copy; the borrowed fields
        // stay with the caller by construction.
        let authenticator = params.want_authenticator.then_some(authenticator);

        // Pad to the cipher's block rule with a fresh zero-filled buffer so
        // the tail never carries stray heap bytes.
        let padded_len = self.backend.ciphertext_len(etype, plain.len());
        assert!(
            padded_len >= plain.len(),
            "backend reported ciphertext_len {padded_len} for a {} byte plaintext",
            plain.len()
        );
        let mut padded = Zeroizing::new(vec![0u8; padded_len]);
        padded[..plain.len()].copy_from_slice(&plain);
        drop(plain);

        let mut ciphertext = vec![0u8; padded_len];
        let key = self.backend.prepare_key(etype, &creds.keyblock)?;
        key.encrypt(&padded, &mut ciphertext, 0)?;
        // The plaintext has served its purpose; wipe it before anything
        // else can go wrong, then release the key context.
        drop(padded);
        drop(key);

        let request = self.codec.encode_ap_req(&ApReqParts {
            ap_options: params.ap_options,
            ticket: &ticket,
            authenticator: EncryptedData {
                etype,
                // Not settable by callers yet; peers must accept 0 here.
                kvno: 0,
                ciphertext,
            },
        })?;

        Ok(MkReqResult {
            request,
            subkey,
            authenticator,
        })
    }
}
