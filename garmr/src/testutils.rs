//! Helpers used in tests, benches and examples.
//!
//! Scripted stand-ins for every collaborator seam: a settable [Clock], an
//! echoing [RequestHandler], a length-prefixed [MessageCodec], an XOR
//! [CryptoBackend] whose "encryption" tests can undo, and a canned
//! [CredentialSource]. None of this is useful outside of test setups.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use rand::Rng;
use zeroize::Zeroize;

use crate::codec::{self, MessageCodec};
use crate::creds::{self, CredentialSource, Credentials, EType, KeyType, Keyblock, PrincipalName};
use crate::crypto::{self, CryptoBackend, PreparedKey};
use crate::kdc::RequestHandler;
use crate::msgs::{
    ApOptions, ApReqParts, Authenticator, KdcOptions, AP_REQ_TAG, AS_REP_TAG, TGS_REP_TAG,
    TICKET_TAG,
};
use crate::time::{Clock, Timestamp};
use crate::Result;

/// The address test packets pretend to come from.
pub fn client_addr() -> SocketAddr {
    ([127, 0, 0, 1], 8088).into()
}

// CLOCK /////////////////////////////////////////

/// A [Clock] that only moves when the test says so.
#[derive(Clone, Debug, Default)]
pub struct TestClock(Arc<AtomicI64>);

impl TestClock {
    pub fn new(start: Timestamp) -> Self {
        TestClock(Arc::new(AtomicI64::new(start)))
    }

    /// Move the clock by `delta` seconds; negative moves it backward.
    pub fn advance(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set(&self, now: Timestamp) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        self.0.load(Ordering::SeqCst)
    }
}

// HANDLER ///////////////////////////////////////

/// [RequestHandler] that answers every request with the request itself,
/// re-tagged as the matching reply. Counts calls and fails on demand.
#[derive(Debug, Default)]
pub struct EchoHandler {
    /// Make decode calls fail.
    pub fail_decode: bool,
    /// Make process calls fail.
    pub fail_process: bool,
    /// Decode calls so far, both families.
    pub decoded: u32,
    /// Process calls so far, all families.
    pub processed: u32,
}

impl EchoHandler {
    fn decode(&mut self, pkt: &[u8]) -> Result<Vec<u8>, codec::Error> {
        self.decoded += 1;
        if self.fail_decode {
            return Err(codec::Error::UnexpectedTag(
                pkt.first().copied().unwrap_or(0),
            ));
        }
        Ok(pkt.to_vec())
    }

    fn process(&mut self, req: Vec<u8>, reply_tag: u8) -> Result<Vec<u8>> {
        self.processed += 1;
        if self.fail_process {
            return Err(anyhow!("handler scripted to fail").into());
        }
        let mut reply = req;
        reply[0] = reply_tag;
        Ok(reply)
    }
}

impl RequestHandler for EchoHandler {
    type Req = Vec<u8>;

    fn decode_as_req(&mut self, pkt: &[u8]) -> Result<Vec<u8>, codec::Error> {
        self.decode(pkt)
    }

    fn decode_tgs_req(&mut self, pkt: &[u8]) -> Result<Vec<u8>, codec::Error> {
        self.decode(pkt)
    }

    fn process_as_req(&mut self, req: Vec<u8>, _from: SocketAddr) -> Result<Vec<u8>> {
        self.process(req, AS_REP_TAG)
    }

    fn process_tgs_req(&mut self, req: Vec<u8>, _from: SocketAddr) -> Result<Vec<u8>> {
        self.process(req, TGS_REP_TAG)
    }

    fn process_v4(&mut self, pkt: &[u8], _from: SocketAddr) -> Result<Vec<u8>> {
        self.processed += 1;
        if self.fail_process {
            return Err(anyhow!("handler scripted to fail").into());
        }
        // Legacy replies are the packet reversed; good enough to tell apart.
        Ok(pkt.iter().rev().copied().collect())
    }
}

// CODEC /////////////////////////////////////////

/// Decoded ticket used by [TestCodec]: just the bytes it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestTicket(pub Vec<u8>);

/// Decoded form of what [TestCodec::encode_ap_req] produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedApReq {
    pub ap_options: ApOptions,
    pub ticket: Vec<u8>,
    pub etype: EType,
    pub kvno: u32,
    pub ciphertext: Vec<u8>,
}

/// Deterministic, length-prefixed stand-in for the DER codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct TestCodec;

fn put_bytes(out: &mut Vec<u8>, b: &[u8]) {
    out.extend_from_slice(&(b.len() as u32).to_le_bytes());
    out.extend_from_slice(b);
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], codec::Error> {
    if buf.len() < n {
        return Err(codec::Error::Truncated {
            need: n,
            have: buf.len(),
        });
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn take_u16(buf: &mut &[u8]) -> Result<u16, codec::Error> {
    let b = take(buf, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn take_u32(buf: &mut &[u8]) -> Result<u32, codec::Error> {
    let b = take(buf, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn take_bytes(buf: &mut &[u8]) -> Result<Vec<u8>, codec::Error> {
    let len = take_u32(buf)? as usize;
    Ok(take(buf, len)?.to_vec())
}

impl MessageCodec for TestCodec {
    type Ticket = TestTicket;

    fn decode_ticket(&self, der: &[u8]) -> Result<TestTicket, codec::Error> {
        match der.first() {
            None => Err(codec::Error::Truncated { need: 1, have: 0 }),
            Some(&TICKET_TAG) => Ok(TestTicket(der.to_vec())),
            Some(&tag) => Err(codec::Error::UnexpectedTag(tag)),
        }
    }

    fn encode_authenticator(&self, a: &Authenticator) -> Result<Vec<u8>, codec::Error> {
        let mut out = Vec::new();
        put_bytes(&mut out, a.client.realm.as_bytes());
        out.extend_from_slice(&(a.client.components.len() as u32).to_le_bytes());
        for comp in &a.client.components {
            put_bytes(&mut out, comp.as_bytes());
        }
        match a.checksum {
            Some(ck) => {
                out.push(1);
                out.extend_from_slice(&ck.cksumtype.to_le_bytes());
                put_bytes(&mut out, &ck.contents);
            }
            None => out.push(0),
        }
        match &a.subkey {
            Some(k) => {
                out.push(1);
                out.extend_from_slice(&k.keytype.0.to_le_bytes());
                match k.etype {
                    Some(e) => {
                        out.push(1);
                        out.extend_from_slice(&e.0.to_le_bytes());
                    }
                    None => out.push(0),
                }
                put_bytes(&mut out, &k.contents);
            }
            None => out.push(0),
        }
        out.extend_from_slice(&a.seq_number.to_le_bytes());
        let authdata = a.authorization_data.unwrap_or(&[]);
        out.extend_from_slice(&(authdata.len() as u32).to_le_bytes());
        for ad in authdata {
            out.extend_from_slice(&ad.ad_type.to_le_bytes());
            put_bytes(&mut out, &ad.contents);
        }
        out.extend_from_slice(&a.ctime.to_le_bytes());
        out.extend_from_slice(&a.cusec.to_le_bytes());
        Ok(out)
    }

    fn encode_ap_req(&self, req: &ApReqParts<TestTicket>) -> Result<Vec<u8>, codec::Error> {
        let mut out = vec![AP_REQ_TAG];
        out.extend_from_slice(&req.ap_options.0.to_le_bytes());
        put_bytes(&mut out, &req.ticket.0);
        out.extend_from_slice(&req.authenticator.etype.0.to_le_bytes());
        out.extend_from_slice(&req.authenticator.kvno.to_le_bytes());
        put_bytes(&mut out, &req.authenticator.ciphertext);
        Ok(out)
    }
}

impl TestCodec {
    /// Inverse of [TestCodec::encode_ap_req], for inspecting built requests.
    pub fn decode_ap_req(&self, buf: &[u8]) -> Result<DecodedApReq, codec::Error> {
        let buf = &mut &buf[..];
        let tag = take(buf, 1)?[0];
        if tag != AP_REQ_TAG {
            return Err(codec::Error::UnexpectedTag(tag));
        }
        let ap_options = ApOptions(take_u32(buf)?);
        let ticket = take_bytes(buf)?;
        let etype = EType(take_u16(buf)?);
        let kvno = take_u32(buf)?;
        let ciphertext = take_bytes(buf)?;
        Ok(DecodedApReq {
            ap_options,
            ticket,
            etype,
            kvno,
            ciphertext,
        })
    }
}

// CRYPTO ////////////////////////////////////////

/// Key type the fixtures use.
pub const TEST_KEYTYPE: KeyType = KeyType(18);
/// The one encryption type [XorBackend] implements.
pub const TEST_ETYPE: EType = EType(18);
/// Block size [XorBackend] pads to.
pub const TEST_BLOCK_LEN: usize = 16;

/// [CryptoBackend] built on a keyed XOR stream.
///
/// Worthless as cryptography, ideal for tests: encryption is its own
/// inverse, so tests can undo it with [xor_keystream] and inspect the
/// padded plaintext that went in.
#[derive(Debug, Default)]
pub struct XorBackend {
    /// Make prepare_key hand out keys whose encrypt call fails.
    pub fail_encrypt: bool,
    key_drops: Arc<AtomicU32>,
}

impl XorBackend {
    /// Counter of [PreparedKey] releases across all keys this backend has
    /// prepared.
    pub fn prepared_key_drops(&self) -> Arc<AtomicU32> {
        self.key_drops.clone()
    }
}

impl CryptoBackend for XorBackend {
    fn supports_keytype(&self, keytype: KeyType) -> bool {
        keytype == TEST_KEYTYPE
    }

    fn default_etype(&self, _keytype: KeyType) -> EType {
        TEST_ETYPE
    }

    fn supports_etype(&self, etype: EType) -> bool {
        etype == TEST_ETYPE
    }

    fn ciphertext_len(&self, _etype: EType, plain_len: usize) -> usize {
        plain_len.div_ceil(TEST_BLOCK_LEN).max(1) * TEST_BLOCK_LEN
    }

    fn prepare_key(
        &self,
        _etype: EType,
        key: &Keyblock,
    ) -> Result<Box<dyn PreparedKey>, crypto::Error> {
        if key.contents.is_empty() {
            return Err(crypto::Error::BadKeyLength(0));
        }
        Ok(Box::new(XorKey {
            key: key.contents.clone(),
            fail: self.fail_encrypt,
            drops: self.key_drops.clone(),
        }))
    }

    fn generate_subkey(&self, base: &Keyblock) -> Result<Keyblock, crypto::Error> {
        let mut contents = vec![0u8; base.contents.len().max(TEST_BLOCK_LEN)];
        self.fill_random(&mut contents)?;
        Ok(Keyblock::new(base.keytype, base.etype, contents))
    }

    fn fill_random(&self, buf: &mut [u8]) -> Result<(), crypto::Error> {
        rand::thread_rng().fill(buf);
        Ok(())
    }
}

struct XorKey {
    key: Vec<u8>,
    fail: bool,
    drops: Arc<AtomicU32>,
}

impl PreparedKey for XorKey {
    fn encrypt(
        &self,
        plain: &[u8],
        cipher_out: &mut [u8],
        block_no: u64,
    ) -> Result<(), crypto::Error> {
        if self.fail {
            return Err(crypto::Error::EncryptionFailed("scripted failure"));
        }
        if cipher_out.len() < plain.len() {
            return Err(crypto::Error::OutputTooSmall {
                need: plain.len(),
                have: cipher_out.len(),
            });
        }
        let offset = block_no as usize * TEST_BLOCK_LEN;
        for (i, (&p, c)) in plain.iter().zip(cipher_out.iter_mut()).enumerate() {
            *c = p ^ self.key[(offset + i) % self.key.len()];
        }
        Ok(())
    }
}

impl Drop for XorKey {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
        self.key.zeroize();
    }
}

/// Apply [XorBackend]'s block-0 keystream; applying it twice round-trips.
pub fn xor_keystream(key: &[u8], data: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, &b)| b ^ key[i % key.len()])
        .collect()
}

// CREDENTIALS ///////////////////////////////////

/// Scripted [CredentialSource].
#[derive(Debug, Default)]
pub struct TestCredSource {
    /// get_credentials calls so far.
    pub calls: u32,
    /// Fail resolution (after mutating the record, as the real thing may).
    pub fail: bool,
    /// Ticket delivered into the credentials on success.
    pub ticket: Vec<u8>,
    /// Replacement session key delivered alongside the ticket, if set.
    pub keyblock: Option<Keyblock>,
}

impl TestCredSource {
    pub fn with_ticket(ticket: Vec<u8>) -> Self {
        TestCredSource {
            ticket,
            ..Default::default()
        }
    }
}

impl CredentialSource for TestCredSource {
    fn get_credentials(
        &mut self,
        _options: KdcOptions,
        creds: &mut Credentials,
    ) -> Result<(), creds::Error> {
        self.calls += 1;
        // Mutate up front: resolution updates what it can even when it
        // ultimately fails.
        creds.times.endtime = creds.times.authtime + 36_000;
        if self.fail {
            return Err(creds::Error::NotFound);
        }
        creds.ticket = self.ticket.clone();
        if let Some(kb) = &self.keyblock {
            creds.keyblock = kb.clone();
        }
        Ok(())
    }
}

// FIXTURES //////////////////////////////////////

/// A credential for alice with a session key installed and no ticket yet.
pub fn sample_credentials() -> Credentials {
    Credentials::new(
        PrincipalName::new("EXAMPLE.COM", &["alice"]),
        PrincipalName::new("EXAMPLE.COM", &["krbtgt", "EXAMPLE.COM"]),
        Keyblock::new(TEST_KEYTYPE, None, (0u8..32).collect()),
    )
}

/// Ticket bytes that pass [TestCodec::decode_ticket].
pub fn sample_ticket() -> Vec<u8> {
    let mut t = vec![TICKET_TAG];
    t.extend_from_slice(b"ticket for alice");
    t
}
