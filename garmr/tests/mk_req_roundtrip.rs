use garmr::codec::MessageCodec;
use garmr::creds::{AuthData, Checksum};
use garmr::mk_req::{ApReqParams, RequestBuilder};
use garmr::msgs::ApOptions;
use garmr::testutils::{
    sample_credentials, sample_ticket, xor_keystream, TestClock, TestCodec, TestCredSource,
    XorBackend, TEST_BLOCK_LEN, TEST_ETYPE,
};
use garmr::GarmrError;

#[test]
fn built_request_decodes_back_to_its_inputs() -> anyhow::Result<()> {
    let clock = TestClock::new(1_700_000_000);
    let builder = RequestBuilder::with_clock(XorBackend::default(), TestCodec, Box::new(clock));
    let mut ccache = TestCredSource::default();

    let mut creds = sample_credentials();
    creds.ticket = sample_ticket();
    creds.authdata = vec![AuthData {
        ad_type: 1,
        contents: b"restricted".to_vec(),
    }];
    let session_key = creds.keyblock.contents.clone();

    let checksum = Checksum {
        cksumtype: 7,
        contents: vec![9; 16],
    };
    let params = ApReqParams {
        ap_options: ApOptions::MUTUAL_REQUIRED,
        checksum: Some(&checksum),
        sequence: 42,
        want_subkey: true,
        want_authenticator: true,
        ..Default::default()
    };

    let res = builder.mk_req_extended(params, &mut ccache, &mut creds)?;

    let decoded = TestCodec.decode_ap_req(&res.request)?;
    assert_eq!(decoded.ap_options, ApOptions::MUTUAL_REQUIRED);
    assert_eq!(decoded.ticket, sample_ticket());
    assert_eq!(decoded.etype, TEST_ETYPE);
    // The key version is always stamped 0; peers have to cope.
    assert_eq!(decoded.kvno, 0);

    // The backend XORs with the session key, so undoing it exposes the
    // padded plaintext: the encoded authenticator plus an all-zero tail.
    let padded = xor_keystream(&session_key, &decoded.ciphertext);
    assert_eq!(padded.len() % TEST_BLOCK_LEN, 0);

    let auth = res
        .authenticator
        .as_ref()
        .expect("the authenticator was requested");
    let replayed = TestCodec.encode_authenticator(auth)?;
    assert_eq!(&padded[..replayed.len()], &replayed[..]);
    assert!(padded[replayed.len()..].iter().all(|&b| b == 0));

    // The subkey sealed into the authenticator is a copy of the returned one.
    let returned = res.subkey.as_ref().expect("a subkey was requested");
    let sealed = auth
        .subkey
        .as_ref()
        .expect("the authenticator carries the subkey");
    assert_eq!(sealed.contents, returned.contents);
    assert_eq!(auth.ctime, 1_700_000_000);
    assert_eq!(auth.seq_number, 42);

    // The ticket was there all along, so nothing was fetched.
    assert_eq!(ccache.calls, 0);
    Ok(())
}

#[test]
fn use_session_key_without_a_ticket_fails_before_any_fetch() {
    let builder = RequestBuilder::new(XorBackend::default(), TestCodec);
    let mut ccache = TestCredSource::with_ticket(sample_ticket());
    let mut creds = sample_credentials(); // no ticket yet

    let params = ApReqParams {
        ap_options: ApOptions::USE_SESSION_KEY,
        ..Default::default()
    };
    let err = builder
        .mk_req_extended(params, &mut ccache, &mut creds)
        .unwrap_err();
    assert!(matches!(err, GarmrError::NoTicketSupplied));
    assert_eq!(ccache.calls, 0);
}

#[test]
fn missing_ticket_is_fetched_from_the_credential_source() -> anyhow::Result<()> {
    let builder = RequestBuilder::new(XorBackend::default(), TestCodec);
    let mut ccache = TestCredSource::with_ticket(sample_ticket());
    let mut creds = sample_credentials();

    let res = builder.mk_req_extended(ApReqParams::default(), &mut ccache, &mut creds)?;
    let decoded = TestCodec.decode_ap_req(&res.request)?;
    assert_eq!(decoded.ticket, sample_ticket());
    drop(res);

    assert_eq!(ccache.calls, 1);
    assert_eq!(creds.ticket, sample_ticket());

    // The ticket is in place now, so building again does not fetch.
    let _ = builder.mk_req_extended(ApReqParams::default(), &mut ccache, &mut creds)?;
    assert_eq!(ccache.calls, 1);
    Ok(())
}

#[test]
fn credential_errors_propagate_after_mutating_the_record() {
    let builder = RequestBuilder::new(XorBackend::default(), TestCodec);
    let mut ccache = TestCredSource::with_ticket(sample_ticket());
    ccache.fail = true;
    let mut creds = sample_credentials();
    assert_eq!(creds.times.endtime, 0);

    let err = builder
        .mk_req_extended(ApReqParams::default(), &mut ccache, &mut creds)
        .unwrap_err();
    assert!(matches!(err, GarmrError::Creds(_)));

    // Resolution touched the record before failing; the caller owns the
    // whole record regardless of the outcome.
    assert_eq!(ccache.calls, 1);
    assert_eq!(creds.times.endtime, 36_000);
    assert!(creds.ticket.is_empty());
}
