use garmr::config::LookasideConfig;
use garmr::kdc::{Dispatcher, ReplayCache};
use garmr::msgs::{AS_REP_TAG, AS_REQ_TAG, TGS_REP_TAG, TGS_REQ_TAG, V4_VERSION_TAG};
use garmr::testutils::{client_addr, EchoHandler, TestClock};
use garmr::GarmrError;

fn setup_logging() {
    use std::io::Write;
    let mut log_builder = env_logger::Builder::from_default_env(); // sets log level filter from environment (or defaults)
    log_builder.filter_level(log::LevelFilter::Debug);
    log_builder.format_timestamp_nanos();
    log_builder.format(|buf, record| {
        let ts_format = buf.timestamp_nanos().to_string();
        writeln!(buf, "{}: {}", &ts_format[14..], record.args())
    });

    let _ = log_builder.try_init();
}

fn echo_kdc(clock: &TestClock, allow_v4: bool) -> Dispatcher<EchoHandler> {
    let cache = ReplayCache::with_clock(&LookasideConfig::default(), Box::new(clock.clone()));
    Dispatcher::with_cache(cache, EchoHandler::default(), allow_v4)
}

#[test]
fn processed_once_then_replayed() {
    setup_logging();
    let clock = TestClock::new(5_000);
    let mut kdc = echo_kdc(&clock, false);

    let pkt = [TGS_REQ_TAG, 0xde, 0xad, 0xbe, 0xef];
    let first = kdc.dispatch(&pkt, client_addr()).unwrap();
    assert_eq!(first[0], TGS_REP_TAG);
    assert_eq!(&first[1..], &pkt[1..]);

    // The retransmission is served from the cache, handler untouched.
    let second = kdc.dispatch(&pkt, client_addr()).unwrap();
    assert_eq!(second, first);
    assert_eq!(kdc.handler.processed, 1);
    assert_eq!(kdc.handler.decoded, 1);

    let stats = kdc.cache.stats();
    assert_eq!(stats.calls, 2);
    assert_eq!(stats.hits, 1);
}

#[test]
fn distinct_requests_each_get_processed() {
    let clock = TestClock::new(5_000);
    let mut kdc = echo_kdc(&clock, false);

    let as_req = [AS_REQ_TAG, 1];
    let tgs_req = [TGS_REQ_TAG, 1];
    let as_rep = kdc.dispatch(&as_req, client_addr()).unwrap();
    let tgs_rep = kdc.dispatch(&tgs_req, client_addr()).unwrap();

    assert_eq!(as_rep[0], AS_REP_TAG);
    assert_eq!(tgs_rep[0], TGS_REP_TAG);
    assert_eq!(kdc.handler.processed, 2);
    assert_eq!(kdc.cache.len(), 2);
}

#[test]
fn handler_errors_are_not_cached() {
    let clock = TestClock::new(5_000);
    let mut kdc = echo_kdc(&clock, false);
    kdc.handler.fail_process = true;

    let pkt = [TGS_REQ_TAG, 7];
    assert!(kdc.dispatch(&pkt, client_addr()).is_err());
    assert!(kdc.cache.is_empty());

    // Once the handler recovers, the same packet is processed for real.
    kdc.handler.fail_process = false;
    let reply = kdc.dispatch(&pkt, client_addr()).unwrap();
    assert_eq!(reply[0], TGS_REP_TAG);
    assert_eq!(kdc.handler.processed, 2);
    assert_eq!(kdc.cache.len(), 1);
}

#[test]
fn decode_errors_surface_uncached() {
    let clock = TestClock::new(5_000);
    let mut kdc = echo_kdc(&clock, false);
    kdc.handler.fail_decode = true;

    let pkt = [AS_REQ_TAG, 9, 9];
    match kdc.dispatch(&pkt, client_addr()) {
        Err(GarmrError::Codec(_)) => {}
        other => panic!("expected a codec error, got {other:?}"),
    }
    // Decoding failed before processing; nothing processed, nothing cached.
    assert_eq!(kdc.handler.decoded, 1);
    assert_eq!(kdc.handler.processed, 0);
    assert!(kdc.cache.is_empty());

    kdc.handler.fail_decode = false;
    kdc.dispatch(&pkt, client_addr()).unwrap();
    assert_eq!(kdc.handler.decoded, 2);
    assert_eq!(kdc.handler.processed, 1);
}

#[test]
fn unclassifiable_packets_are_refused() {
    let clock = TestClock::new(5_000);
    let mut kdc = echo_kdc(&clock, false);

    match kdc.dispatch(&[0x30, 1, 2], client_addr()) {
        Err(GarmrError::UnrecognizedMessage(tag)) => assert_eq!(tag, 0x30),
        other => panic!("expected UnrecognizedMessage, got {other:?}"),
    }
    assert!(matches!(
        kdc.dispatch(&[], client_addr()),
        Err(GarmrError::EmptyRequest)
    ));
    assert!(kdc.cache.is_empty());
    assert_eq!(kdc.handler.processed, 0);
}

#[test]
fn legacy_traffic_is_gated_by_configuration() {
    let clock = TestClock::new(5_000);
    let pkt = [V4_VERSION_TAG, 3, 2, 1];

    // Gate closed: refused before the handler ever sees the packet.
    let mut kdc = echo_kdc(&clock, false);
    assert!(matches!(
        kdc.dispatch(&pkt, client_addr()),
        Err(GarmrError::UnrecognizedMessage(tag)) if tag == V4_VERSION_TAG
    ));
    assert_eq!(kdc.handler.processed, 0);

    // Gate open: handled, and replay-suppressed like any other request.
    let mut kdc = echo_kdc(&clock, true);
    let reply = kdc.dispatch(&pkt, client_addr()).unwrap();
    assert_eq!(reply, [1, 2, 3, V4_VERSION_TAG]);
    let again = kdc.dispatch(&pkt, client_addr()).unwrap();
    assert_eq!(again, reply);
    assert_eq!(kdc.handler.processed, 1);
}

#[test]
fn stale_replies_stop_being_replayed_after_the_next_insert() {
    setup_logging();
    let clock = TestClock::new(50_000);
    let mut kdc = echo_kdc(&clock, false);

    let a = [TGS_REQ_TAG, 1];
    let b = [TGS_REQ_TAG, 2];
    let c = [TGS_REQ_TAG, 3];
    kdc.dispatch(&a, client_addr()).unwrap();
    kdc.dispatch(&b, client_addr()).unwrap();
    kdc.dispatch(&c, client_addr()).unwrap();
    assert_eq!(kdc.cache.len(), 3);

    clock.advance(121);

    // A fresh request sweeps the three stale entries out on insert.
    let d = [TGS_REQ_TAG, 4];
    kdc.dispatch(&d, client_addr()).unwrap();
    assert_eq!(kdc.cache.len(), 1);
    assert_eq!(kdc.handler.processed, 4);

    // The old request is processed anew; the fresh one still replays.
    kdc.dispatch(&a, client_addr()).unwrap();
    assert_eq!(kdc.handler.processed, 5);
    kdc.dispatch(&d, client_addr()).unwrap();
    assert_eq!(kdc.handler.processed, 5);
}
