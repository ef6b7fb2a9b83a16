#![no_main]
extern crate garmr;

use libfuzzer_sys::fuzz_target;

use garmr::config::KdcConfig;
use garmr::kdc::Dispatcher;
use garmr::testutils::{client_addr, EchoHandler};

fuzz_target!(|pkt: &[u8]| {
    let config = KdcConfig {
        allow_v4: true,
        ..Default::default()
    };
    let mut kdc = Dispatcher::new(&config, EchoHandler::default());

    // We expect errors while fuzzing therefore we do not check the result.
    let _ = kdc.dispatch(pkt, client_addr());

    // Delivering the same packet twice exercises the replay path.
    let _ = kdc.dispatch(pkt, client_addr());
});
