//! Wall-clock time as the KDC and its clients see it.
//!
//! Kerberos protocol timestamps are whole seconds since the Unix epoch,
//! with a separate microsecond field where sub-second precision matters
//! (the authenticator's `cusec`). Everything that needs the current time
//! takes it from a [Clock] so tests can substitute a scripted one; see
//! [crate::testutils::TestClock].

use std::fmt;
use std::time::SystemTime;

/// Seconds since the Unix epoch. Signed, so that differences between two
/// timestamps are well defined even when a clock is set backwards.
pub type Timestamp = i64;

/// Source of the current time.
pub trait Clock: fmt::Debug + Send {
    /// Current time in whole seconds.
    fn now(&self) -> Timestamp;

    /// Current time as seconds plus the microseconds within that second.
    fn now_us(&self) -> (Timestamp, u32) {
        (self.now(), 0)
    }
}

/// [Clock] backed by [SystemTime].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        self.now_us().0
    }

    fn now_us(&self) -> (Timestamp, u32) {
        match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
            Ok(d) => (d.as_secs() as Timestamp, d.subsec_micros()),
            // Host clock sits before the epoch; keep the sign so that
            // timestamp arithmetic still holds.
            Err(e) => (
                -(e.duration().as_secs() as Timestamp),
                e.duration().subsec_micros(),
            ),
        }
    }
}
