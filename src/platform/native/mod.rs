mod clock;
#[cfg(any(unix, windows))]
mod poller;
mod udp;

pub use clock::MonotonicClock;
pub use udp::*;
