//! Outbox relay: ships committed announcements to the broker.
//!
//! The relay is the only writer of `processed` and `retries` on outbox
//! rows. It polls rather than being push-notified, so a publish failure
//! costs nothing but the next sweep.

mod relay;
mod thread;

pub use relay::{OutboxRelay, RelayStats};
pub use thread::OutboxRelayThread;
