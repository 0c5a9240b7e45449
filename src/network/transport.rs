//! Process-wide transport runtime
//!
//! Subscribers refuse to bind while the transport is shut down.

use crate::runtime::{InitOutcome, RuntimeFlag, ShutdownOutcome};

static TRANSPORT: RuntimeFlag = RuntimeFlag::new("pipe transport");

pub fn initialize() -> InitOutcome {
    TRANSPORT.initialize()
}

pub fn shutdown() -> ShutdownOutcome {
    TRANSPORT.shutdown()
}

pub fn is_active() -> bool {
    TRANSPORT.is_active()
}

/// The flag behind [`initialize`] and [`shutdown`].
pub fn runtime() -> &'static RuntimeFlag {
    &TRANSPORT
}
