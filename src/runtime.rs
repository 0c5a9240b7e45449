//! Process-wide runtime state for the transport and codec libraries
//!
//! Each runtime is initialized once when the module loads and shut down once
//! when it unloads. Repeated calls are reported, not repeated.

use std::sync::atomic::{AtomicBool, Ordering};

/// Result of [`RuntimeFlag::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Initialized,
    AlreadyInitialized,
}

/// Result of [`RuntimeFlag::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    ShutDown,
    AlreadyShutDown,
}

/// Idempotent on/off state of a process-scoped library.
pub struct RuntimeFlag {
    name: &'static str,
    active: AtomicBool,
}

impl RuntimeFlag {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            active: AtomicBool::new(false),
        }
    }

    pub fn initialize(&self) -> InitOutcome {
        if self.active.swap(true, Ordering::AcqRel) {
            tracing::info!("{} already initialized", self.name);
            InitOutcome::AlreadyInitialized
        } else {
            tracing::info!("Initialized {}", self.name);
            InitOutcome::Initialized
        }
    }

    pub fn shutdown(&self) -> ShutdownOutcome {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::info!("Shut down {}", self.name);
            ShutdownOutcome::ShutDown
        } else {
            tracing::info!("{} already shut down", self.name);
            ShutdownOutcome::AlreadyShutDown
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
