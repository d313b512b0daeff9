//! Process-wide configuration of the synchronization layer.
//!
//! The configuration is built once with [`SynchConfigBuilder`] during system
//! setup and installed before the first primitive is created. Primitives that
//! are created before anything is installed see [`SynchConfig::default`].

use crate::KernelError;
use std::sync::OnceLock;

/// The number of readers an [`RwLock`] admits concurrently before new readers
/// are forced to wait.
///
/// [`RwLock`]: crate::sync::RwLock
pub const DEFAULT_READER_ADMISSION_CAP: usize = 10;

bitflags::bitflags! {
    /// Selects which primitive classes log their acquire/release traffic.
    ///
    /// Tracing is emitted at debug level after the primitive's spinlock has
    /// been dropped.
    pub struct TraceFlags: u8 {
        /// Trace [`Semaphore`](crate::sync::Semaphore) wait/signal.
        const SEMAPHORE = 1 << 0;
        /// Trace [`Lock`](crate::sync::Lock) acquire/release.
        const LOCK = 1 << 1;
        /// Trace [`ConditionVariable`](crate::sync::ConditionVariable) traffic.
        const CONDVAR = 1 << 2;
        /// Trace [`RwLock`](crate::sync::RwLock) admission and hand-off.
        const RWLOCK = 1 << 3;
    }
}

/// System-wide settings of the synchronization layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchConfig {
    /// Reader admission cap for newly created reader-writer locks.
    pub reader_admission_cap: usize,
    /// Which primitive classes emit trace messages.
    pub trace: TraceFlags,
}

impl Default for SynchConfig {
    fn default() -> Self {
        Self {
            reader_admission_cap: DEFAULT_READER_ADMISSION_CAP,
            trace: TraceFlags::empty(),
        }
    }
}

static CONFIG: OnceLock<SynchConfig> = OnceLock::new();

/// The [`SynchConfigBuilder`] struct provides an interface for configuring
/// the synchronization layer before the system starts using it.
///
/// # Example
/// ```
/// use synch::config::{SynchConfigBuilder, TraceFlags};
///
/// let config = SynchConfigBuilder::new()
///     .reader_admission_cap(4)
///     .trace(TraceFlags::RWLOCK)
///     .build()
///     .unwrap();
/// assert_eq!(config.reader_admission_cap, 4);
/// ```
#[derive(Debug, Default)]
pub struct SynchConfigBuilder {
    config: SynchConfig,
}

impl SynchConfigBuilder {
    /// Starts from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many readers a reader-writer lock admits concurrently.
    pub fn reader_admission_cap(mut self, cap: usize) -> Self {
        self.config.reader_admission_cap = cap;
        self
    }

    /// Sets which primitive classes emit trace messages.
    pub fn trace(mut self, flags: TraceFlags) -> Self {
        self.config.trace = flags;
        self
    }

    /// Validates and returns the configuration without installing it.
    ///
    /// # Errors
    /// [`KernelError::InvalidArgument`] if the reader admission cap is zero,
    /// which would make every reader wait forever.
    pub fn build(self) -> Result<SynchConfig, KernelError> {
        if self.config.reader_admission_cap == 0 {
            return Err(KernelError::InvalidArgument);
        }
        Ok(self.config)
    }

    /// Validates the configuration and installs it system-wide.
    ///
    /// # Errors
    /// [`KernelError::InvalidArgument`] as for [`build`], and
    /// [`KernelError::Busy`] if a configuration is already in effect.
    ///
    /// [`build`]: Self::build
    pub fn install(self) -> Result<(), KernelError> {
        install(self.build()?)
    }
}

/// Installs `config` system-wide.
///
/// # Errors
/// [`KernelError::Busy`] if a configuration is already in effect, including
/// the default one that [`current`] falls back to.
pub fn install(config: SynchConfig) -> Result<(), KernelError> {
    CONFIG.set(config).map_err(|_| KernelError::Busy)
}

/// Returns the configuration in effect.
pub fn current() -> &'static SynchConfig {
    CONFIG.get_or_init(SynchConfig::default)
}

/// Whether acquire/release traffic of `class` should be logged.
#[inline]
pub(crate) fn traced(class: TraceFlags) -> bool {
    current().trace.intersects(class)
}
