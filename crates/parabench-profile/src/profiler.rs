//! Communication Profiler - Measurement Window Control
//!
//! [`CommProfiler`] is a cheap handle onto one shared [`ProfilingSession`].
//! The [`ProfilingBackend`](crate::ProfilingBackend) decorator holds a clone
//! and records into it only while the profiler is started; outside a window
//! collectives pass straight through to the wrapped backend.
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ProfileError, ProfileResult};
use crate::report::CommStats;
use crate::session::{PendingCollective, ProfilingSession};

// =============================================================================
// Shared State
// =============================================================================

#[derive(Debug, Default)]
struct ProfilerState {
    session: Mutex<ProfilingSession>,
    active: AtomicBool,
}

// =============================================================================
// CommProfiler
// =============================================================================

/// Profiler of collective traffic for one process.
///
/// Clones share the same session. Only one window may be open at a time.
#[derive(Debug, Clone, Default)]
pub struct CommProfiler {
    state: Arc<ProfilerState>,
}

impl CommProfiler {
    /// Creates a stopped profiler with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a measurement window.
    pub fn start(&self) -> ProfileResult<()> {
        if self.state.active.swap(true, Ordering::AcqRel) {
            return Err(ProfileError::InvalidState(
                "profiler already started".to_string(),
            ));
        }
        debug!("communication profiler started");
        Ok(())
    }

    /// Closes the measurement window and returns the accumulated totals.
    ///
    /// Collectives still outstanding keep their busy span open; it is not
    /// part of the returned time.
    pub fn stop(&self) -> ProfileResult<CommStats> {
        if !self.state.active.swap(false, Ordering::AcqRel) {
            return Err(ProfileError::InvalidState("profiler not started".to_string()));
        }
        let session = self.state.session.lock();
        if session.running_ops() > 0 {
            warn!(
                running_ops = session.running_ops(),
                "profiler stopped with collectives still outstanding"
            );
        }
        let stats = session.stats();
        debug!(count = stats.count, volume = stats.volume, time = stats.time, "communication profiler stopped");
        Ok(stats)
    }

    /// Zeroes the session. Call between windows to keep them independent.
    pub fn reset(&self) {
        self.state.session.lock().reset();
    }

    /// Starts a window that is stopped when the returned guard drops.
    pub fn window(&self) -> ProfileResult<ProfileWindow> {
        self.start()?;
        Ok(ProfileWindow {
            profiler: self.clone(),
            finished: false,
        })
    }

    /// Whether a window is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }

    /// Collectives issued and not yet completed.
    #[must_use]
    pub fn running_ops(&self) -> usize {
        self.state.session.lock().running_ops()
    }

    /// Current totals without closing the window.
    #[must_use]
    pub fn stats(&self) -> CommStats {
        self.state.session.lock().stats()
    }

    /// Records an issued collective if a window is open.
    ///
    /// Returns whether the collective was recorded; only recorded collectives
    /// may later be passed to [`complete`](Self::complete).
    pub(crate) fn issue(&self, pending: &PendingCollective) -> bool {
        if !self.is_active() {
            return false;
        }
        debug!(
            kind = %pending.kind,
            volume = pending.byte_volume,
            is_async = pending.is_async,
            "collective issued"
        );
        self.state.session.lock().issue(pending);
        true
    }

    /// Records the completion of a previously recorded collective.
    pub(crate) fn complete(&self) {
        self.state.session.lock().complete();
    }
}

// =============================================================================
// ProfileWindow
// =============================================================================

/// RAII guard for a profiling window.
///
/// Dropping the guard stops the profiler, so every exit path closes the
/// window. Use [`finish`](Self::finish) to obtain the totals.
#[derive(Debug)]
pub struct ProfileWindow {
    profiler: CommProfiler,
    finished: bool,
}

impl ProfileWindow {
    /// Stops the profiler and returns the window's totals.
    pub fn finish(mut self) -> ProfileResult<CommStats> {
        self.finished = true;
        self.profiler.stop()
    }

    /// The profiler this window belongs to.
    #[must_use]
    pub fn profiler(&self) -> &CommProfiler {
        &self.profiler
    }
}

impl Drop for ProfileWindow {
    fn drop(&mut self) {
        if !self.finished && self.profiler.is_active() {
            if let Err(e) = self.profiler.stop() {
                warn!(error = %e, "failed to close profiling window");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
