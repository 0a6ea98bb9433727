//! Coarse speaking signal derived from session events
//!
//! Direct sample analysis can be blocked by the platform without an error,
//! leaving the sampler reporting near-zero amplitude forever. This flag is
//! fed from discrete speaking notifications instead and always reflects the
//! last event seen. No smoothing.

use std::sync::atomic::{AtomicBool, Ordering};

/// Level-triggered "remote peer is vocalizing" flag
///
/// Written from the event domain and read from the frame loop, so both sides
/// go through an atomic and never block each other.
#[derive(Debug, Default)]
pub struct FallbackActivity {
    active: AtomicBool,
}

impl FallbackActivity {
    /// Create an inactive flag
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    /// Record the latest speaking notification
    pub fn set_active(&self, active: bool) {
        let previous = self.active.swap(active, Ordering::AcqRel);
        if previous != active {
            tracing::trace!(active, "fallback activity changed");
        }
    }

    /// Whether the remote peer was last reported as speaking
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Update from an active-speaker list
    ///
    /// Active iff any listed participant is someone other than `local_identity`.
    pub fn set_from_speakers<S: AsRef<str>>(&self, participant_ids: &[S], local_identity: &str) {
        let remote_speaking = participant_ids
            .iter()
            .any(|id| id.as_ref() != local_identity);
        self.set_active(remote_speaking);
    }
}
