use jobmatch_vector_store::CollectionKind;
use parking_lot::Mutex;
use serde::Serialize;

/// What a `rebuild_index` call ended up doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebuildOutcome {
    /// A new snapshot is now current
    Published {
        collection: CollectionKind,
        version: u64,
        records: usize,
        duration_ms: u64,
    },
    /// A rebuild was already running; it will make one more pass that covers this request
    Coalesced { collection: CollectionKind },
    /// The current snapshot already reflects the metadata table
    Unchanged {
        collection: CollectionKind,
        version: u64,
    },
}

impl RebuildOutcome {
    #[must_use]
    pub const fn collection(&self) -> CollectionKind {
        match self {
            Self::Published { collection, .. }
            | Self::Coalesced { collection }
            | Self::Unchanged { collection, .. } => *collection,
        }
    }

    #[must_use]
    pub const fn published_version(&self) -> Option<u64> {
        match self {
            Self::Published { version, .. } => Some(*version),
            Self::Coalesced { .. } | Self::Unchanged { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    running: bool,
    pending: bool,
}

/// Per-collection rebuild lock that coalesces concurrent requests.
///
/// At most one rebuild runs per slot. Requests arriving while it runs set a single
/// pending flag, so any number of them cost exactly one extra pass.
#[derive(Debug, Default)]
pub(crate) struct RebuildSlot {
    state: Mutex<SlotState>,
}

impl RebuildSlot {
    /// Claim the slot, or register a pending request and return `None`.
    pub(crate) fn begin(&self) -> Option<RebuildGuard<'_>> {
        let mut state = self.state.lock();
        if state.running {
            state.pending = true;
            return None;
        }
        state.running = true;
        state.pending = false;
        Some(RebuildGuard {
            slot: self,
            active: true,
        })
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

pub(crate) struct RebuildGuard<'a> {
    slot: &'a RebuildSlot,
    active: bool,
}

impl RebuildGuard<'_> {
    /// Consume a pending request if one arrived; otherwise release the slot.
    ///
    /// Checking and releasing happen under one lock so no request is lost in between.
    pub(crate) fn take_pending(&mut self) -> bool {
        let mut state = self.slot.state.lock();
        if state.pending {
            state.pending = false;
            return true;
        }
        state.running = false;
        self.active = false;
        false
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            self.slot.state.lock().running = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_during_a_rebuild_coalesce_into_one_pass() {
        let slot = RebuildSlot::default();
        let mut guard = slot.begin().expect("first caller runs");
        assert!(slot.begin().is_none());
        assert!(slot.begin().is_none());
        assert!(slot.is_running());

        assert!(guard.take_pending());
        assert!(!guard.take_pending());
        assert!(!slot.is_running());
        drop(guard);

        assert!(slot.begin().is_some());
    }

    #[test]
    fn dropping_guard_after_error_releases_slot() {
        let slot = RebuildSlot::default();
        {
            let _guard = slot.begin().unwrap();
            assert!(slot.begin().is_none());
        }
        assert!(!slot.is_running());
        let mut guard = slot.begin().unwrap();
        assert!(!guard.take_pending());
    }
}
