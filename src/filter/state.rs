//! Filter state and the echo suppressor
//!
//! `FilterState` is exclusively owned by its control and mutated only through
//! [`FilterState::apply_active`]. The suppressor is an id-based set equality:
//! reordering a selection is not a change, and a non-change produces no state
//! update, no broadcast, and no re-render.

use crate::registry::{RegistryError, RuleRef};
use std::collections::HashSet;
use tracing::trace;

/// Registry load state machine, re-entered on every qualifying notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// No load in flight; also the state after a failed load
    Idle,
    /// A fetch is outstanding
    Loading,
    /// The last started load completed and was applied
    Loaded,
}

/// Selection state owned by one filter control
#[derive(Debug)]
pub struct FilterState {
    /// Enabled rules as of the last applied registry load
    pub(crate) rules: Vec<RuleRef>,
    /// Rules currently applied as filter criteria (always a subset of `rules`
    /// once the initial reconciliation has run)
    pub(crate) active: Vec<RuleRef>,
    pub(crate) phase: LoadPhase,
    /// Last registry failure, cleared by the next successful load
    pub(crate) last_error: Option<RegistryError>,
}

impl FilterState {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            active: Vec::new(),
            phase: LoadPhase::Idle,
            last_error: None,
        }
    }

    pub fn rules(&self) -> &[RuleRef] {
        &self.rules
    }

    pub fn active(&self) -> &[RuleRef] {
        &self.active
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&RegistryError> {
        self.last_error.as_ref()
    }

    /// Rules available for selection: loaded rules minus the active set
    pub fn suggestions(&self) -> Vec<RuleRef> {
        let active_ids: HashSet<&str> = self.active.iter().map(|r| r.id.as_str()).collect();
        self.rules
            .iter()
            .filter(|r| !active_ids.contains(r.id.as_str()))
            .cloned()
            .collect()
    }

    /// Single mutation entry point for the active set
    ///
    /// Returns false (and leaves the state untouched) when `next` holds the
    /// same id set as the current selection, in any order.
    pub fn apply_active(&mut self, next: Vec<RuleRef>) -> bool {
        if same_id_set(&next, &self.active) {
            trace!("Active rule set unchanged, suppressing");
            return false;
        }
        self.active = next;
        true
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

/// Order-independent, id-based set equality between two selections
pub fn same_id_set(a: &[RuleRef], b: &[RuleRef]) -> bool {
    let ids_a: HashSet<&str> = a.iter().map(|r| r.id.as_str()).collect();
    let ids_b: HashSet<&str> = b.iter().map(|r| r.id.as_str()).collect();
    ids_a == ids_b
}
