use std::collections::{BTreeSet, HashMap};

use crate::ir::{CallSiteId, ClassId, MethodId};
use crate::variant::Unit;

/// Call edges parked until a receiver class becomes instantiated in a unit.
#[derive(Clone, Debug, Default)]
pub struct PendingEdges {
    table: HashMap<(ClassId, Unit), BTreeSet<(CallSiteId, MethodId)>>,
}

impl PendingEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an edge; returns false when the same entry is already parked.
    pub fn register(&mut self, class: ClassId, unit: Unit, site: CallSiteId, callee: MethodId) -> bool {
        self.table
            .entry((class, unit))
            .or_default()
            .insert((site, callee))
    }

    /// Remove and return every edge parked under `(class, unit)`.
    pub fn take(&mut self, class: ClassId, unit: Unit) -> Vec<(CallSiteId, MethodId)> {
        self.table
            .remove(&(class, unit))
            .map(|entries| entries.into_iter().collect())
            .unwrap_or_default()
    }

    /// Number of edges still waiting.
    pub fn len(&self) -> usize {
        self.table.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
