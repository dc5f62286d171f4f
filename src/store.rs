use std::collections::{BTreeSet, HashMap};

use crate::ir::ClassId;
use crate::variant::Unit;

/// Instantiated-class sets keyed by abstraction unit. Sets only ever grow.
#[derive(Clone, Debug, Default)]
pub struct UnitStore {
    sets: HashMap<Unit, BTreeSet<ClassId>>,
    facts: usize,
}

impl UnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, unit: Unit, class: ClassId) -> bool {
        self.sets
            .get(&unit)
            .is_some_and(|classes| classes.contains(&class))
    }

    /// Add `class` to `unit`, returning whether the set changed.
    pub fn update(&mut self, unit: Unit, class: ClassId) -> bool {
        let changed = self.sets.entry(unit).or_default().insert(class);
        if changed {
            self.facts += 1;
        }
        changed
    }

    /// Snapshot of the classes currently tracked for `unit`.
    pub fn classes_in(&self, unit: Unit) -> Vec<ClassId> {
        self.sets
            .get(&unit)
            .map(|classes| classes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of (unit, class) facts recorded so far.
    pub fn total_facts(&self) -> usize {
        self.facts
    }
}
