use std::collections::{BTreeSet, HashMap};

use crate::hierarchy::ClassHierarchy;
use crate::ir::{ClassId, MemberId, MethodId, MethodRef};

#[derive(Clone, Debug, Default)]
struct CacheEntry {
    targets: Vec<(ClassId, MethodId)>,
    callees: BTreeSet<MethodId>,
}

/// Memoized virtual dispatch keyed by (declared class, member).
///
/// For each key the cache stores every concrete subtype paired with the method
/// it dispatches to, plus the callees that have actually been linked so far.
#[derive(Clone, Debug, Default)]
pub struct DispatchCache {
    entries: HashMap<(ClassId, MemberId), CacheEntry>,
    hits: usize,
    misses: usize,
}

impl DispatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete receiver classes of `target` and their dispatched methods.
    ///
    /// Subtypes without a concrete implementation are dropped.
    pub fn targets(&mut self, hierarchy: &ClassHierarchy<'_>, target: &MethodRef) -> &[(ClassId, MethodId)] {
        let key = (target.class, target.member);
        if self.entries.contains_key(&key) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let targets = hierarchy
                .concrete_subtypes_of(target.class)
                .iter()
                .filter_map(|class| hierarchy.dispatch(*class, target).map(|method| (*class, method)))
                .collect();
            self.entries.insert(
                key,
                CacheEntry {
                    targets,
                    callees: BTreeSet::new(),
                },
            );
        }
        &self.entries[&key].targets
    }

    /// Remember that `callee` has been linked for `target`.
    pub fn record(&mut self, target: &MethodRef, callee: MethodId) {
        self.entries
            .entry((target.class, target.member))
            .or_default()
            .callees
            .insert(callee);
    }

    /// Every declared target with at least one linked callee, ordered by target.
    pub fn resolved(&self) -> Vec<(MethodRef, Vec<MethodId>)> {
        let mut resolved: Vec<(MethodRef, Vec<MethodId>)> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.callees.is_empty())
            .map(|((class, member), entry)| {
                let target = MethodRef {
                    class: *class,
                    member: *member,
                };
                (target, entry.callees.iter().copied().collect())
            })
            .collect();
        resolved.sort();
        resolved
    }

    /// Total number of linked callees across all targets.
    pub fn callee_count(&self) -> usize {
        self.entries.values().map(|entry| entry.callees.len()).sum()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Program;

    #[test]
    fn dispatch_is_computed_once_per_key() {
        let mut program = Program::new();
        let animal = program.add_class("Animal");
        program.class_mut(animal).is_interface = true;
        let speak = program.add_method(animal, "speak", Vec::new(), None);
        program.method_mut(speak).is_abstract = true;
        let dog = program.add_class("Dog");
        program.class_mut(dog).interfaces.push(animal);
        let dog_speak = program.add_method(dog, "speak", Vec::new(), None);
        let rock = program.add_class("Rock");
        program.class_mut(rock).interfaces.push(animal);

        let hierarchy = ClassHierarchy::new(&program);
        let target = MethodRef {
            class: animal,
            member: program.method(speak).member,
        };
        let mut cache = DispatchCache::new();

        assert_eq!(&[(dog, dog_speak)], cache.targets(&hierarchy, &target));
        assert_eq!(&[(dog, dog_speak)], cache.targets(&hierarchy, &target));
        assert_eq!(1, cache.misses());
        assert_eq!(1, cache.hits());

        assert!(cache.resolved().is_empty());
        cache.record(&target, dog_speak);
        cache.record(&target, dog_speak);
        assert_eq!(vec![(target, vec![dog_speak])], cache.resolved());
        assert_eq!(1, cache.callee_count());
    }

    #[test]
    fn unlinked_targets_are_not_reported() {
        let mut program = Program::new();
        let shape = program.add_class("Shape");
        let area = program.add_method(shape, "area", Vec::new(), None);
        let hierarchy = ClassHierarchy::new(&program);
        let target = MethodRef {
            class: shape,
            member: program.method(area).member,
        };
        let mut cache = DispatchCache::new();

        assert_eq!(&[(shape, area)], cache.targets(&hierarchy, &target));
        assert!(cache.resolved().is_empty());
        assert_eq!(0, cache.callee_count());
    }
}
