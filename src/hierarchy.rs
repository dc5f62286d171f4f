use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::ir::{ClassId, MemberId, MethodId, MethodRef, Program};

/// Subtype and dispatch queries over a program's class hierarchy.
///
/// Subtype sets are reflexive and cover both superclass and interface edges.
/// All indexes are computed once in [`ClassHierarchy::new`].
pub struct ClassHierarchy<'p> {
    program: &'p Program,
    supertypes: Vec<BTreeSet<ClassId>>,
    concrete_subtypes: Vec<Vec<ClassId>>,
    declared: HashMap<(ClassId, MemberId), MethodId>,
}

impl<'p> ClassHierarchy<'p> {
    pub fn new(program: &'p Program) -> Self {
        let class_count = program.class_count();
        let mut direct_supertypes = vec![Vec::new(); class_count];
        let mut declared = HashMap::new();
        for class in program.class_ids() {
            let info = program.class(class);
            direct_supertypes[class.0 as usize].extend(info.super_class);
            direct_supertypes[class.0 as usize].extend(info.interfaces.iter().copied());
            for method in &info.methods {
                declared
                    .entry((class, program.method(*method).member))
                    .or_insert(*method);
            }
        }

        let supertypes: Vec<BTreeSet<ClassId>> = program
            .class_ids()
            .map(|class| reachable_from(class, &direct_supertypes))
            .collect();

        let mut concrete_subtypes = vec![Vec::new(); class_count];
        for class in program.class_ids() {
            if !program.class(class).is_concrete() {
                continue;
            }
            for ancestor in &supertypes[class.0 as usize] {
                concrete_subtypes[ancestor.0 as usize].push(class);
            }
        }

        Self {
            program,
            supertypes,
            concrete_subtypes,
            declared,
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    /// Reflexive subtype test.
    pub fn is_subtype(&self, class: ClassId, of: ClassId) -> bool {
        self.supertypes[class.0 as usize].contains(&of)
    }

    /// All subtypes of `class`, the class included, in id order.
    pub fn all_subtypes_of(&self, class: ClassId) -> Vec<ClassId> {
        self.program
            .class_ids()
            .filter(|candidate| self.is_subtype(*candidate, class))
            .collect()
    }

    /// Subtypes of `class` that can be instantiated, in id order.
    pub fn concrete_subtypes_of(&self, class: ClassId) -> &[ClassId] {
        &self.concrete_subtypes[class.0 as usize]
    }

    /// Method invoked when `target` is called on a receiver of exactly `class`.
    ///
    /// The superclass chain is searched first; the nearest declaration wins and
    /// an abstract one yields `None`. Without any declaration on the chain,
    /// default methods of the implemented interfaces are considered.
    pub fn dispatch(&self, class: ClassId, target: &MethodRef) -> Option<MethodId> {
        let mut current = Some(class);
        while let Some(candidate) = current {
            if let Some(method) = self.declared.get(&(candidate, target.member)) {
                return (!self.program.method(*method).is_abstract).then_some(*method);
            }
            current = self.program.class(candidate).super_class;
        }
        self.default_method(class, target.member)
    }

    /// Declared target of a static or special call, searching superclasses then interfaces.
    pub fn resolve(&self, target: &MethodRef) -> Option<MethodId> {
        let mut current = Some(target.class);
        while let Some(candidate) = current {
            if let Some(method) = self.declared.get(&(candidate, target.member)) {
                return Some(*method);
            }
            current = self.program.class(candidate).super_class;
        }
        self.supertypes[target.class.0 as usize]
            .iter()
            .find_map(|ancestor| self.declared.get(&(*ancestor, target.member)).copied())
    }

    fn default_method(&self, class: ClassId, member: MemberId) -> Option<MethodId> {
        self.supertypes[class.0 as usize]
            .iter()
            .filter(|ancestor| self.program.class(**ancestor).is_interface)
            .filter_map(|ancestor| self.declared.get(&(*ancestor, member)))
            .copied()
            .find(|method| !self.program.method(*method).is_abstract)
    }
}

fn reachable_from(start: ClassId, edges: &[Vec<ClassId>]) -> BTreeSet<ClassId> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start);
    queue.push_back(start);
    while let Some(class) = queue.pop_front() {
        for next in &edges[class.0 as usize] {
            if seen.insert(*next) {
                queue.push_back(*next);
            }
        }
    }
    seen
}
