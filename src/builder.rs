//! Worklist-driven call graph construction shared by every variant.
//!
//! Methods are discovered through a worklist seeded with the entry method.
//! Instantiated classes are tracked per abstraction unit and flow along call
//! edges (arguments and return values) and field accesses. Every newly
//! recorded `(unit, class)` fact is queued and propagated until the queue
//! drains, so the result is the least fixed point of the propagation rules.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::dispatch::DispatchCache;
use crate::error::CallGraphError;
use crate::graph::{CallGraph, Edge};
use crate::hierarchy::ClassHierarchy;
use crate::ir::{CallKind, CallSiteId, ClassId, FieldId, Invoke, MethodId, MethodRef, Program, Stmt, Type};
use crate::pending::PendingEdges;
use crate::store::UnitStore;
use crate::variant::{Granularity, Unit};

/// Counters collected while building a call graph.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BuildStats {
    pub methods_processed: usize,
    pub events: usize,
    pub facts: usize,
    pub pending_registered: usize,
    pub pending_replayed: usize,
    pub pending_left: usize,
    pub dispatch_hits: usize,
    pub dispatch_misses: usize,
    pub dispatched_callees: usize,
    pub unresolved_dynamic: usize,
    pub skipped_targets: usize,
    pub kind_mismatches: usize,
}

/// Finished call graph plus construction statistics.
#[derive(Clone, Debug)]
pub struct BuildOutput {
    pub graph: CallGraph,
    /// Linked callees of every virtual or interface target, by declared target.
    pub dispatched: Vec<(MethodRef, Vec<MethodId>)>,
    pub stats: BuildStats,
}

/// Callee chosen for a call site, with the receiver class it was dispatched on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Target {
    callee: MethodId,
    receiver: Option<ClassId>,
}

/// Builds one call graph; all state is owned by the builder and dropped with it.
pub struct CallGraphBuilder<'a, G> {
    program: &'a Program,
    hierarchy: &'a ClassHierarchy<'a>,
    granularity: G,
    graph: CallGraph,
    store: UnitStore,
    dispatch: DispatchCache,
    pending: PendingEdges,
    worklist: VecDeque<MethodId>,
    events: VecDeque<(Unit, ClassId)>,
    // methods that appear in the graph, grouped by their unit
    members: HashMap<Unit, BTreeSet<MethodId>>,
    // method unit -> fields stored from it
    stores: HashMap<Unit, BTreeSet<FieldId>>,
    // field unit -> method units loading from it
    loads: HashMap<Unit, BTreeSet<Unit>>,
    stats: BuildStats,
}

impl<'a, G: Granularity> CallGraphBuilder<'a, G> {
    pub fn new(hierarchy: &'a ClassHierarchy<'a>, granularity: G, entry: MethodId) -> Self {
        Self {
            program: hierarchy.program(),
            hierarchy,
            granularity,
            graph: CallGraph::new(entry),
            store: UnitStore::new(),
            dispatch: DispatchCache::new(),
            pending: PendingEdges::new(),
            worklist: VecDeque::new(),
            events: VecDeque::new(),
            members: HashMap::new(),
            stores: HashMap::new(),
            loads: HashMap::new(),
            stats: BuildStats::default(),
        }
    }

    pub fn build(mut self) -> Result<BuildOutput, CallGraphError> {
        self.run()?;
        self.stats.facts = self.store.total_facts();
        self.stats.pending_left = self.pending.len();
        self.stats.dispatch_hits = self.dispatch.hits();
        self.stats.dispatch_misses = self.dispatch.misses();
        self.stats.dispatched_callees = self.dispatch.callee_count();
        info!(
            entry = %self.program.method_name(self.graph.entry()),
            reachable = self.graph.reachable_methods().len(),
            edges = self.graph.edge_count(),
            facts = self.stats.facts,
            "call graph construction finished"
        );
        Ok(BuildOutput {
            dispatched: self.dispatch.resolved(),
            graph: self.graph,
            stats: self.stats,
        })
    }

    fn run(&mut self) -> Result<(), CallGraphError> {
        let entry = self.graph.entry();
        if self.program.get_method(entry).is_none() {
            return Err(CallGraphError::UnknownEntry(entry));
        }
        self.worklist.push_back(entry);
        while let Some(method) = self.worklist.pop_front() {
            let call_sites = self
                .program
                .call_sites_in(method)
                .map(|(site, _)| site)
                .collect();
            if !self.graph.add_reachable(method, call_sites) {
                continue;
            }
            self.stats.methods_processed += 1;
            self.enroll(method);
            self.process_method(method)?;
        }
        Ok(())
    }

    fn process_method(&mut self, method: MethodId) -> Result<(), CallGraphError> {
        let program = self.program;
        trace!(method = %program.method_name(method), "processing method");
        if self.granularity.tracks_instantiation() {
            let unit = self.method_unit(method);
            for stmt in &program.method(method).body {
                match stmt {
                    Stmt::New(class) => self.allocate(unit, *class),
                    Stmt::NewArray(element) if self.granularity.counts_array_allocations() => {
                        if let Some(class) = element.base_class() {
                            self.allocate(unit, class);
                        }
                    }
                    Stmt::StoreField(field) => self.register_store(unit, *field),
                    Stmt::LoadField(field) => self.register_load(unit, *field),
                    _ => {}
                }
            }
            self.propagate();
        }
        let sites = self.graph.call_sites_in(method).to_vec();
        for site in sites {
            self.process_call_site(site)?;
        }
        Ok(())
    }

    fn process_call_site(&mut self, site: CallSiteId) -> Result<(), CallGraphError> {
        let Some(invoke) = self.program.invoke(site).copied() else {
            return Ok(());
        };
        for target in self.resolve_callees_of(site, &invoke)? {
            self.link(site, target.callee, target.receiver);
        }
        self.propagate();
        Ok(())
    }

    /// Callees of `site` known right now. Virtual targets whose receiver class
    /// is not yet instantiated in the caller's unit are parked instead.
    fn resolve_callees_of(&mut self, site: CallSiteId, invoke: &Invoke) -> Result<Vec<Target>, CallGraphError> {
        match invoke.kind {
            CallKind::Static | CallKind::Special => {
                let callee = self.resolve_declared(site, &invoke.target);
                if let Some(callee) = callee {
                    self.check_static(site, invoke.kind, callee);
                }
                Ok(callee
                    .map(|callee| Target {
                        callee,
                        receiver: None,
                    })
                    .into_iter()
                    .collect())
            }
            CallKind::Virtual | CallKind::Interface => Ok(self.resolve_virtual(site, &invoke.target)),
            CallKind::Dynamic => {
                self.stats.unresolved_dynamic += 1;
                debug!(site = %self.program.call_site_name(site), "cannot resolve dynamic call site");
                Ok(Vec::new())
            }
            CallKind::Other => Err(CallGraphError::MalformedCallKind {
                site: self.program.call_site_name(site),
            }),
        }
    }

    fn resolve_declared(&mut self, site: CallSiteId, target: &MethodRef) -> Option<MethodId> {
        match self.hierarchy.resolve(target) {
            Some(callee) if !self.program.method(callee).is_abstract => Some(callee),
            _ => {
                self.stats.skipped_targets += 1;
                debug!(
                    site = %self.program.call_site_name(site),
                    target = %self.program.member(target.member),
                    "no concrete declaration for call target"
                );
                None
            }
        }
    }

    /// Static calls should reach static methods and special calls instance methods.
    /// A mismatch still links the edge; it is only counted and logged.
    fn check_static(&mut self, site: CallSiteId, kind: CallKind, callee: MethodId) {
        let is_static = self.program.method(callee).is_static;
        if is_static != (kind == CallKind::Static) {
            self.stats.kind_mismatches += 1;
            debug!(
                site = %self.program.call_site_name(site),
                callee = %self.program.method_name(callee),
                %kind,
                "call kind disagrees with the callee's static flag"
            );
        }
    }

    fn resolve_virtual(&mut self, site: CallSiteId, target: &MethodRef) -> Vec<Target> {
        let targets = self.dispatch.targets(self.hierarchy, target).to_vec();
        if !self.granularity.tracks_instantiation() {
            return targets
                .into_iter()
                .map(|(_, callee)| Target {
                    callee,
                    receiver: None,
                })
                .collect();
        }
        let caller_unit = self.method_unit(site.method);
        let mut resolved = Vec::new();
        for (class, callee) in targets {
            if self.store.contains(caller_unit, class) {
                resolved.push(Target {
                    callee,
                    receiver: Some(class),
                });
            } else if self.pending.register(class, caller_unit, site, callee) {
                self.stats.pending_registered += 1;
            }
        }
        resolved
    }

    /// Add the edge `site -> callee` and seed argument and return flow along it.
    fn link(&mut self, site: CallSiteId, callee: MethodId, receiver: Option<ClassId>) {
        let program = self.program;
        let Some(invoke) = program.invoke(site) else {
            return;
        };
        let tracks = self.granularity.tracks_instantiation();
        let caller_unit = self.method_unit(site.method);
        let callee_unit = self.method_unit(callee);
        if let (true, Some(class)) = (tracks, receiver) {
            self.add_fact(callee_unit, class);
        }
        if invoke.kind.is_virtual() {
            self.dispatch.record(&invoke.target, callee);
        }
        let edge = Edge {
            call_site: site,
            kind: invoke.kind,
            callee,
        };
        if !self.graph.add_edge(edge) {
            return;
        }
        trace!(
            site = %program.call_site_name(site),
            callee = %program.method_name(callee),
            "new call edge"
        );
        if !self.graph.contains(callee) {
            self.worklist.push_back(callee);
        }
        self.enroll(site.method);
        self.enroll(callee);
        if !tracks {
            return;
        }
        for class in self.store.classes_in(caller_unit) {
            if self.accepts_argument(callee, class) {
                self.add_fact(callee_unit, class);
            }
        }
        for class in self.store.classes_in(callee_unit) {
            if self.returns(callee, class) {
                self.add_fact(caller_unit, class);
            }
        }
    }

    fn allocate(&mut self, unit: Unit, class: ClassId) {
        if !self.program.class(class).is_concrete() {
            debug!(class = %self.program.class(class).name, "ignoring allocation of non-instantiable class");
            return;
        }
        self.add_fact(unit, class);
    }

    fn register_store(&mut self, method_unit: Unit, field: FieldId) {
        if self.program.field(field).ty.as_class().is_none() {
            return;
        }
        if !self.stores.entry(method_unit).or_default().insert(field) {
            return;
        }
        let field_unit = self.field_unit(field);
        for class in self.store.classes_in(method_unit) {
            if self.field_accepts(field, class) {
                self.add_fact(field_unit, class);
            }
        }
    }

    fn register_load(&mut self, method_unit: Unit, field: FieldId) {
        if self.program.field(field).ty.as_class().is_none() {
            return;
        }
        let field_unit = self.field_unit(field);
        if !self.loads.entry(field_unit).or_default().insert(method_unit) {
            return;
        }
        for class in self.store.classes_in(field_unit) {
            self.add_fact(method_unit, class);
        }
    }

    fn add_fact(&mut self, unit: Unit, class: ClassId) {
        if self.store.update(unit, class) {
            self.stats.events += 1;
            self.events.push_back((unit, class));
        }
    }

    /// Drain the event queue, applying every propagation rule to each new fact.
    fn propagate(&mut self) {
        while let Some((unit, class)) = self.events.pop_front() {
            for (site, callee) in self.pending.take(class, unit) {
                self.stats.pending_replayed += 1;
                debug!(
                    site = %self.program.call_site_name(site),
                    callee = %self.program.method_name(callee),
                    "replaying pending call edge"
                );
                self.link(site, callee, Some(class));
            }

            let members: Vec<MethodId> = self
                .members
                .get(&unit)
                .map(|methods| methods.iter().copied().collect())
                .unwrap_or_default();
            for method in members {
                for callee in self.graph.callees_of(method) {
                    if self.accepts_argument(callee, class) {
                        let callee_unit = self.method_unit(callee);
                        self.add_fact(callee_unit, class);
                    }
                }
                if self.returns(method, class) {
                    for site in self.graph.callers_of(method) {
                        let caller_unit = self.method_unit(site.method);
                        self.add_fact(caller_unit, class);
                    }
                }
            }

            let stored: Vec<FieldId> = self
                .stores
                .get(&unit)
                .map(|fields| fields.iter().copied().collect())
                .unwrap_or_default();
            for field in stored {
                if self.field_accepts(field, class) {
                    let field_unit = self.field_unit(field);
                    self.add_fact(field_unit, class);
                }
            }

            let loaders: Vec<Unit> = self
                .loads
                .get(&unit)
                .map(|units| units.iter().copied().collect())
                .unwrap_or_default();
            for loader in loaders {
                self.add_fact(loader, class);
            }
        }
    }

    fn enroll(&mut self, method: MethodId) {
        let unit = self.method_unit(method);
        self.members.entry(unit).or_default().insert(method);
    }

    fn method_unit(&self, method: MethodId) -> Unit {
        self.granularity.method_unit(self.program, method)
    }

    fn field_unit(&self, field: FieldId) -> Unit {
        self.granularity.field_unit(self.program, field)
    }

    fn accepts_argument(&self, method: MethodId, class: ClassId) -> bool {
        self.program
            .method(method)
            .params
            .iter()
            .any(|param| self.flows_into(class, param))
    }

    fn returns(&self, method: MethodId, class: ClassId) -> bool {
        self.program
            .method(method)
            .ret
            .as_ref()
            .is_some_and(|ret| self.flows_into(class, ret))
    }

    fn field_accepts(&self, field: FieldId, class: ClassId) -> bool {
        self.flows_into(class, &self.program.field(field).ty)
    }

    fn flows_into(&self, class: ClassId, declared: &Type) -> bool {
        declared
            .as_class()
            .is_some_and(|declared| self.hierarchy.is_subtype(class, declared))
    }
}

#[cfg(test)]
impl<G: Granularity> CallGraphBuilder<'_, G> {
    /// Re-apply every seeding rule to the converged state; returns whether anything changed.
    fn repropagate(&mut self) -> bool {
        let before = (self.store.total_facts(), self.graph.edge_count());
        let edges: Vec<Edge> = self.graph.edges().copied().collect();
        for edge in edges {
            let caller_unit = self.method_unit(edge.caller());
            let callee_unit = self.method_unit(edge.callee);
            for class in self.store.classes_in(caller_unit) {
                if self.accepts_argument(edge.callee, class) {
                    self.add_fact(callee_unit, class);
                }
            }
            for class in self.store.classes_in(callee_unit) {
                if self.returns(edge.callee, class) {
                    self.add_fact(caller_unit, class);
                }
            }
        }
        let stores: Vec<(Unit, FieldId)> = self
            .stores
            .iter()
            .flat_map(|(unit, fields)| fields.iter().map(|field| (*unit, *field)))
            .collect();
        for (unit, field) in stores {
            let field_unit = self.field_unit(field);
            for class in self.store.classes_in(unit) {
                if self.field_accepts(field, class) {
                    self.add_fact(field_unit, class);
                }
            }
        }
        let loads: Vec<(Unit, Unit)> = self
            .loads
            .iter()
            .flat_map(|(field_unit, units)| units.iter().map(|unit| (*field_unit, *unit)))
            .collect();
        for (field_unit, unit) in loads {
            for class in self.store.classes_in(field_unit) {
                self.add_fact(unit, class);
            }
        }
        self.propagate();
        before != (self.store.total_facts(), self.graph.edge_count())
    }
}
