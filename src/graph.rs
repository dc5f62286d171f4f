use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::ir::{CallKind, CallSiteId, MethodId};

/// Call edge from a call site to one of its possible callees.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Edge {
    pub call_site: CallSiteId,
    pub kind: CallKind,
    pub callee: MethodId,
}

impl Edge {
    pub fn caller(&self) -> MethodId {
        self.call_site.method
    }
}

/// Reachable methods and call edges discovered from an entry method.
///
/// Methods and edges are only ever added. The graph is complete only once the
/// builder that owns it has finished.
#[derive(Clone, Debug)]
pub struct CallGraph {
    entry: MethodId,
    reachable: Vec<MethodId>,
    reachable_set: HashSet<MethodId>,
    edges: BTreeSet<Edge>,
    call_sites: BTreeMap<MethodId, Vec<CallSiteId>>,
    callees: BTreeMap<MethodId, BTreeSet<MethodId>>,
    callers: BTreeMap<MethodId, BTreeSet<CallSiteId>>,
    site_callees: BTreeMap<CallSiteId, BTreeSet<MethodId>>,
}

impl CallGraph {
    pub fn new(entry: MethodId) -> Self {
        Self {
            entry,
            reachable: Vec::new(),
            reachable_set: HashSet::new(),
            edges: BTreeSet::new(),
            call_sites: BTreeMap::new(),
            callees: BTreeMap::new(),
            callers: BTreeMap::new(),
            site_callees: BTreeMap::new(),
        }
    }

    pub fn entry(&self) -> MethodId {
        self.entry
    }

    /// Mark `method` reachable together with its call sites. Returns false if it already was.
    pub fn add_reachable(&mut self, method: MethodId, call_sites: Vec<CallSiteId>) -> bool {
        if !self.reachable_set.insert(method) {
            return false;
        }
        self.reachable.push(method);
        self.call_sites.insert(method, call_sites);
        true
    }

    /// Add an edge. Returns false for duplicates.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if !self.edges.insert(edge) {
            return false;
        }
        self.callees
            .entry(edge.caller())
            .or_default()
            .insert(edge.callee);
        self.callers
            .entry(edge.callee)
            .or_default()
            .insert(edge.call_site);
        self.site_callees
            .entry(edge.call_site)
            .or_default()
            .insert(edge.callee);
        true
    }

    pub fn contains(&self, method: MethodId) -> bool {
        self.reachable_set.contains(&method)
    }

    /// Reachable methods in discovery order.
    pub fn reachable_methods(&self) -> &[MethodId] {
        &self.reachable
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn callees_of(&self, method: MethodId) -> Vec<MethodId> {
        self.callees
            .get(&method)
            .map(|callees| callees.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn callees_of_site(&self, site: CallSiteId) -> Vec<MethodId> {
        self.site_callees
            .get(&site)
            .map(|callees| callees.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Call sites with an edge into `method`.
    pub fn callers_of(&self, method: MethodId) -> Vec<CallSiteId> {
        self.callers
            .get(&method)
            .map(|sites| sites.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn call_sites_in(&self, method: MethodId) -> &[CallSiteId] {
        self.call_sites
            .get(&method)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
