use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::debug;

use crate::sanitize::HeaderSpaceSanitizer;
use crate::{Device, Filter, Line, LineKind, MatchExpr};

pub(crate) type NodeId = usize;

/// Edge to a referenced filter, annotated with the referencing lines.
#[derive(Debug, Clone)]
pub(crate) struct Dependency {
    pub(crate) node: NodeId,
    pub(crate) lines: BTreeSet<usize>,
}

#[derive(Debug)]
pub(crate) struct FilterNode<'a> {
    pub(crate) original: &'a Filter,
    /// Working copy of the lines, rewritten in place until finalized.
    pub(crate) lines: Vec<Line>,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) interfaces: BTreeSet<String>,
    pub(crate) undefined_lines: BTreeSet<usize>,
    pub(crate) cycle_lines: BTreeSet<usize>,
    pub(crate) sanitized: Option<Arc<Filter>>,
}

impl<'a> FilterNode<'a> {
    fn new(original: &'a Filter) -> Self {
        Self {
            original,
            lines: original.lines.clone(),
            dependencies: Vec::new(),
            interfaces: BTreeSet::new(),
            undefined_lines: BTreeSet::new(),
            cycle_lines: BTreeSet::new(),
            sanitized: None,
        }
    }

    fn add_dependency(&mut self, node: NodeId, line: usize) {
        match self.dependencies.iter_mut().find(|d| d.node == node) {
            Some(dep) => {
                dep.lines.insert(line);
            }
            None => self.dependencies.push(Dependency {
                node,
                lines: BTreeSet::from([line]),
            }),
        }
    }

    fn mark_undefined(&mut self, line: usize) {
        self.undefined_lines.insert(line);
        self.lines[line] = self.lines[line].unmatchable();
    }

    /// Drop the edge to `node`, rewriting every line that used it to match
    /// nothing. Returns false if there was no such edge.
    pub(crate) fn break_dependency(&mut self, node: NodeId) -> bool {
        let Some(pos) = self.dependencies.iter().position(|d| d.node == node) else {
            return false;
        };
        let dep = self.dependencies.remove(pos);
        for line in dep.lines {
            self.cycle_lines.insert(line);
            self.lines[line] = self.lines[line].unmatchable();
        }
        true
    }

    /// Freeze the working lines into the sanitized filter. Idempotent.
    pub(crate) fn finalize(&mut self) -> Arc<Filter> {
        if let Some(filter) = &self.sanitized {
            return Arc::clone(filter);
        }
        let filter = Arc::new(Filter {
            name: self.original.name.clone(),
            lines: self.lines.clone(),
            composite: self.original.composite,
        });
        self.sanitized = Some(Arc::clone(&filter));
        filter
    }
}

/// Reference graph among the filters of one device.
///
/// Nodes live in an arena and refer to each other by index, so reference
/// cycles in the configuration never become ownership cycles.
#[derive(Debug)]
pub(crate) struct FilterGraph<'a> {
    device: &'a Device,
    pub(crate) nodes: Vec<FilterNode<'a>>,
    by_name: BTreeMap<String, NodeId>,
}

impl<'a> FilterGraph<'a> {
    /// Build nodes for `filters` and every filter they reach. Names the
    /// device does not define are ignored.
    pub(crate) fn build(device: &'a Device, filters: &BTreeSet<String>) -> Self {
        let mut graph = Self {
            device,
            nodes: Vec::new(),
            by_name: BTreeMap::new(),
        };
        for name in filters {
            graph.node_for(name);
        }
        debug!(
            device = %device.name,
            requested = filters.len(),
            nodes = graph.nodes.len(),
            "built filter graph"
        );
        graph
    }

    pub(crate) fn device(&self) -> &'a Device {
        self.device
    }

    pub(crate) fn id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn name(&self, id: NodeId) -> &str {
        &self.nodes[id].original.name
    }

    /// Node ids ordered by filter name.
    pub(crate) fn ids_by_name(&self) -> Vec<NodeId> {
        self.by_name.values().copied().collect()
    }

    fn node_for(&mut self, name: &str) -> Option<NodeId> {
        if let Some(id) = self.id(name) {
            return Some(id);
        }
        let device = self.device;
        let filter = device.filter(name)?;
        let id = self.nodes.len();
        // Registered before its lines are walked so self references resolve.
        self.nodes.push(FilterNode::new(filter));
        self.by_name.insert(name.to_owned(), id);

        let sanitizer = HeaderSpaceSanitizer::new(&device.ip_spaces);
        for (index, line) in filter.lines.iter().enumerate() {
            self.add_line(id, index, line, &sanitizer);
        }
        Some(id)
    }

    fn add_line(
        &mut self,
        id: NodeId,
        index: usize,
        line: &Line,
        sanitizer: &HeaderSpaceSanitizer<'_>,
    ) {
        let device = self.device;

        let filters = collect_filter_refs(line);
        if let Some(missing) = filters.iter().find(|f| device.filter(f).is_none()) {
            debug!(
                device = %device.name,
                filter = %self.name(id),
                line = index,
                reference = %missing,
                "undefined filter reference"
            );
            self.nodes[id].mark_undefined(index);
            return;
        }
        for name in &filters {
            if let Some(dep) = self.node_for(name) {
                self.nodes[id].add_dependency(dep, index);
            }
        }

        match sanitizer.sanitize_line(line) {
            Ok(sanitized) => {
                if &sanitized != line {
                    self.nodes[id].lines[index] = sanitized;
                }
            }
            Err(err) => {
                debug!(
                    device = %device.name,
                    filter = %self.name(id),
                    line = index,
                    error = %err,
                    "unresolvable ip space"
                );
                self.nodes[id].mark_undefined(index);
                return;
            }
        }

        let interfaces = collect_interface_refs(line);
        if let Some(missing) = interfaces.iter().find(|i| !device.interfaces.contains(*i)) {
            debug!(
                device = %device.name,
                filter = %self.name(id),
                line = index,
                interface = %missing,
                "undefined interface reference"
            );
            self.nodes[id].mark_undefined(index);
            return;
        }
        self.nodes[id].interfaces.extend(interfaces);
    }

    /// Sanitized filters reachable from `id`, excluding `id` itself unless
    /// it is reached again through another node. Call after finalization.
    pub(crate) fn flat_dependencies(&self, id: NodeId) -> BTreeMap<String, Arc<Filter>> {
        let mut out = BTreeMap::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = self.nodes[id].dependencies.iter().map(|d| d.node).collect();
        while let Some(next) = stack.pop() {
            if std::mem::replace(&mut visited[next], true) {
                continue;
            }
            let node = &self.nodes[next];
            if let Some(filter) = &node.sanitized {
                out.insert(node.original.name.clone(), Arc::clone(filter));
            }
            stack.extend(node.dependencies.iter().map(|d| d.node));
        }
        out
    }

    /// Interfaces referenced by `id` or anything it reaches.
    pub(crate) fn interface_dependencies(&self, id: NodeId) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if std::mem::replace(&mut visited[next], true) {
                continue;
            }
            let node = &self.nodes[next];
            out.extend(node.interfaces.iter().cloned());
            stack.extend(node.dependencies.iter().map(|d| d.node));
        }
        out
    }
}

/// Filters a line refers to, in first-mention order.
pub(crate) fn collect_filter_refs(line: &Line) -> IndexSet<String> {
    let mut out = IndexSet::new();
    match &line.kind {
        LineKind::Match { condition, .. } => filter_refs(condition, &mut out),
        LineKind::Call { filter } => {
            out.insert(filter.clone());
        }
    }
    out
}

fn filter_refs(expr: &MatchExpr, out: &mut IndexSet<String>) {
    match expr {
        MatchExpr::And(items) | MatchExpr::Or(items) => {
            for item in items {
                filter_refs(item, out);
            }
        }
        MatchExpr::Not(inner) => filter_refs(inner, out),
        MatchExpr::PermittedBy(name) | MatchExpr::DeniedBy(name) => {
            out.insert(name.clone());
        }
        MatchExpr::True
        | MatchExpr::False
        | MatchExpr::Header(_)
        | MatchExpr::SrcInterface(_)
        | MatchExpr::FromDevice => {}
    }
}

/// Interfaces a line's condition refers to.
pub(crate) fn collect_interface_refs(line: &Line) -> IndexSet<String> {
    let mut out = IndexSet::new();
    if let Some(condition) = line.condition() {
        interface_refs(condition, &mut out);
    }
    out
}

fn interface_refs(expr: &MatchExpr, out: &mut IndexSet<String>) {
    match expr {
        MatchExpr::And(items) | MatchExpr::Or(items) => {
            for item in items {
                interface_refs(item, out);
            }
        }
        MatchExpr::Not(inner) => interface_refs(inner, out),
        MatchExpr::SrcInterface(names) => out.extend(names.iter().cloned()),
        MatchExpr::True
        | MatchExpr::False
        | MatchExpr::Header(_)
        | MatchExpr::PermittedBy(_)
        | MatchExpr::DeniedBy(_)
        | MatchExpr::FromDevice => {}
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::{IpSpace, denied_by, permitted_by, src, src_interface};

    fn names(filters: &[&str]) -> BTreeSet<String> {
        filters.iter().map(|s| (*s).to_owned()).collect()
    }

    fn host() -> IpSpace {
        IpSpace::host(Ipv4Addr::new(10, 1, 1, 1))
    }

    #[test]
    fn filter_refs_in_mention_order() {
        let line = Line::permit(
            denied_by("b")
                .and(!permitted_by("a"))
                .or(permitted_by("b")),
        );
        let refs: Vec<String> = collect_filter_refs(&line).into_iter().collect();
        assert_eq!(refs, vec!["b", "a"]);
        assert_eq!(
            collect_filter_refs(&Line::call("c")).into_iter().collect::<Vec<_>>(),
            vec!["c"]
        );
    }

    #[test]
    fn interface_refs_skip_calls() {
        let line = Line::deny(src_interface(["e1", "e0"]).and(!src_interface(["e1"])));
        let refs: Vec<String> = collect_interface_refs(&line).into_iter().collect();
        assert_eq!(refs, vec!["e1", "e0"]);
        assert!(collect_interface_refs(&Line::call("x")).is_empty());
    }

    #[test]
    fn reachable_filters_become_nodes() {
        let mut device = Device::new("r1");
        device.filters.insert(
            "a".into(),
            Filter::builder("a").permit(permitted_by("b")).call("c").build(),
        );
        device.filters.insert("b".into(), Filter::builder("b").permit(src(host())).build());
        device.filters.insert("c".into(), Filter::builder("c").deny(MatchExpr::True).build());
        device.filters.insert("unused".into(), Filter::builder("unused").build());

        let graph = FilterGraph::build(&device, &names(&["a"]));
        assert_eq!(graph.nodes.len(), 3);
        assert!(graph.id("unused").is_none());
        let a = graph.id("a").unwrap();
        let deps: Vec<&str> = graph.nodes[a]
            .dependencies
            .iter()
            .map(|d| graph.name(d.node))
            .collect();
        assert_eq!(deps, vec!["b", "c"]);
    }

    #[test]
    fn undefined_filter_reference_is_rewritten() {
        let mut device = Device::new("r1");
        device.filters.insert(
            "a".into(),
            Filter::builder("a")
                .permit(permitted_by("ghost").or(src_interface(["eth0"])))
                .build(),
        );
        let graph = FilterGraph::build(&device, &names(&["a"]));
        let node = &graph.nodes[0];
        assert_eq!(node.undefined_lines, BTreeSet::from([0]));
        assert_eq!(node.lines[0].condition(), Some(&MatchExpr::False));
        assert!(node.dependencies.is_empty());
        assert!(node.interfaces.is_empty());
        // the source filter is borrowed, never rewritten
        assert_ne!(device.filters["a"].lines[0].condition(), Some(&MatchExpr::False));
    }

    #[test]
    fn undefined_ip_space_and_interface() {
        let mut device = Device::new("r1");
        device.interfaces.insert("eth0".into());
        device.filters.insert(
            "a".into(),
            Filter::builder("a")
                .permit(src(IpSpace::reference("nowhere")))
                .permit(src_interface(["eth9"]))
                .permit(src_interface(["eth0"]))
                .build(),
        );
        let graph = FilterGraph::build(&device, &names(&["a"]));
        let node = &graph.nodes[0];
        assert_eq!(node.undefined_lines, BTreeSet::from([0, 1]));
        assert_eq!(node.interfaces, BTreeSet::from(["eth0".to_owned()]));
    }

    #[test]
    fn ip_space_references_are_inlined() {
        let mut device = Device::new("r1");
        device.ip_spaces.insert("h".into(), host());
        device.filters.insert(
            "a".into(),
            Filter::builder("a").permit(src(IpSpace::reference("h"))).build(),
        );
        let graph = FilterGraph::build(&device, &names(&["a"]));
        assert_eq!(graph.nodes[0].lines[0].condition(), Some(&src(host())));
        assert!(graph.nodes[0].undefined_lines.is_empty());
    }

    #[test]
    fn self_reference_is_an_edge() {
        let mut device = Device::new("r1");
        device.filters.insert(
            "a".into(),
            Filter::builder("a").permit(permitted_by("a")).build(),
        );
        let graph = FilterGraph::build(&device, &names(&["a"]));
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].dependencies[0].node, 0);
    }

    #[test]
    fn break_dependency_marks_lines() {
        let mut device = Device::new("r1");
        device.filters.insert(
            "a".into(),
            Filter::builder("a")
                .permit(permitted_by("b"))
                .deny(denied_by("b"))
                .permit(MatchExpr::True)
                .build(),
        );
        device.filters.insert("b".into(), Filter::builder("b").build());
        let mut graph = FilterGraph::build(&device, &names(&["a"]));
        let (a, b) = (graph.id("a").unwrap(), graph.id("b").unwrap());
        assert!(graph.nodes[a].break_dependency(b));
        assert!(!graph.nodes[a].break_dependency(b));
        assert_eq!(graph.nodes[a].cycle_lines, BTreeSet::from([0, 1]));
        let filter = graph.nodes[a].finalize();
        assert_eq!(filter.lines[1], Line::deny(MatchExpr::False));
        assert_eq!(filter.lines[2], Line::permit(MatchExpr::True));
    }

    #[test]
    fn flattened_dependencies_are_transitive() {
        let mut device = Device::new("r1");
        device.interfaces.extend(["e0".to_owned(), "e1".to_owned()]);
        device.filters.insert("a".into(), Filter::builder("a").call("b").build());
        device.filters.insert(
            "b".into(),
            Filter::builder("b").permit(permitted_by("c")).build(),
        );
        device.filters.insert(
            "c".into(),
            Filter::builder("c").permit(src_interface(["e1"])).build(),
        );
        let mut graph = FilterGraph::build(&device, &names(&["a"]));
        for node in &mut graph.nodes {
            node.finalize();
        }
        let a = graph.id("a").unwrap();
        let deps = graph.flat_dependencies(a);
        assert_eq!(deps.keys().map(String::as_str).collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(graph.interface_dependencies(a), BTreeSet::from(["e1".to_owned()]));
    }
}
