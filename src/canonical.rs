use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::cycles::sanitize_cycles;
use crate::graph::FilterGraph;
use crate::{Device, Filter, Network};

const UNREFERENCED_INTERFACE: &str = "unreferencedInterface";

/// A sanitized filter together with everything needed to classify its lines
/// in isolation.
///
/// Two canonical filters are equal when they would classify identically:
/// same sanitized lines, same dependency filters, same interfaces, same
/// undefined and in-cycle lines. Filter names and the unsanitized text do not
/// take part.
#[derive(Debug, Clone)]
pub struct CanonicalFilter {
    filter: Arc<Filter>,
    original: Filter,
    dependencies: BTreeMap<String, Arc<Filter>>,
    interfaces: BTreeSet<String>,
    undefined_lines: BTreeSet<usize>,
    cycle_lines: BTreeSet<usize>,
}

impl CanonicalFilter {
    /// The filter with references resolved and broken lines rewritten.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// The filter as configured, for display.
    #[must_use]
    pub fn original(&self) -> &Filter {
        &self.original
    }

    #[must_use]
    pub fn dependencies(&self) -> &BTreeMap<String, Arc<Filter>> {
        &self.dependencies
    }

    /// Referenced interfaces, plus one synthetic name standing for all the
    /// device interfaces that are never referenced.
    #[must_use]
    pub fn interfaces(&self) -> &BTreeSet<String> {
        &self.interfaces
    }

    #[must_use]
    pub fn undefined_lines(&self) -> &BTreeSet<usize> {
        &self.undefined_lines
    }

    #[must_use]
    pub fn cycle_lines(&self) -> &BTreeSet<usize> {
        &self.cycle_lines
    }
}

impl PartialEq for CanonicalFilter {
    fn eq(&self, other: &Self) -> bool {
        self.filter.lines == other.filter.lines
            && self.dependencies == other.dependencies
            && self.interfaces == other.interfaces
            && self.undefined_lines == other.undefined_lines
            && self.cycle_lines == other.cycle_lines
    }
}

impl Eq for CanonicalFilter {}

impl Hash for CanonicalFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.filter.lines.hash(state);
        self.dependencies.hash(state);
        self.interfaces.hash(state);
        self.undefined_lines.hash(state);
        self.cycle_lines.hash(state);
    }
}

/// A (device, filter) pair that produced a canonical filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Source {
    pub device: String,
    pub filter: String,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.device, self.filter)
    }
}

/// One unit of analysis and every pair that shares it, in first-seen order.
#[derive(Debug, Clone)]
pub struct CanonicalGroup {
    filter: CanonicalFilter,
    sources: Vec<Source>,
}

impl CanonicalGroup {
    #[must_use]
    pub fn filter(&self) -> &CanonicalFilter {
        &self.filter
    }

    #[must_use]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }
}

/// A reference cycle among filters of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCycle {
    pub device: String,
    /// Filter names in traversal order, first not repeated.
    pub filters: Vec<String>,
}

/// Sanitize the selected filters and merge identical ones.
///
/// `selected` maps device names to filter names, as produced by
/// [`FilterSelection::resolve`](crate::FilterSelection::resolve). Returns
/// the canonical groups in first-seen order and the cycles found, devices in
/// name order.
pub(crate) fn canonicalize(
    network: &Network,
    selected: &BTreeMap<String, BTreeSet<String>>,
) -> (Vec<CanonicalGroup>, Vec<FilterCycle>) {
    let mut groups: IndexMap<CanonicalFilter, Vec<Source>> = IndexMap::new();
    let mut cycles = Vec::new();

    for (device_name, filters) in selected {
        let Some(device) = network.device(device_name) else {
            continue;
        };
        let mut graph = FilterGraph::build(device, filters);
        cycles.extend(sanitize_cycles(&mut graph).into_iter().map(|filters| FilterCycle {
            device: device_name.clone(),
            filters,
        }));

        for name in filters {
            let Some(id) = graph.id(name) else {
                continue;
            };
            let node = &graph.nodes[id];
            let Some(filter) = node.sanitized.clone() else {
                continue;
            };
            let canonical = CanonicalFilter {
                filter,
                original: node.original.clone(),
                dependencies: graph.flat_dependencies(id),
                interfaces: pad_interfaces(graph.interface_dependencies(id), device),
                undefined_lines: node.undefined_lines.clone(),
                cycle_lines: node.cycle_lines.clone(),
            };
            groups.entry(canonical).or_default().push(Source {
                device: device_name.clone(),
                filter: name.clone(),
            });
        }
    }

    debug!(
        groups = groups.len(),
        sources = groups.values().map(Vec::len).sum::<usize>(),
        cycles = cycles.len(),
        "canonicalized filters"
    );
    let groups = groups
        .into_iter()
        .map(|(filter, sources)| CanonicalGroup { filter, sources })
        .collect();
    (groups, cycles)
}

/// Add one synthetic interface when some device interface goes unreferenced,
/// so packets from those interfaces are still represented.
fn pad_interfaces(mut referenced: BTreeSet<String>, device: &Device) -> BTreeSet<String> {
    if referenced.len() < device.interfaces.len() {
        let synthetic = std::iter::once(UNREFERENCED_INTERFACE.to_owned())
            .chain((0..).map(|i| format!("{UNREFERENCED_INTERFACE}{i}")))
            .find(|name| !device.interfaces.contains(name));
        referenced.extend(synthetic);
    }
    referenced
}
