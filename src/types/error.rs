use thiserror::Error;

/// Failure to resolve a named IP space inside a match condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("undefined reference to ip space '{name}'")]
    Undefined { name: String },

    #[error("circular ip space reference: {}", path.join(" -> "))]
    Circular { path: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("no filters matched the selection on devices [{}]", devices.join(", "))]
    NoFiltersMatched { devices: Vec<String> },

    /// The packet variables were built for fewer interfaces than a filter
    /// needs; use [`PacketVars::for_groups`](crate::PacketVars::for_groups).
    #[error(
        "filter '{filter}' needs {interfaces} interfaces but the packet variables encode at most {capacity}"
    )]
    InterfaceCapacity {
        filter: String,
        interfaces: usize,
        capacity: usize,
    },
}
