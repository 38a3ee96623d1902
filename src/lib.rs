mod analysis;
mod canonical;
mod classify;
mod compile;
mod cycles;
mod error;
mod graph;
mod packet;
pub mod parse;
mod sanitize;
mod types;

pub use analysis::{analyze, canonical_filters};
pub use canonical::{CanonicalFilter, CanonicalGroup, FilterCycle, Source};
pub use classify::classify;
pub use error::AclReachError;
pub use packet::PacketVars;
pub use sanitize::HeaderSpaceSanitizer;
pub use types::{
    Action, AnalysisConfig, AnalysisError, Device, DeviceBuilder, Filter, FilterBuilder,
    FilterSelection, HeaderSpace, IpSpace, IpSpaceLine, IpWildcard, Line, LineKind, MatchExpr,
    Network, NetworkBuilder, PROTO_ICMP, PROTO_TCP, PROTO_UDP, PortRange, ReachabilityReport,
    ReachabilityRow, Reason, ReferenceError, UnreachableLine, denied_by, dst, from_device,
    permitted_by, src, src_interface,
};
