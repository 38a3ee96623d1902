mod action;
mod config;
mod device;
mod error;
mod expr;
mod filter;
mod header_space;
mod ip_space;
mod line;
mod report;

pub use action::Action;
pub use config::{AnalysisConfig, FilterSelection};
pub use device::{Device, DeviceBuilder, Network, NetworkBuilder};
pub use error::{AnalysisError, ReferenceError};
pub use expr::{MatchExpr, denied_by, dst, from_device, permitted_by, src, src_interface};
pub use filter::{Filter, FilterBuilder};
pub use header_space::{HeaderSpace, PROTO_ICMP, PROTO_TCP, PROTO_UDP, PortRange};
pub use ip_space::{IpSpace, IpSpaceLine, IpWildcard};
pub use line::{Line, LineKind};
pub use report::{ReachabilityReport, ReachabilityRow, Reason, UnreachableLine};
