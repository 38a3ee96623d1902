use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::IpSpace;
use crate::parse::ParseError;

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

/// An inclusive range of transport ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Create a range. Bounds given in the wrong order are swapped.
    #[must_use]
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    #[must_use]
    pub fn single(port: u16) -> Self {
        Self::new(port, port)
    }

    #[must_use]
    pub fn start(&self) -> u16 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u16 {
        self.end
    }

    #[must_use]
    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for PortRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parse::parse_port_range(s)
    }
}

impl TryFrom<String> for PortRange {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortRange> for String {
    fn from(value: PortRange) -> Self {
        value.to_string()
    }
}

/// Constraints on packet header fields. Every populated field must match;
/// unpopulated fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSpace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_ips: Option<IpSpace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst_ips: Option<IpSpace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_src_ips: Option<IpSpace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_dst_ips: Option<IpSpace>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ip_protocols: Vec<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub src_ports: Vec<PortRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dst_ports: Vec<PortRange>,
}

impl HeaderSpace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn src(mut self, space: impl Into<IpSpace>) -> Self {
        self.src_ips = Some(space.into());
        self
    }

    #[must_use]
    pub fn dst(mut self, space: impl Into<IpSpace>) -> Self {
        self.dst_ips = Some(space.into());
        self
    }

    #[must_use]
    pub fn not_src(mut self, space: impl Into<IpSpace>) -> Self {
        self.not_src_ips = Some(space.into());
        self
    }

    #[must_use]
    pub fn not_dst(mut self, space: impl Into<IpSpace>) -> Self {
        self.not_dst_ips = Some(space.into());
        self
    }

    #[must_use]
    pub fn protocols(mut self, protocols: impl IntoIterator<Item = u8>) -> Self {
        self.ip_protocols = protocols.into_iter().collect();
        self
    }

    #[must_use]
    pub fn src_ports(mut self, ranges: impl IntoIterator<Item = PortRange>) -> Self {
        self.src_ports = ranges.into_iter().collect();
        self
    }

    #[must_use]
    pub fn dst_ports(mut self, ranges: impl IntoIterator<Item = PortRange>) -> Self {
        self.dst_ports = ranges.into_iter().collect();
        self
    }

    /// True if no field is constrained.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    /// All IP-space fields, in declaration order.
    pub fn ip_spaces(&self) -> impl Iterator<Item = &IpSpace> {
        [
            &self.src_ips,
            &self.dst_ips,
            &self.not_src_ips,
            &self.not_dst_ips,
        ]
        .into_iter()
        .flatten()
    }

    /// Apply `f` to every populated IP-space field, keeping the rest as-is.
    pub(crate) fn try_map_ip_spaces<E>(
        &self,
        mut f: impl FnMut(&IpSpace) -> Result<IpSpace, E>,
    ) -> Result<HeaderSpace, E> {
        let mut map = |space: &Option<IpSpace>| space.as_ref().map(&mut f).transpose();
        Ok(HeaderSpace {
            src_ips: map(&self.src_ips)?,
            dst_ips: map(&self.dst_ips)?,
            not_src_ips: map(&self.not_src_ips)?,
            not_dst_ips: map(&self.not_dst_ips)?,
            ip_protocols: self.ip_protocols.clone(),
            src_ports: self.src_ports.clone(),
            dst_ports: self.dst_ports.clone(),
        })
    }
}

fn protocol_name(protocol: u8) -> Option<&'static str> {
    match protocol {
        PROTO_ICMP => Some("icmp"),
        PROTO_TCP => Some("tcp"),
        PROTO_UDP => Some("udp"),
        _ => None,
    }
}

impl fmt::Display for HeaderSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unconstrained() {
            return write!(f, "any");
        }
        let mut parts: Vec<String> = Vec::new();
        let labelled = [
            ("src", &self.src_ips),
            ("dst", &self.dst_ips),
            ("not-src", &self.not_src_ips),
            ("not-dst", &self.not_dst_ips),
        ];
        for (label, space) in labelled {
            if let Some(space) = space {
                parts.push(format!("{label} {space}"));
            }
        }
        if !self.ip_protocols.is_empty() {
            let names: Vec<String> = self
                .ip_protocols
                .iter()
                .map(|p| protocol_name(*p).map_or_else(|| p.to_string(), str::to_owned))
                .collect();
            parts.push(format!("proto {}", names.join(",")));
        }
        for (label, ranges) in [("sport", &self.src_ports), ("dport", &self.dst_ports)] {
            if !ranges.is_empty() {
                let ranges: Vec<String> = ranges.iter().map(ToString::to_string).collect();
                parts.push(format!("{label} {}", ranges.join(",")));
            }
        }
        write!(f, "{}", parts.join(" "))
    }
}
