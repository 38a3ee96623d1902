use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Action;
use crate::parse::ParseError;

/// An IPv4 address with a Cisco-style wildcard mask: set bits in the mask are
/// "don't care". Prefixes are wildcards whose mask is a run of low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpWildcard {
    ip: Ipv4Addr,
    wildcard: Ipv4Addr,
}

impl IpWildcard {
    /// Create a wildcard. Address bits covered by the mask are cleared so that
    /// equal sets of addresses compare equal.
    #[must_use]
    pub fn new(ip: Ipv4Addr, wildcard: Ipv4Addr) -> Self {
        let mask = u32::from(wildcard);
        Self {
            ip: Ipv4Addr::from(u32::from(ip) & !mask),
            wildcard,
        }
    }

    /// A wildcard matching exactly one address.
    #[must_use]
    pub fn host(ip: Ipv4Addr) -> Self {
        Self::new(ip, Ipv4Addr::UNSPECIFIED)
    }

    /// A wildcard matching `ip/len`. Lengths above 32 are treated as 32.
    #[must_use]
    pub fn prefix(ip: Ipv4Addr, len: u8) -> Self {
        let mask = if len >= 32 { 0 } else { u32::MAX >> len };
        Self::new(ip, Ipv4Addr::from(mask))
    }

    #[must_use]
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    #[must_use]
    pub fn wildcard(&self) -> Ipv4Addr {
        self.wildcard
    }

    /// Bits of the address that must match exactly.
    #[must_use]
    pub fn care_mask(&self) -> u32 {
        !u32::from(self.wildcard)
    }

    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.care_mask() == u32::from(self.ip)
    }
}

impl fmt::Display for IpWildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = u32::from(self.wildcard);
        if mask == 0 {
            write!(f, "{}", self.ip)
        } else if mask.wrapping_add(1) & mask == 0 {
            write!(f, "{}/{}", self.ip, mask.leading_zeros())
        } else {
            write!(f, "{}:{}", self.ip, self.wildcard)
        }
    }
}

impl FromStr for IpWildcard {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parse::parse_wildcard(s)
    }
}

impl TryFrom<String> for IpWildcard {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IpWildcard> for String {
    fn from(value: IpWildcard) -> Self {
        value.to_string()
    }
}

/// A set of IPv4 addresses, possibly defined in terms of other named sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpSpace {
    Universe,
    Empty,
    Wildcard(IpWildcard),
    /// A named IP space defined on the owning device.
    Reference(String),
    /// Ordered permit/deny lines; an address belongs to the space if the first
    /// line containing it permits.
    Acl(Vec<IpSpaceLine>),
}

/// One line of an [`IpSpace::Acl`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpSpaceLine {
    pub action: Action,
    pub space: IpSpace,
}

impl IpSpaceLine {
    #[must_use]
    pub fn permit(space: impl Into<IpSpace>) -> Self {
        Self {
            action: Action::Permit,
            space: space.into(),
        }
    }

    #[must_use]
    pub fn deny(space: impl Into<IpSpace>) -> Self {
        Self {
            action: Action::Deny,
            space: space.into(),
        }
    }
}

impl IpSpace {
    #[must_use]
    pub fn reference(name: &str) -> Self {
        IpSpace::Reference(name.to_owned())
    }

    #[must_use]
    pub fn host(ip: Ipv4Addr) -> Self {
        IpSpace::Wildcard(IpWildcard::host(ip))
    }

    #[must_use]
    pub fn prefix(ip: Ipv4Addr, len: u8) -> Self {
        IpSpace::Wildcard(IpWildcard::prefix(ip, len))
    }

    #[must_use]
    pub fn acl(lines: impl IntoIterator<Item = IpSpaceLine>) -> Self {
        IpSpace::Acl(lines.into_iter().collect())
    }
}

impl From<IpWildcard> for IpSpace {
    fn from(value: IpWildcard) -> Self {
        IpSpace::Wildcard(value)
    }
}

impl From<Ipv4Addr> for IpSpace {
    fn from(value: Ipv4Addr) -> Self {
        IpSpace::host(value)
    }
}

impl FromStr for IpSpace {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parse::parse_ip_space(s)
    }
}

impl fmt::Display for IpSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpSpace::Universe => write!(f, "any"),
            IpSpace::Empty => write!(f, "none"),
            IpSpace::Wildcard(w) => write!(f, "{w}"),
            IpSpace::Reference(name) => write!(f, "@{name}"),
            IpSpace::Acl(lines) => {
                write!(f, "[")?;
                for (i, line) in lines.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match line.action {
                        Action::Permit => write!(f, "{}", line.space)?,
                        Action::Deny => write!(f, "deny {}", line.space)?,
                    }
                }
                write!(f, "]")
            }
        }
    }
}
