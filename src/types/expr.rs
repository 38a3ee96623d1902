use std::fmt;
use std::ops::Not;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{HeaderSpace, IpSpace};
use crate::parse::ParseError;

/// Match condition of a filter line.
///
/// `And`/`Or` are n-ary: an empty `And` is true, an empty `Or` is false.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchExpr {
    True,
    False,
    And(Vec<MatchExpr>),
    Or(Vec<MatchExpr>),
    Not(Box<MatchExpr>),
    Header(HeaderSpace),
    /// Packet entered the device on one of these interfaces.
    SrcInterface(Vec<String>),
    /// Packet is explicitly permitted by the named filter.
    PermittedBy(String),
    /// Packet is not permitted by the named filter (explicit or default deny).
    DeniedBy(String),
    /// Packet originates from the device itself.
    FromDevice,
}

impl MatchExpr {
    /// Conjunction, flattening into an existing `And`.
    #[must_use]
    pub fn and(self, other: MatchExpr) -> MatchExpr {
        match self {
            MatchExpr::And(mut items) => {
                items.push(other);
                MatchExpr::And(items)
            }
            first => MatchExpr::And(vec![first, other]),
        }
    }

    /// Disjunction, flattening into an existing `Or`.
    #[must_use]
    pub fn or(self, other: MatchExpr) -> MatchExpr {
        match self {
            MatchExpr::Or(mut items) => {
                items.push(other);
                MatchExpr::Or(items)
            }
            first => MatchExpr::Or(vec![first, other]),
        }
    }
}

impl Not for MatchExpr {
    type Output = MatchExpr;

    fn not(self) -> MatchExpr {
        MatchExpr::Not(Box::new(self))
    }
}

impl From<HeaderSpace> for MatchExpr {
    fn from(value: HeaderSpace) -> Self {
        MatchExpr::Header(value)
    }
}

impl FromStr for MatchExpr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parse::parse_match_expr(s)
    }
}

#[must_use]
pub fn permitted_by(filter: &str) -> MatchExpr {
    MatchExpr::PermittedBy(filter.to_owned())
}

#[must_use]
pub fn denied_by(filter: &str) -> MatchExpr {
    MatchExpr::DeniedBy(filter.to_owned())
}

#[must_use]
pub fn src_interface<'a>(names: impl IntoIterator<Item = &'a str>) -> MatchExpr {
    MatchExpr::SrcInterface(names.into_iter().map(str::to_owned).collect())
}

#[must_use]
pub fn from_device() -> MatchExpr {
    MatchExpr::FromDevice
}

/// Match on source addresses.
#[must_use]
pub fn src(space: impl Into<IpSpace>) -> MatchExpr {
    MatchExpr::Header(HeaderSpace::new().src(space))
}

/// Match on destination addresses.
#[must_use]
pub fn dst(space: impl Into<IpSpace>) -> MatchExpr {
    MatchExpr::Header(HeaderSpace::new().dst(space))
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[MatchExpr], op: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " {op} ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, ")")
}

impl fmt::Display for MatchExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchExpr::True => write!(f, "true"),
            MatchExpr::False => write!(f, "false"),
            MatchExpr::And(items) => match items.as_slice() {
                [] => write!(f, "true"),
                [only] => write!(f, "{only}"),
                _ => write_joined(f, items, "AND"),
            },
            MatchExpr::Or(items) => match items.as_slice() {
                [] => write!(f, "false"),
                [only] => write!(f, "{only}"),
                _ => write_joined(f, items, "OR"),
            },
            MatchExpr::Not(inner) => write!(f, "(NOT {inner})"),
            MatchExpr::Header(hs) => write!(f, "{hs}"),
            MatchExpr::SrcInterface(names) => write!(f, "in-iface {}", names.join(",")),
            MatchExpr::PermittedBy(name) => write!(f, "permitted-by {name}"),
            MatchExpr::DeniedBy(name) => write!(f, "denied-by {name}"),
            MatchExpr::FromDevice => write!(f, "from-device"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn and_flattens() {
        let e = permitted_by("a").and(permitted_by("b")).and(from_device());
        match e {
            MatchExpr::And(items) => assert_eq!(items.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn or_flattens() {
        let e = denied_by("a").or(denied_by("b")).or(MatchExpr::False);
        assert!(matches!(e, MatchExpr::Or(ref items) if items.len() == 3));
    }

    #[test]
    fn display_is_dsl_shaped() {
        let e = src(IpSpace::prefix(Ipv4Addr::new(1, 0, 0, 0), 24))
            .and(!src_interface(["eth0", "eth1"]))
            .or(permitted_by("other"));
        assert_eq!(
            e.to_string(),
            "((src 1.0.0.0/24 AND (NOT in-iface eth0,eth1)) OR permitted-by other)"
        );
    }

    #[test]
    fn degenerate_junctions_display_as_constants() {
        assert_eq!(MatchExpr::And(vec![]).to_string(), "true");
        assert_eq!(MatchExpr::Or(vec![]).to_string(), "false");
        assert_eq!(MatchExpr::And(vec![from_device()]).to_string(), "from-device");
    }

    #[test]
    fn serde_tagging() {
        let e = permitted_by("acl1").and(MatchExpr::True);
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"and":[{"permitted_by":"acl1"},"true"]}"#);
        let back: MatchExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
