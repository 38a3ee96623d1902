use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Line, MatchExpr};

/// A named, ordered list of lines. The first matching line decides; packets
/// matching no line are denied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub name: String,
    pub lines: Vec<Line>,
    /// Generated by a configuration parser rather than written by a user.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub composite: bool,
}

impl Filter {
    #[must_use]
    pub fn new(name: &str, lines: Vec<Line>) -> Self {
        Self {
            name: name.to_owned(),
            lines,
            composite: false,
        }
    }

    #[must_use]
    pub fn builder(name: &str) -> FilterBuilder {
        FilterBuilder::new(name)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.composite {
            write!(f, "composite ")?;
        }
        writeln!(f, "filter {} {{", self.name)?;
        for line in &self.lines {
            writeln!(f, "    {line}")?;
        }
        write!(f, "}}")
    }
}

/// Builder for a [`Filter`].
///
/// # Example
///
/// ```
/// use aclreach::{Filter, permitted_by, MatchExpr};
///
/// let filter = Filter::builder("edge-in")
///     .permit(permitted_by("mgmt"))
///     .call("shared")
///     .deny(MatchExpr::True)
///     .build();
/// assert_eq!(filter.lines.len(), 3);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct FilterBuilder {
    name: String,
    lines: Vec<Line>,
    composite: bool,
}

impl FilterBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            lines: Vec::new(),
            composite: false,
        }
    }

    pub fn line(mut self, line: Line) -> Self {
        self.lines.push(line);
        self
    }

    pub fn permit(self, condition: impl Into<MatchExpr>) -> Self {
        self.line(Line::permit(condition))
    }

    pub fn deny(self, condition: impl Into<MatchExpr>) -> Self {
        self.line(Line::deny(condition))
    }

    pub fn call(self, filter: &str) -> Self {
        self.line(Line::call(filter))
    }

    pub fn composite(mut self) -> Self {
        self.composite = true;
        self
    }

    pub fn build(self) -> Filter {
        Filter {
            name: self.name,
            lines: self.lines,
            composite: self.composite,
        }
    }
}
