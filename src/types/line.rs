use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Action, MatchExpr};

/// One line of a filter.
///
/// `name` is the text the line was written as, used when reporting. Lines
/// without a name are rendered from their structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Line {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: LineKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineKind {
    /// Take `action` on packets matching `condition`.
    Match {
        action: Action,
        condition: MatchExpr,
    },
    /// Hand the packet to another filter; packets it does not explicitly
    /// match fall through to the next line.
    Call { filter: String },
}

impl Line {
    #[must_use]
    pub fn new(action: Action, condition: impl Into<MatchExpr>) -> Self {
        Self {
            name: None,
            kind: LineKind::Match {
                action,
                condition: condition.into(),
            },
        }
    }

    #[must_use]
    pub fn permit(condition: impl Into<MatchExpr>) -> Self {
        Self::new(Action::Permit, condition)
    }

    #[must_use]
    pub fn deny(condition: impl Into<MatchExpr>) -> Self {
        Self::new(Action::Deny, condition)
    }

    #[must_use]
    pub fn call(filter: &str) -> Self {
        Self {
            name: None,
            kind: LineKind::Call {
                filter: filter.to_owned(),
            },
        }
    }

    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// The concrete action, if the line has one.
    #[must_use]
    pub fn action(&self) -> Option<Action> {
        match &self.kind {
            LineKind::Match { action, .. } => Some(*action),
            LineKind::Call { .. } => None,
        }
    }

    #[must_use]
    pub fn condition(&self) -> Option<&MatchExpr> {
        match &self.kind {
            LineKind::Match { condition, .. } => Some(condition),
            LineKind::Call { .. } => None,
        }
    }

    /// Same line with its condition replaced. Delegating lines are unchanged.
    #[must_use]
    pub(crate) fn with_condition(&self, condition: MatchExpr) -> Line {
        match &self.kind {
            LineKind::Match { action, .. } => Line {
                name: self.name.clone(),
                kind: LineKind::Match {
                    action: *action,
                    condition,
                },
            },
            LineKind::Call { .. } => self.clone(),
        }
    }

    /// A line that matches nothing, keeping this line's name and action.
    /// Delegating lines become `deny false`.
    #[must_use]
    pub(crate) fn unmatchable(&self) -> Line {
        Line {
            name: self.name.clone(),
            kind: LineKind::Match {
                action: self.action().unwrap_or(Action::Deny),
                condition: MatchExpr::False,
            },
        }
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineKind::Match { action, condition } => write!(f, "{action} {condition}"),
            LineKind::Call { filter } => write!(f, "call {filter}"),
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.kind),
        }
    }
}
