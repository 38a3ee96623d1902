use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Action, Filter};

/// Why a row was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    CyclicalReference,
    BlockingLines,
    UndefinedReference,
    IndependentlyUnmatchable,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::CyclicalReference => "CYCLICAL_REFERENCE",
            Reason::BlockingLines => "BLOCKING_LINES",
            Reason::UndefinedReference => "UNDEFINED_REFERENCE",
            Reason::IndependentlyUnmatchable => "INDEPENDENTLY_UNMATCHABLE",
        };
        write!(f, "{s}")
    }
}

/// Classification of a line that can never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreachableLine {
    /// Every packet the line matches is matched by an earlier line.
    Blocked {
        /// Indices of the explaining earlier lines, ascending.
        blocking_lines: Vec<usize>,
        /// Some earlier line overlapping this one takes a different action.
        different_action: bool,
    },
    /// The line matches no packet at all.
    IndependentlyUnmatchable,
    /// The line referenced something that does not exist.
    UndefinedReference,
}

impl UnreachableLine {
    #[must_use]
    pub fn reason(&self) -> Reason {
        match self {
            UnreachableLine::Blocked { .. } => Reason::BlockingLines,
            UnreachableLine::IndependentlyUnmatchable => Reason::IndependentlyUnmatchable,
            UnreachableLine::UndefinedReference => Reason::UndefinedReference,
        }
    }
}

/// One finding. Column names follow the tabular answer format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityRow {
    #[serde(rename = "Sources")]
    sources: Vec<String>,
    #[serde(rename = "Unreachable_Line")]
    unreachable_line: Option<String>,
    #[serde(rename = "Unreachable_Line_Action")]
    unreachable_line_action: Option<Action>,
    #[serde(rename = "Blocking_Lines")]
    blocking_lines: Option<Vec<String>>,
    #[serde(rename = "Different_Action")]
    different_action: Option<bool>,
    #[serde(rename = "Reason")]
    reason: Reason,
    #[serde(rename = "Additional_Info")]
    additional_info: Option<String>,
}

impl ReachabilityRow {
    /// Row for a reference cycle among filters on `device`. `cycle` lists the
    /// filter names in traversal order, without repeating the first.
    pub(crate) fn cycle(device: &str, cycle: &[String]) -> Self {
        let mut path = cycle.to_vec();
        if let Some(first) = cycle.first() {
            path.push(first.clone());
        }
        Self {
            sources: vec![format!("{device}: {}", cycle.join(", "))],
            unreachable_line: None,
            unreachable_line_action: None,
            blocking_lines: None,
            different_action: None,
            reason: Reason::CyclicalReference,
            additional_info: Some(format!(
                "Cyclic references in node '{device}': {}",
                path.join(" -> ")
            )),
        }
    }

    /// Row for line `index` of `filter`, which should be the unsanitized
    /// filter so the text matches what the user wrote.
    pub(crate) fn line(
        sources: Vec<String>,
        filter: &Filter,
        index: usize,
        finding: &UnreachableLine,
    ) -> Self {
        let text = |i: usize| filter.lines.get(i).map(ToString::to_string);
        let (blocking_lines, different_action) = match finding {
            UnreachableLine::Blocked {
                blocking_lines,
                different_action,
            } => (
                blocking_lines.iter().filter_map(|&i| text(i)).collect(),
                *different_action,
            ),
            UnreachableLine::IndependentlyUnmatchable | UnreachableLine::UndefinedReference => {
                (Vec::new(), false)
            }
        };
        Self {
            sources,
            unreachable_line: text(index),
            unreachable_line_action: filter.lines.get(index).and_then(|l| l.action()),
            blocking_lines: Some(blocking_lines),
            different_action: Some(different_action),
            reason: finding.reason(),
            additional_info: None,
        }
    }

    /// Every "device: filter" pair sharing this result.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    #[must_use]
    pub fn unreachable_line(&self) -> Option<&str> {
        self.unreachable_line.as_deref()
    }

    #[must_use]
    pub fn unreachable_line_action(&self) -> Option<Action> {
        self.unreachable_line_action
    }

    /// Text of the blocking lines. Empty for non-blocking reasons, `None` for
    /// cycle rows.
    #[must_use]
    pub fn blocking_lines(&self) -> Option<&[String]> {
        self.blocking_lines.as_deref()
    }

    #[must_use]
    pub fn different_action(&self) -> Option<bool> {
        self.different_action
    }

    #[must_use]
    pub fn reason(&self) -> Reason {
        self.reason
    }

    #[must_use]
    pub fn additional_info(&self) -> Option<&str> {
        self.additional_info.as_deref()
    }
}

impl fmt::Display for ReachabilityRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.sources.join("; "), self.reason)?;
        if let Some(line) = &self.unreachable_line {
            write!(f, ": '{line}'")?;
        }
        if let Some(blocking) = self.blocking_lines.as_ref().filter(|b| !b.is_empty()) {
            write!(f, " blocked by ['{}']", blocking.join("', '"))?;
            if self.different_action == Some(true) {
                write!(f, " (different action)")?;
            }
        }
        if let Some(info) = &self.additional_info {
            write!(f, ": {info}")?;
        }
        Ok(())
    }
}

/// Result of [`analyze()`](crate::analyze).
#[derive(Debug, Clone)]
#[must_use]
pub struct ReachabilityReport {
    rows: Vec<ReachabilityRow>,
    canonical_filters: usize,
    duration: Duration,
}

impl ReachabilityReport {
    pub(crate) fn new(rows: Vec<ReachabilityRow>, canonical_filters: usize, duration: Duration) -> Self {
        Self {
            rows,
            canonical_filters,
            duration,
        }
    }

    /// Cycle rows first, then each canonical filter's rows in line order.
    #[must_use]
    pub fn rows(&self) -> &[ReachabilityRow] {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<ReachabilityRow> {
        self.rows
    }

    /// Rows with the given reason, in report order.
    #[must_use]
    pub fn rows_with_reason(&self, reason: Reason) -> impl Iterator<Item = &ReachabilityRow> {
        self.rows.iter().filter(move |r| r.reason == reason)
    }

    /// Number of distinct canonical filters that were classified.
    #[must_use]
    pub fn canonical_filters(&self) -> usize {
        self.canonical_filters
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// True if no defects were found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for ReachabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} findings across {} canonical filters, duration: {:?}",
            self.rows.len(),
            self.canonical_filters,
            self.duration
        )?;
        for row in &self.rows {
            write!(f, "\n  {row}")?;
        }
        Ok(())
    }
}
