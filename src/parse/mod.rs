mod error;
mod grammar;
mod parser;

use winnow::Parser;
use winnow::combinator::delimited;
use winnow::error::{ContextError, ParseError as WinnowError};

pub use error::ParseError;
pub use parser::{ParsedDevice, ParsedNetwork};

use crate::{IpSpace, IpWildcard, MatchExpr, PortRange};

fn convert(input: &str, err: &WinnowError<&str, ContextError>) -> ParseError {
    ParseError::new(err.inner().to_string()).at_offset(input, err.offset())
}

/// Parse a network DSL string into a [`ParsedNetwork`].
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not valid DSL syntax.
pub fn parse(input: &str) -> Result<ParsedNetwork, ParseError> {
    grammar::parse_network
        .parse(input)
        .map_err(|e| convert(input, &e))
}

/// Parse a standalone match condition, e.g. `src 10.0.0.0/8 AND dport 22`.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a valid condition.
pub fn parse_match_expr(input: &str) -> Result<MatchExpr, ParseError> {
    delimited(grammar::ws, grammar::expr, grammar::ws)
        .parse(input)
        .map_err(|e| convert(input, &e))
}

pub(crate) fn parse_ip_space(input: &str) -> Result<IpSpace, ParseError> {
    delimited(grammar::ws, grammar::ip_space, grammar::ws)
        .parse(input)
        .map_err(|e| convert(input, &e))
}

pub(crate) fn parse_wildcard(input: &str) -> Result<IpWildcard, ParseError> {
    delimited(grammar::ws, grammar::wildcard, grammar::ws)
        .parse(input)
        .map_err(|e| convert(input, &e))
}

pub(crate) fn parse_port_range(input: &str) -> Result<PortRange, ParseError> {
    delimited(grammar::ws, grammar::port_range, grammar::ws)
        .parse(input)
        .map_err(|e| convert(input, &e))
}
