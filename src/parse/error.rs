use std::fmt;

/// Errors produced when parsing DSL input or address/port literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    message: String,
    position: Option<(usize, usize)>,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    /// Attach the 1-based line and column of byte `offset` in `input`.
    pub(crate) fn at_offset(mut self, input: &str, offset: usize) -> Self {
        let before = &input[..offset.min(input.len())];
        let line = before.matches('\n').count() + 1;
        let column = before
            .rsplit('\n')
            .next()
            .map_or(0, |tail| tail.chars().count())
            + 1;
        self.position = Some((line, column));
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 1-based (line, column) where parsing failed, when known.
    #[must_use]
    pub fn position(&self) -> Option<(usize, usize)> {
        self.position
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some((line, column)) => write!(
                f,
                "parse error at line {line}, column {column}: {}",
                self.message
            ),
            None => write!(f, "parse error: {}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ParseError::new("duplicate filter 'f'");
        assert_eq!(err.to_string(), "parse error: duplicate filter 'f'");
    }

    #[test]
    fn position_from_offset() {
        let input = "device r {\n  filter f {\n    permit ?";
        let offset = input.find('?').unwrap();
        let err = ParseError::new("expected match condition").at_offset(input, offset);
        assert_eq!(err.position(), Some((3, 12)));
        assert_eq!(
            err.to_string(),
            "parse error at line 3, column 12: expected match condition"
        );
    }
}
