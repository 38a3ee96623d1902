use std::fmt;

use serde::{Deserialize, Serialize};

/// The action a filter line takes on the packets it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Permit,
    Deny,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Permit => write!(f, "permit"),
            Action::Deny => write!(f, "deny"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Action::Permit.to_string(), "permit");
        assert_eq!(Action::Deny.to_string(), "deny");
    }

    #[test]
    fn serde_lowercase() {
        let json = serde_json::to_string(&Action::Deny).unwrap();
        assert_eq!(json, "\"deny\"");
        let back: Action = serde_json::from_str("\"permit\"").unwrap();
        assert_eq!(back, Action::Permit);
    }
}
