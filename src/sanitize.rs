use std::collections::BTreeMap;

use crate::{IpSpace, IpSpaceLine, Line, LineKind, MatchExpr, ReferenceError};

/// Replaces named IP-space references in match conditions with their
/// definitions, following chains of references transitively.
#[derive(Debug, Clone, Copy)]
pub struct HeaderSpaceSanitizer<'a> {
    named: &'a BTreeMap<String, IpSpace>,
}

impl<'a> HeaderSpaceSanitizer<'a> {
    #[must_use]
    pub fn new(named: &'a BTreeMap<String, IpSpace>) -> Self {
        Self { named }
    }

    /// Sanitize a line's condition. Delegating lines have no condition and
    /// come back unchanged.
    ///
    /// # Errors
    ///
    /// See [`sanitize_expr`](Self::sanitize_expr).
    pub fn sanitize_line(&self, line: &Line) -> Result<Line, ReferenceError> {
        match &line.kind {
            LineKind::Match { condition, .. } => {
                Ok(line.with_condition(self.sanitize_expr(condition)?))
            }
            LineKind::Call { .. } => Ok(line.clone()),
        }
    }

    /// Return an equivalent condition with no IP-space references.
    ///
    /// # Errors
    ///
    /// [`ReferenceError::Undefined`] if a referenced name is not defined, or
    /// [`ReferenceError::Circular`] if a name refers back to itself.
    pub fn sanitize_expr(&self, expr: &MatchExpr) -> Result<MatchExpr, ReferenceError> {
        match expr {
            MatchExpr::And(items) => Ok(MatchExpr::And(self.sanitize_all(items)?)),
            MatchExpr::Or(items) => Ok(MatchExpr::Or(self.sanitize_all(items)?)),
            MatchExpr::Not(inner) => Ok(MatchExpr::Not(Box::new(self.sanitize_expr(inner)?))),
            MatchExpr::Header(hs) => Ok(MatchExpr::Header(
                hs.try_map_ip_spaces(|space| self.resolve(space, &mut Vec::new()))?,
            )),
            MatchExpr::True
            | MatchExpr::False
            | MatchExpr::SrcInterface(_)
            | MatchExpr::PermittedBy(_)
            | MatchExpr::DeniedBy(_)
            | MatchExpr::FromDevice => Ok(expr.clone()),
        }
    }

    fn sanitize_all(&self, items: &[MatchExpr]) -> Result<Vec<MatchExpr>, ReferenceError> {
        items.iter().map(|e| self.sanitize_expr(e)).collect()
    }

    /// `path` holds the names being resolved, outermost first.
    fn resolve(&self, space: &IpSpace, path: &mut Vec<String>) -> Result<IpSpace, ReferenceError> {
        match space {
            IpSpace::Universe | IpSpace::Empty | IpSpace::Wildcard(_) => Ok(space.clone()),
            IpSpace::Reference(name) => {
                if path.contains(name) {
                    let mut cycle = path.clone();
                    cycle.push(name.clone());
                    return Err(ReferenceError::Circular { path: cycle });
                }
                let target = self
                    .named
                    .get(name)
                    .ok_or_else(|| ReferenceError::Undefined { name: name.clone() })?;
                path.push(name.clone());
                let resolved = self.resolve(target, path);
                path.pop();
                resolved
            }
            IpSpace::Acl(lines) => lines
                .iter()
                .map(|line| {
                    Ok(IpSpaceLine {
                        action: line.action,
                        space: self.resolve(&line.space, path)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(IpSpace::Acl),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::{HeaderSpace, dst, permitted_by, src};

    fn table(entries: &[(&str, IpSpace)]) -> BTreeMap<String, IpSpace> {
        entries
            .iter()
            .map(|(n, s)| ((*n).to_owned(), s.clone()))
            .collect()
    }

    fn host(last: u8) -> IpSpace {
        IpSpace::host(Ipv4Addr::new(1, 1, 1, last))
    }

    #[test]
    fn chain_resolves_transitively() {
        let named = table(&[
            ("a", IpSpace::reference("b")),
            ("b", host(1)),
        ]);
        let sanitizer = HeaderSpaceSanitizer::new(&named);
        let out = sanitizer.sanitize_expr(&src(IpSpace::reference("a"))).unwrap();
        assert_eq!(out, src(host(1)));
    }

    #[test]
    fn references_inside_acl_spaces() {
        let named = table(&[("blocked", host(2))]);
        let sanitizer = HeaderSpaceSanitizer::new(&named);
        let expr = dst(IpSpace::acl([
            IpSpaceLine::deny(IpSpace::reference("blocked")),
            IpSpaceLine::permit(IpSpace::Universe),
        ]));
        let out = sanitizer.sanitize_expr(&expr).unwrap();
        assert_eq!(
            out,
            dst(IpSpace::acl([
                IpSpaceLine::deny(host(2)),
                IpSpaceLine::permit(IpSpace::Universe),
            ]))
        );
    }

    #[test]
    fn undefined_tail() {
        let named = table(&[("a", IpSpace::reference("missing"))]);
        let sanitizer = HeaderSpaceSanitizer::new(&named);
        let err = sanitizer
            .sanitize_expr(&src(IpSpace::reference("a")))
            .unwrap_err();
        assert_eq!(
            err,
            ReferenceError::Undefined {
                name: "missing".into()
            }
        );
    }

    #[test]
    fn circular_chain() {
        let named = table(&[
            ("a", IpSpace::reference("b")),
            ("b", IpSpace::reference("a")),
        ]);
        let sanitizer = HeaderSpaceSanitizer::new(&named);
        let err = sanitizer
            .sanitize_expr(&src(IpSpace::reference("a")))
            .unwrap_err();
        assert_eq!(
            err,
            ReferenceError::Circular {
                path: vec!["a".into(), "b".into(), "a".into()]
            }
        );
    }

    #[test]
    fn same_name_twice_in_one_space_is_not_circular() {
        let named = table(&[("a", host(3))]);
        let sanitizer = HeaderSpaceSanitizer::new(&named);
        let expr = src(IpSpace::acl([
            IpSpaceLine::permit(IpSpace::reference("a")),
            IpSpaceLine::deny(IpSpace::reference("a")),
        ]));
        assert!(sanitizer.sanitize_expr(&expr).is_ok());
    }

    #[test]
    fn nested_in_boolean_structure() {
        let named = table(&[("n", host(4))]);
        let sanitizer = HeaderSpaceSanitizer::new(&named);
        let expr = !(permitted_by("f").or(MatchExpr::Header(
            HeaderSpace::new().not_src(IpSpace::reference("n")),
        )));
        let out = sanitizer.sanitize_expr(&expr).unwrap();
        let expected = !(permitted_by("f").or(MatchExpr::Header(HeaderSpace::new().not_src(host(4)))));
        assert_eq!(out, expected);
    }

    #[test]
    fn original_is_untouched() {
        let named = table(&[("n", host(5))]);
        let line = Line::permit(src(IpSpace::reference("n"))).named("l");
        let sanitized = HeaderSpaceSanitizer::new(&named).sanitize_line(&line).unwrap();
        assert_ne!(sanitized, line);
        assert_eq!(line.condition(), Some(&src(IpSpace::reference("n"))));
        assert_eq!(sanitized.name.as_deref(), Some("l"));
    }

    #[test]
    fn call_lines_pass_through() {
        let named = BTreeMap::new();
        let line = Line::call("other");
        assert_eq!(HeaderSpaceSanitizer::new(&named).sanitize_line(&line).unwrap(), line);
    }
}
