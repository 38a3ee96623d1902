use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use biodivine_lib_bdd::Bdd;

use crate::packet::{PacketVars, PermitAndDeny, SourceManager};
use crate::{Action, Filter, HeaderSpace, IpSpace, IpWildcard, Line, LineKind, MatchExpr};

/// Compiles the lines of one canonical filter into permit/deny predicates.
///
/// Filter references resolve against `dependencies`; each referenced filter
/// is folded once and memoized.
pub(crate) struct LineCompiler<'a> {
    vars: &'a PacketVars,
    sources: SourceManager<'a>,
    dependencies: &'a BTreeMap<String, Arc<Filter>>,
    valid: Bdd,
    memo: HashMap<String, PermitAndDeny>,
    in_progress: HashSet<String>,
}

impl<'a> LineCompiler<'a> {
    pub(crate) fn new(
        vars: &'a PacketVars,
        dependencies: &'a BTreeMap<String, Arc<Filter>>,
        interfaces: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let sources = SourceManager::new(vars, interfaces);
        let valid = sources.valid();
        Self {
            vars,
            sources,
            dependencies,
            valid,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Predicates of a top-level line, restricted to valid ingress sources.
    pub(crate) fn compile_line(&mut self, line: &Line) -> PermitAndDeny {
        self.line_pair(line).and(&self.valid)
    }

    fn line_pair(&mut self, line: &Line) -> PermitAndDeny {
        match &line.kind {
            LineKind::Match { action, condition } => {
                let matched = self.expr(condition);
                match action {
                    Action::Permit => PermitAndDeny::new(matched, self.vars.mk_false()),
                    Action::Deny => PermitAndDeny::new(self.vars.mk_false(), matched),
                }
            }
            LineKind::Call { filter } => self.filter_pair(filter),
        }
    }

    /// Packets the named filter explicitly permits and explicitly denies.
    /// Missing or re-entered filters match nothing.
    fn filter_pair(&mut self, name: &str) -> PermitAndDeny {
        if let Some(pair) = self.memo.get(name) {
            return pair.clone();
        }
        let Some(filter) = self.dependencies.get(name).cloned() else {
            return PermitAndDeny::zero(self.vars);
        };
        if !self.in_progress.insert(name.to_owned()) {
            return PermitAndDeny::zero(self.vars);
        }

        let mut permit = self.vars.mk_false();
        let mut deny = self.vars.mk_false();
        for line in filter.lines.iter().rev() {
            let pair = self.line_pair(line);
            let unmatched = pair.match_bdd().not();
            permit = pair.permit.or(&unmatched.and(&permit));
            deny = pair.deny.or(&unmatched.and(&deny));
        }

        self.in_progress.remove(name);
        let pair = PermitAndDeny::new(permit, deny);
        self.memo.insert(name.to_owned(), pair.clone());
        pair
    }

    fn expr(&mut self, expr: &MatchExpr) -> Bdd {
        match expr {
            MatchExpr::True => self.vars.mk_true(),
            MatchExpr::False => self.vars.mk_false(),
            MatchExpr::And(items) => {
                let mut acc = self.vars.mk_true();
                for item in items {
                    acc = acc.and(&self.expr(item));
                    if acc.is_false() {
                        break;
                    }
                }
                acc
            }
            MatchExpr::Or(items) => {
                let mut acc = self.vars.mk_false();
                for item in items {
                    acc = acc.or(&self.expr(item));
                }
                acc
            }
            MatchExpr::Not(inner) => self.expr(inner).not(),
            MatchExpr::Header(hs) => self.header(hs),
            MatchExpr::SrcInterface(names) => names
                .iter()
                .fold(self.vars.mk_false(), |acc, n| acc.or(&self.sources.interface(n))),
            MatchExpr::PermittedBy(name) => self.filter_pair(name).permit,
            MatchExpr::DeniedBy(name) => self.filter_pair(name).permit.not(),
            MatchExpr::FromDevice => self.sources.from_device(),
        }
    }

    fn header(&self, hs: &HeaderSpace) -> Bdd {
        let vars = self.vars;
        let mut acc = vars.mk_true();
        if let Some(space) = &hs.src_ips {
            acc = acc.and(&ip_space(vars, space, PacketVars::src_ip));
        }
        if let Some(space) = &hs.dst_ips {
            acc = acc.and(&ip_space(vars, space, PacketVars::dst_ip));
        }
        if let Some(space) = &hs.not_src_ips {
            acc = acc.and_not(&ip_space(vars, space, PacketVars::src_ip));
        }
        if let Some(space) = &hs.not_dst_ips {
            acc = acc.and_not(&ip_space(vars, space, PacketVars::dst_ip));
        }
        if !hs.ip_protocols.is_empty() {
            let protocols = hs
                .ip_protocols
                .iter()
                .fold(vars.mk_false(), |p, proto| p.or(&vars.protocol(*proto)));
            acc = acc.and(&protocols);
        }
        if !hs.src_ports.is_empty() {
            let ports = hs.src_ports.iter().fold(vars.mk_false(), |p, r| {
                p.or(&vars.src_port_range(r.start(), r.end()))
            });
            acc = acc.and(&ports);
        }
        if !hs.dst_ports.is_empty() {
            let ports = hs.dst_ports.iter().fold(vars.mk_false(), |p, r| {
                p.or(&vars.dst_port_range(r.start(), r.end()))
            });
            acc = acc.and(&ports);
        }
        acc
    }
}

/// Addresses in `space` on the field selected by `field`. Unresolved
/// references match nothing.
fn ip_space(
    vars: &PacketVars,
    space: &IpSpace,
    field: fn(&PacketVars, &IpWildcard) -> Bdd,
) -> Bdd {
    match space {
        IpSpace::Universe => vars.mk_true(),
        IpSpace::Empty | IpSpace::Reference(_) => vars.mk_false(),
        IpSpace::Wildcard(w) => field(vars, w),
        IpSpace::Acl(lines) => lines.iter().rev().fold(vars.mk_false(), |rest, line| {
            let here = ip_space(vars, &line.space, field);
            match line.action {
                Action::Permit => here.or(&rest),
                Action::Deny => rest.and_not(&here),
            }
        }),
    }
}
