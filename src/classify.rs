use tracing::debug;

use crate::compile::LineCompiler;
use crate::packet::{PacketVars, PermitAndDeny};
use crate::{AnalysisError, CanonicalFilter, UnreachableLine};

/// Classify every line of `canonical` that can never match, in line order.
///
/// Reachable lines and in-cycle lines produce no entry; cycles are reported
/// separately.
///
/// # Errors
///
/// Returns [`AnalysisError::InterfaceCapacity`] if `vars` cannot encode all
/// of the filter's interfaces.
pub fn classify(
    canonical: &CanonicalFilter,
    vars: &PacketVars,
) -> Result<Vec<(usize, UnreachableLine)>, AnalysisError> {
    let interfaces = canonical.interfaces().len();
    if interfaces > vars.max_interfaces() {
        return Err(AnalysisError::InterfaceCapacity {
            filter: canonical.filter().name.clone(),
            interfaces,
            capacity: vars.max_interfaces(),
        });
    }

    let mut compiler = LineCompiler::new(
        vars,
        canonical.dependencies(),
        canonical.interfaces().iter().map(String::as_str),
    );
    let pairs: Vec<PermitAndDeny> = canonical
        .filter()
        .lines
        .iter()
        .map(|line| compiler.compile_line(line))
        .collect();

    let mut unmatched = vars.mk_true();
    let mut findings = Vec::new();
    for (index, pair) in pairs.iter().enumerate() {
        let matched = pair.match_bdd();
        if canonical.cycle_lines().contains(&index) {
            // covered by the cycle report
        } else if pair.is_zero() {
            let finding = if canonical.undefined_lines().contains(&index) {
                UnreachableLine::UndefinedReference
            } else {
                UnreachableLine::IndependentlyUnmatchable
            };
            findings.push((index, finding));
        } else if unmatched.is_false() || matched.and(&unmatched).is_false() {
            let (blocking_lines, different_action) = find_blocking_lines(&pairs, index);
            findings.push((
                index,
                UnreachableLine::Blocked {
                    blocking_lines,
                    different_action,
                },
            ));
        }
        unmatched = unmatched.and_not(&matched);
    }

    debug!(
        filter = %canonical.filter().name,
        lines = pairs.len(),
        unreachable = findings.len(),
        "classified filter"
    );
    Ok(findings)
}

/// Pick the earlier lines that explain why line `index` is blocked.
///
/// Every earlier line overlapping what is left of the blocked line becomes a
/// candidate, weighted by how much of the blocked line it covers. Candidates
/// are then taken heaviest first (ties to the lower index) until the blocked
/// line is covered and, if any candidate disagrees on the action, one such
/// candidate is included. Returns the chosen indices ascending and whether
/// any candidate disagrees.
pub(crate) fn find_blocking_lines(pairs: &[PermitAndDeny], index: usize) -> (Vec<usize>, bool) {
    let blocked = &pairs[index];
    let blocked_match = blocked.match_bdd();

    let mut rest = blocked.clone();
    let mut different_action = false;
    let mut candidates: Vec<(usize, f64)> = Vec::new();
    for (i, prev) in pairs[..index].iter().enumerate() {
        if rest.is_zero() {
            break;
        }
        let prev_match = prev.match_bdd();
        if prev_match.and(&rest.match_bdd()).is_false() {
            continue;
        }
        candidates.push((i, prev_match.and(&blocked_match).cardinality()));
        different_action |= prev.takes_different_action(&rest);
        rest = rest.diff(&prev_match);
    }
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut rest = blocked.clone();
    let mut need_different = different_action;
    let mut chosen = Vec::new();
    for (i, _) in candidates {
        let current = &pairs[i];
        let current_different = current.takes_different_action(blocked);
        if !rest.is_zero() || (need_different && current_different) {
            rest = rest.diff(&current.match_bdd());
            chosen.push(i);
            need_different &= !current_different;
        }
        if rest.is_zero() && !need_different {
            break;
        }
    }
    chosen.sort_unstable();
    (chosen, different_action)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use biodivine_lib_bdd::Bdd;

    use super::*;
    use crate::{Action, IpWildcard, PROTO_TCP};

    fn pair(vars: &PacketVars, action: Action, bdd: Bdd) -> PermitAndDeny {
        match action {
            Action::Permit => PermitAndDeny::new(bdd, vars.mk_false()),
            Action::Deny => PermitAndDeny::new(vars.mk_false(), bdd),
        }
    }

    fn pairs(vars: &PacketVars, actions: &[Action], bdds: &[Bdd]) -> Vec<PermitAndDeny> {
        actions
            .iter()
            .zip(bdds)
            .map(|(a, b)| pair(vars, *a, b.clone()))
            .collect()
    }

    fn dst_host(vars: &PacketVars, d: u8) -> Bdd {
        vars.dst_ip(&IpWildcard::host(Ipv4Addr::new(1, 2, 3, d)))
    }

    use Action::{Deny as D, Permit as P};

    #[test]
    fn small_blockers_are_ignored() {
        let vars = PacketVars::new(0);
        let src = |d| vars.src_ip(&IpWildcard::host(Ipv4Addr::new(1, 2, 3, d)));
        let ssh = vars.protocol(PROTO_TCP).and(&vars.dst_port_range(22, 22));
        let ssh_to_host = ssh.and(&vars.dst_ip(&IpWildcard::host(Ipv4Addr::new(2, 3, 4, 5))));
        let bdds = [src(1), src(2), src(3), ssh, ssh_to_host];

        let lines = pairs(&vars, &[D, D, D, P, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 4), (vec![0, 3], true));

        let lines = pairs(&vars, &[P, P, P, P, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 4), (vec![3], false));
    }

    #[test]
    fn partial_overlaps() {
        let vars = PacketVars::new(0);
        let a = dst_host(&vars, 4);
        let b = dst_host(&vars, 5);
        let bdds = [a.clone(), b.clone(), a.or(&b)];

        let lines = pairs(&vars, &[P, D, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 2), (vec![0, 1], true));

        let lines = pairs(&vars, &[P, P, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 2), (vec![0, 1], false));
    }

    #[test]
    fn partial_overlaps_dominate_full() {
        let vars = PacketVars::new(0);
        let slash31 = vars.dst_ip(&IpWildcard::prefix(Ipv4Addr::new(1, 2, 3, 4), 31));
        let bdds = [slash31, dst_host(&vars, 4), dst_host(&vars, 5)];
        let lines = pairs(&vars, &[P, D, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 2), (vec![0], false));
    }

    #[test]
    fn different_action_is_preserved() {
        let vars = PacketVars::new(0);
        let slash32 = dst_host(&vars, 4);
        let tcp_not_80 = slash32
            .and(&vars.protocol(PROTO_TCP))
            .and_not(&vars.dst_port_range(80, 80));
        let bdds = [tcp_not_80, slash32.clone(), slash32];

        let lines = pairs(&vars, &[D, P, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 2), (vec![0, 1], true));

        let lines = pairs(&vars, &[P, P, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 2), (vec![1], false));

        let lines = pairs(&vars, &[D, D, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 2), (vec![1], true));
    }

    #[test]
    fn same_action_is_not_reported_twice() {
        let vars = PacketVars::new(0);
        let tcp = vars.protocol(PROTO_TCP);
        let high_ports = tcp.and(&vars.src_port_range(1024, 65535));
        let bdds = [high_ports, tcp.clone(), tcp];

        let lines = pairs(&vars, &[P, D, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 2), (vec![1], true));

        let lines = pairs(&vars, &[D, D, P], &bdds);
        assert_eq!(find_blocking_lines(&lines, 2), (vec![1], true));
    }

    #[test]
    fn mixed_pairs_from_delegation() {
        let vars = PacketVars::new(0);
        let ip1 = dst_host(&vars, 1);
        let ip2 = dst_host(&vars, 2);
        let both = ip1.or(&ip2);
        let f = vars.mk_false();

        let lines = vec![
            PermitAndDeny::new(ip1.clone(), ip2.clone()),
            PermitAndDeny::new(ip1.clone(), ip2.clone()),
        ];
        assert_eq!(find_blocking_lines(&lines, 1), (vec![0], false));

        let lines = vec![
            PermitAndDeny::new(both.clone(), f.clone()),
            PermitAndDeny::new(ip1.clone(), ip2.clone()),
        ];
        assert_eq!(find_blocking_lines(&lines, 1), (vec![0], true));

        let lines = vec![
            PermitAndDeny::new(ip1, ip2),
            PermitAndDeny::new(both, f),
        ];
        assert_eq!(find_blocking_lines(&lines, 1), (vec![0], true));
    }

    mod laws {
        use std::collections::BTreeMap;
        use std::net::Ipv4Addr;

        use proptest::prelude::*;

        use super::super::*;
        use crate::{
            canonical_filters, denied_by, dst, from_device, permitted_by, src_interface,
            AnalysisConfig, FilterSelection, HeaderSpace, IpSpace, Line, MatchExpr, Network,
            PROTO_TCP, PROTO_UDP,
        };

        fn arb_leaf() -> impl Strategy<Value = MatchExpr> {
            prop_oneof![
                1 => Just(MatchExpr::True),
                1 => Just(from_device()),
                2 => prop::sample::select(vec!["e0", "e1"]).prop_map(|i| src_interface([i])),
                1 => Just(permitted_by("aux")),
                1 => Just(denied_by("aux")),
                2 => prop::sample::select(vec![PROTO_TCP, PROTO_UDP])
                    .prop_map(|p| MatchExpr::Header(HeaderSpace::new().protocols([p]))),
                4 => (0_u8..4, 30_u8..=32)
                    .prop_map(|(h, len)| dst(IpSpace::prefix(Ipv4Addr::new(10, 0, 0, h), len))),
            ]
        }

        fn arb_condition() -> impl Strategy<Value = MatchExpr> {
            arb_leaf().prop_recursive(2, 6, 2, |inner| {
                prop_oneof![
                    (inner.clone(), inner.clone()).prop_map(|(a, b)| a.and(b)),
                    (inner.clone(), inner.clone()).prop_map(|(a, b)| a.or(b)),
                    inner.prop_map(|e| !e),
                ]
            })
        }

        fn arb_acl() -> impl Strategy<Value = Vec<Line>> {
            let line = prop_oneof![
                6 => (any::<bool>(), arb_condition()).prop_map(|(permit, c)| {
                    if permit { Line::permit(c) } else { Line::deny(c) }
                }),
                1 => Just(Line::call("aux")),
            ];
            prop::collection::vec(line, 1..=8)
        }

        fn arb_aux() -> impl Strategy<Value = Vec<Line>> {
            let line = (any::<bool>(), 0_u8..4).prop_map(|(permit, h)| {
                let c = dst(IpSpace::host(Ipv4Addr::new(10, 0, 0, h)));
                if permit { Line::permit(c) } else { Line::deny(c) }
            });
            prop::collection::vec(line, 0..=3)
        }

        fn network(acl: Vec<Line>, aux: Vec<Line>) -> Network {
            Network::builder()
                .device("r1", move |d| {
                    d.interfaces(["e0", "e1", "e2"])
                        .filter("acl", move |mut f| {
                            for line in acl {
                                f = f.line(line);
                            }
                            f
                        })
                        .filter("aux", move |mut f| {
                            for line in aux {
                                f = f.line(line);
                            }
                            f
                        })
                })
                .build()
        }

        /// Recompile every line and check the findings against the predicates:
        /// a line outside a cycle has a finding exactly when nothing it matches
        /// is left unmatched by earlier lines, and the blocking lines of a
        /// blocked line cover all of it.
        fn check_findings(network: &Network) -> Result<(), TestCaseError> {
            let config = AnalysisConfig::default();
            let groups = canonical_filters(network, &FilterSelection::All, &config).unwrap();
            let vars = PacketVars::for_groups(&groups);
            for group in &groups {
                let canonical = group.filter();
                let findings: BTreeMap<usize, UnreachableLine> =
                    classify(canonical, &vars).unwrap().into_iter().collect();
                let mut compiler = LineCompiler::new(
                    &vars,
                    canonical.dependencies(),
                    canonical.interfaces().iter().map(String::as_str),
                );
                let pairs: Vec<PermitAndDeny> = canonical
                    .filter()
                    .lines
                    .iter()
                    .map(|line| compiler.compile_line(line))
                    .collect();

                let mut unmatched = vars.mk_true();
                for (index, pair) in pairs.iter().enumerate() {
                    let matched = pair.match_bdd();
                    if !canonical.cycle_lines().contains(&index) {
                        let reachable = !matched.and(&unmatched).is_false();
                        prop_assert_eq!(
                            reachable,
                            !findings.contains_key(&index),
                            "line {} of {}",
                            index,
                            canonical.filter().name
                        );
                    }
                    if let Some(UnreachableLine::Blocked { blocking_lines, .. }) =
                        findings.get(&index)
                    {
                        let covered = blocking_lines
                            .iter()
                            .fold(vars.mk_false(), |acc, &b| acc.or(&pairs[b].match_bdd()));
                        prop_assert!(
                            matched.and_not(&covered).is_false(),
                            "line {} not covered by {:?}",
                            index,
                            blocking_lines
                        );
                    }
                    unmatched = unmatched.and_not(&matched);
                }
            }
            Ok(())
        }

        #[test]
        fn demo_network_findings_match_predicates() {
            let network = Network::from_file("demos/network.acl").unwrap();
            check_findings(&network).unwrap();
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(128))]

            #[test]
            fn findings_match_predicates(acl in arb_acl(), aux in arb_aux()) {
                check_findings(&network(acl, aux))?;
            }
        }
    }
}
