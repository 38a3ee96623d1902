use std::net::Ipv4Addr;

use winnow::ascii::{dec_uint, till_line_ending};
use winnow::combinator::{alt, cut_err, delimited, not, opt, preceded, repeat, separated, terminated};
use winnow::error::{ContextError, ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use crate::{
    Action, Filter, HeaderSpace, IpSpace, IpSpaceLine, IpWildcard, Line, LineKind, MatchExpr,
    PROTO_ICMP, PROTO_TCP, PROTO_UDP, PortRange,
};

use super::parser::{ParsedDevice, ParsedNetwork};

// -- Whitespace & comments --------------------------------------------------

pub(super) fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
            ('#', till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

// -- Identifiers & keywords -------------------------------------------------

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '~')
}

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., is_ident_char).parse_next(input)
}

fn ident_list(input: &mut &str) -> ModalResult<Vec<String>> {
    separated(1.., ident.map(str::to_owned), (ws, ',', ws)).parse_next(input)
}

/// A keyword that is not the prefix of a longer identifier.
fn keyword<'i>(kw: &'static str) -> impl Parser<&'i str, &'i str, ErrMode<ContextError>> {
    terminated(kw, not(one_of(is_ident_char)))
}

fn expected(what: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(what))
}

// -- Addresses, ports, protocols --------------------------------------------

fn ipv4(input: &mut &str) -> ModalResult<Ipv4Addr> {
    take_while(1.., |c: char| c.is_ascii_digit() || c == '.')
        .try_map(str::parse::<Ipv4Addr>)
        .parse_next(input)
}

pub(super) fn wildcard(input: &mut &str) -> ModalResult<IpWildcard> {
    let ip = ipv4.parse_next(input)?;
    if opt('/').parse_next(input)?.is_some() {
        let len = cut_err(dec_uint::<_, u8, _>.verify(|n: &u8| *n <= 32))
            .context(expected("prefix length"))
            .parse_next(input)?;
        return Ok(IpWildcard::prefix(ip, len));
    }
    if opt(':').parse_next(input)?.is_some() {
        let mask = cut_err(ipv4)
            .context(expected("wildcard mask"))
            .parse_next(input)?;
        return Ok(IpWildcard::new(ip, mask));
    }
    Ok(IpWildcard::host(ip))
}

fn ip_space_line(input: &mut &str) -> ModalResult<IpSpaceLine> {
    let action = opt(terminated(
        alt((
            keyword("permit").value(Action::Permit),
            keyword("deny").value(Action::Deny),
        )),
        ws,
    ))
    .parse_next(input)?;
    let space = match action {
        Some(_) => cut_err(ip_space).parse_next(input)?,
        None => ip_space.parse_next(input)?,
    };
    Ok(IpSpaceLine {
        action: action.unwrap_or(Action::Permit),
        space,
    })
}

fn ip_space_lines(input: &mut &str) -> ModalResult<Vec<IpSpaceLine>> {
    delimited(
        ('[', ws),
        separated(0.., ip_space_line, (ws, ',', ws)),
        (ws, cut_err(']')),
    )
    .parse_next(input)
}

pub(super) fn ip_space(input: &mut &str) -> ModalResult<IpSpace> {
    alt((
        keyword("any").value(IpSpace::Universe),
        keyword("none").value(IpSpace::Empty),
        preceded('@', cut_err(ident)).map(|name: &str| IpSpace::Reference(name.to_owned())),
        ip_space_lines.map(IpSpace::Acl),
        wildcard.map(IpSpace::Wildcard),
    ))
    .context(expected("ip space"))
    .parse_next(input)
}

pub(super) fn port_range(input: &mut &str) -> ModalResult<PortRange> {
    let start = dec_uint::<_, u16, _>.parse_next(input)?;
    let end = opt(preceded('-', cut_err(dec_uint::<_, u16, _>))).parse_next(input)?;
    Ok(PortRange::new(start, end.unwrap_or(start)))
}

fn protocol(input: &mut &str) -> ModalResult<u8> {
    alt((
        keyword("tcp").value(PROTO_TCP),
        keyword("udp").value(PROTO_UDP),
        keyword("icmp").value(PROTO_ICMP),
        dec_uint::<_, u8, _>,
    ))
    .context(expected("protocol"))
    .parse_next(input)
}

// -- Header spaces ----------------------------------------------------------

enum HeaderClause {
    Src(IpSpace),
    Dst(IpSpace),
    NotSrc(IpSpace),
    NotDst(IpSpace),
    Protocols(Vec<u8>),
    SrcPorts(Vec<PortRange>),
    DstPorts(Vec<PortRange>),
}

fn clause_space(input: &mut &str) -> ModalResult<IpSpace> {
    preceded(ws, cut_err(ip_space)).parse_next(input)
}

fn port_list(input: &mut &str) -> ModalResult<Vec<PortRange>> {
    preceded(ws, cut_err(separated(1.., port_range, (ws, ',', ws))))
        .context(expected("port list"))
        .parse_next(input)
}

fn protocol_list(input: &mut &str) -> ModalResult<Vec<u8>> {
    preceded(ws, cut_err(separated(1.., protocol, (ws, ',', ws)))).parse_next(input)
}

fn header_clause(input: &mut &str) -> ModalResult<HeaderClause> {
    alt((
        preceded(keyword("src"), clause_space).map(HeaderClause::Src),
        preceded(keyword("dst"), clause_space).map(HeaderClause::Dst),
        preceded(keyword("not-src"), clause_space).map(HeaderClause::NotSrc),
        preceded(keyword("not-dst"), clause_space).map(HeaderClause::NotDst),
        preceded(keyword("proto"), protocol_list).map(HeaderClause::Protocols),
        preceded(keyword("sport"), port_list).map(HeaderClause::SrcPorts),
        preceded(keyword("dport"), port_list).map(HeaderClause::DstPorts),
    ))
    .parse_next(input)
}

/// Adjacent header clauses merge into one header space. Returns false if the
/// clause sets a field that is already set.
fn apply_clause(hs: &mut HeaderSpace, clause: HeaderClause) -> bool {
    fn set_space(slot: &mut Option<IpSpace>, space: IpSpace) -> bool {
        slot.replace(space).is_none()
    }
    fn set_list<T>(slot: &mut Vec<T>, items: Vec<T>) -> bool {
        let fresh = slot.is_empty();
        *slot = items;
        fresh
    }
    match clause {
        HeaderClause::Src(s) => set_space(&mut hs.src_ips, s),
        HeaderClause::Dst(s) => set_space(&mut hs.dst_ips, s),
        HeaderClause::NotSrc(s) => set_space(&mut hs.not_src_ips, s),
        HeaderClause::NotDst(s) => set_space(&mut hs.not_dst_ips, s),
        HeaderClause::Protocols(p) => set_list(&mut hs.ip_protocols, p),
        HeaderClause::SrcPorts(p) => set_list(&mut hs.src_ports, p),
        HeaderClause::DstPorts(p) => set_list(&mut hs.dst_ports, p),
    }
}

fn header(input: &mut &str) -> ModalResult<HeaderSpace> {
    let first = header_clause.parse_next(input)?;
    let rest: Vec<HeaderClause> = repeat(0.., preceded(ws, header_clause)).parse_next(input)?;
    let mut hs = HeaderSpace::default();
    for clause in std::iter::once(first).chain(rest) {
        if !apply_clause(&mut hs, clause) {
            return Err(ErrMode::from_input(input).cut());
        }
    }
    Ok(hs)
}

// -- Match expressions (precedence: OR < AND < NOT < primary) ---------------

fn primary(input: &mut &str) -> ModalResult<MatchExpr> {
    ws.parse_next(input)?;
    alt((
        delimited('(', expr, (ws, cut_err(')'))),
        keyword("true").value(MatchExpr::True),
        keyword("false").value(MatchExpr::False),
        keyword("from-device").value(MatchExpr::FromDevice),
        keyword("any").value(MatchExpr::Header(HeaderSpace::default())),
        preceded((keyword("permitted-by"), ws), cut_err(ident))
            .map(|name: &str| MatchExpr::PermittedBy(name.to_owned())),
        preceded((keyword("denied-by"), ws), cut_err(ident))
            .map(|name: &str| MatchExpr::DeniedBy(name.to_owned())),
        preceded((keyword("in-iface"), ws), cut_err(ident_list)).map(MatchExpr::SrcInterface),
        header.map(MatchExpr::Header),
    ))
    .context(expected("match condition"))
    .parse_next(input)
}

fn unary(input: &mut &str) -> ModalResult<MatchExpr> {
    ws.parse_next(input)?;
    if opt(alt((keyword("NOT"), keyword("not"))))
        .parse_next(input)?
        .is_some()
    {
        let inner = cut_err(unary).parse_next(input)?;
        Ok(MatchExpr::Not(Box::new(inner)))
    } else {
        primary(input)
    }
}

fn junction(first: MatchExpr, rest: Vec<MatchExpr>, make: fn(Vec<MatchExpr>) -> MatchExpr) -> MatchExpr {
    if rest.is_empty() {
        first
    } else {
        let mut items = Vec::with_capacity(rest.len() + 1);
        items.push(first);
        items.extend(rest);
        make(items)
    }
}

fn and_expr(input: &mut &str) -> ModalResult<MatchExpr> {
    let first = unary(input)?;
    let rest: Vec<MatchExpr> = repeat(
        0..,
        preceded((ws, alt((keyword("AND"), keyword("and")))), cut_err(unary)),
    )
    .parse_next(input)?;
    Ok(junction(first, rest, MatchExpr::And))
}

fn or_expr(input: &mut &str) -> ModalResult<MatchExpr> {
    let first = and_expr(input)?;
    let rest: Vec<MatchExpr> = repeat(
        0..,
        preceded((ws, alt((keyword("OR"), keyword("or")))), cut_err(and_expr)),
    )
    .parse_next(input)?;
    Ok(junction(first, rest, MatchExpr::Or))
}

pub(super) fn expr(input: &mut &str) -> ModalResult<MatchExpr> {
    ws.parse_next(input)?;
    or_expr(input)
}

// -- Lines, filters, devices ------------------------------------------------

fn line_kind(input: &mut &str) -> ModalResult<LineKind> {
    alt((
        (
            alt((
                keyword("permit").value(Action::Permit),
                keyword("deny").value(Action::Deny),
            )),
            cut_err(expr),
        )
            .map(|(action, condition)| LineKind::Match { action, condition }),
        preceded((keyword("call"), ws), cut_err(ident).context(expected("filter name")))
            .map(|filter: &str| LineKind::Call {
                filter: filter.to_owned(),
            }),
    ))
    .parse_next(input)
}

fn line(input: &mut &str) -> ModalResult<Line> {
    ws.parse_next(input)?;
    let (kind, text) = line_kind.with_taken().parse_next(input)?;
    let name = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(Line {
        name: Some(name),
        kind,
    })
}

fn filter_def(input: &mut &str) -> ModalResult<Filter> {
    let composite = opt(terminated(keyword("composite"), ws))
        .parse_next(input)?
        .is_some();
    if composite {
        cut_err(keyword("filter")).parse_next(input)?;
    } else {
        keyword("filter").parse_next(input)?;
    }
    ws.parse_next(input)?;
    let name = cut_err(ident)
        .context(expected("filter name"))
        .parse_next(input)?;
    ws.parse_next(input)?;
    cut_err('{').parse_next(input)?;
    let lines: Vec<Line> = repeat(0.., line).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err('}')
        .context(expected("line or '}'"))
        .parse_next(input)?;
    Ok(Filter {
        name: name.to_owned(),
        lines,
        composite,
    })
}

enum DeviceItem {
    Interfaces(Vec<String>),
    IpSpace(String, IpSpace),
    Filter(Filter),
}

fn ip_space_def(input: &mut &str) -> ModalResult<(String, IpSpace)> {
    let name = cut_err(ident)
        .context(expected("ip space name"))
        .parse_next(input)?;
    (ws, cut_err('='), ws).parse_next(input)?;
    let space = cut_err(ip_space).parse_next(input)?;
    Ok((name.to_owned(), space))
}

fn device_item(input: &mut &str) -> ModalResult<DeviceItem> {
    ws.parse_next(input)?;
    alt((
        preceded((keyword("interface"), ws), cut_err(ident_list)).map(DeviceItem::Interfaces),
        preceded((keyword("ip-space"), ws), ip_space_def)
            .map(|(name, space)| DeviceItem::IpSpace(name, space)),
        filter_def.map(DeviceItem::Filter),
    ))
    .parse_next(input)
}

fn device_def(input: &mut &str) -> ModalResult<ParsedDevice> {
    ws.parse_next(input)?;
    keyword("device").parse_next(input)?;
    ws.parse_next(input)?;
    let name = cut_err(ident)
        .context(expected("device name"))
        .parse_next(input)?;
    ws.parse_next(input)?;
    cut_err('{').parse_next(input)?;
    let items: Vec<DeviceItem> = repeat(0.., device_item).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err('}')
        .context(expected("device item or '}'"))
        .parse_next(input)?;

    let mut device = ParsedDevice {
        name: name.to_owned(),
        ..ParsedDevice::default()
    };
    for item in items {
        match item {
            DeviceItem::Interfaces(names) => device.interfaces.extend(names),
            DeviceItem::IpSpace(name, space) => device.ip_spaces.push((name, space)),
            DeviceItem::Filter(filter) => device.filters.push(filter),
        }
    }
    Ok(device)
}

// -- Top-level parser -------------------------------------------------------

pub fn parse_network(input: &mut &str) -> ModalResult<ParsedNetwork> {
    let devices: Vec<ParsedDevice> = repeat(0.., device_def).parse_next(input)?;
    ws.parse_next(input)?;
    Ok(ParsedNetwork { devices })
}

#[cfg(test)]
mod tests {
    use crate::parse::{parse, parse_match_expr};

    use super::*;

    fn lines_of(input: &str) -> Vec<Line> {
        let parsed = parse(input).unwrap();
        parsed.devices[0].filters[0].lines.clone()
    }

    #[test]
    fn parse_empty_device() {
        let parsed = parse("device r1 { }").unwrap();
        assert_eq!(parsed.devices.len(), 1);
        assert_eq!(parsed.devices[0].name, "r1");
        assert!(parsed.devices[0].filters.is_empty());
    }

    #[test]
    fn parse_interfaces_and_ip_spaces() {
        let parsed = parse(
            "device r1 {\n  interface eth0, GigabitEthernet0/1\n  ip-space servers = 10.0.0.0/8\n}",
        )
        .unwrap();
        let device = &parsed.devices[0];
        assert_eq!(device.interfaces, vec!["eth0", "GigabitEthernet0/1"]);
        assert_eq!(
            device.ip_spaces,
            vec![(
                "servers".to_owned(),
                IpSpace::prefix(Ipv4Addr::new(10, 0, 0, 0), 8)
            )]
        );
    }

    #[test]
    fn line_names_are_source_text() {
        let lines = lines_of(
            "device r { filter f {\n  permit src 1.0.0.0/24   dport 22 # ssh\n  call other\n} }",
        );
        assert_eq!(lines[0].name.as_deref(), Some("permit src 1.0.0.0/24 dport 22"));
        assert_eq!(lines[1].name.as_deref(), Some("call other"));
        assert_eq!(lines[1].kind, LineKind::Call { filter: "other".into() });
    }

    #[test]
    fn header_clauses_merge() {
        let e = parse_match_expr("src 1.1.1.1 dst 2.0.0.0:0.0.0.255 proto tcp,udp sport 1-1024").unwrap();
        let expected = HeaderSpace::new()
            .src(IpSpace::host(Ipv4Addr::new(1, 1, 1, 1)))
            .dst(IpWildcard::new(
                Ipv4Addr::new(2, 0, 0, 0),
                Ipv4Addr::new(0, 0, 0, 255),
            ))
            .protocols([PROTO_TCP, PROTO_UDP])
            .src_ports([PortRange::new(1, 1024)]);
        assert_eq!(e, MatchExpr::Header(expected));
    }

    #[test]
    fn repeated_header_field_is_error() {
        assert!(parse_match_expr("src 1.1.1.1 src 2.2.2.2").is_err());
    }

    #[test]
    fn precedence_and_before_or() {
        let e = parse_match_expr("from-device OR permitted-by a AND NOT denied-by b").unwrap();
        match e {
            MatchExpr::Or(items) => {
                assert_eq!(items[0], MatchExpr::FromDevice);
                assert!(matches!(&items[1], MatchExpr::And(v) if v.len() == 2));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn keywords_need_word_boundary() {
        // "not-src" must not be read as NOT followed by garbage
        let e = parse_match_expr("not-src @blocked").unwrap();
        assert_eq!(
            e,
            MatchExpr::Header(HeaderSpace::new().not_src(IpSpace::reference("blocked")))
        );
    }

    #[test]
    fn acl_ip_space() {
        let e = parse_match_expr("dst [deny 10.0.0.1, 10.0.0.0/24]").unwrap();
        let space = IpSpace::acl([
            IpSpaceLine::deny(Ipv4Addr::new(10, 0, 0, 1)),
            IpSpaceLine::permit(IpSpace::prefix(Ipv4Addr::new(10, 0, 0, 0), 24)),
        ]);
        assert_eq!(e, MatchExpr::Header(HeaderSpace::new().dst(space)));
    }

    #[test]
    fn empty_acl_ip_space() {
        let e = parse_match_expr("src []").unwrap();
        assert_eq!(e, MatchExpr::Header(HeaderSpace::new().src(IpSpace::Acl(vec![]))));
    }

    #[test]
    fn in_iface_list() {
        let e = parse_match_expr("in-iface eth0, eth1").unwrap();
        assert_eq!(
            e,
            MatchExpr::SrcInterface(vec!["eth0".into(), "eth1".into()])
        );
    }

    #[test]
    fn composite_filter() {
        let parsed = parse("device r { composite filter gen { deny any } }").unwrap();
        assert!(parsed.devices[0].filters[0].composite);
    }

    #[test]
    fn comments_ignored() {
        let parsed = parse("# header\ndevice r {\n # inner\n filter f { permit true }\n}\n# trailing").unwrap();
        assert_eq!(parsed.devices[0].filters[0].lines.len(), 1);
    }

    #[test]
    fn prefix_length_out_of_range() {
        assert!(parse_match_expr("src 1.0.0.0/33").is_err());
    }

    #[test]
    fn unterminated_filter_is_error() {
        assert!(parse("device r { filter f { permit true }").is_err());
    }

    #[test]
    fn display_round_trips() {
        let source = "((src 1.0.0.0/24 dport 80 AND (NOT in-iface e0,e1)) OR permitted-by x OR from-device)";
        let e = parse_match_expr(source).unwrap();
        assert_eq!(e.to_string(), source);
        assert_eq!(parse_match_expr(&e.to_string()).unwrap(), e);
    }
}
