use biodivine_lib_bdd::{Bdd, BddVariable, BddVariableSet, BddVariableSetBuilder};

use crate::{CanonicalGroup, IpWildcard};

/// A fixed-width unsigned field encoded as BDD variables, most significant
/// bit first.
#[derive(Debug, Clone)]
struct BitField {
    bits: Vec<BddVariable>,
}

impl BitField {
    fn new(builder: &mut BddVariableSetBuilder, name: &str, width: u32) -> Self {
        let bits = (0..width)
            .map(|i| builder.make_variable(&format!("{name}.{i}")))
            .collect();
        Self { bits }
    }

    fn width(&self) -> u32 {
        self.bits.len() as u32
    }

    /// Bit `i` of `value`, counting from the most significant bit.
    fn bit(&self, value: u64, i: usize) -> bool {
        let shift = self.bits.len() - 1 - i;
        (value >> shift) & 1 == 1
    }

    /// Field bits selected by `care` equal those of `value`.
    fn masked(&self, vars: &BddVariableSet, value: u64, care: u64) -> Bdd {
        self.bits
            .iter()
            .enumerate()
            .filter(|(i, _)| self.bit(care, *i))
            .fold(vars.mk_true(), |acc, (i, var)| {
                acc.and(&vars.mk_literal(*var, self.bit(value, i)))
            })
    }

    fn value(&self, vars: &BddVariableSet, value: u64) -> Bdd {
        self.masked(vars, value, u64::MAX)
    }

    /// field <= bound
    fn leq(&self, vars: &BddVariableSet, bound: u64) -> Bdd {
        let mut result = vars.mk_true();
        for (i, var) in self.bits.iter().enumerate().rev() {
            result = if self.bit(bound, i) {
                vars.mk_not_var(*var).or(&result)
            } else {
                vars.mk_not_var(*var).and(&result)
            };
        }
        result
    }

    /// field >= bound
    fn geq(&self, vars: &BddVariableSet, bound: u64) -> Bdd {
        let mut result = vars.mk_true();
        for (i, var) in self.bits.iter().enumerate().rev() {
            result = if self.bit(bound, i) {
                vars.mk_var(*var).and(&result)
            } else {
                vars.mk_var(*var).or(&result)
            };
        }
        result
    }

    fn range(&self, vars: &BddVariableSet, low: u64, high: u64) -> Bdd {
        self.geq(vars, low).and(&self.leq(vars, high))
    }
}

/// Number of bits needed to represent `n` (at least one).
fn bit_length(n: usize) -> u32 {
    (usize::BITS - n.leading_zeros()).max(1)
}

/// The BDD variable layout for packets: source IP, destination IP, protocol,
/// source port, destination port, then the ingress-source field.
///
/// Created once per analysis run and shared read-only between workers.
#[derive(Debug, Clone)]
pub struct PacketVars {
    vars: BddVariableSet,
    src_ip: BitField,
    dst_ip: BitField,
    protocol: BitField,
    src_port: BitField,
    dst_port: BitField,
    source: BitField,
}

impl PacketVars {
    /// Layout able to encode up to `max_interfaces` ingress interfaces plus
    /// the device itself.
    #[must_use]
    pub fn new(max_interfaces: usize) -> Self {
        let mut builder = BddVariableSetBuilder::new();
        let src_ip = BitField::new(&mut builder, "src_ip", 32);
        let dst_ip = BitField::new(&mut builder, "dst_ip", 32);
        let protocol = BitField::new(&mut builder, "ip_protocol", 8);
        let src_port = BitField::new(&mut builder, "src_port", 16);
        let dst_port = BitField::new(&mut builder, "dst_port", 16);
        let source = BitField::new(&mut builder, "source", bit_length(max_interfaces));
        Self {
            vars: builder.build(),
            src_ip,
            dst_ip,
            protocol,
            src_port,
            dst_port,
            source,
        }
    }

    /// Layout wide enough for every canonical filter in `groups`.
    #[must_use]
    pub fn for_groups(groups: &[CanonicalGroup]) -> Self {
        let max = groups
            .iter()
            .map(|g| g.filter().interfaces().len())
            .max()
            .unwrap_or(0);
        Self::new(max)
    }

    /// Largest interface count the source field can encode.
    #[must_use]
    pub fn max_interfaces(&self) -> usize {
        (1usize << self.source.width()) - 1
    }

    pub(crate) fn mk_true(&self) -> Bdd {
        self.vars.mk_true()
    }

    pub(crate) fn mk_false(&self) -> Bdd {
        self.vars.mk_false()
    }

    pub(crate) fn src_ip(&self, wildcard: &IpWildcard) -> Bdd {
        wildcard_bdd(&self.vars, &self.src_ip, wildcard)
    }

    pub(crate) fn dst_ip(&self, wildcard: &IpWildcard) -> Bdd {
        wildcard_bdd(&self.vars, &self.dst_ip, wildcard)
    }

    pub(crate) fn protocol(&self, protocol: u8) -> Bdd {
        self.protocol.value(&self.vars, u64::from(protocol))
    }

    pub(crate) fn src_port_range(&self, low: u16, high: u16) -> Bdd {
        self.src_port
            .range(&self.vars, u64::from(low), u64::from(high))
    }

    pub(crate) fn dst_port_range(&self, low: u16, high: u16) -> Bdd {
        self.dst_port
            .range(&self.vars, u64::from(low), u64::from(high))
    }

    /// Ingress-source field equals `value`.
    pub(crate) fn source_value(&self, value: usize) -> Bdd {
        if value > self.max_interfaces() {
            return self.mk_false();
        }
        self.source.value(&self.vars, value as u64)
    }

    /// Ingress-source field holds one of the `count + 1` used encodings.
    pub(crate) fn source_valid(&self, count: usize) -> Bdd {
        if count >= self.max_interfaces() {
            return self.mk_true();
        }
        self.source.leq(&self.vars, count as u64)
    }
}

fn wildcard_bdd(vars: &BddVariableSet, field: &BitField, wildcard: &IpWildcard) -> Bdd {
    field.masked(
        vars,
        u64::from(u32::from(wildcard.ip())),
        u64::from(wildcard.care_mask()),
    )
}

/// Ingress sources of one canonical filter: the device itself is value 0,
/// interface `i` in sorted order is value `i + 1`.
#[derive(Debug)]
pub(crate) struct SourceManager<'a> {
    vars: &'a PacketVars,
    interfaces: Vec<&'a str>,
}

impl<'a> SourceManager<'a> {
    pub(crate) fn new(vars: &'a PacketVars, interfaces: impl IntoIterator<Item = &'a str>) -> Self {
        let mut interfaces: Vec<&str> = interfaces.into_iter().collect();
        interfaces.sort_unstable();
        interfaces.dedup();
        Self { vars, interfaces }
    }

    pub(crate) fn from_device(&self) -> Bdd {
        self.vars.source_value(0)
    }

    /// Unknown interfaces match nothing.
    pub(crate) fn interface(&self, name: &str) -> Bdd {
        match self.interfaces.binary_search(&name) {
            Ok(i) => self.vars.source_value(i + 1),
            Err(_) => self.vars.mk_false(),
        }
    }

    pub(crate) fn valid(&self) -> Bdd {
        self.vars.source_valid(self.interfaces.len())
    }
}

/// Packets a line explicitly permits and explicitly denies.
#[derive(Debug, Clone)]
pub(crate) struct PermitAndDeny {
    pub(crate) permit: Bdd,
    pub(crate) deny: Bdd,
}

impl PermitAndDeny {
    pub(crate) fn new(permit: Bdd, deny: Bdd) -> Self {
        Self { permit, deny }
    }

    pub(crate) fn zero(vars: &PacketVars) -> Self {
        Self::new(vars.mk_false(), vars.mk_false())
    }

    /// Packets the line matches with either action.
    pub(crate) fn match_bdd(&self) -> Bdd {
        self.permit.or(&self.deny)
    }

    pub(crate) fn is_zero(&self) -> bool {
        self.permit.is_false() && self.deny.is_false()
    }

    /// Remove `packets` from both halves.
    pub(crate) fn diff(&self, packets: &Bdd) -> Self {
        Self::new(self.permit.and_not(packets), self.deny.and_not(packets))
    }

    pub(crate) fn and(&self, packets: &Bdd) -> Self {
        Self::new(self.permit.and(packets), self.deny.and(packets))
    }

    /// Some packet is permitted by one and denied by the other.
    pub(crate) fn takes_different_action(&self, other: &PermitAndDeny) -> bool {
        !self.permit.and(&other.deny).is_false() || !self.deny.and(&other.permit).is_false()
    }
}
