//! Attribute taxonomy of the conntrack subsystem.
//!
//! The tables here are the single source of truth for which attribute types
//! are recognised in each parsing context and what payload each must carry.
//! All width checks route through [`lookup`]; an attribute type not modelled
//! for its context is skipped, never an error, since the kernel is free to
//! append attributes this decoder does not know about.
//!
//! https://github.com/torvalds/linux/blob/master/include/uapi/linux/netfilter/nfnetlink_conntrack.h

// enum ctattr_type
pub const CTA_TUPLE_ORIG: u16 = 1;
pub const CTA_TUPLE_REPLY: u16 = 2;
pub const CTA_STATUS: u16 = 3;
pub const CTA_TIMEOUT: u16 = 7;
pub const CTA_MARK: u16 = 8;
pub const CTA_COUNTERS_ORIG: u16 = 9;
pub const CTA_COUNTERS_REPLY: u16 = 10;
pub const CTA_SECMARK: u16 = 17;

// enum ctattr_tuple
pub const CTA_TUPLE_IP: u16 = 1;
pub const CTA_TUPLE_PROTO: u16 = 2;

// enum ctattr_ip
pub const CTA_IP_V4_SRC: u16 = 1;
pub const CTA_IP_V4_DST: u16 = 2;
pub const CTA_IP_V6_SRC: u16 = 3;
pub const CTA_IP_V6_DST: u16 = 4;

// enum ctattr_l4proto
pub const CTA_PROTO_NUM: u16 = 1;
pub const CTA_PROTO_SRC_PORT: u16 = 2;
pub const CTA_PROTO_DST_PORT: u16 = 3;
pub const CTA_PROTO_ICMP_ID: u16 = 4;
pub const CTA_PROTO_ICMP_TYPE: u16 = 5;
pub const CTA_PROTO_ICMP_CODE: u16 = 6;
pub const CTA_PROTO_ICMPV6_ID: u16 = 7;
pub const CTA_PROTO_ICMPV6_TYPE: u16 = 8;
pub const CTA_PROTO_ICMPV6_CODE: u16 = 9;

// enum ctattr_counters
pub const CTA_COUNTERS_PACKETS: u16 = 1;
pub const CTA_COUNTERS_BYTES: u16 = 2;

/// Parsing scope governing which attribute types are valid and how their
/// payloads are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Top-level attributes of one conntrack entry.
    Flow,
    /// One direction's flow identifier.
    Tuple,
    /// Address half of a tuple.
    Ip,
    /// Protocol half of a tuple.
    Proto,
    /// Packet/byte counters of one direction.
    Counters,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Flow => "flow",
            Context::Tuple => "tuple",
            Context::Ip => "ip",
            Context::Proto => "proto",
            Context::Counters => "counters",
        }
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected payload shape of a recognised attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    U8,
    U16,
    U32,
    U64,
    /// Fixed-size opaque payload, e.g. a raw IPv6 address.
    Binary(usize),
    /// Payload is itself an attribute stream.
    Nested,
}

impl Kind {
    /// Exact payload length this kind requires, or `None` for nested
    /// containers whose length is validated by recursive descent.
    pub const fn width(&self) -> Option<usize> {
        match self {
            Kind::U8 => Some(1),
            Kind::U16 => Some(2),
            Kind::U32 => Some(4),
            Kind::U64 => Some(8),
            Kind::Binary(size) => Some(*size),
            Kind::Nested => None,
        }
    }
}

/// Schema verdict for one (context, type) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Type is not modelled in this context; skip it without error.
    Ignore,
    Expect(Kind),
}

/// Pure lookup from (context, attribute type) to the expected payload kind.
/// Any pair not listed returns `Ignore`, so the lookup cannot be indexed out
/// of range no matter what type index the wire carries.
pub fn lookup(context: Context, typ: u16) -> Verdict {
    use self::{Context::*, Kind::*, Verdict::*};

    match context {
        Flow => match typ {
            CTA_TUPLE_ORIG | CTA_COUNTERS_ORIG | CTA_COUNTERS_REPLY => Expect(Nested),
            CTA_TIMEOUT | CTA_MARK | CTA_SECMARK => Expect(U32),
            _ => Ignore,
        },
        Tuple => match typ {
            CTA_TUPLE_IP | CTA_TUPLE_PROTO => Expect(Nested),
            _ => Ignore,
        },
        Ip => match typ {
            CTA_IP_V4_SRC | CTA_IP_V4_DST => Expect(U32),
            CTA_IP_V6_SRC | CTA_IP_V6_DST => Expect(Binary(16)),
            _ => Ignore,
        },
        Proto => match typ {
            CTA_PROTO_NUM
            | CTA_PROTO_ICMP_TYPE
            | CTA_PROTO_ICMP_CODE
            | CTA_PROTO_ICMPV6_TYPE
            | CTA_PROTO_ICMPV6_CODE => Expect(U8),
            CTA_PROTO_SRC_PORT | CTA_PROTO_DST_PORT | CTA_PROTO_ICMP_ID | CTA_PROTO_ICMPV6_ID => {
                Expect(U16)
            }
            _ => Ignore,
        },
        Counters => match typ {
            CTA_COUNTERS_PACKETS | CTA_COUNTERS_BYTES => Expect(U64),
            _ => Ignore,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmodeled_types_are_ignored() {
        assert_eq!(lookup(Context::Flow, 0), Verdict::Ignore);
        assert_eq!(lookup(Context::Flow, CTA_STATUS), Verdict::Ignore);
        assert_eq!(lookup(Context::Flow, 0x3fff), Verdict::Ignore);
        assert_eq!(lookup(Context::Counters, 3), Verdict::Ignore);
        assert_eq!(lookup(Context::Ip, 5), Verdict::Ignore);
    }

    #[test]
    fn widths_match_the_wire_taxonomy() {
        assert_eq!(
            lookup(Context::Flow, CTA_MARK),
            Verdict::Expect(Kind::U32)
        );
        assert_eq!(
            lookup(Context::Tuple, CTA_TUPLE_IP),
            Verdict::Expect(Kind::Nested)
        );
        assert_eq!(
            lookup(Context::Ip, CTA_IP_V6_DST),
            Verdict::Expect(Kind::Binary(16))
        );
        assert_eq!(
            lookup(Context::Proto, CTA_PROTO_SRC_PORT),
            Verdict::Expect(Kind::U16)
        );
        assert_eq!(
            lookup(Context::Counters, CTA_COUNTERS_BYTES),
            Verdict::Expect(Kind::U64)
        );

        assert_eq!(Kind::U64.width(), Some(8));
        assert_eq!(Kind::Binary(16).width(), Some(16));
        assert_eq!(Kind::Nested.width(), None);
    }
}
