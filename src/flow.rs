use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Source/destination addresses of one tuple. A well-formed message carries
/// either family, but each field is populated independently of the others;
/// the wire format does not enforce mutual exclusion and neither do we.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    pub v4_src: Option<Ipv4Addr>,
    pub v4_dst: Option<Ipv4Addr>,
    pub v6_src: Option<Ipv6Addr>,
    pub v6_dst: Option<Ipv6Addr>,
}

/// Layer-4 protocol fields of one tuple. Ports apply to port-bearing
/// protocols, id/type/code to the ICMP family.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    /// IP protocol number, e.g. 6 for TCP.
    pub number: Option<u8>,

    /// Source port, converted from network order.
    pub src_port: Option<u16>,

    /// Destination port, converted from network order.
    pub dst_port: Option<u16>,

    /// ICMP echo id, converted from network order.
    pub icmp_id: Option<u16>,

    pub icmp_type: Option<u8>,
    pub icmp_code: Option<u8>,
}

/// Flow identifier for one direction of a tracked connection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub address: Option<AddressInfo>,
    pub protocol: Option<ProtocolInfo>,
}

/// Packet and byte counters for one direction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counters {
    pub packets: Option<u64>,
    pub bytes: Option<u64>,
}

/// One decoded connection tracking entry. Every field is optional: absence
/// on the wire simply leaves the field unset. A `Flow` is built fresh per
/// message and never retains state across messages.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Flow {
    /// Tuple of the original direction.
    pub original: Option<Tuple>,

    /// Remaining entry lifetime in seconds.
    pub timeout: Option<u32>,

    /// Packet mark, converted from network order.
    pub mark: Option<u32>,

    /// Security mark, converted from network order.
    pub secmark: Option<u32>,

    /// Counters of the original direction.
    pub counters_original: Option<Counters>,

    /// Counters of the reply direction.
    pub counters_reply: Option<Counters>,
}

impl fmt::Display for AddressInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(src) = self.v4_src {
            write!(f, "src={} ", src)?;
        }
        if let Some(dst) = self.v4_dst {
            write!(f, "dst={} ", dst)?;
        }
        if let Some(src) = self.v6_src {
            write!(f, "src={} ", src)?;
        }
        if let Some(dst) = self.v6_dst {
            write!(f, "dst={} ", dst)?;
        }

        Ok(())
    }
}

impl fmt::Display for ProtocolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(number) = self.number {
            write!(f, "proto={} ", number)?;
        }
        if let Some(port) = self.src_port {
            write!(f, "sport={} ", port)?;
        }
        if let Some(port) = self.dst_port {
            write!(f, "dport={} ", port)?;
        }
        if let Some(id) = self.icmp_id {
            write!(f, "id={} ", id)?;
        }
        if let Some(typ) = self.icmp_type {
            write!(f, "type={} ", typ)?;
        }
        if let Some(code) = self.icmp_code {
            write!(f, "code={} ", code)?;
        }

        Ok(())
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(packets) = self.packets {
            write!(f, "packets={} ", packets)?;
        }
        if let Some(bytes) = self.bytes {
            write!(f, "bytes={} ", bytes)?;
        }

        Ok(())
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tuple) = &self.original {
            if let Some(address) = &tuple.address {
                address.fmt(f)?;
            }
            if let Some(protocol) = &tuple.protocol {
                protocol.fmt(f)?;
            }
        }

        if let Some(timeout) = self.timeout {
            write!(f, "timeout={} ", timeout)?;
        }
        if let Some(mark) = self.mark {
            write!(f, "mark={} ", mark)?;
        }
        if let Some(secmark) = self.secmark {
            write!(f, "secmark={} ", secmark)?;
        }

        if let Some(counters) = &self.counters_original {
            write!(f, "original {}", counters)?;
        }
        if let Some(counters) = &self.counters_reply {
            write!(f, "reply {}", counters)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render() {
        let flow = Flow {
            original: Some(Tuple {
                address: Some(AddressInfo {
                    v4_src: Some(Ipv4Addr::new(10, 0, 0, 1)),
                    v4_dst: Some(Ipv4Addr::new(10, 0, 0, 2)),
                    ..Default::default()
                }),
                protocol: Some(ProtocolInfo {
                    number: Some(6),
                    src_port: Some(443),
                    dst_port: Some(51000),
                    ..Default::default()
                }),
            }),
            mark: Some(7),
            counters_original: Some(Counters {
                packets: Some(100),
                bytes: Some(15000),
            }),
            ..Default::default()
        };

        assert_eq!(
            flow.to_string(),
            "src=10.0.0.1 dst=10.0.0.2 proto=6 sport=443 dport=51000 mark=7 original packets=100 bytes=15000 "
        );
    }

    #[test]
    fn render_empty() {
        assert_eq!(Flow::default().to_string(), "");
    }
}
