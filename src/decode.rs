//! Recursive decode of one conntrack message's attribute stream.
//!
//! Each parsing context walks its payload with [`AttrIterator`], asks the
//! schema for a verdict per attribute, and either assigns a converted scalar,
//! descends into a nested context, or skips. A failure inside a nested group
//! only loses that subtree: the partially filled sub-structure is kept (the
//! wire may still have told us something useful) and decoding continues with
//! the next sibling in the parent. A failure at the current level aborts the
//! current group and propagates; fields assigned before the failure stay set.

use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::warn;

use crate::attr::{Attr, AttrIterator};
use crate::error::DecodeError;
use crate::flow::{AddressInfo, Counters, Flow, ProtocolInfo, Tuple};
use crate::schema::{self, Context, Verdict};
use crate::schema::{
    CTA_COUNTERS_BYTES, CTA_COUNTERS_ORIG, CTA_COUNTERS_PACKETS, CTA_COUNTERS_REPLY,
    CTA_IP_V4_DST, CTA_IP_V4_SRC, CTA_IP_V6_DST, CTA_IP_V6_SRC, CTA_MARK, CTA_PROTO_DST_PORT,
    CTA_PROTO_ICMP_CODE, CTA_PROTO_ICMP_ID, CTA_PROTO_ICMP_TYPE, CTA_PROTO_ICMPV6_CODE,
    CTA_PROTO_ICMPV6_ID, CTA_PROTO_ICMPV6_TYPE, CTA_PROTO_NUM, CTA_PROTO_SRC_PORT, CTA_SECMARK,
    CTA_TIMEOUT, CTA_TUPLE_IP, CTA_TUPLE_ORIG, CTA_TUPLE_PROTO,
};

/// Applies the schema verdict to a raw attribute. `Ok(true)` means the
/// payload length checked out for its expected kind, `Ok(false)` means the
/// type is not modelled in this context and must be skipped. Byte contents
/// are never consulted here.
fn validate(context: Context, attr: &Attr<'_>) -> Result<bool, DecodeError> {
    let kind = match schema::lookup(context, attr.typ) {
        Verdict::Ignore => return Ok(false),
        Verdict::Expect(kind) => kind,
    };

    match kind.width() {
        Some(expected) => {
            if attr.payload.len() != expected {
                return Err(DecodeError::InvalidLength {
                    context,
                    typ: attr.typ,
                    len: attr.payload.len(),
                    expected,
                });
            }
        }
        None => {
            // nested container, the recursive decode validates the rest
            if attr.payload.is_empty() {
                return Err(DecodeError::EmptyNested {
                    context,
                    typ: attr.typ,
                });
            }
        }
    }

    Ok(true)
}

// payload lengths are guaranteed by validate() before any of these run
#[inline]
fn be16(payload: &[u8]) -> u16 {
    u16::from_be_bytes(payload.try_into().unwrap())
}

#[inline]
fn be32(payload: &[u8]) -> u32 {
    u32::from_be_bytes(payload.try_into().unwrap())
}

#[inline]
fn be64(payload: &[u8]) -> u64 {
    u64::from_be_bytes(payload.try_into().unwrap())
}

fn decode_ip(payload: &[u8], address: &mut AddressInfo) -> Result<(), DecodeError> {
    for item in AttrIterator::new(payload) {
        let attr = item?;
        if !validate(Context::Ip, &attr)? {
            continue;
        }

        match attr.typ {
            CTA_IP_V4_SRC => {
                address.v4_src = Some(Ipv4Addr::from(<[u8; 4]>::try_from(attr.payload).unwrap()))
            }
            CTA_IP_V4_DST => {
                address.v4_dst = Some(Ipv4Addr::from(<[u8; 4]>::try_from(attr.payload).unwrap()))
            }
            CTA_IP_V6_SRC => {
                address.v6_src = Some(Ipv6Addr::from(<[u8; 16]>::try_from(attr.payload).unwrap()))
            }
            CTA_IP_V6_DST => {
                address.v6_dst = Some(Ipv6Addr::from(<[u8; 16]>::try_from(attr.payload).unwrap()))
            }
            _ => {}
        }
    }

    Ok(())
}

fn decode_proto(payload: &[u8], protocol: &mut ProtocolInfo) -> Result<(), DecodeError> {
    for item in AttrIterator::new(payload) {
        let attr = item?;
        if !validate(Context::Proto, &attr)? {
            continue;
        }

        match attr.typ {
            CTA_PROTO_NUM => protocol.number = Some(attr.payload[0]),
            CTA_PROTO_SRC_PORT => protocol.src_port = Some(be16(attr.payload)),
            CTA_PROTO_DST_PORT => protocol.dst_port = Some(be16(attr.payload)),
            CTA_PROTO_ICMP_ID | CTA_PROTO_ICMPV6_ID => {
                protocol.icmp_id = Some(be16(attr.payload))
            }
            CTA_PROTO_ICMP_TYPE | CTA_PROTO_ICMPV6_TYPE => {
                protocol.icmp_type = Some(attr.payload[0])
            }
            CTA_PROTO_ICMP_CODE | CTA_PROTO_ICMPV6_CODE => {
                protocol.icmp_code = Some(attr.payload[0])
            }
            _ => {}
        }
    }

    Ok(())
}

fn decode_counters(payload: &[u8], counters: &mut Counters) -> Result<(), DecodeError> {
    for item in AttrIterator::new(payload) {
        let attr = item?;
        if !validate(Context::Counters, &attr)? {
            continue;
        }

        match attr.typ {
            CTA_COUNTERS_PACKETS => counters.packets = Some(be64(attr.payload)),
            CTA_COUNTERS_BYTES => counters.bytes = Some(be64(attr.payload)),
            _ => {}
        }
    }

    Ok(())
}

fn decode_tuple(payload: &[u8], tuple: &mut Tuple) -> Result<(), DecodeError> {
    for item in AttrIterator::new(payload) {
        let attr = item?;
        if !validate(Context::Tuple, &attr)? {
            continue;
        }

        match attr.typ {
            CTA_TUPLE_IP => {
                let mut address = AddressInfo::default();
                let result = decode_ip(attr.payload, &mut address);
                tuple.address = Some(address);

                if let Err(err) = result {
                    warn!(message = "failed to decode tuple address", ?err);
                }
            }
            CTA_TUPLE_PROTO => {
                let mut protocol = ProtocolInfo::default();
                let result = decode_proto(attr.payload, &mut protocol);
                tuple.protocol = Some(protocol);

                if let Err(err) = result {
                    warn!(message = "failed to decode tuple protocol", ?err);
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Decodes one message's top-level attribute stream into `flow`. On error the
/// fields decoded so far remain set, so the caller may still deliver the
/// partial record when the error is not a truncation.
pub fn decode_flow(payload: &[u8], flow: &mut Flow) -> Result<(), DecodeError> {
    for item in AttrIterator::new(payload) {
        let attr = item?;
        if !validate(Context::Flow, &attr)? {
            continue;
        }

        match attr.typ {
            CTA_TUPLE_ORIG => {
                let mut tuple = Tuple::default();
                let result = decode_tuple(attr.payload, &mut tuple);
                flow.original = Some(tuple);

                if let Err(err) = result {
                    warn!(message = "failed to decode original tuple", ?err);
                }
            }
            CTA_TIMEOUT => flow.timeout = Some(be32(attr.payload)),
            CTA_MARK => flow.mark = Some(be32(attr.payload)),
            CTA_SECMARK => flow.secmark = Some(be32(attr.payload)),
            CTA_COUNTERS_ORIG => {
                let mut counters = Counters::default();
                let result = decode_counters(attr.payload, &mut counters);
                flow.counters_original = Some(counters);

                if let Err(err) = result {
                    warn!(message = "failed to decode original counters", ?err);
                }
            }
            CTA_COUNTERS_REPLY => {
                let mut counters = Counters::default();
                let result = decode_counters(attr.payload, &mut counters);
                flow.counters_reply = Some(counters);

                if let Err(err) = result {
                    warn!(message = "failed to decode reply counters", ?err);
                }
            }
            _ => {}
        }
    }

    Ok(())
}
