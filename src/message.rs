//! Netlink message framing for the netfilter conntrack subsystem.
//!
//! A receive buffer may pack several messages back to back, each introduced
//! by a 16-byte header carrying its own total length. Conntrack payloads
//! start with a 4-byte nfgenmsg (family, version, resource id) followed by
//! the attribute stream.

use crate::attr::align;
use crate::error::DecodeError;

pub const HEADER_LEN: usize = 16;

/// No action was taken, skip.
pub const NLMSG_NOOP: u16 = 1;
/// Carries an error code, which also acks success when the code is 0.
pub const NLMSG_ERROR: u16 = 2;
/// End of a multi-part dump.
pub const NLMSG_DONE: u16 = 3;
/// Data was lost from this message.
pub const NLMSG_OVERRUN: u16 = 4;

pub const NLM_F_REQUEST: u16 = 0x1;
pub const NLM_F_MULTI: u16 = 0x2;
pub const NLM_F_DUMP: u16 = 0x300;

/// https://github.com/torvalds/linux/blob/master/include/uapi/linux/netfilter/nfnetlink.h
pub const NFNL_SUBSYS_CTNETLINK: u8 = 1;

/// https://github.com/torvalds/linux/blob/master/include/uapi/linux/netfilter/nfnetlink_conntrack.h
pub const IPCTNL_MSG_CT_NEW: u8 = 0;
pub const IPCTNL_MSG_CT_GET: u8 = 1;

pub const NFNETLINK_V0: u8 = 0;

/// nfgenmsg: family, version and a big-endian resource id.
pub const NFGEN_LEN: usize = 4;

pub const AF_INET: u8 = libc::AF_INET as u8;
pub const AF_INET6: u8 = libc::AF_INET6 as u8;

/// Message header, host byte order on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: u32,
    pub typ: u16,
    pub flags: u16,
    pub sequence: u32,
    pub pid: u32,
}

impl Header {
    fn parse(data: &[u8]) -> Header {
        Header {
            length: u32::from_ne_bytes(data[0..4].try_into().unwrap()),
            typ: u16::from_ne_bytes(data[4..6].try_into().unwrap()),
            flags: u16::from_ne_bytes(data[6..8].try_into().unwrap()),
            sequence: u32::from_ne_bytes(data[8..12].try_into().unwrap()),
            pid: u32::from_ne_bytes(data[12..16].try_into().unwrap()),
        }
    }

    /// Whether this is a conntrack entry from a dump response.
    pub fn is_conntrack(&self) -> bool {
        self.typ >> 8 == NFNL_SUBSYS_CTNETLINK as u16
            && self.typ as u8 == IPCTNL_MSG_CT_NEW
    }
}

/// One framed message: header plus payload (nfgenmsg and attributes for
/// conntrack messages). The payload borrows from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

/// Walks a receive buffer message by message. A header or payload running
/// past the buffer end yields an error and abandons the rest of the buffer,
/// since without a trustworthy length the next boundary cannot be located.
pub struct MessageIterator<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MessageIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MessageIterator { data, pos: 0 }
    }
}

impl<'a> Iterator for MessageIterator<'a> {
    type Item = Result<Message<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.len() - self.pos;
        if remaining == 0 {
            return None;
        }

        if remaining < HEADER_LEN {
            let offset = self.pos;
            self.pos = self.data.len();

            return Some(Err(DecodeError::Truncated { offset }));
        }

        let header = Header::parse(&self.data[self.pos..]);
        let length = header.length as usize;
        if length < HEADER_LEN || self.pos + length > self.data.len() {
            let offset = self.pos;
            self.pos = self.data.len();

            return Some(Err(DecodeError::Truncated { offset }));
        }

        let payload = &self.data[self.pos + HEADER_LEN..self.pos + length];
        self.pos = std::cmp::min(self.pos + align(length), self.data.len());

        Some(Ok(Message { header, payload }))
    }
}

/// Builds the table dump request: a bare header plus nfgenmsg selecting the
/// address family, no attributes.
pub fn dump_request(family: u8, sequence: u32) -> Vec<u8> {
    let len = HEADER_LEN + NFGEN_LEN;
    let mut buf = Vec::with_capacity(len);

    // header
    buf.extend((len as u32).to_ne_bytes());
    let typ = (NFNL_SUBSYS_CTNETLINK as u16) << 8 | IPCTNL_MSG_CT_GET as u16;
    buf.extend(typ.to_ne_bytes());
    buf.extend((NLM_F_REQUEST | NLM_F_DUMP).to_ne_bytes());
    buf.extend(sequence.to_ne_bytes());
    buf.extend(0u32.to_ne_bytes()); // pid is filled in by the kernel

    // nfgenmsg
    buf.extend([family, NFNETLINK_V0, 0, 0]);

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(typ: u16, flags: u16, sequence: u32, pid: u32, payload: &[u8]) -> Vec<u8> {
        let len = (HEADER_LEN + payload.len()) as u32;
        let mut buf = Vec::new();
        buf.extend(len.to_ne_bytes());
        buf.extend(typ.to_ne_bytes());
        buf.extend(flags.to_ne_bytes());
        buf.extend(sequence.to_ne_bytes());
        buf.extend(pid.to_ne_bytes());
        buf.extend(payload);
        buf.resize(align(buf.len()), 0);
        buf
    }

    #[test]
    fn request_layout() {
        let buf = dump_request(AF_INET, 0x1234);

        assert_eq!(buf.len(), 20);
        assert_eq!(u32::from_ne_bytes(buf[0..4].try_into().unwrap()), 20);
        assert_eq!(
            u16::from_ne_bytes(buf[4..6].try_into().unwrap()),
            (1 << 8) | 1
        );
        assert_eq!(u16::from_ne_bytes(buf[6..8].try_into().unwrap()), 0x301);
        assert_eq!(
            u32::from_ne_bytes(buf[8..12].try_into().unwrap()),
            0x1234
        );
        assert_eq!(buf[16], AF_INET);
        assert_eq!(buf[17], NFNETLINK_V0);
    }

    #[test]
    fn conntrack_type() {
        let header = Header {
            typ: (NFNL_SUBSYS_CTNETLINK as u16) << 8 | IPCTNL_MSG_CT_NEW as u16,
            ..Default::default()
        };
        assert!(header.is_conntrack());

        let done = Header {
            typ: NLMSG_DONE,
            ..Default::default()
        };
        assert!(!done.is_conntrack());
    }

    #[test]
    fn walk_two_messages() {
        let mut buf = message(0x100, NLM_F_MULTI, 1, 42, &[0xaa; 8]);
        buf.extend(message(NLMSG_DONE, NLM_F_MULTI, 1, 42, &[0, 0, 0, 0]));

        let msgs = MessageIterator::new(&buf)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].header.typ, 0x100);
        assert_eq!(msgs[0].header.pid, 42);
        assert_eq!(msgs[0].payload.len(), 8);
        assert_eq!(msgs[1].header.typ, NLMSG_DONE);
    }

    #[test]
    fn truncated_tail() {
        let mut buf = message(0x100, 0, 1, 42, &[0xaa; 4]);
        let valid = buf.len();
        buf.extend(message(0x100, 0, 1, 42, &[0xbb; 16]));
        buf.truncate(buf.len() - 8); // second message loses its tail

        let mut iter = MessageIterator::new(&buf);
        assert!(iter.next().unwrap().is_ok());
        assert_eq!(
            iter.next(),
            Some(Err(DecodeError::Truncated { offset: valid }))
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn truncated_header() {
        let buf = [20u8, 0, 0, 0, 0, 0];
        let mut iter = MessageIterator::new(&buf);

        assert_eq!(
            iter.next(),
            Some(Err(DecodeError::Truncated { offset: 0 }))
        );
        assert_eq!(iter.next(), None);
    }
}
