use crate::error::DecodeError;

/// Attribute header is a 16-bit length (including the header itself)
/// followed by a 16-bit type, both in host byte order.
pub const ATTR_HEADER_LEN: usize = 4;

/// The top two bits of the type field are the NLA_F_NESTED and
/// NLA_F_NET_BYTEORDER flags and must be masked off before lookup.
pub const ATTR_TYPE_MASK: u16 = 0x3fff;

/// Payloads are padded so that the next header starts on a 4-byte boundary.
#[inline]
pub fn align(len: usize) -> usize {
    (len + 3) & !3
}

/// A single attribute viewed in place. The payload borrows from the buffer
/// that produced it and must not outlive the decode of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr<'a> {
    pub typ: u16,
    pub payload: &'a [u8],
}

/// Walks a flat byte buffer as a sequence of attributes. Yields an error
/// and then fuses if a header or payload extends past the buffer end; a
/// buffer exhausted exactly at a header boundary ends the iteration cleanly.
pub struct AttrIterator<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AttrIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        AttrIterator { data, pos: 0 }
    }
}

impl<'a> Iterator for AttrIterator<'a> {
    type Item = Result<Attr<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.len() - self.pos;
        if remaining == 0 {
            return None;
        }

        if remaining < ATTR_HEADER_LEN {
            let offset = self.pos;
            self.pos = self.data.len();

            return Some(Err(DecodeError::Truncated { offset }));
        }

        let len = u16::from_ne_bytes([self.data[self.pos], self.data[self.pos + 1]]) as usize;
        let typ =
            u16::from_ne_bytes([self.data[self.pos + 2], self.data[self.pos + 3]]) & ATTR_TYPE_MASK;

        // a declared length smaller than the header itself can never be valid
        if len < ATTR_HEADER_LEN || self.pos + len > self.data.len() {
            let offset = self.pos;
            self.pos = self.data.len();

            return Some(Err(DecodeError::Truncated { offset }));
        }

        let payload = &self.data[self.pos + ATTR_HEADER_LEN..self.pos + len];
        self.pos = std::cmp::min(self.pos + align(len), self.data.len());

        Some(Ok(Attr { typ, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(typ: u16, payload: &[u8]) -> Vec<u8> {
        let len = (ATTR_HEADER_LEN + payload.len()) as u16;
        let mut buf = Vec::new();
        buf.extend(len.to_ne_bytes());
        buf.extend(typ.to_ne_bytes());
        buf.extend(payload);
        buf.resize(align(buf.len()), 0);
        buf
    }

    #[test]
    fn walk_consumes_declared_lengths() {
        let mut buf = attr(1, &[0xde, 0xad]);
        buf.extend(attr(2, &[1, 2, 3, 4]));
        buf.extend(attr(3, &[]));

        let attrs = AttrIterator::new(&buf)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].typ, 1);
        assert_eq!(attrs[0].payload, &[0xde, 0xad]);
        assert_eq!(attrs[1].typ, 2);
        assert_eq!(attrs[1].payload, &[1, 2, 3, 4]);
        assert_eq!(attrs[2].typ, 3);
        assert!(attrs[2].payload.is_empty());

        // every step advanced by header + payload + padding
        let consumed: usize = attrs
            .iter()
            .map(|a| align(ATTR_HEADER_LEN + a.payload.len()))
            .sum();
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn flag_bits_are_masked() {
        let mut buf = attr(1, &[0u8; 4]);
        // set NLA_F_NESTED on the type field
        let typ = 1u16 | 0x8000;
        buf[2..4].copy_from_slice(&typ.to_ne_bytes());

        let attrs = AttrIterator::new(&buf)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(attrs[0].typ, 1);
    }

    #[test]
    fn truncated_header() {
        let buf = [8u8, 0];
        let mut iter = AttrIterator::new(&buf);

        assert_eq!(
            iter.next(),
            Some(Err(DecodeError::Truncated { offset: 0 }))
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn truncated_payload() {
        // declares 12 bytes but only 8 are present
        let mut buf = attr(1, &[0u8; 4]);
        buf[0..2].copy_from_slice(&12u16.to_ne_bytes());

        let mut iter = AttrIterator::new(&buf);
        assert_eq!(
            iter.next(),
            Some(Err(DecodeError::Truncated { offset: 0 }))
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn error_after_valid_prefix() {
        let mut buf = attr(7, &[1, 2, 3, 4]);
        buf.extend([3u8, 0]); // short trailing garbage

        let mut iter = AttrIterator::new(&buf);
        assert_eq!(iter.next().unwrap().unwrap().typ, 7);
        assert_eq!(
            iter.next(),
            Some(Err(DecodeError::Truncated { offset: 8 }))
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn unpadded_tail_is_accepted() {
        // last attribute's padding may be absent at the end of a buffer
        let buf = attr(1, &[0xff, 0xee]);
        let mut iter = AttrIterator::new(&buf[..6]);

        let got = iter.next().unwrap().unwrap();
        assert_eq!(got.payload, &[0xff, 0xee]);
        assert_eq!(iter.next(), None);
    }
}
