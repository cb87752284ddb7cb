use crate::schema::Context;

/// Errors raised while decoding a single conntrack message. These never
/// escape the message being decoded; the session loop decides whether the
/// message is dropped or delivered partially.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// An attribute header or payload would read past the end of its buffer.
    #[error("attribute stream truncated at offset {offset}")]
    Truncated { offset: usize },

    /// A scalar or fixed-size attribute carries a payload of the wrong length.
    #[error("attribute {typ} in {context} context has {len} byte payload, expected {expected}")]
    InvalidLength {
        context: Context,
        typ: u16,
        len: usize,
        expected: usize,
    },

    /// A nested attribute carries no payload at all.
    #[error("nested attribute {typ} in {context} context is empty")]
    EmptyNested { context: Context, typ: u16 },
}
