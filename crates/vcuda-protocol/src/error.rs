/// Decoding failures of a [`WireBuffer`](crate::WireBuffer).
///
/// Every variant means the payload does not match the schema the routine
/// expects. The peer's framing can no longer be trusted after one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("buffer underrun at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    Underrun {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("unterminated string at offset {0}")]
    UnterminatedString(usize),

    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    #[error("trailing data of {len} bytes is not a whole number of {elem_size}-byte elements")]
    RaggedTrailing { len: usize, elem_size: usize },

    #[error("element count {0} does not fit the buffer")]
    CountOverflow(u64),

    #[error("{remaining} unexpected bytes after the last field at offset {offset}")]
    UnexpectedTrailing { offset: usize, remaining: usize },
}
