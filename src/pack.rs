//! Byte-layout error type shared by every `pack_into`/`unpack_from` in the
//! crate. PDU layouts are fixed-size so most failures are length mismatches.
use core::fmt::{Display, Error, Formatter};

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum PackError {
    BadLength { expected: usize, got: usize },
    BadOpcode,
    InvalidFields,
    BadBytes { index: usize },
}
impl PackError {
    /// Errors unless `buf.len() == expected`.
    pub fn expect_length(expected: usize, buf: &[u8]) -> Result<(), PackError> {
        if buf.len() == expected {
            Ok(())
        } else {
            Err(PackError::BadLength {
                expected,
                got: buf.len(),
            })
        }
    }
    /// Errors unless `buf.len() >= expected`.
    pub fn atleast_length(expected: usize, buf: &[u8]) -> Result<(), PackError> {
        if buf.len() >= expected {
            Ok(())
        } else {
            Err(PackError::BadLength {
                expected,
                got: buf.len(),
            })
        }
    }
    pub const fn bad_index(index: usize) -> PackError {
        PackError::BadBytes { index }
    }
}
impl Display for PackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            PackError::BadLength { expected, got } => {
                write!(f, "bad length (expected {} got {})", expected, got)
            }
            PackError::BadOpcode => f.write_str("bad opcode"),
            PackError::InvalidFields => f.write_str("invalid fields"),
            PackError::BadBytes { index } => write!(f, "bad bytes at index {}", index),
        }
    }
}
impl std::error::Error for PackError {}
