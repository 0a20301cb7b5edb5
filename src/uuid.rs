//! 128-bit device UUIDs, as carried by the Link Open bearer control PDU.
use core::fmt::{Debug, Display, Error, Formatter};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct UUID([u8; 16]);

impl UUID {
    pub const BYTE_LEN: usize = 16;
    #[must_use]
    pub const fn new_bytes(bytes: [u8; 16]) -> UUID {
        UUID(bytes)
    }
    #[must_use]
    pub fn random() -> UUID {
        use rand::RngCore;
        let mut bytes = [0_u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        UUID(bytes)
    }
    #[must_use]
    pub const fn bytes(&self) -> &[u8; 16] {
        &self.0
    }
}
impl AsRef<[u8]> for UUID {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
impl From<[u8; 16]> for UUID {
    fn from(bytes: [u8; 16]) -> UUID {
        UUID(bytes)
    }
}
impl TryFrom<&[u8]> for UUID {
    type Error = core::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(UUID(value.try_into()?))
    }
}
impl Display for UUID {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        for (i, b) in self.0.iter().enumerate() {
            if let 4 | 6 | 8 | 10 = i {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
impl Debug for UUID {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "UUID({})", self)
    }
}
