//! Endian-explicit serialization for the small integer types the PDU layers
//! are built out of. Endian depends on layer (access is little endian,
//! everything else big endian) so both directions are always spelled out.

pub trait ToFromBytesEndian: Sized {
    type AsBytesType: AsRef<[u8]>;

    #[must_use]
    fn byte_size() -> usize {
        core::mem::size_of::<Self::AsBytesType>()
    }

    #[must_use]
    fn to_bytes_le(&self) -> Self::AsBytesType;

    #[must_use]
    fn to_bytes_be(&self) -> Self::AsBytesType;

    #[must_use]
    fn from_bytes_le(bytes: &[u8]) -> Option<Self>;

    #[must_use]
    fn from_bytes_be(bytes: &[u8]) -> Option<Self>;
}
macro_rules! implement_to_from_bytes {
    ( $( $t:ty ), *) => {
        $(
            impl ToFromBytesEndian for $t {
                type AsBytesType = [u8; core::mem::size_of::<Self>()];

                #[must_use]
                fn to_bytes_le(&self) -> Self::AsBytesType {
                    self.to_le_bytes()
                }

                #[must_use]
                fn to_bytes_be(&self) -> Self::AsBytesType {
                    self.to_be_bytes()
                }

                #[must_use]
                fn from_bytes_le(bytes: &[u8]) -> Option<Self> {
                    Some(Self::from_le_bytes(bytes.try_into().ok()?))
                }

                #[must_use]
                fn from_bytes_be(bytes: &[u8]) -> Option<Self> {
                    Some(Self::from_be_bytes(bytes.try_into().ok()?))
                }
            }
        )*
    }
}
implement_to_from_bytes!(u8, i8, u16, i16, u32, i32, u64, i64);

impl ToFromBytesEndian for bool {
    type AsBytesType = [u8; 1];

    fn to_bytes_le(&self) -> Self::AsBytesType {
        [u8::from(*self)]
    }

    fn to_bytes_be(&self) -> Self::AsBytesType {
        [u8::from(*self)]
    }

    fn from_bytes_le(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0] => Some(false),
            [1] => Some(true),
            _ => None,
        }
    }

    fn from_bytes_be(bytes: &[u8]) -> Option<Self> {
        Self::from_bytes_le(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_round_trip() {
        assert_eq!(u16::from_bytes_be(&0x1234_u16.to_bytes_be()), Some(0x1234));
        assert_eq!(u16::from_bytes_le(&0x1234_u16.to_bytes_le()), Some(0x1234));
        assert_eq!(
            u32::from_bytes_be(&[0x12, 0x34, 0x56, 0x78]),
            Some(0x1234_5678)
        );
        assert_eq!(u16::from_bytes_be(&[0x12]), None);
    }
}
