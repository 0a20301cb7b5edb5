//! Mesh addresses. All addresses on the wire are 16-bit, classified by their
//! top bits:
//!
//! | Bits (16)             | Type          |
//! | --------------------- | ------------- |
//! | 0b0000 0000 0000 0000 | Unassigned    |
//! | 0b0xxx xxxx xxxx xxxx | Unicast       |
//! | 0b10xx xxxx xxxx xxxx | Virtual       |
//! | 0b11xx xxxx xxxx xxxx | Group         |
//!
//! A source address on the wire must be Unicast; a destination must never be
//! Unassigned. Virtual addresses here are the 14-bit on-air hash only; the
//! full 128-bit label UUIDs belong to multi-element addressing which this
//! stack doesn't do.
use crate::bytes::ToFromBytesEndian;

pub const ADDRESS_LEN: usize = 2;

const UNICAST_BIT: u16 = 0x8000;
const GROUP_BITS: u16 = 0xC000;

/// Element unicast address (`0x0001..=0x7FFF`).
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct UnicastAddress(u16);
impl UnicastAddress {
    /// # Panics
    /// Panics if `v` is zero or has the high bit set.
    #[must_use]
    pub fn new(v: u16) -> UnicastAddress {
        match UnicastAddress::try_from(v) {
            Ok(u) => u,
            Err(_) => panic!("non unicast address '{}'", v),
        }
    }
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

/// Group address (`0xC000..=0xFFFF`).
///
/// | Values        | Group Name    |
/// | ------------- | ------------- |
/// | 0xFF00-0xFFFB | RFU           |
/// | 0xFFFC        | All Proxies   |
/// | 0xFFFD        | All Friends   |
/// | 0xFFFE        | All Relays    |
/// | 0xFFFF        | All Nodes     |
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct GroupAddress(u16);
impl GroupAddress {
    /// # Panics
    /// Panics if `v` isn't in the group range.
    #[must_use]
    pub fn new(v: u16) -> GroupAddress {
        match GroupAddress::try_from(v) {
            Ok(g) => g,
            Err(_) => panic!("non group address '{}'", v),
        }
    }
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
    /// Fixed broadcast group addresses (`0xFFFC..=0xFFFF`).
    #[must_use]
    pub fn is_broadcast(self) -> bool {
        self.0 >= 0xFFFC
    }
    /// Reserved-for-future-use group space (`0xFF00..=0xFFFB`).
    #[must_use]
    pub fn is_rfu(self) -> bool {
        (0xFF00..=0xFFFB).contains(&self.0)
    }
    pub const fn all_proxies() -> GroupAddress {
        GroupAddress(0xFFFC)
    }
    pub const fn all_friends() -> GroupAddress {
        GroupAddress(0xFFFD)
    }
    pub const fn all_relays() -> GroupAddress {
        GroupAddress(0xFFFE)
    }
    pub const fn all_nodes() -> GroupAddress {
        GroupAddress(0xFFFF)
    }
}

/// 14-bit hash of a virtual label UUID (`0x8000..=0xBFFF` on the wire).
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct VirtualAddress(u16);
impl VirtualAddress {
    /// # Panics
    /// Panics if `v` isn't in the virtual range.
    #[must_use]
    pub fn new(v: u16) -> VirtualAddress {
        match VirtualAddress::try_from(v) {
            Ok(h) => h,
            Err(_) => panic!("non virtual address '{}'", v),
        }
    }
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct AddressError(pub(crate) ());

impl TryFrom<u16> for UnicastAddress {
    type Error = AddressError;

    fn try_from(v: u16) -> Result<UnicastAddress, AddressError> {
        if v != 0 && v & UNICAST_BIT == 0 {
            Ok(UnicastAddress(v))
        } else {
            Err(AddressError(()))
        }
    }
}
impl TryFrom<u16> for GroupAddress {
    type Error = AddressError;

    fn try_from(v: u16) -> Result<GroupAddress, AddressError> {
        if v & GROUP_BITS == GROUP_BITS {
            Ok(GroupAddress(v))
        } else {
            Err(AddressError(()))
        }
    }
}
impl TryFrom<u16> for VirtualAddress {
    type Error = AddressError;

    fn try_from(v: u16) -> Result<VirtualAddress, AddressError> {
        if v & GROUP_BITS == UNICAST_BIT {
            Ok(VirtualAddress(v))
        } else {
            Err(AddressError(()))
        }
    }
}

#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub enum Address {
    #[default]
    Unassigned,
    Unicast(UnicastAddress),
    Virtual(VirtualAddress),
    Group(GroupAddress),
}
impl Address {
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Address::Unassigned)
    }
    #[must_use]
    pub fn is_unicast(&self) -> bool {
        matches!(self, Address::Unicast(_))
    }
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self, Address::Group(_))
    }
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self, Address::Virtual(_))
    }
    #[must_use]
    pub fn unicast(&self) -> Option<UnicastAddress> {
        match self {
            Address::Unicast(u) => Some(*u),
            _ => None,
        }
    }
    #[must_use]
    pub fn group(&self) -> Option<GroupAddress> {
        match self {
            Address::Group(g) => Some(*g),
            _ => None,
        }
    }
    #[must_use]
    pub fn value(&self) -> u16 {
        self.into()
    }
}
impl From<u16> for Address {
    fn from(v: u16) -> Address {
        if v == 0 {
            Address::Unassigned
        } else if v & UNICAST_BIT == 0 {
            Address::Unicast(UnicastAddress(v))
        } else if v & GROUP_BITS == GROUP_BITS {
            Address::Group(GroupAddress(v))
        } else {
            Address::Virtual(VirtualAddress(v))
        }
    }
}
impl From<UnicastAddress> for Address {
    fn from(u: UnicastAddress) -> Address {
        Address::Unicast(u)
    }
}
impl From<GroupAddress> for Address {
    fn from(g: GroupAddress) -> Address {
        Address::Group(g)
    }
}
impl From<&Address> for u16 {
    fn from(a: &Address) -> u16 {
        match a {
            Address::Unassigned => 0,
            Address::Unicast(u) => u.0,
            Address::Virtual(v) => v.0,
            Address::Group(g) => g.0,
        }
    }
}
impl ToFromBytesEndian for Address {
    type AsBytesType = [u8; 2];

    fn to_bytes_le(&self) -> Self::AsBytesType {
        u16::from(self).to_bytes_le()
    }

    fn to_bytes_be(&self) -> Self::AsBytesType {
        u16::from(self).to_bytes_be()
    }

    fn from_bytes_le(bytes: &[u8]) -> Option<Self> {
        Some(u16::from_bytes_le(bytes)?.into())
    }

    fn from_bytes_be(bytes: &[u8]) -> Option<Self> {
        Some(u16::from_bytes_be(bytes)?.into())
    }
}
impl ToFromBytesEndian for UnicastAddress {
    type AsBytesType = [u8; 2];

    fn to_bytes_le(&self) -> Self::AsBytesType {
        self.0.to_bytes_le()
    }

    fn to_bytes_be(&self) -> Self::AsBytesType {
        self.0.to_bytes_be()
    }

    fn from_bytes_le(bytes: &[u8]) -> Option<Self> {
        u16::from_bytes_le(bytes)?.try_into().ok()
    }

    fn from_bytes_be(bytes: &[u8]) -> Option<Self> {
        u16::from_bytes_be(bytes)?.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(Address::from(0x0000), Address::Unassigned);
        assert_eq!(
            Address::from(0x0001),
            Address::Unicast(UnicastAddress::new(0x0001))
        );
        assert_eq!(
            Address::from(0x7FFF),
            Address::Unicast(UnicastAddress::new(0x7FFF))
        );
        assert_eq!(
            Address::from(0x8000),
            Address::Virtual(VirtualAddress::new(0x8000))
        );
        assert_eq!(
            Address::from(0xBFFF),
            Address::Virtual(VirtualAddress::new(0xBFFF))
        );
        assert_eq!(
            Address::from(0xC000),
            Address::Group(GroupAddress::new(0xC000))
        );
        for v in 0xFF00..=0xFFFB_u16 {
            let g = Address::from(v).group().unwrap();
            assert!(g.is_rfu());
            assert!(!g.is_broadcast());
        }
        for v in 0xFFFC..=0xFFFF_u16 {
            assert!(Address::from(v).group().unwrap().is_broadcast());
        }
        assert_eq!(Address::from(0xFFFC).group(), Some(GroupAddress::all_proxies()));
        assert_eq!(Address::from(0xFFFD).group(), Some(GroupAddress::all_friends()));
        assert_eq!(Address::from(0xFFFE).group(), Some(GroupAddress::all_relays()));
        assert_eq!(Address::from(0xFFFF).group(), Some(GroupAddress::all_nodes()));
    }
    #[test]
    fn unicast_rejects() {
        assert!(UnicastAddress::try_from(0).is_err());
        assert!(UnicastAddress::try_from(0x8000).is_err());
        assert!(UnicastAddress::try_from(0x1234).is_ok());
    }
}
