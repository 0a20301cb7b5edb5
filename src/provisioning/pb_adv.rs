//! PB-ADV framing: 4-byte link id plus 1-byte transaction number in front of
//! every generic provisioning PDU. Each direction numbers its transactions
//! from its own half of the space.
use super::generic;
use crate::pack::PackError;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct LinkID(u32);
impl LinkID {
    pub const BYTE_LEN: usize = 4;
    #[must_use]
    pub const fn new(link_id: u32) -> LinkID {
        LinkID(link_id)
    }
    #[must_use]
    pub fn random() -> LinkID {
        LinkID(rand::random())
    }
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

const PROVISIONER_START: u8 = 0x00;
const PROVISIONER_END: u8 = 0x7F;
const DEVICE_START: u8 = 0x80;
const DEVICE_END: u8 = 0xFF;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct TransactionNumber(pub u8);
impl TransactionNumber {
    pub const BYTE_LEN: usize = 1;
    #[must_use]
    pub const fn new_provisioner() -> TransactionNumber {
        TransactionNumber(PROVISIONER_START)
    }
    #[must_use]
    pub const fn new_device() -> TransactionNumber {
        TransactionNumber(DEVICE_START)
    }
    #[must_use]
    pub fn is_device(self) -> bool {
        self.0 >= DEVICE_START
    }
    #[must_use]
    pub fn is_provisioner(self) -> bool {
        self.0 <= PROVISIONER_END
    }
    /// Next number in the same half of the space, wrapping within it.
    #[must_use]
    pub fn next(self) -> TransactionNumber {
        if self.is_device() {
            if self.0 == DEVICE_END {
                return TransactionNumber(DEVICE_START);
            }
        } else if self.0 == PROVISIONER_END {
            return TransactionNumber(PROVISIONER_START);
        }
        TransactionNumber(self.0 + 1)
    }
    pub fn increment(&mut self) {
        *self = self.next();
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PDU {
    pub link_id: LinkID,
    pub transaction_number: TransactionNumber,
    pub generic_pdu: generic::PDU,
}
impl PDU {
    pub const HEADER_BYTE_LEN: usize = LinkID::BYTE_LEN + TransactionNumber::BYTE_LEN;
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let generic = self.generic_pdu.to_bytes();
        let mut out = Vec::with_capacity(Self::HEADER_BYTE_LEN + generic.len());
        out.extend_from_slice(&self.link_id.0.to_be_bytes());
        out.push(self.transaction_number.0);
        out.extend_from_slice(&generic);
        out
    }
    pub fn unpack_from(buf: &[u8]) -> Result<PDU, PackError> {
        PackError::atleast_length(Self::HEADER_BYTE_LEN + 1, buf)?;
        Ok(PDU {
            link_id: LinkID(u32::from_be_bytes(
                buf[..LinkID::BYTE_LEN].try_into().expect("length checked"),
            )),
            transaction_number: TransactionNumber(buf[LinkID::BYTE_LEN]),
            generic_pdu: generic::PDU::unpack_from(&buf[Self::HEADER_BYTE_LEN..])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::generic::TransactionAcknowledgmentPDU;

    #[test]
    fn header_layout() {
        let pdu = PDU {
            link_id: LinkID::new(0xDEAD_BEEF),
            transaction_number: TransactionNumber(0x81),
            generic_pdu: generic::PDU::TransactionAcknowledgment(
                TransactionAcknowledgmentPDU::default(),
            ),
        };
        let bytes = pdu.to_bytes();
        assert_eq!(&bytes[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(bytes[4], 0x81);
        assert_eq!(PDU::unpack_from(&bytes).unwrap(), pdu);
    }

    #[test]
    fn transaction_numbers_stay_in_their_half() {
        let mut provisioner = TransactionNumber::new_provisioner();
        for _ in 0..0x7F {
            provisioner.increment();
        }
        assert_eq!(provisioner, TransactionNumber(0x7F));
        provisioner.increment();
        assert_eq!(provisioner, TransactionNumber::new_provisioner());

        let device = TransactionNumber(0xFF);
        assert_eq!(device.next(), TransactionNumber::new_device());
        assert!(device.is_device());
        assert!(!device.is_provisioner());
    }
}
