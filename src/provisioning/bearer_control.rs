//! Bearer control PDUs: link open/ack/close. `GPCF = 0b11`, opcode in the
//! upper six bits of the first byte. Opcodes `0x03..=0xFF` are RFU.
use crate::pack::PackError;
use crate::provisioning::generic::GPCF;
use crate::uuid::UUID;
use core::fmt::{Display, Error, Formatter};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Ord, PartialOrd)]
#[repr(u8)]
pub enum Opcode {
    LinkOpen = 0x00,
    LinkAck = 0x01,
    LinkClose = 0x02,
}
impl Opcode {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        GPCF::BearerControl.pack_with(self as u8)
    }
}
impl TryFrom<u8> for Opcode {
    type Error = PackError;

    fn try_from(value: u8) -> Result<Opcode, PackError> {
        match value {
            0x00 => Ok(Opcode::LinkOpen),
            0x01 => Ok(Opcode::LinkAck),
            0x02 => Ok(Opcode::LinkClose),
            _ => Err(PackError::BadOpcode),
        }
    }
}

/// Opens a link to the device with the given UUID.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialOrd, PartialEq, Debug)]
pub struct LinkOpen(pub UUID);
impl LinkOpen {
    pub const BYTE_LEN: usize = UUID::BYTE_LEN;
}
impl Display for LinkOpen {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "LinkOpen({})", self.0)
    }
}

#[derive(Clone, Copy, Eq, Hash, Ord, PartialOrd, PartialEq, Debug)]
pub struct LinkAck();

#[derive(Clone, Copy, Eq, Hash, Ord, PartialOrd, PartialEq, Debug)]
#[repr(u8)]
pub enum CloseReason {
    Success = 0x00,
    Timeout = 0x01,
    Fail = 0x02,
}
impl TryFrom<u8> for CloseReason {
    type Error = PackError;

    fn try_from(value: u8) -> Result<CloseReason, PackError> {
        match value {
            0x00 => Ok(CloseReason::Success),
            0x01 => Ok(CloseReason::Timeout),
            0x02 => Ok(CloseReason::Fail),
            _ => Err(PackError::bad_index(1)),
        }
    }
}
impl Display for CloseReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let name = match self {
            CloseReason::Success => "success",
            CloseReason::Timeout => "timeout",
            CloseReason::Fail => "fail",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Eq, Hash, Ord, PartialOrd, PartialEq, Debug)]
pub struct LinkClose(pub CloseReason);

#[derive(Clone, Copy, Eq, Hash, Ord, PartialOrd, PartialEq, Debug)]
pub enum PDU {
    LinkOpen(LinkOpen),
    LinkAck(LinkAck),
    LinkClose(LinkClose),
}
impl PDU {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            PDU::LinkOpen(_) => Opcode::LinkOpen,
            PDU::LinkAck(_) => Opcode::LinkAck,
            PDU::LinkClose(_) => Opcode::LinkClose,
        }
    }
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.opcode().as_u8()];
        match self {
            PDU::LinkOpen(open) => out.extend_from_slice(open.0.as_ref()),
            PDU::LinkAck(_) => {}
            PDU::LinkClose(close) => out.push(close.0 as u8),
        }
        out
    }
    pub fn unpack_from(buf: &[u8]) -> Result<PDU, PackError> {
        PackError::atleast_length(1, buf)?;
        let (gpcf, opcode) = GPCF::unpack_with(buf[0]);
        if gpcf != GPCF::BearerControl {
            return Err(PackError::BadOpcode);
        }
        match Opcode::try_from(opcode)? {
            Opcode::LinkOpen => {
                PackError::expect_length(1 + LinkOpen::BYTE_LEN, buf)?;
                Ok(PDU::LinkOpen(LinkOpen(
                    UUID::try_from(&buf[1..]).expect("length checked above"),
                )))
            }
            Opcode::LinkAck => {
                PackError::expect_length(1, buf)?;
                Ok(PDU::LinkAck(LinkAck()))
            }
            Opcode::LinkClose => {
                PackError::expect_length(2, buf)?;
                Ok(PDU::LinkClose(LinkClose(CloseReason::try_from(buf[1])?)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_open_round_trip() {
        let uuid = UUID::new_bytes([7; 16]);
        let pdu = PDU::LinkOpen(LinkOpen(uuid));
        let bytes = pdu.to_bytes();
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[0], 0b0000_0011);
        assert_eq!(PDU::unpack_from(&bytes).unwrap(), pdu);
    }

    #[test]
    fn link_close_reasons() {
        for (reason, byte) in [
            (CloseReason::Success, 0x00),
            (CloseReason::Timeout, 0x01),
            (CloseReason::Fail, 0x02),
        ] {
            let pdu = PDU::LinkClose(LinkClose(reason));
            let bytes = pdu.to_bytes();
            assert_eq!(bytes, vec![0b0000_1011, byte]);
            assert_eq!(PDU::unpack_from(&bytes).unwrap(), pdu);
        }
        assert!(PDU::unpack_from(&[0b0000_1011, 0x03]).is_err());
    }

    #[test]
    fn link_ack_is_one_byte() {
        let pdu = PDU::LinkAck(LinkAck());
        assert_eq!(pdu.to_bytes(), vec![0b0000_0111]);
        assert_eq!(PDU::unpack_from(&[0b0000_0111]).unwrap(), pdu);
    }
}
