//! Provisioning handshake PDUs (opcodes `0x00..=0x09`). Every PDU is an
//! opcode byte followed by a fixed-length payload.
use crate::crypto::MIC;
use crate::pack::PackError;

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
#[repr(u8)]
pub enum Opcode {
    Invite = 0x00,
    Capabilities = 0x01,
    Start = 0x02,
    PublicKey = 0x03,
    InputComplete = 0x04,
    Confirm = 0x05,
    Random = 0x06,
    Data = 0x07,
    Complete = 0x08,
    Failed = 0x09,
}
impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode as u8
    }
}
impl TryFrom<u8> for Opcode {
    type Error = PackError;

    fn try_from(value: u8) -> Result<Opcode, PackError> {
        match value {
            0x00 => Ok(Opcode::Invite),
            0x01 => Ok(Opcode::Capabilities),
            0x02 => Ok(Opcode::Start),
            0x03 => Ok(Opcode::PublicKey),
            0x04 => Ok(Opcode::InputComplete),
            0x05 => Ok(Opcode::Confirm),
            0x06 => Ok(Opcode::Random),
            0x07 => Ok(Opcode::Data),
            0x08 => Ok(Opcode::Complete),
            0x09 => Ok(Opcode::Failed),
            _ => Err(PackError::BadOpcode),
        }
    }
}

pub trait ProtocolPDU {
    const OPCODE: Opcode;
    const BYTE_LEN: usize;
    fn opcode(&self) -> Opcode {
        Self::OPCODE
    }
    /// Packs the payload (without the opcode byte) into `buf`.
    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError>;
    fn unpack(buf: &[u8]) -> Result<Self, PackError>
    where
        Self: Sized;
    /// Opcode byte followed by the payload, ready for the bearer.
    fn to_pdu_bytes(&self) -> Vec<u8> {
        let mut out = vec![0_u8; 1 + Self::BYTE_LEN];
        out[0] = Self::OPCODE.into();
        self.pack(&mut out[1..])
            .expect("buffer sized to BYTE_LEN above");
        out
    }
}

/// How long the device should identify itself (blink, beep, ...), seconds.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash, Default)]
pub struct AttentionDuration(pub u8);

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub struct Invite(pub AttentionDuration);
impl ProtocolPDU for Invite {
    const OPCODE: Opcode = Opcode::Invite;
    const BYTE_LEN: usize = 1;

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        buf[0] = (self.0).0;
        Ok(())
    }
    fn unpack(buf: &[u8]) -> Result<Invite, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        Ok(Invite(AttentionDuration(buf[0])))
    }
}

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
#[repr(u8)]
pub enum AlgorithmsFlags {
    FIPSP256 = 0b0,
}
impl TryFrom<u8> for AlgorithmsFlags {
    type Error = PackError;

    fn try_from(value: u8) -> Result<AlgorithmsFlags, PackError> {
        if value == 0b0 {
            Ok(AlgorithmsFlags::FIPSP256)
        } else {
            Err(PackError::bad_index(0))
        }
    }
}

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
#[repr(u8)]
pub enum PublicKeyType {
    /// Key exchanged in-band, over the bearer.
    NotAvailable = 0x00,
    /// An out-of-band public key is available (unsupported here).
    Available = 0x01,
}
impl TryFrom<u8> for PublicKeyType {
    type Error = PackError;

    fn try_from(value: u8) -> Result<PublicKeyType, PackError> {
        match value {
            0x00 => Ok(PublicKeyType::NotAvailable),
            0x01 => Ok(PublicKeyType::Available),
            _ => Err(PackError::bad_index(0)),
        }
    }
}

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
#[repr(u8)]
pub enum AuthenticationMethod {
    NoOOB = 0x00,
    StaticOOB = 0x01,
    OutputOOB = 0x02,
    InputOOB = 0x03,
}
impl TryFrom<u8> for AuthenticationMethod {
    type Error = PackError;

    fn try_from(value: u8) -> Result<AuthenticationMethod, PackError> {
        match value {
            0x00 => Ok(AuthenticationMethod::NoOOB),
            0x01 => Ok(AuthenticationMethod::StaticOOB),
            0x02 => Ok(AuthenticationMethod::OutputOOB),
            0x03 => Ok(AuthenticationMethod::InputOOB),
            _ => Err(PackError::bad_index(0)),
        }
    }
}

/// The 11-byte capabilities table a device answers the invite with.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub struct Capabilities {
    pub num_elements: u8,
    pub algorithms: u16,
    pub public_key_type: PublicKeyType,
    pub static_oob: u8,
    pub output_oob_size: u8,
    pub output_oob_action: u16,
    pub input_oob_size: u8,
    pub input_oob_action: u16,
}
impl ProtocolPDU for Capabilities {
    const OPCODE: Opcode = Opcode::Capabilities;
    const BYTE_LEN: usize = 11;

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        buf[0] = self.num_elements;
        buf[1..3].copy_from_slice(&self.algorithms.to_be_bytes());
        buf[3] = self.public_key_type as u8;
        buf[4] = self.static_oob;
        buf[5] = self.output_oob_size;
        buf[6..8].copy_from_slice(&self.output_oob_action.to_be_bytes());
        buf[8] = self.input_oob_size;
        buf[9..11].copy_from_slice(&self.input_oob_action.to_be_bytes());
        Ok(())
    }
    fn unpack(buf: &[u8]) -> Result<Capabilities, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        if buf[0] == 0 {
            // Needs at least one element.
            return Err(PackError::bad_index(0));
        }
        Ok(Capabilities {
            num_elements: buf[0],
            algorithms: u16::from_be_bytes([buf[1], buf[2]]),
            public_key_type: PublicKeyType::try_from(buf[3])?,
            static_oob: buf[4],
            output_oob_size: buf[5],
            output_oob_action: u16::from_be_bytes([buf[6], buf[7]]),
            input_oob_size: buf[8],
            input_oob_action: u16::from_be_bytes([buf[9], buf[10]]),
        })
    }
}

/// `algorithm || public_key_type || auth_method || auth_action || auth_size`.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub struct Start {
    pub algorithm: AlgorithmsFlags,
    pub public_key_type: PublicKeyType,
    pub auth_method: AuthenticationMethod,
    pub auth_action: u8,
    pub auth_size: u8,
}
impl Start {
    #[must_use]
    pub fn no_oob() -> Start {
        Start {
            algorithm: AlgorithmsFlags::FIPSP256,
            public_key_type: PublicKeyType::NotAvailable,
            auth_method: AuthenticationMethod::NoOOB,
            auth_action: 0,
            auth_size: 0,
        }
    }
}
impl ProtocolPDU for Start {
    const OPCODE: Opcode = Opcode::Start;
    const BYTE_LEN: usize = 5;

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        buf[0] = self.algorithm as u8;
        buf[1] = self.public_key_type as u8;
        buf[2] = self.auth_method as u8;
        buf[3] = self.auth_action;
        buf[4] = self.auth_size;
        Ok(())
    }
    fn unpack(buf: &[u8]) -> Result<Start, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        let auth_method = AuthenticationMethod::try_from(buf[2])?;
        if auth_method == AuthenticationMethod::NoOOB && (buf[3] != 0 || buf[4] != 0) {
            return Err(PackError::bad_index(3));
        }
        Ok(Start {
            algorithm: AlgorithmsFlags::try_from(buf[0])?,
            public_key_type: PublicKeyType::try_from(buf[1])?,
            auth_method,
            auth_action: buf[3],
            auth_size: buf[4],
        })
    }
}

pub const KEY_COMPONENT_LEN: usize = 32;
/// Uncompressed P-256 point, raw `X || Y`.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Debug)]
pub struct PublicKey {
    pub x: [u8; KEY_COMPONENT_LEN],
    pub y: [u8; KEY_COMPONENT_LEN],
}
impl Default for PublicKey {
    fn default() -> PublicKey {
        PublicKey {
            x: [0; KEY_COMPONENT_LEN],
            y: [0; KEY_COMPONENT_LEN],
        }
    }
}
impl ProtocolPDU for PublicKey {
    const OPCODE: Opcode = Opcode::PublicKey;
    const BYTE_LEN: usize = KEY_COMPONENT_LEN * 2;

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        buf[..KEY_COMPONENT_LEN].copy_from_slice(&self.x);
        buf[KEY_COMPONENT_LEN..].copy_from_slice(&self.y);
        Ok(())
    }
    fn unpack(buf: &[u8]) -> Result<PublicKey, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        let mut out = PublicKey::default();
        out.x.copy_from_slice(&buf[..KEY_COMPONENT_LEN]);
        out.y.copy_from_slice(&buf[KEY_COMPONENT_LEN..]);
        Ok(out)
    }
}

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub struct InputComplete();
impl ProtocolPDU for InputComplete {
    const OPCODE: Opcode = Opcode::InputComplete;
    const BYTE_LEN: usize = 0;

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)
    }
    fn unpack(buf: &[u8]) -> Result<InputComplete, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        Ok(InputComplete())
    }
}

pub const CONFIRMATION_LEN: usize = 16;
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash, Default)]
pub struct Confirmation(pub [u8; CONFIRMATION_LEN]);
impl ProtocolPDU for Confirmation {
    const OPCODE: Opcode = Opcode::Confirm;
    const BYTE_LEN: usize = CONFIRMATION_LEN;

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        buf.copy_from_slice(&self.0);
        Ok(())
    }
    fn unpack(buf: &[u8]) -> Result<Confirmation, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        let mut out = Confirmation::default();
        out.0.copy_from_slice(buf);
        Ok(out)
    }
}

pub const RANDOM_LEN: usize = 16;
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash, Default)]
pub struct Random(pub [u8; RANDOM_LEN]);
impl Random {
    #[must_use]
    pub fn new_secure() -> Random {
        use rand::RngCore;
        let mut bytes = [0_u8; RANDOM_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Random(bytes)
    }
}
impl ProtocolPDU for Random {
    const OPCODE: Opcode = Opcode::Random;
    const BYTE_LEN: usize = RANDOM_LEN;

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        buf.copy_from_slice(&self.0);
        Ok(())
    }
    fn unpack(buf: &[u8]) -> Result<Random, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        let mut out = Random::default();
        out.0.copy_from_slice(buf);
        Ok(out)
    }
}

pub const PROVISIONING_DATA_LEN: usize = 25;
/// `net_key || key_index || flags || iv_index || unicast` sealed under the
/// session key, with its 8-byte MIC.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub struct EncryptedProvisioningData {
    pub data: [u8; PROVISIONING_DATA_LEN],
    pub mic: MIC,
}
impl ProtocolPDU for EncryptedProvisioningData {
    const OPCODE: Opcode = Opcode::Data;
    const BYTE_LEN: usize = PROVISIONING_DATA_LEN + MIC::big_size();

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        debug_assert!(self.mic.is_big());
        buf[..PROVISIONING_DATA_LEN].copy_from_slice(&self.data);
        self.mic.be_pack_into(&mut buf[PROVISIONING_DATA_LEN..]);
        Ok(())
    }
    fn unpack(buf: &[u8]) -> Result<EncryptedProvisioningData, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        let mut data = [0_u8; PROVISIONING_DATA_LEN];
        data.copy_from_slice(&buf[..PROVISIONING_DATA_LEN]);
        let mic = MIC::try_from_bytes_be(&buf[PROVISIONING_DATA_LEN..])
            .expect("length checked above");
        Ok(EncryptedProvisioningData { data, mic })
    }
}

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub struct Complete();
impl ProtocolPDU for Complete {
    const OPCODE: Opcode = Opcode::Complete;
    const BYTE_LEN: usize = 0;

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)
    }
    fn unpack(buf: &[u8]) -> Result<Complete, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        Ok(Complete())
    }
}

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Debug)]
#[repr(u8)]
pub enum ErrorCode {
    InvalidPDU = 0x01,
    InvalidFormat = 0x02,
    UnexpectedPDU = 0x03,
    ConfirmationFailed = 0x04,
    OutOfResources = 0x05,
    DecryptionFailed = 0x06,
    UnexpectedError = 0x07,
    CannotAssignAddress = 0x08,
}
impl TryFrom<u8> for ErrorCode {
    type Error = PackError;

    fn try_from(value: u8) -> Result<ErrorCode, PackError> {
        match value {
            0x01 => Ok(ErrorCode::InvalidPDU),
            0x02 => Ok(ErrorCode::InvalidFormat),
            0x03 => Ok(ErrorCode::UnexpectedPDU),
            0x04 => Ok(ErrorCode::ConfirmationFailed),
            0x05 => Ok(ErrorCode::OutOfResources),
            0x06 => Ok(ErrorCode::DecryptionFailed),
            0x07 => Ok(ErrorCode::UnexpectedError),
            0x08 => Ok(ErrorCode::CannotAssignAddress),
            _ => Err(PackError::bad_index(0)),
        }
    }
}

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub struct Failed(pub ErrorCode);
impl ProtocolPDU for Failed {
    const OPCODE: Opcode = Opcode::Failed;
    const BYTE_LEN: usize = 1;

    fn pack(&self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        buf[0] = self.0 as u8;
        Ok(())
    }
    fn unpack(buf: &[u8]) -> Result<Failed, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        Ok(Failed(ErrorCode::try_from(buf[0])?))
    }
}

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub enum PDU {
    Invite(Invite),
    Capabilities(Capabilities),
    Start(Start),
    PublicKey(PublicKey),
    InputComplete(InputComplete),
    Confirm(Confirmation),
    Random(Random),
    Data(EncryptedProvisioningData),
    Complete(Complete),
    Failed(Failed),
}
impl PDU {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            PDU::Invite(_) => Opcode::Invite,
            PDU::Capabilities(_) => Opcode::Capabilities,
            PDU::Start(_) => Opcode::Start,
            PDU::PublicKey(_) => Opcode::PublicKey,
            PDU::InputComplete(_) => Opcode::InputComplete,
            PDU::Confirm(_) => Opcode::Confirm,
            PDU::Random(_) => Opcode::Random,
            PDU::Data(_) => Opcode::Data,
            PDU::Complete(_) => Opcode::Complete,
            PDU::Failed(_) => Opcode::Failed,
        }
    }
    /// Opcode byte plus payload.
    #[must_use]
    pub fn to_pdu_bytes(&self) -> Vec<u8> {
        match self {
            PDU::Invite(pdu) => pdu.to_pdu_bytes(),
            PDU::Capabilities(pdu) => pdu.to_pdu_bytes(),
            PDU::Start(pdu) => pdu.to_pdu_bytes(),
            PDU::PublicKey(pdu) => pdu.to_pdu_bytes(),
            PDU::InputComplete(pdu) => pdu.to_pdu_bytes(),
            PDU::Confirm(pdu) => pdu.to_pdu_bytes(),
            PDU::Random(pdu) => pdu.to_pdu_bytes(),
            PDU::Data(pdu) => pdu.to_pdu_bytes(),
            PDU::Complete(pdu) => pdu.to_pdu_bytes(),
            PDU::Failed(pdu) => pdu.to_pdu_bytes(),
        }
    }
    /// Parses an opcode byte plus payload, as delivered by the bearer.
    pub fn unpack_raw(bytes: &[u8]) -> Result<PDU, PackError> {
        PackError::atleast_length(1, bytes)?;
        let payload = &bytes[1..];
        Ok(match Opcode::try_from(bytes[0])? {
            Opcode::Invite => PDU::Invite(Invite::unpack(payload)?),
            Opcode::Capabilities => PDU::Capabilities(Capabilities::unpack(payload)?),
            Opcode::Start => PDU::Start(Start::unpack(payload)?),
            Opcode::PublicKey => PDU::PublicKey(PublicKey::unpack(payload)?),
            Opcode::InputComplete => PDU::InputComplete(InputComplete::unpack(payload)?),
            Opcode::Confirm => PDU::Confirm(Confirmation::unpack(payload)?),
            Opcode::Random => PDU::Random(Random::unpack(payload)?),
            Opcode::Data => PDU::Data(EncryptedProvisioningData::unpack(payload)?),
            Opcode::Complete => PDU::Complete(Complete::unpack(payload)?),
            Opcode::Failed => PDU::Failed(Failed::unpack(payload)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_round_trip() {
        let invite = Invite(AttentionDuration(5));
        let bytes = invite.to_pdu_bytes();
        assert_eq!(bytes, vec![0x00, 0x05]);
        assert_eq!(PDU::unpack_raw(&bytes).unwrap(), PDU::Invite(invite));
    }

    #[test]
    fn capabilities_round_trip() {
        let caps = Capabilities {
            num_elements: 1,
            algorithms: 0x0001,
            public_key_type: PublicKeyType::NotAvailable,
            static_oob: 0,
            output_oob_size: 0,
            output_oob_action: 0,
            input_oob_size: 0,
            input_oob_action: 0,
        };
        let bytes = caps.to_pdu_bytes();
        assert_eq!(
            bytes,
            vec![0x01, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(PDU::unpack_raw(&bytes).unwrap(), PDU::Capabilities(caps));
    }

    #[test]
    fn zero_elements_rejected() {
        let bytes = [0x01_u8, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(PDU::unpack_raw(&bytes).is_err());
    }

    #[test]
    fn start_no_oob_bytes() {
        let start = Start::no_oob();
        assert_eq!(start.to_pdu_bytes(), vec![0x02, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn failed_codes() {
        let bytes = [0x09_u8, 0x04];
        assert_eq!(
            PDU::unpack_raw(&bytes).unwrap(),
            PDU::Failed(Failed(ErrorCode::ConfirmationFailed))
        );
        assert!(PDU::unpack_raw(&[0x09, 0x00]).is_err());
        assert!(PDU::unpack_raw(&[0x0A]).is_err());
    }
}
