//! Upper transport layer: AES-CCM protection of access payloads under an
//! application or device key, ahead of segmentation.
use crate::crypto::aes::{AESCipher, Error, MicSize};
use crate::crypto::key::{AppKey, DevKey, Key};
use crate::crypto::nonce::{AppNonce, DeviceNonce, Nonce};
use crate::crypto::{AID, AKF, MIC};
use crate::lower::{SegN, MAX_SEGMENT_LEN};

/// Key + nonce pair for one access payload. The nonce type is bound to the
/// key flavor so a device key can never be used with an application nonce.
pub enum SecurityMaterials {
    App(AppNonce, AppKey),
    Device(DeviceNonce, DevKey),
}
impl SecurityMaterials {
    #[must_use]
    fn unpack(&self) -> (&Nonce, &Key) {
        match self {
            SecurityMaterials::App(n, k) => (n.as_ref(), k.key()),
            SecurityMaterials::Device(n, k) => (n.as_ref(), k.key()),
        }
    }
    #[must_use]
    pub fn akf(&self) -> AKF {
        AKF(matches!(self, SecurityMaterials::App(..)))
    }
    #[must_use]
    pub fn aid(&self) -> AID {
        match self {
            SecurityMaterials::App(_, k) => k.aid(),
            SecurityMaterials::Device(_, k) => k.aid(),
        }
    }
    #[must_use]
    pub fn encrypt(&self, payload: &mut [u8], mic_size: MicSize) -> MIC {
        let (nonce, key) = self.unpack();
        AESCipher::new(*key).ccm_encrypt(nonce, b"", payload, mic_size)
    }
    pub fn decrypt(&self, payload: &mut [u8], mic: MIC) -> Result<(), Error> {
        let (nonce, key) = self.unpack();
        AESCipher::new(*key).ccm_decrypt(nonce, b"", payload, mic)
    }
}

/// Cleartext access payload (opcode || parameters).
pub struct AppPayload(pub Vec<u8>);
impl AppPayload {
    #[must_use]
    pub fn encrypt(self, sm: &SecurityMaterials, mic_size: MicSize) -> EncryptedAppPayload {
        let mut data = self.0;
        let mic = sm.encrypt(&mut data, mic_size);
        EncryptedAppPayload { data, mic }
    }
}

pub struct EncryptedAppPayload {
    data: Vec<u8>,
    mic: MIC,
}
impl EncryptedAppPayload {
    #[must_use]
    pub fn mic(&self) -> MIC {
        self.mic
    }
    /// Ciphertext with the MIC appended, the form the lower layer segments.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        let start = out.len();
        out.resize(start + self.mic.byte_size(), 0);
        self.mic.be_pack_into(&mut out[start..]);
        out
    }
    pub fn from_bytes(bytes: &[u8], mic_size: MicSize) -> Option<EncryptedAppPayload> {
        let data_len = bytes.len().checked_sub(mic_size.byte_size())?;
        if data_len == 0 {
            return None;
        }
        Some(EncryptedAppPayload {
            data: bytes[..data_len].to_vec(),
            mic: MIC::try_from_bytes_be(&bytes[data_len..])?,
        })
    }
    pub fn decrypt(self, sm: &SecurityMaterials) -> Result<AppPayload, Error> {
        let mut data = self.data;
        sm.decrypt(&mut data, self.mic)?;
        Ok(AppPayload(data))
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() + self.mic.byte_size()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    /// Fits in a single unsegmented PDU?
    #[must_use]
    pub fn is_unsegmented(&self) -> bool {
        self.len() <= MAX_SEGMENT_LEN
    }
    /// Last segment number when split into [`MAX_SEGMENT_LEN`] chunks.
    #[must_use]
    pub fn seg_n(&self) -> SegN {
        SegN::new(((self.len() + MAX_SEGMENT_LEN - 1) / MAX_SEGMENT_LEN - 1) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, UnicastAddress};
    use crate::mesh::{IVIndex, SequenceNumber};

    fn materials() -> SecurityMaterials {
        SecurityMaterials::App(
            AppNonce::from_parts(
                UnicastAddress::new(0x1201),
                Address::from(0x0F00_u16),
                SequenceNumber::new(0x000006),
                IVIndex(0x1234_5678),
            ),
            AppKey::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap(),
        )
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let payload = AppPayload(b"\x00\x56\x34\x12\x63".to_vec());
        let encrypted = AppPayload(payload.0.clone()).encrypt(&materials(), MicSize::Small);
        let bytes = encrypted.to_bytes();
        let reparsed = EncryptedAppPayload::from_bytes(&bytes, MicSize::Small).unwrap();
        let decrypted = reparsed.decrypt(&materials()).unwrap();
        assert_eq!(decrypted.0, payload.0);
    }

    #[test]
    fn wrong_key_rejects() {
        let encrypted = AppPayload(b"\x00\x01".to_vec()).encrypt(&materials(), MicSize::Small);
        let bytes = encrypted.to_bytes();
        let other = SecurityMaterials::App(
            AppNonce::from_parts(
                UnicastAddress::new(0x1201),
                Address::from(0x0F00_u16),
                SequenceNumber::new(0x000006),
                IVIndex(0x1234_5678),
            ),
            AppKey::from_hex("00000000000000000000000000000001").unwrap(),
        );
        assert!(EncryptedAppPayload::from_bytes(&bytes, MicSize::Small)
            .unwrap()
            .decrypt(&other)
            .is_err());
    }

    #[test]
    fn seg_n_boundaries() {
        let enc = |len: usize| {
            AppPayload(vec![0_u8; len]).encrypt(&materials(), MicSize::Small)
        };
        // len includes the 4-byte MIC.
        assert!(enc(8).is_unsegmented());
        assert!(!enc(9).is_unsegmented());
        assert_eq!(u8::from(enc(8).seg_n()), 0);
        assert_eq!(u8::from(enc(9).seg_n()), 1);
        assert_eq!(u8::from(enc(20).seg_n()), 1);
        assert_eq!(u8::from(enc(21).seg_n()), 2);
    }
}
