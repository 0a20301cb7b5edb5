//! Wrapper around the RustCrypto AES primitives (`aes`, `cmac`, `ccm`) so the
//! rest of the crate never touches a third-party crypto API directly. The
//! stack uses 128-bit keys exclusively.
use crate::crypto::key::Key;
use crate::crypto::{nonce::Nonce, Salt, MIC};
use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use ccm::aead::AeadInPlace;
use ccm::consts::{U13, U4, U8};
use ccm::Ccm;
use cmac::{Cmac, Mac};

pub const AES_BLOCK_LEN: usize = 16;
pub type AesBlock = [u8; AES_BLOCK_LEN];

/// Returned when a payload can't be authenticated. (Wrong key?)
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Error;

type AesCcmBigMic = Ccm<Aes128, U8, U13>;
type AesCcmSmallMic = Ccm<Aes128, U4, U13>;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum MicSize {
    Big,
    Small,
}
impl MicSize {
    #[must_use]
    pub fn byte_size(self) -> usize {
        match self {
            MicSize::Big => MIC::big_size(),
            MicSize::Small => MIC::small_size(),
        }
    }
    #[must_use]
    pub fn is_big(self) -> bool {
        matches!(self, MicSize::Big)
    }
}

pub struct AESCipher {
    key: Key,
    block_cipher: Aes128,
}
impl AESCipher {
    #[must_use]
    pub fn new(key: Key) -> AESCipher {
        AESCipher {
            key,
            block_cipher: Aes128::new(GenericArray::from_slice(key.as_ref())),
        }
    }
    /// The `e` function: AES-128-ECB of a single block.
    #[must_use]
    pub fn e(&self, mut block: AesBlock) -> AesBlock {
        self.block_cipher
            .encrypt_block(GenericArray::from_mut_slice(&mut block[..]));
        block
    }
    fn cmac_cipher(&self) -> Cmac<Aes128> {
        <Cmac<Aes128> as Mac>::new_from_slice(self.key.as_ref()).expect("key is always 16 bytes")
    }
    #[must_use]
    pub fn cmac(&self, m: &[u8]) -> Key {
        self.cmac_slice(&[m])
    }
    /// CMAC over the concatenation of `ms` without building the joined buffer.
    #[must_use]
    pub fn cmac_slice(&self, ms: &[&[u8]]) -> Key {
        let mut ctx = self.cmac_cipher();
        for m in ms {
            if !m.is_empty() {
                ctx.update(m);
            }
        }
        let tag = ctx.finalize().into_bytes();
        Key::try_from(tag.as_slice()).expect("cmac output is 16 bytes")
    }
    fn ccm_big_mic_cipher(&self) -> AesCcmBigMic {
        AesCcmBigMic::new_from_slice(self.key.as_ref()).expect("key is always 16 bytes")
    }
    fn ccm_small_mic_cipher(&self) -> AesCcmSmallMic {
        AesCcmSmallMic::new_from_slice(self.key.as_ref()).expect("key is always 16 bytes")
    }
    pub fn ccm_encrypt(
        &self,
        nonce: &Nonce,
        associated_data: &[u8],
        payload: &mut [u8],
        mic_size: MicSize,
    ) -> MIC {
        let nonce = GenericArray::from_slice(nonce.as_ref());
        match mic_size {
            MicSize::Big => {
                let tag = self
                    .ccm_big_mic_cipher()
                    .encrypt_in_place_detached(nonce, associated_data, payload)
                    .expect("payload or associated data too big");
                MIC::try_from_bytes_be(tag.as_slice()).expect("tag is 8 bytes")
            }
            MicSize::Small => {
                let tag = self
                    .ccm_small_mic_cipher()
                    .encrypt_in_place_detached(nonce, associated_data, payload)
                    .expect("payload or associated data too big");
                MIC::try_from_bytes_be(tag.as_slice()).expect("tag is 4 bytes")
            }
        }
    }
    /// AES-CCM decrypt-in-place with tag check. On `Err`, `payload` contents
    /// are unspecified and must be discarded by the caller.
    pub fn ccm_decrypt(
        &self,
        nonce: &Nonce,
        associated_data: &[u8],
        payload: &mut [u8],
        mic: MIC,
    ) -> Result<(), Error> {
        let nonce = GenericArray::from_slice(nonce.as_ref());
        match mic {
            MIC::Big(b) => self
                .ccm_big_mic_cipher()
                .decrypt_in_place_detached(
                    nonce,
                    associated_data,
                    payload,
                    GenericArray::from_slice(&b.to_be_bytes()),
                )
                .or(Err(Error)),
            MIC::Small(s) => self
                .ccm_small_mic_cipher()
                .decrypt_in_place_detached(
                    nonce,
                    associated_data,
                    payload,
                    GenericArray::from_slice(&s.to_be_bytes()),
                )
                .or(Err(Error)),
        }
    }
}
impl From<Key> for AESCipher {
    fn from(k: Key) -> Self {
        Self::new(k)
    }
}
impl From<Salt> for AESCipher {
    fn from(s: Salt) -> Self {
        s.as_key().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::ZERO_KEY;

    #[test]
    fn ccm_round_trip_small_mic() {
        let cipher = AESCipher::new(Key::from_hex("0953fa93e7caac9638f58820220a398e").unwrap());
        let nonce = Nonce::new([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]);
        let mut payload = *b"hello transport";
        let mic = cipher.ccm_encrypt(&nonce, b"", &mut payload, MicSize::Small);
        assert_ne!(&payload, b"hello transport");
        cipher
            .ccm_decrypt(&nonce, b"", &mut payload, mic)
            .expect("tag must verify");
        assert_eq!(&payload, b"hello transport");
    }

    #[test]
    fn ccm_detects_corruption() {
        let cipher = AESCipher::new(ZERO_KEY);
        let nonce = Nonce::new([0; 13]);
        let mut payload = *b"payload bytes";
        let mic = cipher.ccm_encrypt(&nonce, b"", &mut payload, MicSize::Big);
        payload[0] ^= 0x01;
        assert_eq!(
            cipher.ccm_decrypt(&nonce, b"", &mut payload, mic),
            Err(Error)
        );
    }

    #[test]
    fn cmac_slice_matches_joined() {
        let cipher = AESCipher::new(ZERO_KEY);
        let joined = cipher.cmac(b"abcdef");
        let split = cipher.cmac_slice(&[b"ab", b"", b"cdef"]);
        assert_eq!(joined, split);
    }
}
