//! Network layer. Big endian on the wire.
//!
//! | Field Name    | Bits  | Notes                                                  |
//! |---------------|-------|--------------------------------------------------------|
//! | IVI           | 1     | Least significant bit of IV Index                      |
//! | NID           | 7     | Derived from the NetKey used to encrypt this PDU       |
//! | CTL           | 1     | Network Control                                        |
//! | TTL           | 7     | Time To Live                                           |
//! | SEQ           | 24    | Sequence Number                                        |
//! | SRC           | 16    | Source Unicast Address                                 |
//! | DST           | 16    | Destination Address (Unicast, Group or Virtual)        |
//! | Transport PDU | 8-128 | 1-16 bytes                                             |
//! | NetMIC        | 32/64 | 64 bit when CTL is set                                 |
//!
//! CTL|TTL, SEQ and SRC travel obfuscated: XORed against the leading 6 bytes
//! of `e(privacy_key, 0x0000000000 || iv_index || privacy_random)` where
//! `privacy_random` is the first 7 ciphertext bytes. DST rides inside the
//! AES-CCM envelope together with the transport PDU.
use crate::address::{Address, UnicastAddress};
use crate::bytes::ToFromBytesEndian;
use crate::crypto::aes::{AESCipher, MicSize};
use crate::crypto::materials::{NetworkCredential, NetworkKeys};
use crate::crypto::nonce::NetworkNonce;
use crate::crypto::MIC;
use crate::mesh::{IVIndex, KeyIndex, SequenceNumber, CTL, IVI, NID, TTL};

/// Header fields in the clear (post de-obfuscation).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Header {
    pub ivi: IVI,
    pub nid: NID,
    pub ctl: CTL,
    pub ttl: TTL,
    pub seq: SequenceNumber,
    pub src: UnicastAddress,
    pub dst: Address,
}
impl Header {
    #[must_use]
    pub fn big_mic(&self) -> bool {
        self.ctl.into()
    }
    fn mic_size(&self) -> MicSize {
        if self.big_mic() {
            MicSize::Big
        } else {
            MicSize::Small
        }
    }
}

pub const MAX_TRANSPORT_PDU_LEN: usize = 16;
/// IVI|NID + obfuscated header + encrypted DST.
const CLEAR_HEADER_LEN: usize = 1 + 6;
const OBFUSCATED_LEN: usize = 6;
const PRIVACY_RANDOM_LEN: usize = 7;
pub const MIN_ENCRYPTED_LEN: usize = CLEAR_HEADER_LEN + 2 + 1 + MIC::small_size();
pub const MAX_ENCRYPTED_LEN: usize =
    CLEAR_HEADER_LEN + 2 + MAX_TRANSPORT_PDU_LEN + MIC::big_size();

/// A cleartext network PDU: header plus the (already transport-layer
/// encrypted) transport payload.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct PDU {
    pub header: Header,
    pub transport_pdu: Vec<u8>,
}

/// A network PDU decrypted with a known credential.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct DecodedPDU {
    pub pdu: PDU,
    pub key_index: KeyIndex,
    pub iv_index: IVIndex,
}

fn pecb(keys: &NetworkKeys, iv_index: IVIndex, privacy_random: &[u8]) -> [u8; OBFUSCATED_LEN] {
    debug_assert_eq!(privacy_random.len(), PRIVACY_RANDOM_LEN);
    let mut block = [0_u8; 16];
    block[5..9].copy_from_slice(&iv_index.to_bytes_be());
    block[9..].copy_from_slice(privacy_random);
    let out = AESCipher::new(*keys.privacy_key().key()).e(block);
    out[..OBFUSCATED_LEN].try_into().expect("hard coded length")
}

impl PDU {
    /// # Panics
    /// Panics if the transport payload is empty, oversized or `dst` is
    /// unassigned; those are caller programming errors, not wire conditions.
    #[must_use]
    pub fn encrypt(&self, credential: &NetworkCredential) -> EncryptedPDU {
        assert!(
            !self.transport_pdu.is_empty() && self.transport_pdu.len() <= MAX_TRANSPORT_PDU_LEN,
            "bad transport PDU length {}",
            self.transport_pdu.len()
        );
        assert!(self.header.dst.is_assigned(), "unassigned destination");
        let keys = credential.network_keys();
        let iv_index = credential.iv_index;
        let nonce = NetworkNonce::from_parts(
            self.header.ctl,
            self.header.ttl,
            self.header.src,
            self.header.seq,
            iv_index,
        );
        let mic_size = self.header.mic_size();

        let mut out = Vec::with_capacity(MAX_ENCRYPTED_LEN);
        out.push(keys.nid().with_flag(iv_index.ivi().into()));
        out.push(self.header.ttl.with_flag(self.header.ctl.into()));
        out.extend_from_slice(&self.header.seq.to_bytes_be());
        out.extend_from_slice(&self.header.src.to_bytes_be());
        out.extend_from_slice(&self.header.dst.to_bytes_be());
        out.extend_from_slice(&self.transport_pdu);

        let cipher = AESCipher::new(*keys.encryption_key().key());
        let mic = cipher.ccm_encrypt(nonce.as_ref(), b"", &mut out[CLEAR_HEADER_LEN..], mic_size);
        let mic_start = out.len();
        out.resize(mic_start + mic.byte_size(), 0);
        mic.be_pack_into(&mut out[mic_start..]);

        let mask = pecb(&keys, iv_index, &out[CLEAR_HEADER_LEN..CLEAR_HEADER_LEN + PRIVACY_RANDOM_LEN]);
        for (byte, m) in out[1..CLEAR_HEADER_LEN].iter_mut().zip(mask.iter()) {
            *byte ^= m;
        }
        EncryptedPDU(out)
    }
}

/// An obfuscated+encrypted network PDU as it travels over the bearer.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct EncryptedPDU(Vec<u8>);
impl EncryptedPDU {
    pub fn new(bytes: &[u8]) -> Option<EncryptedPDU> {
        if bytes.len() < MIN_ENCRYPTED_LEN || bytes.len() > MAX_ENCRYPTED_LEN {
            None
        } else {
            Some(EncryptedPDU(bytes.to_vec()))
        }
    }
    #[must_use]
    pub fn nid(&self) -> NID {
        NID::new_with_flag(self.0[0]).0
    }
    #[must_use]
    pub fn ivi(&self) -> IVI {
        IVI(NID::new_with_flag(self.0[0]).1)
    }
    /// Tries every supplied credential whose derived NID matches. Returns
    /// `None` when none authenticates the PDU; an observer can't tell a
    /// foreign network's traffic from a corrupted frame.
    #[must_use]
    pub fn decrypt(&self, credentials: &[NetworkCredential]) -> Option<DecodedPDU> {
        let nid = self.nid();
        for credential in credentials.iter().filter(|c| c.matches_nid(nid)) {
            let iv_index = credential.iv_index.matching_ivi(self.ivi());
            let iv_index = match iv_index {
                Some(iv) => iv,
                None => continue,
            };
            if let Some(pdu) = self.try_decrypt(credential, iv_index) {
                return Some(DecodedPDU {
                    pdu,
                    key_index: credential.key_index,
                    iv_index,
                });
            }
        }
        None
    }
    fn try_decrypt(&self, credential: &NetworkCredential, iv_index: IVIndex) -> Option<PDU> {
        let keys = credential.network_keys();
        let data = &self.0;
        let mask = pecb(
            &keys,
            iv_index,
            &data[CLEAR_HEADER_LEN..CLEAR_HEADER_LEN + PRIVACY_RANDOM_LEN],
        );
        let mut header = [0_u8; OBFUSCATED_LEN];
        for (i, m) in mask.iter().enumerate() {
            header[i] = data[1 + i] ^ m;
        }
        let (ttl, ctl_flag) = TTL::new_with_flag(header[0]);
        let ctl = CTL(ctl_flag);
        let seq = SequenceNumber::from_bytes_be(&header[1..4])?;
        // A wire source must be unicast; anything else can't decrypt cleanly
        // under a real key, so bail before the CCM work.
        let src = UnicastAddress::from_bytes_be(&header[4..6])?;

        let mic_size = if ctl.0 { MIC::big_size() } else { MIC::small_size() };
        let cipher_end = data.len().checked_sub(mic_size)?;
        if cipher_end < CLEAR_HEADER_LEN + 2 + 1 {
            return None;
        }
        let mic = MIC::try_from_bytes_be(&data[cipher_end..])?;
        let nonce = NetworkNonce::from_parts(ctl, ttl, src, seq, iv_index);
        let mut buf = data[CLEAR_HEADER_LEN..cipher_end].to_vec();
        AESCipher::new(*keys.encryption_key().key())
            .ccm_decrypt(nonce.as_ref(), b"", &mut buf, mic)
            .ok()?;
        let dst = Address::from_bytes_be(&buf[..2])?;
        if !dst.is_assigned() {
            return None;
        }
        Some(PDU {
            header: Header {
                ivi: self.ivi(),
                nid: self.nid(),
                ctl,
                ttl,
                seq,
                src,
                dst,
            },
            transport_pdu: buf[2..].to_vec(),
        })
    }
}
impl AsRef<[u8]> for EncryptedPDU {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::NetKey;

    fn sample_credential() -> NetworkCredential {
        NetworkCredential::new(
            NetKey::from_hex("f7a2a44f8e8a8029064f173ddc1e2b00").unwrap(),
            KeyIndex::new(0),
            IVIndex(0x1234_5678),
        )
    }
    fn sample_pdu() -> PDU {
        PDU {
            header: Header {
                ivi: IVI(false),
                nid: NID::new(0x7F),
                ctl: CTL(false),
                ttl: TTL::new(0x0B),
                seq: SequenceNumber::new(0x000007),
                src: UnicastAddress::new(0x1201),
                dst: Address::from(0xFFFD_u16),
            },
            transport_pdu: vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
        }
    }

    #[test]
    fn encode_known_bytes() {
        let encrypted = sample_pdu().encrypt(&sample_credential());
        let expected: Vec<u8> = {
            let hex = "7f73dc6f7305a54d76e49200bbb625767bd28f773e";
            (0..hex.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
                .collect()
        };
        assert_eq!(encrypted.as_ref(), &expected[..]);
    }

    #[test]
    fn round_trip() {
        let credential = sample_credential();
        let pdu = sample_pdu();
        let decoded = pdu
            .encrypt(&credential)
            .decrypt(&[credential])
            .expect("own traffic must decode");
        assert_eq!(decoded.pdu, pdu);
        assert_eq!(decoded.iv_index, credential.iv_index);
        assert_eq!(decoded.key_index, credential.key_index);
    }

    #[test]
    fn round_trip_control_big_mic() {
        let credential = sample_credential();
        let mut pdu = sample_pdu();
        pdu.header.ctl = CTL(true);
        pdu.header.dst = Address::from(0x0001_u16);
        let encrypted = pdu.encrypt(&credential);
        assert_eq!(
            encrypted.as_ref().len(),
            CLEAR_HEADER_LEN + 2 + pdu.transport_pdu.len() + MIC::big_size()
        );
        assert_eq!(encrypted.decrypt(&[credential]).unwrap().pdu, pdu);
    }

    #[test]
    fn mic_bit_flips_reject() {
        let credential = sample_credential();
        let encrypted = sample_pdu().encrypt(&credential);
        let len = encrypted.as_ref().len();
        for byte in len - MIC::small_size()..len {
            for bit in 0..8 {
                let mut corrupt = encrypted.as_ref().to_vec();
                corrupt[byte] ^= 1 << bit;
                let corrupt = EncryptedPDU::new(&corrupt).unwrap();
                assert_eq!(corrupt.decrypt(&[credential]), None);
            }
        }
    }

    #[test]
    fn foreign_key_rejects() {
        let credential = sample_credential();
        let foreign = NetworkCredential::new(
            NetKey::from_hex("00112233445566778899aabbccddeeff").unwrap(),
            KeyIndex::new(1),
            IVIndex(0x1234_5678),
        );
        let encrypted = sample_pdu().encrypt(&credential);
        assert_eq!(encrypted.decrypt(&[foreign]), None);
    }
}
