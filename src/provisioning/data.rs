//! Provisioning data: the network credentials injected into the device at
//! the end of the handshake, sealed under the session key.
use crate::address::UnicastAddress;
use crate::bytes::ToFromBytesEndian;
use crate::crypto::aes::{AESCipher, MicSize};
use crate::crypto::k_funcs::s1_slice;
use crate::crypto::key::{NetKey, SessionKey, KEY_LEN};
use crate::crypto::nonce::SessionNonce;
use crate::crypto::{k1, ECDHSecret, ProvisioningSalt};
use crate::mesh::{IVIndex, KeyIndex};
use crate::pack::PackError;
use crate::provisioning::confirmation::ConfirmationSalt;
use crate::provisioning::protocol::{EncryptedProvisioningData, Random, PROVISIONING_DATA_LEN};

/// `prov_salt = s1(confirmation_salt || random_provisioner || random_device)`.
#[must_use]
pub fn provisioning_salt(
    confirmation_salt: &ConfirmationSalt,
    random_provisioner: &Random,
    random_device: &Random,
) -> ProvisioningSalt {
    ProvisioningSalt(s1_slice(&[
        confirmation_salt.0.as_ref(),
        &random_provisioner.0,
        &random_device.0,
    ]))
}

pub struct SessionSecurityMaterials {
    pub key: SessionKey,
    pub nonce: SessionNonce,
}
impl SessionSecurityMaterials {
    #[must_use]
    pub fn from_secret_salt(
        secret: &ECDHSecret,
        salt: &ProvisioningSalt,
    ) -> SessionSecurityMaterials {
        SessionSecurityMaterials {
            key: SessionKey::from_secret_salt(secret, salt),
            // `session_nonce` is the trailing 13 bytes of the k1 output.
            nonce: SessionNonce::from_k1_output(&k1(secret.as_ref(), salt.as_salt(), b"prsn")),
        }
    }
}

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Default, Debug, Hash)]
pub struct Flags(u8);
pub const FLAGS_MAX: u8 = 0b11;
impl Flags {
    pub const KEY_REFRESH: u8 = 1 << 0;
    pub const IV_UPDATE: u8 = 1 << 1;
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}
impl TryFrom<u8> for Flags {
    type Error = PackError;

    fn try_from(value: u8) -> Result<Flags, PackError> {
        if value > FLAGS_MAX {
            Err(PackError::bad_index(0))
        } else {
            Ok(Flags(value))
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum DataError {
    /// MIC mismatch; the plaintext was discarded.
    Decrypt,
    Pack(PackError),
}

/// `net_key || key_index(2) || flags(1) || iv_index(4) || unicast(2)`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct ProvisioningData {
    pub net_key: NetKey,
    pub key_index: KeyIndex,
    pub flags: Flags,
    pub iv_index: IVIndex,
    pub element_address: UnicastAddress,
}
impl ProvisioningData {
    #[must_use]
    pub fn packed_unencrypted(&self) -> [u8; PROVISIONING_DATA_LEN] {
        let mut out = [0_u8; PROVISIONING_DATA_LEN];
        out[..KEY_LEN].copy_from_slice(self.net_key.as_ref());
        out[KEY_LEN..KEY_LEN + 2].copy_from_slice(&self.key_index.to_bytes_be());
        out[KEY_LEN + 2] = self.flags.value();
        out[KEY_LEN + 3..KEY_LEN + 7].copy_from_slice(&self.iv_index.to_bytes_be());
        out[KEY_LEN + 7..].copy_from_slice(&self.element_address.to_bytes_be());
        out
    }
    pub fn unpack_unencrypted(buf: &[u8]) -> Result<ProvisioningData, PackError> {
        PackError::expect_length(PROVISIONING_DATA_LEN, buf)?;
        Ok(ProvisioningData {
            net_key: NetKey::try_from(&buf[..KEY_LEN]).expect("length checked above"),
            key_index: KeyIndex::from_bytes_be(&buf[KEY_LEN..KEY_LEN + 2])
                .ok_or(PackError::bad_index(KEY_LEN))?,
            flags: Flags::try_from(buf[KEY_LEN + 2])
                .map_err(|_| PackError::bad_index(KEY_LEN + 2))?,
            iv_index: IVIndex::from_bytes_be(&buf[KEY_LEN + 3..KEY_LEN + 7])
                .expect("hard coded length"),
            element_address: UnicastAddress::from_bytes_be(&buf[KEY_LEN + 7..])
                .ok_or(PackError::bad_index(KEY_LEN + 7))?,
        })
    }
    #[must_use]
    pub fn encrypt(&self, materials: &SessionSecurityMaterials) -> EncryptedProvisioningData {
        let mut data = self.packed_unencrypted();
        let mic = AESCipher::new(*materials.key.key()).ccm_encrypt(
            materials.nonce.as_ref(),
            b"",
            &mut data,
            MicSize::Big,
        );
        EncryptedProvisioningData { data, mic }
    }
    pub fn decrypt(
        materials: &SessionSecurityMaterials,
        mut encrypted: EncryptedProvisioningData,
    ) -> Result<ProvisioningData, DataError> {
        AESCipher::new(*materials.key.key())
            .ccm_decrypt(
                materials.nonce.as_ref(),
                b"",
                &mut encrypted.data,
                encrypted.mic,
            )
            .map_err(|_| DataError::Decrypt)?;
        ProvisioningData::unpack_unencrypted(&encrypted.data).map_err(DataError::Pack)
    }
}

/// Tests based on Mesh Core v1.0 sample data (8.7.5-8.7.7).
#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hex_16_to_array;
    use crate::crypto::key::DevKey;
    use crate::provisioning::confirmation::tests::{sample_inputs, sample_secret};

    fn sample_session() -> (ProvisioningSalt, SessionSecurityMaterials) {
        let salt = provisioning_salt(
            &sample_inputs().salt(),
            &Random(hex_16_to_array("8b19ac31d58b124c946209b5db1021b9").unwrap()),
            &Random(hex_16_to_array("55a2a2bca04cd32ff6f346bd0a0c1a3a").unwrap()),
        );
        let materials = SessionSecurityMaterials::from_secret_salt(&sample_secret(), &salt);
        (salt, materials)
    }

    #[test]
    fn sample_session_materials() {
        let (salt, materials) = sample_session();
        assert_eq!(
            salt.as_salt().as_ref(),
            &hex_16_to_array("a21c7d45f201cf9489a2fb57145015b4").unwrap()[..]
        );
        assert_eq!(
            materials.key.as_ref(),
            &hex_16_to_array("c80253af86b33dfa450bbdb2a191fea3").unwrap()[..]
        );
        assert_eq!(
            AsRef::<[u8]>::as_ref(&materials.nonce),
            &[0xda, 0x7d, 0xdb, 0xe7, 0x8b, 0x5f, 0x62, 0xb8, 0x1d, 0x68, 0x47, 0x48, 0x7e][..]
        );
    }

    #[test]
    fn sample_device_key() {
        let (salt, _) = sample_session();
        let device_key = DevKey::from_secret_salt(&sample_secret(), &salt);
        assert_eq!(
            device_key.as_ref(),
            &hex_16_to_array("0520adad5e0142aa3e325087b4ec16d8").unwrap()[..]
        );
    }

    #[test]
    fn sample_encrypted_data() {
        let (_, materials) = sample_session();
        let data = ProvisioningData {
            net_key: NetKey::from_hex("efb2255e6422d330088e09bb015ed707").unwrap(),
            key_index: KeyIndex::new(0x0567),
            flags: Flags::default(),
            iv_index: IVIndex(0x0102_0304),
            element_address: UnicastAddress::new(0x0B0C),
        };
        let encrypted = data.encrypt(&materials);
        let mut wire = [0_u8; 33];
        wire[..25].copy_from_slice(&encrypted.data);
        encrypted.mic.be_pack_into(&mut wire[25..]);
        let expected = "d0bd7f4a89a2ff6222af59a90a60ad58acfe3123356f5cec2973e0ec50783b10c7";
        let expected: Vec<u8> = (0..expected.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&expected[i..i + 2], 16).unwrap())
            .collect();
        assert_eq!(&wire[..], &expected[..]);

        let decrypted = ProvisioningData::decrypt(&materials, encrypted).unwrap();
        assert_eq!(decrypted, data);
    }

    #[test]
    fn corrupted_data_rejected() {
        let (_, materials) = sample_session();
        let data = ProvisioningData {
            net_key: NetKey::from_hex("efb2255e6422d330088e09bb015ed707").unwrap(),
            key_index: KeyIndex::new(0),
            flags: Flags::default(),
            iv_index: IVIndex(0),
            element_address: UnicastAddress::new(0x0001),
        };
        let mut encrypted = data.encrypt(&materials);
        encrypted.data[0] ^= 0x01;
        assert_eq!(
            ProvisioningData::decrypt(&materials, encrypted),
            Err(DataError::Decrypt)
        );
    }
}
