//! Confirmation-phase crypto. The MAC inputs are the exact byte images of
//! the Invite/Capabilities/Start payloads as they crossed the bearer, which
//! is why the handshake keeps them verbatim instead of recomputing them.
use crate::crypto::aes::AESCipher;
use crate::crypto::key::ConfirmationKey;
use crate::crypto::k_funcs::s1_slice;
use crate::crypto::{ECDHSecret, Salt};
use crate::provisioning::protocol::{
    Capabilities, Confirmation, Invite, ProtocolPDU, PublicKey, Random, Start,
};
use subtle::ConstantTimeEq;

/// 16 zero bytes: no out-of-band authentication.
pub const AUTH_VALUE_NO_OOB: [u8; 16] = [0_u8; 16];

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct ConfirmationSalt(pub Salt);

/// `invite || capabilities || start || own_pub.X || own_pub.Y ||
/// device_pub.X || device_pub.Y`, all payload images without opcodes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Inputs {
    pub invite: [u8; Invite::BYTE_LEN],
    pub capabilities: [u8; Capabilities::BYTE_LEN],
    pub start: [u8; Start::BYTE_LEN],
    pub provisioner_public_key: PublicKey,
    pub device_public_key: PublicKey,
}
impl Inputs {
    /// `confirmation_salt = s1(confirmation_inputs)`.
    #[must_use]
    pub fn salt(&self) -> ConfirmationSalt {
        ConfirmationSalt(s1_slice(&[
            &self.invite,
            &self.capabilities,
            &self.start,
            &self.provisioner_public_key.x,
            &self.provisioner_public_key.y,
            &self.device_public_key.x,
            &self.device_public_key.y,
        ]))
    }
    /// `confirmation_key = k1(ecdh_secret, confirmation_salt, "prck")`.
    #[must_use]
    pub fn confirmation_key(&self, secret: &ECDHSecret) -> ConfirmationKey {
        ConfirmationKey::from_secret_salt(secret, self.salt().0)
    }
}

/// `aes_cmac(confirmation_key, random || auth_value)`.
#[must_use]
pub fn confirm(key: &ConfirmationKey, random: &Random, auth_value: &[u8; 16]) -> Confirmation {
    let mac = AESCipher::new(*key.key()).cmac_slice(&[&random.0, auth_value]);
    let mut out = Confirmation::default();
    out.0.copy_from_slice(mac.as_ref());
    out
}

/// Constant-time check of a peer's confirmation against its revealed random.
#[must_use]
pub fn verify(
    key: &ConfirmationKey,
    random: &Random,
    auth_value: &[u8; 16],
    confirmation: &Confirmation,
) -> bool {
    confirm(key, random, auth_value).0.ct_eq(&confirmation.0).into()
}

/// Tests based on Mesh Core v1.0 sample data (8.7.2-8.7.4). The sample
/// fixtures are shared with the provisioning-data tests.
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::hex_16_to_array;

    fn hex_bytes(hex: &str) -> Vec<u8> {
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
            .collect()
    }
    pub(crate) fn sample_inputs() -> Inputs {
        let prov_pub = hex_bytes(
            "2c31a47b5779809ef44cb5eaaf5c3e43d5f8faad4a8794cb987e9b03745c78dd\
             919512183898dfbecd52e2408e43871fd021109117bd3ed4eaf8437743715d4f",
        );
        let dev_pub = hex_bytes(
            "f465e43ff23d3f1b9dc7dfc04da8758184dbc966204796eccf0d6cf5e16500cc\
             0201d048bcbbd899eeefc424164e33c201c2b010ca6b4d43a8a155cad8ecb279",
        );
        Inputs {
            invite: [0x00],
            capabilities: hex_bytes("0100010000000000000000").try_into().unwrap(),
            start: [0x00; 5],
            provisioner_public_key: PublicKey {
                x: prov_pub[..32].try_into().unwrap(),
                y: prov_pub[32..].try_into().unwrap(),
            },
            device_public_key: PublicKey {
                x: dev_pub[..32].try_into().unwrap(),
                y: dev_pub[32..].try_into().unwrap(),
            },
        }
    }
    pub(crate) fn sample_secret() -> ECDHSecret {
        let bytes: [u8; 32] = hex_bytes(
            "ab85843a2f6d883f62e5684b38e307335fe6e1945ecd19604105c6f23221eb69",
        )
        .try_into()
        .unwrap();
        ECDHSecret::new_bytes(bytes)
    }

    #[test]
    fn sample_confirmation_salt() {
        assert_eq!(
            sample_inputs().salt().0,
            Salt::from_hex("5faabe187337c71cc6c973369dcaa79a").unwrap()
        );
    }

    #[test]
    fn sample_confirmation_values() {
        let key = sample_inputs().confirmation_key(&sample_secret());
        assert_eq!(
            key.key().as_ref(),
            &hex_16_to_array("e31fe046c68ec339c425fc6629f0336f").unwrap()[..]
        );
        let random_provisioner =
            Random(hex_16_to_array("8b19ac31d58b124c946209b5db1021b9").unwrap());
        let random_device =
            Random(hex_16_to_array("55a2a2bca04cd32ff6f346bd0a0c1a3a").unwrap());
        let conf_provisioner = confirm(&key, &random_provisioner, &AUTH_VALUE_NO_OOB);
        assert_eq!(
            conf_provisioner.0,
            hex_16_to_array("b38a114dfdca1fe153bd2c1e0dc46ac2").unwrap()
        );
        let conf_device = confirm(&key, &random_device, &AUTH_VALUE_NO_OOB);
        assert_eq!(
            conf_device.0,
            hex_16_to_array("eeba521c196b52cc2e37aa40329f554e").unwrap()
        );
        assert!(verify(&key, &random_device, &AUTH_VALUE_NO_OOB, &conf_device));
        assert!(!verify(
            &key,
            &random_provisioner,
            &AUTH_VALUE_NO_OOB,
            &conf_device
        ));
    }
}
