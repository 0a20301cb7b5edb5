//! The s1/k1/k2/k3/k4 derivation functions (Mesh Core v1.0 Part 3.8.2).
use crate::crypto::aes::AESCipher;
use crate::crypto::key::{EncryptionKey, Key, PrivacyKey, ZERO_KEY};
use crate::crypto::{Salt, AID};
use crate::mesh::NID;

/// `s1(m) = aes_cmac(zero_key, m)`.
#[must_use]
pub fn s1(m: impl AsRef<[u8]>) -> Salt {
    s1_bytes(m.as_ref())
}
#[must_use]
pub fn s1_bytes(m: &[u8]) -> Salt {
    AESCipher::new(ZERO_KEY).cmac(m).as_salt()
}
/// `s1` over a concatenation without joining the parts first.
#[must_use]
pub fn s1_slice(ms: &[&[u8]]) -> Salt {
    AESCipher::new(ZERO_KEY).cmac_slice(ms).as_salt()
}

/// `k1(n, salt, p) = aes_cmac(aes_cmac(salt, n), p)`. `n` is arbitrary
/// length; the provisioning handshake feeds it the 32-byte ECDH secret.
#[must_use]
pub fn k1(n: &[u8], salt: Salt, p: &[u8]) -> Key {
    let t = AESCipher::from(salt).cmac(n);
    AESCipher::from(t).cmac(p)
}

/// `k2(n, p)` network-key derivation: NID (7 bits), encryption key and
/// privacy key. `p` is `0x00` for master security material.
#[must_use]
pub fn k2(n: &Key, p: impl AsRef<[u8]>) -> (NID, EncryptionKey, PrivacyKey) {
    k2_bytes(n, p.as_ref())
}
#[must_use]
pub fn k2_bytes(n: &Key, p: &[u8]) -> (NID, EncryptionKey, PrivacyKey) {
    assert!(!p.is_empty(), "p must have at least one byte");
    let salt = s1("smk2");
    let t = AESCipher::from(salt).cmac(n.as_ref());
    let cipher = AESCipher::from(t);
    let t_1 = cipher.cmac_slice(&[p, &[0x01]]);
    let t_2 = cipher.cmac_slice(&[t_1.as_ref(), p, &[0x02]]);
    let t_3 = cipher.cmac_slice(&[t_2.as_ref(), p, &[0x03]]);

    (
        NID::from_masked_u8(t_1.as_ref()[15]),
        EncryptionKey::new(t_2),
        PrivacyKey::new(t_3),
    )
}

/// `k3(n)`: 64-bit public network identifier.
#[must_use]
pub fn k3(key: &Key) -> u64 {
    let salt = s1("smk3");
    let t = AESCipher::from(salt).cmac(key.as_ref());
    u64::from_be_bytes(
        AESCipher::from(t).cmac(b"id64\x01").as_ref()[8..]
            .try_into()
            .expect("cmac returns 16 bytes, the last 8 become the id"),
    )
}

/// `k4(n)`: 6-bit AID of an application or device key.
#[must_use]
pub fn k4(key: &Key) -> AID {
    let salt = s1("smk4");
    let t = AESCipher::from(salt).cmac(key.as_ref());
    AID::new_masked(AESCipher::from(t).cmac(b"id6\x01").as_ref()[15])
}
