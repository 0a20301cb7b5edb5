//! NIST P-256 ephemeral key agreement for the provisioning handshake.
use crate::crypto::ECDHSecret;
use crate::provisioning::protocol::PublicKey;
use p256::elliptic_curve::generic_array::GenericArray;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub enum Error {
    KeyGenerationProblem,
    /// The peer's point is not on the curve (or is the identity).
    InvalidPeerKey,
}

pub struct PrivateKey(p256::SecretKey);
impl PrivateKey {
    #[must_use]
    pub fn generate() -> PrivateKey {
        PrivateKey(p256::SecretKey::random(&mut rand::rngs::OsRng))
    }
    /// Loads a fixed scalar. Handshake test vectors need deterministic key
    /// pairs; production code always uses [`PrivateKey::generate`].
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<PrivateKey, Error> {
        Ok(PrivateKey(
            p256::SecretKey::from_slice(bytes).map_err(|_| Error::KeyGenerationProblem)?,
        ))
    }
    /// The uncompressed public point as raw X || Y coordinates.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let point = self.0.public_key().to_encoded_point(false);
        let x = point.x().expect("uncompressed point always has an x");
        let y = point.y().expect("uncompressed point always has a y");
        PublicKey {
            x: (*x).into(),
            y: (*y).into(),
        }
    }
    /// ECDH: the x coordinate of `private * peer_point`, 32 bytes.
    pub fn agree(&self, peer: &PublicKey) -> Result<ECDHSecret, Error> {
        let encoded = p256::EncodedPoint::from_affine_coordinates(
            GenericArray::from_slice(&peer.x),
            GenericArray::from_slice(&peer.y),
            false,
        );
        let peer_key: Option<p256::PublicKey> =
            p256::PublicKey::from_encoded_point(&encoded).into();
        let peer_key = peer_key.ok_or(Error::InvalidPeerKey)?;
        let shared =
            p256::ecdh::diffie_hellman(self.0.to_nonzero_scalar(), peer_key.as_affine());
        let bytes: [u8; 32] = shared
            .raw_secret_bytes()
            .as_slice()
            .try_into()
            .expect("P-256 shared secret is 32 bytes");
        Ok(ECDHSecret::new_bytes(bytes))
    }
}

/// Tests based on Mesh Core v1.0 sample data (8.7.1).
#[cfg(test)]
mod tests {
    use super::*;

    fn hex32(hex: &str) -> [u8; 32] {
        let mut out = [0_u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            out[i] = u8::from_str_radix(core::str::from_utf8(chunk).unwrap(), 16).unwrap();
        }
        out
    }

    #[test]
    fn sample_key_agreement() {
        let provisioner = PrivateKey::from_bytes(&hex32(
            "06a516693c9aa31a6084545d0c5db641b48572b97203ddffb7ac73f7d0457663",
        ))
        .unwrap();
        let device = PrivateKey::from_bytes(&hex32(
            "529aa0670d72cd6497502ed473502b037e8803b5c60829a5a3caa219505530ba",
        ))
        .unwrap();
        let provisioner_public = provisioner.public_key();
        assert_eq!(
            provisioner_public.x,
            hex32("2c31a47b5779809ef44cb5eaaf5c3e43d5f8faad4a8794cb987e9b03745c78dd")
        );
        assert_eq!(
            provisioner_public.y,
            hex32("919512183898dfbecd52e2408e43871fd021109117bd3ed4eaf8437743715d4f")
        );
        let device_public = device.public_key();
        assert_eq!(
            device_public.x,
            hex32("f465e43ff23d3f1b9dc7dfc04da8758184dbc966204796eccf0d6cf5e16500cc")
        );
        let expected =
            hex32("ab85843a2f6d883f62e5684b38e307335fe6e1945ecd19604105c6f23221eb69");
        let secret_a = provisioner.agree(&device_public).unwrap();
        let secret_b = device.agree(&provisioner_public).unwrap();
        assert_eq!(secret_a.as_ref(), &expected[..]);
        assert_eq!(secret_b.as_ref(), &expected[..]);
    }

    #[test]
    fn rejects_off_curve_point() {
        let key = PrivateKey::generate();
        let bogus = PublicKey {
            x: [0xAA; 32],
            y: [0x55; 32],
        };
        assert_eq!(key.agree(&bogus), Err(Error::InvalidPeerKey));
    }
}
