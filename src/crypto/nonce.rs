//! 13-byte AES-CCM nonces. The first byte tags the nonce type so network,
//! application and device traffic can never collide on the same nonce.
use crate::address::{Address, UnicastAddress};
use crate::bytes::ToFromBytesEndian;
use crate::mesh::{IVIndex, SequenceNumber, CTL, TTL};

pub const NONCE_LEN: usize = 13;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
pub struct Nonce([u8; NONCE_LEN]);
impl Nonce {
    #[must_use]
    pub const fn new(bytes: [u8; NONCE_LEN]) -> Nonce {
        Nonce(bytes)
    }
}
impl AsRef<[u8]> for Nonce {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

/// Nonce types. `0x04..=0xFF` RFU (the proxy nonce is out of scope here).
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum NonceType {
    Network = 0x00,
    Application = 0x01,
    Device = 0x02,
}
impl NonceType {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

macro_rules! nonce_wrapper {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
        pub struct $name(pub Nonce);
        impl $name {
            #[must_use]
            pub const fn new_bytes(bytes: [u8; NONCE_LEN]) -> Self {
                Self(Nonce::new(bytes))
            }
        }
        impl AsRef<Nonce> for $name {
            fn as_ref(&self) -> &Nonce {
                &self.0
            }
        }
        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_ref()
            }
        }
    };
}
nonce_wrapper!(
    /// `0x00 || (ctl|ttl) || seq || src || 0x0000 || iv_index`.
    NetworkNonce
);
nonce_wrapper!(
    /// `0x01 || 0x00 || seq || src || dst || iv_index`.
    AppNonce
);
nonce_wrapper!(
    /// `0x02 || 0x00 || seq || src || dst || iv_index`.
    DeviceNonce
);
nonce_wrapper!(
    /// Provisioning-data nonce, the last 13 bytes of
    /// `k1(ecdh_secret, prov_salt, "prsn")`.
    SessionNonce
);

impl NetworkNonce {
    #[must_use]
    pub fn from_parts(
        ctl: CTL,
        ttl: TTL,
        src: UnicastAddress,
        seq: SequenceNumber,
        iv_index: IVIndex,
    ) -> NetworkNonce {
        let seq = seq.to_bytes_be();
        let src = src.to_bytes_be();
        let iv = iv_index.to_bytes_be();
        NetworkNonce::new_bytes([
            NonceType::Network.as_u8(),
            ttl.with_flag(ctl.0),
            seq[0],
            seq[1],
            seq[2],
            src[0],
            src[1],
            0x00,
            0x00,
            iv[0],
            iv[1],
            iv[2],
            iv[3],
        ])
    }
}

fn access_nonce_bytes(
    nonce_type: NonceType,
    src: UnicastAddress,
    dst: Address,
    seq: SequenceNumber,
    iv_index: IVIndex,
) -> [u8; NONCE_LEN] {
    let seq = seq.to_bytes_be();
    let src = src.to_bytes_be();
    let dst = dst.to_bytes_be();
    let iv = iv_index.to_bytes_be();
    [
        nonce_type.as_u8(),
        0x00,
        seq[0],
        seq[1],
        seq[2],
        src[0],
        src[1],
        dst[0],
        dst[1],
        iv[0],
        iv[1],
        iv[2],
        iv[3],
    ]
}

impl AppNonce {
    #[must_use]
    pub fn from_parts(
        src: UnicastAddress,
        dst: Address,
        seq: SequenceNumber,
        iv_index: IVIndex,
    ) -> AppNonce {
        AppNonce::new_bytes(access_nonce_bytes(
            NonceType::Application,
            src,
            dst,
            seq,
            iv_index,
        ))
    }
}
impl DeviceNonce {
    #[must_use]
    pub fn from_parts(
        src: UnicastAddress,
        dst: Address,
        seq: SequenceNumber,
        iv_index: IVIndex,
    ) -> DeviceNonce {
        DeviceNonce::new_bytes(access_nonce_bytes(
            NonceType::Device,
            src,
            dst,
            seq,
            iv_index,
        ))
    }
}
impl SessionNonce {
    /// Takes the trailing 13 bytes of the 16-byte `k1` output.
    #[must_use]
    pub fn from_k1_output(key: &crate::crypto::key::Key) -> SessionNonce {
        let bytes: [u8; NONCE_LEN] = key.as_ref()[16 - NONCE_LEN..]
            .try_into()
            .expect("hard coded length");
        SessionNonce::new_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_nonce_layout() {
        let nonce = NetworkNonce::from_parts(
            CTL(false),
            TTL::new(0x0B),
            UnicastAddress::new(0x1201),
            SequenceNumber::new(0x000007),
            IVIndex(0x1234_5678),
        );
        assert_eq!(
            AsRef::<[u8]>::as_ref(&nonce),
            &[0x00, 0x0B, 0x00, 0x00, 0x07, 0x12, 0x01, 0x00, 0x00, 0x12, 0x34, 0x56, 0x78][..]
        );
    }
    #[test]
    fn device_nonce_layout() {
        let nonce = DeviceNonce::from_parts(
            UnicastAddress::new(0x0003),
            Address::from(0x1201_u16),
            SequenceNumber::new(0x3129AB),
            IVIndex(0x1234_5678),
        );
        assert_eq!(
            AsRef::<[u8]>::as_ref(&nonce),
            &[0x02, 0x00, 0x31, 0x29, 0xAB, 0x00, 0x03, 0x12, 0x01, 0x12, 0x34, 0x56, 0x78][..]
        );
    }
}
