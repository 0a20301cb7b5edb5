//! Element-facing access API: send/receive by opcode. All protocol errors
//! are caught at this boundary; `send_message` reports a plain bool and logs
//! the reason, `recv_message` yields the parameters or nothing.
use crate::access::{self, OpcodeError};
use crate::address::UnicastAddress;
use crate::crypto::aes::MicSize;
use crate::crypto::nonce::{AppNonce, DeviceNonce};
use crate::device_state::{AllocError, KeyStore};
use crate::mesh::{IVIndex, SequenceNumber};
use crate::stack::messages::{HardContext, IncomingUpperPdu, SoftContext};
use crate::stack::segments::{self, NetworkTx, RecvError, SendError};
use crate::stack::Stack;
use crate::upper::{AppPayload, EncryptedAppPayload, SecurityMaterials};
use core::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum MessageError {
    #[error(transparent)]
    Opcode(#[from] OpcodeError),
    #[error("source address must be unicast")]
    SrcAddress,
    #[error("destination address must be assigned")]
    DstAddress,
    #[error("unknown network identity")]
    UnknownNetwork,
    #[error("unknown application identity")]
    UnknownApplication,
    #[error("unknown device identity")]
    UnknownDevice,
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Recv(#[from] RecvError),
}

fn outbound_materials(
    keystore: &dyn KeyStore,
    ctx: &SoftContext,
    src: UnicastAddress,
    seq: SequenceNumber,
    iv_index: IVIndex,
) -> Result<SecurityMaterials, MessageError> {
    if ctx.is_device_key {
        let device = keystore
            .device(&ctx.node_identity)
            .ok_or(MessageError::UnknownDevice)?;
        Ok(SecurityMaterials::Device(
            DeviceNonce::from_parts(src, ctx.dst, seq, iv_index),
            device.device_key,
        ))
    } else {
        let application = keystore
            .application(&ctx.application_identity)
            .ok_or(MessageError::UnknownApplication)?;
        Ok(SecurityMaterials::App(
            AppNonce::from_parts(src, ctx.dst, seq, iv_index),
            application.app_key,
        ))
    }
}

/// Materials for opening an inbound payload: the nonce is rebuilt from the
/// sender's addressing, not ours.
fn inbound_materials(
    keystore: &dyn KeyStore,
    ctx: &SoftContext,
    upper: &IncomingUpperPdu,
) -> Result<SecurityMaterials, MessageError> {
    if ctx.is_device_key {
        let device = keystore
            .device(&ctx.node_identity)
            .ok_or(MessageError::UnknownDevice)?;
        Ok(SecurityMaterials::Device(
            DeviceNonce::from_parts(upper.src, upper.dst, upper.seq, upper.iv_index),
            device.device_key,
        ))
    } else {
        let application = keystore
            .application(&ctx.application_identity)
            .ok_or(MessageError::UnknownApplication)?;
        Ok(SecurityMaterials::App(
            AppNonce::from_parts(upper.src, upper.dst, upper.seq, upper.iv_index),
            application.app_key,
        ))
    }
}

impl Stack {
    /// Sends `opcode || params` to `ctx.dst`. Never raises across this
    /// boundary: failures come back as `false` with the reason logged.
    pub async fn send_message(&mut self, opcode: &[u8], params: &[u8], ctx: &SoftContext) -> bool {
        match self.try_send_message(opcode, params, ctx).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("send_message to {:?} failed: {}", ctx.dst, err);
                false
            }
        }
    }
    async fn try_send_message(
        &mut self,
        opcode: &[u8],
        params: &[u8],
        ctx: &SoftContext,
    ) -> Result<(), MessageError> {
        access::check_parameters(opcode, params)?;
        let src = ctx.src_unicast().ok_or(MessageError::SrcAddress)?;
        if !ctx.dst.is_assigned() {
            return Err(MessageError::DstAddress);
        }
        let credential = self
            .keystore()
            .network(&ctx.network_identity)
            .ok_or(MessageError::UnknownNetwork)?;
        // The first sequence number both seals the payload and rides in the
        // first network PDU; later segments draw fresh ones.
        let first_seq = self.keystore().next_seq(&ctx.node_identity)?;
        let sm = outbound_materials(self.keystore(), ctx, src, first_seq, credential.iv_index)?;

        let mut access_pdu = Vec::with_capacity(opcode.len() + params.len());
        access_pdu.extend_from_slice(opcode);
        access_pdu.extend_from_slice(params);
        let cipher = AppPayload(access_pdu).encrypt(&sm, MicSize::Small).to_bytes();

        let (bearer_tx, net_rx, keystore, ttl) = self.parts();
        let tx = NetworkTx {
            bearer_tx,
            keystore,
            credential,
            node_identity: ctx.node_identity.as_str(),
            src,
            ttl,
        };
        let mut hard = HardContext::default();
        segments::send_upper(&tx, net_rx, ctx, &mut hard, first_seq, cipher, &sm).await?;
        Ok(())
    }

    /// Waits up to `timeout` for a message addressed per `ctx` whose leading
    /// bytes match `opcode`; returns its parameters. Reassembly of any one
    /// segmented message is separately bounded by `ctx.segment_timeout`.
    pub async fn recv_message(
        &mut self,
        opcode: &[u8],
        ctx: &SoftContext,
        timeout: Duration,
    ) -> Option<Vec<u8>> {
        match self.try_recv_message(opcode, ctx, timeout).await {
            Ok(params) => Some(params),
            Err(err) => {
                log::debug!("recv_message({:02x?}): {}", opcode, err);
                None
            }
        }
    }
    async fn try_recv_message(
        &mut self,
        opcode: &[u8],
        ctx: &SoftContext,
        timeout: Duration,
    ) -> Result<Vec<u8>, MessageError> {
        access::check_opcode(opcode)?;
        let src = ctx.src_unicast().ok_or(MessageError::SrcAddress)?;
        let credential = self
            .keystore()
            .network(&ctx.network_identity)
            .ok_or(MessageError::UnknownNetwork)?;
        let deadline = Instant::now() + timeout;
        let (bearer_tx, net_rx, keystore, ttl) = self.parts();
        let tx = NetworkTx {
            bearer_tx,
            keystore,
            credential,
            node_identity: ctx.node_identity.as_str(),
            src,
            ttl,
        };
        loop {
            let upper = segments::recv_upper(&tx, net_rx, ctx, deadline).await?;
            if upper.akf == ctx.is_device_key {
                log::trace!("AKF mismatch from {:?}, skipping", upper.src);
                continue;
            }
            let sm = inbound_materials(tx.keystore, ctx, &upper)?;
            let encrypted = match EncryptedAppPayload::from_bytes(&upper.cipher, MicSize::Small) {
                Some(encrypted) => encrypted,
                None => continue,
            };
            let payload = match encrypted.decrypt(&sm) {
                Ok(AppPayload(payload)) => payload,
                // Transport MIC mismatch: silently dropped, keep waiting.
                Err(_) => continue,
            };
            if payload.len() >= opcode.len() && &payload[..opcode.len()] == opcode {
                return Ok(payload[opcode.len()..].to_vec());
            }
            log::trace!("opcode mismatch ({:02x?}), still waiting", &payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::bearer::loopback_pair;
    use crate::crypto::key::{AppKey, DevKey, NetKey};
    use crate::crypto::materials::{
        ApplicationCredential, DeviceCredential, NetworkCredential,
    };
    use crate::device_state::MemoryKeyStore;
    use crate::mesh::{IVIndex, KeyIndex};
    use std::sync::Arc;

    fn store(node: &str) -> Arc<MemoryKeyStore> {
        let store = MemoryKeyStore::new();
        store.insert_network(
            "net",
            NetworkCredential::new(
                NetKey::from_hex("7dd7364cd842ad18c17c2b820c84c3d6").unwrap(),
                KeyIndex::new(0),
                IVIndex(0x1234_5678),
            ),
        );
        store.insert_application(
            "app",
            ApplicationCredential::new(
                AppKey::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap(),
                KeyIndex::new(0),
            ),
        );
        store.insert_device(
            node,
            DeviceCredential::new(
                DevKey::from_hex("9d6dd0e96eb25dc19a40ed9914f8f03f").unwrap(),
            ),
        );
        Arc::new(store)
    }

    fn context(src: u16, dst: u16, node: &str, device_key: bool) -> SoftContext {
        SoftContext {
            src: Address::from(src),
            dst: Address::from(dst),
            node_identity: node.to_owned(),
            network_identity: "net".to_owned(),
            application_identity: "app".to_owned(),
            is_device_key: device_key,
            ack_timeout: Duration::from_secs(2),
            segment_timeout: Duration::from_secs(2),
        }
    }

    fn stack_pair() -> (Stack, Stack) {
        let (bearer_a, bearer_b) = loopback_pair(64);
        (
            Stack::new(bearer_a, store("alice")),
            Stack::new(bearer_b, store("bob")),
        )
    }

    #[tokio::test]
    async fn unsegmented_round_trip() {
        let (mut alice, mut bob) = stack_pair();
        let bob_ctx = context(0x0002, 0x0001, "bob", false);
        let receiver = tokio::spawn(async move {
            bob.recv_message(&[0x0A], &bob_ctx, Duration::from_secs(5))
                .await
        });
        let alice_ctx = context(0x0001, 0x0002, "alice", false);
        assert!(alice.send_message(&[0x0A], b"on", &alice_ctx).await);
        assert_eq!(receiver.await.unwrap(), Some(b"on".to_vec()));
    }

    #[tokio::test]
    async fn segmented_round_trip_with_block_ack() {
        let (mut alice, mut bob) = stack_pair();
        let bob_ctx = context(0x0002, 0x0001, "bob", false);
        let receiver = tokio::spawn(async move {
            bob.recv_message(&[0x80, 0x10], &bob_ctx, Duration::from_secs(5))
                .await
        });
        let alice_ctx = context(0x0001, 0x0002, "alice", false);
        let params: Vec<u8> = (0..150_u8).collect();
        // `true` here means the peer block-acked every segment.
        assert!(
            alice
                .send_message(&[0x80, 0x10], &params, &alice_ctx)
                .await
        );
        assert_eq!(receiver.await.unwrap(), Some(params));
    }

    #[tokio::test]
    async fn device_key_round_trip() {
        let (mut alice, mut bob) = stack_pair();
        let bob_ctx = context(0x0002, 0x0001, "bob", true);
        let receiver = tokio::spawn(async move {
            bob.recv_message(&[0x02], &bob_ctx, Duration::from_secs(5))
                .await
        });
        let alice_ctx = context(0x0001, 0x0002, "alice", true);
        assert!(alice.send_message(&[0x02], b"\x01\x02", &alice_ctx).await);
        assert_eq!(receiver.await.unwrap(), Some(vec![0x01, 0x02]));
    }

    #[tokio::test(start_paused = true)]
    async fn segmented_send_times_out_without_receiver() {
        let (mut alice, _bob) = stack_pair();
        let alice_ctx = context(0x0001, 0x0002, "alice", false);
        let params = [0x55_u8; 64];
        assert!(!alice.send_message(&[0x0A], &params, &alice_ctx).await);
    }

    #[tokio::test(start_paused = true)]
    async fn recv_filters_by_opcode() {
        let (mut alice, mut bob) = stack_pair();
        let bob_ctx = context(0x0002, 0x0001, "bob", false);
        let receiver = tokio::spawn(async move {
            bob.recv_message(&[0x0B], &bob_ctx, Duration::from_secs(3))
                .await
        });
        let alice_ctx = context(0x0001, 0x0002, "alice", false);
        assert!(alice.send_message(&[0x0A], b"nope", &alice_ctx).await);
        // Wrong opcode never surfaces; the wait expires empty.
        assert_eq!(receiver.await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_bad_addresses() {
        let (mut alice, _bob) = stack_pair();
        let mut ctx = context(0x0001, 0x0002, "alice", false);
        ctx.src = Address::from(0xC000_u16);
        assert!(!alice.send_message(&[0x0A], b"x", &ctx).await);
        let mut ctx = context(0x0001, 0x0002, "alice", false);
        ctx.dst = Address::Unassigned;
        assert!(!alice.send_message(&[0x0A], b"x", &ctx).await);
        // Reserved single-octet opcode.
        let ctx = context(0x0001, 0x0002, "alice", false);
        assert!(!alice.send_message(&[0x7F], b"x", &ctx).await);
    }
}
