//! The message stack: a demultiplexing receive task feeding decoded network
//! PDUs to per-call transport drivers over bounded channels. One producer and
//! one consumer per channel; every wait carries a timeout.
use crate::bearer::{Bearer, BearerPdu, PduType};
use crate::device_state::KeyStore;
use crate::lower;
use crate::mesh::TTL;
use crate::net;
use crate::replay;
use crate::stack::messages::IncomingLowerPdu;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod element;
pub mod messages;
pub mod segments;

pub use segments::{RecvError, SendError, ACK_EVERY_SEGMENTS};

pub const DEFAULT_TTL: TTL = TTL::from_masked_u8(10);
const CHANNEL_CAPACITY: usize = 32;

pub struct Stack {
    keystore: Arc<dyn KeyStore>,
    bearer_tx: mpsc::Sender<BearerPdu>,
    net_rx: mpsc::Receiver<IncomingLowerPdu>,
    ttl: TTL,
    demux: JoinHandle<()>,
}
impl Stack {
    /// Must be called within a tokio runtime; spawns the receive loop.
    #[must_use]
    pub fn new(bearer: Bearer, keystore: Arc<dyn KeyStore>) -> Stack {
        let (bearer_tx, bearer_rx) = bearer.split();
        let (net_tx, net_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let demux = tokio::spawn(demux_loop(bearer_rx, keystore.clone(), net_tx));
        Stack {
            keystore,
            bearer_tx,
            net_rx,
            ttl: DEFAULT_TTL,
            demux,
        }
    }
    pub fn set_ttl(&mut self, ttl: TTL) {
        self.ttl = ttl;
    }
    #[must_use]
    pub fn ttl(&self) -> TTL {
        self.ttl
    }
    pub(crate) fn keystore(&self) -> &dyn KeyStore {
        &*self.keystore
    }
    pub(crate) fn parts(
        &mut self,
    ) -> (
        &mpsc::Sender<BearerPdu>,
        &mut mpsc::Receiver<IncomingLowerPdu>,
        &dyn KeyStore,
        TTL,
    ) {
        (&self.bearer_tx, &mut self.net_rx, &*self.keystore, self.ttl)
    }
}
impl Drop for Stack {
    fn drop(&mut self) {
        self.demux.abort();
    }
}

/// Network receive loop: decrypt (NID scan), replay-check, parse the lower
/// transport PDU and hand it to whoever is running a send/receive call.
/// Undecryptable and replayed PDUs vanish without a trace on purpose.
async fn demux_loop(
    mut bearer_rx: mpsc::Receiver<BearerPdu>,
    keystore: Arc<dyn KeyStore>,
    net_tx: mpsc::Sender<IncomingLowerPdu>,
) {
    let mut replay = replay::Cache::new();
    while let Some(frame) = bearer_rx.recv().await {
        match frame.pdu_type {
            PduType::Network => {
                let encrypted = match net::EncryptedPDU::new(&frame.bytes) {
                    Some(pdu) => pdu,
                    None => {
                        log::trace!("undersized network frame ({} bytes)", frame.bytes.len());
                        continue;
                    }
                };
                let credentials = keystore.networks();
                let decoded = match encrypted.decrypt(&credentials) {
                    Some(decoded) => decoded,
                    None => continue,
                };
                let header = decoded.pdu.header;
                if !replay.replay_check(header.src, header.seq, decoded.iv_index) {
                    log::debug!("dropping replayed PDU from {:?}", header.src);
                    continue;
                }
                let pdu = match lower::PDU::from_bytes(&decoded.pdu.transport_pdu, header.ctl.0) {
                    Ok(pdu) => pdu,
                    Err(err) => {
                        log::trace!("unparseable transport PDU: {}", err);
                        continue;
                    }
                };
                let incoming = IncomingLowerPdu {
                    src: header.src,
                    dst: header.dst,
                    seq: header.seq,
                    iv_index: decoded.iv_index,
                    ttl: header.ttl,
                    pdu,
                };
                if net_tx.send(incoming).await.is_err() {
                    break;
                }
            }
            PduType::Provisioning => {
                // Provisioning runs over its own bearer connection.
                log::trace!("provisioning frame on the message stack, dropping");
            }
        }
    }
}
