//! Segmented-transport send and receive drivers: the block-ack/retry loop on
//! the way out, the segment collector with ack emission on the way in.
use crate::address::{Address, UnicastAddress};
use crate::bearer::{BearerPdu, PduType};
use crate::crypto::materials::NetworkCredential;
use crate::device_state::{AllocError, KeyStore};
use crate::lower;
use crate::lower::{BlockAck, SegmentAckPDU, SeqZero, SZMIC, MAX_UNSEGMENTED_LEN};
use crate::mesh::{SequenceNumber, CTL, TTL};
use crate::net;
use crate::reassembler::SegmentTable;
use crate::segmenter::Segmenter;
use crate::stack::messages::{HardContext, IncomingLowerPdu, IncomingUpperPdu, SoftContext};
use crate::upper::SecurityMaterials;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// The collector acknowledges after every this many accepted segments, plus
/// once at completion.
pub const ACK_EVERY_SEGMENTS: usize = 10;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum SendError {
    #[error("block acknowledgment incomplete within the ack budget")]
    AckTimeout,
    #[error("bearer closed")]
    BearerClosed,
    #[error("incoming channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum RecvError {
    #[error("no matching message before the deadline")]
    Timeout,
    #[error("incoming channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("bearer closed")]
    BearerClosed,
}
impl From<SendError> for RecvError {
    fn from(err: SendError) -> RecvError {
        match err {
            SendError::Alloc(alloc) => RecvError::Alloc(alloc),
            SendError::ChannelClosed => RecvError::ChannelClosed,
            SendError::AckTimeout | SendError::BearerClosed => RecvError::BearerClosed,
        }
    }
}

/// Everything needed to seal lower-transport payloads into network PDUs for
/// one send/receive call.
pub(crate) struct NetworkTx<'a> {
    pub bearer_tx: &'a mpsc::Sender<BearerPdu>,
    pub keystore: &'a dyn KeyStore,
    pub credential: NetworkCredential,
    pub node_identity: &'a str,
    pub src: UnicastAddress,
    pub ttl: TTL,
}
impl NetworkTx<'_> {
    fn next_seq(&self) -> Result<SequenceNumber, AllocError> {
        self.keystore.next_seq(self.node_identity)
    }
    async fn send_lower(
        &self,
        dst: Address,
        ctl: CTL,
        seq: SequenceNumber,
        transport_pdu: Vec<u8>,
    ) -> Result<(), SendError> {
        let pdu = net::PDU {
            header: net::Header {
                ivi: self.credential.iv_index.ivi(),
                nid: self.credential.network_keys().nid(),
                ctl,
                ttl: self.ttl,
                seq,
                src: self.src,
                dst,
            },
            transport_pdu,
        };
        let encrypted = pdu.encrypt(&self.credential);
        self.bearer_tx
            .send(BearerPdu {
                pdu_type: PduType::Network,
                bytes: encrypted.as_ref().to_vec(),
            })
            .await
            .or(Err(SendError::BearerClosed))
    }
    async fn send_ack(
        &self,
        dst: UnicastAddress,
        seq_zero: SeqZero,
        block_ack: BlockAck,
    ) -> Result<(), SendError> {
        let ack = SegmentAckPDU {
            obo: false,
            seq_zero,
            block_ack,
        };
        let seq = self.next_seq()?;
        self.send_lower(Address::Unicast(dst), CTL(true), seq, ack.to_bytes())
            .await
    }
}

async fn recv_until(
    net_rx: &mut mpsc::Receiver<IncomingLowerPdu>,
    deadline: Instant,
) -> Result<IncomingLowerPdu, RecvError> {
    if Instant::now() >= deadline {
        return Err(RecvError::Timeout);
    }
    match tokio::time::timeout_at(deadline, net_rx.recv()).await {
        Ok(Some(pdu)) => Ok(pdu),
        Ok(None) => Err(RecvError::ChannelClosed),
        Err(_) => Err(RecvError::Timeout),
    }
}

/// `dst == ctx.src` and `src == ctx.dst` (or `src` a member of the group
/// `ctx.dst`): the inbound acceptance rule shared by send (acks) and receive.
fn addressed_to_context(
    keystore: &dyn KeyStore,
    ctx: &SoftContext,
    src: UnicastAddress,
    dst: Address,
) -> bool {
    if dst != ctx.src {
        return false;
    }
    if Address::Unicast(src) == ctx.dst {
        return true;
    }
    match ctx.dst.group() {
        Some(group) => keystore.group_members(group).contains(&src),
        None => false,
    }
}

/// Sends one encrypted access payload, unsegmented when it fits, otherwise
/// segmenting and driving the block-ack/retry protocol until every segment
/// is acknowledged or `ctx.ack_timeout` runs out.
pub(crate) async fn send_upper(
    tx: &NetworkTx<'_>,
    net_rx: &mut mpsc::Receiver<IncomingLowerPdu>,
    ctx: &SoftContext,
    hard: &mut HardContext,
    first_seq: SequenceNumber,
    cipher: Vec<u8>,
    sm: &SecurityMaterials,
) -> Result<(), SendError> {
    hard.reset();
    hard.seq = Some(first_seq);
    hard.ttl = Some(tx.ttl);
    hard.ctl = Some(CTL(false));
    if cipher.len() <= MAX_UNSEGMENTED_LEN {
        let pdu = lower::UnsegmentedAccessPDU::new(sm.akf(), sm.aid(), &cipher);
        return tx
            .send_lower(ctx.dst, CTL(false), first_seq, pdu.to_bytes())
            .await;
    }

    let seq_zero = SeqZero::from_seq(first_seq);
    let segmenter = Segmenter::new(cipher, sm.akf(), sm.aid(), SZMIC(false), seq_zero);
    hard.seq_zero = Some(seq_zero);
    hard.seg_n = Some(segmenter.seg_n());
    let mut acked = BlockAck::default();

    let mut first = true;
    for segment in segmenter.unacked_segments(acked) {
        let seq = if first {
            first = false;
            first_seq
        } else {
            tx.next_seq()?
        };
        hard.seq = Some(seq);
        hard.seg_o = Some(segment.header.seg_o);
        tx.send_lower(ctx.dst, CTL(false), seq, segment.to_bytes())
            .await?;
    }

    let deadline = Instant::now() + ctx.ack_timeout;
    loop {
        let incoming = match recv_until(net_rx, deadline).await {
            Ok(pdu) => pdu,
            Err(RecvError::Timeout) => return Err(SendError::AckTimeout),
            Err(_) => return Err(SendError::ChannelClosed),
        };
        if !addressed_to_context(tx.keystore, ctx, incoming.src, incoming.dst) {
            log::trace!("dropping PDU from {:?} during segmented send", incoming.src);
            continue;
        }
        match incoming.pdu {
            lower::PDU::SegmentAck(ack) if ack.seq_zero == seq_zero => {
                let valid_bits = ((1_u64 << segmenter.seg_count()) - 1) as u32;
                acked = BlockAck((acked.0 | ack.block_ack.0) & valid_bits);
                if acked.all_acked(segmenter.seg_n()) {
                    return Ok(());
                }
                log::debug!(
                    "partial block ack {:#x}, retransmitting missing segments",
                    acked.0
                );
                for segment in segmenter.unacked_segments(acked) {
                    let seq = tx.next_seq()?;
                    hard.seq = Some(seq);
                    hard.seg_o = Some(segment.header.seg_o);
                    tx.send_lower(ctx.dst, CTL(false), seq, segment.to_bytes())
                        .await?;
                }
            }
            other => log::trace!("ignoring {:?} while awaiting block ack", other),
        }
    }
}

/// Waits for the next access payload addressed to `ctx`, reassembling
/// segments as needed. Each partial assembly is bounded by
/// `ctx.segment_timeout`; the whole wait by `deadline`. A timed-out partial
/// assembly is discarded and the wait continues.
pub(crate) async fn recv_upper(
    tx: &NetworkTx<'_>,
    net_rx: &mut mpsc::Receiver<IncomingLowerPdu>,
    ctx: &SoftContext,
    deadline: Instant,
) -> Result<IncomingUpperPdu, RecvError> {
    'messages: loop {
        let incoming = recv_until(net_rx, deadline).await?;
        if !addressed_to_context(tx.keystore, ctx, incoming.src, incoming.dst) {
            continue;
        }
        let first = match incoming.pdu {
            lower::PDU::UnsegmentedAccess(unsegmented) => {
                return Ok(IncomingUpperPdu {
                    cipher: unsegmented.data().to_vec(),
                    akf: unsegmented.akf.0,
                    src: incoming.src,
                    dst: incoming.dst,
                    seq: incoming.seq,
                    iv_index: incoming.iv_index,
                });
            }
            lower::PDU::SegmentAck(_) => continue,
            lower::PDU::SegmentedAccess(segmented) => segmented,
        };

        let peer = incoming.src;
        let akf = first.akf.0;
        let observed_seq = incoming.seq;
        let mut table = SegmentTable::new(&first);
        let mut accepted = 1_usize;
        let assembly_deadline = deadline.min(Instant::now() + ctx.segment_timeout);
        loop {
            if table.is_ready() {
                let seq_zero = table.seq_zero();
                tx.send_ack(peer, seq_zero, table.block_ack()).await.ok();
                let cipher = table.finish().expect("table is ready");
                return Ok(IncomingUpperPdu {
                    cipher,
                    akf,
                    src: peer,
                    dst: incoming.dst,
                    seq: seq_zero.seq_auth(observed_seq),
                    iv_index: incoming.iv_index,
                });
            }
            let next = match recv_until(net_rx, assembly_deadline).await {
                Ok(pdu) => pdu,
                Err(RecvError::Timeout) if Instant::now() < deadline => {
                    log::debug!(
                        "segment collection from {:?} timed out with {}/{} segments",
                        peer,
                        table.seg_count(),
                        table.seg_n().seg_count(),
                    );
                    continue 'messages;
                }
                Err(err) => return Err(err),
            };
            if next.src != peer
                || !addressed_to_context(tx.keystore, ctx, next.src, next.dst)
            {
                continue;
            }
            match next.pdu {
                lower::PDU::SegmentedAccess(segment) => match table.insert(&segment) {
                    Ok(()) => {
                        accepted += 1;
                        if accepted % ACK_EVERY_SEGMENTS == 0 {
                            tx.send_ack(peer, table.seq_zero(), table.block_ack())
                                .await?;
                        }
                    }
                    Err(err) => {
                        log::trace!("dropping segment from {:?}: {:?}", peer, err);
                    }
                },
                // Control traffic never joins a segment table.
                other => log::trace!("ignoring {:?} during reassembly", other),
            }
        }
    }
}
