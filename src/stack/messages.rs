//! Per-message context objects and the decoded-PDU shapes flowing between
//! the stack layers.
use crate::address::{Address, UnicastAddress};
use crate::lower;
use crate::lower::{SegN, SegO, SeqZero, SZMIC};
use crate::mesh::{IVIndex, SequenceNumber, CTL, TTL};
use core::time::Duration;

/// Caller-supplied, immutable for the duration of one send or receive call.
/// `node_identity` names the local element's key-store record (its sequence
/// counter and, for device-key traffic, the device key shared with the
/// peer); `network_identity`/`application_identity` select the credentials
/// sealing the message.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SoftContext {
    pub src: Address,
    pub dst: Address,
    pub node_identity: String,
    pub network_identity: String,
    pub application_identity: String,
    pub is_device_key: bool,
    /// Budget for the whole block-ack wait of one segmented send.
    pub ack_timeout: Duration,
    /// Budget for collecting all segments of one inbound message.
    pub segment_timeout: Duration,
}
impl SoftContext {
    /// The local element address. Callers must put a unicast address in
    /// `src`; this is checked at the access layer before anything is sent.
    pub(crate) fn src_unicast(&self) -> Option<UnicastAddress> {
        self.src.unicast()
    }
}

/// Transport-layer running state, reset at the start of each send and
/// mutated as segmentation advances. Mostly interesting in logs.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct HardContext {
    pub seq: Option<SequenceNumber>,
    pub ttl: Option<TTL>,
    pub ctl: Option<CTL>,
    pub seq_zero: Option<SeqZero>,
    pub seg_o: Option<SegO>,
    pub seg_n: Option<SegN>,
    pub szmic: SZMIC,
}
impl HardContext {
    pub fn reset(&mut self) {
        *self = HardContext::default();
    }
}

/// A network PDU that survived decryption and the replay check, with its
/// transport payload parsed.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IncomingLowerPdu {
    pub src: UnicastAddress,
    pub dst: Address,
    pub seq: SequenceNumber,
    pub iv_index: IVIndex,
    pub ttl: TTL,
    pub pdu: lower::PDU,
}

/// A fully reassembled (still encrypted) upper-transport payload.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IncomingUpperPdu {
    pub cipher: Vec<u8>,
    pub akf: bool,
    pub src: UnicastAddress,
    pub dst: Address,
    /// Sequence number the sender sealed the payload under (the first
    /// segment's, for segmented messages).
    pub seq: SequenceNumber,
    pub iv_index: IVIndex,
}
