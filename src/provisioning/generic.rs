//! Generic provisioning framing: the transaction segmentation protocol that
//! carries handshake PDUs over the advertising bearer. Independent of the
//! transport layer; its own MTU, FCS and transaction numbering. PDUs of one
//! transaction should go out 20-50 milliseconds apart to dodge radio
//! collisions.
use super::bearer_control;
use crate::pack::PackError;

/// 6-bit segment number.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Default, Hash)]
pub struct SegmentIndex(u8);
const SEGMENT_INDEX_MAX: u8 = (1_u8 << 6) - 1;
impl SegmentIndex {
    pub const ZERO: SegmentIndex = SegmentIndex(0);
    /// # Panics
    /// Panics if `index` doesn't fit in 6 bits.
    #[must_use]
    pub fn new(index: u8) -> SegmentIndex {
        assert!(index <= SEGMENT_INDEX_MAX, "segment index overflow");
        SegmentIndex(index)
    }
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}
impl From<SegmentIndex> for u8 {
    fn from(index: SegmentIndex) -> u8 {
        index.0
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct FCS(pub u8);

/// FCS per 3GPP TS 27.010, polynomial x^8 + x^2 + x + 1.
const FCS_TABLE: [u8; 256] = [
    0x00, 0x91, 0xe3, 0x72, 0x07, 0x96, 0xe4, 0x75, 0x0e, 0x9f, 0xed, 0x7c, 0x09, 0x98, 0xea, 0x7b,
    0x1c, 0x8d, 0xff, 0x6e, 0x1b, 0x8a, 0xf8, 0x69, 0x12, 0x83, 0xf1, 0x60, 0x15, 0x84, 0xf6, 0x67,
    0x38, 0xa9, 0xdb, 0x4a, 0x3f, 0xae, 0xdc, 0x4d, 0x36, 0xa7, 0xd5, 0x44, 0x31, 0xa0, 0xd2, 0x43,
    0x24, 0xb5, 0xc7, 0x56, 0x23, 0xb2, 0xc0, 0x51, 0x2a, 0xbb, 0xc9, 0x58, 0x2d, 0xbc, 0xce, 0x5f,
    0x70, 0xe1, 0x93, 0x02, 0x77, 0xe6, 0x94, 0x05, 0x7e, 0xef, 0x9d, 0x0c, 0x79, 0xe8, 0x9a, 0x0b,
    0x6c, 0xfd, 0x8f, 0x1e, 0x6b, 0xfa, 0x88, 0x19, 0x62, 0xf3, 0x81, 0x10, 0x65, 0xf4, 0x86, 0x17,
    0x48, 0xd9, 0xab, 0x3a, 0x4f, 0xde, 0xac, 0x3d, 0x46, 0xd7, 0xa5, 0x34, 0x41, 0xd0, 0xa2, 0x33,
    0x54, 0xc5, 0xb7, 0x26, 0x53, 0xc2, 0xb0, 0x21, 0x5a, 0xcb, 0xb9, 0x28, 0x5d, 0xcc, 0xbe, 0x2f,
    0xe0, 0x71, 0x03, 0x92, 0xe7, 0x76, 0x04, 0x95, 0xee, 0x7f, 0x0d, 0x9c, 0xe9, 0x78, 0x0a, 0x9b,
    0xfc, 0x6d, 0x1f, 0x8e, 0xfb, 0x6a, 0x18, 0x89, 0xf2, 0x63, 0x11, 0x80, 0xf5, 0x64, 0x16, 0x87,
    0xd8, 0x49, 0x3b, 0xaa, 0xdf, 0x4e, 0x3c, 0xad, 0xd6, 0x47, 0x35, 0xa4, 0xd1, 0x40, 0x32, 0xa3,
    0xc4, 0x55, 0x27, 0xb6, 0xc3, 0x52, 0x20, 0xb1, 0xca, 0x5b, 0x29, 0xb8, 0xcd, 0x5c, 0x2e, 0xbf,
    0x90, 0x01, 0x73, 0xe2, 0x97, 0x06, 0x74, 0xe5, 0x9e, 0x0f, 0x7d, 0xec, 0x99, 0x08, 0x7a, 0xeb,
    0x8c, 0x1d, 0x6f, 0xfe, 0x8b, 0x1a, 0x68, 0xf9, 0x82, 0x13, 0x61, 0xf0, 0x85, 0x14, 0x66, 0xf7,
    0xa8, 0x39, 0x4b, 0xda, 0xaf, 0x3e, 0x4c, 0xdd, 0xa6, 0x37, 0x45, 0xd4, 0xa1, 0x30, 0x42, 0xd3,
    0xb4, 0x25, 0x57, 0xc6, 0xb3, 0x22, 0x50, 0xc1, 0xba, 0x2b, 0x59, 0xc8, 0xbd, 0x2c, 0x5e, 0xcf,
];

#[must_use]
pub fn fcs_calc(data: &[u8]) -> FCS {
    let mut fcs = 0xFF;
    for &b in data {
        fcs = FCS_TABLE[usize::from(fcs ^ b)];
    }
    FCS(0xFF - fcs)
}
#[must_use]
pub fn fcs_check(fcs: FCS, data: &[u8]) -> bool {
    let mut check = 0xFF;
    for &b in data {
        check = FCS_TABLE[usize::from(check ^ b)];
    }
    FCS_TABLE[usize::from(check ^ fcs.0)] == 0xCF
}

/// Generic Provisioning Control Format: the low two bits of the first byte.
#[repr(u8)]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum GPCF {
    TransactionStart = 0b00,
    TransactionAcknowledgment = 0b01,
    TransactionContinuation = 0b10,
    BearerControl = 0b11,
}
impl GPCF {
    #[must_use]
    pub const fn pack_with(self, six_bits: u8) -> u8 {
        ((six_bits & 0x3F) << 2) | (self as u8)
    }
    #[must_use]
    pub fn from_masked_u2(u2: u8) -> GPCF {
        match u2 & 0b11 {
            0b00 => GPCF::TransactionStart,
            0b01 => GPCF::TransactionAcknowledgment,
            0b10 => GPCF::TransactionContinuation,
            0b11 => GPCF::BearerControl,
            _ => unreachable!("only the above 4 GPCF exist"),
        }
    }
    /// Returns the GPCF and the upper six bits.
    #[must_use]
    pub fn unpack_with(byte: u8) -> (GPCF, u8) {
        (Self::from_masked_u2(byte), byte >> 2)
    }
}

/// Bearer MTU for one generic provisioning PDU (advertising payload room).
pub const PDU_MTU: usize = 24;
const START_PDU_HEADER_SIZE: usize = 4;
const CONTINUATION_PDU_HEADER_SIZE: usize = 1;
pub const MAX_START_DATA_LEN: usize = PDU_MTU - START_PDU_HEADER_SIZE;
pub const MAX_CONTINUATION_DATA_LEN: usize = PDU_MTU - CONTINUATION_PDU_HEADER_SIZE;
pub const MAX_TRANSACTION_LEN: usize =
    MAX_START_DATA_LEN + MAX_CONTINUATION_DATA_LEN * SEGMENT_INDEX_MAX as usize;

/// `SegN(6)<<2 | 0b00 || total_length(2) || FCS(1) || payload`.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub struct TransactionStartPDU {
    pub seg_n: SegmentIndex,
    pub total_length: u16,
    pub fcs: FCS,
}
impl TransactionStartPDU {
    pub const BYTE_LEN: usize = START_PDU_HEADER_SIZE;
    pub fn pack_into(self, buf: &mut [u8]) -> Result<(), PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        buf[0] = GPCF::TransactionStart.pack_with(self.seg_n.0);
        buf[1..3].copy_from_slice(&self.total_length.to_be_bytes());
        buf[3] = self.fcs.0;
        Ok(())
    }
    pub fn unpack_from(buf: &[u8]) -> Result<TransactionStartPDU, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        let (gpcf, seg_n) = GPCF::unpack_with(buf[0]);
        if gpcf != GPCF::TransactionStart {
            return Err(PackError::BadOpcode);
        }
        Ok(TransactionStartPDU {
            seg_n: SegmentIndex::new(seg_n),
            total_length: u16::from_be_bytes([buf[1], buf[2]]),
            fcs: FCS(buf[3]),
        })
    }
}

/// `SegIndex(6)<<2 | 0b10 || payload`.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub struct TransactionContinuationPDU {
    pub seg_index: SegmentIndex,
}
impl TransactionContinuationPDU {
    pub const BYTE_LEN: usize = CONTINUATION_PDU_HEADER_SIZE;
    #[must_use]
    pub fn as_u8(self) -> u8 {
        GPCF::TransactionContinuation.pack_with(self.seg_index.0)
    }
    pub fn unpack_from(buf: &[u8]) -> Result<TransactionContinuationPDU, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        let (gpcf, seg_index) = GPCF::unpack_with(buf[0]);
        if gpcf != GPCF::TransactionContinuation {
            return Err(PackError::BadOpcode);
        }
        Ok(TransactionContinuationPDU {
            seg_index: SegmentIndex::new(seg_index),
        })
    }
}

/// Single byte `0b01`, no payload.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Default)]
pub struct TransactionAcknowledgmentPDU {}
impl TransactionAcknowledgmentPDU {
    pub const BYTE_LEN: usize = 1;
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        GPCF::TransactionAcknowledgment as u8
    }
    pub fn unpack_from(buf: &[u8]) -> Result<TransactionAcknowledgmentPDU, PackError> {
        PackError::expect_length(Self::BYTE_LEN, buf)?;
        let (gpcf, padding) = GPCF::unpack_with(buf[0]);
        if gpcf != GPCF::TransactionAcknowledgment {
            return Err(PackError::BadOpcode);
        }
        // All padding values besides 0 are prohibited.
        if padding != 0 {
            return Err(PackError::InvalidFields);
        }
        Ok(TransactionAcknowledgmentPDU {})
    }
}

/// One parsed generic provisioning PDU.
#[derive(Clone, PartialOrd, PartialEq, Ord, Eq, Debug, Hash)]
pub enum PDU {
    TransactionStart(TransactionStartPDU, Vec<u8>),
    TransactionContinuation(TransactionContinuationPDU, Vec<u8>),
    TransactionAcknowledgment(TransactionAcknowledgmentPDU),
    BearerControl(bearer_control::PDU),
}
impl PDU {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PDU::TransactionStart(start, payload) => {
                let mut out = vec![0_u8; TransactionStartPDU::BYTE_LEN];
                start.pack_into(&mut out).expect("buffer sized above");
                out.extend_from_slice(payload);
                out
            }
            PDU::TransactionContinuation(cont, payload) => {
                let mut out = Vec::with_capacity(1 + payload.len());
                out.push(cont.as_u8());
                out.extend_from_slice(payload);
                out
            }
            PDU::TransactionAcknowledgment(ack) => vec![ack.as_u8()],
            PDU::BearerControl(control) => control.to_bytes(),
        }
    }
    pub fn unpack_from(buf: &[u8]) -> Result<PDU, PackError> {
        PackError::atleast_length(1, buf)?;
        match GPCF::from_masked_u2(buf[0]) {
            GPCF::TransactionStart => {
                PackError::atleast_length(TransactionStartPDU::BYTE_LEN, buf)?;
                let start = TransactionStartPDU::unpack_from(&buf[..TransactionStartPDU::BYTE_LEN])?;
                let payload = buf[TransactionStartPDU::BYTE_LEN..].to_vec();
                if payload.len() > MAX_START_DATA_LEN {
                    return Err(PackError::InvalidFields);
                }
                Ok(PDU::TransactionStart(start, payload))
            }
            GPCF::TransactionContinuation => {
                let cont = TransactionContinuationPDU::unpack_from(&buf[..1])?;
                let payload = buf[1..].to_vec();
                if payload.is_empty() || payload.len() > MAX_CONTINUATION_DATA_LEN {
                    return Err(PackError::InvalidFields);
                }
                Ok(PDU::TransactionContinuation(cont, payload))
            }
            GPCF::TransactionAcknowledgment => Ok(PDU::TransactionAcknowledgment(
                TransactionAcknowledgmentPDU::unpack_from(buf)?,
            )),
            GPCF::BearerControl => Ok(PDU::BearerControl(bearer_control::PDU::unpack_from(buf)?)),
        }
    }
}

/// Slices one transaction payload into Start + Continuation PDUs. Total
/// length and FCS cover the whole payload and are computed up front.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SegmentGenerator {
    data: Vec<u8>,
    fcs: FCS,
}
impl SegmentGenerator {
    /// # Panics
    /// Panics if `data` is empty or longer than [`MAX_TRANSACTION_LEN`].
    #[must_use]
    pub fn new(data: Vec<u8>) -> SegmentGenerator {
        assert!(
            !data.is_empty() && data.len() <= MAX_TRANSACTION_LEN,
            "bad transaction payload length {}",
            data.len()
        );
        SegmentGenerator {
            fcs: fcs_calc(&data),
            data,
        }
    }
    #[must_use]
    pub fn fcs(&self) -> FCS {
        self.fcs
    }
    #[must_use]
    pub fn total_length(&self) -> u16 {
        self.data.len() as u16
    }
    /// Highest segment index.
    #[must_use]
    pub fn seg_n(&self) -> SegmentIndex {
        let len = self.data.len();
        if len <= MAX_START_DATA_LEN {
            SegmentIndex::ZERO
        } else {
            let tail = len - MAX_START_DATA_LEN;
            SegmentIndex::new(
                ((tail + MAX_CONTINUATION_DATA_LEN - 1) / MAX_CONTINUATION_DATA_LEN) as u8,
            )
        }
    }
    #[must_use]
    pub fn segment_data(&self, index: SegmentIndex) -> Option<&[u8]> {
        if index > self.seg_n() {
            return None;
        }
        if index == SegmentIndex::ZERO {
            Some(&self.data[..self.data.len().min(MAX_START_DATA_LEN)])
        } else {
            let start =
                MAX_START_DATA_LEN + MAX_CONTINUATION_DATA_LEN * (usize::from(index.0) - 1);
            let end = (start + MAX_CONTINUATION_DATA_LEN).min(self.data.len());
            Some(&self.data[start..end])
        }
    }
    /// All PDUs of the transaction, in send order.
    #[must_use]
    pub fn pdus(&self) -> Vec<PDU> {
        let seg_n = self.seg_n();
        let mut out = Vec::with_capacity(usize::from(seg_n.0) + 1);
        out.push(PDU::TransactionStart(
            TransactionStartPDU {
                seg_n,
                total_length: self.total_length(),
                fcs: self.fcs,
            },
            self.segment_data(SegmentIndex::ZERO)
                .expect("segment zero always exists")
                .to_vec(),
        ));
        for i in 1..=seg_n.0 {
            let index = SegmentIndex::new(i);
            out.push(PDU::TransactionContinuation(
                TransactionContinuationPDU { seg_index: index },
                self.segment_data(index)
                    .expect("index bounded by seg_n")
                    .to_vec(),
            ));
        }
        out
    }
}

#[derive(Copy, PartialOrd, PartialEq, Ord, Eq, Hash, Debug, Clone)]
pub enum ReassembleError {
    NotFinished,
    SegmentOutOfBounds,
    SegmentRepeat,
    DataOverflow,
    LengthMismatch,
    FCSMismatch,
}

/// Rebuilds one transaction from Start + Continuation PDUs, any order.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Reassembler {
    data: Vec<u8>,
    fcs: FCS,
    seg_n: SegmentIndex,
    received: u64,
}
impl Reassembler {
    pub fn new(start: TransactionStartPDU, first_payload: &[u8]) -> Result<Reassembler, ReassembleError> {
        let total = usize::from(start.total_length);
        if total == 0 || total > MAX_TRANSACTION_LEN {
            return Err(ReassembleError::LengthMismatch);
        }
        let mut out = Reassembler {
            data: vec![0_u8; total],
            fcs: start.fcs,
            seg_n: start.seg_n,
            received: 0,
        };
        out.insert(SegmentIndex::ZERO, first_payload)?;
        Ok(out)
    }
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.received == (1_u64 << (u64::from(self.seg_n.0) + 1)) - 1
    }
    pub fn insert(
        &mut self,
        index: SegmentIndex,
        payload: &[u8],
    ) -> Result<(), ReassembleError> {
        if index > self.seg_n {
            return Err(ReassembleError::SegmentOutOfBounds);
        }
        if self.received & (1 << u64::from(index.0)) != 0 {
            return Err(ReassembleError::SegmentRepeat);
        }
        let pos = if index == SegmentIndex::ZERO {
            0
        } else {
            MAX_START_DATA_LEN + MAX_CONTINUATION_DATA_LEN * (usize::from(index.0) - 1)
        };
        let expected = if index == self.seg_n {
            // Final segment fills whatever remains of total_length.
            self.data.len().checked_sub(pos).filter(|&l| {
                l > 0
                    && l <= if index == SegmentIndex::ZERO {
                        MAX_START_DATA_LEN
                    } else {
                        MAX_CONTINUATION_DATA_LEN
                    }
            })
        } else if index == SegmentIndex::ZERO {
            Some(MAX_START_DATA_LEN)
        } else {
            Some(MAX_CONTINUATION_DATA_LEN)
        };
        let expected = expected.ok_or(ReassembleError::LengthMismatch)?;
        if payload.len() != expected {
            return Err(ReassembleError::DataOverflow);
        }
        // Total length and segment count can disagree on a corrupted start.
        if pos + expected > self.data.len() {
            return Err(ReassembleError::LengthMismatch);
        }
        self.data[pos..pos + expected].copy_from_slice(payload);
        self.received |= 1 << u64::from(index.0);
        Ok(())
    }
    /// Total-length and FCS check, then the payload.
    pub fn finish(self) -> Result<Vec<u8>, ReassembleError> {
        if !self.is_done() {
            return Err(ReassembleError::NotFinished);
        }
        if !fcs_check(self.fcs, &self.data) {
            return Err(ReassembleError::FCSMismatch);
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fcs_self_check() {
        for data in [&b"hello world"[..], b"\x00", b"\xff\xff\xff"] {
            let fcs = fcs_calc(data);
            assert!(fcs_check(fcs, data), "fcs failed for {:02x?}", data);
            assert!(!fcs_check(FCS(fcs.0 ^ 0x01), data));
        }
        let mut corrupted = b"hello world".to_vec();
        let fcs = fcs_calc(b"hello world");
        corrupted[3] ^= 0x40;
        assert!(!fcs_check(fcs, &corrupted));
    }

    #[test]
    fn gpcf_packing() {
        assert_eq!(GPCF::TransactionStart.pack_with(2), 0b0000_1000);
        assert_eq!(GPCF::TransactionContinuation.pack_with(3), 0b0000_1110);
        assert_eq!(GPCF::unpack_with(0b0000_1110), (GPCF::TransactionContinuation, 3));
    }

    #[test]
    fn single_segment_transaction() {
        let generator = SegmentGenerator::new(vec![1, 2, 3]);
        assert_eq!(generator.seg_n(), SegmentIndex::ZERO);
        let pdus = generator.pdus();
        assert_eq!(pdus.len(), 1);
        let bytes = pdus[0].to_bytes();
        // SegN=0/GPCF=00, length 3 big endian, FCS, then payload.
        assert_eq!(&bytes[..3], &[0x00, 0x00, 0x03]);
        assert_eq!(&bytes[4..], &[1, 2, 3]);
        match PDU::unpack_from(&bytes).unwrap() {
            PDU::TransactionStart(start, payload) => {
                let reassembler = Reassembler::new(start, &payload).unwrap();
                assert_eq!(reassembler.finish().unwrap(), vec![1, 2, 3]);
            }
            other => panic!("expected start PDU, got {:?}", other),
        }
    }

    #[test]
    fn multi_segment_round_trip() {
        // 20 + 23 + 7: three segments.
        let data: Vec<u8> = (0..50_u8).collect();
        let generator = SegmentGenerator::new(data.clone());
        assert_eq!(generator.seg_n(), SegmentIndex::new(2));
        let pdus = generator.pdus();
        assert_eq!(pdus.len(), 3);

        let mut reassembler: Option<Reassembler> = None;
        let mut continuations = Vec::new();
        for pdu in &pdus {
            match PDU::unpack_from(&pdu.to_bytes()).unwrap() {
                PDU::TransactionStart(start, payload) => {
                    assert!(reassembler.is_none());
                    reassembler = Some(Reassembler::new(start, &payload).unwrap());
                }
                PDU::TransactionContinuation(cont, payload) => {
                    continuations.push((cont, payload));
                }
                other => panic!("unexpected PDU {:?}", other),
            }
        }
        let mut reassembler = reassembler.unwrap();
        assert!(!reassembler.is_done());
        // Continuations land in reverse order; reassembly must not care.
        for (cont, payload) in continuations.into_iter().rev() {
            reassembler.insert(cont.seg_index, &payload).unwrap();
        }
        assert_eq!(reassembler.finish().unwrap(), data);
    }

    #[test]
    fn repeated_segment_rejected() {
        let data: Vec<u8> = (0..30_u8).collect();
        let pdus = SegmentGenerator::new(data).pdus();
        if let [PDU::TransactionStart(start, payload), PDU::TransactionContinuation(cont, cont_payload)] =
            &pdus[..]
        {
            let mut reassembler = Reassembler::new(*start, payload).unwrap();
            reassembler.insert(cont.seg_index, cont_payload).unwrap();
            assert_eq!(
                reassembler.insert(cont.seg_index, cont_payload),
                Err(ReassembleError::SegmentRepeat)
            );
        } else {
            panic!("expected start + one continuation");
        }
    }

    #[test]
    fn corrupted_payload_fails_fcs() {
        let data: Vec<u8> = (100..130_u8).collect();
        let pdus = SegmentGenerator::new(data).pdus();
        if let [PDU::TransactionStart(start, payload), PDU::TransactionContinuation(cont, cont_payload)] =
            &pdus[..]
        {
            let mut corrupted = cont_payload.clone();
            corrupted[0] ^= 0x80;
            let mut reassembler = Reassembler::new(*start, payload).unwrap();
            reassembler.insert(cont.seg_index, &corrupted).unwrap();
            assert_eq!(
                reassembler.finish(),
                Err(ReassembleError::FCSMismatch)
            );
        } else {
            panic!("expected start + one continuation");
        }
    }
}
