//! Transport-layer segment table. Collects segments keyed by SegO until all
//! of `0..=seg_n` arrived, then yields the joined ciphertext.
use crate::lower::{BlockAck, SegN, SegmentedAccessPDU, SeqZero, MAX_SEGMENT_LEN};

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum ReassembleError {
    /// Same SegO inserted twice while the table is open.
    SegmentRepeat,
    SegmentOutOfBounds,
    DataTooLong,
    /// Segment belongs to a different segmented message.
    SeqZeroMismatch,
}

pub struct SegmentTable {
    seq_zero: SeqZero,
    seg_n: SegN,
    block_ack: BlockAck,
    storage: Vec<u8>,
    last_seg_len: usize,
}
impl SegmentTable {
    /// Opens a table sized from the first segment seen (any SegO).
    #[must_use]
    pub fn new(first: &SegmentedAccessPDU) -> SegmentTable {
        let seg_n = first.header.seg_n;
        let mut table = SegmentTable {
            seq_zero: first.header.seq_zero,
            seg_n,
            block_ack: BlockAck::default(),
            storage: vec![0_u8; seg_n.seg_count() * MAX_SEGMENT_LEN],
            last_seg_len: MAX_SEGMENT_LEN,
        };
        table
            .insert(first)
            .expect("first segment always fits a fresh table");
        table
    }
    #[must_use]
    pub fn seq_zero(&self) -> SeqZero {
        self.seq_zero
    }
    #[must_use]
    pub fn seg_n(&self) -> SegN {
        self.seg_n
    }
    #[must_use]
    pub fn block_ack(&self) -> BlockAck {
        self.block_ack
    }
    /// Number of distinct segments accepted so far.
    #[must_use]
    pub fn seg_count(&self) -> usize {
        self.block_ack.seg_count()
    }
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.block_ack.all_acked(self.seg_n)
    }
    pub fn insert(&mut self, segment: &SegmentedAccessPDU) -> Result<(), ReassembleError> {
        if segment.header.seq_zero != self.seq_zero {
            return Err(ReassembleError::SeqZeroMismatch);
        }
        let seg_o = u8::from(segment.header.seg_o);
        if seg_o > u8::from(self.seg_n) {
            return Err(ReassembleError::SegmentOutOfBounds);
        }
        if self.block_ack.get(seg_o) {
            return Err(ReassembleError::SegmentRepeat);
        }
        let data = segment.data();
        let is_last = seg_o == u8::from(self.seg_n);
        if data.len() > MAX_SEGMENT_LEN || (!is_last && data.len() != MAX_SEGMENT_LEN) {
            return Err(ReassembleError::DataTooLong);
        }
        let pos = usize::from(seg_o) * MAX_SEGMENT_LEN;
        self.storage[pos..pos + data.len()].copy_from_slice(data);
        if is_last {
            self.last_seg_len = data.len();
        }
        self.block_ack.set(seg_o);
        Ok(())
    }
    /// The joined ciphertext, once every segment arrived.
    #[must_use]
    pub fn finish(mut self) -> Option<Vec<u8>> {
        if !self.is_ready() {
            return None;
        }
        let len = usize::from(u8::from(self.seg_n)) * MAX_SEGMENT_LEN + self.last_seg_len;
        self.storage.truncate(len);
        Some(self.storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AID, AKF};
    use crate::lower::{SegO, SegmentHeader, SZMIC};
    use crate::segmenter::Segmenter;

    fn segments(len: usize) -> Vec<SegmentedAccessPDU> {
        let cipher: Vec<u8> = (0..len).map(|i| (i * 3) as u8).collect();
        let segmenter = Segmenter::new(
            cipher,
            AKF(true),
            AID::new(0x2A),
            SZMIC(false),
            SeqZero::new(0x0123),
        );
        segmenter.unacked_segments(BlockAck::default()).collect()
    }

    #[test]
    fn out_of_order_reassembly() {
        let segs = segments(29);
        let mut table = SegmentTable::new(&segs[2]);
        table.insert(&segs[0]).unwrap();
        assert!(!table.is_ready());
        table.insert(&segs[1]).unwrap();
        assert!(table.is_ready());
        let expected: Vec<u8> = (0..29).map(|i| (i * 3) as u8).collect();
        assert_eq!(table.finish().unwrap(), expected);
    }

    #[test]
    fn duplicate_segment_rejected() {
        let segs = segments(20);
        let mut table = SegmentTable::new(&segs[0]);
        assert_eq!(
            table.insert(&segs[0]),
            Err(ReassembleError::SegmentRepeat)
        );
    }

    #[test]
    fn foreign_seq_zero_rejected() {
        let segs = segments(20);
        let mut table = SegmentTable::new(&segs[0]);
        let foreign = SegmentedAccessPDU::new(
            AKF(true),
            AID::new(0x2A),
            SegmentHeader::new(SZMIC(false), SeqZero::new(0x0124), SegO::new(1), SegN::new(1)),
            segs[1].data(),
        );
        assert_eq!(
            table.insert(&foreign),
            Err(ReassembleError::SeqZeroMismatch)
        );
    }

    #[test]
    fn single_segment_table() {
        let segs = segments(5);
        assert_eq!(segs.len(), 1);
        let table = SegmentTable::new(&segs[0]);
        assert!(table.is_ready());
        assert_eq!(table.finish().unwrap().len(), 5);
    }
}
