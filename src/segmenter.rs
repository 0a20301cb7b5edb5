//! Splits one encrypted access payload into segmented lower-transport PDUs.
use crate::crypto::{AID, AKF};
use crate::lower::{
    BlockAck, SegN, SegO, SegmentHeader, SegmentedAccessPDU, SeqZero, MAX_SEGMENT_LEN, SZMIC,
};

pub struct Segmenter {
    cipher: Vec<u8>,
    akf: AKF,
    aid: AID,
    szmic: SZMIC,
    seq_zero: SeqZero,
    seg_n: SegN,
}
impl Segmenter {
    /// # Panics
    /// Panics if `cipher` is empty or needs more than 32 segments.
    #[must_use]
    pub fn new(cipher: Vec<u8>, akf: AKF, aid: AID, szmic: SZMIC, seq_zero: SeqZero) -> Segmenter {
        assert!(!cipher.is_empty(), "nothing to segment");
        let count = (cipher.len() + MAX_SEGMENT_LEN - 1) / MAX_SEGMENT_LEN;
        Segmenter {
            seg_n: SegN::new((count - 1) as u8),
            cipher,
            akf,
            aid,
            szmic,
            seq_zero,
        }
    }
    #[must_use]
    pub fn seg_n(&self) -> SegN {
        self.seg_n
    }
    #[must_use]
    pub fn seg_count(&self) -> usize {
        self.seg_n.seg_count()
    }
    #[must_use]
    pub fn segment_data(&self, seg_o: SegO) -> &[u8] {
        let start = usize::from(u8::from(seg_o)) * MAX_SEGMENT_LEN;
        let end = (start + MAX_SEGMENT_LEN).min(self.cipher.len());
        &self.cipher[start..end]
    }
    #[must_use]
    pub fn segment(&self, seg_o: SegO) -> SegmentedAccessPDU {
        SegmentedAccessPDU::new(
            self.akf,
            self.aid,
            SegmentHeader::new(self.szmic, self.seq_zero, seg_o, self.seg_n),
            self.segment_data(seg_o),
        )
    }
    /// Yields every segment not yet covered by `block_ack`, in order.
    pub fn unacked_segments(
        &self,
        block_ack: BlockAck,
    ) -> impl Iterator<Item = SegmentedAccessPDU> + '_ {
        (0..self.seg_count() as u8)
            .filter(move |&i| !block_ack.get(i))
            .map(move |i| self.segment(SegO::new(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter(len: usize) -> Segmenter {
        let cipher: Vec<u8> = (0..len).map(|i| i as u8).collect();
        Segmenter::new(cipher, AKF(true), AID::new(0x11), SZMIC(false), SeqZero::new(77))
    }

    #[test]
    fn seg_n_is_ceil_div_minus_one() {
        assert_eq!(u8::from(segmenter(1).seg_n()), 0);
        assert_eq!(u8::from(segmenter(12).seg_n()), 0);
        assert_eq!(u8::from(segmenter(13).seg_n()), 1);
        assert_eq!(u8::from(segmenter(24).seg_n()), 1);
        assert_eq!(u8::from(segmenter(25).seg_n()), 2);
    }

    #[test]
    fn segments_rejoin_exactly() {
        for len in [1_usize, 11, 12, 13, 24, 30, 100] {
            let segmenter = segmenter(len);
            let mut joined = Vec::new();
            for pdu in segmenter.unacked_segments(BlockAck::default()) {
                joined.extend_from_slice(pdu.data());
            }
            let expected: Vec<u8> = (0..len).map(|i| i as u8).collect();
            assert_eq!(joined, expected, "len {}", len);
        }
    }

    #[test]
    fn acked_segments_are_skipped() {
        let segmenter = segmenter(30); // 3 segments
        let mut ack = BlockAck::default();
        ack.set(0);
        ack.set(2);
        let remaining: Vec<u8> = segmenter
            .unacked_segments(ack)
            .map(|pdu| u8::from(pdu.header.seg_o))
            .collect();
        assert_eq!(remaining, vec![1]);
    }
}
