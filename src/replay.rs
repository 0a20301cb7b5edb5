//! Replay protection. One entry per source element: the highest sequence
//! number accepted under a given IV index. A decoded PDU is accepted only if
//! its sequence number is strictly greater than the recorded one (or the IV
//! index moved forward), so a captured PDU can never be accepted twice.
use crate::address::UnicastAddress;
use crate::mesh::{IVIndex, SequenceNumber};
use std::collections::BTreeMap;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
struct Entry {
    iv_index: IVIndex,
    seq: SequenceNumber,
}

#[derive(Default, Debug)]
pub struct Cache {
    entries: BTreeMap<UnicastAddress, Entry>,
}
impl Cache {
    #[must_use]
    pub fn new() -> Cache {
        Cache::default()
    }
    /// Checks a freshly decoded PDU against the cache and records it when
    /// accepted. Returns `false` for replays (drop the PDU).
    pub fn replay_check(
        &mut self,
        src: UnicastAddress,
        seq: SequenceNumber,
        iv_index: IVIndex,
    ) -> bool {
        match self.entries.get_mut(&src) {
            None => {
                self.entries.insert(src, Entry { iv_index, seq });
                true
            }
            Some(entry) => {
                if iv_index > entry.iv_index || (iv_index == entry.iv_index && seq > entry.seq) {
                    *entry = Entry { iv_index, seq };
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_replays_and_stale_seqs() {
        let mut cache = Cache::new();
        let src = UnicastAddress::new(0x1201);
        let iv = IVIndex(5);
        assert!(cache.replay_check(src, SequenceNumber::new(10), iv));
        assert!(!cache.replay_check(src, SequenceNumber::new(10), iv));
        assert!(!cache.replay_check(src, SequenceNumber::new(9), iv));
        assert!(cache.replay_check(src, SequenceNumber::new(11), iv));
        // New IV index resets the sequence space.
        assert!(cache.replay_check(src, SequenceNumber::new(0), IVIndex(6)));
        assert!(!cache.replay_check(src, SequenceNumber::new(0), IVIndex(5)));
    }

    #[test]
    fn sources_are_independent(){
        let mut cache = Cache::new();
        let iv = IVIndex(0);
        assert!(cache.replay_check(UnicastAddress::new(1), SequenceNumber::new(7), iv));
        assert!(cache.replay_check(UnicastAddress::new(2), SequenceNumber::new(7), iv));
    }
}
