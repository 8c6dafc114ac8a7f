use parking_lot::Mutex;

use crate::common::FrameId;

use super::Replacer;

struct LruState {
    /// Unpin stamp per frame; None when the frame is not evictable.
    stamps: Vec<Option<u64>>,
    /// Next stamp to hand out (monotonically increasing)
    next_stamp: u64,
    /// Number of evictable frames
    num_evictable: usize,
}

/// Least-recently-unpinned replacement policy.
///
/// Each unpin stamps the frame with a strictly increasing counter and the
/// victim is the evictable frame with the smallest stamp, so the most
/// recently unpinned frame is evicted last. Stamps are unique, which makes
/// the order total. Unpinning a frame that is already evictable keeps its
/// original stamp. Victim selection is a linear scan over the frames.
pub struct LruReplacer {
    inner: Mutex<LruState>,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(LruState {
                stamps: vec![None; num_frames],
                next_stamp: 0,
                num_evictable: 0,
            }),
        }
    }

    /// Returns the number of frames the replacer tracks.
    pub fn capacity(&self) -> usize {
        self.inner.lock().stamps.len()
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.num_evictable == 0 {
            return None;
        }

        let (index, _) = inner
            .stamps
            .iter()
            .enumerate()
            .filter_map(|(i, stamp)| stamp.map(|s| (i, s)))
            .min_by_key(|&(_, stamp)| stamp)?;

        inner.stamps[index] = None;
        inner.num_evictable -= 1;
        Some(FrameId::new(index as u32))
    }

    fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.stamps.get_mut(frame_id.as_usize()) else {
            return;
        };
        if slot.take().is_some() {
            inner.num_evictable -= 1;
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        let stamp = inner.next_stamp;
        let Some(slot) = inner.stamps.get_mut(frame_id.as_usize()) else {
            return;
        };
        if slot.is_none() {
            *slot = Some(stamp);
            inner.next_stamp += 1;
            inner.num_evictable += 1;
        }
    }

    fn size(&self) -> usize {
        self.inner.lock().num_evictable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_evict_empty() {
        let replacer = LruReplacer::new(4);
        assert_eq!(replacer.capacity(), 4);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_basic_order() {
        let replacer = LruReplacer::new(7);

        for i in [1, 2, 3, 4, 5, 6, 1] {
            replacer.unpin(FrameId::new(i));
        }
        assert_eq!(replacer.size(), 6);

        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(3)));

        replacer.pin(FrameId::new(3));
        replacer.pin(FrameId::new(4));
        assert_eq!(replacer.size(), 2);

        replacer.unpin(FrameId::new(4));
        assert_eq!(replacer.victim(), Some(FrameId::new(5)));
        assert_eq!(replacer.victim(), Some(FrameId::new(6)));
        assert_eq!(replacer.victim(), Some(FrameId::new(4)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_ignores_out_of_range() {
        let replacer = LruReplacer::new(2);
        replacer.unpin(FrameId::new(5));
        replacer.pin(FrameId::new(5));
        assert_eq!(replacer.size(), 0);
    }
}
