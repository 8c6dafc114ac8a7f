use parking_lot::Mutex;

use crate::common::FrameId;

use super::Replacer;

#[derive(Debug, Clone, Copy, Default)]
struct ClockSlot {
    /// Frame is evictable
    present: bool,
    /// Second-chance bit
    reference: bool,
}

struct ClockState {
    slots: Vec<ClockSlot>,
    hand: usize,
    num_evictable: usize,
}

/// Clock (second-chance) replacement policy.
///
/// Frames sit on a circular array of `(present, reference)` bits. Unpin
/// sets both bits. The hand sweeps forward clearing reference bits and
/// evicts the first present frame whose reference bit is already clear,
/// then moves past it.
pub struct ClockReplacer {
    inner: Mutex<ClockState>,
}

impl ClockReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(ClockState {
                slots: vec![ClockSlot::default(); num_frames],
                hand: 0,
                num_evictable: 0,
            }),
        }
    }

    /// Returns the number of frames the replacer tracks.
    pub fn capacity(&self) -> usize {
        self.inner.lock().slots.len()
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.num_evictable == 0 {
            return None;
        }

        let num_frames = inner.slots.len();
        // One sweep clears every reference bit, the second is sure to hit.
        for _ in 0..=(2 * num_frames) {
            let hand = inner.hand;
            inner.hand = (hand + 1) % num_frames;

            let slot = &mut inner.slots[hand];
            if !slot.present {
                continue;
            }
            if slot.reference {
                slot.reference = false;
                continue;
            }

            slot.present = false;
            inner.num_evictable -= 1;
            return Some(FrameId::new(hand as u32));
        }

        None
    }

    fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.get_mut(frame_id.as_usize()) else {
            return;
        };
        let was_present = slot.present;
        *slot = ClockSlot::default();
        if was_present {
            inner.num_evictable -= 1;
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.get_mut(frame_id.as_usize()) else {
            return;
        };
        let was_present = slot.present;
        slot.present = true;
        slot.reference = true;
        if !was_present {
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
    fn test_clock_replacer_sweeps_in_order() {
        let replacer = ClockReplacer::new(4);
        assert_eq!(replacer.capacity(), 4);

        for i in 0..4 {
            replacer.unpin(FrameId::new(i));
        }
        assert_eq!(replacer.size(), 4);

        // First sweep clears all reference bits, then frame 0 goes.
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_clock_replacer_second_chance() {
        let replacer = ClockReplacer::new(3);
        for i in 0..3 {
            replacer.unpin(FrameId::new(i));
        }
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));

        // Frame 1 gets its reference bit back; the hand is at 1.
        replacer.unpin(FrameId::new(1));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_clock_replacer_pin_excludes_frame() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.pin(FrameId::new(0));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), None);
    }
}
