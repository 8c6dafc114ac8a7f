use serde::{Deserialize, Serialize};

use crate::common::FrameId;

use super::{ClockReplacer, LruReplacer};

/// Victim selection over a fixed set of frame ids.
///
/// A frame becomes a candidate when it is unpinned and stops being one when
/// it is pinned again or chosen as a victim.
pub trait Replacer: Send + Sync {
    /// Chooses an evictable frame and removes it from the candidate set.
    /// Returns None if no frame is evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Removes a frame from the candidate set.
    fn pin(&self, frame_id: FrameId);

    /// Adds a frame to the candidate set.
    fn unpin(&self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Which replacement policy a pool uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacerKind {
    #[default]
    Lru,
    Clock,
}

impl ReplacerKind {
    pub fn build(self, num_frames: usize) -> Box<dyn Replacer> {
        match self {
            ReplacerKind::Lru => Box::new(LruReplacer::new(num_frames)),
            ReplacerKind::Clock => Box::new(ClockReplacer::new(num_frames)),
        }
    }
}
