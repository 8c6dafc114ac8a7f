//! Integration tests for the replacement policies

use strata::buffer::{ClockReplacer, LruReplacer, Replacer, ReplacerKind};
use strata::common::FrameId;

fn frame(id: u32) -> FrameId {
    FrameId::new(id)
}

#[test]
fn test_lru_most_recently_unpinned_evicted_last() {
    let replacer = LruReplacer::new(5);
    for id in [3, 1, 4, 0, 2] {
        replacer.unpin(frame(id));
    }

    // Re-using frame 3 moves it to the back of the queue.
    replacer.pin(frame(3));
    replacer.unpin(frame(3));

    let order: Vec<_> = std::iter::from_fn(|| replacer.victim()).collect();
    assert_eq!(order, vec![frame(1), frame(4), frame(0), frame(2), frame(3)]);
}

#[test]
fn test_lru_repeated_unpin_keeps_position() {
    let replacer = LruReplacer::new(3);
    replacer.unpin(frame(0));
    replacer.unpin(frame(1));
    replacer.unpin(frame(0));

    assert_eq!(replacer.size(), 2);
    assert_eq!(replacer.victim(), Some(frame(0)));
}

#[test]
fn test_clock_gives_second_chance() {
    let replacer = ClockReplacer::new(3);
    for id in 0..3 {
        replacer.unpin(frame(id));
    }

    assert_eq!(replacer.victim(), Some(frame(0)));
    replacer.unpin(frame(0));
    // Frames 1 and 2 lost their reference bits in the first sweep.
    assert_eq!(replacer.victim(), Some(frame(1)));
    assert_eq!(replacer.victim(), Some(frame(2)));
    assert_eq!(replacer.victim(), Some(frame(0)));
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_pinned_frames_never_chosen() {
    for kind in [ReplacerKind::Lru, ReplacerKind::Clock] {
        let replacer = kind.build(4);
        for id in 0..4 {
            replacer.unpin(frame(id));
        }
        replacer.pin(frame(1));
        replacer.pin(frame(2));
        assert_eq!(replacer.size(), 2);

        let mut victims = vec![replacer.victim().unwrap(), replacer.victim().unwrap()];
        victims.sort();
        assert_eq!(victims, vec![frame(0), frame(3)], "{:?}", kind);
        assert_eq!(replacer.victim(), None);
    }
}
