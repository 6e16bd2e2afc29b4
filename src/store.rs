use crate::error::StoreError;
use crate::frame::Frame;
use tracing::{debug, trace};

/// Number of copies a long capture inserts
pub const LONG_CAPTURE_COPIES: usize = 4;

/// Ordered, capacity-bounded sequence of captured frames plus the
/// live-feed / static-frame cursor.
///
/// All navigation is forgiving: calls on an empty store are no-ops.
/// Invariant: an empty store always views the live feed, and a non-empty
/// store always has `cursor_index < frames.len()`.
#[derive(Debug)]
pub struct FrameStore {
    frames: Vec<Frame>,
    capacity: usize,
    cursor_index: usize,
    viewing_live_feed: bool,
    background: Option<Frame>,
    next_id: u64,
}

impl FrameStore {
    pub fn new(capacity: usize) -> Self {
        debug!("Created frame store with capacity {}", capacity);
        Self {
            frames: Vec::new(),
            capacity,
            cursor_index: 0,
            viewing_live_feed: true,
            background: None,
            next_id: 1,
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cursor_index(&self) -> usize {
        self.cursor_index
    }

    pub fn is_viewing_live_feed(&self) -> bool {
        self.viewing_live_feed
    }

    /// Frame under the cursor, `None` while viewing the live feed
    pub fn current_frame(&self) -> Option<&Frame> {
        if self.viewing_live_feed {
            None
        } else {
            self.frames.get(self.cursor_index)
        }
    }

    pub fn background(&self) -> Option<&Frame> {
        self.background.as_ref()
    }

    /// Append one frame. Returns the id the frame was stored under.
    pub fn add_frame(&mut self, frame: Frame) -> Result<u64, StoreError> {
        self.check_room(1)?;
        let id = self.push(frame);
        self.after_append();
        trace!("Added frame {} ({} total)", id, self.frames.len());
        Ok(id)
    }

    /// Append [`LONG_CAPTURE_COPIES`] copies of one frame, all or nothing.
    pub fn add_long_capture(&mut self, frame: Frame) -> Result<u64, StoreError> {
        self.check_room(LONG_CAPTURE_COPIES)?;
        let first_id = self.push(frame.clone());
        for _ in 1..LONG_CAPTURE_COPIES {
            self.push(frame.clone());
        }
        self.after_append();
        trace!(
            "Added long capture starting at {} ({} total)",
            first_id,
            self.frames.len()
        );
        Ok(first_id)
    }

    /// Step towards older frames. From the live feed this jumps to the
    /// newest frame; from the first frame it wraps to the newest.
    pub fn move_back(&mut self) {
        if self.frames.is_empty() {
            return;
        }
        if self.viewing_live_feed {
            self.viewing_live_feed = false;
            self.cursor_index = self.last_index();
        } else if self.cursor_index > 0 {
            self.cursor_index -= 1;
        } else {
            self.cursor_index = self.last_index();
        }
    }

    /// Step towards newer frames, ending on the live feed.
    pub fn move_forward(&mut self) {
        if self.frames.is_empty() || self.viewing_live_feed {
            return;
        }
        if self.cursor_index < self.last_index() {
            self.cursor_index += 1;
        } else {
            self.viewing_live_feed = true;
        }
    }

    /// Remove the frame under the cursor. The live feed cannot be deleted.
    pub fn delete_current(&mut self) -> Option<Frame> {
        if self.viewing_live_feed || self.frames.is_empty() {
            return None;
        }
        let removed = self.frames.remove(self.cursor_index);
        if self.frames.is_empty() {
            self.cursor_index = 0;
            self.viewing_live_feed = true;
        } else if self.cursor_index >= self.frames.len() {
            self.cursor_index = self.last_index();
        }
        debug!("Deleted frame {} ({} left)", removed.id, self.frames.len());
        Some(removed)
    }

    pub fn reset_to_last_frame(&mut self) {
        if self.frames.is_empty() {
            return;
        }
        self.cursor_index = self.last_index();
        self.viewing_live_feed = false;
    }

    pub fn return_to_live_feed(&mut self) {
        self.viewing_live_feed = true;
        if !self.frames.is_empty() {
            self.cursor_index = self.last_index();
        }
    }

    pub fn set_background(&mut self, frame: Frame) {
        self.background = Some(frame);
    }

    /// Drop every frame and the background; the store starts over on the live feed.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.cursor_index = 0;
        self.viewing_live_feed = true;
        self.background = None;
        debug!("Frame store cleared");
    }

    fn check_room(&self, requested: usize) -> Result<(), StoreError> {
        if self.frames.len() + requested > self.capacity {
            return Err(StoreError::CapacityExceeded {
                capacity: self.capacity,
                len: self.frames.len(),
                requested,
            });
        }
        Ok(())
    }

    fn push(&mut self, frame: Frame) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.frames.push(frame.duplicate(id));
        id
    }

    fn after_append(&mut self) {
        self.cursor_index = self.last_index();
        self.viewing_live_feed = true;
    }

    fn last_index(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u8) -> Frame {
        Frame::solid(0, 2, 2, [n, n, n])
    }

    fn store_with(count: u8) -> FrameStore {
        let mut store = FrameStore::new(300);
        for n in 0..count {
            store.add_frame(frame(n)).unwrap();
        }
        store
    }

    fn assert_invariants(store: &FrameStore) {
        if store.is_empty() {
            assert!(store.is_viewing_live_feed());
        } else {
            assert!(store.cursor_index() < store.len());
        }
    }

    #[test]
    fn test_add_frame_moves_cursor_to_end_on_live_feed() {
        let store = store_with(3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.cursor_index(), 2);
        assert!(store.is_viewing_live_feed());
    }

    #[test]
    fn test_add_frame_at_capacity_fails_without_mutation() {
        let mut store = FrameStore::new(2);
        store.add_frame(frame(0)).unwrap();
        store.add_frame(frame(1)).unwrap();
        store.move_back();

        let err = store.add_frame(frame(2)).unwrap_err();
        assert_eq!(
            err,
            StoreError::CapacityExceeded {
                capacity: 2,
                len: 2,
                requested: 1
            }
        );
        assert_eq!(store.len(), 2);
        assert!(!store.is_viewing_live_feed());
    }

    #[test]
    fn test_long_capture_adds_four_or_nothing() {
        let mut store = FrameStore::new(6);
        store.add_frame(frame(0)).unwrap();

        store.add_long_capture(frame(1)).unwrap();
        assert_eq!(store.len(), 5);
        assert_eq!(store.cursor_index(), 4);

        assert!(store.add_long_capture(frame(2)).is_err());
        assert_eq!(store.len(), 5);

        let ids: Vec<u64> = store.frames().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_long_capture_copies_delete_independently() {
        let mut store = FrameStore::new(10);
        store.add_long_capture(frame(9)).unwrap();
        store.move_back();
        store.delete_current();

        assert_eq!(store.len(), 3);
        assert!(store.frames().iter().all(|f| f.pixel_rgb(0, 0) == Some([9, 9, 9])));
    }

    #[test]
    fn test_empty_store_navigation_is_noop() {
        let mut store = FrameStore::new(10);
        store.move_back();
        store.move_forward();
        assert!(store.delete_current().is_none());

        assert!(store.is_empty());
        assert!(store.is_viewing_live_feed());
        assert_eq!(store.cursor_index(), 0);
    }

    #[test]
    fn test_move_back_wraps_to_last() {
        let mut store = store_with(3);

        store.move_back();
        assert_eq!((store.cursor_index(), store.is_viewing_live_feed()), (2, false));
        store.move_back();
        assert_eq!(store.cursor_index(), 1);
        store.move_back();
        assert_eq!(store.cursor_index(), 0);
        store.move_back();
        assert_eq!(store.cursor_index(), 2);
        assert!(!store.is_viewing_live_feed());
    }

    #[test]
    fn test_move_forward_from_last_frame_returns_to_live_feed() {
        let mut store = store_with(1);
        store.move_back();
        assert_eq!((store.cursor_index(), store.is_viewing_live_feed()), (0, false));

        store.move_forward();
        assert!(store.is_viewing_live_feed());
    }

    #[test]
    fn test_move_forward_on_live_feed_is_noop() {
        let mut store = store_with(4);
        store.move_back();
        store.move_back();
        store.move_forward();
        store.move_forward();
        let cursor = store.cursor_index();
        assert!(store.is_viewing_live_feed());

        store.move_forward();
        assert!(store.is_viewing_live_feed());
        assert_eq!(store.cursor_index(), cursor);
    }

    #[test]
    fn test_back_then_forward_returns_to_live_feed() {
        for count in 1..6u8 {
            for steps in 1..=count as usize {
                let mut store = store_with(count);
                let cursor = store.cursor_index();

                for _ in 0..steps {
                    store.move_back();
                }
                for _ in 0..steps {
                    store.move_forward();
                }

                assert!(store.is_viewing_live_feed(), "count {} steps {}", count, steps);
                assert_eq!(store.cursor_index(), cursor);
            }
        }
    }

    #[test]
    fn test_delete_on_live_feed_keeps_frames() {
        let mut store = store_with(3);
        assert!(store.delete_current().is_none());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_delete_only_frame_resets_store() {
        let mut store = store_with(1);
        store.move_back();
        store.delete_current();

        assert_eq!(store.len(), 0);
        assert_eq!(store.cursor_index(), 0);
        assert!(store.is_viewing_live_feed());
    }

    #[test]
    fn test_delete_last_frame_clamps_cursor() {
        let mut store = store_with(3);
        store.move_back();
        let removed = store.delete_current().unwrap();

        assert_eq!(removed.id, 3);
        assert_eq!(store.len(), 2);
        assert_eq!(store.cursor_index(), 1);
        assert!(!store.is_viewing_live_feed());
    }

    #[test]
    fn test_delete_middle_frame_keeps_cursor() {
        let mut store = store_with(3);
        store.move_back();
        store.move_back();
        store.delete_current();

        assert_eq!(store.cursor_index(), 1);
        assert_eq!(store.current_frame().unwrap().id, 3);
    }

    #[test]
    fn test_reset_and_return_to_live_feed() {
        let mut store = store_with(3);
        store.reset_to_last_frame();
        assert_eq!((store.cursor_index(), store.is_viewing_live_feed()), (2, false));

        store.move_back();
        store.return_to_live_feed();
        assert_eq!((store.cursor_index(), store.is_viewing_live_feed()), (2, true));

        let mut empty = FrameStore::new(3);
        empty.reset_to_last_frame();
        assert!(empty.is_viewing_live_feed());
    }

    #[test]
    fn test_clear_drops_background() {
        let mut store = store_with(2);
        store.set_background(frame(7));
        store.move_back();
        store.clear();

        assert!(store.is_empty());
        assert!(store.background().is_none());
        assert!(store.is_viewing_live_feed());
        assert_eq!(store.cursor_index(), 0);
    }

    #[test]
    fn test_navigation_sequences_hold_invariants() {
        // Deterministic pseudo-random walk over every operation
        let mut store = FrameStore::new(12);
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..2000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            match seed % 6 {
                0 => {
                    let _ = store.add_frame(frame(1));
                }
                1 => {
                    let _ = store.add_long_capture(frame(2));
                }
                2 | 3 => store.move_back(),
                4 => store.move_forward(),
                _ => {
                    store.delete_current();
                }
            }
            assert_invariants(&store);
            assert!(store.len() <= store.capacity());
        }
    }
}
