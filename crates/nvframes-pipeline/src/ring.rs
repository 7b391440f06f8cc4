//! Fixed ring of reusable frame buffers.
//!
//! The producer writes each sampled frame into the current slot, hands a
//! clone of the slot's `Arc` to the encode stage and advances. A slot can only
//! be written while the ring holds its sole reference.

use crate::{Error, Result};
use std::sync::Arc;

/// One host buffer sized for a planar 4:2:0 frame.
#[derive(Debug)]
pub struct FrameSlot {
    index: usize,
    data: Vec<u8>,
}

impl FrameSlot {
    /// Position of this slot in its ring.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// M frame slots reused in fixed cyclic order.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<Arc<FrameSlot>>,
    cursor: usize,
}

impl FrameRing {
    /// Allocate `slots` zeroed buffers of `frame_len` bytes.
    ///
    /// The encode stage can hold `in_flight_limit` frames and the producer
    /// fills one more before it blocks, so `slots` must exceed that limit.
    pub fn new(frame_len: usize, slots: usize, in_flight_limit: usize) -> Result<Self> {
        if frame_len == 0 {
            return Err(Error::invalid_config("frame length must be non-zero"));
        }
        if slots <= in_flight_limit {
            return Err(Error::invalid_config(format!(
                "ring of {slots} slots cannot back {in_flight_limit} in-flight frames; need at least {}",
                in_flight_limit + 1
            )));
        }

        let slots = (0..slots)
            .map(|index| {
                Arc::new(FrameSlot {
                    index,
                    data: vec![0; frame_len],
                })
            })
            .collect();
        Ok(Self { slots, cursor: 0 })
    }

    /// Ring sized for a pipeline that holds `in_flight_limit` frames.
    pub fn for_pipeline(frame_len: usize, in_flight_limit: usize) -> Result<Self> {
        Self::new(frame_len, in_flight_limit + 1, in_flight_limit)
    }

    /// Number of slots (M).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn frame_len(&self) -> usize {
        self.slots.first().map(|slot| slot.len()).unwrap_or(0)
    }

    /// The active slot. Its identity is stable until [`advance`](Self::advance).
    pub fn current(&self) -> &Arc<FrameSlot> {
        &self.slots[self.cursor]
    }

    /// The active slot's bytes, if no other stage still references it.
    pub fn current_mut(&mut self) -> Result<&mut [u8]> {
        let index = self.cursor;
        Arc::get_mut(&mut self.slots[index])
            .map(|slot| slot.data.as_mut_slice())
            .ok_or(Error::SlotInUse { index })
    }

    /// Move to the next slot, wrapping after the last.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.slots.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_undersized_ring() {
        assert!(matches!(
            FrameRing::new(16, 8, 8),
            Err(Error::InvalidConfig(_))
        ));
        assert!(FrameRing::new(16, 9, 8).is_ok());
        assert!(FrameRing::new(0, 9, 8).is_err());
    }

    #[test]
    fn test_for_pipeline_sizing() {
        let ring = FrameRing::for_pipeline(24, 16).unwrap();
        assert_eq!(ring.len(), 17);
        assert_eq!(ring.frame_len(), 24);
    }

    #[test]
    fn test_advance_wraps_to_same_slot() {
        let mut ring = FrameRing::new(4, 5, 4).unwrap();
        let first = ring.current().clone();
        assert!(Arc::ptr_eq(&first, ring.current()));

        for _ in 0..ring.len() {
            ring.advance();
        }
        assert!(Arc::ptr_eq(&first, ring.current()));
        assert_eq!(ring.current().index(), 0);
    }

    #[test]
    fn test_shared_slot_cannot_be_written() {
        let mut ring = FrameRing::new(4, 3, 2).unwrap();
        ring.current_mut().unwrap().copy_from_slice(&[1, 2, 3, 4]);
        let held = ring.current().clone();
        assert!(matches!(ring.current_mut(), Err(Error::SlotInUse { index: 0 })));

        drop(held);
        assert_eq!(ring.current_mut().unwrap(), &[1, 2, 3, 4]);
    }
}
