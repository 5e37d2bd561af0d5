//! Track ID allocation and per-frame ID propagation
//!
//! IDs live in the bounded range `[0, max_ids)`. The allocator is a plain
//! wrapping counter: it does not know which IDs are still in use, so after a
//! wrap a new track can receive the ID of a live one. Every wrap is logged and
//! counted so callers can detect this.

use crate::error::{Result, TrackingError};

/// Default size of the track ID space
pub const MAX_TRACK_IDS: u32 = 999;

/// Default first track ID of a sequence
pub const FIRST_TRACK_ID: u32 = 0;

/// Track IDs of one frame, index aligned with its detections
pub type TrackAssignment = Vec<u32>;

/// Outcome of a single allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub id: u32,
    /// The counter reached `max_ids` and wrapped before handing out `id`
    pub wrapped: bool,
}

/// Wrapping track ID counter
#[derive(Debug, Clone)]
pub struct TrackIdAllocator {
    max_ids: u32,
    next_id: u32,
    wraps: u64,
}

impl TrackIdAllocator {
    pub fn new(first_id: u32, max_ids: u32) -> Result<Self> {
        if max_ids == 0 {
            return Err(TrackingError::config("max track ids must be at least 1"));
        }
        if first_id >= max_ids {
            return Err(TrackingError::config(format!(
                "first track id {} outside the id space [0, {})",
                first_id, max_ids
            )));
        }
        Ok(Self {
            max_ids,
            next_id: first_id,
            wraps: 0,
        })
    }

    /// Hand out the next ID, wrapping modulo `max_ids` when exhausted
    pub fn allocate(&mut self) -> Allocation {
        let wrapped = self.next_id >= self.max_ids;
        if wrapped {
            log::warn!("Exceeded max track ids ({})", self.max_ids);
            self.next_id %= self.max_ids;
            self.wraps += 1;
        }

        let id = self.next_id;
        self.next_id += 1;
        Allocation { id, wrapped }
    }

    /// ID the next allocation would return before any wrap
    pub fn peek(&self) -> u32 {
        self.next_id
    }

    pub fn max_ids(&self) -> u32 {
        self.max_ids
    }

    /// Number of wraps since construction
    pub fn wraps(&self) -> u64 {
        self.wraps
    }
}

/// Result of resolving one frame's matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTracks {
    pub tracks: TrackAssignment,
    /// Allocations in this frame that wrapped the counter
    pub wraps: u32,
}

/// Maps matcher output to persistent track IDs across a sequence
#[derive(Debug, Clone)]
pub struct TrackIdManager {
    allocator: TrackIdAllocator,
    previous: TrackAssignment,
    bridge_empty_frames: bool,
}

impl TrackIdManager {
    /// # Arguments
    /// * `first_id` - ID of the first track
    /// * `max_ids` - Size of the ID space
    /// * `bridge_empty_frames` - Keep the last non-empty assignment across empty frames
    pub fn new(first_id: u32, max_ids: u32, bridge_empty_frames: bool) -> Result<Self> {
        Ok(Self {
            allocator: TrackIdAllocator::new(first_id, max_ids)?,
            previous: Vec::new(),
            bridge_empty_frames,
        })
    }

    /// Track IDs the next frame will be matched against
    pub fn previous(&self) -> &[u32] {
        &self.previous
    }

    pub fn allocator(&self) -> &TrackIdAllocator {
        &self.allocator
    }

    /// Resolve matches of the current frame
    ///
    /// `matches[j]` is the index into the previous assignment matched by current
    /// detection `j`, or `None` to start a new track.
    pub fn assign(&mut self, matches: &[Option<usize>]) -> Result<FrameTracks> {
        let mut tracks = Vec::with_capacity(matches.len());
        let mut wraps = 0;

        for m in matches {
            let id = match *m {
                Some(prev_idx) => *self.previous.get(prev_idx).ok_or(
                    TrackingError::MatchOutOfRange {
                        index: prev_idx,
                        tracked: self.previous.len(),
                    },
                )?,
                None => {
                    let allocation = self.allocator.allocate();
                    if allocation.wrapped {
                        wraps += 1;
                    }
                    allocation.id
                }
            };
            tracks.push(id);
        }

        if !(tracks.is_empty() && self.bridge_empty_frames) {
            self.previous = tracks.clone();
        }
        Ok(FrameTracks { tracks, wraps })
    }

    /// First frame of a sequence: every detection starts a track
    pub fn assign_all_new(&mut self, num_detections: usize) -> Result<FrameTracks> {
        self.assign(&vec![None; num_detections])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_ids_in_order() {
        let mut manager = TrackIdManager::new(FIRST_TRACK_ID, MAX_TRACK_IDS, false).unwrap();
        let frame = manager.assign_all_new(5).unwrap();
        assert_eq!(frame.tracks, vec![0, 1, 2, 3, 4]);
        assert_eq!(frame.wraps, 0);
    }

    #[test]
    fn test_matches_inherit_previous_ids() {
        let mut manager = TrackIdManager::new(0, MAX_TRACK_IDS, false).unwrap();
        manager.assign_all_new(2).unwrap();

        let frame = manager.assign(&[Some(1), None, Some(0)]).unwrap();
        assert_eq!(frame.tracks, vec![1, 2, 0]);
        assert_eq!(manager.previous(), &[1, 2, 0]);
    }

    #[test]
    fn test_wraparound_allocates_0_1_0() {
        let mut manager = TrackIdManager::new(0, 2, false).unwrap();
        let ids: Vec<FrameTracks> = (0..3).map(|_| manager.assign(&[None]).unwrap()).collect();

        assert_eq!(
            ids.iter().map(|f| f.tracks[0]).collect::<Vec<_>>(),
            vec![0, 1, 0]
        );
        assert_eq!(
            ids.iter().map(|f| f.wraps).collect::<Vec<_>>(),
            vec![0, 0, 1]
        );
        assert_eq!(manager.allocator().wraps(), 1);
    }

    #[test]
    fn test_single_id_space() {
        let mut allocator = TrackIdAllocator::new(0, 1).unwrap();
        assert_eq!(allocator.allocate(), Allocation { id: 0, wrapped: false });
        assert_eq!(allocator.allocate(), Allocation { id: 0, wrapped: true });
        assert_eq!(allocator.allocate(), Allocation { id: 0, wrapped: true });
    }

    #[test]
    fn test_custom_first_id() {
        let mut allocator = TrackIdAllocator::new(7, 9).unwrap();
        let ids: Vec<u32> = (0..4).map(|_| allocator.allocate().id).collect();
        assert_eq!(ids, vec![7, 8, 0, 1]);
    }

    #[test]
    fn test_invalid_id_space() {
        assert!(TrackIdAllocator::new(0, 0).unwrap_err().is_configuration());
        assert!(TrackIdAllocator::new(5, 5).unwrap_err().is_configuration());
    }

    #[test]
    fn test_empty_frame_strict_adjacency() {
        let mut manager = TrackIdManager::new(0, MAX_TRACK_IDS, false).unwrap();
        manager.assign_all_new(2).unwrap();
        let empty = manager.assign(&[]).unwrap();
        assert!(empty.tracks.is_empty());
        assert!(manager.previous().is_empty());
    }

    #[test]
    fn test_empty_frame_bridged() {
        let mut manager = TrackIdManager::new(0, MAX_TRACK_IDS, true).unwrap();
        manager.assign_all_new(2).unwrap();
        manager.assign(&[]).unwrap();
        assert_eq!(manager.previous(), &[0, 1]);

        let frame = manager.assign(&[Some(1)]).unwrap();
        assert_eq!(frame.tracks, vec![1]);
    }

    #[test]
    fn test_out_of_range_match_fails() {
        let mut manager = TrackIdManager::new(0, MAX_TRACK_IDS, false).unwrap();
        manager.assign_all_new(1).unwrap();
        assert!(matches!(
            manager.assign(&[Some(3)]),
            Err(TrackingError::MatchOutOfRange {
                index: 3,
                tracked: 1
            })
        ));
    }
}
