//! Bounded undo history

use std::collections::VecDeque;

use glam::IVec3;

use super::grid::Selection;
use super::physics::BodyState;

/// One block as it was before a move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockSnapshot {
    pub block_id: u32,
    pub coord: IVec3,
    pub required: bool,
    pub body: BodyState,
}

/// Everything needed to take back one move
#[derive(Debug, Clone, PartialEq)]
pub struct MoveSnapshot {
    pub blocks: Vec<BlockSnapshot>,
    pub moves_used: u32,
    pub score: u32,
    pub selection: Option<Selection>,
}

/// Undo stack holding at most `capacity` snapshots.
///
/// Capacity is the number of purchased undo levels; 0 disables undo.
#[derive(Debug, Clone, Default)]
pub struct MoveHistory {
    entries: VecDeque<MoveSnapshot>,
    capacity: usize,
}

impl MoveHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change capacity, dropping the oldest entries that no longer fit
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
    }

    /// Push a snapshot, evicting the oldest one when full
    pub fn push(&mut self, snapshot: MoveSnapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn pop(&mut self) -> Option<MoveSnapshot> {
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest snapshot still held
    pub fn oldest(&self) -> Option<&MoveSnapshot> {
        self.entries.front()
    }
}
