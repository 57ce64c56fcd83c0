//! Indexed binary min-heap with decrease-key.
//!
//! Keys are dense node indices, so the position table is a plain `Vec`
//! sized to the graph. Entries are ordered by `(distance, node)` using
//! `f64::total_cmp`, which makes pops among equal distances deterministic.

use std::cmp::Ordering;

use crate::graph::NodeIndex;

const ABSENT: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct IndexedMinHeap {
    heap: Vec<(f64, NodeIndex)>,
    position: Vec<u32>,
}

impl IndexedMinHeap {
    /// Create a heap able to hold node indices `0..capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: Vec::new(),
            position: vec![ABSENT; capacity],
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.position[node as usize] != ABSENT
    }

    /// Current queued distance of `node`, if queued.
    pub fn priority(&self, node: NodeIndex) -> Option<f64> {
        match self.position[node as usize] {
            ABSENT => None,
            pos => Some(self.heap[pos as usize].0),
        }
    }

    /// Insert `node` at `dist`, or move an existing entry to `dist`.
    ///
    /// Moving to a larger distance is allowed and sifts down.
    pub fn push_or_decrease(&mut self, node: NodeIndex, dist: f64) {
        match self.position[node as usize] {
            ABSENT => {
                let pos = self.heap.len();
                self.heap.push((dist, node));
                self.position[node as usize] = pos as u32;
                self.sift_up(pos);
            }
            pos => {
                let pos = pos as usize;
                let old = self.heap[pos].0;
                self.heap[pos].0 = dist;
                if dist.total_cmp(&old) == Ordering::Less {
                    self.sift_up(pos);
                } else {
                    self.sift_down(pos);
                }
            }
        }
    }

    /// Pop the entry with the smallest `(distance, node)`.
    pub fn pop(&mut self) -> Option<(f64, NodeIndex)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let (dist, node) = self.heap.pop()?;
        self.position[node as usize] = ABSENT;
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((dist, node))
    }

    /// Remove an arbitrary entry. Returns its distance if it was queued.
    pub fn remove(&mut self, node: NodeIndex) -> Option<f64> {
        let pos = match self.position[node as usize] {
            ABSENT => return None,
            pos => pos as usize,
        };
        let last = self.heap.len() - 1;
        self.swap(pos, last);
        let (dist, _) = self.heap.pop()?;
        self.position[node as usize] = ABSENT;
        if pos < self.heap.len() {
            self.sift_down(pos);
            self.sift_up(pos);
        }
        Some(dist)
    }

    /// Drop every queued entry, keeping allocations.
    pub fn clear(&mut self) {
        for &(_, node) in &self.heap {
            self.position[node as usize] = ABSENT;
        }
        self.heap.clear();
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (da, na) = self.heap[a];
        let (db, nb) = self.heap[b];
        da.total_cmp(&db).then(na.cmp(&nb)) == Ordering::Less
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.position[self.heap[a].1 as usize] = a as u32;
        self.position[self.heap[b].1 as usize] = b as u32;
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}
