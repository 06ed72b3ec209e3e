//! Fixed-capacity ring buffers of recent leak and hit positions.

use glam::DVec3;

/// Entries kept per cache.
pub const CACHE_SIZE: usize = 2048;

/// What happened at a cached hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Desorption,
    Absorption,
    Reflection,
    Transparent,
    Teleport,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitEntry {
    pub position: DVec3,
    pub kind: HitKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakEntry {
    pub position: DVec3,
    pub direction: DVec3,
}

/// Ring buffer that overwrites its oldest entry when full.
#[derive(Debug, Clone, PartialEq)]
pub struct RingCache<T> {
    entries: Vec<T>,
    capacity: usize,
    next: usize,
    /// Entries ever pushed, including overwritten ones.
    pushed: u64,
}

impl<T: Copy> RingCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            next: 0,
            pushed: 0,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() < self.capacity {
            self.entries.push(entry);
        } else {
            self.entries[self.next] = entry;
        }
        self.next = (self.next + 1) % self.capacity;
        self.pushed += 1;
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let split = if self.entries.len() < self.capacity {
            0
        } else {
            self.next
        };
        self.entries[split..].iter().chain(self.entries[..split].iter())
    }

    /// Append another cache's entries, oldest first.
    pub fn extend_from(&mut self, other: &RingCache<T>) {
        for entry in other.iter() {
            self.push(*entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next = 0;
        self.pushed = 0;
    }
}

impl<T: Copy> Default for RingCache<T> {
    fn default() -> Self {
        Self::new(CACHE_SIZE)
    }
}
