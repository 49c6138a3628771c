/// Visited marks for one traversal, reset in O(1) by bumping a generation
/// stamp instead of clearing the array.
#[derive(Debug, Default)]
pub(crate) struct VisitedSet {
    stamps: Vec<u16>,
    generation: u16,
}

impl VisitedSet {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            stamps: vec![0; capacity],
            generation: 1,
        }
    }

    /// Starts a new traversal over `capacity` nodes.
    pub(crate) fn reset(&mut self, capacity: usize) {
        if capacity > self.stamps.len() {
            self.stamps.resize(capacity, 0);
        }
        if self.generation == u16::MAX {
            self.stamps.fill(0);
            self.generation = 1;
        } else {
            self.generation += 1;
        }
    }

    /// Marks `node`; false if it was already marked in this traversal.
    #[inline]
    pub(crate) fn insert(&mut self, node: u32) -> bool {
        let slot = &mut self.stamps[node as usize];
        if *slot == self.generation {
            return false;
        }
        *slot = self.generation;
        true
    }
}
