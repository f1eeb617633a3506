//! Index-stable storage for timer registrations.
//!
//! Slots are handed out by index and recycled after removal, so a registration
//! keeps the same key for its whole lifetime while the backing vector stays
//! compact.

pub(crate) struct Slab<T> {
    items: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> Slab<T> {
    /// Creates a slab with `size` preallocated free slots.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| None).collect();
        // Reversed so that `pop` hands out the lowest index first.
        let free = (0..size).rev().collect();

        Self { items, free }
    }

    /// Stores `item` and returns the index it can be retrieved with.
    ///
    /// Doubles the backing storage when no free slot is left.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items.extend((len..new_len).map(|_| None));
            self.free.extend(((len + 1)..new_len).rev());

            len
        };

        self.items[index] = Some(item);

        index
    }

    /// Removes and returns the item at `index`, if the slot is occupied.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.items.get_mut(index)?.take()?;
        self.free.push(index);

        Some(item)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)?.as_mut()
    }

    /// Iterates over occupied slots together with their index.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|item| (index, item)))
    }
}

#[cfg(test)]
mod tests {
    use super::Slab;

    #[test]
    fn reuses_freed_slots() {
        let mut slab = Slab::new(0);
        let a = slab.insert("a");
        let b = slab.insert("b");
        assert_ne!(a, b);

        assert_eq!(slab.remove(a), Some("a"));
        assert_eq!(slab.remove(a), None);
        assert_eq!(slab.iter().count(), 1);

        let c = slab.insert("c");
        assert_eq!(c, a);
        assert_eq!(slab.get_mut(c).copied(), Some("c"));
    }

    #[test]
    fn grows_past_initial_size() {
        let mut slab = Slab::new(2);
        let keys: Vec<usize> = (0..9).map(|i| slab.insert(i)).collect();

        assert_eq!(slab.iter().count(), 9);
        let mut seen: Vec<usize> = slab.iter().map(|(_, v)| *v).collect();
        seen.sort();
        assert_eq!(seen, (0..9).collect::<Vec<_>>());

        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), keys.len(), "indices must be unique");
    }
}
