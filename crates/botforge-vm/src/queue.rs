//! Fixed-capacity FIFO used for every per-processor queue.

use std::collections::VecDeque;

/// A FIFO that rejects pushes once full. The rejected item is handed back so
/// the producer can report the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedQueue {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.items.len() >= self.capacity {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_hands_item_back() {
        let mut queue = BoundedQueue::new(2);
        assert!(queue.push(1).is_ok());
        assert!(queue.push(2).is_ok());
        assert_eq!(queue.push(3), Err(3));
        assert!(queue.is_full());
        assert_eq!(queue.pop(), Some(1));
        assert!(queue.push(3).is_ok());
        assert_eq!(queue.drain().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut queue = BoundedQueue::new(0);
        assert_eq!(queue.push("x"), Err("x"));
    }
}
