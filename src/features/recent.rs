use std::collections::VecDeque;

/// Fixed-capacity ring of the most recent items; the oldest entry is evicted
/// once `cap` is reached.
#[derive(Debug, Clone)]
pub struct RecentLog<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T: Clone> RecentLog<T> {
    /// A cap of zero is bumped to one so the latest entry is always visible.
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, item: T) {
        while self.items.len() >= self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_cap_and_evicts_oldest() {
        let mut log = RecentLog::new(3);
        for i in 0..10 {
            log.push(i);
            assert!(log.len() <= 3);
        }
        assert_eq!(log.to_vec(), vec![7, 8, 9]);
        assert_eq!(log.last(), Some(&9));
    }

    #[test]
    fn zero_cap_keeps_latest_entry() {
        let mut log = RecentLog::new(0);
        log.push("a");
        log.push("b");
        assert_eq!(log.cap(), 1);
        assert_eq!(log.to_vec(), vec!["b"]);
    }
}
