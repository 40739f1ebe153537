//! Outcomes of recently applied events, keyed by event id.
//!
//! The hook resends a request with the same event id when a response is lost.
//! Replays are answered from here instead of being applied a second time.

use std::collections::{HashMap, VecDeque};

pub const RECENT_EVENT_CAPACITY: usize = 1024;

/// Bounded, insertion-ordered; the oldest id is forgotten first.
pub struct RecentEvents<T> {
    capacity: usize,
    order: VecDeque<String>,
    outcomes: HashMap<String, T>,
}

impl<T: Clone> RecentEvents<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            outcomes: HashMap::new(),
        }
    }

    pub fn get(&self, event_id: &str) -> Option<T> {
        self.outcomes.get(event_id).cloned()
    }

    pub fn remember(&mut self, event_id: &str, outcome: T) {
        if self
            .outcomes
            .insert(event_id.to_string(), outcome)
            .is_some()
        {
            return;
        }
        self.order.push_back(event_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.outcomes.remove(&evicted);
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.order.len()
    }
}

impl<T: Clone> Default for RecentEvents<T> {
    fn default() -> Self {
        Self::new(RECENT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_remembered_outcome() {
        let mut recent = RecentEvents::new(4);
        recent.remember("evt-1", 7u32);
        assert_eq!(recent.get("evt-1"), Some(7));
        assert_eq!(recent.get("evt-2"), None);
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut recent = RecentEvents::new(2);
        recent.remember("a", 1u32);
        recent.remember("b", 2);
        recent.remember("c", 3);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.get("a"), None);
        assert_eq!(recent.get("b"), Some(2));
        assert_eq!(recent.get("c"), Some(3));
    }

    #[test]
    fn re_remembering_does_not_grow_or_reorder() {
        let mut recent = RecentEvents::new(2);
        recent.remember("a", 1u32);
        recent.remember("a", 9);
        recent.remember("b", 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.get("a"), Some(9));
    }
}
