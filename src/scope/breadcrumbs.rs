use std::collections::VecDeque;

use sentry_ndk_types::protocol::Breadcrumb;

/// Upper bound for the storage reserved up front.
const PREALLOCATED_MAX: usize = 1000;

/// A bounded breadcrumb buffer.
///
/// Storage for up to `PREALLOCATED_MAX` entries is allocated once; larger
/// limits grow on demand up to `max`.  When full, the oldest entry is evicted
/// before the new one is appended.
#[derive(Debug, Clone)]
pub struct Breadcrumbs {
    buffer: VecDeque<Breadcrumb>,
    max: usize,
}

impl Breadcrumbs {
    pub fn with_max(max: usize) -> Breadcrumbs {
        Breadcrumbs {
            buffer: VecDeque::with_capacity(max.min(PREALLOCATED_MAX)),
            max,
        }
    }

    pub fn push(&mut self, breadcrumb: Breadcrumb) {
        if self.max == 0 {
            return;
        }
        if self.buffer.len() == self.max {
            self.buffer.pop_front();
        }
        self.buffer.push_back(breadcrumb);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breadcrumb> {
        self.buffer.iter()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crumb(message: &str) -> Breadcrumb {
        Breadcrumb {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut crumbs = Breadcrumbs::with_max(2);
        crumbs.push(crumb("a"));
        crumbs.push(crumb("b"));
        crumbs.push(crumb("c"));

        let messages: Vec<_> = crumbs.iter().filter_map(|c| c.message.as_deref()).collect();
        assert_eq!(messages, ["b", "c"]);
    }

    #[test]
    fn test_storage_does_not_grow() {
        let mut crumbs = Breadcrumbs::with_max(8);
        let capacity = crumbs.capacity();
        for i in 0..100 {
            crumbs.push(crumb(&i.to_string()));
        }
        assert_eq!(crumbs.len(), 8);
        assert_eq!(crumbs.capacity(), capacity);
    }

    #[test]
    fn test_huge_max_does_not_reserve_everything() {
        let mut crumbs = Breadcrumbs::with_max(usize::MAX);
        assert!(crumbs.capacity() < 2 * PREALLOCATED_MAX);
        for i in 0..PREALLOCATED_MAX + 10 {
            crumbs.push(crumb(&i.to_string()));
        }
        assert_eq!(crumbs.len(), PREALLOCATED_MAX + 10);
    }

    #[test]
    fn test_zero_max_keeps_nothing() {
        let mut crumbs = Breadcrumbs::with_max(0);
        crumbs.push(crumb("dropped"));
        assert_eq!(crumbs.len(), 0);
    }
}
