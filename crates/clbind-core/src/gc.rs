//! Collector protection for host values held by native code.
//!
//! A protected value is kept alive by the root table until it is unprotected
//! as many times as it was protected. Freed slots are reused through a free
//! stack, so the table only grows when every slot is occupied.

use rustc_hash::FxHashMap;

use crate::HostValue;

#[derive(Debug, Clone, Copy)]
struct RootEntry {
    slot: usize,
    count: usize,
}

/// Root table keeping host values reachable.
#[derive(Debug, Default)]
pub struct GcRoots {
    slots: Vec<Option<HostValue>>,
    free: Vec<usize>,
    index: FxHashMap<usize, RootEntry>,
}

impl GcRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roots `value`. Immediates need no protection and are ignored.
    ///
    /// Returns the protection count after this call.
    pub fn protect(&mut self, value: &HostValue) -> usize {
        let Some(identity) = value.identity() else {
            return 0;
        };
        if let Some(entry) = self.index.get_mut(&identity) {
            entry.count += 1;
            return entry.count;
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(value.clone());
                slot
            }
            None => {
                self.slots.push(Some(value.clone()));
                self.slots.len() - 1
            }
        };
        self.index.insert(identity, RootEntry { slot, count: 1 });
        1
    }

    /// Drops one protection of `value`.
    ///
    /// Returns `false` if the value was not protected.
    pub fn unprotect(&mut self, value: &HostValue) -> bool {
        let Some(identity) = value.identity() else {
            return false;
        };
        let Some(entry) = self.index.get_mut(&identity) else {
            return false;
        };
        entry.count -= 1;
        if entry.count == 0 {
            let slot = entry.slot;
            self.index.remove(&identity);
            self.slots[slot] = None;
            self.free.push(slot);
        }
        true
    }

    pub fn is_protected(&self, value: &HostValue) -> bool {
        value.identity().is_some_and(|identity| self.index.contains_key(&identity))
    }

    /// Number of distinct protected values.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of slots allocated, including free ones.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ForeignHandle, TypeTag};

    #[test]
    fn immediates_are_not_rooted() {
        let mut roots = GcRoots::new();
        assert_eq!(roots.protect(&HostValue::int32(1)), 0);
        assert!(roots.is_empty());
        assert!(!roots.unprotect(&HostValue::int32(1)));
    }

    #[test]
    fn protection_is_counted() {
        let mut roots = GcRoots::new();
        let s = HostValue::string("kept");
        assert_eq!(roots.protect(&s), 1);
        assert_eq!(roots.protect(&s.clone()), 2);
        assert_eq!(roots.len(), 1);
        assert!(roots.unprotect(&s));
        assert!(roots.is_protected(&s));
        assert!(roots.unprotect(&s));
        assert!(!roots.is_protected(&s));
        assert!(!roots.unprotect(&s));
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut roots = GcRoots::new();
        let a = HostValue::string("a");
        let b = HostValue::string("b");
        roots.protect(&a);
        roots.protect(&b);
        roots.unprotect(&a);
        let c = HostValue::string("c");
        roots.protect(&c);
        assert_eq!(roots.capacity(), 2);
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn rooted_handle_stays_alive() {
        let mut roots = GcRoots::new();
        let value = HostValue::Foreign(ForeignHandle::new(std::ptr::null_mut(), TypeTag::ForeignData));
        roots.protect(&value);
        let handle = value.as_foreign().unwrap().clone();
        drop(value);
        assert_eq!(handle.handle_count(), 2);
    }
}
