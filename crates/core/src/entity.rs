//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Replace an owned child collection with `incoming`, matching items by key.
///
/// - items present in both lists are updated in place through `update`
///   (existing position is kept)
/// - items only in `incoming` are appended
/// - items only in `current` are removed
///
/// Returns `true` when anything was added, removed or updated.
pub fn reconcile<T, F>(current: &mut Vec<T>, incoming: impl IntoIterator<Item = T>, mut update: F) -> bool
where
    T: Entity,
    F: FnMut(&mut T, T) -> bool,
{
    let incoming: Vec<T> = incoming.into_iter().collect();
    let mut changed = false;

    let before = current.len();
    current.retain(|existing| incoming.iter().any(|i| i.id() == existing.id()));
    if current.len() != before {
        changed = true;
    }

    for item in incoming {
        match current.iter_mut().find(|existing| existing.id() == item.id()) {
            Some(existing) => {
                if update(existing, item) {
                    changed = true;
                }
            }
            None => {
                current.push(item);
                changed = true;
            }
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Line {
        key: u32,
        qty: i64,
    }

    impl Entity for Line {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.key
        }
    }

    fn update(existing: &mut Line, incoming: Line) -> bool {
        let changed = existing.qty != incoming.qty;
        existing.qty = incoming.qty;
        changed
    }

    #[test]
    fn updates_overlapping_adds_new_and_removes_missing() {
        let mut current = vec![Line { key: 1, qty: 1 }, Line { key: 2, qty: 2 }];
        let changed = reconcile(
            &mut current,
            vec![Line { key: 2, qty: 20 }, Line { key: 3, qty: 3 }],
            update,
        );

        assert!(changed);
        assert_eq!(current, vec![Line { key: 2, qty: 20 }, Line { key: 3, qty: 3 }]);
    }

    #[test]
    fn identical_lists_report_no_change() {
        let mut current = vec![Line { key: 1, qty: 1 }];
        let changed = reconcile(&mut current, vec![Line { key: 1, qty: 1 }], update);
        assert!(!changed);
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn empty_incoming_clears_collection() {
        let mut current = vec![Line { key: 1, qty: 1 }, Line { key: 2, qty: 2 }];
        assert!(reconcile(&mut current, Vec::new(), update));
        assert!(current.is_empty());
    }
}
