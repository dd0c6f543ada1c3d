//! Eviction policies

use crate::models::ObjectEntry;

/// Chooses which object remediation deletes
pub trait EvictionPolicy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Pick a victim from a listing, or `None` to evict nothing
    fn select<'a>(&self, objects: &'a [ObjectEntry]) -> Option<&'a ObjectEntry>;
}

/// Evicts the largest object; ties go to the first in listing order
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestObjectPolicy;

impl EvictionPolicy for LargestObjectPolicy {
    fn name(&self) -> &'static str {
        "largest_object"
    }

    fn select<'a>(&self, objects: &'a [ObjectEntry]) -> Option<&'a ObjectEntry> {
        // Iterator::max_by_key keeps the last maximum, so fold explicitly
        objects
            .iter()
            .fold(None, |best: Option<&ObjectEntry>, candidate| match best {
                Some(current) if current.size >= candidate.size => Some(current),
                _ => Some(candidate),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_largest() {
        let objects = vec![
            ObjectEntry::new("a", 10),
            ObjectEntry::new("b", 25),
            ObjectEntry::new("c", 3),
        ];
        assert_eq!(LargestObjectPolicy.select(&objects).unwrap().key, "b");
    }

    #[test]
    fn test_ties_go_to_first_listed() {
        let objects = vec![
            ObjectEntry::new("a", 7),
            ObjectEntry::new("b", 19),
            ObjectEntry::new("c", 19),
        ];
        assert_eq!(LargestObjectPolicy.select(&objects).unwrap().key, "b");
    }

    #[test]
    fn test_empty_listing() {
        assert!(LargestObjectPolicy.select(&[]).is_none());
    }

    #[test]
    fn test_zero_sized_objects_still_selectable() {
        let objects = vec![ObjectEntry::new("empty", 0)];
        assert_eq!(LargestObjectPolicy.select(&objects).unwrap().key, "empty");
    }
}
