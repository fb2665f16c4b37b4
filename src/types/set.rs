//! Unordered set of unique byte strings.

use bytes::Bytes;
use rand::seq::{IteratorRandom, SliceRandom};
use std::collections::HashSet;

/// Most members a negative-count sample may return.
pub const MAX_RANDOM_SAMPLE: usize = 1 << 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Set {
    members: HashSet<Bytes>,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Adds a member, returning `true` if it was not already present.
    pub fn add(&mut self, member: Bytes) -> bool {
        self.members.insert(member)
    }

    /// Removes a member, returning `true` if it was present.
    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.members.remove(member)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.members.contains(member)
    }

    /// All members, in no particular order.
    pub fn members(&self) -> Vec<Bytes> {
        self.members.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.members.iter()
    }

    /// Removes and returns an arbitrary member.
    pub fn pop(&mut self) -> Option<Bytes> {
        let member = self.members.iter().next().cloned()?;
        self.members.remove(&member);
        Some(member)
    }

    /// Random members without removing them.
    ///
    /// A non-negative `count` returns up to `count` distinct members. A
    /// negative `count` returns `|count|` members, possibly repeated, but
    /// never more than [`MAX_RANDOM_SAMPLE`].
    pub fn rand_members(&self, count: i64) -> Vec<Bytes> {
        let mut rng = rand::thread_rng();
        let wanted = usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX);

        if count >= 0 {
            let wanted = wanted.min(self.members.len());
            self.members.iter().cloned().choose_multiple(&mut rng, wanted)
        } else {
            let wanted = wanted.min(MAX_RANDOM_SAMPLE);
            let pool: Vec<&Bytes> = self.members.iter().collect();
            if pool.is_empty() {
                return Vec::new();
            }
            (0..wanted)
                .filter_map(|_| pool.choose(&mut rng).map(|m| (*m).clone()))
                .collect()
        }
    }
}

impl FromIterator<Bytes> for Set {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

/// Members present in every set. An empty input yields an empty set.
pub fn intersect(sets: &[&Set]) -> Set {
    let Some(smallest) = sets.iter().min_by_key(|s| s.len()) else {
        return Set::new();
    };

    smallest
        .iter()
        .filter(|member| sets.iter().all(|s| s.contains(member)))
        .cloned()
        .collect()
}

/// Members present in any set. Absent sets contribute nothing.
pub fn union(sets: &[Option<&Set>]) -> Set {
    sets.iter()
        .flatten()
        .flat_map(|s| s.iter().cloned())
        .collect()
}

/// Members of `first` not present in any of `others`.
pub fn difference(first: &Set, others: &[Option<&Set>]) -> Set {
    first
        .iter()
        .filter(|member| !others.iter().flatten().any(|s| s.contains(member)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> Set {
        items.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect()
    }

    #[test]
    fn test_add_remove_contains() {
        let mut s = Set::new();
        assert!(s.add(Bytes::from("a")));
        assert!(!s.add(Bytes::from("a")));
        assert!(s.contains(b"a"));
        assert_eq!(s.len(), 1);
        assert!(s.remove(b"a"));
        assert!(!s.remove(b"a"));
        assert!(s.is_empty());
    }

    #[test]
    fn test_pop_drains() {
        let mut s = set(&["a", "b", "c"]);
        let mut seen = Vec::new();
        while let Some(m) = s.pop() {
            seen.push(m);
        }
        seen.sort();
        assert_eq!(seen, vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]);
    }

    #[test]
    fn test_rand_members_distinct_for_positive_count() {
        let s = set(&["a", "b", "c"]);

        let picked = s.rand_members(2);
        assert_eq!(picked.len(), 2);
        assert_ne!(picked[0], picked[1]);

        let all = s.rand_members(10);
        assert_eq!(all.len(), 3);

        assert!(s.rand_members(0).is_empty());
    }

    #[test]
    fn test_rand_members_repeats_for_negative_count() {
        let s = set(&["only"]);
        let picked = s.rand_members(-5);
        assert_eq!(picked, vec![Bytes::from("only"); 5]);

        assert!(Set::new().rand_members(-3).is_empty());
    }

    #[test]
    fn test_rand_members_huge_counts() {
        let s = set(&["a", "b", "c"]);
        assert_eq!(s.rand_members(i64::MAX).len(), 3);
        assert_eq!(
            s.rand_members(-(MAX_RANDOM_SAMPLE as i64) - 5).len(),
            MAX_RANDOM_SAMPLE
        );
    }

    #[test]
    fn test_set_algebra() {
        let a = set(&["a", "b", "c", "d"]);
        let b = set(&["c", "d", "e"]);
        let c = set(&["d", "x"]);

        assert_eq!(intersect(&[&a, &b, &c]), set(&["d"]));
        assert_eq!(intersect(&[]), Set::new());
        assert_eq!(union(&[Some(&a), None, Some(&c)]), set(&["a", "b", "c", "d", "x"]));
        assert_eq!(difference(&a, &[Some(&b), None]), set(&["a", "b"]));
    }
}
