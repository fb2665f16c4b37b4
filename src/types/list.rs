//! Paged List
//!
//! A doubly-linked list of bounded pages. Each page holds up to `page_size`
//! elements in a `Vec`, so pushes at either end are amortized O(1) and
//! positional access walks pages rather than individual nodes.
//!
//! ```text
//!   head                                           tail
//!    │                                              │
//!    ▼                                              ▼
//! ┌────────┐     ┌────────┐     ┌────────┐     ┌────────┐
//! │ [a b c]│ ◄─► │ [d e]  │ ◄─► │ [f g h]│ ◄─► │ [i]    │
//! └────────┘     └────────┘     └────────┘     └────────┘
//! ```
//!
//! Pages live in an arena (`Vec<Page>`) and link to each other by index.
//! Freed pages go on a free list and are reused. A page is never left empty
//! while linked.
//!
//! Positions are expressed with a [`Cursor`], which is either on an element or
//! on one of two sentinels: before the first element or after the last.

use bytes::Bytes;

/// Default maximum number of elements per page.
pub const DEFAULT_PAGE_SIZE: usize = 1024;

type PageId = usize;

#[derive(Debug, Clone, Default)]
struct Page {
    items: Vec<Bytes>,
    prev: Option<PageId>,
    next: Option<PageId>,
}

/// A position within a [`QuickList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Before the first element.
    BeforeStart,
    /// On the element at `offset` within `page`.
    At { page: PageId, offset: usize },
    /// After the last element.
    AfterEnd,
}

/// Ordered sequence of byte strings stored in linked pages.
#[derive(Debug, Clone)]
pub struct QuickList {
    pages: Vec<Page>,
    free: Vec<PageId>,
    head: Option<PageId>,
    tail: Option<PageId>,
    len: usize,
    page_size: usize,
}

impl Default for QuickList {
    fn default() -> Self {
        Self::new()
    }
}

impl QuickList {
    /// Creates an empty list with the default page size.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty list whose pages hold at most `page_size` elements
    /// (at least 2).
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            pages: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            page_size: page_size.max(2),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of linked pages.
    pub fn page_count(&self) -> usize {
        let mut count = 0;
        let mut current = self.head;
        while let Some(id) = current {
            count += 1;
            current = self.pages[id].next;
        }
        count
    }

    // ========================================================================
    // Page management
    // ========================================================================

    fn alloc_page(&mut self, items: Vec<Bytes>) -> PageId {
        let page = Page {
            items,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(id) => {
                self.pages[id] = page;
                id
            }
            None => {
                self.pages.push(page);
                self.pages.len() - 1
            }
        }
    }

    /// Links `id` directly after `after` (or as the head when `None`).
    fn link_after(&mut self, after: Option<PageId>, id: PageId) {
        let next = match after {
            Some(prev) => self.pages[prev].next,
            None => self.head,
        };

        self.pages[id].prev = after;
        self.pages[id].next = next;

        match after {
            Some(prev) => self.pages[prev].next = Some(id),
            None => self.head = Some(id),
        }
        match next {
            Some(next) => self.pages[next].prev = Some(id),
            None => self.tail = Some(id),
        }
    }

    fn unlink(&mut self, id: PageId) {
        let Page { prev, next, .. } = std::mem::take(&mut self.pages[id]);

        match prev {
            Some(prev) => self.pages[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.pages[next].prev = prev,
            None => self.tail = prev,
        }

        self.free.push(id);
    }

    // ========================================================================
    // Ends
    // ========================================================================

    /// Inserts `value` before the first element.
    pub fn push_front(&mut self, value: Bytes) {
        match self.head {
            Some(id) if self.pages[id].items.len() < self.page_size => {
                self.pages[id].items.insert(0, value);
            }
            _ => {
                let id = self.alloc_page(vec![value]);
                self.link_after(None, id);
            }
        }
        self.len += 1;
    }

    /// Appends `value` after the last element.
    pub fn push_back(&mut self, value: Bytes) {
        match self.tail {
            Some(id) if self.pages[id].items.len() < self.page_size => {
                self.pages[id].items.push(value);
            }
            tail => {
                let id = self.alloc_page(vec![value]);
                self.link_after(tail, id);
            }
        }
        self.len += 1;
    }

    pub fn pop_front(&mut self) -> Option<Bytes> {
        let mut cursor = self.next(Cursor::BeforeStart);
        self.remove_at(&mut cursor)
    }

    pub fn pop_back(&mut self) -> Option<Bytes> {
        let mut cursor = self.prev(Cursor::AfterEnd);
        self.remove_at(&mut cursor)
    }

    // ========================================================================
    // Cursors
    // ========================================================================

    /// Locates the element at `index` (0-based from the head).
    ///
    /// Walks from whichever end is closer. Returns [`Cursor::AfterEnd`] when
    /// `index` is out of range.
    pub fn find(&self, index: usize) -> Cursor {
        if index >= self.len {
            return Cursor::AfterEnd;
        }

        if index < self.len / 2 {
            let mut skipped = 0;
            let mut current = self.head;
            while let Some(id) = current {
                let count = self.pages[id].items.len();
                if index < skipped + count {
                    return Cursor::At {
                        page: id,
                        offset: index - skipped,
                    };
                }
                skipped += count;
                current = self.pages[id].next;
            }
        } else {
            // `end` is the index one past the last element of the current page.
            let mut end = self.len;
            let mut current = self.tail;
            while let Some(id) = current {
                let start = end - self.pages[id].items.len();
                if index >= start {
                    return Cursor::At {
                        page: id,
                        offset: index - start,
                    };
                }
                end = start;
                current = self.pages[id].prev;
            }
        }

        Cursor::AfterEnd
    }

    /// Element under the cursor, or `None` on a sentinel.
    pub fn get(&self, cursor: Cursor) -> Option<&Bytes> {
        match cursor {
            Cursor::At { page, offset } => self.pages.get(page)?.items.get(offset),
            _ => None,
        }
    }

    /// Cursor on the element after `cursor`.
    pub fn next(&self, cursor: Cursor) -> Cursor {
        match cursor {
            Cursor::BeforeStart => match self.head {
                Some(page) => Cursor::At { page, offset: 0 },
                None => Cursor::AfterEnd,
            },
            Cursor::At { page, offset } => {
                if offset + 1 < self.pages[page].items.len() {
                    Cursor::At {
                        page,
                        offset: offset + 1,
                    }
                } else {
                    self.page_start(self.pages[page].next)
                }
            }
            Cursor::AfterEnd => Cursor::AfterEnd,
        }
    }

    /// Cursor on the element before `cursor`.
    pub fn prev(&self, cursor: Cursor) -> Cursor {
        match cursor {
            Cursor::AfterEnd => self.page_end(self.tail),
            Cursor::At { page, offset } => {
                if offset > 0 {
                    Cursor::At {
                        page,
                        offset: offset - 1,
                    }
                } else {
                    self.page_end(self.pages[page].prev)
                }
            }
            Cursor::BeforeStart => Cursor::BeforeStart,
        }
    }

    fn page_start(&self, page: Option<PageId>) -> Cursor {
        match page {
            Some(page) => Cursor::At { page, offset: 0 },
            None => Cursor::AfterEnd,
        }
    }

    fn page_end(&self, page: Option<PageId>) -> Cursor {
        match page {
            Some(page) => Cursor::At {
                page,
                offset: self.pages[page].items.len() - 1,
            },
            None => Cursor::BeforeStart,
        }
    }

    /// Removes the element under `cursor` and moves the cursor to the element
    /// that followed it (or [`Cursor::AfterEnd`]).
    ///
    /// A page emptied by the removal is unlinked and returned to the arena.
    pub fn remove_at(&mut self, cursor: &mut Cursor) -> Option<Bytes> {
        let Cursor::At { page, offset } = *cursor else {
            return None;
        };
        if offset >= self.pages[page].items.len() {
            return None;
        }

        let value = self.pages[page].items.remove(offset);
        self.len -= 1;

        let remaining = self.pages[page].items.len();
        let next_page = self.pages[page].next;

        if remaining == 0 {
            self.unlink(page);
            *cursor = self.page_start(next_page);
        } else if offset == remaining {
            *cursor = self.page_start(next_page);
        }

        Some(value)
    }

    /// Inserts `value` so that it ends up at position `index`.
    ///
    /// A full page is split in half first. Returns `false` if `index` is
    /// greater than the length.
    pub fn insert(&mut self, index: usize, value: Bytes) -> bool {
        if index > self.len {
            return false;
        }
        if index == self.len {
            self.push_back(value);
            return true;
        }

        let Cursor::At { page, offset } = self.find(index) else {
            return false;
        };

        if self.pages[page].items.len() < self.page_size {
            self.pages[page].items.insert(offset, value);
        } else {
            let half = self.page_size / 2;
            let upper = self.pages[page].items.split_off(half);
            let sibling = self.alloc_page(upper);
            self.link_after(Some(page), sibling);

            if offset < half {
                self.pages[page].items.insert(offset, value);
            } else {
                self.pages[sibling].items.insert(offset - half, value);
            }
        }

        self.len += 1;
        true
    }

    // ========================================================================
    // Positional helpers
    // ========================================================================

    /// Resolves a possibly negative index (-1 is the last element).
    fn resolve(&self, index: i64) -> Option<usize> {
        let len = self.len as i64;
        let index = if index < 0 { index + len } else { index };
        (0..len).contains(&index).then_some(index as usize)
    }

    /// Element at a possibly negative index.
    pub fn index(&self, index: i64) -> Option<&Bytes> {
        let index = self.resolve(index)?;
        self.get(self.find(index))
    }

    /// Replaces the element at a possibly negative index.
    pub fn set(&mut self, index: i64, value: Bytes) -> bool {
        let Some(index) = self.resolve(index) else {
            return false;
        };
        match self.find(index) {
            Cursor::At { page, offset } => {
                self.pages[page].items[offset] = value;
                true
            }
            _ => false,
        }
    }

    /// Clamps an inclusive `start..=stop` range with negative indexing.
    fn clamp_range(&self, start: i64, stop: i64) -> Option<(usize, usize)> {
        let len = self.len as i64;
        let start = if start < 0 { (start + len).max(0) } else { start };
        let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };

        if start > stop || start >= len {
            None
        } else {
            Some((start as usize, stop as usize))
        }
    }

    /// Elements in the inclusive range `start..=stop`.
    pub fn range(&self, start: i64, stop: i64) -> Vec<Bytes> {
        let Some((start, stop)) = self.clamp_range(start, stop) else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(stop - start + 1);
        let mut cursor = self.find(start);
        while out.len() < stop - start + 1 {
            match self.get(cursor) {
                Some(value) => out.push(value.clone()),
                None => break,
            }
            cursor = self.next(cursor);
        }
        out
    }

    /// Keeps only the inclusive range `start..=stop`.
    pub fn trim(&mut self, start: i64, stop: i64) {
        let Some((start, stop)) = self.clamp_range(start, stop) else {
            self.clear();
            return;
        };

        for _ in stop + 1..self.len {
            self.pop_back();
        }
        for _ in 0..start {
            self.pop_front();
        }
    }

    /// Removes occurrences of `value`.
    ///
    /// `count > 0` removes up to `count` from the head, `count < 0` up to
    /// `|count|` from the tail, and `0` removes all of them.
    pub fn remove_by_value(&mut self, value: &[u8], count: i64) -> usize {
        let limit = match count {
            0 => usize::MAX,
            n => n.unsigned_abs().try_into().unwrap_or(usize::MAX),
        };
        let from_tail = count < 0;

        let mut removed = 0;
        let mut cursor = if from_tail {
            self.prev(Cursor::AfterEnd)
        } else {
            self.next(Cursor::BeforeStart)
        };

        while removed < limit {
            let Some(item) = self.get(cursor) else {
                break;
            };

            if item.as_ref() == value {
                self.remove_at(&mut cursor);
                removed += 1;
                if from_tail {
                    cursor = self.prev(cursor);
                }
            } else if from_tail {
                cursor = self.prev(cursor);
            } else {
                cursor = self.next(cursor);
            }
        }

        removed
    }

    /// Index of the first element equal to `value`.
    pub fn position(&self, value: &[u8]) -> Option<usize> {
        self.iter().position(|item| item.as_ref() == value)
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.next(Cursor::BeforeStart),
        }
    }
}

/// Head-to-tail iterator over a [`QuickList`].
pub struct Iter<'a> {
    list: &'a QuickList,
    cursor: Cursor,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.list.get(self.cursor)?;
        self.cursor = self.list.next(self.cursor);
        Some(item)
    }
}

impl Extend<Bytes> for QuickList {
    fn extend<I: IntoIterator<Item = Bytes>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl FromIterator<Bytes> for QuickList {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn contents(list: &QuickList) -> Vec<Bytes> {
        list.iter().cloned().collect()
    }

    /// Walks the page chain and verifies links, sizes and the cached length.
    fn check_structure(list: &QuickList) {
        let mut total = 0;
        let mut prev = None;
        let mut current = list.head;
        while let Some(id) = current {
            let page = &list.pages[id];
            assert_eq!(page.prev, prev, "broken back link at page {}", id);
            assert!(!page.items.is_empty(), "empty page {} left linked", id);
            assert!(page.items.len() <= list.page_size);
            total += page.items.len();
            prev = Some(id);
            current = page.next;
        }
        assert_eq!(list.tail, prev);
        assert_eq!(total, list.len());
    }

    #[test]
    fn test_push_and_pop_both_ends() {
        let mut list = QuickList::with_page_size(2);
        list.push_back(b("b"));
        list.push_back(b("c"));
        list.push_front(b("a"));
        list.push_back(b("d"));
        check_structure(&list);

        assert_eq!(contents(&list), vec![b("a"), b("b"), b("c"), b("d")]);
        assert_eq!(list.page_count(), 3);

        assert_eq!(list.pop_front(), Some(b("a")));
        assert_eq!(list.pop_back(), Some(b("d")));
        assert_eq!(list.pop_back(), Some(b("c")));
        assert_eq!(list.pop_back(), Some(b("b")));
        assert_eq!(list.pop_back(), None);
        assert!(list.is_empty());
        assert_eq!(list.page_count(), 0);
    }

    #[test]
    fn test_find_from_both_ends() {
        let list: QuickList = (0..50).map(|i| b(&i.to_string())).collect();
        for i in 0..50 {
            assert_eq!(list.get(list.find(i)), Some(&b(&i.to_string())));
        }
        assert_eq!(list.find(50), Cursor::AfterEnd);
    }

    #[test]
    fn test_cursor_sentinels() {
        let mut list = QuickList::with_page_size(2);
        assert_eq!(list.next(Cursor::BeforeStart), Cursor::AfterEnd);
        assert_eq!(list.prev(Cursor::AfterEnd), Cursor::BeforeStart);

        list.extend([b("x"), b("y"), b("z")]);
        let first = list.next(Cursor::BeforeStart);
        let last = list.prev(Cursor::AfterEnd);
        assert_eq!(list.get(first), Some(&b("x")));
        assert_eq!(list.get(last), Some(&b("z")));
        assert_eq!(list.prev(first), Cursor::BeforeStart);
        assert_eq!(list.next(last), Cursor::AfterEnd);
    }

    #[test]
    fn test_remove_at_moves_to_following_element() {
        let mut list = QuickList::with_page_size(2);
        list.extend([b("a"), b("b"), b("c"), b("d")]);

        // "b" is the last element of the first page.
        let mut cursor = list.find(1);
        assert_eq!(list.remove_at(&mut cursor), Some(b("b")));
        assert_eq!(list.get(cursor), Some(&b("c")));

        // Emptying a page unlinks it.
        let mut cursor = list.find(0);
        assert_eq!(list.remove_at(&mut cursor), Some(b("a")));
        assert_eq!(list.get(cursor), Some(&b("c")));
        check_structure(&list);

        let mut cursor = list.find(1);
        assert_eq!(list.remove_at(&mut cursor), Some(b("d")));
        assert_eq!(cursor, Cursor::AfterEnd);
        assert_eq!(list.remove_at(&mut cursor), None);
        check_structure(&list);
    }

    #[test]
    fn test_insert_splits_full_page() {
        let mut list = QuickList::with_page_size(4);
        list.extend([b("a"), b("b"), b("c"), b("d")]);
        assert_eq!(list.page_count(), 1);

        assert!(list.insert(1, b("x")));
        assert_eq!(list.page_count(), 2);
        assert_eq!(
            contents(&list),
            vec![b("a"), b("x"), b("b"), b("c"), b("d")]
        );

        assert!(list.insert(5, b("end")));
        assert!(!list.insert(7, b("nope")));
        check_structure(&list);
    }

    #[test]
    fn test_range_clamping() {
        let list: QuickList = ["a", "b", "c", "d", "e"].iter().map(|s| b(s)).collect();

        assert_eq!(list.range(0, -1).len(), 5);
        assert_eq!(list.range(1, 2), vec![b("b"), b("c")]);
        assert_eq!(list.range(-2, -1), vec![b("d"), b("e")]);
        assert_eq!(list.range(-100, 1), vec![b("a"), b("b")]);
        assert_eq!(list.range(3, 100), vec![b("d"), b("e")]);
        assert!(list.range(4, 2).is_empty());
        assert!(list.range(10, 20).is_empty());
    }

    #[test]
    fn test_remove_by_value_directions() {
        let make = || -> QuickList {
            ["a", "x", "b", "x", "c", "x"]
                .iter()
                .map(|s| b(s))
                .collect()
        };

        let mut list = make();
        assert_eq!(list.remove_by_value(b"x", 2), 2);
        assert_eq!(contents(&list), vec![b("a"), b("b"), b("c"), b("x")]);

        let mut list = make();
        assert_eq!(list.remove_by_value(b"x", -2), 2);
        assert_eq!(contents(&list), vec![b("a"), b("x"), b("b"), b("c")]);

        let mut list = make();
        assert_eq!(list.remove_by_value(b"x", 0), 3);
        assert_eq!(contents(&list), vec![b("a"), b("b"), b("c")]);

        assert_eq!(list.remove_by_value(b"missing", 0), 0);
    }

    #[test]
    fn test_index_set_trim_position() {
        let mut list: QuickList = ["a", "b", "c", "d"].iter().map(|s| b(s)).collect();

        assert_eq!(list.index(-1), Some(&b("d")));
        assert_eq!(list.index(4), None);
        assert!(list.set(-2, b("C")));
        assert!(!list.set(9, b("z")));
        assert_eq!(list.position(b"C"), Some(2));

        list.trim(1, -2);
        assert_eq!(contents(&list), vec![b("b"), b("C")]);

        list.trim(5, 10);
        assert!(list.is_empty());
    }

    #[test]
    fn test_random_operations_match_vec_model() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut list = QuickList::with_page_size(4);
        let mut model: Vec<Bytes> = Vec::new();

        for step in 0..5000 {
            let value = b(&rng.gen_range(0..8).to_string());
            match rng.gen_range(0..7) {
                0 => {
                    list.push_front(value.clone());
                    model.insert(0, value);
                }
                1 => {
                    list.push_back(value.clone());
                    model.push(value);
                }
                2 => assert_eq!(list.pop_front(), (!model.is_empty()).then(|| model.remove(0))),
                3 => assert_eq!(list.pop_back(), model.pop()),
                4 => {
                    let index = rng.gen_range(0..=model.len());
                    assert!(list.insert(index, value.clone()));
                    model.insert(index, value);
                }
                5 => {
                    let count = rng.gen_range(-2..=2);
                    let removed = list.remove_by_value(&value, count);
                    let expected = remove_from_model(&mut model, &value, count);
                    assert_eq!(removed, expected);
                }
                _ => {
                    if !model.is_empty() {
                        let index = rng.gen_range(0..model.len());
                        assert_eq!(list.index(index as i64), Some(&model[index]));
                    }
                }
            }

            assert_eq!(list.len(), model.len(), "length diverged at step {}", step);
            if step % 250 == 0 {
                check_structure(&list);
                assert_eq!(contents(&list), model);
            }
        }

        check_structure(&list);
        assert_eq!(contents(&list), model);
    }

    fn remove_from_model(model: &mut Vec<Bytes>, value: &Bytes, count: i64) -> usize {
        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0;
        if count >= 0 {
            let mut i = 0;
            while i < model.len() && removed < limit {
                if &model[i] == value {
                    model.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = model.len();
            while i > 0 && removed < limit {
                i -= 1;
                if &model[i] == value {
                    model.remove(i);
                    removed += 1;
                }
            }
        }
        removed
    }
}
