//! Positional cursors for `SegmentedDeque`.
//!
//! All navigation lives in [`RawCursor`]: a position is a map slot, the row
//! that slot points at, and an offset inside that row. Moving by any distance
//! costs O(1) no matter how many rows are crossed. [`Cursor`] and
//! [`CursorMut`] are thin borrowing wrappers that add bounds checks.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use allocator_api2::alloc::{Allocator, Global};

use crate::raw_map::ROW_SIZE;
use crate::SegmentedDeque;

const ROW: isize = ROW_SIZE as isize;

/// Unchecked position inside a map of rows.
///
/// A valid cursor satisfies `offset < ROW_SIZE` and `row == *node`. The
/// singular cursor has null pointers and must never be moved or read.
pub(crate) struct RawCursor<T> {
    /// Slot in the map holding the current row
    pub(crate) node: *mut *mut T,
    /// First element of the current row
    pub(crate) row: *mut T,
    /// Position inside the current row
    pub(crate) offset: usize,
}

impl<T> Clone for RawCursor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RawCursor<T> {}

impl<T> RawCursor<T> {
    pub(crate) const fn singular() -> Self {
        Self {
            node: std::ptr::null_mut(),
            row: std::ptr::null_mut(),
            offset: 0,
        }
    }

    #[inline]
    pub(crate) fn is_singular(&self) -> bool {
        self.node.is_null()
    }

    /// Creates a cursor at `offset` inside the row held by `node`.
    ///
    /// # Safety
    ///
    /// `node` must point to a slot holding an allocated row.
    #[inline]
    pub(crate) unsafe fn at(node: *mut *mut T, offset: usize) -> Self {
        debug_assert!(offset < ROW_SIZE);
        Self {
            node,
            row: *node,
            offset,
        }
    }

    /// Pointer to the current cell.
    #[inline]
    pub(crate) fn ptr(&self) -> *mut T {
        self.row.wrapping_add(self.offset)
    }

    /// Moves the cursor to another slot, keeping the row and offset.
    ///
    /// Used after the map array is reallocated.
    #[inline]
    pub(crate) fn rebase(&mut self, node: *mut *mut T) {
        self.node = node;
    }

    /// Returns the cursor `delta` cells away.
    ///
    /// # Safety
    ///
    /// The target cell must lie in a row of the same map.
    pub(crate) unsafe fn offset_by(self, delta: isize) -> Self {
        let offset = delta + self.offset as isize;
        if (0..ROW).contains(&offset) {
            return Self {
                offset: offset as usize,
                ..self
            };
        }
        // Floor division, so negative offsets land in the row before.
        let row_delta = if offset > 0 {
            offset / ROW
        } else {
            -((-offset - 1) / ROW) - 1
        };
        Self::at(
            self.node.offset(row_delta),
            (offset - row_delta * ROW) as usize,
        )
    }

    /// Returns the cursor one cell forward.
    ///
    /// # Safety
    ///
    /// Same as [`offset_by`](Self::offset_by).
    #[inline]
    pub(crate) unsafe fn next(self) -> Self {
        if self.offset + 1 < ROW_SIZE {
            Self {
                offset: self.offset + 1,
                ..self
            }
        } else {
            Self::at(self.node.add(1), 0)
        }
    }

    /// Returns the cursor one cell back.
    ///
    /// # Safety
    ///
    /// Same as [`offset_by`](Self::offset_by).
    #[inline]
    pub(crate) unsafe fn prev(self) -> Self {
        if self.offset > 0 {
            Self {
                offset: self.offset - 1,
                ..self
            }
        } else {
            Self::at(self.node.sub(1), ROW_SIZE - 1)
        }
    }

    /// Number of cells from `origin` to `self`.
    ///
    /// # Safety
    ///
    /// Both cursors must belong to the same map.
    #[inline]
    pub(crate) unsafe fn distance(&self, origin: &Self) -> isize {
        self.node.offset_from(origin.node) * ROW + self.offset as isize - origin.offset as isize
    }

    /// Orders positions by slot, then by offset.
    ///
    /// The map is one contiguous array kept in sequence order, so slot
    /// addresses order the same way as slot indices.
    #[inline]
    pub(crate) fn position_cmp(&self, other: &Self) -> Ordering {
        self.node
            .cmp(&other.node)
            .then(self.offset.cmp(&other.offset))
    }

    #[inline]
    pub(crate) fn same_position(&self, other: &Self) -> bool {
        self.node == other.node && self.offset == other.offset
    }
}

/// A read-only cursor into a `SegmentedDeque`.
///
/// A cursor points at an element or at the end position one past the last
/// element. It behaves like a random-access iterator: it can be moved by any
/// signed distance in O(1), compared, and subtracted from another cursor of
/// the same deque.
///
/// `Cursor::default()` is singular. Reading, moving or comparing a singular
/// cursor panics, as does moving any cursor outside `[begin, end]`.
///
/// # Example
///
/// ```
/// use segmented_deque::SegmentedDeque;
///
/// let deque: SegmentedDeque<i32> = (0..1000).collect();
/// let mut cursor = deque.begin() + 500;
/// assert_eq!(cursor.get(), Some(&500));
/// cursor -= 300;
/// assert_eq!(cursor.get(), Some(&200));
/// assert_eq!(deque.end() - cursor, 800);
/// ```
pub struct Cursor<'a, T, A: Allocator = Global> {
    deque: Option<&'a SegmentedDeque<T, A>>,
    raw: RawCursor<T>,
}

impl<'a, T, A: Allocator> Cursor<'a, T, A> {
    #[inline]
    pub(crate) fn new(deque: &'a SegmentedDeque<T, A>, raw: RawCursor<T>) -> Self {
        Self {
            deque: Some(deque),
            raw,
        }
    }

    fn attached(&self) -> &'a SegmentedDeque<T, A> {
        match self.deque {
            Some(deque) => deque,
            None => panic!("use of a singular cursor"),
        }
    }

    /// Returns `true` if this cursor was default-constructed.
    #[inline]
    pub fn is_singular(&self) -> bool {
        self.deque.is_none()
    }

    /// Returns the logical index of the cursor; `len()` for the end position.
    pub fn index(&self) -> usize {
        let deque = self.attached();
        unsafe { self.raw.distance(&deque.start) as usize }
    }

    /// Returns the element under the cursor, or `None` at the end position.
    pub fn get(&self) -> Option<&'a T> {
        let deque = self.attached();
        if self.index() < deque.len() {
            Some(unsafe { &*self.raw.ptr() })
        } else {
            None
        }
    }

    /// Moves the cursor by `delta` positions.
    ///
    /// # Panics
    ///
    /// Panics if the target lies outside `[0, len()]`.
    pub fn seek(&mut self, delta: isize) {
        let deque = self.attached();
        check_target(self.index(), delta, deque.len());
        self.raw = unsafe { self.raw.offset_by(delta) };
    }

    /// Advances the cursor by one position.
    #[inline]
    pub fn move_next(&mut self) {
        self.seek(1);
    }

    /// Moves the cursor back by one position.
    #[inline]
    pub fn move_prev(&mut self) {
        self.seek(-1);
    }

    fn same_deque(&self, other: &Self) -> bool {
        std::ptr::eq(self.attached(), other.attached())
    }
}

fn check_target(index: usize, delta: isize, len: usize) {
    match (index as isize).checked_add(delta) {
        Some(target) if target >= 0 && target as usize <= len => {}
        _ => moved_out_of_range(index, delta, len),
    }
}

/// Moving back by `delta` is moving forward by `-delta`, when that exists.
fn negate_delta(index: usize, delta: isize, len: usize) -> isize {
    delta
        .checked_neg()
        .unwrap_or_else(|| moved_out_of_range(index, delta, len))
}

#[cold]
fn moved_out_of_range(index: usize, delta: isize, len: usize) -> ! {
    panic!("cursor at {index} moved by {delta}, outside the live range 0..={len}")
}

impl<T, A: Allocator> Default for Cursor<'_, T, A> {
    /// Creates a singular cursor.
    fn default() -> Self {
        Self {
            deque: None,
            raw: RawCursor::singular(),
        }
    }
}

impl<T, A: Allocator> Clone for Cursor<'_, T, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, A: Allocator> Copy for Cursor<'_, T, A> {}

impl<T, A: Allocator> PartialEq for Cursor<'_, T, A> {
    fn eq(&self, other: &Self) -> bool {
        self.same_deque(other) && self.raw.same_position(&other.raw)
    }
}

impl<T, A: Allocator> Eq for Cursor<'_, T, A> {}

impl<T, A: Allocator> PartialOrd for Cursor<'_, T, A> {
    /// Cursors of different deques are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.same_deque(other) {
            Some(self.raw.position_cmp(&other.raw))
        } else {
            None
        }
    }
}

impl<T, A: Allocator> AddAssign<isize> for Cursor<'_, T, A> {
    fn add_assign(&mut self, delta: isize) {
        self.seek(delta);
    }
}

impl<T, A: Allocator> SubAssign<isize> for Cursor<'_, T, A> {
    fn sub_assign(&mut self, delta: isize) {
        let len = self.attached().len();
        self.seek(negate_delta(self.index(), delta, len));
    }
}

impl<T, A: Allocator> Add<isize> for Cursor<'_, T, A> {
    type Output = Self;

    fn add(mut self, delta: isize) -> Self {
        self += delta;
        self
    }
}

impl<T, A: Allocator> Sub<isize> for Cursor<'_, T, A> {
    type Output = Self;

    fn sub(mut self, delta: isize) -> Self {
        self -= delta;
        self
    }
}

impl<T, A: Allocator> Sub for Cursor<'_, T, A> {
    type Output = isize;

    /// Signed distance between two cursors of the same deque.
    ///
    /// # Panics
    ///
    /// Panics if the cursors belong to different deques.
    fn sub(self, origin: Self) -> isize {
        assert!(
            self.same_deque(&origin),
            "subtracted cursors of different deques"
        );
        unsafe { self.raw.distance(&origin.raw) }
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for Cursor<'_, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_singular() {
            return f.write_str("Cursor(singular)");
        }
        f.debug_struct("Cursor")
            .field("index", &self.index())
            .field("current", &self.get())
            .finish()
    }
}

/// A cursor with mutable access to a `SegmentedDeque`.
///
/// Besides navigation it can edit the element under it and insert or remove
/// at its position. Holding a `CursorMut` borrows the deque exclusively.
///
/// # Example
///
/// ```
/// use segmented_deque::SegmentedDeque;
///
/// let mut deque: SegmentedDeque<i32> = (0..5).collect();
/// let mut cursor = deque.begin_mut();
/// cursor.seek(2);
/// cursor.insert(100);
/// *cursor.get_mut().unwrap() += 1;
/// cursor.move_next();
/// assert_eq!(cursor.remove_current(), Some(2));
/// assert_eq!(deque, [0, 1, 101, 3, 4]);
/// ```
pub struct CursorMut<'a, T, A: Allocator = Global> {
    deque: &'a mut SegmentedDeque<T, A>,
    raw: RawCursor<T>,
}

impl<'a, T, A: Allocator> CursorMut<'a, T, A> {
    #[inline]
    pub(crate) fn new(deque: &'a mut SegmentedDeque<T, A>, raw: RawCursor<T>) -> Self {
        Self { deque, raw }
    }

    /// Returns the logical index of the cursor; `len()` for the end position.
    pub fn index(&self) -> usize {
        unsafe { self.raw.distance(&self.deque.start) as usize }
    }

    /// Returns the element under the cursor, or `None` at the end position.
    pub fn get(&self) -> Option<&T> {
        if self.index() < self.deque.len() {
            Some(unsafe { &*self.raw.ptr() })
        } else {
            None
        }
    }

    /// Returns the element under the cursor mutably, or `None` at the end position.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.index() < self.deque.len() {
            Some(unsafe { &mut *self.raw.ptr() })
        } else {
            None
        }
    }

    /// Moves the cursor by `delta` positions.
    ///
    /// # Panics
    ///
    /// Panics if the target lies outside `[0, len()]`.
    pub fn seek(&mut self, delta: isize) {
        check_target(self.index(), delta, self.deque.len());
        self.raw = unsafe { self.raw.offset_by(delta) };
    }

    /// Advances the cursor by one position.
    #[inline]
    pub fn move_next(&mut self) {
        self.seek(1);
    }

    /// Moves the cursor back by one position.
    #[inline]
    pub fn move_prev(&mut self) {
        self.seek(-1);
    }

    /// Inserts `value` before the current position.
    ///
    /// Afterwards the cursor points at the inserted element.
    pub fn insert(&mut self, value: T) {
        let index = self.index();
        self.deque.insert(index, value);
        self.raw = self.deque.raw_at(index);
    }

    /// Removes the element under the cursor and returns it.
    ///
    /// Afterwards the cursor points at the element that followed, or at the
    /// end position. Returns `None` if the cursor is at the end position.
    pub fn remove_current(&mut self) -> Option<T> {
        let index = self.index();
        let value = self.deque.remove(index)?;
        self.raw = self.deque.raw_at(index);
        Some(value)
    }

    /// Returns a read-only cursor at the same position.
    pub fn as_cursor(&self) -> Cursor<'_, T, A> {
        Cursor::new(self.deque, self.raw)
    }
}

impl<T, A: Allocator> AddAssign<isize> for CursorMut<'_, T, A> {
    fn add_assign(&mut self, delta: isize) {
        self.seek(delta);
    }
}

impl<T, A: Allocator> SubAssign<isize> for CursorMut<'_, T, A> {
    fn sub_assign(&mut self, delta: isize) {
        let delta = negate_delta(self.index(), delta, self.deque.len());
        self.seek(delta);
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for CursorMut<'_, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorMut")
            .field("index", &self.index())
            .field("current", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: i32) -> SegmentedDeque<i32> {
        (0..n).collect()
    }

    #[test]
    fn test_offset_by_within_row() {
        let deque = numbered(10);
        let raw = unsafe { deque.start.offset_by(3) };
        assert_eq!(raw.node, deque.start.node);
        assert_eq!(unsafe { *raw.ptr() }, 3);
    }

    #[test]
    fn test_offset_by_crosses_many_rows() {
        let deque = numbered(5000);
        for delta in [127isize, 128, 129, 1000, 4095, 4999] {
            let raw = unsafe { deque.start.offset_by(delta) };
            assert_eq!(unsafe { *raw.ptr() }, delta as i32);
            assert!(raw.offset < ROW_SIZE);
        }
    }

    #[test]
    fn test_offset_by_negative_crosses_rows() {
        let deque = numbered(5000);
        let last = unsafe { deque.finish.prev() };
        for delta in [1isize, 127, 128, 129, 1000, 4999] {
            let raw = unsafe { last.offset_by(-delta) };
            assert_eq!(unsafe { *raw.ptr() }, 4999 - delta as i32);
            assert!(raw.offset < ROW_SIZE);
        }
    }

    #[test]
    fn test_negative_offset_at_exact_row_boundary() {
        let deque = numbered(1000);
        let raw = unsafe { deque.start.offset_by(256) };
        let back = unsafe { raw.offset_by(-(raw.offset as isize) - 1) };
        assert_eq!(back.offset, ROW_SIZE - 1);
        assert_eq!(back.node, unsafe { raw.node.sub(1) });
    }

    #[test]
    fn test_next_prev_match_offset_by() {
        let deque = numbered(600);
        let mut raw = deque.start;
        for i in 0..600 {
            assert!(raw.same_position(unsafe { &deque.start.offset_by(i) }));
            raw = unsafe { raw.next() };
        }
        assert!(raw.same_position(&deque.finish));
        for _ in 0..600 {
            raw = unsafe { raw.prev() };
        }
        assert!(raw.same_position(&deque.start));
    }

    #[test]
    fn test_distance() {
        let deque = numbered(1000);
        let a = unsafe { deque.start.offset_by(10) };
        let b = unsafe { deque.start.offset_by(700) };
        assert_eq!(unsafe { b.distance(&a) }, 690);
        assert_eq!(unsafe { a.distance(&b) }, -690);
        assert_eq!(unsafe { deque.finish.distance(&deque.start) }, 1000);
    }

    #[test]
    fn test_cursor_arithmetic() {
        let deque = numbered(1000);
        let begin = deque.begin();
        let mut c = begin + 300;
        assert_eq!(c.get(), Some(&300));
        c += 200;
        assert_eq!(c.index(), 500);
        c -= 499;
        assert_eq!(c.get(), Some(&1));
        assert_eq!((c - 1), begin);
        assert_eq!(deque.end() - begin, 1000);
        assert_eq!(begin - deque.end(), -1000);
    }

    #[test]
    fn test_cursor_ordering() {
        let deque = numbered(500);
        let a = deque.begin() + 100;
        let b = deque.begin() + 300;
        assert!(a < b);
        assert!(b > a);
        assert!(a <= a);
        assert!(deque.begin() < deque.end());
        assert_ne!(a, b);
        assert_eq!(a + 200, b);
    }

    #[test]
    fn test_cursors_of_different_deques_are_unordered() {
        let x = numbered(10);
        let y = numbered(10);
        assert_ne!(x.begin(), y.begin());
        assert_eq!(x.begin().partial_cmp(&y.begin()), None);
    }

    #[test]
    fn test_end_cursor_reads_none() {
        let deque = numbered(128);
        assert_eq!(deque.end().get(), None);
        assert_eq!(deque.end().index(), 128);
        let mut c = deque.end();
        c.move_prev();
        assert_eq!(c.get(), Some(&127));
    }

    #[test]
    fn test_empty_deque_begin_equals_end() {
        let deque: SegmentedDeque<i32> = SegmentedDeque::new();
        assert_eq!(deque.begin(), deque.end());
        assert_eq!(deque.begin().get(), None);
    }

    #[test]
    fn test_index_agreement() {
        let mut deque = SegmentedDeque::new();
        for i in 0..700 {
            if i % 3 == 0 {
                deque.push_front(i);
            } else {
                deque.push_back(i);
            }
        }
        for i in 0..deque.len() {
            let via_cursor = (deque.begin() + i as isize).get().unwrap();
            assert!(std::ptr::eq(via_cursor, &deque[i]));
        }
    }

    #[test]
    #[should_panic(expected = "singular")]
    fn test_singular_cursor_read_panics() {
        let c: Cursor<'_, i32> = Cursor::default();
        let _ = c.get();
    }

    #[test]
    #[should_panic(expected = "singular")]
    fn test_singular_cursor_compare_panics() {
        let deque = numbered(3);
        let c: Cursor<'_, i32> = Cursor::default();
        let _ = c == deque.begin();
    }

    #[test]
    #[should_panic(expected = "outside the live range")]
    fn test_moving_past_end_panics() {
        let deque = numbered(3);
        let _ = deque.end() + 1;
    }

    #[test]
    #[should_panic(expected = "outside the live range")]
    fn test_moving_before_begin_panics() {
        let deque = numbered(3);
        let _ = deque.begin() - 1;
    }

    #[test]
    #[should_panic(expected = "outside the live range")]
    fn test_moving_by_isize_max_panics() {
        let deque = numbered(3);
        let _ = deque.end() + isize::MAX;
    }

    #[test]
    #[should_panic(expected = "outside the live range")]
    fn test_moving_back_by_isize_min_panics() {
        let deque = numbered(3);
        let _ = deque.begin() - isize::MIN;
    }

    #[test]
    #[should_panic(expected = "outside the live range")]
    fn test_cursor_mut_moving_back_by_isize_min_panics() {
        let mut deque = numbered(3);
        let mut c = deque.end_mut();
        c -= isize::MIN;
    }

    #[test]
    fn test_moving_by_whole_range_in_one_step() {
        let deque = numbered(1000);
        let mut c = deque.end();
        c -= 1000;
        assert_eq!(c, deque.begin());
        c += 1000;
        assert_eq!(c, deque.end());
    }

    #[test]
    fn test_cursor_mut_edits() {
        let mut deque = numbered(300);
        let mut c = deque.begin_mut();
        c += 250;
        *c.get_mut().unwrap() = -1;
        c.move_prev();
        assert_eq!(c.get(), Some(&249));
        assert_eq!(c.as_cursor().index(), 249);
        assert_eq!(deque[250], -1);
    }

    #[test]
    fn test_cursor_mut_insert_and_remove() {
        let mut deque = numbered(300);
        let mut c = deque.begin_mut();
        c.seek(10);
        c.insert(-5);
        assert_eq!(c.get(), Some(&-5));
        assert_eq!(c.index(), 10);
        assert_eq!(c.remove_current(), Some(-5));
        assert_eq!(c.get(), Some(&10));

        let mut end = deque.end_mut();
        assert_eq!(end.remove_current(), None);
        end.insert(300);
        assert_eq!(end.index(), 300);
        assert_eq!(deque.len(), 301);
        assert!(deque.iter().copied().eq(0..301));
    }

    #[test]
    fn test_cursor_survives_map_growth_through_insert() {
        let mut deque = numbered(63);
        let mut c = deque.end_mut();
        for i in 63..1000 {
            c.insert(i);
            c.move_next();
        }
        assert_eq!(c.index(), 1000);
        assert!(deque.iter().copied().eq(0..1000));
    }
}
