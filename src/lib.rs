//! A double-ended queue backed by a map of fixed-size rows.
//!
//! `SegmentedDeque` stores elements in rows of [`ROW_SIZE`] elements. A small
//! contiguous map holds pointers to the rows. Pushing at either end never
//! moves existing elements: when the live range reaches the edge of the map,
//! only the array of row pointers is reallocated.
//!
//! # Example
//!
//! ```
//! use segmented_deque::SegmentedDeque;
//!
//! let mut deque = SegmentedDeque::new();
//! deque.push_back(2);
//! deque.push_front(1);
//! deque.push_back(3);
//! assert_eq!(deque[0], 1);
//! assert_eq!(deque.back(), Some(&3));
//!
//! // Get a pointer to an element
//! let ptr = &deque[1] as *const i32;
//!
//! // Push at both ends - the element stays where it is
//! for i in 0..10_000 {
//!     deque.push_front(-i);
//!     deque.push_back(i);
//! }
//! assert_eq!(unsafe { *ptr }, 2);
//! ```

mod cursor;
mod into_iter;
mod iter;
mod raw_map;

use allocator_api2::alloc::{Allocator, Global};
pub use cursor::{Cursor, CursorMut};
pub use into_iter::IntoIter;
pub use iter::{Iter, IterMut};
pub use raw_map::{MAP_GROWTH_FACTOR, ROW_SIZE};

use cursor::RawCursor;
use raw_map::RawMap;
use std::alloc::Layout;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::ptr;

/// The error type for operations that allocate.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TryReserveError {
    kind: TryReserveErrorKind,
}

#[derive(Clone, PartialEq, Eq, Debug)]
enum TryReserveErrorKind {
    /// The capacity computation overflowed.
    CapacityOverflow,
    /// Memory allocation failed.
    AllocError { layout: Layout },
}

impl std::fmt::Display for TryReserveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TryReserveErrorKind::CapacityOverflow => {
                write!(f, "memory allocation failed due to capacity overflow")
            }
            TryReserveErrorKind::AllocError { layout } => {
                write!(f, "memory allocation of {} bytes failed", layout.size())
            }
        }
    }
}

impl std::error::Error for TryReserveError {}

impl TryReserveError {
    pub(crate) fn capacity_overflow() -> Self {
        Self {
            kind: TryReserveErrorKind::CapacityOverflow,
        }
    }

    pub(crate) fn alloc_error(layout: Layout) -> Self {
        Self {
            kind: TryReserveErrorKind::AllocError { layout },
        }
    }

    /// Reports the failure the way infallible collection methods do.
    pub(crate) fn handle(self) -> ! {
        match self.kind {
            TryReserveErrorKind::CapacityOverflow => panic!("capacity overflow"),
            TryReserveErrorKind::AllocError { layout } => std::alloc::handle_alloc_error(layout),
        }
    }
}

/// The error returned by [`SegmentedDeque::at`] for an index past the end.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OutOfRange {
    index: usize,
    size: usize,
}

impl OutOfRange {
    /// The index that was requested.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The length of the deque at the time of the request.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl std::fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "index {} is out of range for a deque of length {}",
            self.index, self.size
        )
    }
}

impl std::error::Error for OutOfRange {}

/// A double-ended queue with O(1) random access.
///
/// `SegmentedDeque` keeps its elements in rows of `ROW_SIZE` cells. The map
/// is an array of row pointers in sequence order; the live elements occupy
/// the cells between two cursors, `begin` and `end`.
///
/// # Memory Layout
///
/// - An empty deque owns one row, with both cursors at its midpoint, so the
///   first pushes are equally cheap at either end.
/// - When a push would step off the first or last row and the live rows
///   fill at most half of the map, the row pointers are rotated so the spare
///   rows left behind by pops surround the live range again.
/// - Otherwise the map grows by [`MAP_GROWTH_FACTOR`]: fresh rows are added
///   on both sides and the existing row pointers move to the middle.
/// - Either way elements never move, so a deque used as a queue keeps a map
///   proportional to its length, not to the number of pushes.
/// - Rows are only released by [`clear`](SegmentedDeque::clear),
///   [`shrink_to_fit`](SegmentedDeque::shrink_to_fit) and drop.
pub struct SegmentedDeque<T, A: Allocator = Global> {
    /// Map of rows
    pub(crate) buf: RawMap<T, A>,
    /// Position of the first element
    pub(crate) start: RawCursor<T>,
    /// Position one past the last element
    pub(crate) finish: RawCursor<T>,
    /// Number of initialized elements
    len: usize,
    /// Marker for drop check
    _marker: PhantomData<T>,
}

impl<T> SegmentedDeque<T> {
    /// Creates a new empty `SegmentedDeque`.
    ///
    /// Allocates a single row.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let deque: SegmentedDeque<i32> = SegmentedDeque::new();
    /// assert!(deque.is_empty());
    /// assert_eq!(deque.row_count(), 1);
    /// ```
    #[inline]
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates a deque holding `n` clones of `value`.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let deque = SegmentedDeque::from_elem(10, 5);
    /// assert_eq!(deque.len(), 10);
    /// assert!(deque.iter().all(|&x| x == 5));
    /// ```
    pub fn from_elem(n: usize, value: T) -> Self
    where
        T: Clone,
    {
        Self::from_elem_in(n, value, Global)
    }
}

// Core implementation
impl<T, A: Allocator> SegmentedDeque<T, A> {
    /// Creates a new empty deque in the given allocator.
    ///
    /// # Panics
    ///
    /// Panics if allocation fails.
    pub fn new_in(alloc: A) -> Self {
        Self::try_new_in(alloc).unwrap_or_else(|err| err.handle())
    }

    /// Creates a new empty deque, reporting allocation failure.
    pub fn try_new_in(alloc: A) -> Result<Self, TryReserveError> {
        Self::try_allocate_in(0, alloc)
    }

    /// Creates a deque holding `n` clones of `value` in the given allocator.
    ///
    /// # Panics
    ///
    /// Panics if allocation fails.
    pub fn from_elem_in(n: usize, value: T, alloc: A) -> Self
    where
        T: Clone,
    {
        Self::try_from_elem_in(n, value, alloc).unwrap_or_else(|err| err.handle())
    }

    /// Creates a deque holding `n` clones of `value`, reporting allocation failure.
    ///
    /// If a clone panics, the elements built so far are dropped and every
    /// row is released before the panic continues.
    pub fn try_from_elem_in(n: usize, value: T, alloc: A) -> Result<Self, TryReserveError>
    where
        T: Clone,
    {
        let mut deque = Self::try_allocate_in(n, alloc)?;
        unsafe { deque.extend_within_capacity(std::iter::repeat(value).take(n)) };
        Ok(deque)
    }

    /// Allocates an empty deque with room for `len` elements behind `begin`.
    ///
    /// The spare cells are split evenly between both ends of the row set.
    fn try_allocate_in(len: usize, alloc: A) -> Result<Self, TryReserveError> {
        // One extra row keeps the end position inside the map when `len` is
        // a multiple of ROW_SIZE.
        let rows = len / ROW_SIZE + 1;
        let buf = RawMap::try_with_rows_in(rows, alloc)?;
        let spare = rows * ROW_SIZE - len;
        let start = unsafe { RawCursor::at(buf.slot(0), spare / 2) };
        let deque = Self {
            buf,
            start,
            finish: start,
            len: 0,
            _marker: PhantomData,
        };
        debug_assert!(deque.valid());
        Ok(deque)
    }

    /// Returns the number of elements in the deque.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the deque contains no elements.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of rows currently allocated.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.buf.len()
    }

    /// Returns a reference to the underlying allocator.
    #[inline]
    pub fn allocator(&self) -> &A {
        self.buf.allocator()
    }

    /// Returns a cursor at the first element.
    #[inline]
    pub fn begin(&self) -> Cursor<'_, T, A> {
        Cursor::new(self, self.start)
    }

    /// Returns a cursor one past the last element.
    #[inline]
    pub fn end(&self) -> Cursor<'_, T, A> {
        Cursor::new(self, self.finish)
    }

    /// Returns a mutable cursor at the first element.
    #[inline]
    pub fn begin_mut(&mut self) -> CursorMut<'_, T, A> {
        let raw = self.start;
        CursorMut::new(self, raw)
    }

    /// Returns a mutable cursor one past the last element.
    #[inline]
    pub fn end_mut(&mut self) -> CursorMut<'_, T, A> {
        let raw = self.finish;
        CursorMut::new(self, raw)
    }

    /// Returns an iterator over references to the elements.
    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            front: self.start,
            back: self.finish,
            remaining: self.len,
            _marker: PhantomData,
        }
    }

    /// Returns an iterator over mutable references to the elements.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            front: self.start,
            back: self.finish,
            remaining: self.len,
            _marker: PhantomData,
        }
    }

    /// Position of the logical `index`; `len` gives the end position.
    #[inline]
    pub(crate) fn raw_at(&self, index: usize) -> RawCursor<T> {
        debug_assert!(index <= self.len);
        unsafe { self.start.offset_by(index as isize) }
    }

    /// Returns a reference to the element at the given index.
    ///
    /// Returns `None` if the index is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len {
            Some(unsafe { self.get_unchecked(index) })
        } else {
            None
        }
    }

    /// Returns a mutable reference to the element at the given index.
    ///
    /// Returns `None` if the index is out of bounds.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.len {
            Some(unsafe { self.get_unchecked_mut(index) })
        } else {
            None
        }
    }

    /// Returns a reference to an element without bounds checking.
    ///
    /// # Safety
    ///
    /// `index` must be less than `self.len()`.
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        debug_assert!(index < self.len);
        &*self.raw_at(index).ptr()
    }

    /// Returns a mutable reference to an element without bounds checking.
    ///
    /// # Safety
    ///
    /// `index` must be less than `self.len()`.
    #[inline]
    pub unsafe fn get_unchecked_mut(&mut self, index: usize) -> &mut T {
        debug_assert!(index < self.len);
        &mut *self.raw_at(index).ptr()
    }

    /// Returns the element at `index`, or an [`OutOfRange`] error.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let deque = SegmentedDeque::from_elem(3, 'x');
    /// assert_eq!(deque.at(2), Ok(&'x'));
    /// let err = deque.at(3).unwrap_err();
    /// assert_eq!((err.index(), err.size()), (3, 3));
    /// ```
    pub fn at(&self, index: usize) -> Result<&T, OutOfRange> {
        let size = self.len;
        self.get(index).ok_or(OutOfRange { index, size })
    }

    /// Returns the element at `index` mutably, or an [`OutOfRange`] error.
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T, OutOfRange> {
        let size = self.len;
        self.get_mut(index).ok_or(OutOfRange { index, size })
    }

    /// Returns a reference to the first element, or `None` if empty.
    #[inline]
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// Returns a mutable reference to the first element, or `None` if empty.
    #[inline]
    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.get_mut(0)
    }

    /// Returns a reference to the last element, or `None` if empty.
    #[inline]
    pub fn back(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        Some(unsafe { &*self.finish.prev().ptr() })
    }

    /// Returns a mutable reference to the last element, or `None` if empty.
    #[inline]
    pub fn back_mut(&mut self) -> Option<&mut T> {
        if self.len == 0 {
            return None;
        }
        Some(unsafe { &mut *self.finish.prev().ptr() })
    }

    /// Appends an element to the back of the deque.
    ///
    /// # Panics
    ///
    /// Panics if allocation fails.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let mut deque = SegmentedDeque::new();
    /// deque.push_back(1);
    /// deque.push_back(2);
    /// assert_eq!(deque.back(), Some(&2));
    /// ```
    #[inline]
    pub fn push_back(&mut self, value: T) {
        self.try_push_back(value).unwrap_or_else(|err| err.handle())
    }

    /// Appends an element to the back, handling allocation failure gracefully.
    ///
    /// On failure the deque is unchanged and `value` is dropped.
    pub fn try_push_back(&mut self, value: T) -> Result<(), TryReserveError> {
        if self.back_is_full() {
            self.try_make_room(false)?;
        }
        unsafe {
            ptr::write(self.finish.ptr(), value);
            self.finish = self.finish.next();
        }
        self.len += 1;
        debug_assert!(self.valid());
        Ok(())
    }

    /// Prepends an element to the front of the deque.
    ///
    /// # Panics
    ///
    /// Panics if allocation fails.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let mut deque = SegmentedDeque::new();
    /// deque.push_front(1);
    /// deque.push_front(2);
    /// assert_eq!(deque.front(), Some(&2));
    /// ```
    #[inline]
    pub fn push_front(&mut self, value: T) {
        self.try_push_front(value).unwrap_or_else(|err| err.handle())
    }

    /// Prepends an element to the front, handling allocation failure gracefully.
    ///
    /// On failure the deque is unchanged and `value` is dropped.
    pub fn try_push_front(&mut self, value: T) -> Result<(), TryReserveError> {
        if self.front_is_full() {
            self.try_make_room(true)?;
        }
        unsafe {
            let start = self.start.prev();
            ptr::write(start.ptr(), value);
            self.start = start;
        }
        self.len += 1;
        debug_assert!(self.valid());
        Ok(())
    }

    /// Removes the last element and returns it, or `None` if empty.
    #[inline]
    pub fn pop_back(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = unsafe {
            self.finish = self.finish.prev();
            ptr::read(self.finish.ptr())
        };
        self.len -= 1;
        debug_assert!(self.valid());
        Some(value)
    }

    /// Removes the first element and returns it, or `None` if empty.
    #[inline]
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = unsafe {
            let value = ptr::read(self.start.ptr());
            self.start = self.start.next();
            value
        };
        self.len -= 1;
        debug_assert!(self.valid());
        Some(value)
    }

    /// `true` when `end` sits on the last cell of the last row.
    #[inline]
    fn back_is_full(&self) -> bool {
        self.finish.offset == ROW_SIZE - 1
            && self.finish.node == unsafe { self.buf.slot(self.buf.len() - 1) }
    }

    /// `true` when `begin` sits on the first cell of the first row.
    #[inline]
    fn front_is_full(&self) -> bool {
        self.start.offset == 0 && self.start.node == self.buf.slots()
    }

    /// Makes room for a row beyond `begin` (`at_front`) or `end`, then
    /// rebases both cursors onto their moved slots.
    ///
    /// On failure nothing changes.
    #[cold]
    #[inline(never)]
    fn try_make_room(&mut self, at_front: bool) -> Result<(), TryReserveError> {
        let (start_slot, finish_slot) = unsafe {
            (
                self.buf.index_of(self.start.node),
                self.buf.index_of(self.finish.node),
            )
        };
        let shift = self.buf.try_make_room(start_slot, finish_slot, at_front)?;
        unsafe {
            self.start
                .rebase(self.buf.slot((start_slot as isize + shift) as usize));
            self.finish
                .rebase(self.buf.slot((finish_slot as isize + shift) as usize));
        }
        debug_assert!(self.valid());
        Ok(())
    }

    /// Inserts an element at position `index`.
    ///
    /// Elements on the shorter side of `index` move by one cell, so the cost
    /// is O(min(index, len - index)). Inserting at either end is a push.
    ///
    /// # Panics
    ///
    /// Panics if `index > len` or if allocation fails.
    #[inline]
    pub fn insert(&mut self, index: usize, value: T) {
        self.try_insert(index, value)
            .unwrap_or_else(|err| err.handle())
    }

    /// Inserts an element at position `index`, handling allocation failure
    /// gracefully.
    ///
    /// On failure the deque is unchanged and `value` is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn try_insert(&mut self, index: usize, value: T) -> Result<(), TryReserveError> {
        assert!(
            index <= self.len,
            "insertion index (is {index}) should be <= len (is {})",
            self.len
        );

        if index == 0 {
            return self.try_push_front(value);
        }
        if index == self.len {
            return self.try_push_back(value);
        }

        if index < self.len - index {
            if self.front_is_full() {
                self.try_make_room(true)?;
            }
            unsafe {
                let new_start = self.start.prev();
                // Slide [0, index) one cell toward the front
                let mut dst = new_start;
                for _ in 0..index {
                    let src = dst.next();
                    ptr::copy_nonoverlapping(src.ptr(), dst.ptr(), 1);
                    dst = src;
                }
                ptr::write(dst.ptr(), value);
                self.start = new_start;
            }
        } else {
            if self.back_is_full() {
                self.try_make_room(false)?;
            }
            unsafe {
                // Slide [index, len) one cell toward the back
                let mut dst = self.finish;
                for _ in index..self.len {
                    let src = dst.prev();
                    ptr::copy_nonoverlapping(src.ptr(), dst.ptr(), 1);
                    dst = src;
                }
                ptr::write(dst.ptr(), value);
                self.finish = self.finish.next();
            }
        }

        self.len += 1;
        debug_assert!(self.valid());
        Ok(())
    }

    /// Removes and returns the element at position `index`.
    ///
    /// Elements on the shorter side of `index` close the gap, so the cost is
    /// O(min(index, len - index)). Returns `None` if `index >= len`.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        if index == 0 {
            return self.pop_front();
        }
        if index == self.len - 1 {
            return self.pop_back();
        }

        let pos = self.raw_at(index);
        let value = unsafe { ptr::read(pos.ptr()) };

        if index < self.len - index - 1 {
            unsafe {
                // Slide [0, index) one cell toward the back
                let mut dst = pos;
                for _ in 0..index {
                    let src = dst.prev();
                    ptr::copy_nonoverlapping(src.ptr(), dst.ptr(), 1);
                    dst = src;
                }
                self.start = self.start.next();
            }
        } else {
            unsafe {
                // Slide (index, len) one cell toward the front
                let mut dst = pos;
                for _ in index + 1..self.len {
                    let src = dst.next();
                    ptr::copy_nonoverlapping(src.ptr(), dst.ptr(), 1);
                    dst = src;
                }
                self.finish = self.finish.prev();
            }
        }

        self.len -= 1;
        debug_assert!(self.valid());
        Some(value)
    }

    /// Swaps two elements in the deque.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn swap(&mut self, a: usize, b: usize) {
        assert!(a < self.len && b < self.len, "index out of bounds");
        if a == b {
            return;
        }
        unsafe { ptr::swap(self.raw_at(a).ptr(), self.raw_at(b).ptr()) };
    }

    /// Exchanges the contents of two deques in O(1).
    ///
    /// Each deque keeps the allocator that owns its rows, so the allocators
    /// are exchanged along with the rows.
    #[inline]
    pub fn swap_with(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Removes all elements and returns to the one-row state of a new deque.
    pub fn clear(&mut self) {
        let (from, to) = (self.start, self.finish);
        let keep = unsafe { self.buf.index_of(from.node) };

        // Reset len BEFORE dropping to prevent double-free if drop panics
        self.len = 0;
        self.finish = self.start;
        unsafe { drop_range(from, to) };

        self.buf.retain_rows(keep, keep);
        self.start = unsafe { RawCursor::at(self.buf.slot(0), ROW_SIZE / 2) };
        self.finish = self.start;
        debug_assert!(self.valid());
    }

    /// Shortens the deque, keeping the first `len` elements and dropping the rest.
    ///
    /// Rows stay allocated; see [`shrink_to_fit`](Self::shrink_to_fit).
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let old_finish = self.finish;
        let new_finish = self.raw_at(len);

        // Update state BEFORE dropping to prevent double-free if drop panics
        self.finish = new_finish;
        self.len = len;
        unsafe { drop_range(new_finish, old_finish) };
        debug_assert!(self.valid());
    }

    /// Releases every row outside the live range.
    ///
    /// Row pointers are compacted into a smaller map; elements do not move.
    pub fn shrink_to_fit(&mut self) {
        let (first, last) = unsafe {
            (
                self.buf.index_of(self.start.node),
                self.buf.index_of(self.finish.node),
            )
        };
        self.buf.retain_rows(first, last);
        unsafe {
            self.start.rebase(self.buf.slot(0));
            self.finish.rebase(self.buf.slot(last - first));
        }
        debug_assert!(self.valid());
    }

    /// Resizes the deque to `new_len` elements.
    ///
    /// Grows by pushing clones of `value` at the back, or shrinks by dropping
    /// elements from the back.
    ///
    /// # Example
    ///
    /// ```
    /// use segmented_deque::SegmentedDeque;
    /// let mut deque = SegmentedDeque::from_elem(10, 5);
    /// deque.resize(11, 9);
    /// assert_eq!((deque.len(), deque[9], deque[10]), (11, 5, 9));
    /// deque.resize(4, 9);
    /// assert_eq!(deque.back(), Some(&5));
    /// ```
    pub fn resize(&mut self, new_len: usize, value: T)
    where
        T: Clone,
    {
        if new_len <= self.len {
            self.truncate(new_len);
            return;
        }

        let additional = new_len - self.len;
        for _ in 1..additional {
            self.push_back(value.clone());
        }
        // The last element receives the moved value, saving one clone
        self.push_back(value);
    }

    /// Resizes the deque using a closure to generate new elements.
    pub fn resize_with<F>(&mut self, new_len: usize, mut f: F)
    where
        F: FnMut() -> T,
    {
        if new_len <= self.len {
            self.truncate(new_len);
            return;
        }
        for _ in self.len..new_len {
            self.push_back(f());
        }
    }

    /// Returns `true` if the deque contains an element with the given value.
    pub fn contains(&self, x: &T) -> bool
    where
        T: PartialEq,
    {
        self.iter().any(|item| item == x)
    }

    /// Clones the deque into another allocator, reporting allocation failure.
    ///
    /// If an element clone panics, the partial copy is dropped and its rows
    /// released before the panic continues.
    pub fn try_clone_in<B: Allocator>(&self, alloc: B) -> Result<SegmentedDeque<T, B>, TryReserveError>
    where
        T: Clone,
    {
        let mut deque: SegmentedDeque<T, B> = SegmentedDeque::try_allocate_in(self.len, alloc)?;
        unsafe { deque.extend_within_capacity(self.iter().cloned()) };
        Ok(deque)
    }

    /// Writes every item of `iter` behind `end`.
    ///
    /// # Safety
    ///
    /// The rows after `end` must have room for every item without growing
    /// the map.
    unsafe fn extend_within_capacity<I: Iterator<Item = T>>(&mut self, iter: I) {
        let mut guard = PublishOnDrop {
            local_finish: self.finish,
            local_len: self.len,
            finish: &mut self.finish,
            len: &mut self.len,
        };
        for value in iter {
            ptr::write(guard.local_finish.ptr(), value);
            guard.local_finish = guard.local_finish.next();
            guard.local_len += 1;
        }
        drop(guard);
        debug_assert!(self.valid());
    }

    /// Checks the structural invariants of the deque.
    fn valid(&self) -> bool {
        if self.buf.len() == 0 || self.start.is_singular() || self.finish.is_singular() {
            return false;
        }
        let first = self.buf.slots();
        let last = unsafe { self.buf.slot(self.buf.len() - 1) };
        let in_map = |cursor: &RawCursor<T>| {
            cursor.node >= first
                && cursor.node <= last
                && cursor.offset < ROW_SIZE
                && cursor.row == unsafe { *cursor.node }
        };

        in_map(&self.start)
            && in_map(&self.finish)
            && self.start.position_cmp(&self.finish) != Ordering::Greater
            && unsafe { self.finish.distance(&self.start) } == self.len as isize
    }
}

/// Publishes elements written behind `end` when dropped.
///
/// If producing the next element panics, `end` and the length still cover
/// everything written so far, so the deque's destructor drops exactly those.
struct PublishOnDrop<'a, T> {
    local_finish: RawCursor<T>,
    local_len: usize,
    finish: &'a mut RawCursor<T>,
    len: &'a mut usize,
}

impl<T> Drop for PublishOnDrop<'_, T> {
    fn drop(&mut self) {
        *self.finish = self.local_finish;
        *self.len = self.local_len;
    }
}

/// Drops the elements in `[from, to)` row by row.
///
/// # Safety
///
/// Both cursors must belong to the same map, `from <= to`, and every cell in
/// between must hold a live element that is not used afterwards.
unsafe fn drop_range<T>(mut from: RawCursor<T>, to: RawCursor<T>) {
    if !std::mem::needs_drop::<T>() {
        return;
    }
    while from.node != to.node {
        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
            from.ptr(),
            ROW_SIZE - from.offset,
        ));
        from = RawCursor::at(from.node.add(1), 0);
    }
    ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
        from.ptr(),
        to.offset - from.offset,
    ));
}

// Trait implementations
impl<T, A: Allocator> Drop for SegmentedDeque<T, A> {
    fn drop(&mut self) {
        unsafe { drop_range(self.start, self.finish) };
        // RawMap will be dropped automatically and free the rows and the map
    }
}

impl<T: Clone, A: Allocator + Clone> Clone for SegmentedDeque<T, A> {
    /// Deep-copies the live elements into a fresh map sized for them.
    fn clone(&self) -> Self {
        self.try_clone_in(self.allocator().clone())
            .unwrap_or_else(|err| err.handle())
    }

    /// Replaces the contents with a copy of `source`.
    ///
    /// The copy is built in this deque's allocator and swapped in only once
    /// complete, so a panicking clone leaves `self` untouched.
    fn clone_from(&mut self, source: &Self) {
        let mut fresh = source
            .try_clone_in(self.allocator().clone())
            .unwrap_or_else(|err| err.handle());
        self.swap_with(&mut fresh);
    }
}

impl<T, U, A: Allocator, B: Allocator> PartialEq<SegmentedDeque<U, B>> for SegmentedDeque<T, A>
where
    T: PartialEq<U>,
{
    fn eq(&self, other: &SegmentedDeque<U, B>) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq, A: Allocator> Eq for SegmentedDeque<T, A> {}

impl<T: PartialEq<U>, U, A: Allocator> PartialEq<[U]> for SegmentedDeque<T, A> {
    fn eq(&self, other: &[U]) -> bool {
        self.len == other.len() && self.iter().eq(other.iter())
    }
}

impl<T: PartialEq<U>, U, A: Allocator> PartialEq<&[U]> for SegmentedDeque<T, A> {
    fn eq(&self, other: &&[U]) -> bool {
        *self == **other
    }
}

impl<T: PartialEq<U>, U, A: Allocator> PartialEq<Vec<U>> for SegmentedDeque<T, A> {
    fn eq(&self, other: &Vec<U>) -> bool {
        *self == *other.as_slice()
    }
}

impl<T: PartialEq<U>, U, A: Allocator, const N: usize> PartialEq<[U; N]> for SegmentedDeque<T, A> {
    fn eq(&self, other: &[U; N]) -> bool {
        *self == other[..]
    }
}

impl<T: PartialOrd, A: Allocator> PartialOrd for SegmentedDeque<T, A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<T: Ord, A: Allocator> Ord for SegmentedDeque<T, A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<T: std::hash::Hash, A: Allocator> std::hash::Hash for SegmentedDeque<T, A> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.len.hash(state);
        for item in self.iter() {
            item.hash(state);
        }
    }
}

impl<T: std::fmt::Debug, A: Allocator> std::fmt::Debug for SegmentedDeque<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Default for SegmentedDeque<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> Index<usize> for SegmentedDeque<T, A> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.get(index).expect("index out of bounds")
    }
}

impl<T, A: Allocator> IndexMut<usize> for SegmentedDeque<T, A> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.get_mut(index).expect("index out of bounds")
    }
}

impl<T, A: Allocator> Extend<T> for SegmentedDeque<T, A> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push_back(item);
        }
    }
}

impl<'a, T: Clone + 'a, A: Allocator> Extend<&'a T> for SegmentedDeque<T, A> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        for item in iter {
            self.push_back(item.clone());
        }
    }
}

impl<T> FromIterator<T> for SegmentedDeque<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut deque = Self::new();
        deque.extend(iter);
        deque
    }
}

impl<T, A: Allocator> IntoIterator for SegmentedDeque<T, A> {
    type Item = T;
    type IntoIter = IntoIter<T, A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::new(self)
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a SegmentedDeque<T, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a mut SegmentedDeque<T, A> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

// Safety implementations
unsafe impl<T: Send, A: Allocator + Send> Send for SegmentedDeque<T, A> {}
unsafe impl<T: Sync, A: Allocator + Sync> Sync for SegmentedDeque<T, A> {}
