//! Row and map allocation for `SegmentedDeque`.
//!
//! This module owns the raw storage of a deque, similar to how `RawVec`
//! works for `Vec` in the standard library. The map is one contiguous array
//! of row pointers; every slot in `[0, len)` points at an allocated row of
//! `ROW_SIZE` elements. Nothing here knows which cells hold live elements,
//! so dropping a `RawMap` frees memory without running destructors.

use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use allocator_api2::alloc::Allocator;

use crate::TryReserveError;

/// Log2 of the number of elements in one row.
const LOG_ROW_SIZE: u32 = 7;

/// Number of elements stored in one row.
pub const ROW_SIZE: usize = 1 << LOG_ROW_SIZE;

/// Factor by which the map is enlarged when the live range reaches its edge.
pub const MAP_GROWTH_FACTOR: usize = 3;

/// Raw map of rows that handles allocation without element management.
pub(crate) struct RawMap<T, A: Allocator> {
    /// Array of row pointers
    slots: NonNull<*mut T>,
    /// Number of slots holding a row
    len: usize,
    /// Number of slots the array was allocated with
    cap: usize,
    alloc: A,
    /// Marker for type ownership
    _marker: PhantomData<T>,
}

impl<T, A: Allocator> RawMap<T, A> {
    /// Allocates a map of `rows` slots, each holding a freshly allocated row.
    ///
    /// On failure every allocation made by this call has been released.
    pub(crate) fn try_with_rows_in(rows: usize, alloc: A) -> Result<Self, TryReserveError> {
        debug_assert!(rows > 0);
        let slots = allocate_slots::<T, A>(&alloc, rows)?;
        let mut map = Self {
            slots,
            len: 0,
            cap: rows,
            alloc,
            _marker: PhantomData,
        };

        // Rows are published one at a time so `Drop` frees exactly the ones
        // that exist if a later allocation fails.
        for i in 0..rows {
            let row = map.allocate_row()?;
            unsafe { map.slots.as_ptr().add(i).write(row) };
            map.len = i + 1;
        }
        Ok(map)
    }

    /// Returns the number of rows in the map.
    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Returns a pointer to the first slot.
    #[inline]
    pub(crate) fn slots(&self) -> *mut *mut T {
        self.slots.as_ptr()
    }

    /// Returns a pointer to the slot at `index`.
    ///
    /// # Safety
    ///
    /// `index` must be less than `len`.
    #[inline]
    pub(crate) unsafe fn slot(&self, index: usize) -> *mut *mut T {
        debug_assert!(index < self.len);
        self.slots.as_ptr().add(index)
    }

    /// Returns the index of `slot` within the map.
    ///
    /// # Safety
    ///
    /// `slot` must point into this map.
    #[inline]
    pub(crate) unsafe fn index_of(&self, slot: *mut *mut T) -> usize {
        let index = slot.offset_from(self.slots.as_ptr());
        debug_assert!(index >= 0 && (index as usize) < self.len);
        index as usize
    }

    #[inline]
    pub(crate) fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Makes room for one more row beside the occupied slots `first..=last`.
    ///
    /// When the occupied rows fill at most half of the map, the slot array
    /// is rotated so the spare rows surround them again, with the extra one
    /// on the `at_front` side. Only a map that is at least half full grows.
    /// Returns the signed number of slots the occupied rows moved.
    ///
    /// On failure the map is unchanged.
    pub(crate) fn try_make_room(
        &mut self,
        first: usize,
        last: usize,
        at_front: bool,
    ) -> Result<isize, TryReserveError> {
        debug_assert!(first <= last && last < self.len);
        let occupied = last - first + 1;
        if occupied * 2 > self.len {
            return self.try_grow().map(|shift| shift as isize);
        }

        let target = (self.len - occupied) / 2 + usize::from(at_front);
        // Spare rows hold no live cells, so only the occupied run keeps its order
        let slots = unsafe { std::slice::from_raw_parts_mut(self.slots.as_ptr(), self.len) };
        if target < first {
            slots.rotate_left(first - target);
        } else {
            slots.rotate_right(target - first);
        }
        Ok(target as isize - first as isize)
    }

    /// Enlarges the map by `MAP_GROWTH_FACTOR`.
    ///
    /// The new map is split into three zones: fresh empty rows in front, the
    /// old row pointers in the middle, and fresh empty rows behind. Rows are
    /// moved by pointer, so no element is touched. Returns the number of
    /// slots the old rows were shifted by; callers rebase their cursors with
    /// it.
    ///
    /// On failure the map is unchanged.
    pub(crate) fn try_grow(&mut self) -> Result<usize, TryReserveError> {
        let old_len = self.len;
        let new_len = old_len
            .max(1)
            .checked_mul(MAP_GROWTH_FACTOR)
            .ok_or_else(TryReserveError::capacity_overflow)?;
        let front = old_len;
        let back_start = front + old_len;

        let new_slots = allocate_slots::<T, A>(&self.alloc, new_len)?;
        let base = new_slots.as_ptr();

        unsafe {
            if let Err(err) = self.fill_rows(base, front) {
                deallocate_slots(&self.alloc, new_slots, new_len);
                return Err(err);
            }
            if let Err(err) = self.fill_rows(base.add(back_start), new_len - back_start) {
                self.free_rows(base, front);
                deallocate_slots(&self.alloc, new_slots, new_len);
                return Err(err);
            }

            ptr::copy_nonoverlapping(self.slots.as_ptr(), base.add(front), old_len);
            deallocate_slots(&self.alloc, self.slots, self.cap);
        }

        self.slots = new_slots;
        self.len = new_len;
        self.cap = new_len;
        Ok(front)
    }

    /// Keeps the rows in slots `first..=last`, freeing every other row.
    ///
    /// The kept rows move to the front of the map. A smaller slot array is
    /// allocated when possible; if that fails the rows are compacted in the
    /// existing array instead, so this never fails.
    ///
    /// Does not drop elements - the freed rows must not hold live elements.
    pub(crate) fn retain_rows(&mut self, first: usize, last: usize) {
        debug_assert!(first <= last && last < self.len);
        let kept = last - first + 1;
        if kept == self.len {
            return;
        }

        let old = self.slots.as_ptr();
        unsafe {
            self.free_rows(old, first);
            self.free_rows(old.add(last + 1), self.len - last - 1);

            match allocate_slots::<T, A>(&self.alloc, kept) {
                Ok(new_slots) => {
                    ptr::copy_nonoverlapping(old.add(first), new_slots.as_ptr(), kept);
                    deallocate_slots(&self.alloc, self.slots, self.cap);
                    self.slots = new_slots;
                    self.cap = kept;
                }
                Err(_) => ptr::copy(old.add(first), old, kept),
            }
        }
        self.len = kept;
    }

    fn allocate_row(&self) -> Result<*mut T, TryReserveError> {
        let layout = Layout::array::<T>(ROW_SIZE).map_err(|_| TryReserveError::capacity_overflow())?;
        match self.alloc.allocate(layout) {
            Ok(ptr) => Ok(ptr.cast::<T>().as_ptr()),
            Err(_) => Err(TryReserveError::alloc_error(layout)),
        }
    }

    /// Writes `count` fresh rows starting at `dst`.
    ///
    /// On failure the rows written by this call are freed again.
    unsafe fn fill_rows(&self, dst: *mut *mut T, count: usize) -> Result<(), TryReserveError> {
        for i in 0..count {
            match self.allocate_row() {
                Ok(row) => dst.add(i).write(row),
                Err(err) => {
                    self.free_rows(dst, i);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Frees the `count` rows referenced from `src`.
    unsafe fn free_rows(&self, src: *mut *mut T, count: usize) {
        let layout = Layout::array::<T>(ROW_SIZE).expect("Layout overflow");
        for i in 0..count {
            let row = *src.add(i);
            self.alloc.deallocate(NonNull::new_unchecked(row.cast::<u8>()), layout);
        }
    }
}

fn allocate_slots<T, A: Allocator>(alloc: &A, count: usize) -> Result<NonNull<*mut T>, TryReserveError> {
    let layout = Layout::array::<*mut T>(count).map_err(|_| TryReserveError::capacity_overflow())?;
    match alloc.allocate(layout) {
        Ok(ptr) => Ok(ptr.cast::<*mut T>()),
        Err(_) => Err(TryReserveError::alloc_error(layout)),
    }
}

unsafe fn deallocate_slots<T, A: Allocator>(alloc: &A, slots: NonNull<*mut T>, count: usize) {
    let layout = Layout::array::<*mut T>(count).expect("Layout overflow");
    alloc.deallocate(slots.cast::<u8>(), layout);
}

impl<T, A: Allocator> Drop for RawMap<T, A> {
    fn drop(&mut self) {
        // Note: This only frees memory, it doesn't drop elements.
        // SegmentedDeque must drop elements before RawMap is dropped.
        unsafe {
            self.free_rows(self.slots.as_ptr(), self.len);
            deallocate_slots(&self.alloc, self.slots, self.cap);
        }
    }
}
