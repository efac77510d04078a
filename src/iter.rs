//! Iterator implementations for `SegmentedDeque`.

use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;

use crate::cursor::RawCursor;

/// An iterator over references to elements of a `SegmentedDeque`.
pub struct Iter<'a, T> {
    /// Next element yielded from the front
    pub(crate) front: RawCursor<T>,
    /// One past the next element yielded from the back
    pub(crate) back: RawCursor<T>,
    pub(crate) remaining: usize,
    pub(crate) _marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let result = unsafe { &*self.front.ptr() };
        self.front = unsafe { self.front.next() };
        self.remaining -= 1;
        Some(result)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }

    /// Skips `n` elements in O(1) regardless of how many rows they span.
    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.remaining {
            self.front = self.back;
            self.remaining = 0;
            return None;
        }
        self.front = unsafe { self.front.offset_by(n as isize) };
        self.remaining -= n;
        self.next()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.back = unsafe { self.back.prev() };
        self.remaining -= 1;
        Some(unsafe { &*self.back.ptr() })
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            front: self.front,
            back: self.back,
            remaining: self.remaining,
            _marker: PhantomData,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

// Safety: Iter only yields shared references
unsafe impl<T: Sync> Sync for Iter<'_, T> {}
unsafe impl<T: Sync> Send for Iter<'_, T> {}

/// An iterator over mutable references to elements of a `SegmentedDeque`.
pub struct IterMut<'a, T> {
    pub(crate) front: RawCursor<T>,
    pub(crate) back: RawCursor<T>,
    pub(crate) remaining: usize,
    pub(crate) _marker: PhantomData<&'a mut T>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let result = self.front.ptr();
        self.front = unsafe { self.front.next() };
        self.remaining -= 1;
        Some(unsafe { &mut *result })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.remaining {
            self.front = self.back;
            self.remaining = 0;
            return None;
        }
        self.front = unsafe { self.front.offset_by(n as isize) };
        self.remaining -= n;
        self.next()
    }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.back = unsafe { self.back.prev() };
        self.remaining -= 1;
        Some(unsafe { &mut *self.back.ptr() })
    }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}

impl<T> FusedIterator for IterMut<'_, T> {}

impl<T> fmt::Debug for IterMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterMut")
            .field("remaining", &self.remaining)
            .finish()
    }
}

// Safety: IterMut yields exclusive references
unsafe impl<T: Send> Send for IterMut<'_, T> {}
unsafe impl<T: Sync> Sync for IterMut<'_, T> {}

#[cfg(test)]
mod tests {
    use crate::SegmentedDeque;

    #[test]
    fn test_iter_both_ends() {
        let deque: SegmentedDeque<i32> = (0..300).collect();
        let mut iter = deque.iter();
        assert_eq!(iter.len(), 300);
        assert_eq!(iter.next(), Some(&0));
        assert_eq!(iter.next_back(), Some(&299));
        assert_eq!(iter.len(), 298);
        let rest: Vec<i32> = iter.copied().collect();
        assert_eq!(rest, (1..299).collect::<Vec<_>>());
    }

    #[test]
    fn test_iter_meets_in_middle() {
        let deque: SegmentedDeque<i32> = (0..5).collect();
        let mut iter = deque.iter();
        assert_eq!(iter.next(), Some(&0));
        assert_eq!(iter.next_back(), Some(&4));
        assert_eq!(iter.next(), Some(&1));
        assert_eq!(iter.next_back(), Some(&3));
        assert_eq!(iter.next(), Some(&2));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn test_iter_rev() {
        let deque: SegmentedDeque<i32> = (0..1000).collect();
        let collected: Vec<i32> = deque.iter().rev().copied().collect();
        let expected: Vec<i32> = (0..1000).rev().collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_nth_skips_rows() {
        let deque: SegmentedDeque<i32> = (0..1000).collect();
        let mut iter = deque.iter();
        assert_eq!(iter.nth(700), Some(&700));
        assert_eq!(iter.len(), 299);
        assert_eq!(iter.nth(298), Some(&999));
        assert_eq!(iter.next(), None);

        let mut iter = deque.iter();
        assert_eq!(iter.nth(1000), None);
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn test_iter_mut() {
        let mut deque: SegmentedDeque<i32> = SegmentedDeque::new();
        for i in 0..200 {
            deque.push_front(i);
        }
        for item in deque.iter_mut() {
            *item *= 2;
        }
        let collected: Vec<i32> = deque.iter().copied().collect();
        let expected: Vec<i32> = (0..200).rev().map(|x| x * 2).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_iter_mut_rev_nth() {
        let mut deque: SegmentedDeque<i32> = (0..400).collect();
        *deque.iter_mut().nth(257).unwrap() = -1;
        *deque.iter_mut().next_back().unwrap() = -2;
        assert_eq!(deque[257], -1);
        assert_eq!(deque[399], -2);
    }

    #[test]
    fn test_iter_empty() {
        let deque: SegmentedDeque<String> = SegmentedDeque::new();
        assert_eq!(deque.iter().next(), None);
        assert_eq!(deque.iter().next_back(), None);
    }
}
