//! Owning iterator for `SegmentedDeque`.

use allocator_api2::alloc::{Allocator, Global};

use crate::SegmentedDeque;

/// An owning iterator over elements of a `SegmentedDeque`.
///
/// This struct is created by the `into_iter` method on `SegmentedDeque`
/// (provided by the [`IntoIterator`] trait). Elements not yielded are dropped
/// together with the iterator.
pub struct IntoIter<T, A: Allocator = Global> {
    pub(crate) deque: SegmentedDeque<T, A>,
}

impl<T, A: Allocator> IntoIter<T, A> {
    /// Creates a new owning iterator from a `SegmentedDeque`.
    #[inline]
    pub fn new(deque: SegmentedDeque<T, A>) -> Self {
        Self { deque }
    }

    /// Returns the remaining items as a deque.
    pub fn into_remaining(self) -> SegmentedDeque<T, A> {
        self.deque
    }
}

impl<T, A: Allocator> Iterator for IntoIter<T, A> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.deque.pop_front()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.deque.len();
        (remaining, Some(remaining))
    }

    #[inline]
    fn count(self) -> usize {
        self.deque.len()
    }
}

impl<T, A: Allocator> DoubleEndedIterator for IntoIter<T, A> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.deque.pop_back()
    }
}

impl<T, A: Allocator> ExactSizeIterator for IntoIter<T, A> {}

impl<T, A: Allocator> std::iter::FusedIterator for IntoIter<T, A> {}

impl<T: Clone, A: Allocator + Clone> Clone for IntoIter<T, A> {
    fn clone(&self) -> Self {
        IntoIter {
            deque: self.deque.clone(),
        }
    }
}

impl<T: std::fmt::Debug, A: Allocator> std::fmt::Debug for IntoIter<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IntoIter").field(&self.deque).finish()
    }
}
