use std::fmt::{Debug, Error, Formatter};
use std::iter::{DoubleEndedIterator, Enumerate, FromIterator};
use std::result::Result;
use std::slice::Iter;
use std::vec::IntoIter as VecIntoIter;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// Two places in class files are shaped like this:
///
///   - constant pool and indices (most entries have width 1, but `long` and `double` take 2)
///   - method code and bytecode offsets (different instructions have different sizes)
///
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    /// New empty offset vector, with a custom starting offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
        }
    }

    /// Length of the `OffsetVec` (aka. number of entries)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current offset size of the `OffsetVec` (aka. offset of the next element
    /// to be added)
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back
    pub fn push(&mut self, slot: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += slot.width();
        self.entries.push((offset, slot));

        offset
    }

    /// Get an entry (and its index) by its offset in the vector
    ///
    /// Note: this uses binary search to find the offset
    pub fn get_offset(&self, offset: Offset) -> OffsetResult<T> {
        match self.entries.binary_search_by_key(&offset, |(off, _)| *off) {
            Ok(found_idx) => OffsetResult::Ok(found_idx, &self.entries[found_idx].1),
            Err(0) => OffsetResult::BeforeStart,
            Err(_) if offset >= self.offset_len => OffsetResult::PastEnd,
            Err(insert_at) => OffsetResult::InsideElement(insert_at - 1),
        }
    }

    /// Get an entry (and its offset) by its position in the vector
    pub fn get_index(&self, index: usize) -> Option<(Offset, &T)> {
        self.entries.get(index).map(|(offset, t)| (*offset, t))
    }

    pub fn iter(&self) -> OffsetVecIter<'_, T> {
        self.into_iter()
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<A: Eq> Eq for OffsetVec<A> {}

impl<A: Width> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum OffsetResult<'a, T> {
    /// Element at this index starts exactly at the offset
    Ok(usize, &'a T),

    /// Offset falls in the middle of the element at this index
    InsideElement(usize),

    /// Offset is smaller than the first offset
    BeforeStart,

    /// Offset is at or past the end
    PastEnd,
}

/// Iterator for owned `OffsetVec`
pub struct OffsetVecIntoIter<T>(Enumerate<VecIntoIter<(Offset, T)>>);

impl<T> Iterator for OffsetVecIntoIter<T> {
    type Item = (Offset, usize, T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (off, idx, elem))
    }
}

impl<T> DoubleEndedIterator for OffsetVecIntoIter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0
            .next_back()
            .map(|(idx, (off, elem))| (off, idx, elem))
    }
}

impl<T> IntoIterator for OffsetVec<T> {
    type Item = (Offset, usize, T);
    type IntoIter = OffsetVecIntoIter<T>;

    fn into_iter(self) -> OffsetVecIntoIter<T> {
        OffsetVecIntoIter(self.entries.into_iter().enumerate())
    }
}

/// Iterator for borrowed `OffsetVec`
pub struct OffsetVecIter<'a, T>(Enumerate<Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, usize, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        OffsetVecIter(self.entries.iter().enumerate())
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        for elem in elems {
            offset_vec.push(elem);
        }
        offset_vec
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Mimics constant pool entries, where 64-bit values take two slots
    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Entry {
        Narrow(u32),
        Wide(u64),
    }

    impl Width for Entry {
        fn width(&self) -> usize {
            match self {
                Entry::Narrow(_) => 1,
                Entry::Wide(_) => 2,
            }
        }
    }

    fn pool() -> OffsetVec<Entry> {
        let mut pool = OffsetVec::new_starting_at(Offset(1));
        pool.push(Entry::Narrow(7));
        pool.push(Entry::Wide(8));
        pool.push(Entry::Narrow(9));
        pool
    }

    #[test]
    fn offsets_account_for_width() {
        assert_eq!(
            pool().into_iter().collect::<Vec<_>>(),
            vec![
                (Offset(1), 0, Entry::Narrow(7)),
                (Offset(2), 1, Entry::Wide(8)),
                (Offset(4), 2, Entry::Narrow(9)),
            ]
        );
        assert_eq!(pool().offset_len(), Offset(5));
    }

    #[test]
    fn lookup_by_offset() {
        let pool = pool();
        assert_eq!(pool.get_offset(Offset(2)), OffsetResult::Ok(1, &Entry::Wide(8)));
        assert_eq!(pool.get_offset(Offset(3)), OffsetResult::InsideElement(1));
        assert_eq!(pool.get_offset(Offset(0)), OffsetResult::BeforeStart);
        assert_eq!(pool.get_offset(Offset(5)), OffsetResult::PastEnd);
        assert_eq!(pool.get_index(2), Some((Offset(4), &Entry::Narrow(9))));
    }
}
