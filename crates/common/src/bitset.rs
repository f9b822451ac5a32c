use bit_vec::BitVec;

use crate::ObjectIndex;

/// Growable bit set keyed by dense indices.
///
/// Reads outside the current length report `false`; `insert` grows the set
/// on demand so callers never have to pre-size it for a new handle.
#[derive(Debug, Clone, Default)]
pub struct NetBitSet {
    bits: BitVec,
}

impl NetBitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set able to hold `len` bits without growing.
    pub fn with_len(len: usize) -> Self {
        Self {
            bits: BitVec::from_elem(len, false),
        }
    }

    /// Number of addressable bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True when no bit is set.
    pub fn is_empty(&self) -> bool {
        self.bits.none()
    }

    /// Grow to at least `len` bits. Never shrinks.
    pub fn grow_to(&mut self, len: usize) {
        if len > self.bits.len() {
            let extra = len - self.bits.len();
            self.bits.grow(extra, false);
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.bits.get(index).unwrap_or(false)
    }

    /// Set a bit. Returns true if it was previously clear.
    pub fn insert(&mut self, index: usize) -> bool {
        self.grow_to(index + 1);
        let was_set = self.contains(index);
        self.bits.set(index, true);
        !was_set
    }

    /// Clear a bit. Returns true if it was previously set.
    pub fn remove(&mut self, index: usize) -> bool {
        if !self.contains(index) {
            return false;
        }
        self.bits.set(index, false);
        true
    }

    /// Clear every bit, keeping the length.
    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.bits
            .storage()
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum()
    }

    /// Lowest set index, if any.
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// Iterate set indices in ascending order.
    pub fn iter(&self) -> SetBits<'_> {
        SetBits {
            words: self.bits.storage(),
            len: self.bits.len(),
            word_index: 0,
            current: self.bits.storage().first().copied().unwrap_or(0),
        }
    }

    /// Iterate set indices as object handles.
    pub fn objects(&self) -> impl Iterator<Item = ObjectIndex> + '_ {
        self.iter().map(|i| ObjectIndex(i as u32))
    }
}

/// Iterator over the set bits of a [`NetBitSet`].
pub struct SetBits<'a> {
    words: &'a [u32],
    len: usize,
    word_index: usize,
    current: u32,
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                let index = self.word_index * 32 + bit;
                if index >= self.len {
                    return None;
                }
                return Some(index);
            }
            self.word_index += 1;
            if self.word_index >= self.words.len() {
                return None;
            }
            self.current = self.words[self.word_index];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_reads_are_clear() {
        let set = NetBitSet::with_len(8);
        assert!(!set.contains(3));
        assert!(!set.contains(1000));
    }

    #[test]
    fn insert_grows_on_demand() {
        let mut set = NetBitSet::new();
        assert!(set.insert(70));
        assert!(set.len() >= 71);
        assert!(set.contains(70));
        assert!(!set.insert(70));
    }

    #[test]
    fn remove_reports_previous_state() {
        let mut set = NetBitSet::with_len(4);
        set.insert(2);
        assert!(set.remove(2));
        assert!(!set.remove(2));
        assert!(!set.remove(99));
    }

    #[test]
    fn iterates_set_bits_across_words() {
        let mut set = NetBitSet::with_len(100);
        for i in [0, 31, 32, 63, 64, 99] {
            set.insert(i);
        }
        let bits: Vec<usize> = set.iter().collect();
        assert_eq!(bits, vec![0, 31, 32, 63, 64, 99]);
        assert_eq!(set.count(), 6);
        assert_eq!(set.first(), Some(0));
    }

    #[test]
    fn clear_keeps_length() {
        let mut set = NetBitSet::with_len(40);
        set.insert(5);
        set.insert(39);
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.len(), 40);
        assert_eq!(set.first(), None);
    }
}
