//! Provides `PrioBitmap`, a bit array structure supporting constant-time
//! highest-bit scan operations.
use core::fmt;

/// The maximum bit count supported by [`PrioBitmap`].
pub const PRIO_BITMAP_MAX_LEN: usize = u32::BITS as usize;

/// A bit array of up to [`PRIO_BITMAP_MAX_LEN`] entries, used to find the
/// highest non-empty priority level in constant time.
///
/// All methods panic when the given bit position is out of range.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct PrioBitmap {
    bits: u32,
}

impl PrioBitmap {
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Get the bit at the specified position.
    #[inline]
    pub fn get(&self, i: usize) -> bool {
        assert!(i < PRIO_BITMAP_MAX_LEN);
        self.bits & (1 << i) != 0
    }

    /// Clear the bit at the specified position.
    #[inline]
    pub fn clear(&mut self, i: usize) {
        assert!(i < PRIO_BITMAP_MAX_LEN);
        self.bits &= !(1 << i);
    }

    /// Set the bit at the specified position.
    #[inline]
    pub fn set(&mut self, i: usize) {
        assert!(i < PRIO_BITMAP_MAX_LEN);
        self.bits |= 1 << i;
    }

    /// Get the position of the highest set bit.
    #[inline]
    pub fn find_highest(&self) -> Option<usize> {
        if self.bits == 0 {
            None
        } else {
            Some((u32::BITS - 1 - self.bits.leading_zeros()) as usize)
        }
    }

    /// Get a flag indicating whether any bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterate over the set bits in an ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..PRIO_BITMAP_MAX_LEN).filter(move |&i| self.get(i))
    }
}

impl fmt::Debug for PrioBitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::collections::BTreeSet;

    struct BTreePrioBitmap(BTreeSet<usize>);

    impl BTreePrioBitmap {
        fn new() -> Self {
            Self(BTreeSet::new())
        }

        fn enum_set_bits(&self) -> Vec<usize> {
            self.0.iter().cloned().collect()
        }

        fn clear(&mut self, i: usize) {
            self.0.remove(&i);
        }

        fn set(&mut self, i: usize) {
            self.0.insert(i);
        }

        fn find_highest(&self) -> Option<usize> {
            self.0.iter().next_back().cloned()
        }
    }

    /// A modifying operation on `PrioBitmap`.
    #[derive(Debug)]
    enum Cmd {
        Insert(usize),
        Remove(usize),
    }

    /// Map random bytes to operations on `PrioBitmap`.
    fn interpret(bytecode: &[u8], bitmap_len: usize) -> impl Iterator<Item = Cmd> + '_ {
        let mut i = 0;
        let mut known_set_bits = Vec::new();
        std::iter::from_fn(move || {
            if let Some(instr) = bytecode.get(i..i + 2) {
                i += 2;

                let value = instr[1] as usize;

                if instr[0] % 2 == 0 || known_set_bits.is_empty() {
                    let bit = value % bitmap_len;
                    known_set_bits.push(bit);
                    Some(Cmd::Insert(bit))
                } else {
                    let i = value % known_set_bits.len();
                    let bit = known_set_bits.swap_remove(i);
                    Some(Cmd::Remove(bit))
                }
            } else {
                None
            }
        })
    }

    fn test_inner(bytecode: Vec<u8>, size: usize) {
        let mut subject = PrioBitmap::new();
        let mut reference = BTreePrioBitmap::new();

        log::info!("size = {size}");

        for cmd in interpret(&bytecode, size) {
            log::trace!("    {cmd:?}");
            match cmd {
                Cmd::Insert(bit) => {
                    subject.set(bit);
                    reference.set(bit);
                }
                Cmd::Remove(bit) => {
                    subject.clear(bit);
                    reference.clear(bit);
                }
            }

            assert_eq!(subject.find_highest(), reference.find_highest());
        }

        assert_eq!(subject.find_highest(), reference.find_highest());
        assert_eq!(subject.iter().collect::<Vec<_>>(), reference.enum_set_bits());
    }

    #[quickcheck]
    fn quickcheck_size_8(bytecode: Vec<u8>) {
        test_inner(bytecode, 8);
    }

    #[quickcheck]
    fn quickcheck_size_32(bytecode: Vec<u8>) {
        test_inner(bytecode, 32);
    }

    #[test]
    fn empty() {
        let bitmap = PrioBitmap::new();
        assert!(bitmap.is_empty());
        assert_eq!(bitmap.find_highest(), None);
    }

    #[test]
    fn highest_wins() {
        let mut bitmap = PrioBitmap::new();
        bitmap.set(0);
        bitmap.set(3);
        assert_eq!(bitmap.find_highest(), Some(3));
        bitmap.clear(3);
        assert_eq!(bitmap.find_highest(), Some(0));
        assert_eq!(format!("{bitmap:?}"), "[0]");
    }

    #[test]
    #[should_panic]
    fn out_of_range() {
        PrioBitmap::new().set(PRIO_BITMAP_MAX_LEN);
    }
}
