//! Key-dependent L values, derived from `E_K(0^128)` by repeated doubling.

use zeroize::Zeroize;

use crate::util::double;

/// One entry per possible `ntz` of a 64-bit block counter, so the table
/// never reallocates.
const TABLE_LEN: usize = 64;

/// Cache of the OCB3 masking values.
///
/// `L_*` masks the final partial block, `L_$` the tag, and `L[i]` the
/// i-th Gray-code step of a running offset. Entries are filled lazily and
/// never change once computed.
#[derive(Debug)]
pub(crate) struct LTree {
    star: [u8; 16],
    dollar: [u8; 16],
    table: [[u8; 16]; TABLE_LEN],
    filled: usize,
}

impl LTree {
    /// Build the tree from `L_* = E_K(0^128)`.
    pub(crate) fn new(star: [u8; 16]) -> Self {
        let dollar = double(&star);
        let mut table = [[0u8; 16]; TABLE_LEN];
        table[0] = double(&dollar);
        Self {
            star,
            dollar,
            table,
            filled: 1,
        }
    }

    pub(crate) fn star(&self) -> &[u8; 16] {
        &self.star
    }

    pub(crate) fn dollar(&self) -> &[u8; 16] {
        &self.dollar
    }

    /// `L[i]`, extending the table by chained doubling on first use.
    pub(crate) fn get(&mut self, i: usize) -> &[u8; 16] {
        while self.filled <= i {
            self.table[self.filled] = double(&self.table[self.filled - 1]);
            self.filled += 1;
        }
        &self.table[i]
    }
}

impl Zeroize for LTree {
    fn zeroize(&mut self) {
        self.star.zeroize();
        self.dollar.zeroize();
        for entry in self.table.iter_mut() {
            entry.zeroize();
        }
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::LTree;
    use crate::util::double;

    const STAR: [u8; 16] = *b"some cipher out!";

    #[test]
    fn derivation_chain() {
        let mut tree = LTree::new(STAR);
        assert_eq!(*tree.dollar(), double(&STAR));
        assert_eq!(*tree.get(0), double(&double(&STAR)));
        let l2 = *tree.get(2);
        assert_eq!(*tree.get(3), double(&l2));
    }

    #[test]
    fn lazy_extension_is_order_independent() {
        let mut eager = LTree::new(STAR);
        for i in 0..8 {
            eager.get(i);
        }
        let mut lazy = LTree::new(STAR);
        assert_eq!(lazy.get(7), eager.get(7));
        assert_eq!(lazy.get(3), eager.get(3));
    }
}
