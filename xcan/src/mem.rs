//! Volatile system-memory window
//!
//! Descriptor rings and data containers live in memory shared with a
//! DMA-capable consumer, so every access has to go through a volatile cell.
//! [`SharedRam`] maps a window of such cells to a bus address range and
//! implements [`xcan_core::Memory`] over it. Accesses outside the window
//! panic, the software analogue of a bus fault.

use vcell::VolatileCell;
use xcan_core::Memory;

/// A word-addressed memory window backed by volatile cells.
pub struct SharedRam<'a> {
    base: u32,
    words: &'a [VolatileCell<u32>],
}

impl<'a> SharedRam<'a> {
    /// A window over `words` starting at bus address `base`.
    pub fn new(base: u32, words: &'a [VolatileCell<u32>]) -> Self {
        Self { base, words }
    }

    /// Bus address of the first word.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Size of the window in bytes.
    pub fn len_bytes(&self) -> u32 {
        self.words.len() as u32 * 4
    }

    fn offset(&self, address: u32) -> usize {
        ((address - self.base) / 4) as usize
    }
}

impl Memory for SharedRam<'_> {
    fn read_word(&self, address: u32) -> u32 {
        self.words[self.offset(address)].get()
    }

    fn write_word(&mut self, address: u32, word: u32) {
        self.words[self.offset(address)].set(word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_base_relative() {
        let cells = [const { VolatileCell::new(0u32) }; 8];
        let mut ram = SharedRam::new(0x2000_0000, &cells);
        ram.write_word(0x2000_0010, 0xdead_beef);
        assert_eq!(ram.read_word(0x2000_0010), 0xdead_beef);
        assert_eq!(cells[4].get(), 0xdead_beef);
        assert_eq!(ram.len_bytes(), 32);
    }

    #[test]
    fn multi_word_access() {
        let cells = [const { VolatileCell::new(0u32) }; 8];
        let mut ram = SharedRam::new(0, &cells);
        ram.write_words(8, &[1, 2, 3]);
        let mut out = [0; 3];
        ram.read_words(8, &mut out);
        assert_eq!(out, [1, 2, 3]);
    }
}
