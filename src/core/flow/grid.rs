//! Cell-state strings posted with play updates.
//!
//! `primary` holds one character per cell: `#` for empty or a lowercase
//! letter. `secondary` mirrors it with `0`/`1`. A cell is filled exactly when
//! its secondary flag is `1`, which is exactly when its primary is not `#`.

use rand::Rng;
use rand::seq::index;

pub const EMPTY_CELL: u8 = b'#';
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Upper bound on cells toggled by one in-progress update.
pub const MAX_CHANGES_PER_UPDATE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridState {
    primary: Vec<u8>,
    secondary: Vec<u8>,
}

impl GridState {
    /// A grid with no cell filled.
    pub fn empty(len: usize) -> Self {
        Self {
            primary: vec![EMPTY_CELL; len],
            secondary: vec![b'0'; len],
        }
    }

    /// A seed grid where each cell is filled with probability `fill_ratio`.
    pub fn seeded<R: Rng>(len: usize, fill_ratio: f64, rng: &mut R) -> Self {
        let mut grid = Self::empty(len);
        for idx in 0..len {
            if rng.random::<f64>() < fill_ratio {
                grid.fill(idx, rng);
            }
        }
        grid
    }

    /// A grid with every cell filled.
    pub fn complete<R: Rng>(len: usize, rng: &mut R) -> Self {
        let mut grid = Self::empty(len);
        for idx in 0..len {
            grid.fill(idx, rng);
        }
        grid
    }

    /// Toggle between one and [`MAX_CHANGES_PER_UPDATE`] distinct cells.
    /// Returns the number of cells changed.
    pub fn mutate<R: Rng>(&mut self, rng: &mut R) -> usize {
        let len = self.len();
        if len == 0 {
            return 0;
        }
        let changes = rng.random_range(1..=MAX_CHANGES_PER_UPDATE.min(len));
        for idx in index::sample(rng, len, changes).into_iter() {
            if self.primary[idx] == EMPTY_CELL {
                self.fill(idx, rng);
            } else {
                self.primary[idx] = EMPTY_CELL;
                self.secondary[idx] = b'0';
            }
        }
        changes
    }

    fn fill<R: Rng>(&mut self, idx: usize, rng: &mut R) {
        self.primary[idx] = LETTERS[rng.random_range(0..LETTERS.len())];
        self.secondary[idx] = b'1';
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    pub fn filled_cells(&self) -> usize {
        self.secondary.iter().filter(|c| **c == b'1').count()
    }

    pub fn is_complete(&self) -> bool {
        self.filled_cells() == self.len()
    }

    /// Whether both strings agree on which cells are filled.
    pub fn is_consistent(&self) -> bool {
        self.primary.len() == self.secondary.len()
            && self
                .primary
                .iter()
                .zip(&self.secondary)
                .all(|(p, s)| (*p != EMPTY_CELL) == (*s == b'1'))
    }

    pub fn primary(&self) -> String {
        String::from_utf8_lossy(&self.primary).into_owned()
    }

    pub fn secondary(&self) -> String {
        String::from_utf8_lossy(&self.secondary).into_owned()
    }
}
