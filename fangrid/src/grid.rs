use std::fmt;

use crate::error::GridError;
use crate::layout::{GRID_COLS, GRID_ROWS};

/// Map a possibly out-of-range index onto `0..dim`, wrapping toroidally.
///
/// Both negative offsets and an index of exactly `dim` wrap.
#[inline]
pub fn wrap(index: isize, dim: usize) -> usize {
    index.rem_euclid(dim as isize) as usize
}

/// The 16x16 board of alive/dead cells, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Grid {
    cells: [[bool; GRID_COLS]; GRID_ROWS],
}

impl Grid {
    pub const ROWS: usize = GRID_ROWS;
    pub const COLS: usize = GRID_COLS;

    /// An all-dead grid.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> bool {
        self.cells[row][col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, alive: bool) {
        self.cells[row][col] = alive;
    }

    /// Look up a cell with toroidal wraparound on both axes.
    #[inline]
    pub fn get_wrapped(&self, row: isize, col: isize) -> bool {
        self.cells[wrap(row, GRID_ROWS)][wrap(col, GRID_COLS)]
    }

    pub fn population(&self) -> usize {
        self.cells.iter().flatten().filter(|&&alive| alive).count()
    }

    /// Number of positions whose state differs from `other`.
    pub fn diff_count(&self, other: &Grid) -> usize {
        self.cells
            .iter()
            .flatten()
            .zip(other.cells.iter().flatten())
            .filter(|(a, b)| a != b)
            .count()
    }

    /// Coordinates of every live cell in row-major order.
    pub fn live_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells.iter().enumerate().flat_map(|(row, cols)| {
            cols.iter()
                .enumerate()
                .filter(|&(_, &alive)| alive)
                .map(move |(col, _)| (row, col))
        })
    }

    /// Parse a grid from text rows, `#` or `1` alive and `.` or `0` dead.
    pub fn from_rows(rows: &[&str]) -> Result<Grid, GridError> {
        if rows.len() != GRID_ROWS {
            return Err(GridError::RowCount {
                expected: GRID_ROWS,
                got: rows.len(),
            });
        }
        let mut grid = Grid::new();
        for (row, line) in rows.iter().enumerate() {
            let len = line.chars().count();
            if len != GRID_COLS {
                return Err(GridError::RowLength {
                    row,
                    len,
                    expected: GRID_COLS,
                });
            }
            for (col, ch) in line.chars().enumerate() {
                let alive = match ch {
                    '#' | '1' => true,
                    '.' | '0' => false,
                    other => return Err(GridError::InvalidChar(other, row, col)),
                };
                grid.set(row, col, alive);
            }
        }
        Ok(grid)
    }

    /// Text rows in the format accepted by [`Grid::from_rows`].
    pub fn to_rows(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|cols| cols.iter().map(|&a| if a { '#' } else { '.' }).collect())
            .collect()
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.to_rows() {
            writeln!(f, "{row}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_handles_both_edges() {
        assert_eq!(wrap(-1, 16), 15);
        assert_eq!(wrap(16, 16), 0);
        assert_eq!(wrap(17, 16), 1);
        assert_eq!(wrap(7, 16), 7);
    }

    #[test]
    fn get_wrapped_reads_opposite_edge() {
        let mut g = Grid::new();
        g.set(15, 0, true);
        assert!(g.get_wrapped(-1, 0));
        assert!(g.get_wrapped(15, 16));
        assert!(!g.get_wrapped(0, 0));
    }

    #[test]
    fn diff_count_counts_positions() {
        let mut a = Grid::new();
        let mut b = Grid::new();
        a.set(0, 0, true);
        b.set(3, 4, true);
        b.set(0, 0, true);
        b.set(15, 15, true);
        assert_eq!(a.diff_count(&b), 2);
        assert_eq!(b.diff_count(&b), 0);
    }

    #[test]
    fn text_round_trip() {
        let mut g = Grid::new();
        g.set(2, 3, true);
        g.set(15, 15, true);
        let rows = g.to_rows();
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        assert_eq!(Grid::from_rows(&refs).unwrap(), g);
        assert_eq!(g.population(), 2);
        assert_eq!(g.live_cells().collect::<Vec<_>>(), vec![(2, 3), (15, 15)]);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            Grid::from_rows(&["...."]),
            Err(GridError::RowCount { got: 1, .. })
        ));
        let mut rows = vec!["................"; 16];
        rows[4] = "......x.........";
        assert_eq!(
            Grid::from_rows(&rows),
            Err(GridError::InvalidChar('x', 4, 6))
        );
    }
}
