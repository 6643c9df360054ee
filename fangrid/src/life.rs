//! Conway's Game of Life (B3/S23) on the toroidal 16x16 grid.

use crate::grid::Grid;
use crate::layout::{GRID_COLS, GRID_ROWS};

/// Live cells among the eight Moore neighbors, wrapping at every edge.
pub fn live_neighbors(grid: &Grid, row: usize, col: usize) -> u8 {
    let mut count = 0u8;
    for dr in -1isize..=1 {
        for dc in -1isize..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            if grid.get_wrapped(row as isize + dr, col as isize + dc) {
                count += 1;
            }
        }
    }
    count
}

/// B3/S23: survive on 2 or 3 neighbors, birth on exactly 3.
#[inline]
pub fn next_state(alive: bool, neighbors: u8) -> bool {
    if alive {
        neighbors == 2 || neighbors == 3
    } else {
        neighbors == 3
    }
}

/// Neighbor count for every position, taken from one snapshot.
pub fn neighbor_counts(grid: &Grid) -> [[u8; GRID_COLS]; GRID_ROWS] {
    let mut counts = [[0u8; GRID_COLS]; GRID_ROWS];
    for (row, line) in counts.iter_mut().enumerate() {
        for (col, count) in line.iter_mut().enumerate() {
            *count = live_neighbors(grid, row, col);
        }
    }
    counts
}

/// Advance one generation.
pub fn step(grid: &Grid) -> Grid {
    let counts = neighbor_counts(grid);
    let mut next = Grid::new();
    for (row, line) in counts.iter().enumerate() {
        for (col, &count) in line.iter().enumerate() {
            next.set(row, col, next_state(grid.get(row, col), count));
        }
    }
    next
}

/// Advance `generations` steps.
pub fn step_n(grid: &Grid, generations: usize) -> Grid {
    (0..generations).fold(*grid, |g, _| step(&g))
}
