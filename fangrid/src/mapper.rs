use crate::grid::Grid;
use crate::layout::{CELLS_PER_ROW, CELL_COLS, CELL_ROWS, NUM_CELLS};

/// One fan bitmask per cell, indexed by cell address.
pub type CellStates = [u32; NUM_CELLS];

/// Cell address that drives grid position `(row, col)`.
#[inline]
pub fn cell_index(row: usize, col: usize) -> usize {
    col / CELL_COLS + CELLS_PER_ROW * (row / CELL_ROWS)
}

/// Bit within its cell's mask for grid position `(row, col)`.
#[inline]
pub fn bit_index(row: usize, col: usize) -> usize {
    (row % CELL_ROWS) * CELL_COLS + col % CELL_COLS
}

/// Grid position of bit `bit` of cell `cell`.
#[inline]
pub fn grid_position(cell: usize, bit: usize) -> (usize, usize) {
    let row = CELL_ROWS * (cell / CELLS_PER_ROW) + bit / CELL_COLS;
    let col = CELL_COLS * (cell % CELLS_PER_ROW) + bit % CELL_COLS;
    (row, col)
}

/// Split a grid into the fan mask each cell must drive.
pub fn grid_to_cells(grid: &Grid) -> CellStates {
    let mut states = [0u32; NUM_CELLS];
    for (row, col) in grid.live_cells() {
        states[cell_index(row, col)] |= 1 << bit_index(row, col);
    }
    states
}

/// Overwrite one cell's block of the grid with its reported mask.
pub fn apply_cell(grid: &mut Grid, cell: usize, state: u32) {
    for r in 0..CELL_ROWS {
        for c in 0..CELL_COLS {
            let bit = r * CELL_COLS + c;
            let (row, col) = grid_position(cell, bit);
            grid.set(row, col, state & (1 << bit) != 0);
        }
    }
}

/// Assemble a grid from all eight cell masks.
pub fn cells_to_grid(states: &CellStates) -> Grid {
    let mut grid = Grid::new();
    for (cell, &state) in states.iter().enumerate() {
        apply_cell(&mut grid, cell, state);
    }
    grid
}
