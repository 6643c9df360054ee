//! Physical dimensions of the installation.
//!
//! Each cell drives a 4x8 block of fans. Eight cells are tiled as two
//! cell-columns by four cell-rows to cover the 16x16 grid:
//!
//! ```text
//! cell 0 | cell 1
//! cell 2 | cell 3
//! cell 4 | cell 5
//! cell 6 | cell 7
//! ```

/// Rows in the full grid.
pub const GRID_ROWS: usize = 16;
/// Columns in the full grid.
pub const GRID_COLS: usize = 16;

/// Fan rows within one cell.
pub const CELL_ROWS: usize = 4;
/// Fan columns within one cell.
pub const CELL_COLS: usize = 8;
/// Fans driven by one cell; also the width of a cell bitmask.
pub const FANS_PER_CELL: usize = CELL_ROWS * CELL_COLS;

/// Cells across one grid row.
pub const CELLS_PER_ROW: usize = GRID_COLS / CELL_COLS;
/// Number of cell nodes on the bus.
pub const NUM_CELLS: usize = (GRID_ROWS / CELL_ROWS) * CELLS_PER_ROW;

/// Bus address of the master node. Cells use 0..NUM_CELLS.
pub const MASTER_ADDRESS: u8 = NUM_CELLS as u8;

const _: () = assert!(GRID_ROWS % CELL_ROWS == 0);
const _: () = assert!(GRID_COLS % CELL_COLS == 0);
const _: () = assert!(FANS_PER_CELL == u32::BITS as usize);
const _: () = assert!(NUM_CELLS == 8);
