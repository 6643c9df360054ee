use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no complete packet within {waited_ms}ms")]
    Timeout { waited_ms: u32 },

    #[error("cell {cell} did not respond within {timeout_ms}ms")]
    SlaveUnresponsive { cell: u8, timeout_ms: u32 },

    #[error("malformed packet: unknown opcode {opcode:#04x}")]
    Malformed { opcode: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("bus address {0} is neither a cell (0..=7) nor the master (8)")]
    InvalidAddress(u8),

    #[error("invalid timing: {0}")]
    InvalidTiming(String),

    #[error("config parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("expected {expected} rows, got {got}")]
    RowCount { expected: usize, got: usize },

    #[error("row {row} has {len} cells, expected {expected}")]
    RowLength { row: usize, len: usize, expected: usize },

    #[error("invalid character '{0}' at row {1}, column {2}")]
    InvalidChar(char, usize, usize),
}

pub type BusResult<T> = Result<T, BusError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
