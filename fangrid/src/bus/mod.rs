pub mod packet;
pub mod transport;
pub mod memory;

pub use memory::{MemoryBus, MemoryPort};
pub use packet::{BusPacket, ConfigOption, Opcode, PACKET_SIZE};
pub use transport::{BusTransport, SerialPort, TxMode};
