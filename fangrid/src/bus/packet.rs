use crate::error::{BusError, BusResult};

/// Bytes in every bus packet: address, opcode, and a 32-bit payload.
pub const PACKET_SIZE: usize = 6;

/// Operation carried in the second byte of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Read = 0,
    Write = 1,
    Config = 2,
}

impl TryFrom<u8> for Opcode {
    type Error = BusError;

    fn try_from(value: u8) -> BusResult<Self> {
        match value {
            0 => Ok(Opcode::Read),
            1 => Ok(Opcode::Write),
            2 => Ok(Opcode::Config),
            opcode => Err(BusError::Malformed { opcode }),
        }
    }
}

/// One addressed request or response on the bus.
///
/// Wire layout is `[address][opcode][b3][b2][b1][b0]`, payload MSB first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusPacket {
    pub address: u8,
    pub opcode: Opcode,
    pub payload: u32,
}

impl BusPacket {
    pub fn new(address: u8, opcode: Opcode, payload: u32) -> Self {
        Self {
            address,
            opcode,
            payload,
        }
    }

    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let [b3, b2, b1, b0] = self.payload.to_be_bytes();
        [self.address, self.opcode as u8, b3, b2, b1, b0]
    }

    pub fn decode(bytes: &[u8; PACKET_SIZE]) -> BusResult<Self> {
        let opcode = Opcode::try_from(bytes[1])?;
        let payload = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        Ok(Self {
            address: bytes[0],
            opcode,
            payload,
        })
    }
}

/// Sub-command of a `Config` packet, carried in payload byte 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigOption {
    /// Briefly pulse every fan on at the start of each cell cycle.
    Pulse = 1,
    /// Power the lit fans for only part of each cell cycle.
    Pwm = 2,
}

impl ConfigOption {
    /// Pack an option and its duration into a `Config` payload.
    pub fn payload(self, duration_ms: u8) -> u32 {
        u32::from_be_bytes([self as u8, duration_ms, 0, 0])
    }

    /// Split a `Config` payload; unknown options yield `None`.
    pub fn parse(payload: u32) -> Option<(ConfigOption, u8)> {
        let [option, duration_ms, _, _] = payload.to_be_bytes();
        let option = match option {
            1 => ConfigOption::Pulse,
            2 => ConfigOption::Pwm,
            _ => return None,
        };
        Some((option, duration_ms))
    }
}
