use crate::clock::{Clock, Stopwatch};
use crate::error::{BusError, BusResult};

use super::packet::{BusPacket, Opcode, PACKET_SIZE};

/// Transmit framing mode of the UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Bytes are flagged as receiver addresses.
    Mark,
    /// Bytes are payload for the last addressed receiver.
    Space,
}

/// Raw byte-level access to the node's UART.
///
/// The receive buffer only collects bytes addressed to this node; the
/// filtering happens below this trait.
pub trait SerialPort {
    fn clear_rx(&mut self);
    fn rx_len(&mut self) -> usize;
    fn read_rx(&mut self) -> Option<u8>;
    fn set_tx_mode(&mut self, mode: TxMode);
    fn put_bytes(&mut self, bytes: &[u8]);
}

/// Framed packet channel over a [`SerialPort`].
///
/// A receive succeeds only once exactly [`PACKET_SIZE`] bytes are
/// buffered. Every wait is bounded, and on expiry the buffer is thrown
/// away so the next exchange starts clean.
pub struct BusTransport<P, C> {
    port: P,
    clock: C,
    rx_comm_timeout_ms: u32,
    rx_timer: Option<Stopwatch>,
}

impl<P: SerialPort, C: Clock> BusTransport<P, C> {
    pub fn new(port: P, clock: C, rx_comm_timeout_ms: u32) -> Self {
        Self {
            port,
            clock,
            rx_comm_timeout_ms,
            rx_timer: None,
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Send one packet to `address`.
    ///
    /// The receive buffer is cleared first so a stale reply can never be
    /// taken as the answer to this packet.
    pub fn send(&mut self, address: u8, opcode: Opcode, payload: u32) {
        self.port.clear_rx();
        self.rx_timer = None;
        let frame = BusPacket::new(address, opcode, payload).encode();
        self.port.set_tx_mode(TxMode::Mark);
        self.port.put_bytes(&frame[..1]);
        self.port.set_tx_mode(TxMode::Space);
        self.port.put_bytes(&frame[1..]);
    }

    /// Block until a full packet arrives or `timeout_ms` elapses.
    pub fn try_receive(&mut self, timeout_ms: u32) -> BusResult<BusPacket> {
        let timer = Stopwatch::start(&self.clock);
        loop {
            if self.port.rx_len() == PACKET_SIZE {
                return self.take_packet();
            }
            if timer.has_elapsed(&self.clock, timeout_ms) {
                self.port.clear_rx();
                return Err(BusError::Timeout {
                    waited_ms: timeout_ms,
                });
            }
            self.clock.sleep_ms(1);
        }
    }

    /// Non-blocking receive for the cell loop.
    ///
    /// A partial packet arms the communication timer; if it has not
    /// completed when the timer expires the bytes are discarded.
    /// Malformed packets are discarded without an answer.
    pub fn poll(&mut self) -> Option<BusPacket> {
        match self.port.rx_len() {
            0 => {
                self.rx_timer = None;
                None
            }
            PACKET_SIZE => {
                self.rx_timer = None;
                match self.take_packet() {
                    Ok(packet) => Some(packet),
                    Err(e) => {
                        log::warn!("discarding packet: {e}");
                        None
                    }
                }
            }
            len => {
                match self.rx_timer {
                    None => self.rx_timer = Some(Stopwatch::start(&self.clock)),
                    Some(timer) if timer.has_elapsed(&self.clock, self.rx_comm_timeout_ms) => {
                        log::debug!(
                            "discarding {len} stale bytes after {}ms",
                            self.rx_comm_timeout_ms
                        );
                        self.rx_timer = None;
                        self.port.clear_rx();
                    }
                    Some(_) => {}
                }
                None
            }
        }
    }

    fn take_packet(&mut self) -> BusResult<BusPacket> {
        let mut frame = [0u8; PACKET_SIZE];
        for byte in &mut frame {
            // rx_len already reported a full packet
            *byte = self.port.read_rx().unwrap_or_default();
        }
        self.port.clear_rx();
        BusPacket::decode(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::clock::ManualClock;

    fn pair() -> (MemoryBus, ManualClock, BusTransport<crate::bus::MemoryPort, ManualClock>) {
        let bus = MemoryBus::new();
        let clock = ManualClock::new();
        let transport = BusTransport::new(bus.attach(8), clock.clone(), 300);
        (bus, clock, transport)
    }

    #[test]
    fn receive_full_packet() {
        let (bus, _clock, mut transport) = pair();
        bus.inject(8, &[8, 0, 0, 0, 0x01, 0x02]);
        let pkt = transport.try_receive(500).unwrap();
        assert_eq!(pkt.payload, 0x0102);
        assert_eq!(bus.pending(8), 0);
    }

    #[test]
    fn receive_times_out_and_discards_partial() {
        let (bus, clock, mut transport) = pair();
        bus.inject(8, &[8, 0, 0]);
        let start = clock.now_ms();
        let err = transport.try_receive(500).unwrap_err();
        assert_eq!(err, BusError::Timeout { waited_ms: 500 });
        assert!(clock.elapsed_since(start) >= 500);
        assert_eq!(bus.pending(8), 0);
    }

    #[test]
    fn send_clears_stale_reply() {
        let (bus, _clock, mut transport) = pair();
        let mut cell0 = bus.attach(0);
        let mut cell1 = bus.attach(1);

        // First request is answered, but the master never reads the answer.
        transport.send(0, Opcode::Write, 0xaaaa);
        cell0.set_tx_mode(TxMode::Mark);
        cell0.put_bytes(&[8]);
        cell0.set_tx_mode(TxMode::Space);
        cell0.put_bytes(&[1, 0, 0, 0xaa, 0xaa]);
        assert_eq!(bus.pending(8), PACKET_SIZE);

        transport.send(1, Opcode::Write, 0xbbbb);
        assert_eq!(bus.pending(8), 0);
        cell1.set_tx_mode(TxMode::Mark);
        cell1.put_bytes(&[8]);
        cell1.set_tx_mode(TxMode::Space);
        cell1.put_bytes(&[1, 0, 0, 0xbb, 0xbb]);

        let reply = transport.try_receive(500).unwrap();
        assert_eq!(reply.payload, 0xbbbb);
    }

    #[test]
    fn poll_discards_partial_after_comm_timeout() {
        let (bus, clock, mut transport) = pair();
        bus.inject(8, &[8, 1]);
        assert!(transport.poll().is_none());
        clock.advance(299);
        assert!(transport.poll().is_none());
        assert_eq!(bus.pending(8), 2);
        clock.advance(1);
        assert!(transport.poll().is_none());
        assert_eq!(bus.pending(8), 0);
    }

    #[test]
    fn poll_discards_malformed() {
        let (bus, _clock, mut transport) = pair();
        bus.inject(8, &[8, 0x7f, 0, 0, 0, 0]);
        assert!(transport.poll().is_none());
        assert_eq!(bus.pending(8), 0);
    }

    #[test]
    fn poll_returns_complete_packet() {
        let (bus, _clock, mut transport) = pair();
        bus.inject(8, &[8, 1, 0xff, 0, 0, 0]);
        let pkt = transport.poll().unwrap();
        assert_eq!(pkt.opcode, Opcode::Write);
        assert_eq!(pkt.payload, 0xff00_0000);
    }
}
