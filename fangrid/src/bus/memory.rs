use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::transport::{SerialPort, TxMode};

#[derive(Debug, Default)]
struct Medium {
    rx: HashMap<u8, VecDeque<u8>>,
    unplugged: HashSet<u8>,
    frames: usize,
}

impl Medium {
    fn deliver(&mut self, dest: u8, byte: u8) {
        if self.unplugged.contains(&dest) {
            return;
        }
        if let Some(queue) = self.rx.get_mut(&dest) {
            queue.push_back(byte);
        }
    }
}

/// In-memory shared serial bus.
///
/// Each attached port owns a receive buffer. A byte sent in address mode
/// selects the receiver for itself and every following data byte, the
/// way the UART's hardware address filter does. Bytes for an address no
/// port is attached to are dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    medium: Rc<RefCell<Medium>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node with the given hardware address.
    pub fn attach(&self, address: u8) -> MemoryPort {
        self.medium.borrow_mut().rx.entry(address).or_default();
        MemoryPort {
            bus: self.clone(),
            address,
            mode: TxMode::Space,
            selected: None,
        }
    }

    /// Unplug or replug a node. An unplugged node receives nothing and
    /// loses whatever was buffered.
    pub fn set_connected(&self, address: u8, connected: bool) {
        let mut medium = self.medium.borrow_mut();
        if connected {
            medium.unplugged.remove(&address);
        } else {
            medium.unplugged.insert(address);
            if let Some(queue) = medium.rx.get_mut(&address) {
                queue.clear();
            }
        }
    }

    /// Push raw bytes into a node's receive buffer, bypassing framing.
    pub fn inject(&self, address: u8, bytes: &[u8]) {
        let mut medium = self.medium.borrow_mut();
        for &b in bytes {
            medium.deliver(address, b);
        }
    }

    /// Bytes waiting in a node's receive buffer.
    pub fn pending(&self, address: u8) -> usize {
        self.medium
            .borrow()
            .rx
            .get(&address)
            .map_or(0, VecDeque::len)
    }

    /// Number of address bytes ever sent, i.e. frames started.
    pub fn frames_sent(&self) -> usize {
        self.medium.borrow().frames
    }
}

/// One node's connection to a [`MemoryBus`].
#[derive(Debug)]
pub struct MemoryPort {
    bus: MemoryBus,
    address: u8,
    mode: TxMode,
    selected: Option<u8>,
}

impl MemoryPort {
    pub fn address(&self) -> u8 {
        self.address
    }
}

impl SerialPort for MemoryPort {
    fn clear_rx(&mut self) {
        if let Some(queue) = self.bus.medium.borrow_mut().rx.get_mut(&self.address) {
            queue.clear();
        }
    }

    fn rx_len(&mut self) -> usize {
        self.bus.pending(self.address)
    }

    fn read_rx(&mut self) -> Option<u8> {
        self.bus
            .medium
            .borrow_mut()
            .rx
            .get_mut(&self.address)
            .and_then(VecDeque::pop_front)
    }

    fn set_tx_mode(&mut self, mode: TxMode) {
        self.mode = mode;
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        let mut medium = self.bus.medium.borrow_mut();
        for &b in bytes {
            match self.mode {
                TxMode::Mark => {
                    self.selected = Some(b);
                    medium.frames += 1;
                    medium.deliver(b, b);
                }
                TxMode::Space => {
                    if let Some(dest) = self.selected {
                        medium.deliver(dest, b);
                    }
                }
            }
        }
    }
}
