use crate::bus::{BusTransport, ConfigOption, Opcode, SerialPort};
use crate::clock::Clock;
use crate::config::Timing;
use crate::fan::{FanBank, FanDriver, Validators};
use crate::layout::MASTER_ADDRESS;
use crate::node::Controller;

/// Cosmetic drive settings, changed only by a `Config` command.
///
/// A zero duration disables the effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellConfig {
    pub pulse_ms: u32,
    pub pwm_ms: u32,
}

impl CellConfig {
    pub fn apply(&mut self, option: ConfigOption, duration_ms: u8) {
        match option {
            ConfigOption::Pulse => self.pulse_ms = u32::from(duration_ms),
            ConfigOption::Pwm => self.pwm_ms = u32::from(duration_ms),
        }
    }
}

/// Outcome of one cell cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellReport {
    /// Fan state reported to the master after this cycle.
    pub state: u32,
    /// The visible state changed without a command, i.e. someone touched a fan.
    pub human_input: bool,
    /// Request serviced this cycle, if any.
    pub handled: Option<Opcode>,
}

/// Control loop of one 4x8 cell.
pub struct CellController<P, C, D> {
    address: u8,
    transport: BusTransport<P, C>,
    fans: FanBank<D, C>,
    validators: Validators,
    clock: C,
    timing: Timing,
    state: u32,
    config: CellConfig,
}

impl<P, C, D> CellController<P, C, D>
where
    P: SerialPort,
    C: Clock + Clone,
    D: FanDriver,
{
    pub fn new(address: u8, port: P, driver: D, clock: C, timing: Timing) -> Self {
        Self {
            address,
            transport: BusTransport::new(port, clock.clone(), timing.rx_comm_timeout_ms),
            fans: FanBank::new(driver, clock.clone(), timing.fan_detect_ms),
            validators: Validators::new(timing.fan_set_timeout_ms),
            clock,
            timing,
            state: 0,
            config: CellConfig::default(),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// The human-visible fan state last reported or commanded.
    pub fn state(&self) -> u32 {
        self.state
    }

    pub fn config(&self) -> CellConfig {
        self.config
    }

    pub fn validators(&self) -> &Validators {
        &self.validators
    }

    pub fn driver(&self) -> &D {
        self.fans.driver()
    }

    /// Power-up: drive every fan off and wait for them to stop.
    pub fn begin(&mut self) {
        self.state = self.fans.set_state(0, self.timing.fan_set_timeout_ms);
        log::info!("cell {} started, fans {:#010x}", self.address, self.state);
    }

    /// Read the fans, filter spin-down, and follow any human input.
    ///
    /// Returns true if the visible state changed. Blocks for the
    /// two-sample readout.
    pub fn refresh_fans(&mut self) -> bool {
        self.run_cosmetics();

        let old = self.state;
        let observed = self.fans.read_state();
        let visible = self.validators.filter(observed, &self.clock);
        if visible != old {
            log::debug!(
                "cell {}: human input {old:#010x} -> {visible:#010x}",
                self.address
            );
            // Hand-moved fans need no confirmation.
            self.fans.set_state(visible, 0);
        }
        self.state = visible;
        visible != old
    }

    /// Answer at most one pending request from the master.
    pub fn service_bus(&mut self) -> Option<Opcode> {
        let packet = self.transport.poll()?;
        if packet.address != self.address {
            log::debug!(
                "cell {}: ignoring packet for {}",
                self.address,
                packet.address
            );
            return None;
        }

        match packet.opcode {
            Opcode::Read => {
                self.transport.send(MASTER_ADDRESS, Opcode::Read, self.state);
            }
            Opcode::Write => {
                // Acknowledge before the fans change.
                self.transport.send(MASTER_ADDRESS, Opcode::Write, self.state);
                self.apply_command(packet.payload);
            }
            Opcode::Config => match ConfigOption::parse(packet.payload) {
                Some((option, duration_ms)) => {
                    self.config.apply(option, duration_ms);
                    log::info!("cell {}: {option:?} set to {duration_ms}ms", self.address);
                }
                None => log::warn!(
                    "cell {}: unknown config payload {:#010x}",
                    self.address,
                    packet.payload
                ),
            },
        }
        Some(packet.opcode)
    }

    fn apply_command(&mut self, target: u32) {
        let armed = self.validators.arm_transitions(self.state, target, &self.clock);
        if armed != 0 {
            log::debug!("cell {}: validating {armed:#010x}", self.address);
        }
        self.state = self.fans.set_state(target, 0);
    }

    fn run_cosmetics(&mut self) {
        if self.config.pulse_ms != 0 {
            self.fans.set_state(u32::MAX, 0);
            self.clock.sleep_ms(self.config.pulse_ms);
            self.fans.set_state(self.state, 0);
        }
        if self.config.pwm_ms != 0 {
            self.fans.set_state(self.state, 0);
            self.clock.sleep_ms(self.config.pwm_ms);
            self.fans.set_state(0, 0);
        }
    }
}

impl<P, C, D> Controller for CellController<P, C, D>
where
    P: SerialPort,
    C: Clock + Clone,
    D: FanDriver,
{
    type Report = CellReport;

    fn begin(&mut self) {
        CellController::begin(self);
    }

    fn run_cycle(&mut self) -> CellReport {
        let human_input = self.refresh_fans();
        let handled = self.service_bus();
        CellReport {
            state: self.state,
            human_input,
            handled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusPacket, MemoryBus, MemoryPort, PACKET_SIZE};
    use crate::clock::ManualClock;
    use crate::sim::FanPanel;

    struct Rig {
        bus: MemoryBus,
        clock: ManualClock,
        panel: FanPanel,
        cell: CellController<MemoryPort, ManualClock, FanPanel>,
    }

    fn rig(spin_down_ms: u32) -> Rig {
        let bus = MemoryBus::new();
        bus.attach(MASTER_ADDRESS);
        let clock = ManualClock::new();
        let panel = FanPanel::new(clock.clone(), spin_down_ms, 1000);
        let cell = CellController::new(
            3,
            bus.attach(3),
            panel.clone(),
            clock.clone(),
            Timing::default(),
        );
        Rig {
            bus,
            clock,
            panel,
            cell,
        }
    }

    fn request(bus: &MemoryBus, opcode: Opcode, payload: u32) {
        bus.inject(3, &BusPacket::new(3, opcode, payload).encode());
    }

    fn reply(bus: &MemoryBus) -> Option<BusPacket> {
        let mut port = bus.attach(MASTER_ADDRESS);
        if port.rx_len() != PACKET_SIZE {
            return None;
        }
        let mut frame = [0u8; PACKET_SIZE];
        for b in &mut frame {
            *b = port.read_rx().unwrap();
        }
        BusPacket::decode(&frame).ok()
    }

    #[test]
    fn read_replies_with_state() {
        let mut r = rig(4000);
        r.panel.spin(5);
        r.cell.refresh_fans();
        request(&r.bus, Opcode::Read, 0);
        assert_eq!(r.cell.service_bus(), Some(Opcode::Read));
        let pkt = reply(&r.bus).unwrap();
        assert_eq!(pkt.address, MASTER_ADDRESS);
        assert_eq!(pkt.payload, 1 << 5);
    }

    #[test]
    fn write_echoes_prewrite_state_then_applies() {
        let mut r = rig(4000);
        request(&r.bus, Opcode::Write, 0b1100);
        r.cell.service_bus();
        let ack = reply(&r.bus).unwrap();
        assert_eq!(ack.opcode, Opcode::Write);
        assert_eq!(ack.payload, 0);
        assert_eq!(r.cell.state(), 0b1100);
        assert_eq!(r.panel.powered(), 0b1100);
    }

    #[test]
    fn commanded_spin_down_is_not_human_input() {
        let mut r = rig(8000);
        request(&r.bus, Opcode::Write, 0b1);
        r.cell.service_bus();
        r.cell.refresh_fans();

        request(&r.bus, Opcode::Write, 0);
        r.cell.service_bus();
        assert_eq!(r.cell.validators().armed_mask(), 0b1);

        // Still coasting, inside the validation window.
        while r.clock.now_ms() < 5500 {
            assert!(!r.cell.refresh_fans());
            assert_eq!(r.cell.state(), 0);
        }

        // Window over while the fan still spins: now it counts.
        r.clock.set(6000);
        assert!(r.cell.refresh_fans());
        assert_eq!(r.cell.state(), 0b1);
    }

    #[test]
    fn fan_stopping_early_ends_validation() {
        let mut r = rig(1000);
        request(&r.bus, Opcode::Write, 0b10);
        r.cell.service_bus();
        request(&r.bus, Opcode::Write, 0);
        r.cell.service_bus();
        r.clock.advance(1500);
        assert!(!r.cell.refresh_fans());
        assert_eq!(r.cell.validators().armed_mask(), 0);
    }

    #[test]
    fn hand_spun_fan_is_driven_on() {
        let mut r = rig(4000);
        r.panel.spin(7);
        assert!(r.cell.refresh_fans());
        assert_eq!(r.cell.state(), 1 << 7);
        assert_eq!(r.panel.powered(), 1 << 7);
    }

    #[test]
    fn repeated_write_arms_nothing_new() {
        let mut r = rig(4000);
        request(&r.bus, Opcode::Write, 0xff);
        r.cell.service_bus();
        request(&r.bus, Opcode::Write, 0x0f);
        r.cell.service_bus();
        let first = r.cell.validators().slot(4);
        r.clock.advance(300);
        request(&r.bus, Opcode::Write, 0x0f);
        r.cell.service_bus();
        assert_eq!(r.cell.validators().armed_mask(), 0xf0);
        assert_eq!(r.cell.validators().slot(4), first);
    }

    #[test]
    fn config_sets_cosmetics_without_reply() {
        let mut r = rig(4000);
        request(&r.bus, Opcode::Config, ConfigOption::Pulse.payload(20));
        assert_eq!(r.cell.service_bus(), Some(Opcode::Config));
        assert_eq!(r.cell.config().pulse_ms, 20);
        assert_eq!(r.cell.config().pwm_ms, 0);
        assert!(reply(&r.bus).is_none());
    }

    #[test]
    fn partial_packet_gets_no_reply() {
        let mut r = rig(4000);
        r.bus.inject(3, &[3, 0, 0]);
        assert_eq!(r.cell.service_bus(), None);
        r.clock.advance(Timing::default().rx_comm_timeout_ms);
        assert_eq!(r.cell.service_bus(), None);
        assert_eq!(r.bus.pending(3), 0);
        assert!(reply(&r.bus).is_none());
    }

    #[test]
    fn begin_waits_for_fans_to_stop() {
        let mut r = rig(2000);
        r.panel.spin(0);
        r.cell.begin();
        assert_eq!(r.cell.state(), 0);
        assert!(r.clock.now_ms() >= 2000);
    }

    /// Records every output mask; the tach always reads back `status`.
    #[derive(Default)]
    struct Recorder {
        outputs: Vec<u32>,
        status: u32,
    }

    impl FanDriver for Recorder {
        fn set_outputs(&mut self, mask: u32) {
            self.outputs.push(mask);
        }

        fn read_raw_status(&mut self) -> u32 {
            self.status
        }
    }

    fn recording_cell(
        status: u32,
    ) -> (MemoryBus, ManualClock, CellController<MemoryPort, ManualClock, Recorder>) {
        let bus = MemoryBus::new();
        bus.attach(MASTER_ADDRESS);
        let clock = ManualClock::new();
        let driver = Recorder {
            status,
            ..Recorder::default()
        };
        let cell = CellController::new(3, bus.attach(3), driver, clock.clone(), Timing::default());
        (bus, clock, cell)
    }

    #[test]
    fn pulse_flashes_all_fans_then_restores() {
        let (bus, clock, mut cell) = recording_cell(0);
        request(&bus, Opcode::Config, ConfigOption::Pulse.payload(20));
        cell.service_bus();

        let start = clock.now_ms();
        assert!(!cell.refresh_fans());
        assert_eq!(cell.driver().outputs, vec![u32::MAX, 0]);
        assert_eq!(
            clock.elapsed_since(start),
            20 + 2 * Timing::default().fan_detect_ms
        );
    }

    #[test]
    fn pwm_shows_state_then_blanks() {
        let (bus, _clock, mut cell) = recording_cell(0b101);
        request(&bus, Opcode::Write, 0b101);
        cell.service_bus();
        request(&bus, Opcode::Config, ConfigOption::Pwm.payload(30));
        cell.service_bus();

        assert!(!cell.refresh_fans());
        assert_eq!(cell.driver().outputs, vec![0b101, 0b101, 0]);
        assert_eq!(cell.state(), 0b101);
    }

    #[test]
    fn zero_duration_disables_cosmetics() {
        let (bus, _clock, mut cell) = recording_cell(0);
        request(&bus, Opcode::Config, ConfigOption::Pulse.payload(20));
        cell.service_bus();
        request(&bus, Opcode::Config, ConfigOption::Pulse.payload(0));
        cell.service_bus();

        cell.refresh_fans();
        assert!(cell.driver().outputs.is_empty());
    }

    #[test]
    fn pulse_on_idle_panel_is_not_human_input() {
        let mut r = rig(4000);
        request(&r.bus, Opcode::Config, ConfigOption::Pulse.payload(20));
        r.cell.service_bus();
        for _ in 0..3 {
            assert!(!r.cell.refresh_fans());
            assert_eq!(r.cell.state(), 0);
        }
        assert_eq!(r.panel.powered(), 0);
    }
}
