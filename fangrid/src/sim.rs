//! Simulated hardware: fans with spin-down, and a whole installation of
//! one master and eight cells on an in-memory bus.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::{MemoryBus, MemoryPort, SerialPort, TxMode};
use crate::cell::{CellController, CellReport};
use crate::clock::{Clock, ManualClock, Stopwatch};
use crate::config::Timing;
use crate::fan::FanDriver;
use crate::grid::Grid;
use crate::layout::{FANS_PER_CELL, MASTER_ADDRESS, NUM_CELLS};
use crate::mapper;
use crate::master::{CycleReport, MasterController};
use crate::node::Controller;

#[derive(Debug, Clone, Copy, Default)]
struct FanModel {
    powered: bool,
    /// When power was last applied.
    powered_at: Option<Stopwatch>,
    /// Already turning when power was applied, so no spin-up is needed.
    running_at_power_on: bool,
    coasting: Option<Stopwatch>,
    held: Option<Stopwatch>,
}

#[derive(Debug)]
struct PanelState {
    fans: [FanModel; FANS_PER_CELL],
    spin_up_ms: u32,
    spin_down_ms: u32,
    hold_ms: u32,
}

/// Fan spin-up time used unless [`FanPanel::with_spin_up_ms`] says otherwise.
pub const DEFAULT_SPIN_UP_MS: u32 = 50;

/// Physical model of one cell's 32 fans.
///
/// A fan spins once it has been powered for `spin_up_ms`. A spinning fan
/// that loses power, or a fan flicked by hand, coasts for `spin_down_ms`;
/// a fan switched off before it spun up never turns. A held fan reads as
/// stopped for `hold_ms` and loses its momentum. Clones share the same
/// fans.
#[derive(Debug, Clone)]
pub struct FanPanel {
    state: Rc<RefCell<PanelState>>,
    clock: ManualClock,
}

impl FanPanel {
    pub fn new(clock: ManualClock, spin_down_ms: u32, hold_ms: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(PanelState {
                fans: [FanModel::default(); FANS_PER_CELL],
                spin_up_ms: DEFAULT_SPIN_UP_MS,
                spin_down_ms,
                hold_ms,
            })),
            clock,
        }
    }

    pub fn with_spin_up_ms(self, spin_up_ms: u32) -> Self {
        self.state.borrow_mut().spin_up_ms = spin_up_ms;
        self
    }

    /// Flick a fan by hand so it starts spinning.
    pub fn spin(&self, fan: usize) {
        let mut state = self.state.borrow_mut();
        let model = &mut state.fans[fan];
        model.held = None;
        model.coasting = Some(Stopwatch::start(&self.clock));
        if model.powered {
            model.running_at_power_on = true;
        }
    }

    /// Grab a fan and hold it still.
    pub fn hold(&self, fan: usize) {
        let mut state = self.state.borrow_mut();
        let model = &mut state.fans[fan];
        model.held = Some(Stopwatch::start(&self.clock));
        model.coasting = None;
    }

    /// Mask of fans currently receiving power.
    pub fn powered(&self) -> u32 {
        let state = self.state.borrow();
        state
            .fans
            .iter()
            .enumerate()
            .filter(|(_, f)| f.powered)
            .fold(0, |m, (i, _)| m | 1 << i)
    }

    /// Mask of fans physically spinning right now.
    pub fn spinning(&self) -> u32 {
        let state = self.state.borrow();
        state
            .fans
            .iter()
            .enumerate()
            .filter(|(_, f)| self.is_spinning(f, &state))
            .fold(0, |m, (i, _)| m | 1 << i)
    }

    fn is_held(&self, fan: &FanModel, state: &PanelState) -> bool {
        fan.held
            .is_some_and(|t| !t.has_elapsed(&self.clock, state.hold_ms))
    }

    fn is_spun_up(&self, fan: &FanModel, state: &PanelState) -> bool {
        // A released fan has to spin up again.
        let released = fan.held.map_or(true, |t| {
            t.has_elapsed(&self.clock, state.hold_ms.saturating_add(state.spin_up_ms))
        });
        fan.powered
            && released
            && (fan.running_at_power_on
                || fan
                    .powered_at
                    .is_some_and(|t| t.has_elapsed(&self.clock, state.spin_up_ms)))
    }

    fn is_coasting(&self, fan: &FanModel, state: &PanelState) -> bool {
        fan.coasting
            .is_some_and(|t| !t.has_elapsed(&self.clock, state.spin_down_ms))
    }

    fn is_spinning(&self, fan: &FanModel, state: &PanelState) -> bool {
        if self.is_held(fan, state) {
            return false;
        }
        self.is_spun_up(fan, state) || self.is_coasting(fan, state)
    }
}

impl FanDriver for FanPanel {
    fn set_outputs(&mut self, mask: u32) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        for i in 0..FANS_PER_CELL {
            let on = mask & (1 << i) != 0;
            let fan = state.fans[i];
            let spinning = self.is_spinning(&fan, state);
            let next = &mut state.fans[i];
            if on && !fan.powered {
                next.powered_at = Some(Stopwatch::start(&self.clock));
                next.running_at_power_on = spinning;
                next.coasting = None;
            } else if !on && fan.powered {
                next.powered_at = None;
                next.running_at_power_on = false;
                if spinning {
                    next.coasting = Some(Stopwatch::start(&self.clock));
                }
            }
            next.powered = on;
        }
    }

    fn read_raw_status(&mut self) -> u32 {
        self.spinning()
    }
}

pub type SimCell = CellController<MemoryPort, ManualClock, FanPanel>;

/// The master's bus connection in a simulation.
///
/// Polling the receive buffer gives every cell a chance to service the
/// bus, standing in for the cells running concurrently.
pub struct MasterLink {
    port: MemoryPort,
    cells: Rc<RefCell<Vec<SimCell>>>,
    offline: Rc<RefCell<[bool; NUM_CELLS]>>,
}

impl MasterLink {
    fn pump(&mut self) {
        let offline = *self.offline.borrow();
        for cell in self.cells.borrow_mut().iter_mut() {
            if !offline[cell.address() as usize] {
                cell.service_bus();
            }
        }
    }
}

impl SerialPort for MasterLink {
    fn clear_rx(&mut self) {
        self.port.clear_rx();
    }

    fn rx_len(&mut self) -> usize {
        self.pump();
        self.port.rx_len()
    }

    fn read_rx(&mut self) -> Option<u8> {
        self.port.read_rx()
    }

    fn set_tx_mode(&mut self, mode: TxMode) {
        self.port.set_tx_mode(mode);
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.port.put_bytes(bytes);
    }
}

/// Tunables for [`Installation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimParams {
    pub timing: Timing,
    /// How long a powered fan takes to start spinning.
    pub spin_up_ms: u32,
    /// How long an unpowered fan keeps spinning.
    pub spin_down_ms: u32,
    /// How long a hand holds a fan still.
    pub hold_ms: u32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            timing: Timing::default(),
            spin_up_ms: DEFAULT_SPIN_UP_MS,
            spin_down_ms: 4000,
            hold_ms: 1000,
        }
    }
}

/// Result of one installation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationReport {
    pub time_ms: u32,
    pub cells: Vec<CellReport>,
    pub master: CycleReport,
}

/// One master and eight cells sharing a bus and a clock.
pub struct Installation {
    clock: ManualClock,
    bus: MemoryBus,
    panels: Vec<FanPanel>,
    cells: Rc<RefCell<Vec<SimCell>>>,
    offline: Rc<RefCell<[bool; NUM_CELLS]>>,
    master: MasterController<MasterLink, ManualClock>,
}

impl Installation {
    pub fn new(params: SimParams) -> Self {
        let clock = ManualClock::new();
        let bus = MemoryBus::new();

        let mut panels = Vec::with_capacity(NUM_CELLS);
        let mut cells = Vec::with_capacity(NUM_CELLS);
        for address in 0..NUM_CELLS as u8 {
            let panel = FanPanel::new(clock.clone(), params.spin_down_ms, params.hold_ms)
                .with_spin_up_ms(params.spin_up_ms);
            cells.push(CellController::new(
                address,
                bus.attach(address),
                panel.clone(),
                clock.clone(),
                params.timing,
            ));
            panels.push(panel);
        }
        let cells = Rc::new(RefCell::new(cells));
        let offline = Rc::new(RefCell::new([false; NUM_CELLS]));

        let link = MasterLink {
            port: bus.attach(MASTER_ADDRESS),
            cells: Rc::clone(&cells),
            offline: Rc::clone(&offline),
        };
        let master = MasterController::new(link, clock.clone(), params.timing);

        Self {
            clock,
            bus,
            panels,
            cells,
            offline,
            master,
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    pub fn master(&self) -> &MasterController<MasterLink, ManualClock> {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut MasterController<MasterLink, ManualClock> {
        &mut self.master
    }

    /// Power up every cell, then the master.
    pub fn begin(&mut self) {
        for cell in self.cells.borrow_mut().iter_mut() {
            cell.begin();
        }
        self.master.begin();
    }

    /// Show `grid` on the fans and make it the master's grid.
    pub fn seed(&mut self, grid: &Grid) {
        self.master.seed(grid);
    }

    /// Disconnect or reconnect a cell from the bus.
    pub fn set_offline(&mut self, cell: usize, offline: bool) {
        self.offline.borrow_mut()[cell] = offline;
        self.bus.set_connected(cell as u8, !offline);
    }

    /// Flick the fan at grid position `(row, col)`.
    pub fn touch(&self, row: usize, col: usize) {
        let cell = mapper::cell_index(row, col);
        self.panels[cell].spin(mapper::bit_index(row, col));
    }

    /// Hold the fan at grid position `(row, col)` still.
    pub fn hold(&self, row: usize, col: usize) {
        let cell = mapper::cell_index(row, col);
        self.panels[cell].hold(mapper::bit_index(row, col));
    }

    /// Which fans are physically spinning, as a grid.
    pub fn observed_grid(&self) -> Grid {
        let mut states = [0u32; NUM_CELLS];
        for (state, panel) in states.iter_mut().zip(&self.panels) {
            *state = panel.spinning();
        }
        mapper::cells_to_grid(&states)
    }

    /// Refresh every cell's fans, then run one master cycle.
    pub fn cycle(&mut self) -> InstallationReport {
        let offline = *self.offline.borrow();
        let mut cells = Vec::with_capacity(NUM_CELLS);
        for cell in self.cells.borrow_mut().iter_mut() {
            let report = if offline[cell.address() as usize] {
                let human_input = cell.refresh_fans();
                CellReport {
                    state: cell.state(),
                    human_input,
                    handled: None,
                }
            } else {
                cell.run_cycle()
            };
            cells.push(report);
        }
        let master = self.master.run_cycle();
        InstallationReport {
            time_ms: self.clock.now_ms(),
            cells,
            master,
        }
    }
}
