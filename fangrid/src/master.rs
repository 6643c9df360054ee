use crate::bus::{BusTransport, ConfigOption, Opcode, SerialPort};
use crate::clock::{Clock, Stopwatch};
use crate::config::Timing;
use crate::error::{BusError, BusResult};
use crate::grid::Grid;
use crate::layout::NUM_CELLS;
use crate::life;
use crate::mapper;
use crate::node::Controller;

/// Fewest changed positions in one cycle that count as a person at work.
///
/// A single flipped fan is within what late spin-down validation can
/// produce, so it is ignored.
pub const HUMAN_CHANGE_THRESHOLD: usize = 2;

/// Outcome of one master cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Positions that differ from the previous cycle's grid.
    pub changed: usize,
    /// Which cells answered the readback.
    pub responsive: [bool; NUM_CELLS],
    /// The quiet period was restarted by human input.
    pub quiet_reset: bool,
    /// A Life generation was computed and pushed to the cells.
    pub evolved: bool,
}

impl CycleReport {
    pub fn responsive_count(&self) -> usize {
        self.responsive.iter().filter(|&&r| r).count()
    }
}

/// The master node: owns the grid, polls cells, and runs the simulation
/// whenever nobody has touched the fans for a while.
pub struct MasterController<P, C> {
    transport: BusTransport<P, C>,
    clock: C,
    timing: Timing,
    current: Grid,
    previous: Grid,
    change_timer: Stopwatch,
    generation: u64,
}

impl<P, C> MasterController<P, C>
where
    P: SerialPort,
    C: Clock + Clone,
{
    pub fn new(port: P, clock: C, timing: Timing) -> Self {
        let change_timer = Stopwatch::start(&clock);
        Self {
            transport: BusTransport::new(port, clock.clone(), timing.rx_comm_timeout_ms),
            clock,
            timing,
            current: Grid::new(),
            previous: Grid::new(),
            change_timer,
            generation: 0,
        }
    }

    pub fn port(&self) -> &P {
        self.transport.port()
    }

    pub fn port_mut(&mut self) -> &mut P {
        self.transport.port_mut()
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// The authoritative grid.
    pub fn current(&self) -> &Grid {
        &self.current
    }

    /// Snapshot taken at the start of the last cycle.
    pub fn previous(&self) -> &Grid {
        &self.previous
    }

    /// Generations computed since start-up.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn quiet_elapsed_ms(&self) -> u32 {
        self.change_timer.elapsed_ms(&self.clock)
    }

    /// Power-up: give the cells time to boot, then turn every fan off.
    pub fn begin(&mut self) {
        self.clock.sleep_ms(self.timing.startup_delay_ms);
        self.write_all(0);
        self.current = Grid::new();
        self.previous = Grid::new();
        self.change_timer = Stopwatch::start(&self.clock);
        log::info!("master started");
    }

    /// Replace the grid and drive the fans to match.
    pub fn seed(&mut self, grid: &Grid) {
        self.current = *grid;
        self.write_grid(grid);
        self.change_timer = Stopwatch::start(&self.clock);
    }

    /// Ask one cell for its visible fan state.
    pub fn read_cell(&mut self, cell: u8) -> BusResult<u32> {
        self.transport.send(cell, Opcode::Read, 0);
        let reply = self.await_reply(cell);
        self.clock.sleep_ms(self.timing.bus_settle_ms);
        reply
    }

    /// Command one cell's fans; returns the state the cell held before.
    pub fn write_cell(&mut self, cell: u8, state: u32) -> BusResult<u32> {
        self.transport.send(cell, Opcode::Write, state);
        let ack = self.await_reply(cell);
        if let Err(e) = &ack {
            log::debug!("write to cell {cell} unacknowledged: {e}");
        }
        self.clock.sleep_ms(self.timing.bus_settle_ms);
        ack
    }

    /// Set a cell's cosmetic pulse or PWM duration. Cells do not reply.
    pub fn configure_cell(&mut self, cell: u8, option: ConfigOption, duration_ms: u8) {
        self.transport
            .send(cell, Opcode::Config, option.payload(duration_ms));
        self.clock.sleep_ms(self.timing.bus_settle_ms);
    }

    /// Drive every cell to the same fan mask.
    pub fn write_all(&mut self, state: u32) {
        for cell in 0..NUM_CELLS as u8 {
            // Missing acknowledgements are already logged.
            let _ = self.write_cell(cell, state);
        }
    }

    /// Drive the fans to show `grid`.
    pub fn write_grid(&mut self, grid: &Grid) {
        let states = mapper::grid_to_cells(grid);
        for (cell, &state) in states.iter().enumerate() {
            let _ = self.write_cell(cell as u8, state);
        }
    }

    /// Refresh the grid from every cell.
    ///
    /// A cell that does not answer keeps its previous contribution.
    pub fn read_grid(&mut self) -> [bool; NUM_CELLS] {
        let mut responsive = [false; NUM_CELLS];
        for (cell, answered) in responsive.iter_mut().enumerate() {
            match self.read_cell(cell as u8) {
                Ok(state) => {
                    mapper::apply_cell(&mut self.current, cell, state);
                    *answered = true;
                }
                Err(e) => log::warn!("keeping last state of cell {cell}: {e}"),
            }
        }
        responsive
    }

    /// Compute the next generation and show it.
    pub fn evolve(&mut self) {
        self.current = life::step(&self.current);
        self.generation += 1;
        log::info!(
            "generation {} (population {})",
            self.generation,
            self.current.population()
        );
        let grid = self.current;
        self.write_grid(&grid);
    }

    fn await_reply(&mut self, cell: u8) -> BusResult<u32> {
        match self.transport.try_receive(self.timing.slave_response_ms) {
            Ok(packet) => Ok(packet.payload),
            Err(BusError::Timeout { .. }) => Err(BusError::SlaveUnresponsive {
                cell,
                timeout_ms: self.timing.slave_response_ms,
            }),
            Err(e) => Err(e),
        }
    }
}

impl<P, C> Controller for MasterController<P, C>
where
    P: SerialPort,
    C: Clock + Clone,
{
    type Report = CycleReport;

    fn begin(&mut self) {
        MasterController::begin(self);
    }

    fn run_cycle(&mut self) -> CycleReport {
        self.previous = self.current;
        let responsive = self.read_grid();

        let changed = self.current.diff_count(&self.previous);
        let quiet_reset = changed >= HUMAN_CHANGE_THRESHOLD;
        if quiet_reset {
            log::debug!("{changed} positions changed by hand, holding evolution");
            self.change_timer = Stopwatch::start(&self.clock);
        }

        let evolved = self
            .change_timer
            .has_elapsed(&self.clock, self.timing.change_timer_ms);
        if evolved {
            self.evolve();
            self.change_timer = Stopwatch::start(&self.clock);
        }

        CycleReport {
            changed,
            responsive,
            quiet_reset,
            evolved,
        }
    }
}
