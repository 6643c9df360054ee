use crate::bus::SerialPort;
use crate::cell::{CellController, CellReport};
use crate::clock::Clock;
use crate::config::Timing;
use crate::error::{ConfigError, ConfigResult};
use crate::fan::FanDriver;
use crate::layout::{MASTER_ADDRESS, NUM_CELLS};
use crate::master::{CycleReport, MasterController};

/// A node's control loop, one cooperative cycle at a time.
pub trait Controller {
    type Report;

    /// One-time power-up sequence.
    fn begin(&mut self);

    /// Run one pass of the loop. Never fails; problems are logged and
    /// retried on the next pass.
    fn run_cycle(&mut self) -> Self::Report;
}

/// What a board does on the bus, decided by its hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Cell(u8),
}

impl Role {
    pub fn from_address(address: u8) -> ConfigResult<Role> {
        match address {
            MASTER_ADDRESS => Ok(Role::Master),
            a if (a as usize) < NUM_CELLS => Ok(Role::Cell(a)),
            a => Err(ConfigError::InvalidAddress(a)),
        }
    }

    pub fn address(&self) -> u8 {
        match self {
            Role::Master => MASTER_ADDRESS,
            Role::Cell(a) => *a,
        }
    }
}

/// Board-level discovery of the node's role, e.g. from address jumpers.
pub trait RoleSource {
    fn discover(&self) -> ConfigResult<Role>;
}

/// A role source for a known, fixed bus address.
#[derive(Debug, Clone, Copy)]
pub struct FixedAddress(pub u8);

impl RoleSource for FixedAddress {
    fn discover(&self) -> ConfigResult<Role> {
        Role::from_address(self.0)
    }
}

/// A node whose role was chosen at start-up.
pub enum Node<P, C, D> {
    Master(MasterController<P, C>),
    Cell(CellController<P, C, D>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeReport {
    Master(CycleReport),
    Cell(CellReport),
}

impl<P, C, D> Node<P, C, D>
where
    P: SerialPort,
    C: Clock + Clone,
    D: FanDriver,
{
    /// Discover the role and build the matching controller.
    ///
    /// Every board carries fans, but only cells drive them; the master
    /// drops its driver.
    pub fn start(
        source: &impl RoleSource,
        port: P,
        driver: D,
        clock: C,
        timing: Timing,
    ) -> ConfigResult<Self> {
        timing.validate()?;
        let role = source.discover()?;
        log::info!("starting as {role:?}");
        Ok(match role {
            Role::Master => Node::Master(MasterController::new(port, clock, timing)),
            Role::Cell(address) => {
                Node::Cell(CellController::new(address, port, driver, clock, timing))
            }
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Node::Master(_) => Role::Master,
            Node::Cell(cell) => Role::Cell(cell.address()),
        }
    }

    /// Run the power-up sequence and then `cycles` passes, or forever.
    pub fn run(&mut self, cycles: Option<u64>) {
        self.begin();
        let mut done = 0u64;
        while cycles.map_or(true, |limit| done < limit) {
            self.run_cycle();
            done += 1;
        }
    }
}

impl<P, C, D> Controller for Node<P, C, D>
where
    P: SerialPort,
    C: Clock + Clone,
    D: FanDriver,
{
    type Report = NodeReport;

    fn begin(&mut self) {
        match self {
            Node::Master(m) => Controller::begin(m),
            Node::Cell(c) => Controller::begin(c),
        }
    }

    fn run_cycle(&mut self) -> NodeReport {
        match self {
            Node::Master(m) => NodeReport::Master(m.run_cycle()),
            Node::Cell(c) => NodeReport::Cell(c.run_cycle()),
        }
    }
}
