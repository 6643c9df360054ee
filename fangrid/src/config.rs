use crate::error::{ConfigError, ConfigResult};

/// Timing constants shared by the master and cell loops, in milliseconds.
///
/// Defaults are tuned for the installed fans, which take roughly six
/// seconds to spin down after losing power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Timing {
    /// Gap between the two tach samples of a fan readout.
    pub fan_detect_ms: u32,
    /// How long a fan commanded off may keep spinning before the
    /// spinning counts as human input again.
    pub fan_set_timeout_ms: u32,
    /// A partial packet is discarded this long after its first byte.
    pub rx_comm_timeout_ms: u32,
    /// How long the master waits for a cell to answer.
    pub slave_response_ms: u32,
    /// Quiet period with no human input before the next generation.
    pub change_timer_ms: u32,
    /// Pause after each master exchange so the bus can turn around.
    pub bus_settle_ms: u32,
    /// Delay before the master's first write after power-up.
    pub startup_delay_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            fan_detect_ms: 100,
            fan_set_timeout_ms: 6000,
            rx_comm_timeout_ms: 300,
            slave_response_ms: 500,
            change_timer_ms: 6000,
            bus_settle_ms: 10,
            startup_delay_ms: 1000,
        }
    }
}

impl Timing {
    /// Check that the timing values are usable together.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.fan_detect_ms == 0 {
            return Err(ConfigError::InvalidTiming(
                "fan_detect_ms must be > 0".to_string(),
            ));
        }
        if self.slave_response_ms == 0 {
            return Err(ConfigError::InvalidTiming(
                "slave_response_ms must be > 0".to_string(),
            ));
        }
        if self.rx_comm_timeout_ms == 0 {
            return Err(ConfigError::InvalidTiming(
                "rx_comm_timeout_ms must be > 0".to_string(),
            ));
        }
        // A readout takes two sample gaps; a shorter window could never confirm.
        if self.fan_set_timeout_ms < 2 * self.fan_detect_ms {
            return Err(ConfigError::InvalidTiming(format!(
                "fan_set_timeout_ms ({}) must be at least two readouts ({})",
                self.fan_set_timeout_ms,
                2 * self.fan_detect_ms
            )));
        }
        Ok(())
    }

    /// Parse and validate timing from a TOML document.
    ///
    /// Missing keys fall back to their defaults.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(toml_str: &str) -> ConfigResult<Self> {
        let timing: Timing =
            toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
        timing.validate()?;
        Ok(timing)
    }
}
