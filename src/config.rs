use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    net::{Ipv4Addr, SocketAddrV4},
    path::Path,
    time::Duration,
};

/// default viewer ip
const VIEWER_IP: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

/// default viewer port
const VIEWER_PORT: u16 = 8282;

#[derive(Debug)]
pub enum ConfigError {
    ReadError(io::Error),
    ParseError(serde_json::Error),
    InvalidValue(&'static str),
}

/// Tunables of a simulation run. Every field has a default so a config file only needs the
/// values it overrides. Durations are in milliseconds.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// wall bounces a free ball survives
    pub bounce_limit: u32,
    /// period of a ball's update and of the render tick
    pub tick_ms: u64,
    pub spawn_delay_min_ms: u64,
    pub spawn_delay_max_ms: u64,
    pub obstacle_speed_min: f64,
    pub obstacle_speed_max: f64,
    /// attached balls needed to trigger an ejection
    pub attach_capacity: usize,
    /// time after an ejection during which a ball can't attach again
    pub cooldown_ms: u64,
    pub ball_radius: f64,
    /// seeds the shared random source, entropy when absent
    pub seed: Option<u64>,
    pub viewer_addr: SocketAddrV4,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            bounce_limit: 5,
            tick_ms: 16,
            spawn_delay_min_ms: 2_000,
            spawn_delay_max_ms: 10_000,
            obstacle_speed_min: 0.01,
            obstacle_speed_max: 0.03,
            attach_capacity: 4,
            cooldown_ms: 400,
            ball_radius: 0.1,
            seed: None,
            viewer_addr: SocketAddrV4::new(VIEWER_IP, VIEWER_PORT),
        }
    }
}

impl SimulationConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::InvalidValue("tick_ms must be positive"));
        }
        if self.spawn_delay_min_ms > self.spawn_delay_max_ms {
            return Err(ConfigError::InvalidValue(
                "spawn_delay_min_ms must not exceed spawn_delay_max_ms",
            ));
        }
        if self.obstacle_speed_min > self.obstacle_speed_max {
            return Err(ConfigError::InvalidValue(
                "obstacle_speed_min must not exceed obstacle_speed_max",
            ));
        }
        if self.attach_capacity == 0 {
            return Err(ConfigError::InvalidValue("attach_capacity must be positive"));
        }
        if self.ball_radius <= 0. {
            return Err(ConfigError::InvalidValue("ball_radius must be positive"));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn spawn_delay_min(&self) -> Duration {
        Duration::from_millis(self.spawn_delay_min_ms)
    }

    pub fn spawn_delay_max(&self) -> Duration {
        Duration::from_millis(self.spawn_delay_max_ms)
    }
}
