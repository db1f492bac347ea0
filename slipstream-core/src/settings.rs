use config::{Config, ConfigError, File};
use lazy_static::lazy_static;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct Settings {
    pub port: String,
    pub relay_address: String,
    pub tick_rate: f64,
    pub poll_timeout_ms: u64,
    pub idle_timeout_ms: u64,

    pub max_laps: u32,
    pub track_file: String,

    pub turn_rate: f64,
    pub base_accel: f64,
    pub accel_ramp_secs: f64,
    pub brake_ramp_secs: f64,
    pub max_speed: f64,
    pub reverse_speed_divisor: f64,
    pub friction: f64,
    pub grass_penalty: f64,
    pub idle_friction_factor: f64,

    pub car_width: f64,
    pub car_height: f64,
    pub footprint_shrink: f64,
    pub on_track_threshold: f64,
    pub hazard_window_secs: f64,
}

impl Settings {
    fn new() -> Result<Settings, ConfigError> {
        let config = Config::builder()
            .set_default("port", "5555")?
            .set_default("relay_address", "127.0.0.1")?
            .set_default("tick_rate", 60.0)?
            .set_default("poll_timeout_ms", 1000)?
            .set_default("idle_timeout_ms", 10000)?
            .set_default("max_laps", 3)?
            .set_default("track_file", "")?
            .set_default("turn_rate", 288.0)?
            .set_default("base_accel", 0.1)?
            .set_default("accel_ramp_secs", 3.0)?
            .set_default("brake_ramp_secs", 2.0)?
            .set_default("max_speed", 9.5)?
            .set_default("reverse_speed_divisor", 2.5)?
            .set_default("friction", 0.01)?
            .set_default("grass_penalty", 0.4)?
            .set_default("idle_friction_factor", 1.5)?
            .set_default("car_width", 30.0)?
            .set_default("car_height", 20.0)?
            .set_default("footprint_shrink", 0.8)?
            .set_default("on_track_threshold", 0.3)?
            .set_default("hazard_window_secs", 0.5)?
            .add_source(File::with_name("config.yaml").required(false))
            .build()?;

        config.try_deserialize()
    }

    /// Duration of one simulation step in seconds.
    pub fn tick_seconds(&self) -> f64 {
        1.0 / self.tick_rate
    }
}

lazy_static! {
    pub static ref GLOBAL_CONFIG: Settings = Settings::new().expect("failed to read config file");
}
