//! Device agent configuration.
//!
//! Loaded from an optional YAML file; every field has a default matching
//! the deployed field units, so an empty file (or none) is a valid config.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::device::hardware::HBridgePins;
use crate::types::unit::UnitId;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub unit_id: UnitId,
    pub queue: QueueConfig,
    pub actuation: ActuationConfig,
    pub capture: CaptureConfig,
    pub hardware: HardwareConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            unit_id: UnitId(1),
            queue: QueueConfig::default(),
            actuation: ActuationConfig::default(),
            capture: CaptureConfig::default(),
            hardware: HardwareConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;

        Self::from_yaml(&text)
            .with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty document deserialises as unit, not as an empty map.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Where the queue lives and how the agent talks to it.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    pub url: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000".to_string(),
            poll_interval_ms: 10_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        ms(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        ms(self.request_timeout_ms)
    }
}

/// Timing and thresholds of the raise/hold/lower sequence.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ActuationConfig {
    /// The raise ends once the sensed distance is at or below this.
    pub distance_limit_cm: f64,
    pub sample_interval_ms: u64,
    /// How long the distance must stay under the limit before it is
    /// trusted.
    pub debounce_ms: u64,
    /// Abort a raise that has not reached the limit in this time. Unset
    /// waits forever.
    pub raise_timeout_ms: Option<u64>,
    pub settle_ms: u64,
    /// Run time of a lower-only job.
    pub lower_ms: u64,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            distance_limit_cm: 30.0,
            sample_interval_ms: 100,
            debounce_ms: 200,
            raise_timeout_ms: None,
            settle_ms: 3_000,
            lower_ms: 5_000,
        }
    }
}

impl ActuationConfig {
    pub fn sample_interval(&self) -> Duration {
        ms(self.sample_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        ms(self.debounce_ms)
    }

    pub fn raise_timeout(&self) -> Option<Duration> {
        self.raise_timeout_ms.map(ms)
    }

    pub fn settle(&self) -> Duration {
        ms(self.settle_ms)
    }

    pub fn lower_duration(&self) -> Duration {
        ms(self.lower_ms)
    }
}

/// Camera capture window and media upload.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// V4L2 device to record from.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub window_ms: u64,
    /// Offset into the window at which the still frame is taken.
    pub still_offset_ms: u64,
    pub media_dir: PathBuf,
    /// Endpoint that receives the still and the video. Upload is skipped
    /// when unset.
    pub media_ingest_url: Option<String>,
    pub upload_timeout_ms: u64,
    pub ffmpeg: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 20.0,
            window_ms: 5_000,
            still_offset_ms: 2_500,
            media_dir: PathBuf::from("/var/lib/netlift/media"),
            media_ingest_url: None,
            upload_timeout_ms: 60_000,
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl CaptureConfig {
    pub fn window(&self) -> Duration {
        ms(self.window_ms)
    }

    pub fn still_offset(&self) -> Duration {
        ms(self.still_offset_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        ms(self.upload_timeout_ms)
    }
}

/// Which backends drive the unit and where they live.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HardwareConfig {
    /// Use the simulated motor and sensor instead of GPIO and the ADC.
    pub simulate: bool,
    /// Motor time for the simulated net to travel bottom to surface.
    pub simulated_travel_ms: u64,
    pub gpio_root: PathBuf,
    pub motor_enable_pin: u32,
    pub motor_ina_pin: u32,
    pub motor_inb_pin: u32,
    pub limit_switch_pin: Option<u32>,
    pub adc_device: PathBuf,
    pub adc_channel: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        let pins = HBridgePins::default();

        Self {
            simulate: false,
            simulated_travel_ms: 4_000,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            motor_enable_pin: pins.enable,
            motor_ina_pin: pins.ina,
            motor_inb_pin: pins.inb,
            limit_switch_pin: None,
            adc_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
            adc_channel: 0,
        }
    }
}

impl HardwareConfig {
    pub fn motor_pins(&self) -> HBridgePins {
        HBridgePins {
            enable: self.motor_enable_pin,
            ina: self.motor_ina_pin,
            inb: self.motor_inb_pin,
        }
    }

    pub fn simulated_travel(&self) -> Duration {
        ms(self.simulated_travel_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(AgentConfig::from_yaml("").unwrap(), AgentConfig::default());
        assert_eq!(
            AgentConfig::from_yaml("  \n").unwrap(),
            AgentConfig::default()
        );
    }

    #[test]
    fn test_partial_override() {
        let config = AgentConfig::from_yaml(
            r#"
unit_id: 3
queue:
  url: http://queue.local:8000
actuation:
  raise_timeout_ms: 60000
  debounce_ms: 500
capture:
  media_ingest_url: http://ingest.local/process
hardware:
  simulate: true
  limit_switch_pin: 18
"#,
        )
        .unwrap();

        assert_eq!(config.unit_id, UnitId(3));
        assert_eq!(config.queue.url, "http://queue.local:8000");
        assert_eq!(config.queue.poll_interval(), Duration::from_secs(10));
        assert_eq!(
            config.actuation.raise_timeout(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.actuation.debounce(), Duration::from_millis(500));
        assert_eq!(config.actuation.distance_limit_cm, 30.0);
        assert_eq!(config.capture.still_offset(), Duration::from_millis(2500));
        assert!(config.hardware.simulate);
        assert_eq!(config.hardware.limit_switch_pin, Some(18));
    }

    #[test]
    fn test_unknown_field() {
        assert!(AgentConfig::from_yaml("actuation:\n  debounce: 3\n").is_err());
    }
}
