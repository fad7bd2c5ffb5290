//! Motor, distance sensor and limit switch access.
//!
//! The real backends go through Linux sysfs: GPIO lines for the H-bridge
//! and the limit switch, and the IIO interface of the ADS1115 ADC for the
//! distance sensor. [`simulated_rig`] provides a motor and sensor pair that
//! behave plausibly without any hardware attached.
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::DeviceError;

/// The sensor outputs 3.262 V at a range of 100 cm, linearly.
const SENSOR_VOLTS_PER_100_CM: f64 = 3.262;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

/// Drives the winch motor.
pub trait Motor: Send {
    fn drive(&mut self, direction: Direction) -> Result<(), DeviceError>;

    /// De-energises the motor. Must be safe to call repeatedly.
    fn stop(&mut self) -> Result<(), DeviceError>;
}

/// Measures the distance between the net frame and the sensor.
pub trait DistanceSensor: Send {
    fn distance_cm(&mut self) -> Result<f64, DeviceError>;
}

/// Hard end-stop at the top of travel.
pub trait LimitSwitch: Send {
    fn is_pressed(&mut self) -> Result<bool, DeviceError>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PinMode {
    In,
    Out,
}

/// A single GPIO line exported through `/sys/class/gpio`.
#[derive(Debug)]
pub struct SysfsPin {
    number: u32,
    value: PathBuf,
}

impl SysfsPin {
    /// Exports `number` under `root` (unless already exported) and sets its
    /// direction.
    fn open(root: &Path, number: u32, mode: PinMode) -> io::Result<Self> {
        let dir = root.join(format!("gpio{number}"));
        if !dir.exists() {
            fs::write(root.join("export"), number.to_string())?;
        }

        fs::write(
            dir.join("direction"),
            match mode {
                PinMode::In => "in",
                PinMode::Out => "out",
            },
        )?;

        debug!(pin = number, ?mode, "gpio pin ready");

        Ok(Self {
            number,
            value: dir.join("value"),
        })
    }

    fn set(&self, high: bool) -> io::Result<()> {
        trace!(pin = self.number, high, "gpio write");
        fs::write(&self.value, if high { "1" } else { "0" })
    }

    fn get(&self) -> io::Result<bool> {
        Ok(fs::read_to_string(&self.value)?.trim() != "0")
    }
}

/// GPIO line numbers (BCM numbering) of the motor driver.
#[derive(Clone, Copy, Debug)]
pub struct HBridgePins {
    pub enable: u32,
    pub ina: u32,
    pub inb: u32,
}

impl Default for HBridgePins {
    fn default() -> Self {
        Self {
            enable: 12,
            ina: 23,
            inb: 24,
        }
    }
}

/// A DC motor behind an H-bridge driver with an enable line.
#[derive(Debug)]
pub struct HBridgeMotor {
    enable: SysfsPin,
    ina: SysfsPin,
    inb: SysfsPin,
}

impl HBridgeMotor {
    pub fn open(
        gpio_root: &Path,
        pins: HBridgePins,
    ) -> Result<Self, DeviceError> {
        let open = |n| SysfsPin::open(gpio_root, n, PinMode::Out);

        let mut motor = Self {
            enable: open(pins.enable).map_err(DeviceError::Motor)?,
            ina: open(pins.ina).map_err(DeviceError::Motor)?,
            inb: open(pins.inb).map_err(DeviceError::Motor)?,
        };
        motor.stop()?;

        Ok(motor)
    }

    fn write(&self, enable: bool, ina: bool, inb: bool) -> io::Result<()> {
        // Drop the enable line first and raise it last so the bridge is never
        // driven while the direction lines are changing.
        self.enable.set(false)?;
        self.ina.set(ina)?;
        self.inb.set(inb)?;
        self.enable.set(enable)
    }
}

impl Motor for HBridgeMotor {
    fn drive(&mut self, direction: Direction) -> Result<(), DeviceError> {
        match direction {
            Direction::Up => self.write(true, true, false),
            Direction::Down => self.write(true, false, true),
        }
        .map_err(DeviceError::Motor)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.write(false, true, false).map_err(DeviceError::Motor)
    }
}

/// An analog distance sensor read through an IIO ADC channel, e.g.
/// `/sys/bus/iio/devices/iio:device0` with channel `0`.
#[derive(Debug)]
pub struct IioDistanceSensor {
    raw: PathBuf,
    scale: PathBuf,
}

impl IioDistanceSensor {
    pub fn open(device: &Path, channel: u32) -> Result<Self, DeviceError> {
        let sensor = Self {
            raw: device.join(format!("in_voltage{channel}_raw")),
            scale: device.join(format!("in_voltage{channel}_scale")),
        };
        if !sensor.raw.exists() {
            return Err(DeviceError::Sensor(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no ADC channel at {}", sensor.raw.display()),
            )));
        }

        Ok(sensor)
    }

    fn read_number(path: &Path) -> Result<f64, DeviceError> {
        let text = fs::read_to_string(path).map_err(DeviceError::Sensor)?;
        text.trim().parse().map_err(|_| {
            DeviceError::BadReading(format!(
                "{} contained {:?}",
                path.display(),
                text.trim()
            ))
        })
    }
}

impl DistanceSensor for IioDistanceSensor {
    fn distance_cm(&mut self) -> Result<f64, DeviceError> {
        // IIO reports raw counts and a scale in millivolts per count.
        let raw = Self::read_number(&self.raw)?;
        let scale = Self::read_number(&self.scale)?;
        let volts = raw * scale / 1000.0;

        Ok(volts / SENSOR_VOLTS_PER_100_CM * 100.0)
    }
}

/// A normally-open switch wired to a GPIO input with a pull-up, so it reads
/// low while pressed.
#[derive(Debug)]
pub struct GpioLimitSwitch {
    pin: SysfsPin,
}

impl GpioLimitSwitch {
    pub fn open(gpio_root: &Path, pin: u32) -> Result<Self, DeviceError> {
        Ok(Self {
            pin: SysfsPin::open(gpio_root, pin, PinMode::In)
                .map_err(DeviceError::LimitSwitch)?,
        })
    }
}

impl LimitSwitch for GpioLimitSwitch {
    fn is_pressed(&mut self) -> Result<bool, DeviceError> {
        Ok(!self.pin.get().map_err(DeviceError::LimitSwitch)?)
    }
}

/// Net position shared by the simulated motor and sensor.
#[derive(Debug)]
struct Travel {
    /// How far up the net is, from 0.0 (bottom) to 1.0 (surface).
    position: f64,
    moving: Option<(Direction, Instant)>,
    full_travel: Duration,
}

impl Travel {
    /// Folds any motion since the last update into `position`.
    fn settle(&mut self) {
        if let Some((direction, since)) = self.moving {
            let now = Instant::now();
            let moved = (now - since).as_secs_f64()
                / self.full_travel.as_secs_f64().max(f64::EPSILON);
            self.position = match direction {
                Direction::Up => (self.position + moved).min(1.0),
                Direction::Down => (self.position - moved).max(0.0),
            };
            self.moving = Some((direction, now));
        }
    }
}

type SharedTravel = Arc<Mutex<Travel>>;

fn with_travel<R>(
    travel: &SharedTravel,
    f: impl FnOnce(&mut Travel) -> R,
) -> R {
    let mut travel = travel.lock().unwrap_or_else(|e| e.into_inner());
    travel.settle();
    f(&mut travel)
}

/// Motor half of [`simulated_rig`].
#[derive(Debug)]
pub struct SimulatedMotor {
    travel: SharedTravel,
}

impl Motor for SimulatedMotor {
    fn drive(&mut self, direction: Direction) -> Result<(), DeviceError> {
        debug!(%direction, "simulated motor on");
        with_travel(&self.travel, |t| {
            t.moving = Some((direction, Instant::now()))
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        let position = with_travel(&self.travel, |t| {
            t.moving = None;
            t.position
        });
        debug!(position, "simulated motor off");
        Ok(())
    }
}

/// Sensor half of [`simulated_rig`]. Reads `far_cm` with the net at the
/// bottom, falling linearly to `near_cm` at the surface.
#[derive(Debug)]
pub struct SimulatedSensor {
    travel: SharedTravel,
    far_cm: f64,
    near_cm: f64,
}

impl DistanceSensor for SimulatedSensor {
    fn distance_cm(&mut self) -> Result<f64, DeviceError> {
        let position = with_travel(&self.travel, |t| t.position);
        Ok(self.far_cm - (self.far_cm - self.near_cm) * position)
    }
}

/// A motor and distance sensor bound to the same simulated net, which takes
/// `full_travel` of motor time to go from the bottom to the surface.
pub fn simulated_rig(
    full_travel: Duration,
) -> (SimulatedMotor, SimulatedSensor) {
    let travel = Arc::new(Mutex::new(Travel {
        position: 0.0,
        moving: None,
        full_travel,
    }));

    (
        SimulatedMotor {
            travel: travel.clone(),
        },
        SimulatedSensor {
            travel,
            far_cm: 80.0,
            near_cm: 10.0,
        },
    )
}
