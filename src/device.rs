//! Physical actuation of a unit.
use tracing::info;

use crate::config::{ActuationConfig, HardwareConfig};
use crate::error::DeviceError;

pub mod actuator;
pub mod hardware;

pub use actuator::{Actuator, Phase};
use hardware::{
    simulated_rig, GpioLimitSwitch, HBridgeMotor, IioDistanceSensor,
    LimitSwitch,
};

/// Opens the unit's motor and sensors as configured and wraps them in an
/// [`Actuator`]. Fails if any real device is missing.
pub fn open_actuator(
    hardware: &HardwareConfig,
    actuation: ActuationConfig,
) -> Result<Actuator, DeviceError> {
    if hardware.simulate {
        info!(
            travel_ms = hardware.simulated_travel_ms,
            "using simulated motor and sensor"
        );
        let (motor, sensor) = simulated_rig(hardware.simulated_travel());
        return Ok(Actuator::new(
            Box::new(motor),
            Box::new(sensor),
            None,
            actuation,
        ));
    }

    let motor = HBridgeMotor::open(&hardware.gpio_root, hardware.motor_pins())?;
    let sensor =
        IioDistanceSensor::open(&hardware.adc_device, hardware.adc_channel)?;
    let limit_switch = match hardware.limit_switch_pin {
        Some(pin) => {
            let switch = GpioLimitSwitch::open(&hardware.gpio_root, pin)?;
            Some(Box::new(switch) as Box<dyn LimitSwitch>)
        },
        None => None,
    };

    info!(
        gpio = %hardware.gpio_root.display(),
        adc = %hardware.adc_device.display(),
        limit_switch = hardware.limit_switch_pin.is_some(),
        "hardware ready"
    );

    Ok(Actuator::new(
        Box::new(motor),
        Box::new(sensor),
        limit_switch,
        actuation,
    ))
}
