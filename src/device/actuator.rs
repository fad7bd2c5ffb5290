//! The raise/hold/lower state machine.
//!
//! ```text
//! Idle -> Raising -> Holding -> Lowering -> Idle
//! ```
//!
//! Raising runs the motor up while sampling the distance sensor, and ends
//! once the distance has stayed at or under the limit for the debounce
//! window (or the limit switch is hit). Holding de-energises the motor and
//! lets the net settle. Lowering runs the motor down for a given time, with
//! no feedback.
//!
//! Every phase leaves the motor stopped on exit, including when the future
//! is dropped part way through.
use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::config::ActuationConfig;
use crate::device::hardware::{Direction, DistanceSensor, LimitSwitch, Motor};
use crate::error::DeviceError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Idle,
    Raising,
    Holding,
    Lowering,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Raising => "raising",
            Phase::Holding => "holding",
            Phase::Lowering => "lowering",
        })
    }
}

/// Holds the motor energised; stops it again when dropped unless
/// [`Energised::stop`] already did.
struct Energised<'a> {
    motor: &'a mut dyn Motor,
    direction: Direction,
    armed: bool,
}

impl<'a> Energised<'a> {
    fn drive(
        motor: &'a mut dyn Motor,
        direction: Direction,
    ) -> Result<Self, DeviceError> {
        // Construct the guard first: a drive that fails part way may have
        // left some outputs set.
        let mut guard = Self {
            motor,
            direction,
            armed: true,
        };
        guard.motor.drive(direction)?;
        Ok(guard)
    }

    fn stop(mut self) -> Result<(), DeviceError> {
        self.armed = false;
        self.motor.stop()
    }
}

impl Drop for Energised<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(direction = %self.direction, "stopping motor on abort");
            if let Err(error) = self.motor.stop() {
                error!(%error, "failed to stop motor");
            }
        }
    }
}

/// Drives one unit's motor against its sensors.
pub struct Actuator {
    motor: Box<dyn Motor>,
    sensor: Box<dyn DistanceSensor>,
    limit_switch: Option<Box<dyn LimitSwitch>>,
    config: ActuationConfig,
    phase: Phase,
    /// When the current phase was entered.
    since: Instant,
    last_distance: Option<f64>,
}

impl Actuator {
    pub fn new(
        motor: Box<dyn Motor>,
        sensor: Box<dyn DistanceSensor>,
        limit_switch: Option<Box<dyn LimitSwitch>>,
        config: ActuationConfig,
    ) -> Self {
        Self {
            motor,
            sensor,
            limit_switch,
            config,
            phase: Phase::Idle,
            since: Instant::now(),
            last_distance: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The most recent distance read during a raise, in cm.
    pub fn last_distance(&self) -> Option<f64> {
        self.last_distance
    }

    pub fn config(&self) -> &ActuationConfig {
        &self.config
    }

    fn enter(&mut self, phase: Phase) {
        let now = Instant::now();
        info!(
            from = %self.phase,
            to = %phase,
            elapsed_secs = (now - self.since).as_secs_f64(),
            distance_cm = self.last_distance,
            "actuator transition"
        );
        self.phase = phase;
        self.since = now;
    }

    /// Runs the motor up until the net reaches the surface, then holds.
    /// Returns how long the motor ran, which a later [`Actuator::lower`] can
    /// mirror.
    pub async fn raise(&mut self) -> Result<Duration, DeviceError> {
        self.enter(Phase::Raising);
        let travel = self.raise_until_close().await?;
        self.enter(Phase::Holding);

        info!(travel_secs = travel.as_secs_f64(), "raised, settling");
        sleep(self.config.settle()).await;

        Ok(travel)
    }

    async fn raise_until_close(&mut self) -> Result<Duration, DeviceError> {
        let limit = self.config.distance_limit_cm;
        let debounce = self.config.debounce();
        let interval = self.config.sample_interval();
        let timeout = self.config.raise_timeout();

        let started = Instant::now();
        let motor = Energised::drive(&mut *self.motor, Direction::Up)?;
        let mut close_since: Option<Instant> = None;

        loop {
            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    return Err(DeviceError::RaiseTimeout(timeout));
                }
            }

            if let Some(switch) = self.limit_switch.as_mut() {
                if switch.is_pressed()? {
                    info!("limit switch pressed");
                    break;
                }
            }

            let distance = self.sensor.distance_cm()?;
            self.last_distance = Some(distance);
            if !distance.is_finite() {
                return Err(DeviceError::BadReading(format!(
                    "distance {distance}"
                )));
            }

            if distance <= limit {
                let now = Instant::now();
                match close_since {
                    None => close_since = Some(now),
                    Some(since) if now - since >= debounce => {
                        info!(distance, limit, "net within distance limit");
                        break;
                    },
                    Some(_) => {},
                }
            } else {
                close_since = None;
            }

            sleep(interval).await;
        }

        let travel = started.elapsed();
        motor.stop()?;

        Ok(travel)
    }

    /// Runs the motor down for `duration`.
    pub async fn lower(
        &mut self,
        duration: Duration,
    ) -> Result<(), DeviceError> {
        self.enter(Phase::Lowering);
        info!(secs = duration.as_secs_f64(), "lowering");

        let motor = Energised::drive(&mut *self.motor, Direction::Down)?;
        sleep(duration).await;
        motor.stop()?;

        self.enter(Phase::Idle);
        Ok(())
    }

    /// Ends a sequence that was left in [`Phase::Holding`].
    pub fn finish(&mut self) {
        self.enter(Phase::Idle);
    }

    /// Forces the motor off and returns to idle. Used after an abort and on
    /// shutdown.
    pub fn stop(&mut self) -> Result<(), DeviceError> {
        if self.phase != Phase::Idle {
            self.enter(Phase::Idle);
        }
        self.motor.stop()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(crate) enum MotorCall {
        Drive(Direction),
        Stop,
    }

    /// Records every command it receives.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingMotor {
        pub(crate) calls: Arc<Mutex<Vec<MotorCall>>>,
        pub(crate) fail_drive: bool,
    }

    impl RecordingMotor {
        pub(crate) fn calls(&self) -> Vec<MotorCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Motor for RecordingMotor {
        fn drive(&mut self, direction: Direction) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push(MotorCall::Drive(direction));
            if self.fail_drive {
                let error = io::Error::other("bridge fault");
                return Err(DeviceError::Motor(error));
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().push(MotorCall::Stop);
            Ok(())
        }
    }

    /// Plays back a fixed list of readings, then repeats the last one.
    /// `None` entries are read failures.
    pub(crate) struct ScriptedSensor {
        pub(crate) readings: VecDeque<Option<f64>>,
        pub(crate) last: Option<f64>,
        pub(crate) reads: Arc<Mutex<usize>>,
    }

    impl ScriptedSensor {
        pub(crate) fn new(readings: &[Option<f64>]) -> Self {
            Self {
                readings: readings.iter().copied().collect(),
                last: None,
                reads: Default::default(),
            }
        }
    }

    impl DistanceSensor for ScriptedSensor {
        fn distance_cm(&mut self) -> Result<f64, DeviceError> {
            *self.reads.lock().unwrap() += 1;
            let reading = match self.readings.pop_front() {
                Some(r) => {
                    self.last = r;
                    r
                },
                None => self.last,
            };
            reading.ok_or_else(|| {
                DeviceError::Sensor(io::Error::other("i2c timeout"))
            })
        }
    }

    /// A sensor fed from a channel, so a test can decide when the net
    /// arrives.
    struct ChannelSensor {
        rx: std::sync::mpsc::Receiver<f64>,
        current: f64,
    }

    impl DistanceSensor for ChannelSensor {
        fn distance_cm(&mut self) -> Result<f64, DeviceError> {
            while let Ok(v) = self.rx.try_recv() {
                self.current = v;
            }
            Ok(self.current)
        }
    }

    struct PressedAfter(usize);

    impl LimitSwitch for PressedAfter {
        fn is_pressed(&mut self) -> Result<bool, DeviceError> {
            if self.0 == 0 {
                return Ok(true);
            }
            self.0 -= 1;
            Ok(false)
        }
    }

    fn actuator(
        motor: &RecordingMotor,
        sensor: impl DistanceSensor + 'static,
        config: ActuationConfig,
    ) -> Actuator {
        Actuator::new(Box::new(motor.clone()), Box::new(sensor), None, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_raise_debounced() {
        let motor = RecordingMotor::default();
        let mut act = actuator(
            &motor,
            ScriptedSensor::new(&[Some(80.0), Some(50.0), Some(29.0)]),
            ActuationConfig::default(),
        );

        let before = Instant::now();
        let travel = act.raise().await.unwrap();

        // Two far samples, then close at t=200ms, 300ms, 400ms: trusted once
        // 200ms have passed since the first close sample.
        assert_eq!(travel, Duration::from_millis(400));
        assert_eq!(before.elapsed(), Duration::from_millis(400 + 3_000));
        assert_eq!(act.phase(), Phase::Holding);
        assert_eq!(act.last_distance(), Some(29.0));
        assert_eq!(
            motor.calls(),
            vec![MotorCall::Drive(Direction::Up), MotorCall::Stop]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_close_sample_rejected() {
        let motor = RecordingMotor::default();
        let sensor = ScriptedSensor::new(&[
            Some(25.0),
            Some(25.0),
            Some(31.0), // noise: resets the debounce window
            Some(30.0),
            Some(30.0),
            Some(30.0),
        ]);
        let reads = sensor.reads.clone();
        let mut act = actuator(&motor, sensor, ActuationConfig::default());

        let travel = act.raise().await.unwrap();
        assert_eq!(travel, Duration::from_millis(500));
        assert_eq!(*reads.lock().unwrap(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_raise_waits_for_injected_reading() {
        let motor = RecordingMotor::default();
        let (tx, rx) = std::sync::mpsc::channel();
        let mut act = actuator(
            &motor,
            ChannelSensor { rx, current: 90.0 },
            ActuationConfig::default(),
        );

        // Without a timeout the raise blocks for as long as the net stays
        // far away.
        let raise = tokio::spawn(async move {
            let travel = act.raise_until_close().await;
            (travel, act)
        });
        sleep(Duration::from_secs(600)).await;
        assert!(!raise.is_finished());
        assert_eq!(motor.calls(), vec![MotorCall::Drive(Direction::Up)]);

        tx.send(12.0).unwrap();
        let (travel, _act) = raise.await.unwrap();
        let travel = travel.unwrap();
        assert!(travel >= Duration::from_secs(600));
        assert!(travel <= Duration::from_millis(600_400));
        assert_eq!(
            motor.calls(),
            vec![MotorCall::Drive(Direction::Up), MotorCall::Stop]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_raise_timeout() {
        let motor = RecordingMotor::default();
        let config = ActuationConfig {
            raise_timeout_ms: Some(2_000),
            ..Default::default()
        };
        let sensor = ScriptedSensor::new(&[Some(90.0)]);
        let mut act = actuator(&motor, sensor, config);

        let err = act.raise().await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::RaiseTimeout(d) if d == Duration::from_secs(2)
        ));
        assert_eq!(
            motor.calls(),
            vec![MotorCall::Drive(Direction::Up), MotorCall::Stop]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_failure_stops_motor() {
        let motor = RecordingMotor::default();
        let mut act = actuator(
            &motor,
            ScriptedSensor::new(&[Some(70.0), None]),
            ActuationConfig::default(),
        );

        assert!(matches!(act.raise().await, Err(DeviceError::Sensor(_))));
        assert_eq!(
            motor.calls(),
            vec![MotorCall::Drive(Direction::Up), MotorCall::Stop]
        );

        let mut nan = actuator(
            &motor,
            ScriptedSensor::new(&[Some(f64::NAN)]),
            ActuationConfig::default(),
        );
        assert!(matches!(nan.raise().await, Err(DeviceError::BadReading(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_failure_stops_motor() {
        let motor = RecordingMotor {
            fail_drive: true,
            ..Default::default()
        };
        let mut act = actuator(
            &motor,
            ScriptedSensor::new(&[Some(10.0)]),
            ActuationConfig::default(),
        );

        assert!(matches!(
            act.lower(Duration::from_secs(1)).await,
            Err(DeviceError::Motor(_))
        ));
        assert_eq!(
            motor.calls(),
            vec![MotorCall::Drive(Direction::Down), MotorCall::Stop]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_switch_ends_raise() {
        let motor = RecordingMotor::default();
        let mut act = Actuator::new(
            Box::new(motor.clone()),
            Box::new(ScriptedSensor::new(&[Some(90.0)])),
            Some(Box::new(PressedAfter(3))),
            ActuationConfig {
                settle_ms: 0,
                ..Default::default()
            },
        );

        let travel = act.raise().await.unwrap();
        assert_eq!(travel, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lower() {
        let motor = RecordingMotor::default();
        let mut act = actuator(
            &motor,
            ScriptedSensor::new(&[]),
            ActuationConfig::default(),
        );

        assert_eq!(act.last_distance(), None);

        let before = Instant::now();
        act.lower(Duration::from_secs(5)).await.unwrap();
        assert_eq!(before.elapsed(), Duration::from_secs(5));
        assert_eq!(act.phase(), Phase::Idle);
        // Lowering has no feedback, so nothing was sensed.
        assert_eq!(act.last_distance(), None);
        assert_eq!(
            motor.calls(),
            vec![MotorCall::Drive(Direction::Down), MotorCall::Stop]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_mid_lower_stops_motor() {
        let motor = RecordingMotor::default();
        let mut act = actuator(
            &motor,
            ScriptedSensor::new(&[]),
            ActuationConfig::default(),
        );

        let cancelled = tokio::time::timeout(
            Duration::from_secs(1),
            act.lower(Duration::from_secs(5)),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(
            motor.calls(),
            vec![MotorCall::Drive(Direction::Down), MotorCall::Stop]
        );
    }
}
