//! [`Motor`] state and the [`MotorTable`] roster.
//!
//! Everything here is synchronous and lock-free; the
//! [`MotionController`][crate::controller::MotionController] wraps the table in
//! a lock and drives it from its worker.
//!
//! # Motion model
//!
//! A command sets `position` to its target immediately and stores the clamped
//! speed.  Every integration step then advances `position += speed * dt`.  If
//! the step would leave `[min_position, max_position]`, the position is pinned
//! to the boundary and the speed is zeroed (clamp-then-zero), so a motor that
//! integration carried to a boundary is at rest.

use std::collections::BTreeMap;

use kinesis_types::{KinesisError, MotorCommand, MotorId};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Physical actuator family.  Informational only; all types share one
/// motion model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorType {
    #[default]
    Servo,
    Stepper,
    Dc,
}

/// Static description of a motor, as found in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorSpec {
    pub id: MotorId,
    #[serde(default, rename = "type")]
    pub motor_type: MotorType,
    pub max_speed: f64,
    pub min_position: f64,
    pub max_position: f64,
}

impl MotorSpec {
    /// A servo with the given limits.
    pub fn servo(id: impl Into<MotorId>, max_speed: f64, min: f64, max: f64) -> Self {
        Self {
            id: id.into(),
            motor_type: MotorType::Servo,
            max_speed,
            min_position: min,
            max_position: max,
        }
    }

    /// The stock roster: two hobby servos with a 0–180 range.
    pub fn default_roster() -> Vec<MotorSpec> {
        vec![
            MotorSpec::servo("servo_1", 180.0, 0.0, 180.0),
            MotorSpec::servo("servo_2", 180.0, 0.0, 180.0),
        ]
    }
}

/// Live state of one motor.
///
/// Copies handed out by the controller are snapshots; mutating them has no
/// effect on the real motor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motor {
    pub id: MotorId,
    pub motor_type: MotorType,
    pub position: f64,
    pub speed: f64,
    pub max_speed: f64,
    pub min_position: f64,
    pub max_position: f64,
    pub enabled: bool,
}

impl Motor {
    /// Build an enabled motor at rest, or `None` when a position bound is
    /// not finite.
    ///
    /// Swapped bounds are put back in order, a negative or non-finite
    /// `max_speed` is normalised, and the starting position is `0` pulled into
    /// range.
    pub fn from_spec(spec: &MotorSpec) -> Option<Self> {
        if !spec.min_position.is_finite() || !spec.max_position.is_finite() {
            return None;
        }
        let (min, max) = if spec.min_position <= spec.max_position {
            (spec.min_position, spec.max_position)
        } else {
            (spec.max_position, spec.min_position)
        };
        let max_speed = if spec.max_speed.is_finite() {
            spec.max_speed.abs()
        } else {
            0.0
        };
        Some(Self {
            id: spec.id.clone(),
            motor_type: spec.motor_type,
            position: 0.0_f64.clamp(min, max),
            speed: 0.0,
            max_speed,
            min_position: min,
            max_position: max,
            enabled: true,
        })
    }

    /// Validate `command` against this motor and apply it.
    ///
    /// The speed keeps its sign and has its magnitude clamped to `max_speed`;
    /// a non-finite speed becomes `0`.
    ///
    /// # Errors
    ///
    /// - [`KinesisError::MotorDisabled`] if the motor is disabled.
    /// - [`KinesisError::OutOfRange`] if the target position is outside the
    ///   motor's bounds (NaN included).
    ///
    /// On error the motor is left untouched.
    pub fn apply(&mut self, command: &MotorCommand) -> Result<(), KinesisError> {
        if !self.enabled {
            return Err(KinesisError::MotorDisabled(self.id.clone()));
        }
        let target = command.target_position;
        if !(self.min_position..=self.max_position).contains(&target) {
            return Err(KinesisError::OutOfRange {
                motor_id: self.id.clone(),
                position: target,
                min: self.min_position,
                max: self.max_position,
            });
        }
        self.position = target;
        self.speed = clamp_speed(command.target_speed, self.max_speed);
        Ok(())
    }

    /// Advance the motor by `dt` seconds.  Disabled motors do not move.
    pub fn integrate(&mut self, dt: f64) {
        if !self.enabled || self.speed == 0.0 {
            return;
        }
        let next = self.position + self.speed * dt;
        if next <= self.min_position {
            self.position = self.min_position;
            self.speed = 0.0;
        } else if next >= self.max_position {
            self.position = self.max_position;
            self.speed = 0.0;
        } else {
            self.position = next;
        }
    }

    /// Stop where the motor is.  Returns `false` for a disabled motor.
    pub fn hold(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.speed = 0.0;
        true
    }

    /// Stop and disable.  Position is kept.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.speed = 0.0;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }
}

fn clamp_speed(speed: f64, max_speed: f64) -> f64 {
    if speed.is_finite() {
        speed.clamp(-max_speed, max_speed)
    } else {
        0.0
    }
}

/// The motor roster, keyed and iterated by id.
#[derive(Debug, Clone, Default)]
pub struct MotorTable {
    motors: BTreeMap<MotorId, Motor>,
}

impl MotorTable {
    /// Build the table from `specs`.  A later spec with a duplicate id
    /// replaces the earlier one; specs with non-finite bounds are skipped.
    pub fn from_specs(specs: &[MotorSpec]) -> Self {
        let mut motors = BTreeMap::new();
        for spec in specs {
            match Motor::from_spec(spec) {
                Some(motor) => {
                    motors.insert(spec.id.clone(), motor);
                }
                None => warn!(
                    motor_id = %spec.id,
                    min = spec.min_position,
                    max = spec.max_position,
                    "motor skipped: position bounds must be finite"
                ),
            }
        }
        Self { motors }
    }

    /// Route `command` to its motor.
    ///
    /// # Errors
    ///
    /// [`KinesisError::MotorNotFound`] for an unknown id, otherwise whatever
    /// [`Motor::apply`] reports.
    pub fn execute(&mut self, command: &MotorCommand) -> Result<(), KinesisError> {
        self.motors
            .get_mut(&command.motor_id)
            .ok_or_else(|| KinesisError::MotorNotFound(command.motor_id.clone()))?
            .apply(command)
    }

    /// One integration step for every motor.
    pub fn integrate(&mut self, dt: f64) {
        for motor in self.motors.values_mut() {
            motor.integrate(dt);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Motor> {
        self.motors.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Motor> {
        self.motors.get_mut(id)
    }

    /// Hold every enabled motor at its current position.  Returns how many
    /// were held.
    pub fn hold_all(&mut self) -> usize {
        self.motors.values_mut().map(Motor::hold).filter(|held| *held).count()
    }

    pub fn disable_all(&mut self) {
        for motor in self.motors.values_mut() {
            motor.disable();
        }
    }

    /// Snapshot of every motor, ordered by id.
    pub fn snapshot(&self) -> Vec<Motor> {
        self.motors.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<MotorId> {
        self.motors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }
}
