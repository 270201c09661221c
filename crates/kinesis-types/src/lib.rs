use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a motor in the controller's roster (e.g. `"servo_1"`).
pub type MotorId = String;

/// The kind of physical quantity a sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorCategory {
    Touch,
    Pressure,
    Motion,
    Temperature,
}

impl SensorCategory {
    /// Every category, in a stable order.
    pub const ALL: [SensorCategory; 4] = [
        SensorCategory::Touch,
        SensorCategory::Pressure,
        SensorCategory::Motion,
        SensorCategory::Temperature,
    ];
}

impl fmt::Display for SensorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorCategory::Touch => write!(f, "touch"),
            SensorCategory::Pressure => write!(f, "pressure"),
            SensorCategory::Motion => write!(f, "motion"),
            SensorCategory::Temperature => write!(f, "temperature"),
        }
    }
}

/// A single immutable sensor sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub category: SensorCategory,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Reading stamped with the current UTC time.
    pub fn new(category: SensorCategory, value: f64) -> Self {
        Self::at(category, value, Utc::now())
    }

    pub fn at(category: SensorCategory, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            category,
            value,
            timestamp,
        }
    }
}

/// Request to move one motor to a target position at a target speed.
///
/// Position is a hard constraint (out-of-range targets are rejected); speed is
/// advisory and gets clamped to the motor's `max_speed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorCommand {
    pub motor_id: MotorId,
    pub target_position: f64,
    pub target_speed: f64,
}

impl MotorCommand {
    pub fn new(motor_id: impl Into<MotorId>, target_position: f64, target_speed: f64) -> Self {
        Self {
            motor_id: motor_id.into(),
            target_position,
            target_speed,
        }
    }
}

/// Derived, dimensionless behavioural measurements fed to the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternMetrics {
    pub intensity: f64,
    pub frequency: f64,
    pub duration: f64,
    pub consistency: f64,
}

/// Discrete behavioural state produced by the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorType {
    #[default]
    Normal,
    Aggressive,
    Passive,
    Erratic,
}

impl BehaviorType {
    /// `true` for the states the safety supervisor treats as anomalous.
    pub fn is_anomalous(self) -> bool {
        matches!(self, BehaviorType::Aggressive | BehaviorType::Erratic)
    }
}

impl fmt::Display for BehaviorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BehaviorType::Normal => write!(f, "normal"),
            BehaviorType::Aggressive => write!(f, "aggressive"),
            BehaviorType::Passive => write!(f, "passive"),
            BehaviorType::Erratic => write!(f, "erratic"),
        }
    }
}

/// One classified snapshot of behavioural metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorPattern {
    #[serde(rename = "type")]
    pub behavior: BehaviorType,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// The window-averaged metrics this classification was derived from.
    pub metrics: PatternMetrics,
}

/// Aggregate system health, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    #[default]
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyLevel::Normal => write!(f, "normal"),
            SafetyLevel::Warning => write!(f, "warning"),
            SafetyLevel::Critical => write!(f, "critical"),
            SafetyLevel::Emergency => write!(f, "emergency"),
        }
    }
}

/// Unified event wrapper for the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "kinesis-motion::controller"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh event stamped with a new id and the current
    /// UTC time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Liveness signal emitted periodically by every component worker.
    Heartbeat { component: String },
    /// A producer found the component's bounded input queue full and had to
    /// wait for space.
    Backpressure { component: String },
    /// The behaviour classifier produced a new pattern.
    BehaviorClassified(BehaviorPattern),
    /// A queued motor command (e.g. from pattern replay) failed validation.
    CommandRejected { motor_id: MotorId, reason: String },
    /// The safety level went up.
    SafetyEscalated { from: SafetyLevel, to: SafetyLevel },
}

/// Coarse error classes: who is at fault and whether retrying could help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller asked for something the bounds forbid.
    Validation,
    /// The referenced motor or pattern does not exist.
    NotFound,
    /// The component has been shut down.
    Closed,
}

/// Global error type for every core operation.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KinesisError {
    #[error("Motor not found: {0}")]
    MotorNotFound(MotorId),

    #[error("Motor is disabled: {0}")]
    MotorDisabled(MotorId),

    #[error("Position {position} for motor {motor_id} is outside [{min}, {max}]")]
    OutOfRange {
        motor_id: MotorId,
        position: f64,
        min: f64,
        max: f64,
    },

    #[error("Movement pattern not found: {0}")]
    PatternNotFound(String),

    #[error("Sensor hub is closed")]
    HubClosed,

    #[error("{component} has been shut down")]
    Closed { component: String },
}

impl KinesisError {
    pub fn closed(component: impl Into<String>) -> Self {
        KinesisError::Closed {
            component: component.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            KinesisError::MotorDisabled(_) | KinesisError::OutOfRange { .. } => {
                ErrorKind::Validation
            }
            KinesisError::MotorNotFound(_) | KinesisError::PatternNotFound(_) => {
                ErrorKind::NotFound
            }
            KinesisError::HubClosed | KinesisError::Closed { .. } => ErrorKind::Closed,
        }
    }
}
