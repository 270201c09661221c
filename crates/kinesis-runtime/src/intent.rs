//! Typed operator intents and their outcomes.
//!
//! An external intent producer (a console, a remote operator, a speech front
//! end) reduces whatever it receives to an [`Intent`] and hands it to
//! [`Orchestrator::handle_intent`][crate::orchestrator::Orchestrator::handle_intent].

use std::time::Duration;

use kinesis_motion::Motor;
use kinesis_types::{BehaviorType, MotorId, SafetyLevel};
use serde::{Deserialize, Serialize};

/// A command for the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// Move one motor.
    Move {
        motor_id: MotorId,
        position: f64,
        speed: f64,
    },
    /// Hold every enabled motor where it is, with speed 0.
    Stop,
    /// Replay a registered movement pattern in the background.
    RunPattern { name: String },
    /// Report [`SystemStatus`].
    Status,
    /// Disable every motor and raise the safety level to `Emergency`.
    EmergencyStop,
}

/// What an [`Intent`] did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntentOutcome {
    Moved { motor_id: MotorId },
    Stopped { motors: usize },
    PatternStarted { name: String },
    Status(SystemStatus),
    EmergencyStopped { motors: usize },
}

/// Point-in-time view of the whole system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub safety_level: SafetyLevel,
    pub behavior: BehaviorType,
    pub motors: Vec<Motor>,
    pub warnings: usize,
    /// Components whose heartbeat was overdue at the last safety check.
    pub stalled: Vec<String>,
    pub uptime: Duration,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_use_snake_case_tags() {
        let json = serde_json::to_value(Intent::RunPattern {
            name: "sweep".into(),
        })
        .unwrap();
        assert_eq!(json["intent"], "run_pattern");
        assert_eq!(json["name"], "sweep");

        let back: Intent = serde_json::from_str(r#"{"intent":"emergency_stop"}"#).unwrap();
        assert_eq!(back, Intent::EmergencyStop);

        let mv: Intent = serde_json::from_str(
            r#"{"intent":"move","motor_id":"servo_1","position":90.0,"speed":30.0}"#,
        )
        .unwrap();
        assert_eq!(
            mv,
            Intent::Move {
                motor_id: "servo_1".into(),
                position: 90.0,
                speed: 30.0
            }
        );
    }
}
