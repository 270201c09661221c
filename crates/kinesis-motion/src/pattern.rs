//! [`MovementPattern`] – a named, timed sequence of motor commands.

use std::time::Duration;

use kinesis_types::MotorCommand;

/// Commands replayed in order, evenly spaced over `total_duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementPattern {
    pub name: String,
    pub commands: Vec<MotorCommand>,
    pub total_duration: Duration,
}

impl MovementPattern {
    pub fn new(
        name: impl Into<String>,
        commands: Vec<MotorCommand>,
        total_duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            commands,
            total_duration,
        }
    }

    /// Gap between consecutive commands: `total_duration / commands.len()`,
    /// or zero for an empty pattern.
    pub fn spacing(&self) -> Duration {
        match u32::try_from(self.commands.len()) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_duration / n,
            Err(_) => Duration::ZERO,
        }
    }
}
