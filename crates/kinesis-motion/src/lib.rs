//! `kinesis-motion` – Actuator Control
//!
//! Owns the motor table and is the only code allowed to mutate it.
//!
//! # Modules
//!
//! - [`motor`] – [`Motor`][motor::Motor] state, the per-motor command and
//!   integration rules, and the [`MotorTable`][motor::MotorTable] roster.
//! - [`pattern`] – [`MovementPattern`][pattern::MovementPattern]: a named,
//!   timed sequence of motor commands.
//! - [`controller`] – [`MotionController`][controller::MotionController]:
//!   command queue, fixed-period integration worker, pattern replay and
//!   shutdown.
//!
//! # Invariants
//!
//! For every motor, at all times: `min_position <= position <= max_position`,
//! `|speed| <= max_speed`, and a disabled motor has `speed == 0`.

pub mod controller;
pub mod motor;
pub mod pattern;

pub use controller::{MotionConfig, MotionController};
pub use motor::{Motor, MotorSpec, MotorTable, MotorType};
pub use pattern::MovementPattern;
