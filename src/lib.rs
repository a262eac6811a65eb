/// Motor Console Library
///
/// Manual control of the four motor channels on the flight board: set-point
/// validation, sysex dispatch over serial, keep-alive, and telemetry views.

pub mod board;
pub mod config_loader;
pub mod console;
pub mod gui;
pub mod heartbeat;
pub mod motors;
pub mod sysex;
pub mod telemetry;
