/// Motor console core
///
/// Validates operator input, updates the motor set-points and forwards every
/// accepted change to the board as either a pedestal or a direct value
/// command. Owns the board handle and its heartbeat.

use std::time::Duration;

use crate::board::{self, Board, CommandSet, FirmataBoard, SharedBoard};
use crate::heartbeat::Heartbeat;
use crate::motors::{Motor, MotorError, MotorVector, PedestalRange};
use crate::sysex;
use crate::telemetry::{self, PlotSeries, TelemetryError};

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("Bad conversion to int: {0:?}")]
    InvalidInteger(String),
    #[error("Bad conversion to float: {0:?}")]
    InvalidFloat(String),
    #[error(transparent)]
    Motor(#[from] MotorError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("Correction {value} does not fit in [{min}, {max}]")]
    CorrectionOutOfRange { value: f64, min: i32, max: i32 },
    #[error("Board not connected")]
    NotConnected,
    #[error("Board lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Board(#[from] anyhow::Error),
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Fixed firmware commands exposed as buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysexCommand {
    WriteData,
    StartCorrection,
    Calibration,
    Landing,
    CalculateBaseAngles,
}

impl SysexCommand {
    pub const ALL: [SysexCommand; 5] = [
        SysexCommand::WriteData,
        SysexCommand::StartCorrection,
        SysexCommand::Calibration,
        SysexCommand::Landing,
        SysexCommand::CalculateBaseAngles,
    ];

    pub fn code(self) -> u8 {
        match self {
            SysexCommand::WriteData => 0x13,
            SysexCommand::StartCorrection => 0x14,
            SysexCommand::Calibration => 0x18,
            SysexCommand::Landing => 0x19,
            SysexCommand::CalculateBaseAngles => 0x1c,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SysexCommand::WriteData => "Write data:",
            SysexCommand::StartCorrection => "Start correction:",
            SysexCommand::Calibration => "Calibration:",
            SysexCommand::Landing => "Landing:",
            SysexCommand::CalculateBaseAngles => "Calculate base angles:",
        }
    }
}

/// Which board call an accepted change is forwarded to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Value,
    Pedestal,
}

pub struct MotorConsole {
    motors: MotorVector,
    pedestal_mode: bool,
    board: Option<SharedBoard>,
    heartbeat: Option<Heartbeat>,
    ping_interval: Duration,
}

impl MotorConsole {
    pub fn new(range: PedestalRange, ping_interval: Duration) -> Self {
        Self {
            motors: MotorVector::new(range),
            pedestal_mode: false,
            board: None,
            heartbeat: None,
            ping_interval,
        }
    }

    pub fn motors(&self) -> &MotorVector {
        &self.motors
    }

    pub fn pedestal_mode(&self) -> bool {
        self.pedestal_mode
    }

    pub fn set_pedestal_mode(&mut self, enabled: bool) {
        self.pedestal_mode = enabled;
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        if self.pedestal_mode { DispatchMode::Pedestal } else { DispatchMode::Value }
    }

    pub fn is_connected(&self) -> bool {
        self.board.is_some()
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().map_or(false, |h| h.is_running())
    }

    /// Open the serial board and attach it
    pub fn connect(&mut self, port_path: &str, baud: u32, commands: CommandSet, telemetry_capacity: usize) -> ConsoleResult<()> {
        let board = FirmataBoard::connect(port_path, baud, commands, telemetry_capacity)?;
        self.attach_board(Box::new(board));
        Ok(())
    }

    /// Replace the current board. The heartbeat only starts when the board
    /// reports it is running.
    pub fn attach_board(&mut self, board: Box<dyn Board>) {
        self.shutdown();
        let running = board.is_running();
        let shared = board::share(board);
        if running {
            self.heartbeat = Some(Heartbeat::start(shared.clone(), self.ping_interval));
        } else {
            log::warn!(target: "console", "Board not running, heartbeat not started");
        }
        self.board = Some(shared);
    }

    /// Stop the heartbeat; the board handle stays attached.
    pub fn shutdown(&mut self) {
        if let Some(mut hb) = self.heartbeat.take() {
            hb.stop();
        }
    }

    fn with_board<T>(&self, f: impl FnOnce(&mut dyn Board) -> anyhow::Result<T>) -> ConsoleResult<T> {
        let shared = self.board.as_ref().ok_or(ConsoleError::NotConnected)?;
        let mut guard = shared.lock().map_err(|_| ConsoleError::Poisoned)?;
        Ok(f(&mut **guard)?)
    }

    fn dispatch_single(&self, motor: Motor, value: i32) -> ConsoleResult<()> {
        match self.dispatch_mode() {
            DispatchMode::Pedestal => self.with_board(|b| b.set_pedestal_single(motor, value)),
            DispatchMode::Value => self.with_board(|b| b.set_value_single(motor, value)),
        }
    }

    fn dispatch_all(&self, value: i32) -> ConsoleResult<()> {
        match self.dispatch_mode() {
            DispatchMode::Pedestal => self.with_board(|b| b.set_pedestal_all(value)),
            DispatchMode::Value => self.with_board(|b| b.set_value_all(value)),
        }
    }

    /// Set all motors to `value` and forward it.
    pub fn set_all(&mut self, value: i32) -> ConsoleResult<()> {
        self.motors.set_all(value)?;
        log::info!(target: "console", "Setting all power to: {}", value);
        self.dispatch_all(value)
    }

    pub fn set_all_from_text(&mut self, text: &str) -> ConsoleResult<i32> {
        let value = text
            .trim()
            .parse::<i32>()
            .map_err(|_| ConsoleError::InvalidInteger(text.to_string()))?;
        self.set_all(value)?;
        Ok(value)
    }

    /// Step one motor; the new value is forwarded only if accepted.
    pub fn step_motor(&mut self, motor: Motor, delta: i32) -> ConsoleResult<i32> {
        let value = self.motors.adjust(motor, delta)?;
        log::info!(target: "console", "{} -> {}", motor, value);
        self.dispatch_single(motor, value)?;
        Ok(value)
    }

    /// Step every motor independently, forwarding each accepted value.
    pub fn step_all(&mut self, delta: i32) -> Vec<(Motor, ConsoleResult<i32>)> {
        let results = self.motors.adjust_all(delta);
        results
            .into_iter()
            .map(|(motor, res)| {
                let res = match res {
                    Ok(value) => self.dispatch_single(motor, value).map(|_| value),
                    Err(e) => Err(e.into()),
                };
                (motor, res)
            })
            .collect()
    }

    /// Correction parameter: float scaled by 10, truncated toward zero.
    /// The scaled value must fit the 14-bit wire range.
    pub fn set_correction_from_text(&mut self, text: &str) -> ConsoleResult<i32> {
        let k = text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|k| k.is_finite())
            .ok_or_else(|| ConsoleError::InvalidFloat(text.to_string()))?;
        let scaled = (k * 10.0).trunc();
        if scaled < sysex::VALUE_MIN as f64 || scaled > sysex::VALUE_MAX as f64 {
            return Err(ConsoleError::CorrectionOutOfRange {
                value: scaled,
                min: sysex::VALUE_MIN,
                max: sysex::VALUE_MAX,
            });
        }
        let value = scaled as i32;
        log::info!(target: "console", "Setting kvalue to: {}", value);
        self.with_board(|b| b.set_dump_parameter(value))?;
        Ok(value)
    }

    pub fn send_command(&mut self, command: SysexCommand) -> ConsoleResult<()> {
        log::info!(target: "console", "Send sysex 0x{:02x}", command.code());
        self.with_board(|b| b.send_sysex(command.code()))
    }

    pub fn telemetry(&self) -> ConsoleResult<Vec<Vec<f64>>> {
        self.with_board(|b| Ok(b.graph_data()))
    }

    pub fn first_telemetry_entry(&self) -> ConsoleResult<Vec<f64>> {
        self.telemetry()?
            .into_iter()
            .next()
            .ok_or_else(|| TelemetryError::Empty.into())
    }

    /// Series for a column selection like `"2 4 8"`
    pub fn plot_series(&self, selection: &str) -> ConsoleResult<Vec<PlotSeries>> {
        let columns = telemetry::parse_selection(selection)?;
        let rows = self.telemetry()?;
        Ok(telemetry::select_series(&rows, &columns)?)
    }
}

impl Drop for MotorConsole {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::testing::{Call, RecordingBoard};
    use crate::heartbeat::DEFAULT_PING_INTERVAL;

    fn console_with(board: &RecordingBoard) -> MotorConsole {
        let mut console = MotorConsole::new(PedestalRange::default(), DEFAULT_PING_INTERVAL);
        console.attach_board(Box::new(board.clone()));
        console
    }

    fn without_pings(calls: Vec<Call>) -> Vec<Call> {
        calls.into_iter().filter(|c| *c != Call::Ping).collect()
    }

    #[test]
    fn test_rejected_step_leaves_state_and_sends_nothing() {
        let board = RecordingBoard::default();
        let mut console = console_with(&board);
        let before = console.motors().clone();
        assert!(matches!(console.step_motor(Motor::Motor2, -1), Err(ConsoleError::Motor(_))));
        assert_eq!(console.motors(), &before);
        assert!(without_pings(board.calls()).is_empty());
    }

    #[test]
    fn test_set_all_from_text_dispatches_value_all() {
        let board = RecordingBoard::default();
        let mut console = console_with(&board);
        assert_eq!(console.set_all_from_text(" 300 ").unwrap(), 300);
        assert!(console.motors().iter().all(|(_, v)| v == 300));
        assert_eq!(without_pings(board.calls()), vec![Call::ValueAll(300)]);
    }

    #[test]
    fn test_set_all_rejects_bad_input() {
        let board = RecordingBoard::default();
        let mut console = console_with(&board);
        assert!(matches!(console.set_all_from_text("abc"), Err(ConsoleError::InvalidInteger(_))));
        assert!(matches!(console.set_all_from_text("259"), Err(ConsoleError::Motor(_))));
        assert!(matches!(console.set_all_from_text("500"), Err(ConsoleError::Motor(_))));
        assert!(console.motors().iter().all(|(_, v)| v == 260));
        assert!(without_pings(board.calls()).is_empty());
    }

    #[test]
    fn test_pedestal_toggle_switches_dispatch_only() {
        let board = RecordingBoard::default();
        let mut console = console_with(&board);

        console.step_motor(Motor::Motor6, 1).unwrap();
        console.set_pedestal_mode(true);
        assert_eq!(console.motors().get(Motor::Motor6), 261);
        console.step_motor(Motor::Motor6, 1).unwrap();
        console.set_all(400).unwrap();
        console.set_pedestal_mode(false);
        assert!(console.motors().iter().all(|(_, v)| v == 400));
        console.set_all(401).unwrap();

        assert_eq!(
            without_pings(board.calls()),
            vec![
                Call::ValueSingle(Motor::Motor6, 261),
                Call::PedestalSingle(Motor::Motor6, 262),
                Call::PedestalAll(400),
                Call::ValueAll(401),
            ]
        );
    }

    #[test]
    fn test_step_all_dispatches_accepted_motors_only() {
        let board = RecordingBoard::default();
        let mut console = console_with(&board);
        console.step_motor(Motor::Motor3, 5).unwrap();
        console.set_pedestal_mode(true);

        let results = console.step_all(-5);
        assert_eq!(results.len(), 4);
        assert!(matches!(results[1], (Motor::Motor3, Ok(260))));
        assert!(results.iter().filter(|(_, r)| r.is_err()).count() == 3);
        assert_eq!(
            without_pings(board.calls()),
            vec![Call::ValueSingle(Motor::Motor3, 265), Call::PedestalSingle(Motor::Motor3, 260)]
        );
    }

    #[test]
    fn test_not_connected_still_updates_state() {
        let mut console = MotorConsole::new(PedestalRange::default(), DEFAULT_PING_INTERVAL);
        assert!(!console.is_connected());
        assert!(matches!(console.step_motor(Motor::Motor7, 1), Err(ConsoleError::NotConnected)));
        assert_eq!(console.motors().get(Motor::Motor7), 261);
        assert!(matches!(console.send_command(SysexCommand::Landing), Err(ConsoleError::NotConnected)));
        assert!(matches!(console.first_telemetry_entry(), Err(ConsoleError::NotConnected)));
    }

    #[test]
    fn test_correction_parameter_scaling() {
        let board = RecordingBoard::default();
        let mut console = console_with(&board);
        assert_eq!(console.set_correction_from_text("2.0").unwrap(), 20);
        assert_eq!(console.set_correction_from_text("0.35").unwrap(), 3);
        assert_eq!(console.set_correction_from_text("-1.29").unwrap(), -12);
        assert!(matches!(console.set_correction_from_text("fast"), Err(ConsoleError::InvalidFloat(_))));
        assert!(matches!(console.set_correction_from_text("inf"), Err(ConsoleError::InvalidFloat(_))));
        assert_eq!(
            without_pings(board.calls()),
            vec![Call::DumpParameter(20), Call::DumpParameter(3), Call::DumpParameter(-12)]
        );
    }

    #[test]
    fn test_correction_outside_wire_range_rejected() {
        let board = RecordingBoard::default();
        let mut console = console_with(&board);
        assert!(matches!(
            console.set_correction_from_text("2000"),
            Err(ConsoleError::CorrectionOutOfRange { value, .. }) if value == 20000.0
        ));
        assert!(matches!(console.set_correction_from_text("999"), Err(ConsoleError::CorrectionOutOfRange { .. })));
        assert!(matches!(console.set_correction_from_text("-820"), Err(ConsoleError::CorrectionOutOfRange { .. })));
        assert!(matches!(console.set_correction_from_text("1e300"), Err(ConsoleError::CorrectionOutOfRange { .. })));
        assert_eq!(console.set_correction_from_text("819").unwrap(), 8190);
        assert_eq!(console.set_correction_from_text("-819").unwrap(), -8190);
        assert_eq!(
            without_pings(board.calls()),
            vec![Call::DumpParameter(8190), Call::DumpParameter(-8190)]
        );
    }

    #[test]
    fn test_fixed_commands_forwarded_verbatim() {
        let board = RecordingBoard::default();
        let mut console = console_with(&board);
        for cmd in SysexCommand::ALL {
            console.send_command(cmd).unwrap();
        }
        assert_eq!(
            without_pings(board.calls()),
            vec![Call::Sysex(0x13), Call::Sysex(0x14), Call::Sysex(0x18), Call::Sysex(0x19), Call::Sysex(0x1c)]
        );
    }

    #[test]
    fn test_board_errors_are_reported() {
        let board = RecordingBoard { fail_writes: true, ..Default::default() };
        let mut console = console_with(&board);
        assert!(matches!(console.send_command(SysexCommand::WriteData), Err(ConsoleError::Board(_))));
    }

    #[test]
    fn test_heartbeat_follows_board_state() {
        let board = RecordingBoard::default();
        let mut console = console_with(&board);
        assert!(console.heartbeat_running());
        console.shutdown();
        assert!(!console.heartbeat_running());

        let stopped = RecordingBoard { stopped: true, ..Default::default() };
        console.attach_board(Box::new(stopped));
        assert!(console.is_connected());
        assert!(!console.heartbeat_running());
    }

    #[test]
    fn test_telemetry_views() {
        let board = RecordingBoard {
            rows: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            ..Default::default()
        };
        let console = console_with(&board);
        assert_eq!(console.first_telemetry_entry().unwrap(), vec![1.0, 2.0, 3.0]);
        let series = console.plot_series("0 2").unwrap();
        assert_eq!(series[1].points, vec![[0.0, 3.0], [1.0, 6.0]]);
        assert!(matches!(console.plot_series("7"), Err(ConsoleError::Telemetry(_))));

        let empty = console_with(&RecordingBoard::default());
        assert!(matches!(empty.first_telemetry_entry(), Err(ConsoleError::Telemetry(TelemetryError::Empty))));
    }
}
