/// Hardware link to the motor board
///
/// `Board` is the seam the console talks to. `FirmataBoard` is the serial
/// implementation: it writes sysex frames for every call and runs a reader
/// thread that collects telemetry rows sent back by the firmware.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serialport::SerialPort;

use crate::motors::Motor;
use crate::sysex::{self, SysexDecoder};
use crate::telemetry::{self, TelemetryBuffer};

/// Operations the console needs from the motor board
pub trait Board: Send {
    fn set_value_single(&mut self, motor: Motor, value: i32) -> Result<()>;
    fn set_value_all(&mut self, value: i32) -> Result<()>;
    fn set_pedestal_single(&mut self, motor: Motor, value: i32) -> Result<()>;
    fn set_pedestal_all(&mut self, value: i32) -> Result<()>;
    fn set_dump_parameter(&mut self, value: i32) -> Result<()>;
    /// Forward a raw command byte to the firmware
    fn send_sysex(&mut self, command: u8) -> Result<()>;
    fn send_ping(&mut self) -> Result<()>;
    /// Snapshot of the telemetry captured so far
    fn graph_data(&self) -> Vec<Vec<f64>>;
    fn is_running(&self) -> bool;
}

/// Board handle shared between the UI thread and the heartbeat
pub type SharedBoard = Arc<Mutex<Box<dyn Board>>>;

pub fn share(board: Box<dyn Board>) -> SharedBoard {
    Arc::new(Mutex::new(board))
}

/// Sysex command ids the firmware understands for each board call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSet {
    pub set_value_single: u8,
    pub set_value_all: u8,
    pub set_pedestal_single: u8,
    pub set_pedestal_all: u8,
    pub set_dump_parameter: u8,
    pub ping: u8,
    pub telemetry: u8,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            set_value_single: 0x10,
            set_value_all: 0x11,
            set_pedestal_single: 0x15,
            set_pedestal_all: 0x16,
            set_dump_parameter: 0x17,
            ping: 0x1A,
            telemetry: 0x1B,
        }
    }
}

pub const DEFAULT_BAUD: u32 = 57600;
const RESET_DELAY: Duration = Duration::from_millis(2000);
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// `[channel, lsb, msb]` frame for a single-motor command
pub fn single_motor_frame(command: u8, motor: Motor, value: i32) -> Vec<u8> {
    let [lsb, msb] = sysex::pack_14bit(value);
    sysex::encode_frame(command, &[motor.channel(), lsb, msb])
}

/// `[lsb, msb]` frame for an all-motor or parameter command
pub fn value_frame(command: u8, value: i32) -> Vec<u8> {
    sysex::encode_frame(command, &sysex::pack_14bit(value))
}

/// Telemetry payloads are a sequence of 14-bit signed values
pub fn decode_telemetry_row(payload: &[u8]) -> Vec<f64> {
    payload
        .chunks_exact(2)
        .map(|pair| sysex::unpack_14bit(pair[0], pair[1]) as f64)
        .collect()
}

pub struct FirmataBoard {
    port: Box<dyn SerialPort>,
    port_path: String,
    commands: CommandSet,
    telemetry: TelemetryBuffer,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl FirmataBoard {
    pub fn connect(port_path: &str, baud: u32, commands: CommandSet, telemetry_capacity: usize) -> Result<Self> {
        log::info!(target: "board", "Opening {} @{}", port_path, baud);
        let port = serialport::new(port_path, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .with_context(|| format!("Failed to open {} at {} baud", port_path, baud))?;
        // Arduino resets when the port opens
        thread::sleep(RESET_DELAY);
        let reader_port = port
            .try_clone()
            .with_context(|| format!("Failed to clone serial handle for {}", port_path))?;

        let telemetry = telemetry::new_buffer();
        let running = Arc::new(AtomicBool::new(true));
        let reader = Self::spawn_reader(
            reader_port,
            commands.telemetry,
            Arc::clone(&telemetry),
            telemetry_capacity,
            Arc::clone(&running),
        );
        log::info!(target: "board", "Connected to {}", port_path);

        Ok(Self {
            port,
            port_path: port_path.to_string(),
            commands,
            telemetry,
            running,
            reader: Some(reader),
        })
    }

    fn spawn_reader(
        mut port: Box<dyn SerialPort>,
        telemetry_cmd: u8,
        telemetry: TelemetryBuffer,
        capacity: usize,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut decoder = SysexDecoder::new();
            let mut chunk = [0u8; 256];
            while running.load(Ordering::Relaxed) {
                match port.read(&mut chunk) {
                    Ok(0) => thread::sleep(Duration::from_millis(10)),
                    Ok(n) => {
                        for frame in decoder.feed(&chunk[..n]) {
                            if frame.command == telemetry_cmd {
                                telemetry::push_row(&telemetry, decode_telemetry_row(&frame.payload), capacity);
                            } else {
                                log::debug!(target: "board", "RECV sysex 0x{:02x} ({} bytes)", frame.command, frame.payload.len());
                            }
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(e) => {
                        log::error!(target: "board", "Serial read error: {}", e);
                        running.store(false, Ordering::Relaxed);
                        break;
                    }
                }
            }
        })
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if !self.is_running() {
            return Err(anyhow!("Board on {} is stopped", self.port_path));
        }
        log::debug!(target: "board", "SEND: {:02x?}", frame);
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }
}

impl Board for FirmataBoard {
    fn set_value_single(&mut self, motor: Motor, value: i32) -> Result<()> {
        let frame = single_motor_frame(self.commands.set_value_single, motor, value);
        self.write_frame(&frame)
    }

    fn set_value_all(&mut self, value: i32) -> Result<()> {
        let frame = value_frame(self.commands.set_value_all, value);
        self.write_frame(&frame)
    }

    fn set_pedestal_single(&mut self, motor: Motor, value: i32) -> Result<()> {
        let frame = single_motor_frame(self.commands.set_pedestal_single, motor, value);
        self.write_frame(&frame)
    }

    fn set_pedestal_all(&mut self, value: i32) -> Result<()> {
        let frame = value_frame(self.commands.set_pedestal_all, value);
        self.write_frame(&frame)
    }

    fn set_dump_parameter(&mut self, value: i32) -> Result<()> {
        let frame = value_frame(self.commands.set_dump_parameter, value);
        self.write_frame(&frame)
    }

    fn send_sysex(&mut self, command: u8) -> Result<()> {
        self.write_frame(&sysex::encode_frame(command, &[]))
    }

    fn send_ping(&mut self) -> Result<()> {
        self.write_frame(&sysex::encode_frame(self.commands.ping, &[]))
    }

    fn graph_data(&self) -> Vec<Vec<f64>> {
        self.telemetry.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for FirmataBoard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        log::info!(target: "board", "Closed {}", self.port_path);
    }
}
