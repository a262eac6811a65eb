/// Firmata sysex framing
///
/// Only the framing layer is handled here: `0xF0 <cmd> <7-bit data...> 0xF7`.
/// Multi-byte values travel as 7-bit pairs, LSB first.

pub const START_SYSEX: u8 = 0xF0;
pub const END_SYSEX: u8 = 0xF7;

/// Signed range a 14-bit value can carry on the wire
pub const VALUE_MIN: i32 = -8192;
pub const VALUE_MAX: i32 = 8191;

/// Longest frame body (command + payload) the decoder will buffer
pub const MAX_FRAME_LEN: usize = 1024;

/// One decoded sysex message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysexFrame {
    pub command: u8,
    pub payload: Vec<u8>,
}

pub fn encode_frame(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 3);
    buf.push(START_SYSEX);
    buf.push(command & 0x7F);
    buf.extend(payload.iter().map(|b| b & 0x7F));
    buf.push(END_SYSEX);
    buf
}

pub fn fits_14bit(value: i64) -> bool {
    value >= VALUE_MIN as i64 && value <= VALUE_MAX as i64
}

/// Split a value into two 7-bit bytes (low 14 bits, LSB first).
/// Callers keep values inside `VALUE_MIN..=VALUE_MAX`.
pub fn pack_14bit(value: i32) -> [u8; 2] {
    let v = value as u32 & 0x3FFF;
    [(v & 0x7F) as u8, ((v >> 7) & 0x7F) as u8]
}

/// Join two 7-bit bytes into a signed 14-bit value
pub fn unpack_14bit(lsb: u8, msb: u8) -> i16 {
    let raw = ((msb as u16 & 0x7F) << 7) | (lsb as u16 & 0x7F);
    // sign-extend bit 13
    ((raw << 2) as i16) >> 2
}

/// Incremental decoder fed with raw serial bytes
#[derive(Debug, Default)]
pub struct SysexDecoder {
    buffer: Vec<u8>,
    in_frame: bool,
}

impl SysexDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) -> Option<SysexFrame> {
        match byte {
            START_SYSEX => {
                self.buffer.clear();
                self.in_frame = true;
                None
            }
            END_SYSEX if self.in_frame => {
                self.in_frame = false;
                let mut bytes = std::mem::take(&mut self.buffer).into_iter();
                let command = bytes.next()?;
                Some(SysexFrame { command, payload: bytes.collect() })
            }
            b if b & 0x80 != 0 => {
                // A status byte inside a frame means the frame was cut off
                self.in_frame = false;
                self.buffer.clear();
                None
            }
            b => {
                if self.in_frame {
                    if self.buffer.len() >= MAX_FRAME_LEN {
                        log::warn!(target: "sysex", "Dropping sysex frame longer than {} bytes", MAX_FRAME_LEN);
                        self.in_frame = false;
                        self.buffer.clear();
                    } else {
                        self.buffer.push(b);
                    }
                }
                None
            }
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SysexFrame> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }
}
