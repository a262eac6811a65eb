/// Motor set-point state
///
/// Four fixed motor channels, each holding an integer set-point that must stay
/// inside a closed pedestal range. Requests that would leave the range are
/// rejected and the stored value is left untouched.

use std::fmt;

/// Default lower bound of the pedestal range
pub const DEFAULT_PED_MIN: i32 = 260;
/// Default upper bound of the pedestal range
pub const DEFAULT_PED_MAX: i32 = 499;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MotorError {
    #[error("Out of range: {value} not in [{min}, {max}]")]
    OutOfRange { value: i64, min: i32, max: i32 },
    #[error("Invalid pedestal range: min {min} > max {max}")]
    InvalidRange { min: i32, max: i32 },
}

/// The four motor channels wired on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Motor {
    Motor2,
    Motor3,
    Motor6,
    Motor7,
}

impl Motor {
    pub const ALL: [Motor; 4] = [Motor::Motor2, Motor::Motor3, Motor::Motor6, Motor::Motor7];

    /// Hardware channel number sent in single-motor commands
    pub fn channel(self) -> u8 {
        match self {
            Motor::Motor2 => 2,
            Motor::Motor3 => 3,
            Motor::Motor6 => 6,
            Motor::Motor7 => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Motor::Motor2 => "motor2",
            Motor::Motor3 => "motor3",
            Motor::Motor6 => "motor6",
            Motor::Motor7 => "motor7",
        }
    }

    fn slot(self) -> usize {
        match self {
            Motor::Motor2 => 0,
            Motor::Motor3 => 1,
            Motor::Motor6 => 2,
            Motor::Motor7 => 3,
        }
    }
}

impl fmt::Display for Motor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed range `[min, max]` every motor value must stay in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PedestalRange {
    min: i32,
    max: i32,
}

impl Default for PedestalRange {
    fn default() -> Self {
        Self { min: DEFAULT_PED_MIN, max: DEFAULT_PED_MAX }
    }
}

impl PedestalRange {
    pub fn new(min: i32, max: i32) -> Result<Self, MotorError> {
        if min > max {
            return Err(MotorError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min as i64 && value <= self.max as i64
    }

    fn check(&self, value: i64) -> Result<i32, MotorError> {
        if self.contains(value) {
            Ok(value as i32)
        } else {
            Err(MotorError::OutOfRange { value, min: self.min, max: self.max })
        }
    }
}

/// Set-points for the four motors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorVector {
    values: [i32; 4],
    range: PedestalRange,
}

impl Default for MotorVector {
    fn default() -> Self {
        Self::new(PedestalRange::default())
    }
}

impl MotorVector {
    /// All motors start at the bottom of the range.
    pub fn new(range: PedestalRange) -> Self {
        Self { values: [range.min(); 4], range }
    }

    pub fn get(&self, motor: Motor) -> i32 {
        self.values[motor.slot()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Motor, i32)> + '_ {
        Motor::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    /// Move one motor by `delta`; rejected without change if the result leaves the range.
    pub fn adjust(&mut self, motor: Motor, delta: i32) -> Result<i32, MotorError> {
        let target = self.get(motor) as i64 + delta as i64;
        let value = self.range.check(target)?;
        self.values[motor.slot()] = value;
        Ok(value)
    }

    /// Set every motor to `value`; rejected without change if `value` is out of range.
    pub fn set_all(&mut self, value: i32) -> Result<(), MotorError> {
        let value = self.range.check(value as i64)?;
        self.values = [value; 4];
        Ok(())
    }

    /// Move each motor by `delta` independently. Motors that would leave the
    /// range keep their value and report the error.
    pub fn adjust_all(&mut self, delta: i32) -> Vec<(Motor, Result<i32, MotorError>)> {
        Motor::ALL
            .into_iter()
            .map(|m| (m, self.adjust(m, delta)))
            .collect()
    }
}
