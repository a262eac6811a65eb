use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::{CommandSet, DEFAULT_BAUD};
use crate::heartbeat::DEFAULT_PING_INTERVAL;
use crate::motors::{PedestalRange, DEFAULT_PED_MAX, DEFAULT_PED_MIN};
use crate::sysex;
use crate::telemetry::DEFAULT_TELEMETRY_CAPACITY;

/// Ports offered in the port combo when the config lists none
pub const DEFAULT_PORTS: [&str; 3] = [
    "/dev/tty.usbserial-A9CZ7XPL",
    "/dev/tty.usbmodem1421",
    "/dev/tty.usbmodem1411",
];

const OS_SECTIONS: [&str; 3] = ["RaspberryPi", "Ubuntu", "macOS"];

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSettings {
    pub ports: Vec<String>,
    pub baud: u32,
    pub range: PedestalRange,
    pub ping_interval: Duration,
    pub telemetry_capacity: usize,
    pub commands: CommandSet,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            ports: DEFAULT_PORTS.iter().map(|p| p.to_string()).collect(),
            baud: DEFAULT_BAUD,
            range: PedestalRange::default(),
            ping_interval: DEFAULT_PING_INTERVAL,
            telemetry_capacity: DEFAULT_TELEMETRY_CAPACITY,
            commands: CommandSet::default(),
        }
    }
}

/// Config path: MOTOR_CONSOLE_CONFIG (from env or .env), else motor_console.yaml next to Cargo.toml
pub fn config_path() -> PathBuf {
    let _ = dotenv();
    env::var("MOTOR_CONSOLE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("motor_console.yaml"))
}

/// Load settings for `hostname`. Fails loudly on a missing file, missing
/// host entry, or malformed values.
pub fn load_console_settings(path: &Path, hostname: &str) -> Result<ConsoleSettings> {
    let file = File::open(path)
        .map_err(|e| anyhow!("Missing required config at {:?}: {}", path, e))?;
    let yaml: serde_yaml::Value = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    console_settings_from_yaml(&yaml, hostname)
}

fn find_host_block<'a>(yaml: &'a serde_yaml::Value, hostname: &str) -> Option<&'a serde_yaml::Mapping> {
    OS_SECTIONS.iter().find_map(|os_key| {
        yaml.get(*os_key)
            .and_then(|v| v.as_mapping())
            .and_then(|os_map| os_map.get(&serde_yaml::Value::from(hostname)))
            .and_then(|v| v.as_mapping())
    })
}

fn get_int(block: &serde_yaml::Mapping, key: &str, hostname: &str) -> Result<Option<i64>> {
    match block.get(&serde_yaml::Value::from(key)) {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| anyhow!("{} for '{}' must be an integer, got {:?}", key, hostname, v)),
    }
}

fn command_id(block: &serde_yaml::Mapping, key: &str, default: u8) -> Result<u8> {
    match get_int(block, key, "SYSEX_COMMANDS")? {
        None => Ok(default),
        Some(id) if (0..0x80).contains(&id) => Ok(id as u8),
        Some(id) => Err(anyhow!("SYSEX_COMMANDS.{} must be in 0..=0x7F, got {}", key, id)),
    }
}

pub fn console_settings_from_yaml(yaml: &serde_yaml::Value, hostname: &str) -> Result<ConsoleSettings> {
    let host_block = find_host_block(yaml, hostname)
        .ok_or_else(|| anyhow!("No host entry for '{}' in motor console config", hostname))?;
    let defaults = ConsoleSettings::default();

    let ports = match host_block.get(&serde_yaml::Value::from("ARD_PORTS")) {
        None | Some(serde_yaml::Value::Null) => defaults.ports,
        Some(v) => v
            .as_sequence()
            .ok_or_else(|| anyhow!("ARD_PORTS for '{}' must be a list", hostname))?
            .iter()
            .map(|p| {
                p.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| anyhow!("ARD_PORTS entries for '{}' must be strings", hostname))
            })
            .collect::<Result<Vec<_>>>()?,
    };

    let baud = get_int(host_block, "ARD_BAUD", hostname)?
        .map(|b| u32::try_from(b).map_err(|_| anyhow!("ARD_BAUD for '{}' out of range: {}", hostname, b)))
        .transpose()?
        .unwrap_or(defaults.baud);

    let ped_min = get_int(host_block, "PED_MIN", hostname)?.unwrap_or(DEFAULT_PED_MIN as i64);
    let ped_max = get_int(host_block, "PED_MAX", hostname)?.unwrap_or(DEFAULT_PED_MAX as i64);
    for (key, v) in [("PED_MIN", ped_min), ("PED_MAX", ped_max)] {
        if !sysex::fits_14bit(v) {
            return Err(anyhow!("{} for '{}' must be in [{}, {}], got {}",
                               key, hostname, sysex::VALUE_MIN, sysex::VALUE_MAX, v));
        }
    }
    let range = PedestalRange::new(ped_min as i32, ped_max as i32)?;

    let ping_interval = get_int(host_block, "PING_INTERVAL_MS", hostname)?
        .map(|ms| {
            if ms <= 0 {
                Err(anyhow!("PING_INTERVAL_MS for '{}' must be positive, got {}", hostname, ms))
            } else {
                Ok(Duration::from_millis(ms as u64))
            }
        })
        .transpose()?
        .unwrap_or(defaults.ping_interval);

    let telemetry_capacity = get_int(host_block, "TELEMETRY_CAPACITY", hostname)?
        .map(|c| {
            if c <= 0 {
                Err(anyhow!("TELEMETRY_CAPACITY for '{}' must be positive, got {}", hostname, c))
            } else {
                Ok(c as usize)
            }
        })
        .transpose()?
        .unwrap_or(defaults.telemetry_capacity);

    let commands = match host_block.get(&serde_yaml::Value::from("SYSEX_COMMANDS")) {
        None | Some(serde_yaml::Value::Null) => defaults.commands,
        Some(v) => {
            let cmds = v
                .as_mapping()
                .ok_or_else(|| anyhow!("SYSEX_COMMANDS for '{}' must be a mapping", hostname))?;
            let d = defaults.commands;
            CommandSet {
                set_value_single: command_id(cmds, "SET_VALUE_SINGLE", d.set_value_single)?,
                set_value_all: command_id(cmds, "SET_VALUE_ALL", d.set_value_all)?,
                set_pedestal_single: command_id(cmds, "SET_PEDESTAL_SINGLE", d.set_pedestal_single)?,
                set_pedestal_all: command_id(cmds, "SET_PEDESTAL_ALL", d.set_pedestal_all)?,
                set_dump_parameter: command_id(cmds, "SET_DUMP_PARAMETER", d.set_dump_parameter)?,
                ping: command_id(cmds, "PING", d.ping)?,
                telemetry: command_id(cmds, "TELEMETRY", d.telemetry)?,
            }
        }
    };

    log::info!(target: "config_loader", "ConsoleSettings for {}: {} ports, baud={}, range=[{}, {}]",
               hostname, ports.len(), baud, range.min(), range.max());

    Ok(ConsoleSettings {
        ports,
        baud,
        range,
        ping_interval,
        telemetry_capacity,
        commands,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> serde_yaml::Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_full_host_block() {
        let yaml = parse(r#"
Ubuntu:
  bench-1:
    ARD_PORTS: ["/dev/ttyACM0", "/dev/ttyUSB0"]
    ARD_BAUD: 115200
    PED_MIN: 250
    PED_MAX: 450
    PING_INTERVAL_MS: 1500
    TELEMETRY_CAPACITY: 100
    SYSEX_COMMANDS:
      PING: 0x20
"#);
        let s = console_settings_from_yaml(&yaml, "bench-1").unwrap();
        assert_eq!(s.ports, vec!["/dev/ttyACM0".to_string(), "/dev/ttyUSB0".to_string()]);
        assert_eq!(s.baud, 115200);
        assert_eq!((s.range.min(), s.range.max()), (250, 450));
        assert_eq!(s.ping_interval, Duration::from_millis(1500));
        assert_eq!(s.telemetry_capacity, 100);
        assert_eq!(s.commands.ping, 0x20);
        assert_eq!(s.commands.set_value_all, CommandSet::default().set_value_all);
    }

    #[test]
    fn test_empty_host_block_uses_defaults() {
        let yaml = parse("macOS:\n  laptop: {}\n");
        assert_eq!(console_settings_from_yaml(&yaml, "laptop").unwrap(), ConsoleSettings::default());
    }

    #[test]
    fn test_missing_host_is_error() {
        let yaml = parse("RaspberryPi:\n  pi-1: {}\n");
        assert!(console_settings_from_yaml(&yaml, "other").is_err());
    }

    #[test]
    fn test_inverted_range_is_error() {
        let yaml = parse("Ubuntu:\n  h:\n    PED_MIN: 500\n    PED_MAX: 400\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
    }

    #[test]
    fn test_wrong_types_are_errors() {
        let yaml = parse("Ubuntu:\n  h:\n    PED_MIN: low\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
        let yaml = parse("Ubuntu:\n  h:\n    ARD_PORTS: /dev/ttyACM0\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
        let yaml = parse("Ubuntu:\n  h:\n    SYSEX_COMMANDS:\n      PING: 200\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
        let yaml = parse("Ubuntu:\n  h:\n    PING_INTERVAL_MS: 0\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
        let yaml = parse("Ubuntu:\n  h:\n    SYSEX_COMMANDS: [0x10]\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
        let yaml = parse("Ubuntu:\n  h:\n    SYSEX_COMMANDS: 16\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
        let yaml = parse("Ubuntu:\n  h:\n    TELEMETRY_CAPACITY: 0\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
        let yaml = parse("Ubuntu:\n  h:\n    TELEMETRY_CAPACITY: -5\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
    }

    #[test]
    fn test_pedestal_range_must_fit_wire_values() {
        let yaml = parse("Ubuntu:\n  h:\n    PED_MAX: 9000\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
        let yaml = parse("Ubuntu:\n  h:\n    PED_MIN: -9000\n");
        assert!(console_settings_from_yaml(&yaml, "h").is_err());
        let yaml = parse("Ubuntu:\n  h:\n    PED_MIN: 0\n    PED_MAX: 8191\n");
        let s = console_settings_from_yaml(&yaml, "h").unwrap();
        assert_eq!((s.range.min(), s.range.max()), (0, 8191));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("motor_console_test_{}.yaml", std::process::id()));
        std::fs::write(&path, "Ubuntu:\n  h:\n    ARD_BAUD: 9600\n").unwrap();
        let s = load_console_settings(&path, "h").unwrap();
        assert_eq!(s.baud, 9600);
        let _ = std::fs::remove_file(&path);
        assert!(load_console_settings(&path, "h").is_err());
    }
}
