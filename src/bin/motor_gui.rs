/// Motor console GUI binary
///
/// Run with: cargo run --bin motor_gui -- [--port /dev/ttyACM0] [--debug]

use clap::Parser;
use eframe::egui;
use gethostname::gethostname;
use std::fs::File;
use std::path::PathBuf;

use motor_console::config_loader::{self, ConsoleSettings};
use motor_console::gui::motor_gui::MotorGUI;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Echo the debug log to stdout and motor_gui.log
    #[arg(long)]
    debug: bool,
    /// Serial port to prefill in the port field
    #[arg(long)]
    port: Option<String>,
    /// Config file (defaults to MOTOR_CONSOLE_CONFIG or motor_console.yaml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut debug_file: Option<File> = None;
    if args.debug {
        match File::create("motor_gui.log") {
            Ok(file) => debug_file = Some(file),
            Err(e) => eprintln!("Warning: could not create motor_gui.log: {}", e),
        }
    }

    let hostname = gethostname().to_string_lossy().to_string();
    let path = args.config.clone().unwrap_or_else(config_loader::config_path);
    let settings = match config_loader::load_console_settings(&path, &hostname) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Warning: Could not load console settings for '{}': {}. Using defaults.", hostname, e);
            log::warn!(target: "motor_gui", "Falling back to default settings: {}", e);
            ConsoleSettings::default()
        }
    };

    let app = MotorGUI::new(settings, args.port, args.debug, debug_file);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Motor Console")
            .with_inner_size([760.0, 520.0]),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(
        "Motor Console",
        options,
        Box::new(|_cc| Box::new(app)),
    ) {
        eprintln!("GUI error: {}", e);
        std::process::exit(1);
    }
}
