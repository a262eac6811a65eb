/// Motor console window
///
/// Every handler logs its outcome to the debug log and carries on; nothing
/// an operator clicks can take the application down.

use eframe::egui;
use egui_plot::{Legend, Line, Plot, PlotPoints};
use std::fs::File;
use std::io::Write;
use std::time::Duration;

use crate::config_loader::ConsoleSettings;
use crate::console::{ConsoleResult, MotorConsole, SysexCommand};
use crate::motors::Motor;
use crate::telemetry::{self, PlotSeries};

const LOG_LIMIT: usize = 10000;
const LOG_KEEP: usize = 5000;

pub struct MotorGUI {
    console: MotorConsole,
    settings: ConsoleSettings,
    port_edit: String,
    port_choice: usize,
    power_edit: String,
    kvalue_edit: String,
    example_line: String,
    plots_line: String,
    plot_series: Vec<PlotSeries>,
    show_plot: bool,
    show_quit_dialog: bool,
    allowed_to_close: bool,
    debug_enabled: bool,
    debug_log: String,
    debug_file: Option<File>,
}

impl MotorGUI {
    pub fn new(settings: ConsoleSettings, port: Option<String>, debug: bool, debug_file: Option<File>) -> Self {
        let console = MotorConsole::new(settings.range, settings.ping_interval);
        let power_edit = settings.range.min().to_string();
        let mut s = Self {
            console,
            settings,
            port_edit: port.unwrap_or_default(),
            port_choice: 0,
            power_edit,
            kvalue_edit: "2.0".to_string(),
            example_line: String::new(),
            plots_line: "2 4 8".to_string(),
            plot_series: Vec::new(),
            show_plot: false,
            show_quit_dialog: false,
            allowed_to_close: false,
            debug_enabled: debug,
            debug_log: String::new(),
            debug_file,
        };
        s.log(&format!(
            "Initialized: pedestal range [{}, {}], {} known ports",
            s.settings.range.min(),
            s.settings.range.max(),
            s.settings.ports.len()
        ));
        if debug { s.log("Debug logging enabled"); }
        s
    }

    fn log(&mut self, message: &str) {
        log::info!(target: "motor_gui", "{}", message);
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.debug_log.push_str(&format!("[{}] {}\n", stamp, message));
        if self.debug_log.len() > LOG_LIMIT {
            let mut cut = self.debug_log.len() - LOG_KEEP;
            while !self.debug_log.is_char_boundary(cut) {
                cut += 1;
            }
            self.debug_log = self.debug_log.split_off(cut);
        }
        if self.debug_enabled {
            println!("DEBUG: {}", message);
            if let Some(f) = self.debug_file.as_mut() {
                if let Err(e) = f.write_all(format!("{}\n", message).as_bytes()) {
                    eprintln!("Debug file write failed, disabling it: {}", e);
                    self.debug_file = None;
                }
            }
        }
    }

    /// Swallow a handler failure after logging it
    fn report<T>(&mut self, handler: &str, result: ConsoleResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!(target: "motor_gui", "Problem with {}: {}", handler, e);
                self.log(&format!("Problem with {}: {}", handler, e));
                None
            }
        }
    }

    fn selected_port(&self) -> String {
        let typed = self.port_edit.trim();
        if !typed.is_empty() {
            return typed.to_string();
        }
        self.settings.ports.get(self.port_choice).cloned().unwrap_or_default()
    }

    fn connect_to_board(&mut self) {
        let port = self.selected_port();
        if port.is_empty() {
            self.log("Problem with connect: no port selected");
            return;
        }
        self.log(&format!("Connecting to: {}", port));
        let result = self.console.connect(
            &port,
            self.settings.baud,
            self.settings.commands,
            self.settings.telemetry_capacity,
        );
        if self.report("connect", result).is_some() {
            let hb = if self.console.heartbeat_running() { "heartbeat running" } else { "heartbeat not started" };
            self.log(&format!("Connected to {} ({})", port, hb));
        }
    }

    fn set_powers(&mut self) {
        let text = self.power_edit.clone();
        let result = self.console.set_all_from_text(&text);
        if let Some(value) = self.report("set_powers", result) {
            self.log(&format!("Setting all power to: {}", value));
        }
    }

    fn set_powers_up_down(&mut self, delta: i32) {
        self.log(&format!("All power {:+}", delta));
        for (motor, result) in self.console.step_all(delta) {
            if let Some(value) = self.report(&format!("set_powers_up_down ({})", motor), result) {
                self.log(&format!("{} -> {}", motor, value));
            }
        }
    }

    fn step_motor(&mut self, motor: Motor, delta: i32) {
        self.log(&format!("{:+} in {}", delta, motor));
        let result = self.console.step_motor(motor, delta);
        self.report(if delta > 0 { "add_one" } else { "minus_one" }, result);
    }

    fn set_kvalues(&mut self) {
        let text = self.kvalue_edit.clone();
        let result = self.console.set_correction_from_text(&text);
        if let Some(value) = self.report("set_kvalues", result) {
            self.log(&format!("Setting kvalue to: {}", value));
        }
    }

    fn send_command(&mut self, command: SysexCommand) {
        self.log(&format!("Send {} sysex 0x{:02x}", command.label().trim_end_matches(':'), command.code()));
        let result = self.console.send_command(command);
        self.report("send_command", result);
    }

    fn extract_example(&mut self) {
        let result = self.console.first_telemetry_entry();
        if let Some(row) = self.report("extract_example", result) {
            self.example_line = telemetry::format_entry(&row);
            let line = self.example_line.clone();
            self.log(&format!("First entry in data: {}", line));
        }
    }

    fn show_plots(&mut self) {
        let selection = self.plots_line.clone();
        self.log(&format!("Plotting columns: {}", selection.trim()));
        let result = self.console.plot_series(&selection);
        if let Some(series) = self.report("show_plots", result) {
            self.plot_series = series;
            self.show_plot = true;
        }
    }

    fn confirm_quit(&mut self, ctx: &egui::Context) {
        if ctx.input(|i| i.viewport().close_requested()) && !self.allowed_to_close {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.show_quit_dialog = true;
        }
        if !self.show_quit_dialog {
            return;
        }
        egui::Window::new("Message")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("Are you sure to quit?");
                ui.horizontal(|ui| {
                    if ui.button("Yes").clicked() {
                        self.console.shutdown();
                        self.log("Heartbeat stopped, closing");
                        self.allowed_to_close = true;
                        self.show_quit_dialog = false;
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                    if ui.button("No").clicked() {
                        self.show_quit_dialog = false;
                    }
                });
            });
    }

    fn plot_window(&mut self, ctx: &egui::Context) {
        let mut open = self.show_plot;
        egui::Window::new("Telemetry")
            .open(&mut open)
            .default_size([600.0, 350.0])
            .show(ctx, |ui| {
                if self.plot_series.is_empty() {
                    ui.label("No columns selected");
                    return;
                }
                Plot::new("telemetry_plot")
                    .legend(Legend::default())
                    .view_aspect(2.0)
                    .show(ui, |plot_ui| {
                        for series in &self.plot_series {
                            let points = PlotPoints::from(series.points.clone());
                            plot_ui.line(Line::new(points).name(format!("column {}", series.column)));
                        }
                    });
            });
        self.show_plot = open;
    }

    fn connect_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Port:");
            ui.add(egui::TextEdit::singleline(&mut self.port_edit).desired_width(200.0));
            let ports = self.settings.ports.clone();
            let selected = ports.get(self.port_choice).cloned().unwrap_or_default();
            egui::ComboBox::from_id_source("port_combo")
                .selected_text(selected)
                .show_ui(ui, |ui| {
                    for (idx, port) in ports.iter().enumerate() {
                        ui.selectable_value(&mut self.port_choice, idx, port.as_str());
                    }
                });
            if ui.button("Connect").clicked() {
                self.connect_to_board();
            }
            let (color, text) = if self.console.is_connected() {
                (egui::Color32::GREEN, "connected")
            } else {
                (egui::Color32::GRAY, "not connected")
            };
            ui.colored_label(color, text);
        });
    }

    fn power_rows(&mut self, ui: &mut egui::Ui) {
        let mut pedestal = self.console.pedestal_mode();
        if ui.checkbox(&mut pedestal, "Change pedestals values").changed() {
            self.console.set_pedestal_mode(pedestal);
            self.log(&format!("Pedestal mode {}", if pedestal { "on" } else { "off" }));
        }
        let range = self.settings.range;
        ui.horizontal(|ui| {
            ui.label(format!("Set engines from {} to {}:", range.min(), range.max()));
            ui.add(egui::TextEdit::singleline(&mut self.power_edit).desired_width(50.0).char_limit(3));
            if ui.button("Set").clicked() {
                self.set_powers();
            }
            ui.vertical(|ui| {
                if ui.button("+1").clicked() { self.set_powers_up_down(1); }
                if ui.button("-1").clicked() { self.set_powers_up_down(-1); }
            });
            ui.vertical(|ui| {
                if ui.button("+5").clicked() { self.set_powers_up_down(5); }
                if ui.button("-5").clicked() { self.set_powers_up_down(-5); }
            });
        });
        ui.horizontal(|ui| {
            ui.label("Set correction parameter based on speed:");
            ui.add(egui::TextEdit::singleline(&mut self.kvalue_edit).desired_width(50.0).char_limit(3));
            if ui.button("Set").clicked() {
                self.set_kvalues();
            }
        });
    }

    fn command_rows(&mut self, ui: &mut egui::Ui) {
        let (first, second) = SysexCommand::ALL.split_at(4);
        for row in [first, second] {
            ui.horizontal(|ui| {
                for &command in row {
                    ui.label(command.label());
                    if ui.button(format!("0x{:02x}", command.code())).clicked() {
                        self.send_command(command);
                    }
                }
            });
        }
    }

    fn motor_grid(&mut self, ui: &mut egui::Ui) {
        egui::Grid::new("motor_grid").num_columns(4).spacing([8.0, 4.0]).show(ui, |ui| {
            for motor in Motor::ALL {
                if ui.button(format!("+1 {}", motor)).clicked() {
                    self.step_motor(motor, 1);
                }
            }
            ui.end_row();
            for motor in Motor::ALL {
                if ui.button(format!("-1 {}", motor)).clicked() {
                    self.step_motor(motor, -1);
                }
            }
            ui.end_row();
            for motor in Motor::ALL {
                let mut text = self.console.motors().get(motor).to_string();
                ui.add_enabled(false, egui::TextEdit::singleline(&mut text).desired_width(60.0));
            }
            ui.end_row();
        });
    }

    fn telemetry_rows(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Example data stored:");
            ui.add(egui::TextEdit::singleline(&mut self.example_line).desired_width(300.0));
            if ui.button("Load").clicked() {
                self.extract_example();
            }
        });
        ui.horizontal(|ui| {
            ui.add(egui::TextEdit::singleline(&mut self.plots_line).desired_width(150.0));
            if ui.button("Show").clicked() {
                self.show_plots();
            }
        });
    }
}

impl eframe::App for MotorGUI {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.confirm_quit(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            self.connect_row(ui);
            ui.separator();
            self.power_rows(ui);
            ui.separator();
            self.command_rows(ui);
            ui.separator();
            self.motor_grid(ui);
            ui.separator();
            self.telemetry_rows(ui);

            ui.collapsing("Debug log", |ui| {
                ui.horizontal(|ui| {
                    if ui.button("Clear log").clicked() {
                        self.debug_log.clear();
                    }
                    if ui.button("Copy log").clicked() {
                        let log = self.debug_log.clone();
                        ui.output_mut(|o| o.copied_text = log);
                    }
                });
                egui::ScrollArea::vertical()
                    .max_height(300.0)
                    .auto_shrink([false; 2])
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        ui.add(
                            egui::TextEdit::multiline(&mut self.debug_log)
                                .desired_width(f32::INFINITY)
                                .code_editor()
                        );
                    });
            });
        });

        self.plot_window(ctx);

        ctx.request_repaint_after(Duration::from_millis(500));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.console.shutdown();
    }
}
