/// GUI windows

pub mod motor_gui;
