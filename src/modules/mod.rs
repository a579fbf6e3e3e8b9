// Module declarations
pub mod analysis_client;
pub mod app_mode;
pub mod app_state;
pub mod capture;
pub mod database;
pub mod error;
pub mod session_controller;
pub mod task_list;
#[cfg(feature = "desktop")]
pub mod tauri_commands;
pub mod utils;
