// Module declarations
pub mod modules;

pub use modules::app_mode::{AppMode, AppStateMachine, SessionEffect, Transition};
pub use modules::app_state::{AppSnapshot, AppState};
pub use modules::analysis_client::{Analysis, AnalysisClient, HttpAnalysisClient};
pub use modules::capture::{capture_frame, CaptureSource, Frame, RetryPolicy, ScreenCommandSource, Source};
pub use modules::database::{CaptureRecord, SessionStore};
pub use modules::error::{LockInError, ValidationError};
pub use modules::session_controller::{CycleOutcome, NudgeEvent, SessionController, SessionSettings};
pub use modules::task_list::{Task, TaskId, TaskList};
pub use modules::utils::LockInConfig;

#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
mod desktop {
    use tauri::{Emitter, Manager, RunEvent, State, UserAttentionType};
    use tokio::sync::broadcast::error::RecvError;

    use crate::modules::{
        app_state::AppState,
        tauri_commands::*,
        utils::{send_log, send_notification},
    };

    const MAIN_WINDOW: &str = "main";

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        let app = tauri::Builder::default()
            .plugin(tauri_plugin_log::Builder::new()
                .target(tauri_plugin_log::Target::new(
                    tauri_plugin_log::TargetKind::Stdout,
                ))
                .build())
            .plugin(tauri_plugin_notification::init())
            .manage(tauri::async_runtime::block_on(AppState::new()).expect("Failed to initialize app state"))
            .invoke_handler(tauri::generate_handler![
                get_snapshot,
                begin_list,
                submit_list,
                edit_list,
                dismiss_accomplished,
                add_task,
                remove_task,
                set_task_text,
                toggle_task,
                reorder_tasks,
                start_session,
                stop_session,
                set_current_goal,
                capture_now,
                get_records,
                clear_records,
                check_connection,
                load_config,
                save_config,
            ])
            .setup(|app| {
                let app_handle = app.handle();

                forward_nudges(app_handle.clone());
                forward_mode_changes(app_handle.clone());

                send_log(app_handle, "info", "LockIn initialized successfully");
                Ok(())
            })
            .build(tauri::generate_context!())
            .expect("error while building tauri application");

        app.run(|app_handle, event| {
            if let RunEvent::ExitRequested { .. } = event {
                let state: State<AppState> = app_handle.state();
                tauri::async_runtime::block_on(state.shutdown());
            }
        });
    }

    /// Relays session nudges to the window and, if enabled, the OS.
    fn forward_nudges(app: tauri::AppHandle) {
        let state = app.state::<AppState>();
        let mut nudges = state.subscribe_nudges();
        let notify = state.config.notifications_enabled;

        tauri::async_runtime::spawn(async move {
            loop {
                match nudges.recv().await {
                    Ok(nudge) => {
                        if notify {
                            send_notification(&app, "LockIn Reminder", &nudge.message);
                        }
                        request_attention(&app);
                        if let Err(e) = app.emit("nudge-received", &nudge.message) {
                            send_log(&app, "error", &format!("Failed to emit nudge: {}", e));
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        send_log(&app, "warn", &format!("Dropped {} nudges", missed));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Flags the main window in the taskbar/dock so one click brings the
    /// list back, without stealing focus from whatever the user is doing.
    fn request_attention(app: &tauri::AppHandle) {
        let Some(window) = app.get_webview_window(MAIN_WINDOW) else {
            return;
        };
        if window.is_focused().unwrap_or(false) {
            return;
        }
        if let Err(e) = window.request_user_attention(Some(UserAttentionType::Informational)) {
            send_log(app, "debug", &format!("Could not flag window: {}", e));
        }
    }

    /// Covers transitions the UI did not ask for, such as the delayed
    /// switch to accomplished.
    fn forward_mode_changes(app: tauri::AppHandle) {
        let mut modes = app.state::<AppState>().subscribe_mode();

        tauri::async_runtime::spawn(async move {
            while modes.changed().await.is_ok() {
                let mode = *modes.borrow_and_update();
                if let Err(e) = app.emit("mode_changed", mode) {
                    send_log(&app, "error", &format!("Failed to emit mode change: {}", e));
                }
                let snapshot = app.state::<AppState>().snapshot().await;
                if let Err(e) = app.emit("tasks_changed", &snapshot) {
                    send_log(&app, "error", &format!("Failed to emit tasks update: {}", e));
                }
            }
        });
    }
}
