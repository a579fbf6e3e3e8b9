use tauri::{AppHandle, Emitter, State};

use crate::modules::app_state::{AppSnapshot, AppState};
use crate::modules::database::CaptureRecord;
use crate::modules::session_controller::CycleOutcome;
use crate::modules::task_list::TaskId;
use crate::modules::utils::{
    default_config_path, load_config_from, save_config_to, send_log, LockInConfig,
};

fn publish(app: &AppHandle, snapshot: &AppSnapshot) {
    if let Err(e) = app.emit("tasks_changed", snapshot) {
        send_log(app, "warn", &format!("Failed to emit tasks update: {}", e));
    }
}

#[tauri::command]
pub async fn get_snapshot(state: State<'_, AppState>) -> Result<AppSnapshot, String> {
    Ok(state.snapshot().await)
}

#[tauri::command]
pub async fn begin_list(state: State<'_, AppState>, app: AppHandle) -> Result<AppSnapshot, String> {
    let snapshot = state.begin().await.map_err(|e| e.to_string())?;
    publish(&app, &snapshot);
    Ok(snapshot)
}

#[tauri::command]
pub async fn submit_list(state: State<'_, AppState>, app: AppHandle) -> Result<AppSnapshot, String> {
    match state.submit().await {
        Ok(snapshot) => {
            publish(&app, &snapshot);
            Ok(snapshot)
        }
        Err(e) => {
            send_log(&app, "info", &format!("List not submitted: {}", e));
            Err(e.to_string())
        }
    }
}

#[tauri::command]
pub async fn edit_list(state: State<'_, AppState>, app: AppHandle) -> Result<AppSnapshot, String> {
    let snapshot = state.edit().await.map_err(|e| e.to_string())?;
    publish(&app, &snapshot);
    Ok(snapshot)
}

#[tauri::command]
pub async fn dismiss_accomplished(state: State<'_, AppState>, app: AppHandle) -> Result<AppSnapshot, String> {
    let snapshot = state.dismiss().await.map_err(|e| e.to_string())?;
    publish(&app, &snapshot);
    Ok(snapshot)
}

#[tauri::command]
pub async fn add_task(state: State<'_, AppState>, app: AppHandle) -> Result<TaskId, String> {
    let (id, snapshot) = state.add_task().await;
    publish(&app, &snapshot);
    Ok(id)
}

#[tauri::command]
pub async fn remove_task(id: TaskId, state: State<'_, AppState>, app: AppHandle) -> Result<AppSnapshot, String> {
    let snapshot = state.remove_task(id).await;
    publish(&app, &snapshot);
    Ok(snapshot)
}

#[tauri::command]
pub async fn set_task_text(
    id: TaskId,
    text: String,
    state: State<'_, AppState>,
    app: AppHandle,
) -> Result<AppSnapshot, String> {
    let snapshot = state.set_task_text(id, text).await;
    publish(&app, &snapshot);
    Ok(snapshot)
}

#[tauri::command]
pub async fn toggle_task(id: TaskId, state: State<'_, AppState>, app: AppHandle) -> Result<AppSnapshot, String> {
    let snapshot = state.toggle_task(id).await;
    publish(&app, &snapshot);
    Ok(snapshot)
}

#[tauri::command]
pub async fn reorder_tasks(
    order: Vec<TaskId>,
    state: State<'_, AppState>,
    app: AppHandle,
) -> Result<AppSnapshot, String> {
    let snapshot = state.reorder_tasks(order).await.map_err(|e| e.to_string())?;
    publish(&app, &snapshot);
    Ok(snapshot)
}

#[tauri::command]
pub async fn start_session(state: State<'_, AppState>, app: AppHandle) -> Result<bool, String> {
    let started = state.session.start().await;
    if started {
        send_log(&app, "info", "Starting screenshot capture");
    }
    Ok(started)
}

#[tauri::command]
pub async fn stop_session(state: State<'_, AppState>, app: AppHandle) -> Result<bool, String> {
    let stopped = state.session.stop().await;
    if stopped {
        send_log(&app, "info", "Stopped screenshot capture");
    }
    Ok(stopped)
}

#[tauri::command]
pub async fn set_current_goal(goal: Option<String>, state: State<'_, AppState>) -> Result<(), String> {
    state.session.set_current_goal(goal).await;
    Ok(())
}

#[tauri::command]
pub async fn capture_now(state: State<'_, AppState>, app: AppHandle) -> Result<Option<CaptureRecord>, String> {
    match state.session.run_cycle().await {
        CycleOutcome::Recorded { record, .. } => Ok(Some(record)),
        CycleOutcome::Busy => {
            send_log(&app, "debug", "Capture already in progress");
            Ok(None)
        }
        CycleOutcome::Failed(e) => Err(e.to_string()),
    }
}

#[tauri::command]
pub async fn get_records(limit: Option<u32>, state: State<'_, AppState>) -> Result<Vec<CaptureRecord>, String> {
    state
        .session
        .records(limit.unwrap_or(10))
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn clear_records(state: State<'_, AppState>, app: AppHandle) -> Result<u64, String> {
    let removed = state.session.clear_records().await.map_err(|e| e.to_string())?;
    send_log(&app, "info", &format!("Cleared {} captures", removed));
    Ok(removed)
}

#[tauri::command]
pub async fn check_connection(state: State<'_, AppState>) -> Result<serde_json::Value, String> {
    let connected = state.check_connection().await.map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "analysis": connected,
        "endpoint": state.config.analysis_endpoint,
    }))
}

#[tauri::command]
pub async fn load_config() -> Result<LockInConfig, String> {
    let path = default_config_path().map_err(|e| e.to_string())?;
    load_config_from(&path).map_err(|e| e.to_string())
}

/// Takes effect on next launch.
#[tauri::command]
pub async fn save_config(config: LockInConfig, app: AppHandle) -> Result<(), String> {
    let path = default_config_path().map_err(|e| e.to_string())?;
    save_config_to(&config, &path).map_err(|e| e.to_string())?;
    send_log(&app, "info", &format!("Config saved. Endpoint: {}", config.analysis_endpoint));
    Ok(())
}
