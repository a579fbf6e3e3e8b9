use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};

use crate::modules::analysis_client::{AnalysisClient, HttpAnalysisClient};
use crate::modules::app_mode::{AppMode, AppStateMachine, SessionEffect, Transition};
use crate::modules::capture::{CaptureSource, ScreenCommandSource};
use crate::modules::database::SessionStore;
use crate::modules::error::{Result, ValidationError};
use crate::modules::session_controller::{NudgeEvent, SessionController, SessionSettings};
use crate::modules::task_list::{Task, TaskId, TaskList};
use crate::modules::utils::{default_database_path, load_config_or_default, LockInConfig};

const CONNECTION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// What the UI needs to render the current screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSnapshot {
    pub mode: AppMode,
    pub tasks: Vec<Task>,
    pub current_goal: Option<TaskId>,
}

impl AppSnapshot {
    fn of(machine: &AppStateMachine) -> Self {
        Self {
            mode: machine.mode(),
            tasks: machine.tasks().tasks().to_vec(),
            current_goal: machine.current_goal().map(|t| t.id),
        }
    }
}

/// Owns the mode machine and the capture session and keeps them in step.
pub struct AppState {
    pub config: LockInConfig,
    pub store: Arc<SessionStore>,
    pub session: Arc<SessionController>,
    machine: Arc<Mutex<AppStateMachine>>,
    mode_tx: Arc<watch::Sender<AppMode>>,
}

impl AppState {
    /// Production wiring: user config, on-disk store, HTTP analysis and the
    /// platform screenshot tool.
    pub async fn new() -> anyhow::Result<Self> {
        let config = load_config_or_default();

        let db_path = default_database_path().context("Could not locate data directory")?;
        let db_path = db_path
            .to_str()
            .context("Database path is not valid UTF-8")?
            .to_string();
        let store = SessionStore::open(&db_path)
            .await
            .with_context(|| format!("Failed to open session store at {}", db_path))?;

        let analysis = HttpAnalysisClient::new(config.analysis_endpoint.clone(), config.analysis_timeout())
            .context("Failed to build analysis client")?;
        let capture = ScreenCommandSource::detect();

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(capture),
            Arc::new(analysis),
        ))
    }

    pub fn from_parts(
        config: LockInConfig,
        store: Arc<SessionStore>,
        capture: Arc<dyn CaptureSource>,
        analysis: Arc<dyn AnalysisClient>,
    ) -> Self {
        let session = Arc::new(SessionController::new(
            capture,
            analysis,
            store.clone(),
            SessionSettings::from(&config),
        ));
        let (mode_tx, _) = watch::channel(AppMode::Welcome);
        Self {
            config,
            store,
            session,
            machine: Arc::new(Mutex::new(AppStateMachine::new())),
            mode_tx: Arc::new(mode_tx),
        }
    }

    pub fn mode(&self) -> AppMode {
        *self.mode_tx.borrow()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<AppMode> {
        self.mode_tx.subscribe()
    }

    pub fn subscribe_nudges(&self) -> broadcast::Receiver<NudgeEvent> {
        self.session.subscribe()
    }

    pub async fn snapshot(&self) -> AppSnapshot {
        AppSnapshot::of(&*self.machine.lock().await)
    }

    pub async fn begin(&self) -> Result<AppSnapshot> {
        self.transition(|m| m.begin()).await
    }

    pub async fn submit(&self) -> Result<AppSnapshot> {
        self.transition(|m| m.submit()).await
    }

    pub async fn edit(&self) -> Result<AppSnapshot> {
        self.transition(|m| m.edit()).await
    }

    pub async fn dismiss(&self) -> Result<AppSnapshot> {
        self.transition(|m| m.dismiss()).await
    }

    pub async fn add_task(&self) -> (TaskId, AppSnapshot) {
        self.update_tasks(|tasks| tasks.add()).await
    }

    pub async fn remove_task(&self, id: TaskId) -> AppSnapshot {
        self.update_tasks(|tasks| tasks.remove(id)).await.1
    }

    pub async fn set_task_text(&self, id: TaskId, text: String) -> AppSnapshot {
        self.update_tasks(|tasks| tasks.set_text(id, text)).await.1
    }

    pub async fn toggle_task(&self, id: TaskId) -> AppSnapshot {
        self.update_tasks(|tasks| tasks.toggle(id)).await.1
    }

    pub async fn reorder_tasks(&self, order: Vec<TaskId>) -> Result<AppSnapshot> {
        let (result, snapshot) = self.update_tasks(|tasks| tasks.reorder(&order)).await;
        result?;
        Ok(snapshot)
    }

    /// Probes the endpoint this running session sends frames to. A config
    /// saved since launch is not applied until restart, so it is not used here.
    pub async fn check_connection(&self) -> Result<bool> {
        let client = HttpAnalysisClient::new(self.config.analysis_endpoint.clone(), CONNECTION_CHECK_TIMEOUT)?;
        Ok(client.test_connection().await)
    }

    /// Stops capturing and, if configured, forgets what was captured.
    pub async fn shutdown(&self) {
        self.session.stop().await;
        if self.config.clear_records_on_exit {
            if let Err(e) = self.session.clear_records().await {
                log::error!("Error clearing capture records: {}", e);
            }
        }
    }

    async fn transition<F>(&self, f: F) -> Result<AppSnapshot>
    where
        F: FnOnce(&mut AppStateMachine) -> std::result::Result<Transition, ValidationError>,
    {
        let mut machine = self.machine.lock().await;
        let transition = f(&mut *machine)?;
        log::info!("Mode {} -> {}", transition.from, transition.to);

        let goal = goal_text(machine.tasks());
        apply_transition(&self.session, &self.mode_tx, transition, goal).await;
        self.schedule_completion(&machine);
        Ok(AppSnapshot::of(&machine))
    }

    async fn update_tasks<R>(&self, f: impl FnOnce(&mut TaskList) -> R) -> (R, AppSnapshot) {
        let mut machine = self.machine.lock().await;
        let result = machine.edit_tasks(f);

        if machine.mode() == AppMode::Active {
            self.session.set_current_goal(goal_text(machine.tasks())).await;
        }
        self.schedule_completion(&machine);
        (result, AppSnapshot::of(&machine))
    }

    /// Arms the delayed active -> accomplished transition when every task is
    /// checked off. Later edits make the pending transition a no-op.
    fn schedule_completion(&self, machine: &AppStateMachine) {
        let Some(pending) = machine.pending_completion() else {
            return;
        };

        let delay = self.config.accomplish_delay();
        let machine = self.machine.clone();
        let session = self.session.clone();
        let mode_tx = self.mode_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut machine = machine.lock().await;
            if let Some(transition) = machine.complete(pending) {
                log::info!("All tasks completed; mission accomplished");
                apply_transition(&session, &mode_tx, transition, None).await;
            }
        });
    }
}

fn goal_text(tasks: &TaskList) -> Option<String> {
    tasks.current_goal().map(|t| t.text.clone())
}

async fn apply_transition(
    session: &SessionController,
    mode_tx: &watch::Sender<AppMode>,
    transition: Transition,
    goal: Option<String>,
) {
    match transition.session_effect() {
        Some(SessionEffect::Start) => {
            session.set_current_goal(goal).await;
            session.start().await;
        }
        Some(SessionEffect::Stop) => {
            session.stop().await;
        }
        None => {}
    }
    mode_tx.send_replace(transition.to);
}
