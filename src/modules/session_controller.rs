use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::modules::analysis_client::AnalysisClient;
use crate::modules::capture::{capture_frame, CaptureSource, RetryPolicy};
use crate::modules::database::{CaptureRecord, SessionStore};
use crate::modules::error::{LockInError, Result};
use crate::modules::utils::{now_millis, LockInConfig};

const NUDGE_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub interval: Duration,
    pub recent_max_age: Duration,
    pub recent_limit: u32,
    pub capture_retry: RetryPolicy,
    pub analysis_timeout: Duration,
}

impl From<&LockInConfig> for SessionSettings {
    fn from(config: &LockInConfig) -> Self {
        Self {
            interval: config.capture_interval(),
            recent_max_age: Duration::from_secs(config.recent_window_minutes.saturating_mul(60)),
            recent_limit: config.recent_window_limit,
            capture_retry: RetryPolicy {
                attempts: config.capture_retry_attempts,
                backoff: Duration::from_millis(config.capture_retry_backoff_ms),
            },
            analysis_timeout: config.analysis_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&LockInConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NudgeEvent {
    pub message: String,
    pub timestamp: i64,
}

/// Result of one capture -> analyze -> persist pass.
#[derive(Debug)]
pub enum CycleOutcome {
    Recorded { record: CaptureRecord, nudged: bool },
    /// A manual cycle found another one still in flight.
    Busy,
    Failed(LockInError),
}

impl CycleOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, CycleOutcome::Recorded { .. })
    }
}

struct SessionInner {
    capture: Arc<dyn CaptureSource>,
    analysis: Arc<dyn AnalysisClient>,
    store: Arc<SessionStore>,
    settings: SessionSettings,
    current_goal: Mutex<Option<String>>,
    /// Held for the whole of a cycle.
    cycle: Arc<Mutex<()>>,
    nudges: broadcast::Sender<NudgeEvent>,
}

struct RunningSession {
    stop: watch::Sender<bool>,
    _timer: JoinHandle<()>,
}

/// Drives the periodic capture loop. Idle until [`start`](Self::start),
/// back to idle after [`stop`](Self::stop). Cycles never overlap.
pub struct SessionController {
    inner: Arc<SessionInner>,
    running: Mutex<Option<RunningSession>>,
}

impl SessionController {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        analysis: Arc<dyn AnalysisClient>,
        store: Arc<SessionStore>,
        settings: SessionSettings,
    ) -> Self {
        let (nudges, _) = broadcast::channel(NUDGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SessionInner {
                capture,
                analysis,
                store,
                settings,
                current_goal: Mutex::new(None),
                cycle: Arc::new(Mutex::new(())),
                nudges,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NudgeEvent> {
        self.inner.nudges.subscribe()
    }

    pub async fn set_current_goal(&self, goal: Option<String>) {
        let goal = goal.filter(|g| !g.trim().is_empty());
        log::info!("Current goal set: {:?}", goal);
        *self.inner.current_goal.lock().await = goal;
    }

    pub async fn current_goal(&self) -> Option<String> {
        self.inner.current_goal.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Starts the timer and fires the first cycle right away. Returns false
    /// if a session was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            log::debug!("Capture already running");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let timer = tokio::spawn(run_timer(self.inner.clone(), stop_rx));
        *running = Some(RunningSession {
            stop: stop_tx,
            _timer: timer,
        });
        log::info!(
            "Capture session started (every {}s)",
            self.inner.settings.interval.as_secs()
        );
        true
    }

    /// Cancels the timer. A cycle already in flight still finishes and keeps
    /// its record. Returns false if nothing was running.
    pub async fn stop(&self) -> bool {
        match self.running.lock().await.take() {
            Some(session) => {
                let _ = session.stop.send(true);
                log::info!("Capture session stopped");
                true
            }
            None => false,
        }
    }

    /// Runs one cycle now, outside the timer. Returns [`CycleOutcome::Busy`]
    /// instead of waiting if a cycle is already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        match self.inner.cycle.clone().try_lock_owned() {
            Ok(permit) => run_guarded_cycle(self.inner.clone(), permit).await,
            Err(_) => {
                log::debug!("Previous capture cycle still running; skipping");
                CycleOutcome::Busy
            }
        }
    }

    pub async fn records(&self, limit: u32) -> Result<Vec<CaptureRecord>> {
        self.inner.store.recent(limit).await
    }

    pub async fn clear_records(&self) -> Result<u64> {
        let removed = self.inner.store.clear().await?;
        log::info!("Cleared {} capture records", removed);
        Ok(removed)
    }
}

async fn run_timer(inner: Arc<SessionInner>, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(inner.settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }
        // A cycle left over from a previous session may still be running.
        // Wait for it rather than dropping this tick.
        let permit = tokio::select! {
            biased;
            _ = stop.changed() => break,
            permit = inner.cycle.clone().lock_owned() => permit,
        };
        if *stop.borrow() {
            break;
        }
        // The stop signal is only observed between cycles.
        run_guarded_cycle(inner.clone(), permit).await;
    }
}

/// Runs a cycle on its own task so that a panic inside a collaborator
/// surfaces as a failed cycle instead of killing the timer loop. The permit
/// is released when that task ends, however it ends.
async fn run_guarded_cycle(inner: Arc<SessionInner>, permit: OwnedMutexGuard<()>) -> CycleOutcome {
    let outcome = match tokio::spawn(async move {
        let _permit = permit;
        run_cycle(&inner).await
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Capture cycle aborted: {}", e);
            CycleOutcome::Failed(LockInError::Capture(format!("cycle aborted: {}", e)))
        }
    };

    if let CycleOutcome::Failed(e) = &outcome {
        log::warn!("Capture cycle skipped: {}", e);
    }
    outcome
}

async fn run_cycle(inner: &SessionInner) -> CycleOutcome {
    let frame = match capture_frame(inner.capture.as_ref(), inner.settings.capture_retry).await {
        Ok(frame) => frame,
        Err(e) => return CycleOutcome::Failed(e),
    };

    let max_age_ms = i64::try_from(inner.settings.recent_max_age.as_millis()).unwrap_or(i64::MAX);
    let cutoff = now_millis().saturating_sub(max_age_ms);
    let recent = match inner.store.recent_window(cutoff, inner.settings.recent_limit).await {
        Ok(records) => records,
        Err(e) => {
            log::warn!("Could not read recent captures, continuing without them: {}", e);
            Vec::new()
        }
    };

    let goal = inner.current_goal.lock().await.clone();

    let analysis = match tokio::time::timeout(
        inner.settings.analysis_timeout,
        inner.analysis.analyze(&frame, goal.as_deref(), &recent),
    )
    .await
    {
        Ok(Ok(analysis)) => analysis,
        Ok(Err(e)) => return CycleOutcome::Failed(e),
        Err(_) => {
            return CycleOutcome::Failed(LockInError::Transport(format!(
                "analysis timed out after {}s",
                inner.settings.analysis_timeout.as_secs()
            )))
        }
    };

    let record = CaptureRecord {
        timestamp: analysis.timestamp.unwrap_or_else(now_millis),
        description: analysis.description,
        goal,
        nudge: analysis.nudge,
    };

    if let Err(e) = inner.store.insert(&record).await {
        return CycleOutcome::Failed(e);
    }
    log::debug!("Analysis saved: {}", record.description);

    let nudged = match &record.nudge {
        Some(message) => {
            log::info!("Nudge received: {}", message);
            // No subscribers is fine; the record still carries the nudge.
            let _ = inner.nudges.send(NudgeEvent {
                message: message.clone(),
                timestamp: record.timestamp,
            });
            true
        }
        None => false,
    };

    CycleOutcome::Recorded { record, nudged }
}
