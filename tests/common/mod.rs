#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lockin_lib::{
    Analysis, AnalysisClient, CaptureRecord, CaptureSource, Frame, LockInError, RetryPolicy,
    SessionSettings, SessionStore, Source,
};

/// Always hands back a tiny frame, or always fails.
pub struct FakeCapture {
    pub grabs: AtomicUsize,
    pub fail: bool,
}

impl FakeCapture {
    pub fn working() -> Arc<Self> {
        Arc::new(Self { grabs: AtomicUsize::new(0), fail: false })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self { grabs: AtomicUsize::new(0), fail: true })
    }

    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
}

impl CaptureSource for FakeCapture {
    fn list_sources(&self) -> BoxFuture<'_, Result<Vec<Source>, LockInError>> {
        let sources = vec![Source { id: "screen:0".to_string(), name: "Screen".to_string() }];
        futures::future::ready(Ok(sources)).boxed()
    }

    fn grab_frame<'a>(&'a self, _source: &'a Source) -> BoxFuture<'a, Result<Frame, LockInError>> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail {
            Err(LockInError::Capture("display asleep".to_string()))
        } else {
            Ok(Frame::new(vec![0x89, b'P', b'N', b'G']))
        };
        futures::future::ready(result).boxed()
    }
}

#[derive(Debug, Clone)]
pub struct SeenCall {
    pub goal: Option<String>,
    pub recent: usize,
}

/// Replays scripted replies; once the script runs out it keeps repeating
/// the fallback.
pub struct FakeAnalysis {
    script: Mutex<VecDeque<Result<Analysis, String>>>,
    fallback: Result<Analysis, String>,
    delay: Duration,
    pub calls: Mutex<Vec<SeenCall>>,
}

impl FakeAnalysis {
    pub fn always(reply: Result<Analysis, String>) -> Arc<Self> {
        Self::scripted(Vec::new(), reply, Duration::ZERO)
    }

    pub fn scripted(
        script: Vec<Result<Analysis, String>>,
        fallback: Result<Analysis, String>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<SeenCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl AnalysisClient for FakeAnalysis {
    fn analyze<'a>(
        &'a self,
        _frame: &'a Frame,
        goal: Option<&'a str>,
        recent: &'a [CaptureRecord],
    ) -> BoxFuture<'a, Result<Analysis, LockInError>> {
        self.calls.lock().unwrap().push(SeenCall {
            goal: goal.map(str::to_string),
            recent: recent.len(),
        });
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply.map_err(LockInError::Transport)
        }
        .boxed()
    }
}

pub fn analysis(description: &str, nudge: Option<&str>) -> Analysis {
    Analysis {
        description: description.to_string(),
        nudge: nudge.map(str::to_string),
        timestamp: None,
    }
}

pub fn fast_settings(interval: Duration) -> SessionSettings {
    SessionSettings {
        interval,
        recent_max_age: Duration::from_secs(15 * 60),
        recent_limit: 5,
        capture_retry: RetryPolicy { attempts: 1, backoff: Duration::ZERO },
        analysis_timeout: Duration::from_secs(2),
    }
}

pub async fn memory_store() -> Arc<SessionStore> {
    Arc::new(SessionStore::in_memory().await.expect("in-memory store"))
}

/// Polls `check` until it holds or `within` elapses.
pub async fn wait_until<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
