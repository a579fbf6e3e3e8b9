use serde::{Deserialize, Serialize};
use std::fmt;

use crate::modules::error::ValidationError;
use crate::modules::task_list::{Task, TaskList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    Welcome,
    Create,
    Active,
    Accomplished,
}

impl AppMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AppMode::Welcome => "welcome",
            AppMode::Create => "create",
            AppMode::Active => "active",
            AppMode::Accomplished => "accomplished",
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the capture session has to do because of a mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: AppMode,
    pub to: AppMode,
}

impl Transition {
    pub fn session_effect(&self) -> Option<SessionEffect> {
        match (self.from == AppMode::Active, self.to == AppMode::Active) {
            (false, true) => Some(SessionEffect::Start),
            (true, false) => Some(SessionEffect::Stop),
            _ => None,
        }
    }
}

/// A completed list waiting out the debounce delay. Only valid while the
/// machine's task epoch still matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCompletion {
    epoch: u64,
}

/// welcome -> create -> active -> accomplished -> welcome, with
/// active -> create for edits. Pure: side effects are returned as
/// [`Transition`]s for the caller to apply.
#[derive(Debug, Clone)]
pub struct AppStateMachine {
    mode: AppMode,
    tasks: TaskList,
    epoch: u64,
}

impl Default for AppStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStateMachine {
    pub fn new() -> Self {
        Self {
            mode: AppMode::Welcome,
            tasks: TaskList::with_blank_task(),
            epoch: 0,
        }
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    pub fn current_goal(&self) -> Option<&Task> {
        self.tasks.current_goal()
    }

    /// "Ready to lock in?"
    pub fn begin(&mut self) -> Result<Transition, ValidationError> {
        self.expect(AppMode::Welcome, "start a new list")?;
        self.reset_tasks();
        Ok(self.move_to(AppMode::Create))
    }

    pub fn submit(&mut self) -> Result<Transition, ValidationError> {
        self.expect(AppMode::Create, "submit the list")?;
        self.tasks.validate()?;
        Ok(self.move_to(AppMode::Active))
    }

    pub fn edit(&mut self) -> Result<Transition, ValidationError> {
        self.expect(AppMode::Active, "edit the list")?;
        Ok(self.move_to(AppMode::Create))
    }

    pub fn dismiss(&mut self) -> Result<Transition, ValidationError> {
        self.expect(AppMode::Accomplished, "dismiss")?;
        self.reset_tasks();
        Ok(self.move_to(AppMode::Welcome))
    }

    /// Applies `f` to the task list. Every call invalidates any pending
    /// completion, even if `f` turned out to be a no-op.
    pub fn edit_tasks<R>(&mut self, f: impl FnOnce(&mut TaskList) -> R) -> R {
        self.epoch += 1;
        f(&mut self.tasks)
    }

    /// Some when the list is finished and the automatic transition should be
    /// scheduled.
    pub fn pending_completion(&self) -> Option<PendingCompletion> {
        if self.mode == AppMode::Active && self.tasks.all_completed() {
            Some(PendingCompletion { epoch: self.epoch })
        } else {
            None
        }
    }

    /// Fires active -> accomplished if nothing touched the list since
    /// `pending` was issued and it is still fully checked off.
    pub fn complete(&mut self, pending: PendingCompletion) -> Option<Transition> {
        if pending.epoch != self.epoch || self.pending_completion().is_none() {
            return None;
        }
        Some(self.move_to(AppMode::Accomplished))
    }

    fn expect(&self, mode: AppMode, action: &'static str) -> Result<(), ValidationError> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(ValidationError::InvalidTransition {
                from: self.mode,
                action,
            })
        }
    }

    fn reset_tasks(&mut self) {
        self.epoch += 1;
        self.tasks.reset();
    }

    fn move_to(&mut self, to: AppMode) -> Transition {
        let transition = Transition { from: self.mode, to };
        self.mode = to;
        transition
    }
}
