use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::modules::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(value: u64) -> Self {
        TaskId(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
}

/// Ordered to-do list. The first incomplete task is the current goal.
///
/// Mutators that take an id return `false` and leave the list alone when
/// the id is unknown.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: Vec<Task>,
    next_id: u64,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// The starting point of every fresh list: one task with no text.
    pub fn with_blank_task() -> Self {
        let mut list = Self::new();
        list.add();
        list
    }

    pub fn add(&mut self) -> TaskId {
        self.add_with_text(String::new())
    }

    pub fn add_with_text(&mut self, text: impl Into<String>) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.tasks.push(Task {
            id,
            text: text.into(),
            completed: false,
        });
        id
    }

    pub fn remove(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    pub fn set_text(&mut self, id: TaskId, text: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(task) => {
                task.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn toggle(&mut self, id: TaskId) -> bool {
        match self.get_mut(id) {
            Some(task) => {
                task.completed = !task.completed;
                true
            }
            None => false,
        }
    }

    /// Reorders the list to match `order`, which must be a permutation of the
    /// current ids.
    pub fn reorder(&mut self, order: &[TaskId]) -> Result<(), ValidationError> {
        if order.len() != self.tasks.len() {
            return Err(ValidationError::NotAPermutation);
        }
        let current: HashSet<TaskId> = self.tasks.iter().map(|t| t.id).collect();
        let requested: HashSet<TaskId> = order.iter().copied().collect();
        if requested.len() != order.len() || requested != current {
            return Err(ValidationError::NotAPermutation);
        }

        let mut remaining = std::mem::take(&mut self.tasks);
        for id in order {
            if let Some(pos) = remaining.iter().position(|t| t.id == *id) {
                self.tasks.push(remaining.swap_remove(pos));
            }
        }
        Ok(())
    }

    pub fn current_goal(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| !t.completed)
    }

    /// True only for a non-empty list where every task is checked off.
    pub fn all_completed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.completed)
    }

    /// Checks the list is ready to start a session.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tasks.is_empty() {
            return Err(ValidationError::EmptyList);
        }
        match self.tasks.iter().position(|t| t.text.trim().is_empty()) {
            Some(index) => Err(ValidationError::EmptyTaskText { position: index + 1 }),
            None => Ok(()),
        }
    }

    /// Back to a single blank task. Ids keep counting up so stale ids from
    /// the previous list never match.
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.add();
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
