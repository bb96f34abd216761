// [libs/core/tasks/src/manager.rs]
/*!
 * TaskManager (spec §4.6): owns every `Task`; backend workers only ever
 * hold an opaque id. Transitions follow the table in §4.6 exactly —
 * terminal states reject every further transition rather than panic.
 */

use crate::errors::TaskError;
use chrono::Utc;
use paygate_model::{JsonValue, Task, TaskStatus};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

pub const DEFAULT_MAX_TASKS: usize = 10_000;
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub struct TaskManager {
    max_tasks: usize,
    task_timeout: chrono::Duration,
    tasks: RwLock<HashMap<String, Task>>,
}

impl TaskManager {
    pub fn new(max_tasks: usize, task_timeout: Duration) -> Self {
        Self {
            max_tasks: max_tasks.max(1),
            task_timeout: chrono::Duration::from_std(task_timeout).unwrap_or(chrono::Duration::seconds(900)),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self, tool_name: &str, arguments: JsonValue, api_key_prefix: &str, session_id: Option<String>) -> Task {
        let id = format!("task_{}", uuid::Uuid::new_v4());
        let task = Task::new(id.clone(), tool_name.to_string(), arguments, api_key_prefix.to_string(), session_id);

        let mut guard = self.tasks.write().expect("task manager lock poisoned");
        guard.insert(id, task.clone());
        drop(guard);

        self.evict_if_needed();
        task
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().expect("task manager lock poisoned").get(id).cloned()
    }

    pub fn start(&self, id: &str) -> Result<Task, TaskError> {
        self.transition(id, |task| {
            if task.status.is_terminal() {
                return Err(TaskError::TerminalState);
            }
            task.status = TaskStatus::Running;
            task.started_at.get_or_insert_with(Utc::now);
            Ok(())
        })
    }

    pub fn update_progress(&self, id: &str, progress: u8, message: Option<String>) -> Result<Task, TaskError> {
        self.transition(id, |task| {
            if task.status.is_terminal() {
                return Err(TaskError::TerminalState);
            }
            task.progress = progress.min(100);
            if message.is_some() {
                task.message = message.clone();
            }
            Ok(())
        })
    }

    pub fn complete(&self, id: &str, result: JsonValue, outcome_credits: Option<i64>) -> Result<Task, TaskError> {
        self.transition(id, |task| {
            if task.status.is_terminal() {
                return Err(TaskError::TerminalState);
            }
            task.status = TaskStatus::Completed;
            task.progress = 100;
            task.result = Some(result.clone());
            task.outcome_credits = outcome_credits;
            let completed_at = Utc::now();
            task.duration_ms = Some((completed_at - task.created_at).num_milliseconds().max(0) as u64);
            task.completed_at = Some(completed_at);
            Ok(())
        })
    }

    pub fn fail(&self, id: &str, error: &str) -> Result<Task, TaskError> {
        self.transition(id, |task| {
            if task.status.is_terminal() {
                return Err(TaskError::TerminalState);
            }
            task.status = TaskStatus::Failed;
            task.error = Some(error.to_string());
            task.completed_at = Some(Utc::now());
            Ok(())
        })
    }

    pub fn cancel(&self, id: &str) -> Result<Task, TaskError> {
        self.transition(id, |task| {
            if task.status.is_terminal() {
                return Err(TaskError::TerminalState);
            }
            task.status = TaskStatus::Cancelled;
            task.completed_at = Some(Utc::now());
            Ok(())
        })
    }

    fn transition(&self, id: &str, f: impl FnOnce(&mut Task) -> Result<(), TaskError>) -> Result<Task, TaskError> {
        let mut guard = self.tasks.write().expect("task manager lock poisoned");
        let task = guard.get_mut(id).ok_or(TaskError::NotFound)?;
        f(task)?;
        Ok(task.clone())
    }

    /// Cursor is a base-10 numeric offset; `page_size` clamped to [1, 200];
    /// sorted by `created_at` descending (spec §4.6 `tasks/list`).
    pub fn list(&self, cursor: usize, page_size: usize) -> (Vec<Task>, Option<usize>) {
        let guard = self.tasks.read().expect("task manager lock poisoned");
        let mut all: Vec<Task> = guard.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let page_size = page_size.clamp(1, 200);
        let page: Vec<Task> = all.iter().skip(cursor).take(page_size).cloned().collect();
        let next_cursor = if cursor + page.len() < all.len() { Some(cursor + page.len()) } else { None };
        (page, next_cursor)
    }

    /// Transitions any `pending|running` task older than the configured
    /// timeout to `failed` with a timeout error. Returns the count swept.
    pub fn sweep_timeouts(&self) -> usize {
        let now = Utc::now();
        let mut guard = self.tasks.write().expect("task manager lock poisoned");
        let mut swept = 0;

        for task in guard.values_mut() {
            if !task.status.is_terminal() && now - task.created_at > self.task_timeout {
                task.status = TaskStatus::Failed;
                task.error = Some("task exceeded its configured timeout".to_string());
                task.completed_at = Some(now);
                swept += 1;
            }
        }

        swept
    }

    /// Evicts the oldest terminal tasks once the store is at capacity:
    /// removes at least one, up to 10% of the terminal cohort.
    pub fn evict_if_needed(&self) -> usize {
        let mut guard = self.tasks.write().expect("task manager lock poisoned");
        if guard.len() < self.max_tasks {
            return 0;
        }

        let mut terminal_ids: Vec<(String, chrono::DateTime<Utc>)> = guard
            .values()
            .filter(|t| t.status.is_terminal())
            .map(|t| (t.id.clone(), t.completed_at.or(Some(t.created_at)).unwrap()))
            .collect();
        terminal_ids.sort_by_key(|(_, ts)| *ts);

        let evict_count = ((terminal_ids.len() as f64 * 0.10).ceil() as usize).max(1).min(terminal_ids.len());
        for (id, _) in terminal_ids.into_iter().take(evict_count) {
            guard.remove(&id);
        }
        evict_count
    }

    pub fn len(&self) -> usize {
        self.tasks.read().expect("task manager lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_lifecycle_scenario_i() {
        let manager = TaskManager::new(DEFAULT_MAX_TASKS, DEFAULT_TASK_TIMEOUT);
        let task = manager.create("search", json!({"q": "x"}), "pg_abc", None);
        manager.start(&task.id).unwrap();
        manager.update_progress(&task.id, 50, None).unwrap();
        manager.update_progress(&task.id, 80, None).unwrap();
        let completed = manager.complete(&task.id, json!({"x": 1}), Some(5)).unwrap();

        assert_eq!(completed.status, TaskStatus::Completed);
        assert_eq!(completed.progress, 100);
        assert!(completed.duration_ms.unwrap_or(0) < u64::MAX);
        assert_eq!(completed.result, Some(json!({"x": 1})));

        assert!(matches!(manager.cancel(&task.id), Err(TaskError::TerminalState)));
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let manager = TaskManager::new(DEFAULT_MAX_TASKS, DEFAULT_TASK_TIMEOUT);
        let task = manager.create("search", json!({}), "pg_abc", None);
        manager.cancel(&task.id).unwrap();
        assert!(matches!(manager.start(&task.id), Err(TaskError::TerminalState)));
        assert!(matches!(manager.fail(&task.id, "x"), Err(TaskError::TerminalState)));
    }

    #[test]
    fn sweep_fails_stale_pending_tasks() {
        let manager = TaskManager::new(DEFAULT_MAX_TASKS, Duration::from_secs(0));
        let task = manager.create("slow", json!({}), "pg_abc", None);
        std::thread::sleep(Duration::from_millis(5));
        let swept = manager.sweep_timeouts();
        assert_eq!(swept, 1);
        assert_eq!(manager.get(&task.id).unwrap().status, TaskStatus::Failed);
    }

    #[test]
    fn eviction_removes_oldest_terminal_tasks_first() {
        let manager = TaskManager::new(4, DEFAULT_TASK_TIMEOUT);
        let mut ids = Vec::new();
        for i in 0..4 {
            let task = manager.create(&format!("t{i}"), json!({}), "pg_abc", None);
            manager.cancel(&task.id).unwrap();
            ids.push(task.id);
        }
        assert_eq!(manager.len(), 4);
        let evicted = manager.evict_if_needed();
        assert!(evicted >= 1);
        assert!(manager.get(&ids[0]).is_none());
    }

    #[test]
    fn list_paginates_newest_first() {
        let manager = TaskManager::new(DEFAULT_MAX_TASKS, DEFAULT_TASK_TIMEOUT);
        for i in 0..5 {
            manager.create(&format!("t{i}"), json!({}), "pg_abc", None);
        }
        let (page, next) = manager.list(0, 2);
        assert_eq!(page.len(), 2);
        assert!(next.is_some());
    }
}
