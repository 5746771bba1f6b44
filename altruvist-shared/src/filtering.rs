/// In-memory filtering of dashboard task lists
///
/// The dashboard fetches a user's tasks once and narrows them locally by a
/// free-text search and four single-choice filters. [`TaskFilter::apply`]
/// performs the same narrowing server-side for `GET /v1/tasks/mine`.

use serde::{Deserialize, Serialize};

use crate::models::task::{SortDirection, TaskStatus, TaskUrgency, TaskWithApplications};
use crate::models::task_application::ApplicationStatus;

/// A filter that holds at most one selected option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Status,
    Urgency,
    Skills,
    Deadline,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub search: String,
    pub status: Option<String>,
    pub urgency: Option<String>,
    pub skills: Option<String>,
    pub deadline: Option<SortDirection>,
}

impl TaskFilter {
    /// Single-choice selection: selecting an option replaces the current
    /// choice, deselecting clears it.
    pub fn select(&mut self, kind: FilterKind, option: &str, selected: bool) {
        let value = selected.then(|| option.to_string());
        match kind {
            FilterKind::Status => self.status = value,
            FilterKind::Urgency => self.urgency = value,
            FilterKind::Skills => self.skills = value,
            FilterKind::Deadline => {
                self.deadline = if selected {
                    SortDirection::parse(option)
                } else {
                    None
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty()
            && self.status.is_none()
            && self.urgency.is_none()
            && self.skills.is_none()
            && self.deadline.is_none()
    }

    /// Narrows and orders `tasks`
    pub fn apply(&self, tasks: Vec<TaskWithApplications>) -> Vec<TaskWithApplications> {
        let needle = self.search.trim().to_lowercase();

        let mut filtered: Vec<TaskWithApplications> = tasks
            .into_iter()
            .filter(|t| needle.is_empty() || matches_search(t, &needle))
            .filter(|t| self.status.as_deref().map_or(true, |s| matches_status(t, s)))
            .filter(|t| {
                self.urgency
                    .as_deref()
                    .map_or(true, |u| t.task.urgency.unwrap_or(TaskUrgency::Low).as_str() == u)
            })
            .filter(|t| {
                self.skills
                    .as_deref()
                    .map_or(true, |skill| t.task.required_skills.iter().any(|s| s == skill))
            })
            .collect();

        match self.deadline {
            Some(SortDirection::Asc) => filtered.sort_by(|a, b| a.task.deadline.cmp(&b.task.deadline)),
            Some(SortDirection::Desc) => filtered.sort_by(|a, b| b.task.deadline.cmp(&a.task.deadline)),
            None => {}
        }

        filtered
    }
}

fn matches_search(task: &TaskWithApplications, needle: &str) -> bool {
    task.task.title.to_lowercase().contains(needle)
        || task.task.description.to_lowercase().contains(needle)
}

/// Task statuses compare against the task; application statuses match when
/// any application has that status. Unknown values match everything.
fn matches_status(task: &TaskWithApplications, status: &str) -> bool {
    if let Some(task_status) = TaskStatus::parse(status) {
        return task.task.status == task_status;
    }
    if let Some(application_status) = ApplicationStatus::parse(status) {
        return task
            .task_applications
            .iter()
            .any(|a| a.status == application_status);
    }
    true
}
