//! Small daily todo list kept next to the timer.

use crate::models::TodoItem;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

pub const MAX_TODOS: usize = 3;
pub const MAX_TODO_CHARS: usize = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoList {
    pub items: Vec<TodoItem>,
    /// Day on which completed flags were last cleared.
    pub last_reset_day: Option<NaiveDate>,
}

impl TodoList {
    /// Builds a list from stored items, keeping only the first few.
    pub fn from_parts(mut items: Vec<TodoItem>, last_reset_day: Option<NaiveDate>) -> Self {
        items.truncate(MAX_TODOS);
        Self {
            items,
            last_reset_day,
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= MAX_TODOS
    }

    /// Adds a todo. Returns `None` if the text is blank or the list is full.
    pub fn add(&mut self, text: &str, now: DateTime<Utc>) -> Option<TodoItem> {
        let text = text.trim();
        if text.is_empty() || self.is_full() {
            return None;
        }

        let item = TodoItem {
            id: Uuid::new_v4().to_string(),
            todo_text: text.chars().take(MAX_TODO_CHARS).collect(),
            completed: false,
            created_at: now,
        };
        self.items.push(item.clone());
        Some(item)
    }

    /// Flips the completed flag, returning the updated item.
    pub fn toggle(&mut self, id: &str) -> Option<TodoItem> {
        let item = self.items.iter_mut().find(|item| item.id == id)?;
        item.completed = !item.completed;
        Some(item.clone())
    }

    pub fn remove(&mut self, id: &str) -> Option<TodoItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// Returns the id of the item at a 1-based position.
    pub fn id_at(&self, position: usize) -> Option<&str> {
        position
            .checked_sub(1)
            .and_then(|index| self.items.get(index))
            .map(|item| item.id.as_str())
    }

    /// Clears completed flags once per day. Returns the items that changed.
    pub fn reset_completed_if_new_day(&mut self, today: NaiveDate) -> Vec<TodoItem> {
        if self.last_reset_day == Some(today) {
            return Vec::new();
        }
        self.last_reset_day = Some(today);

        self.items
            .iter_mut()
            .filter(|item| item.completed)
            .map(|item| {
                item.completed = false;
                item.clone()
            })
            .collect()
    }
}
