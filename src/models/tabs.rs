//! Open tabs and the active selection.

use super::path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub path: String,
    /// Last path segment, kept in step with `path`.
    pub title: String,
}

impl Tab {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let title = path::file_name(&path).to_string();
        Self { path, title }
    }

    pub fn set_path(&mut self, path: String) {
        self.title = path::file_name(&path).to_string();
        self.path = path;
    }
}

/// Insertion-ordered tabs plus at most one active path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TabRegistry {
    tabs: Vec<Tab>,
    active: Option<String>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.tabs.iter().any(|tab| tab.path == path)
    }

    /// Makes `path` the active selection, appending a tab if it has none.
    pub fn activate(&mut self, path: &str) -> bool {
        let mut changed = false;
        if !self.contains(path) {
            self.tabs.push(Tab::new(path));
            changed = true;
        }
        if self.active.as_deref() != Some(path) {
            self.active = Some(path.to_string());
            changed = true;
        }
        changed
    }

    /// Closes the tab for `path`.
    ///
    /// Closing the active tab falls back to the last remaining tab, or to no
    /// selection when none are left.
    pub fn close(&mut self, path: &str) -> bool {
        let Some(index) = self.tabs.iter().position(|tab| tab.path == path) else {
            return false;
        };
        self.tabs.remove(index);
        if self.active.as_deref() == Some(path) {
            self.active = self.tabs.last().map(|tab| tab.path.clone());
        }
        true
    }

    pub fn clear_active(&mut self) -> bool {
        self.active.take().is_some()
    }

    /// Drops every tab at or under `root` and clears a selection inside it.
    pub fn remove_under(&mut self, root: &str) -> bool {
        let before = self.tabs.len();
        self.tabs
            .retain(|tab| !path::is_ancestor_or_self(root, &tab.path));
        let mut changed = self.tabs.len() != before;
        if self
            .active
            .as_deref()
            .is_some_and(|active| path::is_ancestor_or_self(root, active))
        {
            self.active = None;
            changed = true;
        }
        changed
    }

    /// Moves tabs and the selection from under `from` to under `to`.
    pub fn rename_under(&mut self, from: &str, to: &str) -> bool {
        let mut changed = false;
        for tab in &mut self.tabs {
            if let Some(new_path) = path::rebase(&tab.path, from, to) {
                if new_path != tab.path {
                    tab.set_path(new_path);
                    changed = true;
                }
            }
        }
        if let Some(active) = self.active.as_mut() {
            if let Some(new_path) = path::rebase(active, from, to) {
                if *active != new_path {
                    *active = new_path;
                    changed = true;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
#[path = "../../tests/unit/models/tabs.rs"]
mod tests;
