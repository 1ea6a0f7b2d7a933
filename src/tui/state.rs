use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::registry::InstanceKey;
use crate::terminal::OutputLine;

use super::core::{InputMode, ScrollState};

const STATUS_TTL: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Tab {
    Manager,
    Instance(InstanceKey),
}

#[derive(Debug, Clone)]
pub(super) struct StatusLine {
    pub(super) text: String,
    pub(super) is_error: bool,
    pub(super) at: Instant,
}

pub(super) struct AppState {
    pub(super) tabs: Vec<Tab>,
    pub(super) active: usize,
    pub(super) input_mode: InputMode,
    pub(super) input_line: String,
    pub(super) show_help: bool,
    pub(super) manager_selected: usize,
    pub(super) scroll: HashMap<InstanceKey, ScrollState>,
    pub(super) visible: HashMap<InstanceKey, Vec<Arc<OutputLine>>>,
    pub(super) status: Option<StatusLine>,
    pub(super) spinner_tick: usize,
    /// Output rows available in the last drawn frame.
    pub(super) viewport: usize,
}

impl AppState {
    pub(super) fn new() -> Self {
        Self {
            tabs: vec![Tab::Manager],
            active: 0,
            input_mode: InputMode::Command,
            input_line: String::new(),
            show_help: false,
            manager_selected: 0,
            scroll: HashMap::new(),
            visible: HashMap::new(),
            status: None,
            spinner_tick: 0,
            viewport: 20,
        }
    }

    pub(super) fn active_tab(&self) -> Tab {
        self.tabs.get(self.active).copied().unwrap_or(Tab::Manager)
    }

    pub(super) fn active_key(&self) -> Option<InstanceKey> {
        match self.active_tab() {
            Tab::Manager => None,
            Tab::Instance(key) => Some(key),
        }
    }

    /// Rebuilds the tab list from the registry's keys, keeping the active tab
    /// when it still exists.
    pub(super) fn sync_tabs(&mut self, keys: &[InstanceKey]) {
        let current = self.active_tab();
        self.tabs = std::iter::once(Tab::Manager)
            .chain(keys.iter().copied().map(Tab::Instance))
            .collect();
        self.active = self
            .tabs
            .iter()
            .position(|tab| *tab == current)
            .unwrap_or(0);
        self.scroll.retain(|key, _| keys.contains(key));
        self.visible.retain(|key, _| keys.contains(key));
        if self.manager_selected >= keys.len() {
            self.manager_selected = keys.len().saturating_sub(1);
        }
    }

    pub(super) fn focus(&mut self, key: InstanceKey) {
        if let Some(position) = self.tabs.iter().position(|tab| *tab == Tab::Instance(key)) {
            self.active = position;
        } else {
            self.tabs.push(Tab::Instance(key));
            self.active = self.tabs.len() - 1;
        }
    }

    pub(super) fn scroll_mut(&mut self, key: InstanceKey) -> &mut ScrollState {
        self.scroll.entry(key).or_default()
    }

    pub(super) fn max_offset(&self, key: InstanceKey) -> usize {
        self.visible
            .get(&key)
            .map_or(0, |lines| lines.len().saturating_sub(self.viewport))
    }

    pub(super) fn set_status(&mut self, text: impl Into<String>, is_error: bool) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error,
            at: Instant::now(),
        });
    }

    pub(super) fn current_status(&self, now: Instant) -> Option<&StatusLine> {
        self.status
            .as_ref()
            .filter(|status| now.saturating_duration_since(status.at) < STATUS_TTL)
    }
}
