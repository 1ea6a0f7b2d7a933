use std::collections::VecDeque;

/// Bounded, de-duplicated record of input sent to a process, with a recall cursor.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    limit: usize,
    cursor: Option<usize>,
}

impl CommandHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
            cursor: None,
        }
    }

    /// Records `command` as the most recent entry, moving an earlier duplicate.
    pub fn record(&mut self, command: &str) {
        self.cursor = None;
        if command.trim().is_empty() {
            return;
        }
        if let Some(existing) = self.entries.iter().position(|entry| entry == command) {
            self.entries.remove(existing);
        }
        self.entries.push_back(command.to_owned());
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Steps back towards older entries.
    pub fn older(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let next = match self.cursor {
            None => self.entries.len() - 1,
            Some(0) => 0,
            Some(idx) => idx - 1,
        };
        self.cursor = Some(next);
        self.entries.get(next).map(String::as_str)
    }

    /// Steps forward; returns `None` once past the newest entry.
    pub fn newer(&mut self) -> Option<&str> {
        let idx = self.cursor?;
        if idx + 1 >= self.entries.len() {
            self.cursor = None;
            return None;
        }
        self.cursor = Some(idx + 1);
        self.entries.get(idx + 1).map(String::as_str)
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::CommandHistory;

    #[test]
    fn duplicates_move_to_most_recent() {
        let mut history = CommandHistory::new(10);
        history.record("status");
        history.record("reload");
        history.record("status");
        assert_eq!(history.entries().collect::<Vec<_>>(), vec!["reload", "status"]);
    }

    #[test]
    fn history_is_bounded() {
        let mut history = CommandHistory::new(3);
        for cmd in ["a", "b", "c", "d"] {
            history.record(cmd);
        }
        assert_eq!(history.entries().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[test]
    fn blank_commands_are_not_recorded() {
        let mut history = CommandHistory::new(3);
        history.record("   ");
        assert!(history.is_empty());
    }

    #[test]
    fn recall_walks_back_and_forth() {
        let mut history = CommandHistory::new(10);
        history.record("one");
        history.record("two");
        history.record("three");
        assert_eq!(history.older(), Some("three"));
        assert_eq!(history.older(), Some("two"));
        assert_eq!(history.older(), Some("one"));
        assert_eq!(history.older(), Some("one"));
        assert_eq!(history.newer(), Some("two"));
        assert_eq!(history.newer(), Some("three"));
        assert_eq!(history.newer(), None);
        assert_eq!(history.older(), Some("three"));
    }
}
