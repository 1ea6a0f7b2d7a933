#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputMode {
    Command,
    /// Typing a line for the active process's stdin.
    Insert,
    Search,
    Pattern,
}

impl InputMode {
    pub(crate) fn label(self) -> &'static str {
        match self {
            InputMode::Command => "command",
            InputMode::Insert => "insert",
            InputMode::Search => "search",
            InputMode::Pattern => "regex",
        }
    }
}

pub(crate) fn next_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (current + 1) % len
    }
}

pub(crate) fn prev_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else if current == 0 {
        len - 1
    } else {
        current - 1
    }
}

/// Scroll position of one output pane. With `follow` set the pane sticks to
/// the newest line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScrollState {
    pub(crate) offset: usize,
    pub(crate) follow: bool,
}

impl Default for ScrollState {
    fn default() -> Self {
        Self {
            offset: 0,
            follow: true,
        }
    }
}

impl ScrollState {
    pub(crate) fn resolve(&mut self, max_offset: usize) -> usize {
        if self.follow || self.offset > max_offset {
            self.offset = max_offset;
        }
        self.offset
    }

    pub(crate) fn scroll_up(&mut self, lines: usize) {
        self.follow = false;
        self.offset = self.offset.saturating_sub(lines);
    }

    pub(crate) fn scroll_down(&mut self, lines: usize, max_offset: usize) {
        self.offset = self.offset.saturating_add(lines).min(max_offset);
        self.follow = self.offset >= max_offset;
    }

    pub(crate) fn top(&mut self) {
        self.follow = false;
        self.offset = 0;
    }

    pub(crate) fn bottom(&mut self) {
        self.follow = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{next_index, prev_index, ScrollState};

    #[test]
    fn index_helpers_wrap() {
        assert_eq!(next_index(2, 3), 0);
        assert_eq!(prev_index(0, 3), 2);
        assert_eq!(next_index(0, 0), 0);
        assert_eq!(prev_index(0, 0), 0);
    }

    #[test]
    fn scrolling_up_leaves_follow_and_bottom_restores_it() {
        let mut scroll = ScrollState::default();
        assert_eq!(scroll.resolve(40), 40);
        scroll.scroll_up(10);
        assert!(!scroll.follow);
        assert_eq!(scroll.resolve(60), 30);
        scroll.scroll_down(100, 60);
        assert!(scroll.follow);
        scroll.top();
        assert_eq!(scroll.resolve(60), 0);
        scroll.bottom();
        assert_eq!(scroll.resolve(60), 60);
    }
}
