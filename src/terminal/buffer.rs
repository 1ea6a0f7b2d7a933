use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};

use crate::classify::Category;

use super::line::OutputLine;

#[derive(Debug, Clone)]
pub struct BufferedLine {
    pub seq: u64,
    /// Captured before the first render of the current attach; shown regardless of filters.
    pub initial: bool,
    pub line: Arc<OutputLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationPhase {
    Initial,
    Steady,
}

/// Bounded FIFO of captured lines. Pushing never blocks and never drops the
/// newest line; once full, the oldest entries are evicted.
#[derive(Debug)]
pub struct TerminalBuffer {
    lines: VecDeque<BufferedLine>,
    capacity: usize,
    next_seq: u64,
    view_floor: u64,
    phase: PopulationPhase,
    phase_lines: usize,
    generation: u64,
    evicted: u64,
}

impl TerminalBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            next_seq: 0,
            view_floor: 0,
            phase: PopulationPhase::Initial,
            phase_lines: 0,
            generation: 0,
            evicted: 0,
        }
    }

    pub fn push(&mut self, line: OutputLine) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.lines.push_back(BufferedLine {
            seq,
            initial: self.phase == PopulationPhase::Initial,
            line: Arc::new(line),
        });
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
            self.evicted += 1;
        }
        self.phase_lines += 1;
        self.generation = self.generation.wrapping_add(1);
        seq
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> PopulationPhase {
        self.phase
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferedLine> {
        self.lines.iter()
    }

    /// Every retained line, independent of filters and of `clear_view`.
    pub fn snapshot(&self) -> Vec<Arc<OutputLine>> {
        self.lines.iter().map(|entry| entry.line.clone()).collect()
    }

    /// Starts a new population phase; called whenever a fresh process is attached.
    pub fn begin_population(&mut self) {
        self.phase = PopulationPhase::Initial;
        self.phase_lines = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Computes the visible subset without advancing the population phase.
    pub fn visible(&self, filter: &LineFilter) -> Vec<Arc<OutputLine>> {
        self.lines
            .iter()
            .filter(|entry| entry.seq >= self.view_floor)
            .filter(|entry| entry.initial || filter.matches(&entry.line))
            .map(|entry| entry.line.clone())
            .collect()
    }

    /// Computes the visible subset for display. The first render that sees at
    /// least one line of the current attach ends the initial population phase.
    pub fn render(&mut self, filter: &LineFilter) -> Vec<Arc<OutputLine>> {
        let visible = self.visible(filter);
        if self.phase == PopulationPhase::Initial && self.phase_lines > 0 {
            self.phase = PopulationPhase::Steady;
        }
        visible
    }

    /// Lines matching `filter` across the whole retained buffer.
    pub fn matching(&self, filter: &LineFilter) -> Vec<Arc<OutputLine>> {
        self.lines
            .iter()
            .filter(|entry| filter.matches(&entry.line))
            .map(|entry| entry.line.clone())
            .collect()
    }

    /// Retained lines with a sequence number of at least `seq`, oldest first.
    pub fn since(&self, seq: u64) -> Vec<BufferedLine> {
        let skip = self.lines.partition_point(|entry| entry.seq < seq);
        self.lines.range(skip..).cloned().collect()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Hides everything captured so far from the display; export still sees it.
    pub fn clear_view(&mut self) {
        self.view_floor = self.next_seq;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Sequence numbers of visible lines containing `needle`, case-insensitive.
    pub fn search(&self, needle: &str) -> Vec<u64> {
        if needle.is_empty() {
            return Vec::new();
        }
        let needle = needle.to_lowercase();
        self.lines
            .iter()
            .filter(|entry| entry.seq >= self.view_floor)
            .filter(|entry| entry.line.raw_text.to_lowercase().contains(&needle))
            .map(|entry| entry.seq)
            .collect()
    }
}

/// User-editable filter settings for one terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub search_text: String,
    pub custom_pattern: Option<String>,
    pub errors_only: bool,
    pub warnings_only: bool,
}

impl FilterState {
    pub fn is_empty(&self) -> bool {
        self.search_text.is_empty()
            && self.custom_pattern.as_deref().is_none_or(str::is_empty)
            && !self.errors_only
            && !self.warnings_only
    }

    pub fn compile(&self) -> LineFilter {
        let search = if self.search_text.is_empty() {
            None
        } else {
            Some(self.search_text.to_lowercase())
        };
        let pattern = match self.custom_pattern.as_deref() {
            None | Some("") => PatternFilter::Off,
            Some(raw) => match RegexBuilder::new(raw).build() {
                Ok(regex) => PatternFilter::Valid(regex),
                Err(error) => PatternFilter::Invalid(error.to_string()),
            },
        };
        LineFilter {
            search,
            pattern,
            errors_only: self.errors_only,
            warnings_only: self.warnings_only,
        }
    }
}

#[derive(Debug, Clone)]
enum PatternFilter {
    Off,
    Valid(Regex),
    Invalid(String),
}

/// Compiled form of [`FilterState`]; all active predicates combine with AND.
#[derive(Debug, Clone)]
pub struct LineFilter {
    search: Option<String>,
    pattern: PatternFilter,
    errors_only: bool,
    warnings_only: bool,
}

impl Default for LineFilter {
    fn default() -> Self {
        FilterState::default().compile()
    }
}

impl LineFilter {
    pub fn matches(&self, line: &OutputLine) -> bool {
        if self.errors_only && line.category != Category::Error {
            return false;
        }
        if self.warnings_only && line.category != Category::Warning {
            return false;
        }
        if let Some(needle) = &self.search {
            if !line.raw_text.to_lowercase().contains(needle) {
                return false;
            }
        }
        match &self.pattern {
            PatternFilter::Off => true,
            PatternFilter::Valid(regex) => regex.is_match(&line.raw_text),
            PatternFilter::Invalid(_) => false,
        }
    }

    pub fn pattern_error(&self) -> Option<&str> {
        match &self.pattern {
            PatternFilter::Invalid(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Coalesces buffer updates into redraws no more often than `interval`.
#[derive(Debug, Clone)]
pub struct RenderThrottle {
    interval: Duration,
    last_render: Option<Instant>,
    rendered_generation: Option<u64>,
}

impl RenderThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_render: None,
            rendered_generation: None,
        }
    }

    pub fn should_render(&self, now: Instant, generation: u64) -> bool {
        if self.rendered_generation == Some(generation) {
            return false;
        }
        match self.last_render {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn record(&mut self, now: Instant, generation: u64) {
        self.last_render = Some(now);
        self.rendered_generation = Some(generation);
    }

    /// Forces the next `should_render` to succeed, e.g. after a filter change.
    pub fn invalidate(&mut self) {
        self.last_render = None;
        self.rendered_generation = None;
    }
}

#[cfg(test)]
#[path = "../tests/buffer_tests.rs"]
mod tests;
