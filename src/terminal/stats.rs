use std::sync::Arc;

use chrono::{DateTime, Local};
use indexmap::IndexMap;

use crate::classify::Category;

use super::line::{OutputLine, StreamKind};

/// Aggregate counts over a retained buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub total_lines: usize,
    /// Every category in display order, zero counts included.
    pub per_category: IndexMap<Category, usize>,
    pub error_rate: f64,
    pub warning_rate: f64,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    pub first_timestamp: Option<DateTime<Local>>,
    pub last_timestamp: Option<DateTime<Local>>,
}

impl Statistics {
    pub fn from_lines(lines: &[Arc<OutputLine>]) -> Self {
        let mut per_category = Category::ALL
            .into_iter()
            .map(|category| (category, 0usize))
            .collect::<IndexMap<Category, usize>>();
        let mut stdout_lines = 0;
        let mut stderr_lines = 0;
        for line in lines {
            *per_category.entry(line.category).or_insert(0) += 1;
            match line.stream {
                StreamKind::Stdout => stdout_lines += 1,
                StreamKind::Stderr => stderr_lines += 1,
            }
        }

        let total_lines = lines.len();
        let rate = |category: Category| {
            if total_lines == 0 {
                0.0
            } else {
                per_category.get(&category).copied().unwrap_or(0) as f64 / total_lines as f64
            }
        };
        let error_rate = rate(Category::Error);
        let warning_rate = rate(Category::Warning);

        Self {
            total_lines,
            error_rate,
            warning_rate,
            stdout_lines,
            stderr_lines,
            first_timestamp: lines.iter().map(|line| line.timestamp).min(),
            last_timestamp: lines.iter().map(|line| line.timestamp).max(),
            per_category,
        }
    }

    pub fn count(&self, category: Category) -> usize {
        self.per_category.get(&category).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Statistics;
    use crate::classify::Category;
    use crate::terminal::line::{OutputLine, StreamKind};

    fn lines(samples: &[(StreamKind, &str)]) -> Vec<Arc<OutputLine>> {
        samples
            .iter()
            .map(|(stream, text)| Arc::new(OutputLine::capture(*stream, (*text).to_owned())))
            .collect()
    }

    #[test]
    fn empty_buffer_has_zero_rates() {
        let stats = Statistics::from_lines(&[]);
        assert_eq!(stats.total_lines, 0);
        assert_eq!(stats.error_rate, 0.0);
        assert_eq!(stats.warning_rate, 0.0);
        assert_eq!(stats.per_category.len(), Category::ALL.len());
        assert!(stats.first_timestamp.is_none());
    }

    #[test]
    fn counts_categories_streams_and_rates() {
        let stats = Statistics::from_lines(&lines(&[
            (StreamKind::Stdout, "INFO: booting"),
            (StreamKind::Stderr, "ERROR: disk full"),
            (StreamKind::Stderr, "WARNING: slow disk"),
            (StreamKind::Stdout, "plain text"),
        ]));
        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.count(Category::Error), 1);
        assert_eq!(stats.count(Category::Warning), 1);
        assert_eq!(stats.count(Category::Info), 1);
        assert_eq!(stats.count(Category::Output), 1);
        assert_eq!(stats.count(Category::Debug), 0);
        assert_eq!(stats.error_rate, 0.25);
        assert_eq!(stats.warning_rate, 0.25);
        assert_eq!(stats.stdout_lines, 2);
        assert_eq!(stats.stderr_lines, 2);
        assert!(stats.first_timestamp <= stats.last_timestamp);
    }
}
