use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};

use crate::registry::{InstanceKey, InstanceRegistry};
use crate::terminal::text::{format_bytes, format_elapsed};
use crate::terminal::{InstanceSummary, ProcessState, ResourceUsage, TerminalController};
use crate::ui::TableSpec;

/// CPU and resident memory per process tree. CPU figures need two refreshes
/// to be meaningful, so one sampler lives as long as the view polling it.
pub struct ResourceSampler {
    system: System,
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Usage of each root pid summed over its descendants. Pids that no
    /// longer exist are absent from the result.
    pub fn sample(&mut self, roots: &[u32]) -> HashMap<u32, ResourceUsage> {
        if roots.is_empty() {
            return HashMap::new();
        }
        self.system.refresh_processes();

        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, process) in self.system.processes() {
            if let Some(parent) = process.parent() {
                children.entry(parent).or_default().push(*pid);
            }
        }

        let mut usage = HashMap::new();
        for root in roots {
            let root_pid = Pid::from_u32(*root);
            if self.system.process(root_pid).is_none() {
                continue;
            }
            let mut total = ResourceUsage {
                cpu_percent: 0.0,
                memory_bytes: 0,
            };
            let mut pending = vec![root_pid];
            while let Some(pid) = pending.pop() {
                if let Some(process) = self.system.process(pid) {
                    total.cpu_percent += process.cpu_usage();
                    total.memory_bytes += process.memory();
                }
                if let Some(kids) = children.get(&pid) {
                    pending.extend(kids.iter().copied());
                }
            }
            usage.insert(*root, total);
        }
        usage
    }
}

/// Periodic status table over the registry. Holds nothing but the poll timer,
/// the last snapshot and the sampler.
pub struct InstanceManagerView {
    interval: Duration,
    last_poll: Option<Instant>,
    rows: Vec<InstanceSummary>,
    sampler: ResourceSampler,
}

impl InstanceManagerView {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: None,
            rows: Vec::new(),
            sampler: ResourceSampler::new(),
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.last_poll
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Polls when the interval has elapsed; returns whether it did.
    pub fn poll_if_due(&mut self, registry: &InstanceRegistry, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.poll(registry, now);
        true
    }

    pub fn poll(&mut self, registry: &InstanceRegistry, now: Instant) {
        let mut rows = registry.list();
        let pids = rows.iter().filter_map(|row| row.pid).collect::<Vec<u32>>();
        let usage = self.sampler.sample(&pids);
        for row in &mut rows {
            let sampled = row.pid.and_then(|pid| usage.get(&pid).copied());
            if let Some(controller) = registry.controller(InstanceKey::new(row.tool, row.index)) {
                controller.record_usage(sampled);
            }
            row.usage = sampled;
        }
        self.rows = rows;
        self.last_poll = Some(now);
    }

    pub fn rows(&self) -> &[InstanceSummary] {
        &self.rows
    }

    /// Resolves a table row to its controller; `None` if the row is out of range
    /// or the instance was removed since the last poll.
    pub fn select(
        &self,
        registry: &InstanceRegistry,
        row: usize,
    ) -> Option<Arc<TerminalController>> {
        let summary = self.rows.get(row)?;
        registry.controller(InstanceKey::new(summary.tool, summary.index))
    }

    pub fn table(&self) -> TableSpec {
        TableSpec::with_headers(
            &["Type", "Index", "Status", "PID", "Uptime", "CPU%", "Memory"],
            self.rows.iter().map(row_cells).collect(),
        )
    }
}

pub fn status_label(summary: &InstanceSummary) -> String {
    match (summary.state, &summary.last_exit) {
        (ProcessState::Stopped, Some(exit)) if exit.crashed => format!("crashed ({})", exit.diagnostic),
        (state, _) => state.as_str().to_owned(),
    }
}

pub fn row_cells(summary: &InstanceSummary) -> Vec<String> {
    let dash = || "-".to_owned();
    vec![
        summary.tool.label().to_owned(),
        summary.index.to_string(),
        status_label(summary),
        summary.pid.map(|pid| pid.to_string()).unwrap_or_else(dash),
        summary.uptime.map(format_elapsed).unwrap_or_else(dash),
        summary
            .usage
            .map(|usage| format!("{:.1}", usage.cpu_percent))
            .unwrap_or_else(dash),
        summary
            .usage
            .map(|usage| format_bytes(usage.memory_bytes))
            .unwrap_or_else(dash),
    ]
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use chrono::Local;

    use super::{row_cells, InstanceManagerView, ResourceSampler};
    use crate::config::TerminalSettings;
    use crate::registry::InstanceRegistry;
    use crate::terminal::{ExitRecord, InstanceSummary, ProcessState, ResourceUsage};
    use crate::tool::ToolKind;

    fn summary() -> InstanceSummary {
        InstanceSummary {
            tool: ToolKind::LocalLlm,
            index: 2,
            state: ProcessState::Running,
            pid: Some(4242),
            started_at: Some(Local::now()),
            uptime: Some(Duration::from_secs(75)),
            usage: Some(ResourceUsage {
                cpu_percent: 12.34,
                memory_bytes: 3 * 1024 * 1024,
            }),
            line_count: 10,
            restarts: 0,
            last_exit: None,
        }
    }

    #[test]
    fn running_row_shows_every_column() {
        let cells = row_cells(&summary());
        assert_eq!(cells[0], "Local LLM");
        assert_eq!(cells[1], "2");
        assert_eq!(cells[2], "running");
        assert_eq!(cells[3], "4242");
        assert_eq!(cells[5], "12.3");
        assert_eq!(cells.len(), 7);
    }

    #[test]
    fn crashed_row_reports_diagnostic_and_dashes() {
        let mut row = summary();
        row.state = ProcessState::Stopped;
        row.pid = None;
        row.uptime = None;
        row.usage = None;
        row.last_exit = Some(ExitRecord {
            diagnostic: "exit=3".to_owned(),
            at: Local::now(),
            requested: false,
            crashed: true,
        });
        let cells = row_cells(&row);
        assert_eq!(cells[2], "crashed (exit=3)");
        assert_eq!(&cells[3..], ["-", "-", "-", "-"]);
    }

    #[test]
    fn view_polls_on_interval_and_selects_rows() {
        let registry = InstanceRegistry::new(TerminalSettings::default());
        let key = registry.create(ToolKind::Companion);
        let mut view = InstanceManagerView::new(Duration::from_secs(5));
        let start = Instant::now();

        assert!(view.poll_if_due(&registry, start));
        assert_eq!(view.rows().len(), 1);
        assert!(!view.poll_if_due(&registry, start + Duration::from_secs(1)));

        registry.create(ToolKind::Companion);
        assert_eq!(view.rows().len(), 1);
        assert!(view.poll_if_due(&registry, start + Duration::from_secs(5)));
        assert_eq!(view.table().rows.len(), 2);

        let selected = view.select(&registry, 0).expect("first row");
        assert_eq!((selected.tool(), selected.index()), (key.tool, key.index));
        assert!(view.select(&registry, 9).is_none());
    }

    #[test]
    fn sampler_skips_unknown_pids() {
        let mut sampler = ResourceSampler::new();
        assert!(sampler.sample(&[]).is_empty());
        assert!(sampler.sample(&[u32::MAX - 7]).is_empty());
    }
}
