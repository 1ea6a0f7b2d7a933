//! Per-instance output capture: stream readers feeding a bounded buffer,
//! filtering, export and the controller that ties them to one child process.

pub mod buffer;
pub mod controller;
pub mod export;
pub mod history;
pub mod line;
pub mod reader;
pub mod stats;
pub mod text;

pub use buffer::{BufferedLine, FilterState, LineFilter, PopulationPhase, RenderThrottle, TerminalBuffer};
pub use controller::{
    ControllerError, ExitRecord, InstanceSummary, ProcessState, ResourceUsage, StopOutcome,
    TerminalController,
};
pub use export::{ExportError, ExportFormat, ExportScope};
pub use line::{OutputLine, StreamKind};
pub use stats::Statistics;
