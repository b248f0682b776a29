//! Domain models for the autorec engine

pub mod epg;
pub mod report;
pub mod rule;

pub use epg::{Bouquet, EpgEvent, ServiceEntry, TimerEntry};
pub use report::{
    BoundedLog, Decision, DecisionAction, ReportConflict, ReportError, RunReport, RunStatus,
    RunSummary, Trigger,
};
pub use rule::SeriesRule;
