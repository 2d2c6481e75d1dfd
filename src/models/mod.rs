pub mod finding;
pub mod report;
pub mod scan;
pub mod schedule;

pub use finding::{Finding, Severity, SeverityCounts};
pub use report::Report;
pub use scan::{Scan, ScanDepth, ScanStatus};
pub use schedule::{Frequency, ScheduledScan};
