pub mod report;

pub use report::{NewReport, Report, ReportPatch, ReportStatus, StatusCounts};
