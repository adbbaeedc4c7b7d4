pub mod commands;
pub mod images;
pub mod submission;

pub use images::ImageStore;
pub use submission::{submit_report, CheckedDraft, ReportDraft};
