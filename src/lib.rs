pub mod aggregator;
pub mod client;
pub mod error;
pub mod models;
pub mod time_filter;

pub use client::{Credentials, DEFAULT_BASE_URL, HaloClient, HaloConfig};
pub use error::{Error, ErrorKind, Result, TruncationWarning};
pub use models::*;

// Aggregator module re-exports
pub use aggregator::{
    AggregatedIssues, AggregatorConfig, IssueAggregator, IssueSource, MAX_RECORDS_PER_STATUS,
    StatusSummary, deduplicate_issues,
};

// Time filter module re-exports
pub use time_filter::Threshold;
