//! Execution Report: what a transaction did to its template
use crate::template::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Data and position transforms ran in a single traversal
    Fused,
    /// Distinct data was transformed first, positions in a second traversal
    TwoPass,
    /// No operator could change the template; the source was returned as is
    Reused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub trace_id: String,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub strategy: Strategy,
    pub operators: usize,
    pub input_size: usize,
    pub output_size: usize,
    /// Positions yielded by `create_pos`, duplicates included
    pub positions_created: usize,
    pub data_created: usize,
    pub data_kept: usize,
    /// Distinct data values present after creation
    pub distinct_data: usize,
    /// Distinct data values whose transform chain returned `Remove`
    pub data_removed: usize,
    /// Positions dropped by data or position removal
    pub positions_removed: usize,
    pub positions_moved: usize,
    /// Positions overwritten because another position moved onto them
    pub collisions: usize,
}

impl ExecutionReport {
    pub(crate) fn start(trace_id: &str, label: &str, operators: usize) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            label: label.to_string(),
            started_at: Utc::now(),
            latency_ms: 0,
            strategy: Strategy::Fused,
            operators,
            input_size: 0,
            output_size: 0,
            positions_created: 0,
            data_created: 0,
            data_kept: 0,
            distinct_data: 0,
            data_removed: 0,
            positions_removed: 0,
            positions_moved: 0,
            collisions: 0,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Template produced by an execution together with its report.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome<P, D> {
    pub template: Template<P, D>,
    pub report: ExecutionReport,
}
