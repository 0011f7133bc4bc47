//! Per-job processing log entries, one per lifecycle transition.

use crate::{JobKind, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStep {
    Created,
    Progress,
    Completed,
    Failed,
}

/// Step-specific details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogDetails {
    Created { kind: JobKind },
    Progress { from: u8, to: u8 },
    Completed { questions_count: usize },
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl LogDetails {
    pub fn step(&self) -> LogStep {
        match self {
            LogDetails::Created { .. } => LogStep::Created,
            LogDetails::Progress { .. } => LogStep::Progress,
            LogDetails::Completed { .. } => LogStep::Completed,
            LogDetails::Failed { .. } => LogStep::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingLog {
    /// Position in the job's log, starting at 1.
    pub id: u64,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub step: LogStep,
    /// Job status after this step.
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub details: LogDetails,
    /// Milliseconds since the previous entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_serialize_with_type_tag() {
        let d = LogDetails::Progress { from: 10, to: 40 };
        assert_eq!(d.step(), LogStep::Progress);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["to"], 40);

        let created = serde_json::to_value(LogDetails::Created {
            kind: JobKind::Parse,
        })
        .unwrap();
        assert_eq!(created["kind"], "parse");
    }
}
