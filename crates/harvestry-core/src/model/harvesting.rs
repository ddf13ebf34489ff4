use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{HarvestingId, RetrievalId};

/// The lifecycle state of one harvesting run.
///
/// `Pending → Running → {Completed, Failed}`; the last two are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestingState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl HarvestingState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for HarvestingState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown harvesting state: {other}")),
        }
    }
}

impl std::fmt::Display for HarvestingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source's run within a retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Harvesting {
    pub id: HarvestingId,
    pub retrieval_id: RetrievalId,

    /// Name of the harvester that owns this run.
    pub harvester: String,

    pub state: HarvestingState,

    /// Error detail, retained when `state == Failed`.
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Harvesting {
    #[must_use]
    pub fn new(retrieval_id: RetrievalId, harvester: impl Into<String>) -> Self {
        Self {
            id: HarvestingId::new(),
            retrieval_id,
            harvester: harvester.into(),
            state: HarvestingState::Pending,
            error: None,
            timestamp: Utc::now(),
        }
    }
}
