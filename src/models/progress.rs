use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProgressStage {
    Search,
    Website,
    Listings,
    Competitors,
    Report,
    Complete,
    Failed,
}

/// Advisory progress update for one scan session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub percent: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(stage: ProgressStage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.min(100),
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ProgressStage::Failed, 100, message)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, ProgressStage::Complete | ProgressStage::Failed)
    }
}
