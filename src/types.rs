//! Core plan and task types shared across the crate.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque generated task content (quiz questions or a coding assignment).
pub type TaskPayload = serde_json::Value;

/// Position of a step within one learning plan. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepNumber(u32);

impl StepNumber {
    /// Validate a raw step number as delivered on the wire.
    pub fn new(raw: i64) -> Result<Self, ApiError> {
        if raw <= 0 {
            return Err(ApiError::InvalidInput(format!(
                "step number must be positive, got {}",
                raw
            )));
        }
        u32::try_from(raw)
            .map(StepNumber)
            .map_err(|_| ApiError::InvalidInput(format!("step number out of range: {}", raw)))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for StepNumber {
    type Error = ApiError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        StepNumber::new(raw)
    }
}

impl fmt::Display for StepNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exercise type generated for a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Quiz,
    Coding,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Quiz => "quiz",
            TaskKind::Coding => "coding",
        }
    }
}

/// Supporting video attached to a step by the plan generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub duration: String,
}

/// One step of a learning plan as delivered by the plan-generation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Raw step number; validated into a [`StepNumber`] on arrival.
    pub step: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_keyword: Option<String>,
    #[serde(default)]
    pub videos: Vec<Video>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

fn default_difficulty() -> String {
    "beginner".to_string()
}

impl PlanStep {
    /// Check the fields the generator cannot work without.
    pub fn validate(&self) -> Result<StepNumber, ApiError> {
        let number = StepNumber::new(self.step)?;
        if self.title.trim().is_empty() {
            return Err(ApiError::InvalidInput(format!(
                "step {} has an empty title",
                number
            )));
        }
        Ok(number)
    }
}

/// A complete or partial learning plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningPlan {
    #[serde(default)]
    pub plan: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
