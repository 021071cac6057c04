//! Pipeline run state machine
//!
//! A run walks its tiers in order:
//! SELECT_TIER → RULE_PASS → EXTERNAL_PASS → CHECKPOINT → (CONTINUE | PAUSE)
//!
//! A paused run carries a resume token; resuming or abandoning it is an
//! explicit operator decision made against that token.

use crate::checkpoint::Checkpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Persisted run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    BudgetExhausted,
    Cancelled,
    Abandoned,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Paused => "PAUSED",
            RunStatus::Completed => "COMPLETED",
            RunStatus::BudgetExhausted => "BUDGET_EXHAUSTED",
            RunStatus::Cancelled => "CANCELLED",
            RunStatus::Abandoned => "ABANDONED",
        }
    }

    /// Whether the run can make further progress
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running | RunStatus::Paused)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = pstag_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(RunStatus::Running),
            "PAUSED" => Ok(RunStatus::Paused),
            "COMPLETED" => Ok(RunStatus::Completed),
            "BUDGET_EXHAUSTED" => Ok(RunStatus::BudgetExhausted),
            "CANCELLED" => Ok(RunStatus::Cancelled),
            "ABANDONED" => Ok(RunStatus::Abandoned),
            other => Err(pstag_common::Error::InvalidInput(format!(
                "unknown run status '{}'",
                other
            ))),
        }
    }
}

/// Step inside a tier, used for logging transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    SelectTier,
    RulePass,
    ExternalPass,
    Checkpoint,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::SelectTier => "SELECT_TIER",
            Phase::RulePass => "RULE_PASS",
            Phase::ExternalPass => "EXTERNAL_PASS",
            Phase::Checkpoint => "CHECKPOINT",
            Phase::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub run_id: Uuid,
    pub old_status: RunStatus,
    pub new_status: RunStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One orchestrator run, persisted in `pipeline_runs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Tier names in processing order
    pub tiers: Vec<String>,
    /// Index into `tiers` of the tier being processed
    pub current_tier: usize,
    pub resume_token: Option<String>,
    pub spent_cost: f64,
    pub budget_ceiling: Option<f64>,
    pub target_coverage: f64,
    pub last_checkpoint: Option<Checkpoint>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(tiers: Vec<String>, budget_ceiling: Option<f64>, target_coverage: f64) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Running,
            tiers,
            current_tier: 0,
            resume_token: None,
            spent_cost: 0.0,
            budget_ceiling,
            target_coverage,
            last_checkpoint: None,
            started_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    pub fn transition_to(&mut self, new_status: RunStatus) -> StatusTransition {
        let now = Utc::now();
        let transition = StatusTransition {
            run_id: self.run_id,
            old_status: self.status,
            new_status,
            transitioned_at: now,
        };
        self.status = new_status;
        self.updated_at = now;
        if new_status.is_terminal() {
            self.ended_at = Some(now);
            self.resume_token = None;
        }
        transition
    }

    /// Pause at a checkpoint and issue a fresh resume token
    pub fn pause(&mut self, checkpoint: Checkpoint) -> String {
        let token = Uuid::new_v4().to_string();
        self.last_checkpoint = Some(checkpoint);
        self.resume_token = Some(token.clone());
        self.transition_to(RunStatus::Paused);
        token
    }

    /// Clear the resume token and continue
    pub fn resume(&mut self) -> StatusTransition {
        self.resume_token = None;
        self.transition_to(RunStatus::Running)
    }

    pub fn current_tier_name(&self) -> Option<&str> {
        self.tiers.get(self.current_tier).map(String::as_str)
    }

    /// Whether spending `estimate` more would cross the ceiling
    pub fn would_exceed_budget(&self, estimate: f64) -> bool {
        match self.budget_ceiling {
            Some(ceiling) => self.spent_cost + estimate > ceiling,
            None => false,
        }
    }

    pub fn remaining_budget(&self) -> Option<f64> {
        self.budget_ceiling
            .map(|ceiling| (ceiling - self.spent_cost).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RunStatus::Running,
            RunStatus::Paused,
            RunStatus::Completed,
            RunStatus::BudgetExhausted,
            RunStatus::Cancelled,
            RunStatus::Abandoned,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
        assert!("DONE".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_terminal_transition_clears_token() {
        let mut run = PipelineRun::new(vec!["1K-3K".into()], Some(1.0), 96.0);
        run.resume_token = Some("t".into());
        let transition = run.transition_to(RunStatus::Abandoned);
        assert_eq!(transition.old_status, RunStatus::Running);
        assert!(run.resume_token.is_none());
        assert!(run.ended_at.is_some());
    }

    #[test]
    fn test_budget_check() {
        let mut run = PipelineRun::new(vec![], Some(1.0), 96.0);
        run.spent_cost = 0.9;
        assert!(!run.would_exceed_budget(0.1));
        assert!(run.would_exceed_budget(0.2));
        assert!((run.remaining_budget().unwrap() - 0.1).abs() < 1e-9);

        let unlimited = PipelineRun::new(vec![], None, 96.0);
        assert!(!unlimited.would_exceed_budget(1e9));
    }
}
