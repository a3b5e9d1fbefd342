//! Execution status domain types
//!
//! A calcjob moves through
//! `created → uploading → submitting → running → retrieving → finalised`.
//! Steps are never revisited. A failure captured at any non-terminal step
//! records its description and jumps straight to `finalised`, so `finalised`
//! alone does not mean success: the failure field decides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{CoreError, ParseEnumError, Result};
use crate::ids::{CalcJobId, ProcessingId};

/// Lifecycle step of a calcjob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Identifier generated, no remote footprint yet
    #[default]
    Created,
    /// Staging the upload manifests into the remote folder
    Uploading,
    /// Asking the remote scheduler to accept the rendered script
    Submitting,
    /// Job identifier recorded, waiting for the remote job to finish
    Running,
    /// Fetching files matching the download globs
    Retrieving,
    Finalised,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Created,
        Step::Uploading,
        Step::Submitting,
        Step::Running,
        Step::Retrieving,
        Step::Finalised,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Created => "created",
            Step::Uploading => "uploading",
            Step::Submitting => "submitting",
            Step::Running => "running",
            Step::Retrieving => "retrieving",
            Step::Finalised => "finalised",
        }
    }

    /// The step following this one on the success path
    pub fn next(self) -> Option<Step> {
        match self {
            Step::Created => Some(Step::Uploading),
            Step::Uploading => Some(Step::Submitting),
            Step::Submitting => Some(Step::Running),
            Step::Running => Some(Step::Retrieving),
            Step::Retrieving => Some(Step::Finalised),
            Step::Finalised => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Step::Finalised
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "step",
                value: s.to_string(),
            })
    }
}

/// A requested change of an execution status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// Move to the immediate successor; `running` is entered only via `Submitted`
    Advance { to: Step },
    /// Record the remote job identifier and move `submitting → running`
    Submitted { job_id: String },
    /// Record a failure and finalise
    Fail { failure: String },
}

impl Transition {
    pub fn advance(to: Step) -> Self {
        Transition::Advance { to }
    }

    pub fn submitted(job_id: impl Into<String>) -> Self {
        Transition::Submitted {
            job_id: job_id.into(),
        }
    }

    pub fn fail(failure: impl Into<String>) -> Self {
        Transition::Fail {
            failure: failure.into(),
        }
    }

    /// Step the status lands in when the transition applies
    pub fn target(&self) -> Step {
        match self {
            Transition::Advance { to } => *to,
            Transition::Submitted { .. } => Step::Running,
            Transition::Fail { .. } => Step::Finalised,
        }
    }
}

/// The single lifecycle record of a calcjob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Processing {
    pub id: ProcessingId,
    pub calcjob_id: CalcJobId,
    pub step: Step,
    /// Remote scheduler job identifier, absent until submission succeeds
    pub job_id: Option<String>,
    /// Human-readable failure description, absent unless a failure occurred
    pub failure: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// How a status reads to a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    InProgress,
    Succeeded,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::InProgress => "in_progress",
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
        }
    }
}

/// Number of calcjobs per outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub in_progress: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl OutcomeCounts {
    pub fn add(&mut self, outcome: Outcome, count: u64) {
        match outcome {
            Outcome::InProgress => self.in_progress += count,
            Outcome::Succeeded => self.succeeded += count,
            Outcome::Failed => self.failed += count,
        }
    }

    pub fn total(&self) -> u64 {
        self.in_progress + self.succeeded + self.failed
    }
}

impl Processing {
    /// Fresh status for a newly created calcjob
    pub fn created(id: ProcessingId, calcjob_id: CalcJobId) -> Self {
        Self {
            id,
            calcjob_id,
            step: Step::Created,
            job_id: None,
            failure: None,
            updated_at: Utc::now(),
        }
    }

    /// Applies a transition, returning the next snapshot
    ///
    /// This is the only place step legality is decided. `self` is left
    /// untouched, so a rejected transition leaves no trace.
    ///
    /// # Returns
    /// `InvalidTransition` when the move skips or reverses the step order,
    /// enters `running` without a job id, or starts from `finalised`
    pub fn apply(&self, transition: &Transition) -> Result<Processing> {
        let from = self.step;
        let to = transition.target();

        let legal = !from.is_terminal()
            && match transition {
                Transition::Advance { to } => *to != Step::Running && from.next() == Some(*to),
                Transition::Submitted { .. } => from == Step::Submitting,
                Transition::Fail { .. } => true,
            };

        if !legal {
            return Err(CoreError::InvalidTransition { from, to });
        }

        let mut next = self.clone();
        next.step = to;
        next.updated_at = Utc::now();
        match transition {
            Transition::Submitted { job_id } => next.job_id = Some(job_id.clone()),
            Transition::Fail { failure } => next.failure = Some(failure.clone()),
            Transition::Advance { .. } => {}
        }

        Ok(next)
    }

    pub fn outcome(&self) -> Outcome {
        match (self.step, &self.failure) {
            (Step::Finalised, None) => Outcome::Succeeded,
            (Step::Finalised, Some(_)) => Outcome::Failed,
            _ => Outcome::InProgress,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.step.is_terminal()
    }
}

impl PartialEq for Processing {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Processing {}

impl Hash for Processing {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_at(step: Step) -> Processing {
        let mut status = Processing::created(ProcessingId(1), CalcJobId(1));
        status.step = step;
        if step >= Step::Running {
            status.job_id = Some("42".to_string());
        }
        status
    }

    #[test]
    fn test_success_path() {
        let mut status = Processing::created(ProcessingId(1), CalcJobId(1));
        status = status.apply(&Transition::advance(Step::Uploading)).unwrap();
        status = status.apply(&Transition::advance(Step::Submitting)).unwrap();
        status = status.apply(&Transition::submitted("1234")).unwrap();
        assert_eq!(status.step, Step::Running);
        assert_eq!(status.job_id.as_deref(), Some("1234"));
        status = status.apply(&Transition::advance(Step::Retrieving)).unwrap();
        status = status.apply(&Transition::advance(Step::Finalised)).unwrap();
        assert_eq!(status.outcome(), Outcome::Succeeded);
        assert!(status.is_finished());
    }

    #[test]
    fn test_only_successor_advances() {
        for from in Step::ALL {
            for to in Step::ALL {
                let result = status_at(from).apply(&Transition::advance(to));
                let expected = from.next() == Some(to) && to != Step::Running;
                assert_eq!(result.is_ok(), expected, "{from} -> {to}");
                if let Err(err) = result {
                    assert!(matches!(
                        err,
                        CoreError::InvalidTransition { from: f, to: t } if f == from && t == to
                    ));
                }
            }
        }
    }

    #[test]
    fn test_running_requires_job_id() {
        let err = status_at(Step::Submitting)
            .apply(&Transition::advance(Step::Running))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));

        for from in [Step::Created, Step::Uploading, Step::Running, Step::Finalised] {
            assert!(status_at(from).apply(&Transition::submitted("1")).is_err());
        }
    }

    #[test]
    fn test_failure_from_any_non_terminal_step() {
        for from in Step::ALL.into_iter().filter(|s| !s.is_terminal()) {
            let status = status_at(from);
            let failed = status.apply(&Transition::fail("boom")).unwrap();
            assert_eq!(failed.step, Step::Finalised);
            assert_eq!(failed.failure.as_deref(), Some("boom"));
            assert_eq!(failed.job_id, status.job_id);
            assert_eq!(failed.outcome(), Outcome::Failed);
        }
    }

    #[test]
    fn test_finalised_is_terminal() {
        let status = status_at(Step::Finalised);
        assert!(status.apply(&Transition::fail("late")).is_err());
        assert!(status.apply(&Transition::advance(Step::Created)).is_err());
    }

    #[test]
    fn test_submission_failure_keeps_job_id_absent() {
        let status = status_at(Step::Submitting);
        let failed = status.apply(&Transition::fail("submit rejected")).unwrap();
        assert_eq!(failed.step, Step::Finalised);
        assert!(failed.job_id.is_none());
    }

    #[test]
    fn test_rejected_transition_leaves_status_untouched() {
        let status = status_at(Step::Uploading);
        let before = status.updated_at;
        assert!(status.apply(&Transition::advance(Step::Retrieving)).is_err());
        assert_eq!(status.step, Step::Uploading);
        assert_eq!(status.updated_at, before);
    }

    #[test]
    fn test_outcome_in_progress() {
        for step in Step::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert_eq!(status_at(step).outcome(), Outcome::InProgress);
        }
    }

    #[test]
    fn test_step_string_roundtrip() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
        assert!("done".parse::<Step>().is_err());
    }

    #[test]
    fn test_outcome_counts() {
        let mut counts = OutcomeCounts::default();
        counts.add(Outcome::Failed, 2);
        counts.add(Outcome::Succeeded, 1);
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.total(), 3);
    }
}
