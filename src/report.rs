//! Per-step outcome collection.
//!
//! Fatal failures abort a command through `Err`. Everything non-essential
//! (enable-on-boot, optional extensions, default-site cleanup, stub revert
//! during cleanup, deploying after the registry changed) is recorded here as
//! an advisory and reported together at the end.

use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Skipped(String),
    Advisory(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub outcome: Outcome,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Done => write!(f, "ok       {}", self.name),
            Outcome::Skipped(why) => write!(f, "skipped  {} ({})", self.name, why),
            Outcome::Advisory(why) => write!(f, "warning  {}: {}", self.name, why),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    steps: Vec<Step>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn done(&mut self, name: impl Into<String>) {
        self.push(name, Outcome::Done);
    }

    pub fn skipped(&mut self, name: impl Into<String>, why: impl Into<String>) {
        self.push(name, Outcome::Skipped(why.into()));
    }

    pub fn advisory(&mut self, name: impl Into<String>, why: impl Into<String>) {
        let name = name.into();
        let why = why.into();
        warn!(step = %name, "{why}");
        self.push(name, Outcome::Advisory(why));
    }

    /// Record a best-effort step: `Ok` as done, `Err` as an advisory.
    /// Returns whether the step succeeded.
    pub fn advise<T>(&mut self, name: impl Into<String>, result: anyhow::Result<T>) -> bool {
        match result {
            Ok(_) => {
                self.done(name);
                true
            }
            Err(e) => {
                self.advisory(name, format!("{e:#}"));
                false
            }
        }
    }

    /// Like [`advise`](Self::advise) for a step that produces its own report:
    /// `Ok` contributes its steps, `Err` becomes one advisory.
    pub fn absorb(&mut self, name: impl Into<String>, result: anyhow::Result<Report>) {
        match result {
            Ok(report) => self.extend(report),
            Err(e) => self.advisory(name, format!("{e:#}")),
        }
    }

    pub fn extend(&mut self, other: Report) {
        self.steps.extend(other.steps);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn advisories(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Advisory(_)))
    }

    pub fn has_advisories(&self) -> bool {
        self.advisories().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn push(&mut self, name: impl Into<String>, outcome: Outcome) {
        self.steps.push(Step {
            name: name.into(),
            outcome,
        });
    }
}
