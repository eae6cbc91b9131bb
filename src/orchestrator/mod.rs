//! Fallback orchestration as an explicit state machine.
//!
//! A plan is an ordered list of stages. Each stage runs exactly once; a
//! success ends the run, anything else moves to the next stage, and running
//! off the end of the plan is `Exhausted`.

pub mod strategies;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::extract::{ExtractError, Payload};
use crate::fetch::HttpFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Api,
    WebPage,
    WebTable,
    WebLinks,
    Sample,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Api => "api",
            SourceKind::WebPage => "web_page",
            SourceKind::WebTable => "web_table",
            SourceKind::WebLinks => "web_links",
            SourceKind::Sample => "sample",
        }
    }

    pub fn is_synthetic(self) -> bool {
        self == SourceKind::Sample
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Empty,
    Error(String),
}

/// The stage that succeeded and what it produced.
#[derive(Debug)]
pub struct ExtractionAttempt {
    pub source: SourceKind,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptSummary {
    pub source: SourceKind,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// About to run the stage at this plan position.
    Attempt(usize),
    /// The stage at this position succeeded.
    Done(usize),
    Exhausted,
}

/// The whole transition table.
pub fn transition(state: State, outcome: &Outcome, plan_len: usize) -> State {
    match (state, outcome) {
        (State::Attempt(i), Outcome::Success) => State::Done(i),
        (State::Attempt(i), Outcome::Empty | Outcome::Error(_)) if i + 1 < plan_len => {
            State::Attempt(i + 1)
        }
        (State::Attempt(_), Outcome::Empty | Outcome::Error(_)) => State::Exhausted,
        (terminal, _) => terminal,
    }
}

/// Shared resources a stage may use.
pub struct RunContext<'a> {
    pub fetcher: &'a HttpFetcher,
    pub driver: Option<&'a mut dyn PageDriver>,
    /// Where downloads are staged; final outputs land here too.
    pub out_dir: &'a Path,
}

impl<'a> RunContext<'a> {
    pub fn driver(&mut self) -> Result<&mut (dyn PageDriver + 'a), ExtractError> {
        self.driver.as_deref_mut().ok_or(ExtractError::NoDriver)
    }
}

/// One way of obtaining data. The orchestrator only sees this capability.
#[async_trait(?Send)]
pub trait Strategy {
    fn kind(&self) -> SourceKind;
    async fn attempt(&mut self, ctx: &mut RunContext<'_>) -> Result<Payload, ExtractError>;
}

#[derive(Debug)]
pub struct RunReport {
    pub attempts: Vec<AttemptSummary>,
    pub winner: Option<ExtractionAttempt>,
}

pub struct Orchestrator {
    plan: Vec<Box<dyn Strategy>>,
}

impl Orchestrator {
    pub fn new(plan: Vec<Box<dyn Strategy>>) -> Self {
        Orchestrator { plan }
    }

    pub async fn run(mut self, ctx: &mut RunContext<'_>) -> RunReport {
        let plan_len = self.plan.len();
        let mut attempts = Vec::with_capacity(plan_len);
        let mut winner = None;
        let mut state = if plan_len == 0 {
            State::Exhausted
        } else {
            State::Attempt(0)
        };

        while let State::Attempt(i) = state {
            let strategy = &mut self.plan[i];
            let source = strategy.kind();
            info!("Stage {}/{}: {}", i + 1, plan_len, source);

            let (outcome, payload) = match strategy.attempt(ctx).await {
                Ok(payload) if payload.is_empty() => {
                    info!("{} produced nothing", source);
                    (Outcome::Empty, None)
                }
                Ok(payload) => {
                    info!("{} succeeded with {} item(s)", source, payload.len());
                    (Outcome::Success, Some(payload))
                }
                Err(e) => {
                    warn!("{} failed: {}", source, e);
                    (Outcome::Error(e.to_string()), None)
                }
            };

            state = transition(state, &outcome, plan_len);
            attempts.push(AttemptSummary { source, outcome });
            if let (State::Done(_), Some(payload)) = (state, payload) {
                winner = Some(ExtractionAttempt { source, payload });
            }
        }

        if state == State::Exhausted {
            warn!("Every stage failed ({} attempted)", attempts.len());
        }
        RunReport { attempts, winner }
    }
}

// ── Tests ──
