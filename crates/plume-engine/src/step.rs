//! Resilient step execution.
//!
//! Every interaction with the target site goes through one primitive: a
//! `Step` carries an ordered list of locator candidates, an action, and a
//! wait budget; the executor polls the page, tries the candidates in order,
//! and acts on the first one that resolves. The polling loop is the only
//! retry mechanism; a failed step is fatal to the calling stage.

use crate::locator::Locator;
use crate::surface::{ElementRef, Surface, SurfaceError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub const DEFAULT_BUDGET: Duration = Duration::from_secs(20);
pub const DEFAULT_POLL: Duration = Duration::from_millis(500);

/// What to do with the first candidate that resolves.
#[derive(Debug, Clone)]
pub enum StepAction {
    /// Resolve only; used to wait for a page state.
    Locate,
    /// Type text into the element.
    Type(String),
    /// Click the element.
    Click,
    /// Read an attribute off the element.
    ReadAttribute(String),
    /// Poll a page-level predicate instead of locator candidates.
    WaitFor(PagePredicate),
}

/// Page-level condition checked against the current URL.
#[derive(Debug, Clone)]
pub enum PagePredicate {
    UrlContains(String),
    UrlLeaves(String),
}

impl PagePredicate {
    fn satisfied(&self, url: &str) -> bool {
        match self {
            PagePredicate::UrlContains(fragment) => url.contains(fragment.as_str()),
            PagePredicate::UrlLeaves(fragment) => !url.contains(fragment.as_str()),
        }
    }
}

impl std::fmt::Display for PagePredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PagePredicate::UrlContains(s) => write!(f, "url contains `{}`", s),
            PagePredicate::UrlLeaves(s) => write!(f, "url leaves `{}`", s),
        }
    }
}

/// One logical automation action with its fallback strategies and budget.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: &'static str,
    pub candidates: Vec<Locator>,
    pub action: StepAction,
    pub budget: Duration,
    pub poll: Duration,
}

impl Step {
    pub fn new(name: &'static str, candidates: Vec<Locator>, action: StepAction) -> Self {
        Self {
            name,
            candidates,
            action,
            budget: DEFAULT_BUDGET,
            poll: DEFAULT_POLL,
        }
    }

    pub fn locate(name: &'static str, candidates: Vec<Locator>) -> Self {
        Self::new(name, candidates, StepAction::Locate)
    }

    pub fn type_text(name: &'static str, candidates: Vec<Locator>, text: impl Into<String>) -> Self {
        Self::new(name, candidates, StepAction::Type(text.into()))
    }

    pub fn click(name: &'static str, candidates: Vec<Locator>) -> Self {
        Self::new(name, candidates, StepAction::Click)
    }

    pub fn wait_for(name: &'static str, predicate: PagePredicate) -> Self {
        Self::new(name, Vec::new(), StepAction::WaitFor(predicate))
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
}

/// The candidate that ended up matching, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct MatchedCandidate {
    pub index: usize,
    pub locator: Locator,
}

#[derive(Debug, Clone)]
pub struct StepSuccess {
    /// `None` for page-predicate steps, which have no candidates.
    pub matched: Option<MatchedCandidate>,
    /// Attribute value for `ReadAttribute`, final URL for `WaitFor`.
    pub value: Option<String>,
    pub waited: Duration,
}

#[derive(Debug, Clone)]
pub struct StepFailure {
    pub waited: Duration,
    /// Last failure reason observed per candidate.
    pub reasons: Vec<String>,
}

impl StepFailure {
    pub fn summary(&self) -> String {
        self.reasons.join("; ")
    }
}

/// Outcome of one step execution. Immutable once produced.
#[derive(Debug, Clone)]
pub enum StepResult {
    Success(StepSuccess),
    Failure(StepFailure),
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success(_))
    }
}

/// Runs steps against a surface with bounded polling.
pub struct StepExecutor {
    /// Cap on a single resolution attempt, so one stuck candidate cannot
    /// eat the whole budget.
    pub candidate_timeout: Duration,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepExecutor {
    pub fn new() -> Self {
        Self {
            candidate_timeout: Duration::from_secs(2),
        }
    }

    pub async fn run<S: Surface + ?Sized>(&self, surface: &mut S, step: &Step) -> StepResult {
        let started = Instant::now();
        let deadline = started + step.budget;

        if let StepAction::WaitFor(predicate) = &step.action {
            return self.run_predicate(surface, step, predicate, started, deadline).await;
        }
        self.run_candidates(surface, step, started, deadline).await
    }

    async fn run_candidates<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        step: &Step,
        started: Instant,
        deadline: Instant,
    ) -> StepResult {
        if step.candidates.is_empty() {
            return StepResult::Failure(StepFailure {
                waited: started.elapsed(),
                reasons: vec!["step has no locator candidates".to_string()],
            });
        }

        let mut last_reason: Vec<Option<String>> = vec![None; step.candidates.len()];

        loop {
            for (index, locator) in step.candidates.iter().enumerate() {
                match tokio::time::timeout(self.candidate_timeout, surface.locate(locator)).await {
                    Err(_) => {
                        last_reason[index] = Some("resolution timed out".to_string());
                    }
                    Ok(Err(e)) => {
                        last_reason[index] = Some(e.to_string());
                    }
                    Ok(Ok(None)) => {
                        last_reason[index] = Some("not present or not visible".to_string());
                    }
                    Ok(Ok(Some(element))) => {
                        match Self::apply(surface, &element, &step.action).await {
                            Ok(value) => {
                                let waited = started.elapsed();
                                info!(
                                    step = step.name,
                                    candidate = %locator,
                                    elapsed_ms = waited.as_millis() as u64,
                                    "step resolved"
                                );
                                return StepResult::Success(StepSuccess {
                                    matched: Some(MatchedCandidate {
                                        index,
                                        locator: locator.clone(),
                                    }),
                                    value,
                                    waited,
                                });
                            }
                            Err(e) => {
                                warn!(step = step.name, candidate = %locator, "action failed: {}", e);
                                last_reason[index] =
                                    Some(format!("resolved but action failed: {}", e));
                            }
                        }
                    }
                }
            }

            if Instant::now() + step.poll > deadline {
                break;
            }
            tokio::time::sleep(step.poll).await;
        }

        let reasons = step
            .candidates
            .iter()
            .zip(last_reason)
            .map(|(locator, reason)| {
                format!(
                    "{}: {}",
                    locator,
                    reason.unwrap_or_else(|| "not attempted".to_string())
                )
            })
            .collect();

        StepResult::Failure(StepFailure {
            waited: started.elapsed(),
            reasons,
        })
    }

    async fn run_predicate<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        step: &Step,
        predicate: &PagePredicate,
        started: Instant,
        deadline: Instant,
    ) -> StepResult {
        let mut last_reason = format!("{} never checked", predicate);

        loop {
            match tokio::time::timeout(self.candidate_timeout, surface.current_url()).await {
                Ok(Ok(url)) if predicate.satisfied(&url) => {
                    let waited = started.elapsed();
                    info!(
                        step = step.name,
                        elapsed_ms = waited.as_millis() as u64,
                        "page predicate satisfied"
                    );
                    return StepResult::Success(StepSuccess {
                        matched: None,
                        value: Some(url),
                        waited,
                    });
                }
                Ok(Ok(url)) => {
                    last_reason = format!("{} not satisfied at {}", predicate, url);
                }
                Ok(Err(e)) => {
                    last_reason = e.to_string();
                }
                Err(_) => {
                    last_reason = "url read timed out".to_string();
                }
            }

            if Instant::now() + step.poll > deadline {
                break;
            }
            tokio::time::sleep(step.poll).await;
        }

        StepResult::Failure(StepFailure {
            waited: started.elapsed(),
            reasons: vec![last_reason],
        })
    }

    async fn apply<S: Surface + ?Sized>(
        surface: &mut S,
        element: &ElementRef,
        action: &StepAction,
    ) -> Result<Option<String>, SurfaceError> {
        match action {
            StepAction::Locate => Ok(None),
            StepAction::Type(text) => surface.fill(element, text).await.map(|_| None),
            StepAction::Click => surface.click(element).await.map(|_| None),
            StepAction::ReadAttribute(name) => surface.read_attribute(element, name).await,
            // Dispatched before apply; nothing to do on an element.
            StepAction::WaitFor(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_checks_url_fragments() {
        let p = PagePredicate::UrlLeaves("/compose/".to_string());
        assert!(!p.satisfied("https://x.com/compose/tweet"));
        assert!(p.satisfied("https://x.com/home"));

        let p = PagePredicate::UrlContains("/home".to_string());
        assert!(p.satisfied("https://x.com/home"));
    }

    #[test]
    fn failure_summary_joins_reasons() {
        let failure = StepFailure {
            waited: Duration::from_secs(1),
            reasons: vec!["a: gone".to_string(), "b: hidden".to_string()],
        };
        assert_eq!(failure.summary(), "a: gone; b: hidden");
    }
}
