//! The orchestration flow: strictly sequential stages from configuration
//! validation through post submission, one browser session for the whole
//! run, unconditional cleanup at the end.
//!
//! Any stage failure short-circuits to the failure notification and then
//! cleanup; no stage is retried beyond the executor's own polling.

pub mod steps;

use crate::config::{ConfigError, ConfigMap, PostRequest, RunConfig};
use crate::creds::{self, CredentialError, SheetFetch};
use crate::media::{self, FetchError, MediaFetch};
use crate::notify::Notify;
use crate::step::{MatchedCandidate, Step, StepExecutor, StepFailure, StepResult, StepSuccess};
use crate::surface::{Surface, SurfaceError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// States of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidateConfig,
    ResolveCredentials,
    FetchImage,
    OpenSession,
    NavigateLogin,
    EnterIdentifier,
    AdvancePastIdentifier,
    EnterPassword,
    Submit,
    NavigateCompose,
    EnterBody,
    AttachImage,
    SubmitPost,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ValidateConfig => "validate config",
            Stage::ResolveCredentials => "resolve credentials",
            Stage::FetchImage => "fetch image",
            Stage::OpenSession => "open session",
            Stage::NavigateLogin => "navigate to login",
            Stage::EnterIdentifier => "enter identifier",
            Stage::AdvancePastIdentifier => "advance past identifier",
            Stage::EnterPassword => "enter password",
            Stage::Submit => "submit login",
            Stage::NavigateCompose => "navigate to compose",
            Stage::EnterBody => "enter body",
            Stage::AttachImage => "attach image",
            Stage::SubmitPost => "submit post",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no locator candidate resolved within {:?}: {}", .0.waited, .0.summary())]
    StepTimeout(StepFailure),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A run that ended at a specific stage.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct RunFailure {
    pub stage: Stage,
    pub error: FlowError,
}

/// Which candidate carried each UI stage, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct StepTrace {
    pub stage: Stage,
    pub matched: Option<MatchedCandidate>,
    pub waited: Duration,
}

#[derive(Debug)]
pub struct RunReport {
    pub body: String,
    pub trace: Vec<StepTrace>,
}

/// One post, one session, one process invocation.
pub struct PostFlow<S: Surface> {
    raw: ConfigMap,
    surface: S,
    sheet: Box<dyn SheetFetch>,
    media: Box<dyn MediaFetch>,
    notify: Box<dyn Notify>,
    executor: StepExecutor,
    session_open: bool,
    image_path: Option<PathBuf>,
    trace: Vec<StepTrace>,
}

impl<S: Surface> PostFlow<S> {
    pub fn new(
        raw: ConfigMap,
        surface: S,
        sheet: Box<dyn SheetFetch>,
        media: Box<dyn MediaFetch>,
        notify: Box<dyn Notify>,
    ) -> Self {
        Self {
            raw,
            surface,
            sheet,
            media,
            notify,
            executor: StepExecutor::new(),
            session_open: false,
            image_path: None,
            trace: Vec::new(),
        }
    }

    /// Run the flow to completion. Whatever the outcome, the session is
    /// closed and the cached image removed exactly once before returning.
    pub async fn run(mut self) -> Result<RunReport, RunFailure> {
        let outcome = self.drive().await;

        match &outcome {
            Ok(report) => {
                info!("posted: {}", preview(&report.body));
                self.notify_best_effort(&format!("posted: {}", preview(&report.body)))
                    .await;
            }
            Err(failure) => {
                warn!("{}", failure);
                let mut message = format!("post failed: {}", failure);
                if let Some(path) = self.capture_failure_screenshot().await {
                    message.push_str(&format!(" (screenshot: {})", path.display()));
                }
                self.notify_best_effort(&message).await;
            }
        }

        self.cleanup().await;
        outcome
    }

    async fn drive(&mut self) -> Result<RunReport, RunFailure> {
        let config =
            RunConfig::from_map(&self.raw).map_err(|e| fail(Stage::ValidateConfig, e))?;

        let credentials = creds::resolve(&config, self.sheet.as_ref())
            .await
            .map_err(|e| fail(Stage::ResolveCredentials, e))?;
        let request = PostRequest::new(&config, credentials);

        let fetched = self
            .media
            .fetch(&request.image)
            .await
            .map_err(|e| fail(Stage::FetchImage, e))?;
        let image_path = media::cache_path(&fetched.file_id, fetched.extension);
        std::fs::write(&image_path, &fetched.bytes)
            .map_err(|e| fail(Stage::FetchImage, FlowError::Io(e)))?;
        info!("image cached at {}", image_path.display());
        self.image_path = Some(image_path.clone());

        self.surface
            .open()
            .await
            .map_err(|e| fail(Stage::OpenSession, e))?;
        self.session_open = true;

        self.surface
            .navigate(&config.login_url)
            .await
            .map_err(|e| fail(Stage::NavigateLogin, e))?;
        self.run_step(Stage::NavigateLogin, steps::login_form(&config))
            .await?;
        self.notify_best_effort("opened the login page").await;

        self.run_step(
            Stage::EnterIdentifier,
            steps::enter_identifier(&config, &request.credentials.email),
        )
        .await?;
        self.run_step(
            Stage::AdvancePastIdentifier,
            steps::advance_past_identifier(&config),
        )
        .await?;

        // The site sometimes interposes a handle-confirmation screen here.
        // Probe briefly; absence is the common case, not a failure.
        if let Some(handle) = request.credentials.username.clone() {
            let probe = steps::handle_confirmation_probe(&config);
            if self
                .executor
                .run(&mut self.surface, &probe)
                .await
                .is_success()
            {
                info!("handle confirmation screen detected");
                self.run_step(
                    Stage::AdvancePastIdentifier,
                    steps::enter_handle(&config, &handle),
                )
                .await?;
                self.run_step(
                    Stage::AdvancePastIdentifier,
                    steps::advance_past_identifier(&config),
                )
                .await?;
            }
        }

        self.run_step(
            Stage::EnterPassword,
            steps::enter_password(&config, &request.credentials.password),
        )
        .await?;
        self.run_step(Stage::Submit, steps::submit_login(&config))
            .await?;
        self.notify_best_effort("login submitted").await;

        self.surface
            .navigate(&config.compose_url)
            .await
            .map_err(|e| fail(Stage::NavigateCompose, e))?;
        self.run_step(Stage::NavigateCompose, steps::compose_area(&config))
            .await?;
        self.notify_best_effort("opened the compose page").await;

        self.run_step(Stage::EnterBody, steps::enter_body(&config, &request.body))
            .await?;

        let attach_path = self
            .image_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.run_step(Stage::AttachImage, steps::attach_image(&config, &attach_path))
            .await?;

        self.run_step(Stage::SubmitPost, steps::submit_post(&config))
            .await?;
        self.run_step(Stage::SubmitPost, steps::confirm_posted(&config))
            .await?;

        Ok(RunReport {
            body: request.body,
            trace: std::mem::take(&mut self.trace),
        })
    }

    async fn run_step(&mut self, stage: Stage, step: Step) -> Result<StepSuccess, RunFailure> {
        match self.executor.run(&mut self.surface, &step).await {
            StepResult::Success(success) => {
                self.trace.push(StepTrace {
                    stage,
                    matched: success.matched.clone(),
                    waited: success.waited,
                });
                Ok(success)
            }
            StepResult::Failure(failure) => Err(RunFailure {
                stage,
                error: FlowError::StepTimeout(failure),
            }),
        }
    }

    async fn notify_best_effort(&self, message: &str) {
        if let Err(e) = self.notify.send(message).await {
            warn!("notification delivery failed: {}", e);
        }
    }

    async fn capture_failure_screenshot(&mut self) -> Option<PathBuf> {
        if !self.session_open {
            return None;
        }
        match self.surface.screenshot().await {
            Ok(bytes) => {
                let path = std::env::temp_dir()
                    .join(format!("plume-failure-{}.png", std::process::id()));
                match std::fs::write(&path, &bytes) {
                    Ok(()) => Some(path),
                    Err(e) => {
                        warn!("could not save failure screenshot: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                warn!("screenshot capture failed: {}", e);
                None
            }
        }
    }

    async fn cleanup(&mut self) {
        if self.session_open {
            self.session_open = false;
            if let Err(e) = self.surface.close().await {
                warn!("session close failed: {}", e);
            }
        }
        if let Some(path) = self.image_path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("could not remove cached image {}: {}", path.display(), e);
            }
        }
    }
}

fn fail(stage: Stage, error: impl Into<FlowError>) -> RunFailure {
    RunFailure {
        stage,
        error: error.into(),
    }
}

fn preview(body: &str) -> String {
    let mut preview: String = body.chars().take(50).collect();
    if body.chars().count() > 50 {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_bodies() {
        let long = "x".repeat(80);
        assert_eq!(preview(&long).chars().count(), 53);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn run_failure_names_the_stage() {
        let failure = RunFailure {
            stage: Stage::SubmitPost,
            error: FlowError::StepTimeout(StepFailure {
                waited: Duration::from_secs(20),
                reasons: vec!["css `button`: not present or not visible".to_string()],
            }),
        };
        let message = failure.to_string();
        assert!(message.contains("submit post"));
        assert!(message.contains("not present"));
    }
}
