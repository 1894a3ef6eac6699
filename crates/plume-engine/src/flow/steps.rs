//! Step definitions for the login and compose flow.
//!
//! The candidate lists encode everything known about how the site names
//! these controls, most-specific first. The markup changes without notice;
//! broad fallbacks at the tail keep the flow alive when it does.

use crate::config::RunConfig;
use crate::locator::Locator;
use crate::step::{PagePredicate, Step};
use std::time::Duration;

fn tuned(step: Step, config: &RunConfig) -> Step {
    step.with_budget(config.step_budget).with_poll(config.step_poll)
}

/// The identifier field doubles as "is the login form rendered yet".
pub fn login_form(config: &RunConfig) -> Step {
    tuned(Step::locate("login form", identifier_candidates()), config)
}

pub fn enter_identifier(config: &RunConfig, email: &str) -> Step {
    tuned(
        Step::type_text("identifier field", identifier_candidates(), email),
        config,
    )
}

pub fn advance_past_identifier(config: &RunConfig) -> Step {
    tuned(
        Step::click(
            "advance button",
            vec![
                Locator::css("button[data-testid='ocfEnterTextNextButton']"),
                Locator::text("Next"),
                Locator::text("次へ"),
            ],
        ),
        config,
    )
}

/// Probe for the handle-confirmation interstitial. Deliberately short:
/// most runs never see this screen.
pub fn handle_confirmation_probe(config: &RunConfig) -> Step {
    Step::locate("handle confirmation", identifier_candidates())
        .with_budget(Duration::from_secs(3))
        .with_poll(config.step_poll)
}

pub fn enter_handle(config: &RunConfig, handle: &str) -> Step {
    tuned(
        Step::type_text("handle field", identifier_candidates(), handle),
        config,
    )
}

pub fn enter_password(config: &RunConfig, password: &str) -> Step {
    tuned(
        Step::type_text(
            "password field",
            vec![
                Locator::name("password"),
                Locator::css("input[type='password']"),
                Locator::xpath("//div[@role='dialog']//input[@type='password']"),
            ],
            password,
        ),
        config,
    )
}

pub fn submit_login(config: &RunConfig) -> Step {
    tuned(
        Step::click(
            "login button",
            vec![
                Locator::css("button[data-testid='LoginForm_Login_Button']"),
                Locator::text("Log in"),
                Locator::text("ログイン"),
            ],
        ),
        config,
    )
}

pub fn compose_area(config: &RunConfig) -> Step {
    tuned(Step::locate("compose area", body_candidates()), config)
}

pub fn enter_body(config: &RunConfig, body: &str) -> Step {
    tuned(Step::type_text("post body", body_candidates(), body), config)
}

pub fn attach_image(config: &RunConfig, path: &str) -> Step {
    tuned(
        Step::type_text(
            "file input",
            vec![
                Locator::css("input[data-testid='fileInput']"),
                Locator::css("input[type='file']"),
            ],
            path,
        ),
        config,
    )
}

pub fn submit_post(config: &RunConfig) -> Step {
    tuned(
        Step::click(
            "post button",
            vec![
                Locator::css("button[data-testid='tweetButton']"),
                Locator::css("button[data-testid='tweetButtonInline']"),
                Locator::text("Post"),
                Locator::text("ポスト"),
            ],
        ),
        config,
    )
}

/// The post went through once the browser leaves the compose surface.
pub fn confirm_posted(config: &RunConfig) -> Step {
    tuned(
        Step::wait_for(
            "post confirmation",
            PagePredicate::UrlLeaves("/compose/".to_string()),
        ),
        config,
    )
}

fn identifier_candidates() -> Vec<Locator> {
    vec![
        Locator::name("text"),
        Locator::css("input[name='text']"),
        Locator::xpath("//input[@name='text']"),
        Locator::css("input[autocomplete='username']"),
        Locator::css("input[type='text']"),
    ]
}

fn body_candidates() -> Vec<Locator> {
    vec![
        Locator::css("div[data-testid='tweetTextarea_0']"),
        Locator::css("div[aria-label='Post text']"),
        Locator::css("div[aria-label='Tweet text']"),
        Locator::css("div[contenteditable='true']"),
    ]
}
