use async_trait::async_trait;
use plume_engine::locator::Locator;
use plume_engine::step::{PagePredicate, Step, StepAction, StepExecutor, StepResult};
use plume_engine::surface::{ElementRef, Surface, SurfaceError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted surface: which locators resolve (possibly only after a number
/// of attempts), which clicks fail, what the URL does over time.
#[derive(Default)]
struct MockState {
    visible: HashMap<String, usize>, // locator display -> attempts before it resolves
    locate_counts: HashMap<String, usize>,
    locate_order: Vec<String>,
    failing_clicks: Vec<String>,
    clicks: Vec<String>,
    attributes: HashMap<String, String>,
    url: String,
    url_after: Option<(usize, String)>, // url changes after N reads
    url_reads: usize,
}

#[derive(Clone, Default)]
struct MockSurface {
    state: Arc<Mutex<MockState>>,
}

impl MockSurface {
    fn visible_now(&self, locator: &Locator) -> Self {
        self.with_visible(locator, 0)
    }

    fn with_visible(&self, locator: &Locator, after_attempts: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .visible
            .insert(locator.to_string(), after_attempts);
        self.clone()
    }

    fn locates(&self) -> Vec<String> {
        self.state.lock().unwrap().locate_order.clone()
    }
}

#[async_trait]
impl Surface for MockSurface {
    async fn open(&mut self) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn navigate(&mut self, _url: &str) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, SurfaceError> {
        let mut state = self.state.lock().unwrap();
        state.url_reads += 1;
        let pending = state.url_after.clone();
        if let Some((after, next)) = pending
            && state.url_reads > after
        {
            state.url = next;
        }
        Ok(state.url.clone())
    }

    async fn locate(&mut self, locator: &Locator) -> Result<Option<ElementRef>, SurfaceError> {
        let key = locator.to_string();
        let mut state = self.state.lock().unwrap();
        state.locate_order.push(key.clone());
        let seen = state.locate_counts.entry(key.clone()).or_insert(0);
        *seen += 1;
        let attempts = *seen;
        match state.visible.get(&key) {
            Some(after) if attempts > *after => Ok(Some(ElementRef(key))),
            _ => Ok(None),
        }
    }

    async fn fill(&mut self, _element: &ElementRef, _text: &str) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_clicks.contains(&element.0) {
            return Err(SurfaceError::Element("click intercepted".to_string()));
        }
        state.clicks.push(element.0.clone());
        Ok(())
    }

    async fn read_attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, SurfaceError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .attributes
            .get(&format!("{}#{}", element.0, name))
            .cloned())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SurfaceError> {
        Ok(Vec::new())
    }
}

fn quick(step: Step) -> Step {
    step.with_budget(Duration::from_millis(200))
        .with_poll(Duration::from_millis(20))
}

#[tokio::test]
async fn first_resolving_candidate_wins_and_later_ones_are_never_tried() {
    let first = Locator::name("text");
    let second = Locator::css("input[type='text']");
    let mut surface = MockSurface::default()
        .visible_now(&first)
        .visible_now(&second);

    let step = quick(Step::locate("login form", vec![first.clone(), second.clone()]));
    let result = StepExecutor::new().run(&mut surface, &step).await;

    let StepResult::Success(success) = result else {
        panic!("expected success");
    };
    let matched = success.matched.unwrap();
    assert_eq!(matched.index, 0);
    assert_eq!(matched.locator, first);
    assert_eq!(surface.locates(), vec![first.to_string()]);
}

#[tokio::test]
async fn exhausted_budget_reports_a_reason_per_candidate() {
    let mut surface = MockSurface::default();
    let step = quick(Step::click(
        "post button",
        vec![Locator::css("button.primary"), Locator::text("Post")],
    ));

    let result = StepExecutor::new().run(&mut surface, &step).await;

    let StepResult::Failure(failure) = result else {
        panic!("expected failure");
    };
    assert_eq!(failure.reasons.len(), 2);
    assert!(failure.reasons[0].contains("button.primary"));
    assert!(failure.reasons[0].contains("not present"));
    assert!(failure.reasons[1].contains("Post"));
    // the loop stops once another poll would overrun the budget
    assert!(failure.waited >= Duration::from_millis(150));
}

#[tokio::test]
async fn a_candidate_appearing_mid_budget_is_picked_up() {
    let late = Locator::name("password");
    let mut surface = MockSurface::default().with_visible(&late, 3);

    let step = quick(Step::locate("password field", vec![late.clone()]));
    let result = StepExecutor::new().run(&mut surface, &step).await;

    let StepResult::Success(success) = result else {
        panic!("expected success after polling");
    };
    assert_eq!(success.matched.unwrap().locator, late);
}

#[tokio::test]
async fn an_action_error_moves_on_to_the_next_candidate() {
    let flaky = Locator::css("button[data-testid='tweetButton']");
    let steady = Locator::text("Post");
    let mut surface = MockSurface::default()
        .visible_now(&flaky)
        .visible_now(&steady);
    surface
        .state
        .lock()
        .unwrap()
        .failing_clicks
        .push(flaky.to_string());

    let step = quick(Step::click("post button", vec![flaky, steady.clone()]));
    let result = StepExecutor::new().run(&mut surface, &step).await;

    let StepResult::Success(success) = result else {
        panic!("expected the fallback candidate to carry the click");
    };
    assert_eq!(success.matched.unwrap().index, 1);
    assert_eq!(
        surface.state.lock().unwrap().clicks,
        vec![steady.to_string()]
    );
}

#[tokio::test]
async fn read_attribute_returns_the_value() {
    let button = Locator::css("button");
    let mut surface = MockSurface::default().visible_now(&button);
    surface.state.lock().unwrap().attributes.insert(
        format!("{}#aria-disabled", button),
        "true".to_string(),
    );

    let step = quick(Step::new(
        "button state",
        vec![button],
        StepAction::ReadAttribute("aria-disabled".to_string()),
    ));
    let result = StepExecutor::new().run(&mut surface, &step).await;

    let StepResult::Success(success) = result else {
        panic!("expected success");
    };
    assert_eq!(success.value.as_deref(), Some("true"));
}

#[tokio::test]
async fn page_predicate_succeeds_once_the_url_transitions() {
    let mut surface = MockSurface::default();
    {
        let mut state = surface.state.lock().unwrap();
        state.url = "https://x.com/compose/tweet".to_string();
        state.url_after = Some((2, "https://x.com/home".to_string()));
    }

    let step = quick(Step::wait_for(
        "post confirmation",
        PagePredicate::UrlLeaves("/compose/".to_string()),
    ));
    let result = StepExecutor::new().run(&mut surface, &step).await;

    let StepResult::Success(success) = result else {
        panic!("expected the predicate to be satisfied");
    };
    assert!(success.matched.is_none());
    assert_eq!(success.value.as_deref(), Some("https://x.com/home"));
}

#[tokio::test]
async fn page_predicate_times_out_when_the_url_never_changes() {
    let mut surface = MockSurface::default();
    surface.state.lock().unwrap().url = "https://x.com/compose/tweet".to_string();

    let step = quick(Step::wait_for(
        "post confirmation",
        PagePredicate::UrlLeaves("/compose/".to_string()),
    ));
    let result = StepExecutor::new().run(&mut surface, &step).await;

    let StepResult::Failure(failure) = result else {
        panic!("expected a timeout");
    };
    assert_eq!(failure.reasons.len(), 1);
    assert!(failure.reasons[0].contains("url leaves"));
}

#[tokio::test]
async fn a_step_without_candidates_fails_immediately() {
    let mut surface = MockSurface::default();
    let step = quick(Step::locate("nothing", Vec::new()));

    let result = StepExecutor::new().run(&mut surface, &step).await;

    let StepResult::Failure(failure) = result else {
        panic!("expected failure");
    };
    assert!(failure.reasons[0].contains("no locator candidates"));
    assert!(failure.waited < Duration::from_millis(100));
}
