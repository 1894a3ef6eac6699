pub mod config;
pub mod creds;
pub mod flow;
pub mod locator;
pub mod media;
pub mod notify;
pub mod step;
pub mod surface;

pub use flow::{PostFlow, RunFailure, Stage};
pub use locator::Locator;
pub use step::{Step, StepAction, StepExecutor, StepResult};
pub use surface::{Surface, SurfaceError};
