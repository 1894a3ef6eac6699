use crate::locator::Locator;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("session not open")]
    NotReady,

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element interaction failed: {0}")]
    Element(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("{0}")]
    Other(String),
}

/// Opaque handle to a located element, valid for the lifetime of the page
/// it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

/// The browser automation capability set the step executor drives.
///
/// `locate` returns `None` when nothing matching the locator is currently
/// visible and interactable; hidden matches count as not found.
#[async_trait]
pub trait Surface: Send {
    /// Open the browser session.
    async fn open(&mut self) -> Result<(), SurfaceError>;

    /// Close the session and release its resources.
    async fn close(&mut self) -> Result<(), SurfaceError>;

    /// Navigate to a URL.
    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError>;

    /// URL of the current page.
    async fn current_url(&mut self) -> Result<String, SurfaceError>;

    /// Try to resolve a locator against the current page state.
    async fn locate(&mut self, locator: &Locator) -> Result<Option<ElementRef>, SurfaceError>;

    /// Type text into an element.
    async fn fill(&mut self, element: &ElementRef, text: &str) -> Result<(), SurfaceError>;

    /// Click an element.
    async fn click(&mut self, element: &ElementRef) -> Result<(), SurfaceError>;

    /// Read an attribute off an element.
    async fn read_attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, SurfaceError>;

    /// Capture a screenshot of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, SurfaceError>;
}
