use serde::{Deserialize, Serialize};

/// One strategy for finding an element on the current page.
///
/// The target site regenerates its markup frequently, so no single strategy
/// is trusted; steps carry an ordered list of these and try them in turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    /// CSS selector.
    Css(String),
    /// `name` attribute of a form control.
    Name(String),
    /// XPath expression.
    XPath(String),
    /// Visible text of a button or clickable span.
    Text(String),
}

impl Locator {
    pub fn css(s: impl Into<String>) -> Self {
        Locator::Css(s.into())
    }

    pub fn name(s: impl Into<String>) -> Self {
        Locator::Name(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Locator::XPath(s.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Locator::Text(s.into())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css `{}`", s),
            Locator::Name(s) => write!(f, "name `{}`", s),
            Locator::XPath(s) => write!(f, "xpath `{}`", s),
            Locator::Text(s) => write!(f, "text `{}`", s),
        }
    }
}
