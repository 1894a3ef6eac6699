//! fantoccini implementation of the browser surface.

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator as WdLocator};
use plume_engine::locator::Locator;
use plume_engine::surface::{ElementRef, Surface, SurfaceError};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Chrome capabilities for the session. The anti-automation arguments and
/// desktop user agent keep the login flow on the ordinary code path.
pub(crate) fn chrome_capabilities(headless: bool) -> serde_json::Map<String, Value> {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--window-size=1280,800".to_string(),
        format!("--user-agent={}", USER_AGENT),
    ];
    if headless {
        args.insert(0, "--headless=new".to_string());
    }

    let mut caps = serde_json::Map::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({
            "args": args,
            "excludeSwitches": ["enable-automation"],
        }),
    );
    caps
}

/// WebDriver query for one locator strategy.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WireQuery {
    Css(String),
    XPath(String),
}

pub(crate) fn to_wire(locator: &Locator) -> WireQuery {
    match locator {
        Locator::Css(selector) => WireQuery::Css(selector.clone()),
        Locator::Name(name) => WireQuery::Css(format!("[name='{}']", name)),
        Locator::XPath(xpath) => WireQuery::XPath(xpath.clone()),
        Locator::Text(text) => WireQuery::XPath(format!(
            "//button[normalize-space(.)='{text}'] \
             | //div[@role='button'][normalize-space(.)='{text}'] \
             | //span[normalize-space(text())='{text}']"
        )),
    }
}

pub struct WebDriverSurface {
    webdriver_url: String,
    headless: bool,
    client: Option<Client>,
    elements: HashMap<String, fantoccini::elements::Element>,
    next_id: u64,
}

impl WebDriverSurface {
    pub fn new(webdriver_url: impl Into<String>, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless,
            client: None,
            elements: HashMap::new(),
            next_id: 0,
        }
    }

    fn client(&self) -> Result<Client, SurfaceError> {
        self.client.clone().ok_or(SurfaceError::NotReady)
    }

    fn element(&self, r: &ElementRef) -> Result<fantoccini::elements::Element, SurfaceError> {
        self.elements
            .get(&r.0)
            .cloned()
            .ok_or_else(|| SurfaceError::Element(format!("stale element reference {}", r.0)))
    }

    async fn is_file_input(element: &fantoccini::elements::Element) -> bool {
        matches!(element.attr("type").await, Ok(Some(t)) if t == "file")
    }
}

#[async_trait]
impl Surface for WebDriverSurface {
    async fn open(&mut self) -> Result<(), SurfaceError> {
        let caps = chrome_capabilities(self.headless);
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| {
                SurfaceError::Session(format!(
                    "failed to connect to WebDriver at {}: {}",
                    self.webdriver_url, e
                ))
            })?;
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SurfaceError> {
        self.elements.clear();
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| SurfaceError::Session(format!("failed to close session: {}", e)))?;
        }
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SurfaceError> {
        let client = self.client()?;
        client
            .goto(url)
            .await
            .map_err(|e| SurfaceError::Navigation(e.to_string()))
    }

    async fn current_url(&mut self) -> Result<String, SurfaceError> {
        let client = self.client()?;
        client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| SurfaceError::Other(e.to_string()))
    }

    async fn locate(&mut self, locator: &Locator) -> Result<Option<ElementRef>, SurfaceError> {
        let client = self.client()?;
        let query = to_wire(locator);
        let found = match &query {
            WireQuery::Css(selector) => client.find_all(WdLocator::Css(selector)).await,
            WireQuery::XPath(xpath) => client.find_all(WdLocator::XPath(xpath)).await,
        }
        .map_err(|e| SurfaceError::Element(e.to_string()))?;

        for element in found {
            let displayed = element.is_displayed().await.unwrap_or(false);
            // File inputs on the compose page are never displayed, but the
            // driver accepts keys to them regardless.
            if displayed || Self::is_file_input(&element).await {
                self.next_id += 1;
                let id = self.next_id.to_string();
                self.elements.insert(id.clone(), element);
                debug!(%locator, %id, "located element");
                return Ok(Some(ElementRef(id)));
            }
        }
        Ok(None)
    }

    async fn fill(&mut self, element: &ElementRef, text: &str) -> Result<(), SurfaceError> {
        let element = self.element(element)?;
        if !Self::is_file_input(&element).await {
            // Focus first; the compose body is a contenteditable div and
            // clear() is not guaranteed to work on it.
            let _ = element.click().await;
            let _ = element.clear().await;
        }
        element
            .send_keys(text)
            .await
            .map_err(|e| SurfaceError::Element(e.to_string()))
    }

    async fn click(&mut self, element: &ElementRef) -> Result<(), SurfaceError> {
        let element = self.element(element)?;
        element
            .click()
            .await
            .map_err(|e| SurfaceError::Element(e.to_string()))
    }

    async fn read_attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, SurfaceError> {
        let element = self.element(element)?;
        element
            .attr(name)
            .await
            .map_err(|e| SurfaceError::Element(e.to_string()))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SurfaceError> {
        let client = self.client()?;
        client
            .screenshot()
            .await
            .map_err(|e| SurfaceError::Other(format!("screenshot failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_maps_to_an_attribute_selector() {
        assert_eq!(
            to_wire(&Locator::name("password")),
            WireQuery::Css("[name='password']".to_string())
        );
    }

    #[test]
    fn text_maps_to_a_clickable_xpath() {
        let WireQuery::XPath(xpath) = to_wire(&Locator::text("Post")) else {
            panic!("expected an xpath query");
        };
        assert!(xpath.contains("//button[normalize-space(.)='Post']"));
        assert!(xpath.contains("//span[normalize-space(text())='Post']"));
    }

    #[test]
    fn headless_capabilities_carry_the_new_headless_flag() {
        let caps = chrome_capabilities(true);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert_eq!(args[0], "--headless=new");
        assert!(args.iter().any(|a| a == "--no-sandbox"));

        let caps = chrome_capabilities(false);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a == "--headless=new"));
    }
}
