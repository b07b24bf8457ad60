//! High-level Appium operations used by the tools and resources.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use super::locator::Locator;
use super::strategy::{
    self, DismissOutcome, ElementQuery, LocateOutcome, PlannedStrategy, StrategyAttempt,
    XPATH_WAIT,
};
use super::webdriver::{Rect, Session, WebDriverClient};
use crate::config::AppiumSettings;
use crate::error::{Error, Result};
use crate::screenshot::{png_name, ScreenshotInfo, ScreenshotService};

/// How many on-screen elements a failed lookup reports.
const DIAGNOSTIC_ELEMENTS: usize = 10;

/// Parameters of [`AppiumClient::find_and_tap`].
#[derive(Debug, Clone, Default)]
pub struct FindAndTapRequest {
    /// What to tap.
    pub query: ElementQuery,
    /// App to attach to; the configured default when `None`.
    pub bundle_id: Option<String>,
    /// Capture the screen after tapping.
    pub take_screenshot: bool,
    /// Dismiss whatever the tap opened.
    pub dismiss_after_screenshot: bool,
    /// Button to use for dismissal.
    pub dismiss_button_text: Option<String>,
}

/// Successful find-and-tap.
#[derive(Debug, Clone, Serialize)]
pub struct FindAndTapOutcome {
    /// Winning strategy name.
    pub strategy: &'static str,
    /// Winning strategy description.
    pub strategy_used: String,
    /// Matching locator.
    pub locator: Locator,
    /// Strategies tried before the winner.
    pub attempted_strategies: Vec<StrategyAttempt>,
    /// Screenshot, when requested and captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotInfo>,
    /// Screenshot failure, when requested but not captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_error: Option<String>,
    /// Dismiss result, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dismiss: Option<DismissOutcome>,
}

/// Successful tap-and-type.
#[derive(Debug, Clone, Serialize)]
pub struct TapTypeOutcome {
    /// Text entered.
    pub text: String,
    /// App the session attached to.
    pub bundle_id: String,
    /// Strategy that found the field.
    pub field_strategy: String,
    /// Screenshot after typing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotInfo>,
}

/// One element of the flattened accessibility tree.
#[derive(Debug, Clone, Serialize)]
pub struct ElementSummary {
    /// XCUITest type.
    #[serde(rename = "type")]
    pub element_type: Option<String>,
    /// `name` attribute.
    pub name: Option<String>,
    /// `label` attribute.
    pub label: Option<String>,
    /// `value` attribute.
    pub value: Option<String>,
    /// Whether the element accepts input.
    pub enabled: bool,
    /// Whether the element is on screen.
    pub visible: bool,
    /// Bounds.
    pub rect: Rect,
}

/// Appium server facade.
#[derive(Clone)]
pub struct AppiumClient {
    driver: WebDriverClient,
    settings: AppiumSettings,
    screenshots: ScreenshotService,
}

impl AppiumClient {
    /// Create a client from settings.
    pub fn new(settings: AppiumSettings, screenshots: ScreenshotService) -> Result<Self> {
        Ok(Self {
            driver: WebDriverClient::new(settings.url.clone(), settings.timeout)?,
            settings,
            screenshots,
        })
    }

    /// Server URL.
    pub fn url(&self) -> &str {
        self.driver.base_url()
    }

    /// Probe `GET /status`.
    pub async fn status(&self) -> Result<Value> {
        self.driver.status().await
    }

    /// Capabilities for a new XCUITest session.
    pub fn capabilities(&self, bundle_id: Option<&str>) -> Value {
        let mut caps = json!({
            "platformName": "iOS",
            "appium:platformVersion": self.settings.platform_version,
            "appium:deviceName": self.settings.device_name,
            "appium:automationName": "XCUITest",
            "appium:noReset": true,
            "appium:newCommandTimeout": self.settings.timeout.as_secs(),
        });
        if let (Some(bundle_id), Some(obj)) = (bundle_id, caps.as_object_mut()) {
            obj.insert("appium:bundleId".into(), json!(bundle_id));
        }
        caps
    }

    /// Open a session, attaching to `bundle_id` when given.
    pub async fn open_session(&self, bundle_id: Option<&str>) -> Result<Session> {
        self.driver.status().await?;
        let session = self
            .driver
            .create_session(self.capabilities(bundle_id))
            .await
            .map_err(|e| e.with_context("bundle_id", bundle_id))?;
        settle(self.settings.launch_settle).await;
        Ok(session)
    }

    fn bundle_or_default(&self, bundle_id: Option<&str>) -> String {
        bundle_id
            .filter(|b| !b.is_empty())
            .unwrap_or(self.settings.default_bundle_id.as_str())
            .to_string()
    }

    /// Locate an element through the strategy chain and tap it.
    pub async fn find_and_tap(&self, request: FindAndTapRequest) -> Result<FindAndTapOutcome> {
        request.query.validate()?;
        let bundle_id = self.bundle_or_default(request.bundle_id.as_deref());
        let strategies = strategy::plan(&request.query);
        tracing::info!(
            bundle_id = %bundle_id,
            strategies = strategies.len(),
            "Finding element to tap"
        );

        let session = self.open_session(Some(&bundle_id)).await?;
        let result = self.find_and_tap_in(&session, &request, &strategies).await;
        session.close().await;
        result
    }

    async fn find_and_tap_in(
        &self,
        session: &Session,
        request: &FindAndTapRequest,
        strategies: &[PlannedStrategy],
    ) -> Result<FindAndTapOutcome> {
        let LocateOutcome { found, attempts } = strategy::locate(session, strategies).await;
        let Some(found) = found else {
            let visible = strategy::visible_elements(session, DIAGNOSTIC_ELEMENTS).await;
            return Err(
                Error::automation("Element not found with any search strategy")
                    .with_context("search_criteria", &request.query)
                    .with_context("attempted_strategies", &attempts)
                    .with_context("available_elements", visible),
            );
        };

        session.click(&found.element).await?;
        tracing::info!(strategy = found.strategy, "Element tapped");
        settle(self.settings.action_settle).await;

        let (mut screenshot, mut screenshot_error) = (None, None);
        if request.take_screenshot {
            match self.save_session_screenshot(session, "ios_findtap").await {
                Ok(info) => screenshot = Some(info),
                Err(e) => {
                    tracing::warn!("Screenshot failed: {}", e);
                    screenshot_error = Some(e.to_string());
                }
            }
        }

        let dismiss = if request.dismiss_after_screenshot {
            let outcome = strategy::dismiss(session, request.dismiss_button_text.as_deref()).await;
            if outcome.dismissed {
                settle(self.settings.action_settle).await;
            }
            Some(outcome)
        } else {
            None
        };

        Ok(FindAndTapOutcome {
            strategy: found.strategy,
            strategy_used: found.description,
            locator: found.locator,
            attempted_strategies: attempts,
            screenshot,
            screenshot_error,
            dismiss,
        })
    }

    /// Find the first text input, tap it, and replace its contents with `text`.
    pub async fn tap_and_type(
        &self,
        text: &str,
        bundle_id: Option<&str>,
        timeout: Duration,
    ) -> Result<TapTypeOutcome> {
        if text.is_empty() {
            return Err(Error::validation("text cannot be empty"));
        }
        let bundle_id = self.bundle_or_default(bundle_id);
        tracing::info!(bundle_id = %bundle_id, "Tap and type via Appium");

        let session = self.open_session(Some(&bundle_id)).await?;
        let result = self.tap_and_type_in(&session, text, &bundle_id, timeout).await;
        session.close().await;
        result
    }

    async fn tap_and_type_in(
        &self,
        session: &Session,
        text: &str,
        bundle_id: &str,
        timeout: Duration,
    ) -> Result<TapTypeOutcome> {
        let LocateOutcome { found, attempts } =
            strategy::locate(session, &text_field_plan(timeout)).await;
        let Some(found) = found else {
            return Err(Error::automation("Could not find a text field on screen")
                .with_context("bundle_id", bundle_id)
                .with_context("attempted_strategies", &attempts));
        };

        session.click(&found.element).await?;
        session.clear(&found.element).await?;
        session.send_keys(&found.element, text).await?;
        tracing::info!(strategy = found.strategy, "Typed text via Appium");
        settle(self.settings.action_settle).await;

        let screenshot = match self.save_session_screenshot(session, "ios_taptype").await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!("Screenshot failed: {}", e);
                None
            }
        };

        Ok(TapTypeOutcome {
            text: text.to_string(),
            bundle_id: bundle_id.to_string(),
            field_strategy: found.description,
            screenshot,
        })
    }

    /// Flattened element list of the current screen.
    pub async fn accessibility_elements(
        &self,
        bundle_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ElementSummary>> {
        let session = self.open_session(bundle_id).await?;
        let result = accessibility_elements_in(&session, limit).await;
        session.close().await;
        result
    }

    /// XML page source of the current screen.
    pub async fn page_source(&self, bundle_id: Option<&str>) -> Result<String> {
        let session = self.open_session(bundle_id).await?;
        let result = session.page_source().await;
        session.close().await;
        result
    }

    /// Capture the screen through WebDriver into `directory`, or the
    /// screenshot directory when none is given.
    pub async fn capture_screenshot(
        &self,
        bundle_id: Option<&str>,
        filename: Option<&str>,
        directory: Option<&Path>,
    ) -> Result<ScreenshotInfo> {
        let session = self.open_session(bundle_id).await?;
        let result = match session.screenshot_png().await {
            Ok(bytes) => {
                let name = png_name(filename, "ios_screenshot");
                self.screenshots.save_png(&bytes, &name, directory).await
            }
            Err(e) => Err(e),
        };
        session.close().await;
        result
    }

    async fn save_session_screenshot(
        &self,
        session: &Session,
        prefix: &str,
    ) -> Result<ScreenshotInfo> {
        let bytes = session.screenshot_png().await?;
        self.screenshots
            .save_png(&bytes, &png_name(None, prefix), None)
            .await
    }
}

/// Text inputs tried by [`AppiumClient::tap_and_type`].
pub fn text_field_plan(timeout: Duration) -> Vec<PlannedStrategy> {
    vec![
        PlannedStrategy {
            name: "text_field",
            description: "Class name: XCUIElementTypeTextField".into(),
            locators: vec![Locator::class_name("XCUIElementTypeTextField")],
            wait: timeout,
        },
        PlannedStrategy {
            name: "text_view",
            description: "Class name: XCUIElementTypeTextView".into(),
            locators: vec![Locator::class_name("XCUIElementTypeTextView")],
            wait: XPATH_WAIT,
        },
        PlannedStrategy {
            name: "labelled_input",
            description: "XPath: label or name containing 'text'".into(),
            locators: vec![Locator::xpath(
                "//*[contains(@label, 'text') or contains(@name, 'text')]",
            )],
            wait: XPATH_WAIT,
        },
    ]
}

async fn accessibility_elements_in(session: &Session, limit: usize) -> Result<Vec<ElementSummary>> {
    let elements = session.find_elements(&Locator::xpath("//*")).await?;
    let mut summaries = Vec::new();
    for element in elements.iter().take(limit) {
        let attr = |name: &'static str| session.attribute(element, name);
        let flag = |v: Option<String>| v.as_deref() == Some("true");
        summaries.push(ElementSummary {
            element_type: attr("type").await?,
            name: attr("name").await?,
            label: attr("label").await?,
            value: attr("value").await?,
            enabled: flag(attr("enabled").await?),
            visible: flag(attr("visible").await?),
            rect: session.rect(element).await.unwrap_or_default(),
        });
    }
    Ok(summaries)
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandRunner;
    use crate::config::Settings;
    use std::sync::Arc;

    fn client() -> AppiumClient {
        let settings = Settings::default();
        let screenshots = ScreenshotService::new(
            Arc::new(CommandRunner::new()),
            settings.screenshot_dir.clone(),
            None,
        );
        AppiumClient::new(settings.appium, screenshots).unwrap()
    }

    #[test]
    fn capabilities_request_xcuitest() {
        let caps = client().capabilities(Some("com.example.app"));
        assert_eq!(caps["platformName"], "iOS");
        assert_eq!(caps["appium:automationName"], "XCUITest");
        assert_eq!(caps["appium:bundleId"], "com.example.app");
        assert_eq!(caps["appium:noReset"], true);
        assert_eq!(caps["appium:newCommandTimeout"], 60);
    }

    #[test]
    fn capabilities_without_bundle_attach_to_current_app() {
        let caps = client().capabilities(None);
        assert!(caps.get("appium:bundleId").is_none());
    }

    #[test]
    fn text_field_plan_waits() {
        let plan = text_field_plan(Duration::from_secs(12));
        assert_eq!(plan[0].wait, Duration::from_secs(12));
        assert_eq!(plan[1].wait, XPATH_WAIT);
        assert_eq!(plan[2].locators[0].using.as_str(), "xpath");
    }
}
