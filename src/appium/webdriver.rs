//! Minimal W3C WebDriver client for an Appium server.

use std::time::{Duration, Instant};

use base64::Engine;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::locator::Locator;
use super::strategy::ElementFinder;
use crate::error::{Error, Result};

/// Key under which W3C servers return element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Opaque element handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementRef(pub String);

/// Element bounds in points.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

/// Error object of a failed WebDriver command.
#[derive(Debug, Clone)]
struct WireError {
    status: u16,
    error: String,
    message: String,
}

impl WireError {
    fn is_no_such_element(&self) -> bool {
        self.error == "no such element"
    }

    fn into_error(self, action: &str) -> Error {
        Error::automation(format!("WebDriver {} failed: {}: {}", action, self.error, self.message))
            .with_context("http_status", self.status)
            .with_context("webdriver_error", self.error)
    }
}

/// HTTP client bound to one Appium server.
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    http: Client,
    base_url: String,
}

impl WebDriverClient {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /status`.
    pub async fn status(&self) -> Result<Value> {
        let url = format!("{}/status", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::connection(format!(
                "Appium server returned status {}",
                status.as_u16()
            ))
            .with_context("appium_url", &self.base_url)
            .with_context("suggestion", "Start Appium: appium server --port 4723"));
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(body.get("value").cloned().unwrap_or(body))
    }

    /// `POST /session` with the given `alwaysMatch` capabilities.
    pub async fn create_session(&self, capabilities: Value) -> Result<Session> {
        let body = json!({
            "capabilities": {
                "alwaysMatch": capabilities,
                "firstMatch": [{}],
            }
        });
        let value = match self.send(Method::POST, "/session", Some(body)).await? {
            Ok(value) => value,
            Err(wire) => return Err(wire.into_error("new session")),
        };
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::automation("Appium did not return a session id"))?
            .to_string();
        tracing::info!(session_id = %id, "Appium session created");
        Ok(Session {
            client: self.clone(),
            id,
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<std::result::Result<Value, WireError>> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "WebDriver request");
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|e| self.unreachable(e))?;
        let status = response.status().as_u16();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        // Legacy JSONWP servers put sessionId next to value.
        let mut value = payload.get("value").cloned().unwrap_or(Value::Null);
        if let (Some(session_id), Some(obj)) = (payload.get("sessionId"), value.as_object_mut()) {
            obj.entry("sessionId").or_insert_with(|| session_id.clone());
        }

        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Ok(Err(WireError {
                status,
                error: error.to_string(),
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }));
        }
        if !(200..300).contains(&status) {
            return Ok(Err(WireError {
                status,
                error: "unknown error".into(),
                message: format!("HTTP {}", status),
            }));
        }
        Ok(Ok(value))
    }

    fn unreachable(&self, e: reqwest::Error) -> Error {
        if e.is_connect() || e.is_timeout() {
            Error::connection(format!("Cannot reach Appium server at {}: {}", self.base_url, e))
                .with_context("appium_url", &self.base_url)
                .with_context("suggestion", "Start Appium: appium server --port 4723")
        } else {
            Error::Http(e)
        }
    }
}

/// An open WebDriver session.
#[derive(Debug)]
pub struct Session {
    client: WebDriverClient,
    id: String,
}

impl Session {
    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        action: &str,
    ) -> Result<Value> {
        let path = format!("/session/{}{}", self.id, path);
        match self.client.send(method, &path, body).await? {
            Ok(value) => Ok(value),
            Err(wire) => Err(wire.into_error(action)),
        }
    }

    /// Single lookup; `None` when nothing matches.
    pub async fn find_element(&self, locator: &Locator) -> Result<Option<ElementRef>> {
        let path = format!("/session/{}/element", self.id);
        match self
            .client
            .send(Method::POST, &path, Some(locator.to_body()))
            .await?
        {
            Ok(value) => Ok(element_ref(&value)),
            Err(wire) if wire.is_no_such_element() => Ok(None),
            Err(wire) => Err(wire.into_error("find element")),
        }
    }

    /// Poll until an element matches or `wait` elapses. A zero wait makes
    /// exactly one attempt.
    pub async fn find_with_wait(
        &self,
        locator: &Locator,
        wait: Duration,
    ) -> Result<Option<ElementRef>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(element) = self.find_element(locator).await? {
                return Ok(Some(element));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// All matching elements.
    pub async fn find_elements(&self, locator: &Locator) -> Result<Vec<ElementRef>> {
        let value = self
            .call(Method::POST, "/elements", Some(locator.to_body()), "find elements")
            .await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(element_ref).collect())
            .unwrap_or_default())
    }

    /// Tap the element.
    pub async fn click(&self, element: &ElementRef) -> Result<()> {
        let path = format!("/element/{}/click", element.0);
        self.call(Method::POST, &path, Some(json!({})), "click").await?;
        Ok(())
    }

    /// Clear a text input.
    pub async fn clear(&self, element: &ElementRef) -> Result<()> {
        let path = format!("/element/{}/clear", element.0);
        self.call(Method::POST, &path, Some(json!({})), "clear").await?;
        Ok(())
    }

    /// Type into a text input.
    pub async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        let path = format!("/element/{}/value", element.0);
        self.call(Method::POST, &path, Some(json!({ "text": text })), "send keys")
            .await?;
        Ok(())
    }

    /// Attribute value, `None` when unset.
    pub async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let path = format!("/element/{}/attribute/{}", element.0, name);
        let value = self.call(Method::GET, &path, None, "get attribute").await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    /// Element bounds.
    pub async fn rect(&self, element: &ElementRef) -> Result<Rect> {
        let path = format!("/element/{}/rect", element.0);
        let value = self.call(Method::GET, &path, None, "get rect").await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// XML page source.
    pub async fn page_source(&self) -> Result<String> {
        let value = self.call(Method::GET, "/source", None, "get source").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Screenshot as PNG bytes.
    pub async fn screenshot_png(&self) -> Result<Vec<u8>> {
        let value = self
            .call(Method::GET, "/screenshot", None, "screenshot")
            .await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| Error::screenshot("WebDriver screenshot response was not a string"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::screenshot(format!("Invalid screenshot encoding: {}", e)))
    }

    /// `DELETE /session/{id}`. Failures are logged, not returned.
    pub async fn close(self) {
        let path = format!("/session/{}", self.id);
        match self.client.send(Method::DELETE, &path, None).await {
            Ok(Ok(_)) => tracing::info!(session_id = %self.id, "Appium session closed"),
            Ok(Err(wire)) => {
                tracing::warn!(session_id = %self.id, "Failed to close session: {}", wire.message)
            }
            Err(e) => tracing::warn!(session_id = %self.id, "Failed to close session: {}", e),
        }
    }
}

#[async_trait::async_trait]
impl ElementFinder for Session {
    async fn find(&self, locator: &Locator, wait: Duration) -> Result<Option<ElementRef>> {
        self.find_with_wait(locator, wait).await
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>> {
        self.find_elements(locator).await
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        Session::attribute(self, element, name).await
    }

    async fn tap(&self, element: &ElementRef) -> Result<()> {
        self.click(element).await
    }
}

fn element_ref(value: &Value) -> Option<ElementRef> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_ref_accepts_w3c_and_legacy_keys() {
        let w3c = json!({ ELEMENT_KEY: "abc" });
        assert_eq!(element_ref(&w3c), Some(ElementRef("abc".into())));
        let legacy = json!({ "ELEMENT": "def" });
        assert_eq!(element_ref(&legacy), Some(ElementRef("def".into())));
        assert_eq!(element_ref(&json!({})), None);
    }

    #[test]
    fn no_such_element_is_recognized() {
        let wire = WireError {
            status: 404,
            error: "no such element".into(),
            message: "An element could not be located".into(),
        };
        assert!(wire.is_no_such_element());
        let err = wire.into_error("find element");
        assert_eq!(err.kind(), "automation");
        assert_eq!(err.context().unwrap()["http_status"], 404);
    }
}
