//! WebDriver element locators.

use serde::Serialize;
use serde_json::{json, Value};

/// W3C locator strategy names understood by Appium's XCUITest driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Using {
    /// `accessibility id`
    #[serde(rename = "accessibility id")]
    AccessibilityId,
    /// `xpath`
    #[serde(rename = "xpath")]
    XPath,
    /// `class name`
    #[serde(rename = "class name")]
    ClassName,
}

impl Using {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Using::AccessibilityId => "accessibility id",
            Using::XPath => "xpath",
            Using::ClassName => "class name",
        }
    }
}

/// A single element lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    /// Strategy.
    pub using: Using,
    /// Selector value.
    pub value: String,
}

impl Locator {
    /// `accessibility id` locator.
    pub fn accessibility_id(value: impl Into<String>) -> Self {
        Self {
            using: Using::AccessibilityId,
            value: value.into(),
        }
    }

    /// `xpath` locator.
    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            using: Using::XPath,
            value: value.into(),
        }
    }

    /// `class name` locator.
    pub fn class_name(value: impl Into<String>) -> Self {
        Self {
            using: Using::ClassName,
            value: value.into(),
        }
    }

    /// Request body for `POST /element` and `POST /elements`.
    pub fn to_body(&self) -> Value {
        json!({ "using": self.using.as_str(), "value": self.value })
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.using.as_str(), self.value)
    }
}

/// Quote `text` as an XPath 1.0 string literal.
///
/// XPath 1.0 has no escape syntax, so text containing both quote kinds is
/// assembled with `concat()`.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }

    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_quoting() {
        assert_eq!(xpath_literal("Sign In"), "'Sign In'");
        assert_eq!(xpath_literal("Don't"), "\"Don't\"");
        assert_eq!(
            xpath_literal(r#"say "don't""#),
            r#"concat('say "don', "'", 't"')"#
        );
    }

    #[test]
    fn body_uses_w3c_names() {
        let body = Locator::class_name("XCUIElementTypeTextField").to_body();
        assert_eq!(body["using"], "class name");
        assert_eq!(body["value"], "XCUIElementTypeTextField");
        assert_eq!(Locator::accessibility_id("login").to_string(), "accessibility id=login");
    }
}
