//! Ranked element-location strategies.
//!
//! A query is planned into an ordered list of [`PlannedStrategy`] values;
//! [`locate`] walks the list and stops at the first element found. Finder
//! errors inside a strategy are recorded and the walk continues.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use super::locator::{xpath_literal, Locator};
use super::webdriver::ElementRef;
use crate::error::{Error, Result};

/// Upper bound on the wait for caller-supplied XPath.
pub const XPATH_WAIT: Duration = Duration::from_secs(5);

/// Buttons tried by [`dismiss`] when the caller names none.
pub const DEFAULT_DISMISS_TEXTS: [&str; 6] = ["Done", "Cancel", "Close", "Back", "Dismiss", "OK"];

const NAVIGATION_BACK: [&str; 4] = [
    "//XCUIElementTypeNavigationBar//XCUIElementTypeButton[1]",
    "//XCUIElementTypeButton[@name='Back']",
    "//*[@name='chevron.left']",
    "//XCUIElementTypeButton[contains(@name, 'back')]",
];

/// Element lookups the strategies need.
#[async_trait::async_trait]
pub trait ElementFinder: Send + Sync {
    /// First element matching `locator`, polling up to `wait`.
    async fn find(&self, locator: &Locator, wait: Duration) -> Result<Option<ElementRef>>;

    /// All elements matching `locator`.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>>;

    /// Attribute of an element.
    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>>;

    /// Tap an element.
    async fn tap(&self, element: &ElementRef) -> Result<()>;
}

/// XCUITest element types accepted by `element_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    /// Button.
    Button,
    /// Static text.
    StaticText,
    /// Text field.
    TextField,
    /// Secure text field.
    SecureTextField,
    /// Image.
    Image,
    /// Table or collection cell.
    Cell,
    /// Navigation bar.
    NavigationBar,
    /// Tab bar.
    TabBar,
    /// Toolbar.
    Toolbar,
    /// Scroll view.
    ScrollView,
    /// Table.
    Table,
    /// Collection view.
    CollectionView,
    /// Switch.
    Switch,
    /// Slider.
    Slider,
    /// Progress indicator.
    ProgressIndicator,
    /// Activity indicator.
    ActivityIndicator,
    /// Alert.
    Alert,
    /// Sheet.
    Sheet,
    /// Popover.
    Popover,
    /// Menu item.
    MenuItem,
    /// Menu button.
    MenuButton,
    /// Link.
    Link,
    /// Search field.
    SearchField,
    /// Any type.
    #[default]
    Any,
}

impl ElementType {
    /// Every accepted type, in schema order.
    pub const ALL: [ElementType; 24] = [
        ElementType::Button,
        ElementType::StaticText,
        ElementType::TextField,
        ElementType::SecureTextField,
        ElementType::Image,
        ElementType::Cell,
        ElementType::NavigationBar,
        ElementType::TabBar,
        ElementType::Toolbar,
        ElementType::ScrollView,
        ElementType::Table,
        ElementType::CollectionView,
        ElementType::Switch,
        ElementType::Slider,
        ElementType::ProgressIndicator,
        ElementType::ActivityIndicator,
        ElementType::Alert,
        ElementType::Sheet,
        ElementType::Popover,
        ElementType::MenuItem,
        ElementType::MenuButton,
        ElementType::Link,
        ElementType::SearchField,
        ElementType::Any,
    ];

    /// Name used in tool arguments, e.g. `staticText`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Button => "button",
            ElementType::StaticText => "staticText",
            ElementType::TextField => "textField",
            ElementType::SecureTextField => "secureTextField",
            ElementType::Image => "image",
            ElementType::Cell => "cell",
            ElementType::NavigationBar => "navigationBar",
            ElementType::TabBar => "tabBar",
            ElementType::Toolbar => "toolbar",
            ElementType::ScrollView => "scrollView",
            ElementType::Table => "table",
            ElementType::CollectionView => "collectionView",
            ElementType::Switch => "switch",
            ElementType::Slider => "slider",
            ElementType::ProgressIndicator => "progressIndicator",
            ElementType::ActivityIndicator => "activityIndicator",
            ElementType::Alert => "alert",
            ElementType::Sheet => "sheet",
            ElementType::Popover => "popover",
            ElementType::MenuItem => "menuItem",
            ElementType::MenuButton => "menuButton",
            ElementType::Link => "link",
            ElementType::SearchField => "searchField",
            ElementType::Any => "any",
        }
    }

    /// XCUITest class name, `None` for [`ElementType::Any`].
    pub fn class_name(&self) -> Option<String> {
        if *self == ElementType::Any {
            return None;
        }
        let name = self.as_str();
        let mut chars = name.chars();
        let first = chars.next()?;
        Some(format!(
            "XCUIElementType{}{}",
            first.to_ascii_uppercase(),
            chars.as_str()
        ))
    }
}

impl FromStr for ElementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ElementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                Error::validation(format!("Unsupported element_type '{}'", s)).with_context(
                    "supported_types",
                    ElementType::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
                )
            })
    }
}

/// What to look for.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ElementQuery {
    /// Accessibility identifier.
    pub accessibility_id: Option<String>,
    /// Visible text.
    pub text: Option<String>,
    /// Match `text` as a substring.
    pub partial_match: bool,
    /// Literal XPath.
    pub xpath: Option<String>,
    /// Restrict to one element type.
    pub element_type: ElementType,
    /// Wait for the accessibility id lookup.
    #[serde(skip)]
    pub timeout: Duration,
}

impl ElementQuery {
    /// Reject queries with no search criterion.
    pub fn validate(&self) -> Result<()> {
        let given = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if given(&self.accessibility_id) || given(&self.text) || given(&self.xpath) {
            Ok(())
        } else {
            Err(Error::validation(
                "At least one search criterion must be provided: element_text, accessibility_id, or xpath",
            )
            .with_context("required_criteria", ["element_text", "accessibility_id", "xpath"]))
        }
    }
}

/// One step of the locate chain.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStrategy {
    /// Short name, e.g. `exact_text`.
    pub name: &'static str,
    /// Human-readable description.
    pub description: String,
    /// Locators tried in order.
    pub locators: Vec<Locator>,
    /// Wait per locator.
    #[serde(skip)]
    pub wait: Duration,
}

/// Build the strategy list for `query`, highest priority first.
pub fn plan(query: &ElementQuery) -> Vec<PlannedStrategy> {
    let mut strategies = Vec::new();
    let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
    let text = non_empty(&query.text);
    let class = query.element_type.class_name();

    if let Some(id) = non_empty(&query.accessibility_id) {
        strategies.push(PlannedStrategy {
            name: "accessibility_id",
            description: format!("Accessibility ID: {}", id),
            locators: vec![Locator::accessibility_id(id)],
            wait: query.timeout,
        });
    }

    if let Some(ref text) = text {
        let lit = xpath_literal(text);
        if query.partial_match {
            strategies.push(PlannedStrategy {
                name: "partial_text",
                description: format!("Partial text: {}", text),
                locators: vec![
                    Locator::xpath(format!("//*[contains(@name, {})]", lit)),
                    Locator::xpath(format!("//*[contains(@label, {})]", lit)),
                    Locator::xpath(format!("//*[contains(@value, {})]", lit)),
                    Locator::xpath(format!("//*[contains(text(), {})]", lit)),
                ],
                wait: Duration::ZERO,
            });
        } else {
            strategies.push(PlannedStrategy {
                name: "exact_text",
                description: format!("Exact text: {}", text),
                locators: vec![
                    Locator::xpath(format!("//*[@name={}]", lit)),
                    Locator::xpath(format!("//*[@label={}]", lit)),
                    Locator::xpath(format!("//*[@value={}]", lit)),
                    Locator::xpath(format!("//*[text()={}]", lit)),
                ],
                wait: Duration::ZERO,
            });
        }

        if let Some(ref class) = class {
            strategies.push(PlannedStrategy {
                name: "type_with_text",
                description: format!("{} with text: {}", query.element_type.as_str(), text),
                locators: vec![
                    Locator::xpath(format!("//{}[@name={}]", class, lit)),
                    Locator::xpath(format!("//{}[@label={}]", class, lit)),
                    Locator::xpath(format!("//{}[contains(@name, {})]", class, lit)),
                    Locator::xpath(format!("//*[@type='{}'][@name={}]", class, lit)),
                ],
                wait: Duration::ZERO,
            });
        }
    }

    if let Some(xpath) = non_empty(&query.xpath) {
        strategies.push(PlannedStrategy {
            name: "xpath",
            description: format!("XPath: {}", xpath),
            locators: vec![Locator::xpath(xpath)],
            wait: query.timeout.min(XPATH_WAIT),
        });
    }

    if let (Some(class), None) = (class, &text) {
        strategies.push(PlannedStrategy {
            name: "element_type",
            description: format!("First {} element", query.element_type.as_str()),
            locators: vec![
                Locator::xpath(format!("//{}", class)),
                Locator::xpath(format!("//*[@type='{}']", class)),
            ],
            wait: Duration::ZERO,
        });
    }

    strategies
}

/// Record of one strategy that did not produce an element.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyAttempt {
    /// Strategy name.
    pub strategy: &'static str,
    /// Strategy description.
    pub description: String,
    /// Finder error, if the strategy failed rather than found nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Element found by the chain.
#[derive(Debug, Clone, Serialize)]
pub struct Located {
    /// Element handle.
    pub element: ElementRef,
    /// Winning strategy.
    pub strategy: &'static str,
    /// Winning strategy description.
    pub description: String,
    /// Locator that matched.
    pub locator: Locator,
}

/// Outcome of walking the chain.
#[derive(Debug, Clone, Serialize)]
pub struct LocateOutcome {
    /// The element, when any strategy matched.
    pub found: Option<Located>,
    /// Strategies that ran without matching.
    pub attempts: Vec<StrategyAttempt>,
}

/// Try each strategy in order and return the first match.
pub async fn locate<F>(finder: &F, strategies: &[PlannedStrategy]) -> LocateOutcome
where
    F: ElementFinder + ?Sized,
{
    let mut attempts = Vec::new();

    for (index, strategy) in strategies.iter().enumerate() {
        tracing::debug!(
            strategy = strategy.name,
            "Strategy {}: {}",
            index + 1,
            strategy.description
        );
        let mut error = None;
        for locator in &strategy.locators {
            match finder.find(locator, strategy.wait).await {
                Ok(Some(element)) => {
                    tracing::info!(strategy = strategy.name, %locator, "Element found");
                    return LocateOutcome {
                        found: Some(Located {
                            element,
                            strategy: strategy.name,
                            description: strategy.description.clone(),
                            locator: locator.clone(),
                        }),
                        attempts,
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(strategy = strategy.name, %locator, "Strategy failed: {}", e);
                    error = Some(e.to_string());
                    break;
                }
            }
        }
        attempts.push(StrategyAttempt {
            strategy: strategy.name,
            description: strategy.description.clone(),
            error,
        });
    }

    LocateOutcome {
        found: None,
        attempts,
    }
}

/// Result of the dismiss step.
#[derive(Debug, Clone, Serialize)]
pub struct DismissOutcome {
    /// Whether something was tapped.
    pub dismissed: bool,
    /// What was tapped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Try to close a modal or pop a navigation level.
pub async fn dismiss<F>(finder: &F, button_text: Option<&str>) -> DismissOutcome
where
    F: ElementFinder + ?Sized,
{
    let texts: Vec<&str> = match button_text.filter(|t| !t.is_empty()) {
        Some(text) => vec![text],
        None => DEFAULT_DISMISS_TEXTS.to_vec(),
    };

    for text in texts {
        let lit = xpath_literal(text);
        let candidates = [
            Locator::xpath(format!("//*[@name={}]", lit)),
            Locator::xpath(format!("//XCUIElementTypeButton[@name={}]", lit)),
            Locator::xpath(format!("//*[contains(@name, {})]", lit)),
            Locator::accessibility_id(text),
        ];
        if try_tap_any(finder, &candidates).await {
            tracing::info!("Dismissed using '{}' button", text);
            return DismissOutcome {
                dismissed: true,
                method: Some(format!("'{}' button", text)),
            };
        }
    }

    let back: Vec<Locator> = NAVIGATION_BACK.iter().map(|x| Locator::xpath(*x)).collect();
    if try_tap_any(finder, &back).await {
        tracing::info!("Dismissed using navigation back button");
        return DismissOutcome {
            dismissed: true,
            method: Some("navigation back button".into()),
        };
    }

    tracing::warn!("Could not find dismiss button; modal may still be open");
    DismissOutcome {
        dismissed: false,
        method: None,
    }
}

async fn try_tap_any<F>(finder: &F, locators: &[Locator]) -> bool
where
    F: ElementFinder + ?Sized,
{
    for locator in locators {
        if let Ok(Some(element)) = finder.find(locator, Duration::ZERO).await {
            if finder.tap(&element).await.is_ok() {
                return true;
            }
        }
    }
    false
}

/// Up to `limit` on-screen elements as `type: 'name'` strings.
pub async fn visible_elements<F>(finder: &F, limit: usize) -> Vec<String>
where
    F: ElementFinder + ?Sized,
{
    let locator = Locator::xpath("//*[@name or @label or @value]");
    let elements = match finder.find_all(&locator).await {
        Ok(elements) => elements,
        Err(e) => {
            tracing::debug!("Could not list visible elements: {}", e);
            return Vec::new();
        }
    };

    let mut described = Vec::new();
    for element in elements.iter().take(limit) {
        let kind = finder
            .attribute(element, "type")
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| "Unknown".into());
        let mut name = None;
        for attr in ["name", "label", "value"] {
            if let Ok(Some(v)) = finder.attribute(element, attr).await {
                if !v.is_empty() {
                    name = Some(v);
                    break;
                }
            }
        }
        described.push(format!("{}: '{}'", kind, name.unwrap_or_default()));
    }
    described
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(strategies: &[PlannedStrategy]) -> Vec<&'static str> {
        strategies.iter().map(|s| s.name).collect()
    }

    #[test]
    fn class_names_capitalize_first_letter_only() {
        assert_eq!(
            ElementType::StaticText.class_name().as_deref(),
            Some("XCUIElementTypeStaticText")
        );
        assert_eq!(
            ElementType::Button.class_name().as_deref(),
            Some("XCUIElementTypeButton")
        );
        assert_eq!(ElementType::Any.class_name(), None);
    }

    #[test]
    fn element_type_parsing() {
        assert_eq!("searchField".parse::<ElementType>().unwrap(), ElementType::SearchField);
        let err = "widget".parse::<ElementType>().unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(ElementType::ALL.len(), 24);
    }

    #[test]
    fn empty_query_is_rejected() {
        let query = ElementQuery {
            text: Some(String::new()),
            ..ElementQuery::default()
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn full_plan_order() {
        let query = ElementQuery {
            accessibility_id: Some("login".into()),
            text: Some("Log In".into()),
            xpath: Some("//XCUIElementTypeButton".into()),
            element_type: ElementType::Button,
            timeout: Duration::from_secs(10),
            ..ElementQuery::default()
        };
        let plan = plan(&query);
        assert_eq!(
            names(&plan),
            vec!["accessibility_id", "exact_text", "type_with_text", "xpath"]
        );
        assert_eq!(plan[0].wait, Duration::from_secs(10));
        assert_eq!(plan[3].wait, XPATH_WAIT);
        assert_eq!(plan[1].locators[0].value, "//*[@name='Log In']");
        assert_eq!(
            plan[2].locators[0].value,
            "//XCUIElementTypeButton[@name='Log In']"
        );
    }

    #[test]
    fn partial_match_replaces_exact() {
        let query = ElementQuery {
            text: Some("Sett".into()),
            partial_match: true,
            ..ElementQuery::default()
        };
        let plan = plan(&query);
        assert_eq!(names(&plan), vec!["partial_text"]);
        assert_eq!(plan[0].locators[0].value, "//*[contains(@name, 'Sett')]");
    }

    #[test]
    fn type_only_when_no_text() {
        let query = ElementQuery {
            xpath: Some("//foo".into()),
            element_type: ElementType::Switch,
            timeout: Duration::from_secs(2),
            ..ElementQuery::default()
        };
        let plan = plan(&query);
        assert_eq!(names(&plan), vec!["xpath", "element_type"]);
        assert_eq!(plan[0].wait, Duration::from_secs(2));
        assert_eq!(plan[1].locators[0].value, "//XCUIElementTypeSwitch");
    }
}
