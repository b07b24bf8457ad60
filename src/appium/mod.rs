//! Appium (XCUITest) automation over the W3C WebDriver protocol.

pub mod client;
pub mod locator;
pub mod strategy;
pub mod webdriver;

pub use client::{AppiumClient, FindAndTapOutcome, FindAndTapRequest, TapTypeOutcome};
pub use locator::{xpath_literal, Locator, Using};
pub use strategy::{ElementFinder, ElementQuery, ElementType, PlannedStrategy};
pub use webdriver::{ElementRef, Session, WebDriverClient};
