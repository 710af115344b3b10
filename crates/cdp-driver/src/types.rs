//! Wire-level vocabulary of the driver boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element-location strategy, mirroring what the portals actually use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Match by element id attribute.
    Id,
    /// CSS selector.
    Css,
    /// XPath expression.
    XPath,
    /// Anchor whose trimmed text equals the needle.
    LinkText,
    /// Anchor whose trimmed text contains the needle.
    PartialLinkText,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::Css => "css",
            Strategy::XPath => "xpath",
            Strategy::LinkText => "link-text",
            Strategy::PartialLinkText => "partial-link-text",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque reference to an element registered on the page side.
///
/// A handle is only valid in the window it was resolved in; `frame` records
/// the iframe scope active at query time so later operations address the
/// same document. A handle whose page-side node disappeared surfaces as
/// [`DriverErrorKind::StaleHandle`](crate::error::DriverErrorKind).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: String,
    pub frame: Option<String>,
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.frame {
            Some(frame) => write!(f, "{}@{}", self.id, frame),
            None => f.write_str(&self.id),
        }
    }
}

/// One browser window/tab.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub String);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One iframe of the active window, addressed by a synthesized CSS selector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRef {
    pub selector: String,
}

impl FrameRef {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

impl fmt::Display for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.selector)
    }
}

/// One `<option>` of a `<select>` control.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub index: usize,
    pub value: String,
    pub text: String,
    pub selected: bool,
}

/// How to pick an option out of a `<select>` control.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectChoice {
    Index(usize),
    Value(String),
}
