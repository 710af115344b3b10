//! Locator vocabulary.

use std::fmt;

use cdp_driver::Strategy;
use serde::{Deserialize, Serialize};

/// One element-location strategy plus its selector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: Strategy,
    pub selector: String,
}

impl Locator {
    pub fn new(strategy: Strategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
        }
    }

    pub fn id(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Id, selector)
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Css, selector)
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, selector)
    }

    pub fn link_text(selector: impl Into<String>) -> Self {
        Self::new(Strategy::LinkText, selector)
    }

    pub fn partial_link_text(selector: impl Into<String>) -> Self {
        Self::new(Strategy::PartialLinkText, selector)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.selector)
    }
}

/// Ordered fallback chain for one logical control.
///
/// Evaluated in order; the first candidate that matches wins and the rest
/// are never tried. Exhausting the list is a resolution failure. Callers
/// must not assume which alternative matched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorList {
    candidates: Vec<Locator>,
}

impl LocatorList {
    pub fn of(candidates: Vec<Locator>) -> Self {
        Self { candidates }
    }

    pub fn single(locator: Locator) -> Self {
        Self {
            candidates: vec![locator],
        }
    }

    pub fn candidates(&self) -> &[Locator] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl From<Locator> for LocatorList {
    fn from(locator: Locator) -> Self {
        Self::single(locator)
    }
}

impl fmt::Display for LocatorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for candidate in &self.candidates {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{candidate}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_candidates() {
        let list = LocatorList::of(vec![
            Locator::id("butDownload"),
            Locator::xpath("//button[contains(., 'Download')]"),
        ]);
        assert_eq!(
            list.to_string(),
            "id=butDownload | xpath=//button[contains(., 'Download')]"
        );
    }
}
