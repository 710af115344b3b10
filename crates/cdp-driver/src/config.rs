//! Driver configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use which::which;

/// Configuration for attaching to or launching a Chromium instance.
///
/// The engine normally attaches to an already-open interactive browser via
/// `websocket_url` (the operator logs in by hand); launching a fresh
/// instance is the fallback for unattended sessions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CdpConfig {
    /// Chromium executable; empty means auto-detect on PATH.
    pub executable: PathBuf,
    /// Profile directory for launched instances.
    pub user_data_dir: PathBuf,
    /// Headless launch. Interactive login flows need a headed browser.
    pub headless: bool,
    /// DevTools websocket of a running browser to attach to instead of
    /// launching.
    pub websocket_url: Option<String>,
    /// Per-command deadline in milliseconds.
    pub default_deadline_ms: u64,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: PathBuf::from(".fiscobot-profile"),
            headless: false,
            websocket_url: None,
            default_deadline_ms: 30_000,
        }
    }
}

/// Locate a Chromium-family executable on PATH.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    const CANDIDATES: [&str; 5] = [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
    ];
    CANDIDATES
        .iter()
        .find_map(|candidate| which(candidate).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_headed_with_sane_deadline() {
        let cfg = CdpConfig::default();
        assert!(!cfg.headless);
        assert_eq!(cfg.default_deadline_ms, 30_000);
        assert!(cfg.websocket_url.is_none());
    }
}
