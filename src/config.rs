//! Layered application configuration.
//!
//! Defaults < optional `fiscobot.toml` < `FISCOBOT_*` environment
//! variables. Everything ends up in one explicit [`AppConfig`] passed into
//! the engine at task construction; there is no process-wide state.

use std::path::{Path, PathBuf};

use anyhow::Context;
use cdp_driver::CdpConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ui_actions::ActionConfig;

/// Browser attachment/launch settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    /// DevTools websocket of an already-open browser.
    pub ws_url: Option<String>,
    pub executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: false,
            ws_url: None,
            executable: None,
            user_data_dir: None,
        }
    }
}

/// Engine-wide timeouts and bounds, in milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub resolve_timeout_ms: u64,
    pub native_click_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// The long manual-login window.
    pub login_timeout_ms: u64,
    pub download_timeout_ms: u64,
    pub step_timeout_ms: u64,
    pub max_pages: u32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: 50_000,
            native_click_timeout_ms: 4_000,
            poll_interval_ms: 250,
            login_timeout_ms: 600_000,
            download_timeout_ms: 420_000,
            step_timeout_ms: 900_000,
            max_pages: 50,
        }
    }
}

impl EngineSection {
    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

/// FSist monitor portal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FsistSection {
    pub url: String,
    pub zip_prefix: String,
    pub xlsx_prefix: String,
    /// Base name of the fixed outputs (folder, spreadsheet, screenshot).
    pub final_label: String,
}

impl Default for FsistSection {
    fn default() -> Self {
        Self {
            url: "https://www.fsist.com.br/usuario/monitor-de-notas".to_string(),
            zip_prefix: "FSist XMLs N".to_string(),
            xlsx_prefix: "FSist-NFe-Todas--".to_string(),
            final_label: "FSist-NFe entradas-Todas".to_string(),
        }
    }
}

/// NFS-e Nacional portal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NfseNacionalSection {
    pub login_url: String,
    pub home_url: String,
    pub home_path: String,
    pub emitidas_href: String,
    pub recebidas_href: String,
}

impl Default for NfseNacionalSection {
    fn default() -> Self {
        Self {
            login_url: "https://www.nfse.gov.br/EmissorNacional/Login?ReturnUrl=%2fEmissorNacional"
                .to_string(),
            home_url: "https://www.nfse.gov.br/EmissorNacional".to_string(),
            home_path: "/EmissorNacional".to_string(),
            emitidas_href: "/EmissorNacional/Notas/Emitidas".to_string(),
            recebidas_href: "/EmissorNacional/Notas/Recebidas".to_string(),
        }
    }
}

/// Osasco NFS-e portal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OsascoSection {
    pub login_url: String,
}

impl Default for OsascoSection {
    fn default() -> Self {
        Self {
            login_url: "https://nfe.osasco.sp.gov.br/EissnfeWebApp/Portal/Default.aspx?ReturnUrl=%2fEissnfeWebApp%2fSistema%2fGeral%2fLogin.aspx".to_string(),
        }
    }
}

/// Per-portal selector-table configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalsSection {
    pub fsist: FsistSection,
    pub nfse_nacional: NfseNacionalSection,
    pub osasco: OsascoSection,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Download rendezvous directory; defaults to the user's Downloads.
    pub download_dir: Option<PathBuf>,
    /// Where run logs and row CSVs land; defaults to the download dir.
    pub report_dir: Option<PathBuf>,
    pub browser: BrowserSection,
    pub engine: EngineSection,
    pub portals: PortalsSection,
}

impl AppConfig {
    /// Load from an optional file plus `FISCOBOT_*` environment overrides
    /// (e.g. `FISCOBOT_ENGINE__MAX_PAGES=10`).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name("fiscobot").required(false)),
        };
        builder = builder.add_source(Environment::with_prefix("FISCOBOT").separator("__"));
        let raw = builder.build().context("assembling configuration")?;
        raw.try_deserialize().context("deserializing configuration")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn report_dir(&self) -> PathBuf {
        self.report_dir.clone().unwrap_or_else(|| self.download_dir())
    }

    pub fn cdp_config(&self) -> CdpConfig {
        let mut cfg = CdpConfig {
            headless: self.browser.headless,
            websocket_url: self.browser.ws_url.clone(),
            ..CdpConfig::default()
        };
        if let Some(executable) = &self.browser.executable {
            cfg.executable = executable.clone();
        }
        if let Some(user_data_dir) = &self.browser.user_data_dir {
            cfg.user_data_dir = user_data_dir.clone();
        }
        cfg
    }

    pub fn action_config(&self) -> ActionConfig {
        ActionConfig {
            resolve_timeout: Duration::from_millis(self.engine.resolve_timeout_ms),
            native_click_timeout: Duration::from_millis(self.engine.native_click_timeout_ms),
            poll_interval: Duration::from_millis(self.engine.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_portal_constants() {
        let cfg = AppConfig::default();
        assert!(cfg.portals.fsist.url.contains("fsist.com.br"));
        assert_eq!(cfg.portals.fsist.zip_prefix, "FSist XMLs N");
        assert!(cfg.portals.nfse_nacional.emitidas_href.ends_with("/Emitidas"));
        assert_eq!(cfg.engine.max_pages, 50);
        assert!(!cfg.browser.headless);
    }

    #[test]
    fn report_dir_falls_back_to_download_dir() {
        let cfg = AppConfig {
            download_dir: Some(PathBuf::from("/tmp/dl")),
            ..AppConfig::default()
        };
        assert_eq!(cfg.report_dir(), PathBuf::from("/tmp/dl"));
    }
}
