//! The driver boundary: the browser control protocol the engine is built
//! against, plus the CDP-backed implementation.

use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::CdpConfig;
use crate::error::{DriverError, DriverErrorKind, DriverResult};
use crate::js;
use crate::transport::{CdpTransport, CommandTarget};
use crate::types::{ElementHandle, FrameRef, SelectChoice, SelectOption, Strategy, WindowHandle};

/// Browser control protocol surface.
///
/// One implementor per session; all calls address the active window and the
/// active frame scope. Implementations are driven from a single logical
/// thread of control; interior mutability only tracks the navigational
/// context (active window, frame scope).
#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> DriverResult<()>;
    async fn current_url(&self) -> DriverResult<String>;

    /// All elements matching `(strategy, selector)` in the active scope.
    async fn query(&self, strategy: Strategy, selector: &str)
        -> DriverResult<Vec<ElementHandle>>;

    /// All matches underneath an already-resolved element.
    async fn query_within(
        &self,
        parent: &ElementHandle,
        strategy: Strategy,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>>;

    /// Click through synthesized input events at the element center.
    async fn click_native(&self, el: &ElementHandle) -> DriverResult<()>;

    /// Click through script dispatch (`el.click()`), the fallback for
    /// controls a native click cannot reach.
    async fn click_script(&self, el: &ElementHandle) -> DriverResult<()>;

    async fn type_text(
        &self,
        el: &ElementHandle,
        text: &str,
        clear_first: bool,
    ) -> DriverResult<()>;

    async fn read_text(&self, el: &ElementHandle) -> DriverResult<String>;
    async fn attribute(&self, el: &ElementHandle, name: &str) -> DriverResult<Option<String>>;
    async fn is_displayed(&self, el: &ElementHandle) -> DriverResult<bool>;
    async fn is_enabled(&self, el: &ElementHandle) -> DriverResult<bool>;
    async fn scroll_into_view(&self, el: &ElementHandle) -> DriverResult<()>;

    async fn select_options(&self, el: &ElementHandle) -> DriverResult<Vec<SelectOption>>;

    /// Pick an option; `false` means nothing matched the choice.
    async fn select_option(&self, el: &ElementHandle, choice: &SelectChoice)
        -> DriverResult<bool>;

    async fn evaluate(&self, expression: &str) -> DriverResult<Value>;

    /// Forcibly remove every node matching `css` from the scoped document.
    /// Last-resort overlay clearance; returns how many nodes went away.
    async fn remove_matching_nodes(&self, css: &str) -> DriverResult<u64>;

    async fn screenshot(&self, path: &Path) -> DriverResult<()>;
    async fn print_to_pdf(&self, path: &Path) -> DriverResult<()>;

    async fn window_handles(&self) -> DriverResult<Vec<WindowHandle>>;
    async fn active_window(&self) -> DriverResult<WindowHandle>;
    async fn switch_window(&self, window: &WindowHandle) -> DriverResult<()>;
    async fn close_window(&self, window: &WindowHandle) -> DriverResult<()>;

    /// Iframes of the active window's top document.
    async fn list_frames(&self) -> DriverResult<Vec<FrameRef>>;
    async fn enter_frame(&self, frame: &FrameRef) -> DriverResult<()>;
    async fn reset_frame(&self) -> DriverResult<()>;
    async fn current_frame(&self) -> DriverResult<Option<FrameRef>>;

    /// Point browser-initiated downloads at `dir` with auto-accept.
    async fn set_download_dir(&self, dir: &Path) -> DriverResult<()>;
}

/// CDP-backed driver. Windows are page targets, frames are same-origin
/// iframes addressed by synthesized selectors.
pub struct CdpDriver {
    transport: CdpTransport,
    /// target id -> attached session id
    sessions: DashMap<String, String>,
    active: Mutex<Option<String>>,
    frame: Mutex<Option<String>>,
}

impl CdpDriver {
    /// Connect per `cfg` and adopt (or create) an initial page target.
    pub async fn connect(cfg: &CdpConfig) -> DriverResult<Self> {
        let transport = CdpTransport::connect(cfg).await?;
        let driver = Self {
            transport,
            sessions: DashMap::new(),
            active: Mutex::new(None),
            frame: Mutex::new(None),
        };

        let mut pages = driver.page_targets().await?;
        let target = match pages.pop() {
            Some(target) => target,
            None => driver.create_page("about:blank").await?,
        };
        driver.attach(&target).await?;
        *driver.active.lock().await = Some(target);
        Ok(driver)
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    async fn page_targets(&self) -> DriverResult<Vec<String>> {
        let response = self
            .transport
            .send(CommandTarget::Browser, "Target.getTargets", json!({}))
            .await?;
        let infos = response
            .get("targetInfos")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                DriverError::new(DriverErrorKind::Internal)
                    .with_hint("Target.getTargets returned no targetInfos")
            })?;
        Ok(infos
            .iter()
            .filter(|info| info.get("type").and_then(|t| t.as_str()) == Some("page"))
            .filter_map(|info| info.get("targetId").and_then(|t| t.as_str()))
            .map(|id| id.to_string())
            .collect())
    }

    async fn create_page(&self, url: &str) -> DriverResult<String> {
        let response = self
            .transport
            .send(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": url }),
            )
            .await?;
        response
            .get("targetId")
            .and_then(|t| t.as_str())
            .map(|id| id.to_string())
            .ok_or_else(|| {
                DriverError::new(DriverErrorKind::Internal)
                    .with_hint("Target.createTarget returned no targetId")
            })
    }

    async fn attach(&self, target: &str) -> DriverResult<String> {
        if let Some(session) = self.sessions.get(target) {
            return Ok(session.value().clone());
        }
        let response = self
            .transport
            .send(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target, "flatten": true }),
            )
            .await?;
        let session = response
            .get("sessionId")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                DriverError::new(DriverErrorKind::Internal)
                    .with_hint("Target.attachToTarget returned no sessionId")
            })?;
        self.sessions.insert(target.to_string(), session.clone());
        Ok(session)
    }

    async fn active_target(&self) -> DriverResult<String> {
        self.active.lock().await.clone().ok_or_else(|| {
            DriverError::new(DriverErrorKind::Internal).with_hint("no active window")
        })
    }

    async fn active_session(&self) -> DriverResult<String> {
        let target = self.active_target().await?;
        self.attach(&target).await
    }

    async fn send_page(&self, method: &str, params: Value) -> DriverResult<Value> {
        let session = self.active_session().await?;
        self.transport
            .send(CommandTarget::Session(session), method, params)
            .await
    }

    /// Evaluate an expression in the active page, returning the plain value.
    async fn eval(&self, expression: &str) -> DriverResult<Value> {
        let response = self
            .send_page(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or("script exception");
            return Err(DriverError::new(DriverErrorKind::Internal)
                .with_hint(format!("evaluate failed: {text}")));
        }
        Ok(response
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Run a handle-scoped script body and unwrap its status envelope.
    async fn handle_op(&self, el: &ElementHandle, body: &str) -> DriverResult<Value> {
        let script = js::handle_script(el.frame.as_deref(), &el.id, body);
        let value = self.eval(&script).await?;
        interpret_status(value, el)
    }

    async fn frame_scope(&self) -> Option<String> {
        self.frame.lock().await.clone()
    }
}

/// Map the `{ status, value }` envelope of handle-scoped scripts.
fn interpret_status(value: Value, el: &ElementHandle) -> DriverResult<Value> {
    match value.get("status").and_then(|s| s.as_str()) {
        Some("ok") => Ok(value.get("value").cloned().unwrap_or(Value::Null)),
        Some("stale") => Err(DriverError::new(DriverErrorKind::StaleHandle)
            .with_hint(format!("element {el} left the document"))),
        Some("no-frame") => Err(DriverError::new(DriverErrorKind::TargetNotFound)
            .with_hint(format!("frame of element {el} is gone"))),
        _ => Err(DriverError::new(DriverErrorKind::Internal)
            .with_hint("handle script returned no status")),
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        *self.frame.lock().await = None;
        self.send_page("Page.navigate", json!({ "url": url })).await?;
        debug!(target: "cdp-driver", url, "navigated");
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let target = self.active_target().await?;
        let response = self
            .transport
            .send(
                CommandTarget::Browser,
                "Target.getTargetInfo",
                json!({ "targetId": target }),
            )
            .await?;
        response
            .get("targetInfo")
            .and_then(|info| info.get("url"))
            .and_then(|url| url.as_str())
            .map(|url| url.to_string())
            .ok_or_else(|| {
                DriverError::new(DriverErrorKind::Internal)
                    .with_hint("Target.getTargetInfo returned no url")
            })
    }

    async fn query(
        &self,
        strategy: Strategy,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>> {
        let frame = self.frame_scope().await;
        let script = js::query_script(frame.as_deref(), strategy, selector);
        let value = self.eval(&script).await?;
        let entries = value.as_array().cloned().unwrap_or_default();
        Ok(entries
            .iter()
            .filter_map(|entry| entry.get("handle").and_then(|h| h.as_str()))
            .map(|id| ElementHandle {
                id: id.to_string(),
                frame: frame.clone(),
            })
            .collect())
    }

    async fn query_within(
        &self,
        parent: &ElementHandle,
        strategy: Strategy,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>> {
        let script =
            js::query_within_script(parent.frame.as_deref(), &parent.id, strategy, selector);
        let value = self.eval(&script).await?;
        let ids = interpret_status(value, parent)?;
        Ok(ids
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|id| id.as_str())
            .map(|id| ElementHandle {
                id: id.to_string(),
                frame: parent.frame.clone(),
            })
            .collect())
    }

    async fn click_native(&self, el: &ElementHandle) -> DriverResult<()> {
        let value = self.handle_op(el, js::CENTER_BODY).await?;
        let visible = value
            .get("visible")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !visible {
            return Err(DriverError::new(DriverErrorKind::NotInteractable)
                .with_hint(format!("element {el} is not visible"))
                .retriable(true));
        }
        let x = value.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let y = value.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);

        for phase in ["mousePressed", "mouseReleased"] {
            self.send_page(
                "Input.dispatchMouseEvent",
                json!({
                    "type": phase,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "buttons": 1,
                    "clickCount": 1,
                    "pointerType": "mouse",
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn click_script(&self, el: &ElementHandle) -> DriverResult<()> {
        self.handle_op(el, js::CLICK_BODY).await.map(|_| ())
    }

    async fn type_text(
        &self,
        el: &ElementHandle,
        text: &str,
        clear_first: bool,
    ) -> DriverResult<()> {
        self.handle_op(el, js::focus_body(clear_first)).await?;
        self.send_page("Input.insertText", json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn read_text(&self, el: &ElementHandle) -> DriverResult<String> {
        let value = self.handle_op(el, js::TEXT_BODY).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, el: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let value = self.handle_op(el, &js::attribute_body(name)).await?;
        Ok(value.as_str().map(|s| s.to_string()))
    }

    async fn is_displayed(&self, el: &ElementHandle) -> DriverResult<bool> {
        let value = self.handle_op(el, js::DISPLAYED_BODY).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, el: &ElementHandle) -> DriverResult<bool> {
        let value = self.handle_op(el, js::ENABLED_BODY).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn scroll_into_view(&self, el: &ElementHandle) -> DriverResult<()> {
        self.handle_op(el, js::SCROLL_BODY).await.map(|_| ())
    }

    async fn select_options(&self, el: &ElementHandle) -> DriverResult<Vec<SelectOption>> {
        let value = self.handle_op(el, js::OPTIONS_BODY).await?;
        serde_json::from_value(value).map_err(|err| {
            DriverError::new(DriverErrorKind::Internal)
                .with_hint(format!("malformed option list: {err}"))
        })
    }

    async fn select_option(
        &self,
        el: &ElementHandle,
        choice: &SelectChoice,
    ) -> DriverResult<bool> {
        let value = self.handle_op(el, &js::select_body(choice)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        self.eval(expression).await
    }

    async fn remove_matching_nodes(&self, css: &str) -> DriverResult<u64> {
        let frame = self.frame_scope().await;
        let script = js::remove_nodes_script(frame.as_deref(), css);
        let value = self.eval(&script).await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        let response = self
            .send_page("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        write_base64_payload(&response, "data", path).await
    }

    async fn print_to_pdf(&self, path: &Path) -> DriverResult<()> {
        let response = self
            .send_page("Page.printToPDF", json!({ "printBackground": true }))
            .await?;
        write_base64_payload(&response, "data", path).await
    }

    async fn window_handles(&self) -> DriverResult<Vec<WindowHandle>> {
        Ok(self
            .page_targets()
            .await?
            .into_iter()
            .map(WindowHandle)
            .collect())
    }

    async fn active_window(&self) -> DriverResult<WindowHandle> {
        self.active_target().await.map(WindowHandle)
    }

    async fn switch_window(&self, window: &WindowHandle) -> DriverResult<()> {
        self.attach(&window.0).await?;
        *self.active.lock().await = Some(window.0.clone());
        *self.frame.lock().await = None;
        self.transport
            .send(
                CommandTarget::Browser,
                "Target.activateTarget",
                json!({ "targetId": window.0 }),
            )
            .await?;
        info!(target: "cdp-driver", window = %window, "switched window");
        Ok(())
    }

    async fn close_window(&self, window: &WindowHandle) -> DriverResult<()> {
        self.transport
            .send(
                CommandTarget::Browser,
                "Target.closeTarget",
                json!({ "targetId": window.0 }),
            )
            .await?;
        self.sessions.remove(&window.0);
        let mut active = self.active.lock().await;
        if active.as_deref() == Some(window.0.as_str()) {
            *active = None;
        }
        Ok(())
    }

    async fn list_frames(&self) -> DriverResult<Vec<FrameRef>> {
        let value = self.eval(js::TAG_FRAMES_SCRIPT).await?;
        Ok(value
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|sel| sel.as_str())
            .map(FrameRef::new)
            .collect())
    }

    async fn enter_frame(&self, frame: &FrameRef) -> DriverResult<()> {
        *self.frame.lock().await = None;
        let matches = self.query(Strategy::Css, &frame.selector).await?;
        if matches.is_empty() {
            return Err(DriverError::new(DriverErrorKind::TargetNotFound)
                .with_hint(format!("no iframe matches '{}'", frame.selector)));
        }
        *self.frame.lock().await = Some(frame.selector.clone());
        Ok(())
    }

    async fn reset_frame(&self) -> DriverResult<()> {
        *self.frame.lock().await = None;
        Ok(())
    }

    async fn current_frame(&self) -> DriverResult<Option<FrameRef>> {
        Ok(self.frame.lock().await.clone().map(FrameRef::new))
    }

    async fn set_download_dir(&self, dir: &Path) -> DriverResult<()> {
        self.transport
            .send(
                CommandTarget::Browser,
                "Browser.setDownloadBehavior",
                json!({
                    "behavior": "allow",
                    "downloadPath": dir.to_string_lossy(),
                }),
            )
            .await?;
        Ok(())
    }
}

async fn write_base64_payload(response: &Value, field: &str, path: &Path) -> DriverResult<()> {
    let data = response
        .get(field)
        .and_then(|d| d.as_str())
        .ok_or_else(|| {
            DriverError::new(DriverErrorKind::Internal)
                .with_hint(format!("response missing '{field}' payload"))
        })?;
    let bytes = Base64.decode(data).map_err(|err| {
        DriverError::new(DriverErrorKind::Internal)
            .with_hint(format!("payload is not valid base64: {err}"))
    })?;
    tokio::fs::write(path, bytes).await.map_err(|err| {
        DriverError::new(DriverErrorKind::Internal)
            .with_hint(format!("failed to write {}: {err}", path.display()))
    })
}
