//! Scripted in-memory driver.
//!
//! Backs every engine test that would otherwise need a live browser. The
//! model is deliberately simple: a flat element arena tagged with window,
//! frame and parent; queries match by configured `(strategy, selector)`
//! pairs (anchors also match link-text strategies by their text); click
//! effects mutate the scripted state. Navigation does not unload elements;
//! tests remove them explicitly when that matters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::driver::Driver;
use crate::error::{DriverError, DriverErrorKind, DriverResult};
use crate::types::{ElementHandle, FrameRef, SelectChoice, SelectOption, Strategy, WindowHandle};

/// Scripted consequence of clicking an element.
#[derive(Clone, Debug)]
pub enum FakeEffect {
    /// Change the active window's URL.
    SetUrl(String),
    /// Spawn a new window/tab.
    OpenWindow { handle: String, url: String },
    /// Make a previously hidden/pending element matchable and visible.
    Reveal(usize),
    /// Remove an element from the document.
    RemoveElement(usize),
    /// Remove the clicked element itself.
    RemoveSelf,
    /// Increment a named counter, for assertions.
    Count(String),
    /// Drop a file on disk, simulating a browser download landing.
    WriteFile { path: PathBuf, bytes: Vec<u8> },
    /// Rename a file on disk, simulating a download being finalized.
    RenameFile { from: PathBuf, to: PathBuf },
}

/// One scripted element.
#[derive(Clone, Debug)]
pub struct FakeElement {
    pub window: usize,
    pub frame: Option<String>,
    pub parent: Option<usize>,
    pub matchers: Vec<(Strategy, String)>,
    pub is_anchor: bool,
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub displayed: bool,
    pub enabled: bool,
    pub removed: bool,
    pub remaining_polls: u32,
    pub native_click_works: bool,
    pub options: Vec<SelectOption>,
    pub on_click: Vec<FakeEffect>,
}

impl Default for FakeElement {
    fn default() -> Self {
        Self {
            window: 0,
            frame: None,
            parent: None,
            matchers: Vec::new(),
            is_anchor: false,
            text: String::new(),
            attributes: HashMap::new(),
            displayed: true,
            enabled: true,
            removed: false,
            remaining_polls: 0,
            native_click_works: true,
            options: Vec::new(),
            on_click: Vec::new(),
        }
    }
}

impl FakeElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn in_frame(mut self, selector: impl Into<String>) -> Self {
        self.frame = Some(selector.into());
        self
    }

    pub fn child_of(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn matcher(mut self, strategy: Strategy, selector: impl Into<String>) -> Self {
        self.matchers.push((strategy, selector.into()));
        self
    }

    pub fn by_css(self, selector: impl Into<String>) -> Self {
        self.matcher(Strategy::Css, selector)
    }

    pub fn by_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.attributes.insert("id".to_string(), id.clone());
        self.matcher(Strategy::Id, id)
    }

    pub fn by_xpath(self, expr: impl Into<String>) -> Self {
        self.matcher(Strategy::XPath, expr)
    }

    /// Anchor elements also match the link-text strategies by their text.
    pub fn anchor(mut self, text: impl Into<String>) -> Self {
        self.is_anchor = true;
        self.text = text.into();
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Absorb this many matching queries before becoming resolvable.
    pub fn appears_after(mut self, polls: u32) -> Self {
        self.remaining_polls = polls;
        self
    }

    pub fn native_click_fails(mut self) -> Self {
        self.native_click_works = false;
        self
    }

    pub fn option(mut self, value: impl Into<String>, text: impl Into<String>) -> Self {
        let index = self.options.len();
        self.options.push(SelectOption {
            index,
            value: value.into(),
            text: text.into(),
            selected: index == 0,
        });
        self
    }

    pub fn on_click(mut self, effect: FakeEffect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn matches(&self, strategy: Strategy, selector: &str) -> bool {
        if self.matchers.iter().any(|(s, sel)| {
            if *s != strategy {
                return false;
            }
            // A real browser's querySelectorAll accepts comma-separated
            // selector lists; emulate that for CSS. Other strategies (e.g.
            // XPath) legitimately contain commas, so match them verbatim.
            if strategy == Strategy::Css {
                selector.split(',').any(|group| group.trim() == sel)
            } else {
                sel == selector
            }
        }) {
            return true;
        }
        match strategy {
            Strategy::LinkText => self.is_anchor && self.text.trim() == selector,
            Strategy::PartialLinkText => self.is_anchor && self.text.contains(selector),
            Strategy::Id => self
                .attributes
                .get("id")
                .is_some_and(|id| id == selector),
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
struct FakeWindow {
    handle: String,
    url: String,
    frames: Vec<String>,
    closed: bool,
}

#[derive(Default)]
struct FakeState {
    windows: Vec<FakeWindow>,
    active: Option<usize>,
    frame: Option<String>,
    elements: Vec<FakeElement>,
    counters: HashMap<String, u32>,
    evaluations: HashMap<String, Value>,
    download_dir: Option<PathBuf>,
}

/// Scripted [`Driver`] implementation.
#[derive(Clone)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::with_url("about:blank")
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        let state = FakeState {
            windows: vec![FakeWindow {
                handle: "win-0".to_string(),
                url: url.into(),
                frames: Vec::new(),
                closed: false,
            }],
            active: Some(0),
            ..FakeState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn add_window(&self, handle: impl Into<String>, url: impl Into<String>) -> usize {
        let mut state = self.lock();
        state.windows.push(FakeWindow {
            handle: handle.into(),
            url: url.into(),
            frames: Vec::new(),
            closed: false,
        });
        state.windows.len() - 1
    }

    pub fn add_frame(&self, window: usize, selector: impl Into<String>) {
        self.lock().windows[window].frames.push(selector.into());
    }

    pub fn add_element(&self, element: FakeElement) -> usize {
        let mut state = self.lock();
        state.elements.push(element);
        state.elements.len() - 1
    }

    /// Handle addressing an arena element directly, bypassing query.
    pub fn element_handle(&self, index: usize) -> ElementHandle {
        let state = self.lock();
        ElementHandle {
            id: index.to_string(),
            frame: state.elements.get(index).and_then(|el| el.frame.clone()),
        }
    }

    pub fn counter(&self, key: &str) -> u32 {
        self.lock().counters.get(key).copied().unwrap_or(0)
    }

    pub fn set_evaluation(&self, expression: impl Into<String>, value: Value) {
        self.lock().evaluations.insert(expression.into(), value);
    }

    pub fn set_url(&self, window: usize, url: impl Into<String>) {
        self.lock().windows[window].url = url.into();
    }

    pub fn reveal(&self, index: usize) {
        let mut state = self.lock();
        state.elements[index].remaining_polls = 0;
        state.elements[index].displayed = true;
    }

    pub fn remove(&self, index: usize) {
        self.lock().elements[index].removed = true;
    }

    /// Value typed into an input so far.
    pub fn typed_value(&self, index: usize) -> Option<String> {
        self.lock().elements[index].attributes.get("value").cloned()
    }

    pub fn selected_index(&self, index: usize) -> Option<usize> {
        self.lock().elements[index]
            .options
            .iter()
            .find(|opt| opt.selected)
            .map(|opt| opt.index)
    }

    pub fn download_dir(&self) -> Option<PathBuf> {
        self.lock().download_dir.clone()
    }

    fn resolve(
        state: &FakeState,
        handle: &ElementHandle,
    ) -> DriverResult<usize> {
        let index: usize = handle.id.parse().map_err(|_| {
            DriverError::new(DriverErrorKind::Internal).with_hint("malformed fake handle")
        })?;
        let element = state.elements.get(index).ok_or_else(|| {
            DriverError::new(DriverErrorKind::StaleHandle).with_hint("handle never existed")
        })?;
        if element.removed {
            return Err(DriverError::new(DriverErrorKind::StaleHandle)
                .with_hint(format!("element {index} was removed")));
        }
        if Some(element.window) != state.active {
            return Err(DriverError::new(DriverErrorKind::StaleHandle)
                .with_hint("handle belongs to another window"));
        }
        Ok(index)
    }

    fn apply_effects(state: &mut FakeState, clicked: usize) -> DriverResult<()> {
        let effects = state.elements[clicked].on_click.clone();
        for effect in effects {
            match effect {
                FakeEffect::SetUrl(url) => {
                    if let Some(active) = state.active {
                        state.windows[active].url = url;
                    }
                }
                FakeEffect::OpenWindow { handle, url } => {
                    state.windows.push(FakeWindow {
                        handle,
                        url,
                        frames: Vec::new(),
                        closed: false,
                    });
                }
                FakeEffect::Reveal(index) => {
                    state.elements[index].remaining_polls = 0;
                    state.elements[index].displayed = true;
                }
                FakeEffect::RemoveElement(index) => {
                    state.elements[index].removed = true;
                }
                FakeEffect::RemoveSelf => {
                    state.elements[clicked].removed = true;
                }
                FakeEffect::Count(key) => {
                    *state.counters.entry(key).or_insert(0) += 1;
                }
                FakeEffect::WriteFile { path, bytes } => {
                    std::fs::write(&path, bytes).map_err(|err| {
                        DriverError::new(DriverErrorKind::Internal)
                            .with_hint(format!("fake download write failed: {err}"))
                    })?;
                }
                FakeEffect::RenameFile { from, to } => {
                    std::fs::rename(&from, &to).map_err(|err| {
                        DriverError::new(DriverErrorKind::Internal)
                            .with_hint(format!("fake download rename failed: {err}"))
                    })?;
                }
            }
        }
        Ok(())
    }

    fn collect_matches(
        state: &mut FakeState,
        parent: Option<usize>,
        strategy: Strategy,
        selector: &str,
    ) -> Vec<usize> {
        let active = state.active;
        let frame = state.frame.clone();
        let mut matched = Vec::new();
        for index in 0..state.elements.len() {
            let candidate = &state.elements[index];
            if candidate.removed || Some(candidate.window) != active {
                continue;
            }
            if parent.is_none() && candidate.frame != frame {
                continue;
            }
            if let Some(parent_index) = parent {
                let mut cursor = candidate.parent;
                let mut descends = false;
                while let Some(ancestor) = cursor {
                    if ancestor == parent_index {
                        descends = true;
                        break;
                    }
                    cursor = state.elements[ancestor].parent;
                }
                if !descends {
                    continue;
                }
            }
            if !candidate.matches(strategy, selector) {
                continue;
            }
            if state.elements[index].remaining_polls > 0 {
                state.elements[index].remaining_polls -= 1;
                continue;
            }
            matched.push(index);
        }
        matched
    }

    fn handles_for(state: &FakeState, indexes: Vec<usize>) -> Vec<ElementHandle> {
        indexes
            .into_iter()
            .map(|index| ElementHandle {
                id: index.to_string(),
                frame: state.elements[index].frame.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.lock();
        state.frame = None;
        if let Some(active) = state.active {
            state.windows[active].url = url.to_string();
        }
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let state = self.lock();
        let active = state.active.ok_or_else(|| {
            DriverError::new(DriverErrorKind::Internal).with_hint("no active window")
        })?;
        Ok(state.windows[active].url.clone())
    }

    async fn query(
        &self,
        strategy: Strategy,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>> {
        let mut state = self.lock();
        let matches = Self::collect_matches(&mut state, None, strategy, selector);
        Ok(Self::handles_for(&state, matches))
    }

    async fn query_within(
        &self,
        parent: &ElementHandle,
        strategy: Strategy,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>> {
        let mut state = self.lock();
        let parent_index = Self::resolve(&state, parent)?;
        let matches = Self::collect_matches(&mut state, Some(parent_index), strategy, selector);
        Ok(Self::handles_for(&state, matches))
    }

    async fn click_native(&self, el: &ElementHandle) -> DriverResult<()> {
        let mut state = self.lock();
        let index = Self::resolve(&state, el)?;
        let element = &state.elements[index];
        if !element.displayed || !element.enabled || !element.native_click_works {
            return Err(DriverError::new(DriverErrorKind::NotInteractable)
                .with_hint(format!("element {index} rejects native clicks"))
                .retriable(true));
        }
        Self::apply_effects(&mut state, index)
    }

    async fn click_script(&self, el: &ElementHandle) -> DriverResult<()> {
        let mut state = self.lock();
        let index = Self::resolve(&state, el)?;
        Self::apply_effects(&mut state, index)
    }

    async fn type_text(
        &self,
        el: &ElementHandle,
        text: &str,
        clear_first: bool,
    ) -> DriverResult<()> {
        let mut state = self.lock();
        let index = Self::resolve(&state, el)?;
        let element = &mut state.elements[index];
        let value = element.attributes.entry("value".to_string()).or_default();
        if clear_first {
            value.clear();
        }
        value.push_str(text);
        Ok(())
    }

    async fn read_text(&self, el: &ElementHandle) -> DriverResult<String> {
        let state = self.lock();
        let index = Self::resolve(&state, el)?;
        Ok(state.elements[index].text.trim().to_string())
    }

    async fn attribute(&self, el: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let state = self.lock();
        let index = Self::resolve(&state, el)?;
        Ok(state.elements[index].attributes.get(name).cloned())
    }

    async fn is_displayed(&self, el: &ElementHandle) -> DriverResult<bool> {
        let state = self.lock();
        let index = Self::resolve(&state, el)?;
        Ok(state.elements[index].displayed)
    }

    async fn is_enabled(&self, el: &ElementHandle) -> DriverResult<bool> {
        let state = self.lock();
        let index = Self::resolve(&state, el)?;
        Ok(state.elements[index].enabled)
    }

    async fn scroll_into_view(&self, el: &ElementHandle) -> DriverResult<()> {
        let state = self.lock();
        Self::resolve(&state, el)?;
        Ok(())
    }

    async fn select_options(&self, el: &ElementHandle) -> DriverResult<Vec<SelectOption>> {
        let state = self.lock();
        let index = Self::resolve(&state, el)?;
        Ok(state.elements[index].options.clone())
    }

    async fn select_option(
        &self,
        el: &ElementHandle,
        choice: &SelectChoice,
    ) -> DriverResult<bool> {
        let mut state = self.lock();
        let index = Self::resolve(&state, el)?;
        let element = &mut state.elements[index];
        let wanted = match choice {
            SelectChoice::Index(i) => {
                if *i < element.options.len() {
                    Some(*i)
                } else {
                    None
                }
            }
            SelectChoice::Value(value) => element
                .options
                .iter()
                .find(|opt| &opt.value == value)
                .map(|opt| opt.index),
        };
        let Some(wanted) = wanted else {
            return Ok(false);
        };
        for option in &mut element.options {
            option.selected = option.index == wanted;
        }
        Ok(true)
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        Ok(self
            .lock()
            .evaluations
            .get(expression)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn remove_matching_nodes(&self, css: &str) -> DriverResult<u64> {
        let mut state = self.lock();
        let matches = Self::collect_matches(&mut state, None, Strategy::Css, css);
        let removed = matches.len() as u64;
        for index in matches {
            state.elements[index].removed = true;
        }
        Ok(removed)
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        std::fs::write(path, b"fake-png").map_err(|err| {
            DriverError::new(DriverErrorKind::Internal)
                .with_hint(format!("screenshot write failed: {err}"))
        })?;
        let mut state = self.lock();
        *state.counters.entry("screenshot".to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn print_to_pdf(&self, path: &Path) -> DriverResult<()> {
        std::fs::write(path, b"%PDF-fake").map_err(|err| {
            DriverError::new(DriverErrorKind::Internal)
                .with_hint(format!("pdf write failed: {err}"))
        })?;
        let mut state = self.lock();
        *state.counters.entry("pdf".to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn window_handles(&self) -> DriverResult<Vec<WindowHandle>> {
        Ok(self
            .lock()
            .windows
            .iter()
            .filter(|window| !window.closed)
            .map(|window| WindowHandle(window.handle.clone()))
            .collect())
    }

    async fn active_window(&self) -> DriverResult<WindowHandle> {
        let state = self.lock();
        let active = state.active.ok_or_else(|| {
            DriverError::new(DriverErrorKind::Internal).with_hint("no active window")
        })?;
        Ok(WindowHandle(state.windows[active].handle.clone()))
    }

    async fn switch_window(&self, window: &WindowHandle) -> DriverResult<()> {
        let mut state = self.lock();
        let index = state
            .windows
            .iter()
            .position(|candidate| !candidate.closed && candidate.handle == window.0)
            .ok_or_else(|| {
                DriverError::new(DriverErrorKind::TargetNotFound)
                    .with_hint(format!("no window '{}'", window.0))
            })?;
        state.active = Some(index);
        state.frame = None;
        Ok(())
    }

    async fn close_window(&self, window: &WindowHandle) -> DriverResult<()> {
        let mut state = self.lock();
        let index = state
            .windows
            .iter()
            .position(|candidate| candidate.handle == window.0)
            .ok_or_else(|| {
                DriverError::new(DriverErrorKind::TargetNotFound)
                    .with_hint(format!("no window '{}'", window.0))
            })?;
        state.windows[index].closed = true;
        if state.active == Some(index) {
            state.active = None;
        }
        Ok(())
    }

    async fn list_frames(&self) -> DriverResult<Vec<FrameRef>> {
        let state = self.lock();
        let active = state.active.ok_or_else(|| {
            DriverError::new(DriverErrorKind::Internal).with_hint("no active window")
        })?;
        Ok(state.windows[active]
            .frames
            .iter()
            .map(FrameRef::new)
            .collect())
    }

    async fn enter_frame(&self, frame: &FrameRef) -> DriverResult<()> {
        let mut state = self.lock();
        let active = state.active.ok_or_else(|| {
            DriverError::new(DriverErrorKind::Internal).with_hint("no active window")
        })?;
        if !state.windows[active].frames.contains(&frame.selector) {
            return Err(DriverError::new(DriverErrorKind::TargetNotFound)
                .with_hint(format!("no iframe matches '{}'", frame.selector)));
        }
        state.frame = Some(frame.selector.clone());
        Ok(())
    }

    async fn reset_frame(&self) -> DriverResult<()> {
        self.lock().frame = None;
        Ok(())
    }

    async fn current_frame(&self) -> DriverResult<Option<FrameRef>> {
        Ok(self.lock().frame.clone().map(FrameRef::new))
    }

    async fn set_download_dir(&self, dir: &Path) -> DriverResult<()> {
        self.lock().download_dir = Some(dir.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_respects_appears_after() {
        let fake = FakeDriver::new();
        fake.add_element(FakeElement::new().by_id("late").appears_after(2));

        assert!(fake.query(Strategy::Id, "late").await.unwrap().is_empty());
        assert!(fake.query(Strategy::Id, "late").await.unwrap().is_empty());
        assert_eq!(fake.query(Strategy::Id, "late").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn anchors_match_link_text_strategies() {
        let fake = FakeDriver::new();
        fake.add_element(FakeElement::new().anchor("Notas Fiscais"));

        assert_eq!(
            fake.query(Strategy::LinkText, "Notas Fiscais")
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            fake.query(Strategy::PartialLinkText, "Notas")
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(fake
            .query(Strategy::LinkText, "Notas")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn removed_elements_surface_as_stale() {
        let fake = FakeDriver::new();
        let index = fake.add_element(
            FakeElement::new()
                .by_css("#btn")
                .on_click(FakeEffect::RemoveSelf),
        );
        let handle = fake.element_handle(index);

        fake.click_script(&handle).await.unwrap();
        let err = fake.click_script(&handle).await.unwrap_err();
        assert!(err.is_stale());
    }

    #[tokio::test]
    async fn native_click_rejected_when_configured() {
        let fake = FakeDriver::new();
        let index = fake.add_element(
            FakeElement::new()
                .by_css("#btn")
                .native_click_fails()
                .on_click(FakeEffect::Count("clicked".to_string())),
        );
        let handle = fake.element_handle(index);

        let err = fake.click_native(&handle).await.unwrap_err();
        assert!(err.is_not_interactable());
        fake.click_script(&handle).await.unwrap();
        assert_eq!(fake.counter("clicked"), 1);
    }

    #[tokio::test]
    async fn frame_scoping_filters_queries() {
        let fake = FakeDriver::new();
        fake.add_frame(0, "iframe[data-fiscobot-frame=\"fb-frame-0\"]");
        fake.add_element(
            FakeElement::new()
                .by_css("select")
                .in_frame("iframe[data-fiscobot-frame=\"fb-frame-0\"]"),
        );

        assert!(fake.query(Strategy::Css, "select").await.unwrap().is_empty());
        let frames = fake.list_frames().await.unwrap();
        fake.enter_frame(&frames[0]).await.unwrap();
        assert_eq!(fake.query(Strategy::Css, "select").await.unwrap().len(), 1);
        fake.reset_frame().await.unwrap();
        assert!(fake.query(Strategy::Css, "select").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn click_can_open_and_switch_windows() {
        let fake = FakeDriver::new();
        let index = fake.add_element(FakeElement::new().by_css("#print").on_click(
            FakeEffect::OpenWindow {
                handle: "win-1".to_string(),
                url: "https://portal/guia.pdf".to_string(),
            },
        ));
        let handle = fake.element_handle(index);

        assert_eq!(fake.window_handles().await.unwrap().len(), 1);
        fake.click_script(&handle).await.unwrap();
        let windows = fake.window_handles().await.unwrap();
        assert_eq!(windows.len(), 2);

        fake.switch_window(&windows[1]).await.unwrap();
        assert_eq!(fake.current_url().await.unwrap(), "https://portal/guia.pdf");
    }

    #[tokio::test]
    async fn select_option_by_value_and_index() {
        let fake = FakeDriver::new();
        let index = fake.add_element(
            FakeElement::new()
                .by_css("select#mes")
                .option("01", "Janeiro")
                .option("02", "Fevereiro"),
        );
        let handle = fake.element_handle(index);

        assert!(fake
            .select_option(&handle, &SelectChoice::Value("02".to_string()))
            .await
            .unwrap());
        assert_eq!(fake.selected_index(index), Some(1));
        assert!(!fake
            .select_option(&handle, &SelectChoice::Value("99".to_string()))
            .await
            .unwrap());
        assert!(fake
            .select_option(&handle, &SelectChoice::Index(0))
            .await
            .unwrap());
        assert_eq!(fake.selected_index(index), Some(0));
    }
}
