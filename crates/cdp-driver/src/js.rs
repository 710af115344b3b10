//! Page-side script builders.
//!
//! All element work happens through `Runtime.evaluate`: matches are
//! registered in a per-window registry (`__fiscobotNodes`) and addressed by
//! handle id afterwards. Scripts are assembled from templates with literal
//! substitution; every needle goes through JSON encoding, never string
//! concatenation.

use crate::types::{SelectChoice, Strategy};

/// JSON-encode a Rust string into a JS string literal.
pub(crate) fn literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Expression yielding the document for the active scope: the top document,
/// or the content document of the iframe selected by `frame`.
fn scope_doc_expr(frame: Option<&str>) -> String {
    match frame {
        None => "document".to_string(),
        Some(selector) => {
            let template = r#"(() => {
    try {
        const frameEl = document.querySelector(__FRAME__);
        if (!frameEl) { return null; }
        return frameEl.contentDocument || (frameEl.contentWindow ? frameEl.contentWindow.document : null);
    } catch (err) {
        return null;
    }
})()"#;
            template.replace("__FRAME__", &literal(selector))
        }
    }
}

/// Statement filling `list` with raw matches for one strategy.
///
/// Operates on `root` (element or document) inside `doc`, using `needle`.
fn collection_snippet(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Id => {
            "try { list = Array.from(root.querySelectorAll('[id]')).filter((el) => el.id === needle); } catch (err) { list = []; }"
        }
        Strategy::Css => {
            "try { list = Array.from(root.querySelectorAll(needle)); } catch (err) { list = []; }"
        }
        Strategy::XPath => {
            "try { const snap = doc.evaluate(needle, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); for (let i = 0; i < snap.snapshotLength; i += 1) { list.push(snap.snapshotItem(i)); } } catch (err) { list = []; }"
        }
        Strategy::LinkText => {
            "try { list = Array.from(root.querySelectorAll('a')).filter((el) => (el.textContent || '').trim() === needle); } catch (err) { list = []; }"
        }
        Strategy::PartialLinkText => {
            "try { list = Array.from(root.querySelectorAll('a')).filter((el) => (el.textContent || '').includes(needle)); } catch (err) { list = []; }"
        }
    }
}

const QUERY_TEMPLATE: &str = r#"(() => {
    const doc = __SCOPE__;
    if (!doc) { return []; }
    const win = doc.defaultView || window;
    const reg = win.__fiscobotNodes = win.__fiscobotNodes || { next: 1, nodes: {} };
    const root = doc;
    const needle = __NEEDLE__;
    let list = [];
    __COLLECT__
    const center = (el) => {
        const rect = el.getBoundingClientRect();
        let x = rect.left + rect.width / 2;
        let y = rect.top + rect.height / 2;
        let w = win;
        while (w && w !== window && w.frameElement) {
            const fr = w.frameElement.getBoundingClientRect();
            x += fr.left;
            y += fr.top;
            w = w.parent;
        }
        return { x: x, y: y };
    };
    return list
        .filter((el) => el && el.nodeType === 1)
        .map((el) => {
            const id = String(reg.next++);
            reg.nodes[id] = el;
            const c = center(el);
            return { handle: id, x: c.x, y: c.y };
        });
})()"#;

/// Script locating every match of `(strategy, selector)` in the scope and
/// registering each under a fresh handle id.
pub(crate) fn query_script(frame: Option<&str>, strategy: Strategy, selector: &str) -> String {
    QUERY_TEMPLATE
        .replace("__SCOPE__", &scope_doc_expr(frame))
        .replace("__NEEDLE__", &literal(selector))
        .replace("__COLLECT__", collection_snippet(strategy))
}

const QUERY_WITHIN_TEMPLATE: &str = r#"(() => {
    const doc = __SCOPE__;
    if (!doc) { return { status: 'no-frame' }; }
    const win = doc.defaultView || window;
    const reg = win.__fiscobotNodes = win.__fiscobotNodes || { next: 1, nodes: {} };
    const root = reg.nodes ? reg.nodes[__PARENT__] : null;
    if (!root || !root.isConnected) { return { status: 'stale' }; }
    const needle = __NEEDLE__;
    let list = [];
    __COLLECT__
    const matches = list
        .filter((el) => el && el.nodeType === 1)
        .map((el) => {
            const id = String(reg.next++);
            reg.nodes[id] = el;
            return id;
        });
    return { status: 'ok', value: matches };
})()"#;

/// Script locating matches underneath an already-registered element.
pub(crate) fn query_within_script(
    frame: Option<&str>,
    parent_id: &str,
    strategy: Strategy,
    selector: &str,
) -> String {
    QUERY_WITHIN_TEMPLATE
        .replace("__SCOPE__", &scope_doc_expr(frame))
        .replace("__PARENT__", &literal(parent_id))
        .replace("__NEEDLE__", &literal(selector))
        .replace("__COLLECT__", collection_snippet(strategy))
}

const HANDLE_TEMPLATE: &str = r#"(() => {
    const doc = __SCOPE__;
    if (!doc) { return { status: 'no-frame' }; }
    const win = doc.defaultView || window;
    const reg = win.__fiscobotNodes;
    const el = reg && reg.nodes ? reg.nodes[__HANDLE__] : null;
    if (!el || !el.isConnected) { return { status: 'stale' }; }
    __BODY__
})()"#;

/// Wrap `body` so it runs with `el` bound to a registered element.
///
/// `body` must return `{ status: 'ok', value: ... }`.
pub(crate) fn handle_script(frame: Option<&str>, handle_id: &str, body: &str) -> String {
    HANDLE_TEMPLATE
        .replace("__SCOPE__", &scope_doc_expr(frame))
        .replace("__HANDLE__", &literal(handle_id))
        .replace("__BODY__", body)
}

pub(crate) const CLICK_BODY: &str =
    "el.click(); return { status: 'ok', value: null };";

/// Absolute viewport center plus a visibility verdict, for native clicks.
pub(crate) const CENTER_BODY: &str = r#"const rect = el.getBoundingClientRect();
    let x = rect.left + rect.width / 2;
    let y = rect.top + rect.height / 2;
    let w = win;
    while (w && w !== window && w.frameElement) {
        const fr = w.frameElement.getBoundingClientRect();
        x += fr.left;
        y += fr.top;
        w = w.parent;
    }
    const style = win.getComputedStyle(el);
    const visible = el.getClientRects().length > 0 && style.visibility !== 'hidden' && style.display !== 'none';
    return { status: 'ok', value: { x: x, y: y, visible: visible } };"#;

pub(crate) const TEXT_BODY: &str =
    "return { status: 'ok', value: (el.innerText || el.textContent || '').trim() };";

pub(crate) fn attribute_body(name: &str) -> String {
    format!(
        "return {{ status: 'ok', value: el.getAttribute({}) }};",
        literal(name)
    )
}

pub(crate) const DISPLAYED_BODY: &str = r#"const style = win.getComputedStyle(el);
    const shown = el.getClientRects().length > 0 && style.visibility !== 'hidden' && style.display !== 'none';
    return { status: 'ok', value: shown };"#;

pub(crate) const ENABLED_BODY: &str =
    "return { status: 'ok', value: el.disabled !== true && el.getAttribute('aria-disabled') !== 'true' };";

pub(crate) const SCROLL_BODY: &str =
    "el.scrollIntoView({ block: 'center' }); return { status: 'ok', value: null };";

/// Focus the element, optionally clearing an existing value first.
pub(crate) fn focus_body(clear_first: bool) -> &'static str {
    if clear_first {
        r#"if (typeof el.focus === 'function') { el.focus(); }
    if ('value' in el) {
        el.value = '';
        el.dispatchEvent(new Event('input', { bubbles: true }));
    }
    return { status: 'ok', value: null };"#
    } else {
        "if (typeof el.focus === 'function') { el.focus(); } return { status: 'ok', value: null };"
    }
}

pub(crate) const OPTIONS_BODY: &str = r#"if (!el.options) { return { status: 'ok', value: [] }; }
    const items = Array.from(el.options).map((opt, i) => ({
        index: i,
        value: opt.value,
        text: (opt.textContent || '').trim(),
        selected: opt.selected === true,
    }));
    return { status: 'ok', value: items };"#;

/// Select an option and fire `change`; yields `false` when nothing matched.
pub(crate) fn select_body(choice: &SelectChoice) -> String {
    let pick = match choice {
        SelectChoice::Index(index) => format!(
            "let idx = {index}; if (!el.options || idx >= el.options.length) {{ idx = -1; }}"
        ),
        SelectChoice::Value(value) => format!(
            "let idx = -1; const wanted = {}; for (let i = 0; el.options && i < el.options.length; i += 1) {{ if (el.options[i].value === wanted) {{ idx = i; break; }} }}",
            literal(value)
        ),
    };
    format!(
        r#"{pick}
    if (idx < 0) {{ return {{ status: 'ok', value: false }}; }}
    el.selectedIndex = idx;
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return {{ status: 'ok', value: true }};"#
    )
}

const REMOVE_NODES_TEMPLATE: &str = r#"(() => {
    const doc = __SCOPE__;
    if (!doc) { return 0; }
    let removed = 0;
    try {
        doc.querySelectorAll(__NEEDLE__).forEach((el) => {
            el.remove();
            removed += 1;
        });
    } catch (err) {
        return removed;
    }
    return removed;
})()"#;

/// Forcibly strip every node matching `css` out of the scoped document.
pub(crate) fn remove_nodes_script(frame: Option<&str>, css: &str) -> String {
    REMOVE_NODES_TEMPLATE
        .replace("__SCOPE__", &scope_doc_expr(frame))
        .replace("__NEEDLE__", &literal(css))
}

/// Tag every iframe of the top document and return stable selectors for them.
pub(crate) const TAG_FRAMES_SCRIPT: &str = r#"(() => {
    return Array.from(document.querySelectorAll('iframe')).map((el, i) => {
        const tag = 'fb-frame-' + i;
        el.setAttribute('data-fiscobot-frame', tag);
        return 'iframe[data-fiscobot-frame="' + tag + '"]';
    });
})()"#;
