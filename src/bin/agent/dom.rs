use anyhow::Result;
use headless_chrome::Tab;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use anchor_ghost::dom::{Document, FieldWriter, NodeId, WriteError};

/// JavaScript injected into the page to serialize the element tree.
/// NON-DESTRUCTIVE: reads the DOM without modifying styles or layout.
///
/// The script:
///   1. Skips script, style, noscript, svg, link, meta, head, template.
///   2. Walks the element tree (max depth 25).
///   3. Emits one JSON object per element: tag, attributes, trimmed text,
///      control value, box size, computed display/visibility, children.
const SNAPSHOT_JS: &str = r#"
(() => {
  const SKIP = new Set(['SCRIPT','STYLE','NOSCRIPT','SVG','LINK','META','HEAD','TEMPLATE']);

  function serialize(el, depth) {
    const attrs = {};
    for (const a of el.attributes) attrs[a.name] = a.value;
    const rect = el.getBoundingClientRect();
    const s = getComputedStyle(el);
    const node = {
      tag: el.tagName.toLowerCase(),
      attrs,
      text: (el.textContent || '').trim().slice(0, 200),
      w: rect.width,
      h: rect.height,
      display: s.display,
      visibility: s.visibility,
      children: [],
    };
    if ('value' in el && ['INPUT','TEXTAREA','SELECT'].includes(el.tagName)) {
      node.value = el.value;
    }
    if (depth < 25) {
      for (const child of el.children) {
        if (SKIP.has(child.tagName)) continue;
        node.children.push(serialize(child, depth + 1));
      }
    }
    return node;
  }

  return JSON.stringify(serialize(document.documentElement, 0));
})()
"#;

#[derive(Debug, Deserialize)]
struct SnapshotNode {
    tag: String,
    #[serde(default)]
    attrs: BTreeMap<String, String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    w: f64,
    #[serde(default)]
    h: f64,
    #[serde(default)]
    display: String,
    #[serde(default)]
    visibility: String,
    #[serde(default)]
    children: Vec<SnapshotNode>,
}

/// Capture the current page as a [`Document`] snapshot.
pub fn capture_document(tab: &Arc<Tab>) -> Result<Document> {
    let result = tab.evaluate(SNAPSHOT_JS, false)?;
    let raw = result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| anyhow::anyhow!("snapshot script returned no payload"))?;
    let root: SnapshotNode = serde_json::from_str(&raw)?;
    let url = get_current_url(tab)?;

    let mut doc = Document::new(&url);
    let root_id = doc.root();
    apply_node(&mut doc, root_id, &root);
    for child in &root.children {
        build_subtree(&mut doc, root_id, child);
    }
    Ok(doc)
}

fn build_subtree(doc: &mut Document, parent: NodeId, node: &SnapshotNode) {
    let id = doc.append(parent, &node.tag);
    apply_node(doc, id, node);
    for child in &node.children {
        build_subtree(doc, id, child);
    }
}

fn apply_node(doc: &mut Document, id: NodeId, node: &SnapshotNode) {
    for (name, value) in &node.attrs {
        doc.set_attr(id, name, value);
    }
    doc.set_text(id, &node.text);
    if let Some(value) = &node.value {
        doc.set_value(id, value);
    }
    doc.set_box_size(id, node.w, node.h);
    doc.set_style(
        id,
        if node.display.is_empty() {
            "block"
        } else {
            &node.display
        },
        if node.visibility.is_empty() {
            "visible"
        } else {
            &node.visibility
        },
    );
}

/// [`FieldWriter`] over a live tab. Every operation is an injected script so
/// the executor never holds element references across steps.
pub struct TabWriter {
    tab: Arc<Tab>,
}

impl TabWriter {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    fn eval(&self, selector: &str, script: String) -> Result<serde_json::Value, WriteError> {
        let result = self
            .tab
            .evaluate(&script, false)
            .map_err(|e| WriteError::Backend {
                selector: selector.to_string(),
                message: e.to_string(),
            })?;
        let raw = result
            .value
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| WriteError::Backend {
                selector: selector.to_string(),
                message: "script returned no payload".to_string(),
            })?;
        serde_json::from_str(&raw).map_err(|e| WriteError::Backend {
            selector: selector.to_string(),
            message: e.to_string(),
        })
    }

    fn check(&self, selector: &str, payload: serde_json::Value) -> Result<String, WriteError> {
        if let Some(value) = payload.get("ok") {
            return Ok(value.as_str().unwrap_or_default().to_string());
        }
        match payload.get("err").and_then(|v| v.as_str()) {
            Some("not-found") => Err(WriteError::NotFound {
                selector: selector.to_string(),
            }),
            Some("unwritable") => Err(WriteError::Unwritable {
                selector: selector.to_string(),
                tag: payload
                    .get("tag")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            }),
            _ => Err(WriteError::Backend {
                selector: selector.to_string(),
                message: "unexpected script payload".to_string(),
            }),
        }
    }
}

// Shared JS prologue: resolve the selector and classify the write surface.
fn probe_prologue(selector_json: &str) -> String {
    format!(
        r#"
  const el = document.querySelector({selector_json});
  if (!el) return JSON.stringify({{err:'not-found'}});
  const valueTags = ['INPUT','TEXTAREA','SELECT'];
  const channel = valueTags.includes(el.tagName) ? 'value'
    : el.isContentEditable ? 'text' : null;
"#
    )
}

impl FieldWriter for TabWriter {
    fn resolve(&mut self, selector: &str) -> Result<(), WriteError> {
        let sel = serde_json::json!(selector).to_string();
        let script = format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  return JSON.stringify(el ? {{ok:''}} : {{err:'not-found'}});
}})()"#
        );
        let payload = self.eval(selector, script)?;
        self.check(selector, payload).map(|_| ())
    }

    fn read_value(&mut self, selector: &str) -> Result<String, WriteError> {
        let sel = serde_json::json!(selector).to_string();
        let prologue = probe_prologue(&sel);
        let script = format!(
            r#"(() => {{{prologue}
  if (channel === 'value') return JSON.stringify({{ok: el.value}});
  if (channel === 'text') return JSON.stringify({{ok: el.textContent}});
  return JSON.stringify({{err:'unwritable', tag: el.tagName.toLowerCase()}});
}})()"#
        );
        let payload = self.eval(selector, script)?;
        self.check(selector, payload)
    }

    fn write_value(&mut self, selector: &str, value: &str) -> Result<(), WriteError> {
        let sel = serde_json::json!(selector).to_string();
        let val = serde_json::json!(value).to_string();
        let prologue = probe_prologue(&sel);
        let script = format!(
            r#"(() => {{{prologue}
  if (channel === 'value') {{ el.value = {val}; return JSON.stringify({{ok:''}}); }}
  if (channel === 'text') {{ el.textContent = {val}; return JSON.stringify({{ok:''}}); }}
  return JSON.stringify({{err:'unwritable', tag: el.tagName.toLowerCase()}});
}})()"#
        );
        let payload = self.eval(selector, script)?;
        self.check(selector, payload).map(|_| ())
    }

    fn notify_edited(&mut self, selector: &str) -> Result<(), WriteError> {
        let sel = serde_json::json!(selector).to_string();
        let prologue = probe_prologue(&sel);
        // Property assignment does not fire bound listeners, so dispatch
        // synthetic events the way a keystroke would.
        let script = format!(
            r#"(() => {{{prologue}
  if (channel === null) return JSON.stringify({{err:'unwritable', tag: el.tagName.toLowerCase()}});
  el.dispatchEvent(new Event('input', {{bubbles: true}}));
  el.dispatchEvent(new Event('change', {{bubbles: true}}));
  return JSON.stringify({{ok:''}});
}})()"#
        );
        let payload = self.eval(selector, script)?;
        self.check(selector, payload).map(|_| ())
    }
}

/// Get the current page URL.
pub fn get_current_url(tab: &Arc<Tab>) -> Result<String> {
    let result = tab.evaluate("window.location.href", false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "unknown".to_string()))
}

/// Get the current page title.
pub fn get_page_title(tab: &Arc<Tab>) -> Result<String> {
    let result = tab.evaluate("document.title", false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "untitled".to_string()))
}
