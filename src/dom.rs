use std::collections::BTreeMap;
use std::fmt;

use crate::selector;

/// Index of an element inside a [`Document`] arena.
pub type NodeId = usize;

/// Tags whose current value lives on the native `value` property.
pub const VALUE_TAGS: [&str; 3] = ["input", "textarea", "select"];

/// Which channel a value write goes through for a given element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteChannel {
    /// Native form-control `value` property.
    Value,
    /// Text content of a content-editable surface.
    Text,
}

/// One element captured from a document: enough structure and style to
/// synthesize selectors, resolve labels, and decide visibility/editability.
#[derive(Debug, Clone)]
struct ElementNode {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    value: Option<String>,
    box_size: (f64, f64),
    display: String,
    visibility: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ElementNode {
    fn new(tag: &str, parent: Option<NodeId>) -> Self {
        Self {
            tag: tag.to_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            value: None,
            box_size: (0.0, 0.0),
            display: "block".to_string(),
            visibility: "visible".to_string(),
            parent,
            children: Vec::new(),
        }
    }
}

/// An arena tree of element nodes captured from one document.
///
/// This is the snapshot half of the document-accessor capability: the
/// extractor, selector synthesizer and label resolver all walk it. It also
/// implements [`FieldWriter`], so plans can execute against it directly,
/// which is how the pipeline is tested without a browser.
#[derive(Debug, Clone)]
pub struct Document {
    url: String,
    nodes: Vec<ElementNode>,
    dispatched: Vec<(String, String)>,
}

impl Document {
    /// Create a document with a single `<html>` root.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            nodes: vec![ElementNode::new("html", None)],
            dispatched: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn root(&self) -> NodeId {
        0
    }

    /// Append a child element under `parent` and return its id.
    pub fn append(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ElementNode::new(tag, Some(parent)));
        self.nodes[parent].children.push(id);
        id
    }

    pub fn tag(&self, id: NodeId) -> &str {
        &self.nodes[id].tag
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id].attrs.get(name).map(String::as_str)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.nodes[id].attrs.insert(name.to_string(), value.to_string());
    }

    /// Trimmed text-content snapshot of the element, descendants included.
    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id].text
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id].text = text.to_string();
    }

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].value.as_deref()
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) {
        self.nodes[id].value = Some(value.to_string());
    }

    pub fn box_size(&self, id: NodeId) -> (f64, f64) {
        self.nodes[id].box_size
    }

    pub fn set_box_size(&mut self, id: NodeId, width: f64, height: f64) {
        self.nodes[id].box_size = (width, height);
    }

    pub fn display(&self, id: NodeId) -> &str {
        &self.nodes[id].display
    }

    pub fn visibility(&self, id: NodeId) -> &str {
        &self.nodes[id].visibility
    }

    pub fn set_style(&mut self, id: NodeId, display: &str, visibility: &str) {
        self.nodes[id].display = display.to_string();
        self.nodes[id].visibility = visibility.to_string();
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// 1-based position among the parent's children; 1 for the root.
    pub fn position_in_parent(&self, id: NodeId) -> usize {
        match self.nodes[id].parent {
            Some(p) => {
                self.nodes[p]
                    .children
                    .iter()
                    .position(|&c| c == id)
                    .unwrap_or(0)
                    + 1
            }
            None => 1,
        }
    }

    /// All elements in document (preorder traversal) order, root included.
    pub fn descendants(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self.nodes[id].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// First element in document order whose `id` attribute equals `value`.
    pub fn by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants()
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(value))
    }

    /// The element itself or its nearest ancestor with the given tag.
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if self.nodes[n].tag == tag {
                return Some(n);
            }
            cur = self.nodes[n].parent;
        }
        None
    }

    /// First `<label>` whose `for` attribute targets the given element id.
    pub fn label_for_target(&self, target_id: &str) -> Option<NodeId> {
        self.descendants()
            .into_iter()
            .find(|&n| self.nodes[n].tag == "label" && self.attr(n, "for") == Some(target_id))
    }

    /// Whether the element is explicitly marked content-editable.
    pub fn is_content_editable(&self, id: NodeId) -> bool {
        match self.attr(id, "contenteditable") {
            Some(v) => !v.eq_ignore_ascii_case("false"),
            None => false,
        }
    }

    /// The write channel for this element, if it has one.
    pub fn write_channel(&self, id: NodeId) -> Option<WriteChannel> {
        if VALUE_TAGS.contains(&self.nodes[id].tag.as_str()) {
            Some(WriteChannel::Value)
        } else if self.is_content_editable(id) {
            Some(WriteChannel::Text)
        } else {
            None
        }
    }

    /// Synthetic notifications dispatched so far, as (selector, event kind).
    pub fn dispatched(&self) -> &[(String, String)] {
        &self.dispatched
    }

    fn resolve_writable(&self, sel: &str) -> Result<(NodeId, WriteChannel), WriteError> {
        let id = selector::resolve(self, sel).ok_or_else(|| WriteError::NotFound {
            selector: sel.to_string(),
        })?;
        match self.write_channel(id) {
            Some(channel) => Ok((id, channel)),
            None => Err(WriteError::Unwritable {
                selector: sel.to_string(),
                tag: self.nodes[id].tag.clone(),
            }),
        }
    }
}

/// Why a single field operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The selector matched no element in the live document.
    NotFound { selector: String },
    /// The element resolved but has neither a value property nor a
    /// content-editable text surface.
    Unwritable { selector: String, tag: String },
    /// The underlying document surface reported an operational failure.
    Backend { selector: String, message: String },
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::NotFound { selector } => {
                write!(f, "element not found: {}", selector)
            }
            WriteError::Unwritable { selector, tag } => {
                write!(f, "no writable value surface on <{}> at {}", tag, selector)
            }
            WriteError::Backend { selector, message } => {
                write!(f, "document surface failed at {}: {}", selector, message)
            }
        }
    }
}

impl std::error::Error for WriteError {}

/// The live write surface a plan executes against.
///
/// Implemented by [`Document`] for in-memory runs and by the agent's tab
/// writer for a real browser page. All operations are keyed by selector so
/// the executor never holds element references across steps.
pub trait FieldWriter {
    /// Check that the selector still matches an element.
    fn resolve(&mut self, selector: &str) -> Result<(), WriteError>;
    /// Read the current value through the element's write channel.
    fn read_value(&mut self, selector: &str) -> Result<String, WriteError>;
    /// Assign a new value through the element's write channel.
    fn write_value(&mut self, selector: &str, value: &str) -> Result<(), WriteError>;
    /// Dispatch synthetic input/change notifications. Required after a write
    /// because property assignment alone does not fire bound listeners.
    fn notify_edited(&mut self, selector: &str) -> Result<(), WriteError>;
}

impl FieldWriter for Document {
    fn resolve(&mut self, sel: &str) -> Result<(), WriteError> {
        selector::resolve(self, sel)
            .map(|_| ())
            .ok_or_else(|| WriteError::NotFound {
                selector: sel.to_string(),
            })
    }

    fn read_value(&mut self, sel: &str) -> Result<String, WriteError> {
        let (id, channel) = self.resolve_writable(sel)?;
        Ok(match channel {
            WriteChannel::Value => self.value(id).unwrap_or_default().to_string(),
            WriteChannel::Text => self.text(id).to_string(),
        })
    }

    fn write_value(&mut self, sel: &str, value: &str) -> Result<(), WriteError> {
        let (id, channel) = self.resolve_writable(sel)?;
        match channel {
            WriteChannel::Value => self.set_value(id, value),
            WriteChannel::Text => self.set_text(id, value),
        }
        Ok(())
    }

    fn notify_edited(&mut self, sel: &str) -> Result<(), WriteError> {
        self.resolve_writable(sel)?;
        self.dispatched.push((sel.to_string(), "input".to_string()));
        self.dispatched.push((sel.to_string(), "change".to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> Document {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let form = doc.append(body, "form");
        let input = doc.append(form, "input");
        doc.set_attr(input, "id", "patient-name");
        doc.set_box_size(input, 120.0, 20.0);
        let area = doc.append(form, "textarea");
        doc.set_box_size(area, 300.0, 80.0);
        doc
    }

    #[test]
    fn test_positions_are_one_based_document_order() {
        let doc = sample_doc();
        let order = doc.descendants();
        assert_eq!(doc.tag(order[0]), "html");
        assert_eq!(doc.tag(order[1]), "body");
        assert_eq!(doc.tag(order[2]), "form");
        assert_eq!(doc.tag(order[3]), "input");
        assert_eq!(doc.tag(order[4]), "textarea");
        assert_eq!(doc.position_in_parent(order[3]), 1);
        assert_eq!(doc.position_in_parent(order[4]), 2);
    }

    #[test]
    fn test_by_id_and_closest() {
        let doc = sample_doc();
        let input = doc.by_id("patient-name").unwrap();
        assert_eq!(doc.tag(input), "input");
        let form = doc.closest(input, "form").unwrap();
        assert_eq!(doc.tag(form), "form");
        assert!(doc.closest(input, "label").is_none());
    }

    #[test]
    fn test_write_channels() {
        let mut doc = sample_doc();
        let body = doc.descendants()[1];
        let editable = doc.append(body, "div");
        doc.set_attr(editable, "contenteditable", "true");
        let plain = doc.append(body, "span");

        let input = doc.by_id("patient-name").unwrap();
        assert_eq!(doc.write_channel(input), Some(WriteChannel::Value));
        assert_eq!(doc.write_channel(editable), Some(WriteChannel::Text));
        assert_eq!(doc.write_channel(plain), None);

        let off = doc.append(body, "div");
        doc.set_attr(off, "contenteditable", "false");
        assert_eq!(doc.write_channel(off), None);
    }

    #[test]
    fn test_field_writer_round_trip_and_events() {
        let mut doc = sample_doc();
        doc.write_value("#patient-name", "Ada Lovelace").unwrap();
        doc.notify_edited("#patient-name").unwrap();
        assert_eq!(doc.read_value("#patient-name").unwrap(), "Ada Lovelace");
        assert_eq!(
            doc.dispatched(),
            &[
                ("#patient-name".to_string(), "input".to_string()),
                ("#patient-name".to_string(), "change".to_string()),
            ]
        );
    }

    #[test]
    fn test_field_writer_error_taxonomy() {
        let mut doc = sample_doc();
        let missing = doc.read_value("#nope").unwrap_err();
        assert!(matches!(missing, WriteError::NotFound { .. }));
        assert!(missing.to_string().contains("not found"));

        let body = doc.descendants()[1];
        let span = doc.append(body, "span");
        doc.set_attr(span, "id", "plain");
        let unwritable = doc.write_value("#plain", "x").unwrap_err();
        assert!(matches!(unwritable, WriteError::Unwritable { .. }));
    }
}
