use crate::dom::{Document, NodeId, VALUE_TAGS};
use crate::label::label_for;
use crate::selector::selector_for;
use crate::types::FieldDescriptor;

/// Map every visible fillable field in the document, in document order.
///
/// Candidates are the native form controls plus explicitly content-editable
/// elements. Hidden candidates (zero-size box, `display:none`, or
/// `visibility:hidden`) are dropped from the output entirely rather than
/// flagged.
pub fn map_fields(doc: &Document) -> Vec<FieldDescriptor> {
    doc.descendants()
        .into_iter()
        .filter(|&n| is_candidate(doc, n))
        .filter(|&n| is_visible(doc, n))
        .map(|n| FieldDescriptor {
            selector: selector_for(doc, n),
            label: label_for(doc, n),
            role: role_for(doc, n),
            editable: is_editable(doc, n),
            visible: true,
        })
        .collect()
}

fn is_candidate(doc: &Document, id: NodeId) -> bool {
    VALUE_TAGS.contains(&doc.tag(id)) || doc.is_content_editable(id)
}

fn is_visible(doc: &Document, id: NodeId) -> bool {
    let (w, h) = doc.box_size(id);
    w > 0.0 && h > 0.0 && doc.display(id) != "none" && doc.visibility(id) != "hidden"
}

fn is_editable(doc: &Document, id: NodeId) -> bool {
    if doc.is_content_editable(id) {
        return true;
    }
    doc.attr(id, "disabled").is_none() && doc.attr(id, "readonly").is_none()
}

/// Role for a field: explicit `role` attribute wins, else the tag (and for
/// inputs, the `type`) picks one. `textarea` keeps its own role so the
/// multi-line nature of the control stays observable downstream.
fn role_for(doc: &Document, id: NodeId) -> String {
    if let Some(role) = doc.attr(id, "role")
        && !role.trim().is_empty()
    {
        return role.trim().to_string();
    }
    match doc.tag(id) {
        "textarea" => "textarea".to_string(),
        "select" => "combobox".to_string(),
        "input" => match doc.attr(id, "type").unwrap_or("text") {
            "checkbox" => "checkbox".to_string(),
            "radio" => "radio".to_string(),
            "button" | "submit" | "reset" => "button".to_string(),
            _ => "textbox".to_string(),
        },
        _ => "textbox".to_string(),
    }
}
