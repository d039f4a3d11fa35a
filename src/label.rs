use crate::dom::{Document, NodeId};

/// Resolve a human-readable label for a field element.
///
/// Precedence: `aria-label` attribute, then the text of a `label[for]`
/// pointing at the element, then the text of the closest `<label>` ancestor,
/// then `placeholder` (a label source only, never a value), then the `name`
/// or `id` attribute, and finally the lower-cased tag name. Candidates are
/// trimmed; one that is empty after trimming falls through to the next.
pub fn label_for(doc: &Document, id: NodeId) -> String {
    if let Some(label) = attr_candidate(doc, id, "aria-label") {
        return label;
    }

    if let Some(target_id) = doc.attr(id, "id")
        && !target_id.is_empty()
        && let Some(label_node) = doc.label_for_target(target_id)
        && let Some(label) = text_candidate(doc, label_node)
    {
        return label;
    }

    if let Some(ancestor) = doc.closest(id, "label")
        && let Some(label) = text_candidate(doc, ancestor)
    {
        return label;
    }

    if let Some(label) = attr_candidate(doc, id, "placeholder") {
        return label;
    }

    if let Some(label) = attr_candidate(doc, id, "name") {
        return label;
    }

    if let Some(label) = attr_candidate(doc, id, "id") {
        return label;
    }

    doc.tag(id).to_string()
}

fn attr_candidate(doc: &Document, id: NodeId, name: &str) -> Option<String> {
    let trimmed = doc.attr(id, name)?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn text_candidate(doc: &Document, id: NodeId) -> Option<String> {
    let trimmed = doc.text(id).trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aria_label_wins() {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let label = doc.append(body, "label");
        doc.set_attr(label, "for", "name");
        doc.set_text(label, "Patient Name");
        let input = doc.append(body, "input");
        doc.set_attr(input, "id", "name");
        doc.set_attr(input, "aria-label", "Full legal name");
        assert_eq!(label_for(&doc, input), "Full legal name");
    }

    #[test]
    fn test_label_for_beats_ancestor() {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let wrapper = doc.append(body, "label");
        doc.set_text(wrapper, "Wrapper");
        let input = doc.append(wrapper, "input");
        doc.set_attr(input, "id", "dob");
        let label = doc.append(body, "label");
        doc.set_attr(label, "for", "dob");
        doc.set_text(label, "Date of Birth");
        assert_eq!(label_for(&doc, input), "Date of Birth");
    }

    #[test]
    fn test_ancestor_label_text() {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let wrapper = doc.append(body, "label");
        doc.set_text(wrapper, "  Allergies  ");
        let input = doc.append(wrapper, "input");
        assert_eq!(label_for(&doc, input), "Allergies");
    }

    #[test]
    fn test_placeholder_then_name_then_id_then_tag() {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");

        let with_placeholder = doc.append(body, "input");
        doc.set_attr(with_placeholder, "placeholder", "MRN");
        doc.set_attr(with_placeholder, "name", "mrn");
        assert_eq!(label_for(&doc, with_placeholder), "MRN");

        let with_name = doc.append(body, "input");
        doc.set_attr(with_name, "name", "insurer");
        doc.set_attr(with_name, "id", "field-7");
        assert_eq!(label_for(&doc, with_name), "insurer");

        let with_id = doc.append(body, "input");
        doc.set_attr(with_id, "id", "field-8");
        assert_eq!(label_for(&doc, with_id), "field-8");

        let bare = doc.append(body, "textarea");
        assert_eq!(label_for(&doc, bare), "textarea");
    }

    #[test]
    fn test_blank_candidates_fall_through() {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let input = doc.append(body, "input");
        doc.set_attr(input, "aria-label", "   ");
        doc.set_attr(input, "placeholder", "");
        doc.set_attr(input, "name", "diagnosis");
        assert_eq!(label_for(&doc, input), "diagnosis");
    }
}
