use pretty_assertions::assert_eq;

use anchor_ghost::{
    Document, FieldWriter, SectionKeywordScorer, UndoManager, build_plan, execute_plan, map_fields,
};

/// A small clinical chart: name input, DOB input, a read-only attending
/// field, a hidden token, and a progress-note textarea.
fn chart() -> Document {
    let mut doc = Document::new("https://ehr.example/chart");
    let body = doc.append(doc.root(), "body");
    let form = doc.append(body, "form");

    let name_label = doc.append(form, "label");
    doc.set_attr(name_label, "for", "patient-name");
    doc.set_text(name_label, "Patient Name");
    let name = doc.append(form, "input");
    doc.set_attr(name, "id", "patient-name");
    doc.set_value(name, "");
    doc.set_box_size(name, 160.0, 24.0);

    let dob = doc.append(form, "input");
    doc.set_attr(dob, "id", "dob");
    doc.set_attr(dob, "placeholder", "Date of Birth");
    doc.set_box_size(dob, 120.0, 24.0);

    let attending = doc.append(form, "input");
    doc.set_attr(attending, "id", "attending");
    doc.set_attr(attending, "aria-label", "Attending Physician");
    doc.set_attr(attending, "readonly", "");
    doc.set_value(attending, "Dr. Wu");
    doc.set_box_size(attending, 160.0, 24.0);

    let token = doc.append(form, "input");
    doc.set_attr(token, "id", "visit-token");
    doc.set_attr(token, "type", "hidden");
    doc.set_value(token, "secret");

    let notes = doc.append(form, "textarea");
    doc.set_attr(notes, "id", "notes");
    doc.set_attr(notes, "aria-label", "Progress Note");
    doc.set_value(notes, "prior draft");
    doc.set_box_size(notes, 400.0, 120.0);

    doc
}

#[test]
fn test_map_then_plan_routes_note_and_placeholders() {
    let doc = chart();
    let fields = map_fields(&doc);

    // Hidden token dropped, read-only kept but not editable.
    let selectors: Vec<_> = fields.iter().map(|f| f.selector.as_str()).collect();
    assert_eq!(selectors, ["#patient-name", "#dob", "#attending", "#notes"]);
    assert!(!fields[2].editable);

    let plan = build_plan(
        doc.url(),
        &fields,
        "Patient stable, continue current meds.",
        &SectionKeywordScorer,
    );

    assert_eq!(plan.note_target_selector.as_deref(), Some("#notes"));
    assert_eq!(plan.steps.len(), 3);
    assert_eq!(plan.steps[0].selector, "#notes");
    assert_eq!(plan.steps[0].value, "Patient stable, continue current meds.");
    assert_eq!(plan.steps[1].selector, "#patient-name");
    assert_eq!(plan.steps[1].value, "DEMO_PATIENT_NAME");
    assert_eq!(plan.steps[2].selector, "#dob");
    assert_eq!(plan.steps[2].value, "DEMO_DATE_OF_BIRTH");

    let mut seen = std::collections::HashSet::new();
    assert!(plan.steps.iter().all(|s| seen.insert(s.selector.clone())));
}

#[test]
fn test_execute_then_undo_round_trips_document_state() {
    let mut doc = chart();
    let fields = map_fields(&doc);
    let plan = build_plan(doc.url(), &fields, "Stable.", &SectionKeywordScorer);

    let outcome = execute_plan(&mut doc, &plan, false);
    assert!(outcome.result.ok);
    assert_eq!(outcome.result.applied, 3);
    assert_eq!(outcome.result.failed, 0);
    assert!(outcome.result.undo_token.is_some());
    assert_eq!(doc.read_value("#notes").unwrap(), "Stable.");
    assert_eq!(doc.read_value("#patient-name").unwrap(), "DEMO_PATIENT_NAME");

    // Untouched fields keep their values.
    assert_eq!(doc.read_value("#attending").unwrap(), "Dr. Wu");

    let mut undo = UndoManager::new();
    undo.adopt(outcome.undo.unwrap());
    let restored = undo.restore(&mut doc);
    assert_eq!(restored.restored, 3);
    assert_eq!(restored.failed, 0);
    assert_eq!(doc.read_value("#notes").unwrap(), "prior draft");
    assert_eq!(doc.read_value("#patient-name").unwrap(), "");
    assert_eq!(doc.read_value("#dob").unwrap(), "");

    // Restore without a fresh execution is a no-op.
    let again = undo.restore(&mut doc);
    assert_eq!(again.restored, 0);
    assert_eq!(doc.read_value("#notes").unwrap(), "prior draft");
}

#[test]
fn test_stale_plan_reports_soft_misses() {
    let doc = chart();
    let fields = map_fields(&doc);
    let plan = build_plan(doc.url(), &fields, "Stable.", &SectionKeywordScorer);

    // The page navigated: a fresh, smaller document replaces the one the
    // plan was built against.
    let mut after = Document::new("https://ehr.example/other");
    let body = after.append(after.root(), "body");
    let name = after.append(body, "input");
    after.set_attr(name, "id", "patient-name");
    after.set_box_size(name, 160.0, 24.0);

    let outcome = execute_plan(&mut after, &plan, false);
    assert!(!outcome.result.ok);
    assert_eq!(outcome.result.applied, 1);
    assert_eq!(outcome.result.failed, 2);
    let errors = outcome.result.errors.unwrap();
    assert!(errors.iter().all(|e| e.message.contains("not found")));
    assert_eq!(after.read_value("#patient-name").unwrap(), "DEMO_PATIENT_NAME");
}

#[test]
fn test_preview_leaves_document_untouched() {
    let mut doc = chart();
    let fields = map_fields(&doc);
    let plan = build_plan(doc.url(), &fields, "Stable.", &SectionKeywordScorer);

    let outcome = execute_plan(&mut doc, &plan, true);
    assert!(outcome.result.ok);
    assert_eq!(outcome.result.applied, 3);
    assert!(outcome.undo.is_none());
    assert!(outcome.result.undo_token.is_none());
    assert_eq!(doc.read_value("#notes").unwrap(), "prior draft");
    assert!(doc.dispatched().is_empty());
}

#[test]
fn test_empty_note_and_empty_document_edges() {
    let doc = chart();
    let fields = map_fields(&doc);

    let plan = build_plan(doc.url(), &fields, "  \n ", &SectionKeywordScorer);
    assert!(plan.note_target_selector.is_none());
    assert!(plan.steps.iter().all(|s| s.value.starts_with("DEMO_")));

    let empty = Document::new("https://ehr.example/blank");
    let no_fields = map_fields(&empty);
    assert!(no_fields.is_empty());
    let empty_plan = build_plan(empty.url(), &no_fields, "Stable.", &SectionKeywordScorer);
    assert!(empty_plan.steps.is_empty());

    let mut target = Document::new("https://ehr.example/blank");
    let outcome = execute_plan(&mut target, &empty_plan, false);
    assert!(outcome.result.ok);
    assert_eq!(outcome.result.applied, 0);
    assert_eq!(outcome.result.failed, 0);
    assert!(outcome.result.undo_token.is_none());
}

#[test]
fn test_new_execution_replaces_undo_history() {
    let mut doc = chart();
    let fields = map_fields(&doc);
    let mut undo = UndoManager::new();

    let first = build_plan(doc.url(), &fields, "First note.", &SectionKeywordScorer);
    let outcome = execute_plan(&mut doc, &first, false);
    undo.adopt(outcome.undo.unwrap());

    let second = build_plan(doc.url(), &fields, "Second note.", &SectionKeywordScorer);
    let outcome = execute_plan(&mut doc, &second, false);
    undo.adopt(outcome.undo.unwrap());

    undo.restore(&mut doc);
    // Undo reverts only the second execution.
    assert_eq!(doc.read_value("#notes").unwrap(), "First note.");

    let again = undo.restore(&mut doc);
    assert_eq!(again.restored, 0);
}

#[test]
fn test_fields_without_ids_round_trip_through_paths() {
    let mut doc = Document::new("https://ehr.example/chart");
    let body = doc.append(doc.root(), "body");
    let form = doc.append(body, "form");
    let first = doc.append(form, "input");
    doc.set_attr(first, "aria-label", "Allergies");
    doc.set_box_size(first, 120.0, 24.0);
    let second = doc.append(form, "input");
    doc.set_attr(second, "aria-label", "Medications");
    doc.set_box_size(second, 120.0, 24.0);

    let fields = map_fields(&doc);
    assert_eq!(fields.len(), 2);
    assert_ne!(fields[0].selector, fields[1].selector);
    assert!(fields[0].selector.contains("nth-child"));

    let plan = build_plan(doc.url(), &fields, "", &SectionKeywordScorer);
    let outcome = execute_plan(&mut doc, &plan, false);
    assert!(outcome.result.ok);
    assert_eq!(doc.read_value(&fields[0].selector).unwrap(), "DEMO_ALLERGIES");
    assert_eq!(
        doc.read_value(&fields[1].selector).unwrap(),
        "DEMO_MEDICATIONS"
    );
}
