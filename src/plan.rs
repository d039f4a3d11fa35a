use crate::types::{FieldDescriptor, FillAction, FillPlan, FillStep};

/// Keywords that mark a field as a clinical note section.
const SECTION_KEYWORDS: [&str; 5] = ["note", "assessment", "plan", "subjective", "hpi"];

/// Scores how well a field suits the free-text note.
///
/// The highest-scoring editable field receives the note, ties broken by
/// document order. A score of zero means "not a note target".
pub trait NoteTargetScorer {
    fn score(&self, label: &str, role: &str) -> f32;
}

/// Default scorer: clinical-section vocabulary in the label, or a
/// multi-line role.
pub struct SectionKeywordScorer;

impl NoteTargetScorer for SectionKeywordScorer {
    fn score(&self, label: &str, role: &str) -> f32 {
        let label = label.to_lowercase();
        if SECTION_KEYWORDS.iter().any(|kw| label.contains(kw))
            || role.eq_ignore_ascii_case("textarea")
        {
            1.0
        } else {
            0.0
        }
    }
}

/// Pick the note target: best-scoring editable field, falling back to the
/// first editable field when nothing scores above zero.
pub fn pick_note_target<'a>(
    fields: &'a [FieldDescriptor],
    scorer: &dyn NoteTargetScorer,
) -> Option<&'a FieldDescriptor> {
    let editable = || fields.iter().filter(|f| f.editable);
    let mut best: Option<(&FieldDescriptor, f32)> = None;
    for field in editable() {
        let score = scorer.score(&field.label, &field.role);
        if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((field, score));
        }
    }
    best.map(|(f, _)| f).or_else(|| editable().next())
}

/// Build a fill plan for the given fields and note text.
///
/// A non-empty note (after trimming) becomes the first step, aimed at the
/// scorer's pick, and its selector is recorded on the plan. Every other
/// editable field gets a deterministic placeholder value. No two steps ever
/// share a selector.
pub fn build_plan(
    url: &str,
    fields: &[FieldDescriptor],
    note: &str,
    scorer: &dyn NoteTargetScorer,
) -> FillPlan {
    let note = note.trim();
    let mut steps = Vec::new();
    let mut used: Vec<&str> = Vec::new();
    let mut note_target_selector = None;

    if !note.is_empty()
        && let Some(target) = pick_note_target(fields, scorer)
    {
        steps.push(FillStep {
            selector: target.selector.clone(),
            action: FillAction::AssignValue,
            value: note.to_string(),
            label: Some(target.label.clone()),
        });
        used.push(&target.selector);
        note_target_selector = Some(target.selector.clone());
    }

    for field in fields.iter().filter(|f| f.editable) {
        if used.contains(&field.selector.as_str()) {
            continue;
        }
        steps.push(FillStep {
            selector: field.selector.clone(),
            action: FillAction::AssignValue,
            value: placeholder_value(&field.label),
            label: Some(field.label.clone()),
        });
        used.push(&field.selector);
    }

    FillPlan {
        id: format!("plan-{:08x}", rand::random::<u32>()),
        url: url.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
        steps,
        note_target_selector,
        meta: None,
    }
}

/// Deterministic, greppable placeholder for a field label.
pub fn placeholder_value(label: &str) -> String {
    format!("DEMO_{}", placeholder_slug(label))
}

fn placeholder_slug(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_sep = false;
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_uppercase());
        } else {
            pending_sep = true;
        }
    }
    if slug.is_empty() {
        "FIELD".to_string()
    } else {
        slug
    }
}
