use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Snapshot of one addressable, potentially-fillable surface in a document.
///
/// A descriptor is only guaranteed valid at capture time. The document may
/// mutate afterwards, so re-resolving `selector` can fail; callers treat that
/// as a soft miss, never a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub selector: String,
    pub label: String,
    pub role: String,
    pub editable: bool,
    pub visible: bool,
}

/// The closed set of things a fill step can do to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillAction {
    #[serde(rename = "assign-value")]
    AssignValue,
}

/// One value assignment inside a plan. Steps are applied in array order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillStep {
    pub selector: String,
    pub action: FillAction,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// An ordered set of value assignments derived from matching a note against
/// a field map. Pure value object: no live document references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillPlan {
    pub id: String,
    pub url: String,
    pub created_at: String,
    pub steps: Vec<FillStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_target_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Per-step failure record: which selector, and what went wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub selector: String,
    pub message: String,
}

/// Outcome of applying one plan. Created fresh per execution, never mutated
/// after return. `ok` means zero failed steps; `applied == 0 && failed == 0`
/// means there was nothing to do, which is distinct from everything failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub plan_id: String,
    pub ok: bool,
    pub applied: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ExecutionError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_token: Option<String>,
}

/// A captured field map as posted by a document context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomMap {
    pub url: String,
    pub captured_at: String,
    pub fields: Vec<FieldDescriptor>,
}

/// Boundary validation for an incoming field-map payload.
///
/// Rejects structurally invalid top-level input (non-object body, missing or
/// non-string `url`, non-array `fields`). Entries that are not well-formed
/// field descriptors are dropped rather than failing the whole map, and a
/// missing `capturedAt` defaults to now.
pub fn normalize_dom_map(body: serde_json::Value) -> Result<DomMap> {
    let obj = body
        .as_object()
        .ok_or_else(|| anyhow!("invalid field map payload: body is not an object"))?;

    let url = obj
        .get("url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("invalid field map payload: 'url' must be a string"))?
        .to_string();

    let raw_fields = obj
        .get("fields")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("invalid field map payload: 'fields' must be an array"))?;

    let fields = raw_fields
        .iter()
        .filter_map(|entry| serde_json::from_value::<FieldDescriptor>(entry.clone()).ok())
        .collect();

    let captured_at = obj
        .get("capturedAt")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    Ok(DomMap {
        url,
        captured_at,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fill_step_wire_names() {
        let step = FillStep {
            selector: "#notes".to_string(),
            action: FillAction::AssignValue,
            value: "Stable.".to_string(),
            label: None,
        };
        let wire = serde_json::to_value(&step).unwrap();
        assert_eq!(wire["action"], "assign-value");
        assert!(wire.get("label").is_none());
    }

    #[test]
    fn test_plan_wire_names_are_camel_case() {
        let plan = FillPlan {
            id: "plan-1".to_string(),
            url: "https://ehr.example/chart".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            steps: vec![],
            note_target_selector: Some("#notes".to_string()),
            meta: None,
        };
        let wire = serde_json::to_value(&plan).unwrap();
        assert_eq!(wire["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(wire["noteTargetSelector"], "#notes");
    }

    #[test]
    fn test_execution_result_wire_names() {
        let result = ExecutionResult {
            plan_id: "plan-1".to_string(),
            ok: true,
            applied: 2,
            failed: 0,
            errors: None,
            undo_token: Some("undo-abc".to_string()),
        };
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["planId"], "plan-1");
        assert_eq!(wire["undoToken"], "undo-abc");
        assert!(wire.get("errors").is_none());
    }

    #[test]
    fn test_normalize_dom_map_accepts_valid_payload() {
        let map = normalize_dom_map(json!({
            "url": "https://ehr.example/chart",
            "capturedAt": "2024-01-01T00:00:00Z",
            "fields": [
                {"selector": "#name", "label": "Patient Name", "role": "textbox",
                 "editable": true, "visible": true}
            ]
        }))
        .unwrap();
        assert_eq!(map.url, "https://ehr.example/chart");
        assert_eq!(map.captured_at, "2024-01-01T00:00:00Z");
        assert_eq!(map.fields.len(), 1);
        assert_eq!(map.fields[0].label, "Patient Name");
    }

    #[test]
    fn test_normalize_dom_map_drops_malformed_entries() {
        let map = normalize_dom_map(json!({
            "url": "https://ehr.example/chart",
            "fields": [
                {"selector": "#ok", "label": "Ok", "role": "textbox",
                 "editable": true, "visible": true},
                {"selector": 42},
                "garbage",
                null
            ]
        }))
        .unwrap();
        assert_eq!(map.fields.len(), 1);
        assert_eq!(map.fields[0].selector, "#ok");
        assert!(!map.captured_at.is_empty());
    }

    #[test]
    fn test_normalize_dom_map_rejects_bad_shapes() {
        assert!(normalize_dom_map(json!("nonsense")).is_err());
        assert!(normalize_dom_map(json!({"fields": []})).is_err());
        assert!(normalize_dom_map(json!({"url": 1, "fields": []})).is_err());
        assert!(normalize_dom_map(json!({"url": "https://x", "fields": "no"})).is_err());
    }
}
