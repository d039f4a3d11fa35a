//! Form-fill pipeline for clinical documents: map the fillable fields of a
//! page, match a free-text note against them, execute the resulting plan
//! transactionally with one-level undo.
//!
//! The library is pure and synchronous; it operates on captured
//! [`dom::Document`] snapshots and writes back through the [`dom::FieldWriter`]
//! seam. Browser and transport concerns live in the agent binary.

pub mod dom;
pub mod execute;
pub mod extract;
pub mod label;
pub mod plan;
pub mod selector;
pub mod types;

pub use dom::{Document, FieldWriter, WriteError};
pub use execute::{ExecutionOutcome, UndoBuffer, UndoManager, execute_plan};
pub use extract::map_fields;
pub use plan::{NoteTargetScorer, SectionKeywordScorer, build_plan};
pub use types::{
    DomMap, ExecutionError, ExecutionResult, FieldDescriptor, FillAction, FillPlan, FillStep,
    normalize_dom_map,
};
