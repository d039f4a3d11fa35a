use crate::dom::FieldWriter;
use crate::types::{ExecutionError, ExecutionResult, FillPlan};

/// Previous values captured during one execution, in touch order.
///
/// One buffer per execution; the caller decides how long it lives. Restoring
/// through [`UndoManager::restore`] drains it.
#[derive(Debug, Clone)]
pub struct UndoBuffer {
    token: String,
    entries: Vec<(String, String)>,
}

impl UndoBuffer {
    fn new() -> Self {
        Self {
            token: format!("undo-{:08x}", rand::random::<u32>()),
            entries: Vec::new(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, selector: &str, previous: String) {
        if self.entries.iter().any(|(s, _)| s == selector) {
            return;
        }
        self.entries.push((selector.to_string(), previous));
    }
}

/// What one execution produced: the wire-shaped result plus the undo buffer
/// for the values it overwrote (absent in preview mode or when nothing was
/// touched).
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub result: ExecutionResult,
    pub undo: Option<UndoBuffer>,
}

/// Apply a plan's steps in order against the writer.
///
/// Per-step failures are collected, never propagated; later steps still run.
/// Before the first write to a selector its current value is snapshotted into
/// the undo buffer. With `preview` set, steps are only resolved and counted,
/// nothing is written and no undo buffer is produced.
pub fn execute_plan(
    writer: &mut dyn FieldWriter,
    plan: &FillPlan,
    preview: bool,
) -> ExecutionOutcome {
    let mut undo = UndoBuffer::new();
    let mut applied = 0usize;
    let mut errors: Vec<ExecutionError> = Vec::new();

    for step in &plan.steps {
        let outcome = if preview {
            writer
                .resolve(&step.selector)
                .and_then(|_| writer.read_value(&step.selector))
                .map(|_| ())
        } else {
            apply_step(writer, &mut undo, &step.selector, &step.value)
        };
        match outcome {
            Ok(()) => applied += 1,
            Err(err) => errors.push(ExecutionError {
                selector: step.selector.clone(),
                message: err.to_string(),
            }),
        }
    }

    let failed = errors.len();
    let undo = if preview || undo.is_empty() {
        None
    } else {
        Some(undo)
    };
    let result = ExecutionResult {
        plan_id: plan.id.clone(),
        ok: failed == 0,
        applied,
        failed,
        errors: if errors.is_empty() { None } else { Some(errors) },
        undo_token: undo.as_ref().map(|u| u.token().to_string()),
    };
    ExecutionOutcome { result, undo }
}

fn apply_step(
    writer: &mut dyn FieldWriter,
    undo: &mut UndoBuffer,
    selector: &str,
    value: &str,
) -> Result<(), crate::dom::WriteError> {
    let previous = writer.read_value(selector)?;
    undo.record(selector, previous);
    writer.write_value(selector, value)?;
    writer.notify_edited(selector)?;
    Ok(())
}

/// Restore counts for one [`UndoManager::restore`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreOutcome {
    pub restored: usize,
    pub failed: usize,
}

/// Holds at most one undo buffer. Adopting a new buffer discards the old
/// one, so only the most recent execution can be reverted.
#[derive(Debug, Default)]
pub struct UndoManager {
    buffer: Option<UndoBuffer>,
}

impl UndoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adopt(&mut self, buffer: UndoBuffer) {
        self.buffer = Some(buffer);
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.as_ref().is_some_and(|b| !b.is_empty())
    }

    pub fn token(&self) -> Option<&str> {
        self.buffer.as_ref().map(|b| b.token())
    }

    /// Reassign every recorded previous value through the writer, with the
    /// same notification dispatch as a forward write. Drains the buffer;
    /// calling again without a new execution is a no-op.
    pub fn restore(&mut self, writer: &mut dyn FieldWriter) -> RestoreOutcome {
        let Some(buffer) = self.buffer.take() else {
            return RestoreOutcome::default();
        };
        let mut outcome = RestoreOutcome::default();
        for (selector, previous) in buffer.entries {
            let ok = writer
                .write_value(&selector, &previous)
                .and_then(|_| writer.notify_edited(&selector));
            match ok {
                Ok(()) => outcome.restored += 1,
                Err(err) => {
                    eprintln!("[Undo] Restore failed for {}: {}", selector, err);
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}
