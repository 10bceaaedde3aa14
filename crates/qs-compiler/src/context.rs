use log::warn;
use qs_core::{
    CommandCatalog, CommandSignature, CompileDiagnostic, CompiledEntry, ScriptQueueError,
};

/// Per-script compile state: the catalog commands resolve against and the
/// non-fatal diagnostics gathered so far.
pub(crate) struct CompileContext<'a> {
    pub(crate) catalog: &'a dyn CommandCatalog,
    pub(crate) script: String,
    pub(crate) diagnostics: Vec<CompileDiagnostic>,
}

impl<'a> CompileContext<'a> {
    pub(crate) fn new(catalog: &'a dyn CommandCatalog, script: impl Into<String>) -> Self {
        Self {
            catalog,
            script: script.into(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn signature(&self, command: &str) -> Option<CommandSignature> {
        self.catalog.signature(command)
    }

    pub(crate) fn report(&mut self, error: ScriptQueueError) {
        warn!(
            "[{}] line {}: {}",
            self.script,
            error.line().unwrap_or(0),
            error
        );
        self.diagnostics.push(CompileDiagnostic {
            script: self.script.clone(),
            error,
        });
    }

    /// Keeps the first reason; a broken entry reports once at dispatch.
    pub(crate) fn mark_broken(&mut self, entry: &mut CompiledEntry, code: &str, message: String) {
        self.report(ScriptQueueError::with_span(
            code,
            message.clone(),
            entry.location.clone(),
        ));
        if entry.broken.is_none() {
            entry.broken = Some(message);
        }
    }
}
