//! Persistent scripting session.
//!
//! A [`Session`] owns the engine, the namespace and a line buffer. Fragments
//! run one complete chunk at a time inside a [`capture::CaptureScope`], so the
//! caller gets back everything the fragment printed, displayed or rebound.

pub mod buffer;
pub mod capture;
pub mod engine;
pub mod model;
pub mod namespace;
pub mod value;

use std::rc::Rc;

use rhai::{AST, Dynamic, Engine, EvalAltResult, Map};
use tracing::{debug, instrument};

use crate::core::classifier::ErrorDescription;
use crate::repl::buffer::LineBuffer;
use crate::repl::capture::{CaptureScope, OutputSink};
use crate::repl::engine::{Capabilities, build_engine};
use crate::repl::model::{MissingAttribute, ModelClass, ModelRegistry};
use crate::repl::namespace::Namespace;

pub const UNEXPECTED_EOF: &str = "SyntaxError: unexpected EOF while parsing";

/// Error raised by a fragment, in a form the request loop can classify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub message: String,
    pub missing: Option<MissingAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    Syntax,
    Runtime,
}

impl ExecError {
    fn syntax(message: String) -> Self {
        Self {
            kind: ExecErrorKind::Syntax,
            message,
            missing: None,
        }
    }

    pub fn description(&self) -> ErrorDescription {
        match &self.missing {
            Some(missing) => {
                ErrorDescription::missing_attribute(&missing.type_name, &missing.attribute)
            }
            None => ErrorDescription::other(),
        }
    }
}

/// Result of one interactive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub output: String,
    /// More input is needed before the buffered chunk can run.
    pub incomplete: bool,
}

/// Result of running one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub output: String,
    /// Last error raised while running the fragment.
    pub error: Option<ExecError>,
}

enum Outcome {
    Done,
    Answered(Dynamic),
    Failed(ExecError),
}

pub struct Session {
    engine: Engine,
    namespace: Namespace,
    sink: OutputSink,
    capabilities: Capabilities,
    buffer: LineBuffer,
    functions: AST,
    final_answer: Option<Dynamic>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("namespace", &self.namespace)
            .field("buffer", &self.buffer)
            .field("final_answer", &self.final_answer)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a session whose namespace binds every registry class under its
    /// own name, plus `bindings`.
    pub fn new(registry: Rc<ModelRegistry>, bindings: Vec<(String, Dynamic)>) -> Self {
        let sink = OutputSink::new();
        let capabilities = Capabilities::new(Rc::clone(&registry));
        let engine = build_engine(&sink, &capabilities);
        let mut namespace = Namespace::new();
        for class in registry.classes() {
            namespace.set(&class.name, Dynamic::from(ModelClass::clone(class)));
        }
        for (name, value) in bindings {
            namespace.set(&name, value);
        }
        Self {
            engine,
            namespace,
            sink,
            capabilities,
            buffer: LineBuffer::new(),
            functions: AST::empty(),
            final_answer: None,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// True when `name` is still bound to the model class of that name.
    pub fn is_bound_class(&self, name: &str) -> bool {
        self.namespace
            .get(name)
            .and_then(|value| value.try_cast::<ModelClass>())
            .is_some_and(|class| class.name == name)
    }

    /// Run a fragment line by line and return what it produced.
    #[instrument(level = "debug", skip_all, fields(lines = fragment.lines().count()))]
    pub fn run(&mut self, fragment: &str) -> Execution {
        let scope = CaptureScope::enter(&self.sink, &self.namespace);
        let mut error = None;

        for line in fragment.split('\n') {
            match self.feed(line) {
                Outcome::Done => {}
                Outcome::Failed(err) => error = Some(err),
                Outcome::Answered(answer) => {
                    self.final_answer = Some(answer);
                    self.buffer.clear();
                    break;
                }
            }
        }

        if self.final_answer.is_none() && self.buffer.is_incomplete() {
            for _ in 0..2 {
                if let Outcome::Failed(err) = self.feed("") {
                    error = Some(err);
                }
            }
            if self.buffer.is_incomplete() {
                self.sink.write_line(UNEXPECTED_EOF);
                self.buffer.clear();
            }
        }

        let output = scope.finish(&self.namespace);
        debug!(
            bytes = output.len(),
            failed = error.is_some(),
            answered = self.final_answer.is_some(),
            "fragment finished"
        );
        Execution { output, error }
    }

    /// Feed one interactive line and return what it printed, displayed or
    /// rebound.
    pub fn push_line(&mut self, line: &str) -> Interaction {
        let scope = CaptureScope::enter(&self.sink, &self.namespace);
        if let Outcome::Answered(answer) = self.feed(line) {
            self.final_answer = Some(answer);
            self.buffer.clear();
        }
        Interaction {
            output: scope.finish(&self.namespace),
            incomplete: self.buffer.is_incomplete(),
        }
    }

    pub fn has_final_answer(&self) -> bool {
        self.final_answer.is_some()
    }

    pub fn take_final_answer(&mut self) -> Option<Dynamic> {
        self.final_answer.take()
    }

    fn feed(&mut self, line: &str) -> Outcome {
        self.buffer.push(line);
        if self.buffer.is_incomplete() {
            return Outcome::Done;
        }
        let source = self.buffer.take();
        if source.trim().is_empty() {
            return Outcome::Done;
        }
        self.execute(&source)
    }

    fn execute(&mut self, source: &str) -> Outcome {
        let ast = match self.engine.compile(source) {
            Ok(ast) => ast,
            Err(err) => {
                let message = err.to_string();
                self.sink.write_line(&format!("SyntaxError: {message}"));
                return Outcome::Failed(ExecError::syntax(message));
            }
        };
        self.functions = self.functions.merge(&ast.clone_functions_only());
        let program = self.functions.merge(&ast);
        self.refresh_variables();

        match self
            .engine
            .eval_ast_with_scope::<Dynamic>(self.namespace.scope_mut(), &program)
        {
            Ok(value) => {
                if !value.is_unit() {
                    self.namespace.display(&self.sink, value);
                }
                Outcome::Done
            }
            Err(err) => match termination_value(&err) {
                Some(answer) => Outcome::Answered(answer),
                None => {
                    let failure = runtime_failure(&err);
                    self.sink.write_line(&failure.message);
                    Outcome::Failed(failure)
                }
            },
        }
    }

    fn refresh_variables(&self) {
        let variables: Map = self
            .namespace
            .bindings()
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        *self.capabilities.variables.borrow_mut() = variables;
    }
}

/// The value passed to `respond`, however deep the call that raised it.
fn termination_value(err: &EvalAltResult) -> Option<Dynamic> {
    match err {
        EvalAltResult::ErrorTerminated(value, _) => Some(value.clone()),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => termination_value(inner),
        _ => None,
    }
}

fn innermost(err: &EvalAltResult) -> &EvalAltResult {
    match err {
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => innermost(inner),
        other => other,
    }
}

fn runtime_failure(err: &EvalAltResult) -> ExecError {
    if let EvalAltResult::ErrorRuntime(value, _) = innermost(err) {
        if let Some(missing) = value.clone().try_cast::<MissingAttribute>() {
            return ExecError {
                kind: ExecErrorKind::Runtime,
                message: missing.to_string(),
                missing: Some(missing),
            };
        }
        if let Some(message) = value.read_lock::<rhai::ImmutableString>() {
            return ExecError {
                kind: ExecErrorKind::Runtime,
                message: format!("Error: {}", message.as_str()),
                missing: None,
            };
        }
    }
    ExecError {
        kind: ExecErrorKind::Runtime,
        message: format!("Error: {err}"),
        missing: None,
    }
}
