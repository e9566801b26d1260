//! Output capture for one fragment execution.
//!
//! The engine's print/debug callbacks write into an [`OutputSink`]. While a
//! [`CaptureScope`] is alive, writes land in its buffer; with no scope active
//! they go to the process stdout.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::io::Write as _;
use std::rc::Rc;

use tracing::trace;

use crate::repl::namespace::{Namespace, Snapshot};
use crate::repl::value::repr;

/// Stack of capture buffers shared between a session and its engine callbacks.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    buffers: Rc<RefCell<Vec<String>>>,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, text: &str) {
        let mut buffers = self.buffers.borrow_mut();
        match buffers.last_mut() {
            Some(buffer) => buffer.push_str(text),
            None => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
        }
    }

    pub fn write_line(&self, text: &str) {
        self.write(text);
        self.write("\n");
    }

    /// Number of active capture scopes.
    pub fn depth(&self) -> usize {
        self.buffers.borrow().len()
    }

    fn push(&self) -> usize {
        let mut buffers = self.buffers.borrow_mut();
        buffers.push(String::new());
        buffers.len()
    }

    fn pop(&self) -> String {
        self.buffers.borrow_mut().pop().unwrap_or_default()
    }
}

/// Captures everything written while it is alive and reports binding changes
/// on [`finish`](CaptureScope::finish).
///
/// Dropping an unfinished scope discards its buffer.
#[derive(Debug)]
pub struct CaptureScope {
    sink: OutputSink,
    snapshot: Snapshot,
    depth: usize,
    finished: bool,
}

impl CaptureScope {
    pub fn enter(sink: &OutputSink, namespace: &Namespace) -> Self {
        let depth = sink.push();
        trace!(depth, "capture scope entered");
        Self {
            sink: sink.clone(),
            snapshot: namespace.snapshot(),
            depth,
            finished: false,
        }
    }

    /// Write the binding diff and return everything captured.
    pub fn finish(mut self, namespace: &Namespace) -> String {
        let mut report = String::new();
        for (name, value) in namespace.changed_since(&self.snapshot) {
            let _ = writeln!(report, "{name}: {}", repr(&value));
        }
        self.sink.write(&report);
        self.finished = true;
        self.release()
    }

    fn release(&mut self) -> String {
        let mut output = String::new();
        // Inner scopes left open by a panic are unwound together with this one.
        while self.sink.depth() >= self.depth {
            output = self.sink.pop();
        }
        output
    }
}

impl Drop for CaptureScope {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Dynamic;

    #[test]
    fn writes_go_to_innermost_scope() {
        let sink = OutputSink::new();
        let namespace = Namespace::new();
        let outer = CaptureScope::enter(&sink, &namespace);
        sink.write("outer ");
        let inner = CaptureScope::enter(&sink, &namespace);
        sink.write("inner");
        assert_eq!(inner.finish(&namespace), "inner");
        sink.write("again");
        assert_eq!(outer.finish(&namespace), "outer again");
        assert_eq!(sink.depth(), 0);
    }

    #[test]
    fn dropping_unfinished_scope_releases_buffer() {
        let sink = OutputSink::new();
        let namespace = Namespace::new();
        {
            let _scope = CaptureScope::enter(&sink, &namespace);
            sink.write("lost");
            assert_eq!(sink.depth(), 1);
        }
        assert_eq!(sink.depth(), 0);
    }

    #[test]
    fn finish_reports_new_bindings() {
        let sink = OutputSink::new();
        let mut namespace = Namespace::new();
        let scope = CaptureScope::enter(&sink, &namespace);
        namespace.set("x", Dynamic::from(5_i64));
        assert_eq!(scope.finish(&namespace), "x: 5\n");
    }

    #[test]
    fn capture_is_idempotent_across_scopes() {
        let sink = OutputSink::new();
        let namespace = Namespace::new();
        for _ in 0..2 {
            let scope = CaptureScope::enter(&sink, &namespace);
            sink.write_line("hello");
            assert_eq!(scope.finish(&namespace), "hello\n");
        }
    }
}
