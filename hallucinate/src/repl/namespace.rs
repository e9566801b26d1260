//! The persistent name → value mapping shared by every fragment of a request.

use std::collections::BTreeMap;

use rhai::{Dynamic, INT, Map, Scope};

use crate::repl::capture::OutputSink;
use crate::repl::value::{repr, values_equal};

/// Reserved key holding the number of values displayed so far.
pub const DISPLAY_COUNT: &str = "__display_count";
/// Reserved key holding the displayed values, keyed by display index.
pub const DISPLAY_HISTORY: &str = "Out";

pub fn is_reserved(name: &str) -> bool {
    name == DISPLAY_COUNT || name == DISPLAY_HISTORY
}

/// Shallow copy of the bindings taken when a capture scope is entered.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    bindings: BTreeMap<String, Dynamic>,
}

/// Script scope plus the reserved display bookkeeping.
#[derive(Debug)]
pub struct Namespace {
    scope: Scope<'static>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    pub fn new() -> Self {
        let mut scope = Scope::new();
        scope.push(DISPLAY_COUNT, 0 as INT);
        scope.push(DISPLAY_HISTORY, Map::new());
        Self { scope }
    }

    pub fn scope_mut(&mut self) -> &mut Scope<'static> {
        &mut self.scope
    }

    pub fn set(&mut self, name: &str, value: Dynamic) {
        self.scope.set_or_push(name, value);
    }

    pub fn get(&self, name: &str) -> Option<Dynamic> {
        self.scope.get(name).cloned()
    }

    /// Current non-reserved bindings in first-definition order. A name
    /// shadowed by a later `let` reports its latest value.
    pub fn bindings(&self) -> Vec<(String, Dynamic)> {
        let mut out: Vec<(String, Dynamic)> = Vec::new();
        for (name, _, value) in self.scope.iter_raw() {
            if is_reserved(name) {
                continue;
            }
            match out.iter_mut().find(|(existing, _)| existing == name) {
                Some(slot) => slot.1 = value.clone(),
                None => out.push((name.to_string(), value.clone())),
            }
        }
        out
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            bindings: self.bindings().into_iter().collect(),
        }
    }

    /// Bindings that are new or changed since `snapshot`.
    pub fn changed_since(&self, snapshot: &Snapshot) -> Vec<(String, Dynamic)> {
        self.bindings()
            .into_iter()
            .filter(|(name, value)| match snapshot.bindings.get(name) {
                Some(before) => !values_equal(before, value),
                None => true,
            })
            .collect()
    }

    pub fn display_count(&self) -> INT {
        self.scope
            .get_value::<INT>(DISPLAY_COUNT)
            .unwrap_or_default()
    }

    /// Record `value` under the current display count, bump the count and
    /// write `Out[n]: repr`.
    pub fn display(&mut self, sink: &OutputSink, value: Dynamic) {
        let index = self.display_count();
        self.scope.set_or_push(DISPLAY_COUNT, index + 1);
        let line = format!("{DISPLAY_HISTORY}[{index}]: {}", repr(&value));
        let mut history = self
            .scope
            .get_value::<Map>(DISPLAY_HISTORY)
            .unwrap_or_default();
        history.insert(index.to_string().into(), value);
        self.scope.set_or_push(DISPLAY_HISTORY, history);
        sink.write_line(&line);
    }
}
