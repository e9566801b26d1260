//! Test-only scripted collaborators and a small catalog fixture.

use std::collections::VecDeque;

use anyhow::Result;
use rhai::Dynamic;

use crate::io::agent::{Agent, AgentError};
use crate::io::console::Console;
use crate::repl::model::{Field, FieldType, ModelClass, ModelRegistry};

/// Agent that returns predetermined completions and records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    completions: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedAgent {
    pub fn new<I, S>(completions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            completions: completions.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl Agent for ScriptedAgent {
    fn complete(&mut self, prompt: &str, _stop: &[&str]) -> Result<String, AgentError> {
        self.prompts.push(prompt.to_string());
        self.completions
            .pop_front()
            .ok_or(AgentError::MissingCompletion)
    }
}

/// Console fed from a fixed list of lines; confirmations are counted and
/// output is collected.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    lines: VecDeque<String>,
    confirmations: usize,
    output: String,
}

impl ScriptedConsole {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn confirmations(&self) -> usize {
        self.confirmations
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

impl Console for ScriptedConsole {
    fn confirm(&mut self, _prompt: &str) -> Result<()> {
        self.confirmations += 1;
        Ok(())
    }

    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.output.push_str(text);
        Ok(())
    }
}

/// `Product` class with two stored rows: Widget (id 1, price 10) and
/// Gadget (id 2, price 25).
pub fn catalog() -> ModelRegistry {
    let registry = ModelRegistry::new(vec![ModelClass::new(
        "Product",
        "products",
        vec![
            Field::new("id", FieldType::Integer).primary_key(),
            Field::new("name", FieldType::Text),
            Field::new("price", FieldType::Integer),
        ],
    )]);
    for (name, price) in [("Widget", 10_i64), ("Gadget", 25)] {
        let record = registry
            .instantiate(
                "Product",
                [
                    ("name".to_string(), Dynamic::from(name)),
                    ("price".to_string(), Dynamic::from(price)),
                ],
            )
            .expect("catalog row");
        registry.add(record).expect("store catalog row");
    }
    registry
}
