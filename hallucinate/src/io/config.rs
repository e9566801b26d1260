//! Handler configuration stored in `hallucinate.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use rhai::{Array, Dynamic, Map};
use serde::{Deserialize, Serialize};

use crate::repl::model::{Field, ModelClass, ModelRegistry};

/// Handler configuration (TOML).
///
/// Every section is optional; a missing file yields the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(rename = "loop")]
    pub turns: LoopSettings,
    pub prompts: PromptPaths,
    pub models: Vec<ModelConfig>,
}

/// Live completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of an OpenAI-compatible API; `/completions` is appended.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo-instruct".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 1000,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopSettings {
    /// Agent turns allowed per request; `0` means unbounded.
    pub max_turns: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self { max_turns: 25 }
    }
}

/// Prompt files; unset entries use the built-in prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PromptPaths {
    /// Prompt used for `GET` requests.
    pub view: Option<PathBuf>,
    /// Prompt used for every other method.
    pub mutate: Option<PathBuf>,
}

/// One described model class and its seed rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub rows: Vec<toml::Table>,
}

impl ModelConfig {
    fn class(&self) -> ModelClass {
        let table = self
            .table
            .clone()
            .unwrap_or_else(|| format!("{}s", self.name.to_ascii_lowercase()));
        ModelClass::new(self.name.clone(), table, self.fields.clone())
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.base_url.trim().is_empty() {
            return Err(anyhow!("agent.base_url must be non-empty"));
        }
        if self.agent.model.trim().is_empty() {
            return Err(anyhow!("agent.model must be non-empty"));
        }
        if self.agent.max_tokens == 0 {
            return Err(anyhow!("agent.max_tokens must be > 0"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        for (index, model) in self.models.iter().enumerate() {
            if !is_identifier(&model.name) {
                bail!("models[{index}].name {:?} is not an identifier", model.name);
            }
            if self.models[..index].iter().any(|m| m.name == model.name) {
                bail!("models[{index}].name {:?} is declared twice", model.name);
            }
            if model.fields.iter().filter(|f| f.primary_key).count() > 1 {
                bail!("model {} declares more than one primary key", model.name);
            }
            for field in &model.fields {
                if !is_identifier(&field.name) {
                    bail!("model {} field {:?} is not an identifier", model.name, field.name);
                }
            }
        }
        Ok(())
    }

    /// Build the record store, seeded with every configured row.
    pub fn registry(&self) -> Result<ModelRegistry> {
        let registry = ModelRegistry::new(self.models.iter().map(ModelConfig::class).collect());
        for model in &self.models {
            for (index, row) in model.rows.iter().enumerate() {
                let values = row
                    .iter()
                    .map(|(key, value)| (key.clone(), toml_to_dynamic(value)));
                let record = registry
                    .instantiate(&model.name, values)
                    .map_err(|err| anyhow!("{err}"))
                    .with_context(|| format!("model {} row {index}", model.name))?;
                registry
                    .add(record)
                    .map_err(|err| anyhow!("{err}"))
                    .with_context(|| format!("store model {} row {index}", model.name))?;
            }
        }
        Ok(registry)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn toml_to_dynamic(value: &toml::Value) -> Dynamic {
    match value {
        toml::Value::String(s) => Dynamic::from(s.clone()),
        toml::Value::Integer(i) => Dynamic::from(*i),
        toml::Value::Float(f) => Dynamic::from(*f),
        toml::Value::Boolean(b) => Dynamic::from(*b),
        toml::Value::Datetime(dt) => Dynamic::from(dt.to_string()),
        toml::Value::Array(items) => {
            Dynamic::from(items.iter().map(toml_to_dynamic).collect::<Array>())
        }
        toml::Value::Table(table) => Dynamic::from(
            table
                .iter()
                .map(|(k, v)| (k.as_str().into(), toml_to_dynamic(v)))
                .collect::<Map>(),
        ),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AppConfig::default()`.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        let cfg = AppConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repl::model::FieldType;

    const CATALOG: &str = r#"
[loop]
max_turns = 4

[[models]]
name = "Product"
fields = [
    { name = "id", type = "integer", primary_key = true },
    { name = "name", type = "text" },
    { name = "price", type = "integer" },
]
rows = [
    { name = "Widget", price = 10 },
    { id = 7, name = "Gadget", price = 25 },
]
"#;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.turns.max_turns, 25);
        assert_eq!(cfg.agent.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn load_parses_models_and_rows() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("hallucinate.toml");
        fs::write(&path, CATALOG).expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.turns.max_turns, 4);
        assert_eq!(cfg.models[0].fields[2].kind, FieldType::Integer);

        let registry = cfg.registry().expect("registry");
        assert_eq!(registry.class("Product").expect("class").table, "products");
        let rows = registry.all("Product");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id(), Some(1));
        assert!(registry.find("Product", 7).is_some());
    }

    #[test]
    fn rejects_unknown_row_field() {
        let cfg: AppConfig = toml::from_str(
            r#"
[[models]]
name = "Product"
fields = [{ name = "id", type = "integer", primary_key = true }]
rows = [{ colour = "red" }]
"#,
        )
        .expect("parse");
        let err = cfg.registry().unwrap_err();
        assert!(format!("{err:#}").contains("no attribute 'colour'"));
    }

    #[test]
    fn rejects_duplicate_model_names() {
        let mut cfg = AppConfig::default();
        let model = ModelConfig {
            name: "Product".to_string(),
            table: None,
            fields: Vec::new(),
            rows: Vec::new(),
        };
        cfg.models = vec![model.clone(), model];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_max_tokens() {
        let mut cfg = AppConfig::default();
        cfg.agent.max_tokens = 0;
        assert!(cfg.validate().is_err());
    }
}
