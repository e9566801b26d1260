//! Prompt files and prerecorded conversations.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::response::Prerecording;
use crate::core::types::Request;
use crate::io::config::PromptPaths;

const VIEW_PROMPT: &str = include_str!("prompts/view.txt");
const MUTATE_PROMPT: &str = include_str!("prompts/mutate.txt");

/// Load the conversation for `request`.
///
/// An explicit `override_path` wins; otherwise reads use the view prompt and
/// everything else the mutate prompt, each from its configured file or the
/// built-in text.
pub fn load_prerecording(
    request: &Request,
    prompts: &PromptPaths,
    override_path: Option<&Path>,
) -> Result<Prerecording> {
    let configured = if request.is_read() {
        prompts.view.as_deref()
    } else {
        prompts.mutate.as_deref()
    };
    let contents = match override_path.or(configured) {
        Some(path) => {
            debug!(path = %path.display(), "loading prerecording");
            fs::read_to_string(path)
                .with_context(|| format!("read prerecording {}", path.display()))?
        }
        None if request.is_read() => VIEW_PROMPT.to_string(),
        None => MUTATE_PROMPT.to_string(),
    };
    let prerecording = Prerecording::parse(&contents);
    debug!(scripted = prerecording.responses.len(), "prerecording loaded");
    Ok(prerecording)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::response::{RECORD_SEPARATOR, parse_response};

    #[test]
    fn builtin_prompts_are_well_formed() {
        for method in ["GET", "POST"] {
            let recording =
                load_prerecording(&Request::new(method, "/"), &PromptPaths::default(), None)
                    .expect("load");
            assert!(!recording.system.is_empty());
            assert!(!recording.responses.is_empty());
            for response in &recording.responses {
                assert!(parse_response(response).is_some(), "{response:?}");
            }
        }
    }

    #[test]
    fn method_selects_prompt() {
        let view = load_prerecording(&Request::new("GET", "/"), &PromptPaths::default(), None)
            .expect("view");
        let mutate = load_prerecording(&Request::new("POST", "/"), &PromptPaths::default(), None)
            .expect("mutate");
        assert!(view.system.contains("only reads data"));
        assert!(mutate.system.contains("changes data"));
    }

    #[test]
    fn override_path_wins() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("recording.txt");
        fs::write(&path, format!("seed{RECORD_SEPARATOR} a\n```rhai\nrespond(1);")).expect("write");
        let prompts = PromptPaths {
            view: Some(temp.path().join("missing.txt")),
            mutate: None,
        };
        let recording =
            load_prerecording(&Request::new("GET", "/"), &prompts, Some(&path)).expect("load");
        assert_eq!(recording.system, "seed");
        assert_eq!(recording.responses.len(), 1);
    }

    #[test]
    fn missing_configured_file_is_an_error() {
        let prompts = PromptPaths {
            view: Some("/definitely/not/here.txt".into()),
            mutate: None,
        };
        let err = load_prerecording(&Request::new("GET", "/"), &prompts, None).unwrap_err();
        assert!(format!("{err:#}").contains("read prerecording"));
    }
}
