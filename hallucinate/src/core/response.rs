//! Agent response wire format and prerecording layout.
//!
//! A raw agent turn looks like:
//!
//! ```text
//! <thought>
//! ```rhai
//! <code>
//! ```
//!
//! The agent stops generating at the terminator (`\n```endrhai` or
//! `\n```endjinja`), so the raw text carries the opening fence only.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

/// Fence tag for script fragments.
pub const CODE_TAG: &str = "rhai";
/// Fence tag for template fragments.
pub const TEMPLATE_TAG: &str = "jinja";

/// Stop markers sent with every live completion request, one per tool kind.
pub const STOP_MARKERS: [&str; 2] = ["\n```endrhai", "\n```endjinja"];

/// Separator between sections of a prerecorded conversation file.
pub const RECORD_SEPARATOR: &str = "\n\n==AUTORESPOND==\n\n";

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n```([A-Za-z0-9_-]+)\n").expect("fence regex is valid"));

/// Tool the agent asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    /// Run the code through the session.
    CodeExec,
    /// Render the code as a template against the namespace.
    TemplateRender,
    /// Any other fence tag; never executed.
    Unrecognized(String),
}

impl ToolKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            CODE_TAG => ToolKind::CodeExec,
            TEMPLATE_TAG => ToolKind::TemplateRender,
            other => ToolKind::Unrecognized(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            ToolKind::CodeExec => CODE_TAG,
            ToolKind::TemplateRender => TEMPLATE_TAG,
            ToolKind::Unrecognized(tag) => tag,
        }
    }
}

/// One parsed agent turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResponse {
    pub thought: String,
    pub tool: ToolKind,
    pub code: String,
    /// Raw response with its terminator re-appended, as recorded in the transcript.
    pub transcript_text: String,
}

/// Split a raw response into (thought, tool, code).
///
/// Returns `None` unless exactly one opening fence is present.
pub fn parse_response(raw: &str) -> Option<AgentResponse> {
    let mut fences = FENCE.captures_iter(raw);
    let fence = fences.next()?;
    if fences.next().is_some() {
        return None;
    }
    let whole = fence.get(0)?;
    let tag = fence.get(1)?.as_str();
    let tool = ToolKind::from_tag(tag);
    Some(AgentResponse {
        thought: raw[..whole.start()].to_string(),
        code: raw[whole.end()..].to_string(),
        transcript_text: format!("{raw}\n```end{tag}\n"),
        tool,
    })
}

/// A prerecorded conversation: the seeded system turn plus scripted responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerecording {
    pub system: String,
    pub responses: VecDeque<String>,
}

impl Prerecording {
    pub fn parse(contents: &str) -> Self {
        let mut sections = contents.split(RECORD_SEPARATOR).map(str::to_string);
        let system = sections.next().unwrap_or_default();
        Self {
            system,
            responses: sections.collect(),
        }
    }
}
