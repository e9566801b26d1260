//! Per-request orchestration loop.
//!
//! Builds the namespace, then alternates agent turns and executions until a
//! fragment produces a final answer. Errors that name a missing attribute on a
//! bound model class get a scripted follow-up pushed to the front of the queue.

use std::rc::Rc;

use anyhow::Result;
use rhai::{Dynamic, Map};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::classifier::{corrective_follow_up, describe_template_error};
use crate::core::response::{Prerecording, ToolKind};
use crate::core::transcript::{Observer, Speaker, Transcript};
use crate::core::types::{Request, ResponseBody};
use crate::io::agent::{Agent, AgentError};
use crate::io::console::{Console, interactive_shell};
use crate::io::template;
use crate::repl::Session;
use crate::repl::model::ModelRegistry;
use crate::repl::value::response_body;
use crate::turn::{TurnOrigin, Turns};

/// Text appended before every agent turn.
pub const TURN_MARKER: &str = "\nThought:";

const CONFIRM_PROMPT: &str = "Press enter to continue";

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("agent used all {0} turns without a final answer")]
    TurnBudgetExhausted(u32),
    #[error("prerecording exhausted and no live agent is configured")]
    ReplayExhausted,
    #[error("agent responded in unknown format, got {0:?}")]
    MalformedResponse(String),
    #[error("interactive shell closed without a response")]
    ShellClosed,
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Operator-selected behaviour for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Agent turns allowed; `0` means unbounded.
    pub max_turns: u32,
    /// Wait for the operator before running each live turn.
    pub confirm: bool,
    /// Open the interactive shell once scripted responses run out.
    pub debug_prerecording: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_turns: 25,
            confirm: false,
            debug_prerecording: false,
        }
    }
}

/// Everything outside the loop it talks to.
pub struct Collaborators<'a> {
    pub agent: Option<&'a mut dyn Agent>,
    pub console: &'a mut dyn Console,
    pub observer: Option<Observer>,
}

/// Namespace binding describing the request.
pub fn request_binding(request: &Request) -> Dynamic {
    let mut map = Map::new();
    map.insert("method".into(), Dynamic::from(request.method.clone()));
    map.insert("path".into(), Dynamic::from(request.path.clone()));
    map.insert("query".into(), Dynamic::from(request.query.clone()));
    Dynamic::from(map)
}

fn new_session(request: &Request, registry: Rc<ModelRegistry>) -> Session {
    Session::new(
        registry,
        vec![("request".to_string(), request_binding(request))],
    )
}

/// Answer `request` by hand in the interactive shell.
pub fn run_shell(
    request: &Request,
    registry: Rc<ModelRegistry>,
    console: &mut dyn Console,
) -> Result<ResponseBody> {
    let mut session = new_session(request, registry);
    shell_answer(&mut session, console)
}

fn shell_answer(session: &mut Session, console: &mut dyn Console) -> Result<ResponseBody> {
    match interactive_shell(session, console)? {
        Some(answer) => Ok(response_body(&answer)),
        None => Err(LoopError::ShellClosed.into()),
    }
}

/// Run the turn loop for one request until a final answer is produced.
///
/// Fatal conditions surface as [`LoopError`] inside the returned error.
#[instrument(skip_all, fields(method = %request.method, path = %request.path))]
pub fn run_request(
    request: &Request,
    registry: Rc<ModelRegistry>,
    prerecording: Prerecording,
    config: &LoopConfig,
    collaborators: Collaborators<'_>,
) -> Result<ResponseBody> {
    let Collaborators {
        agent,
        console,
        observer,
    } = collaborators;

    let mut session = new_session(request, registry);
    let mut transcript = match observer {
        Some(observer) => Transcript::with_observer(prerecording.system, observer),
        None => Transcript::new(prerecording.system),
    };
    let mut turns = Turns::new(prerecording.responses, agent);
    let mut taken = 0u32;

    loop {
        if config.debug_prerecording && !turns.is_replaying() {
            info!("prerecording finished; opening shell");
            return shell_answer(&mut session, console);
        }
        if config.max_turns > 0 && taken >= config.max_turns {
            return Err(LoopError::TurnBudgetExhausted(config.max_turns).into());
        }
        taken += 1;

        transcript.append(TURN_MARKER, Speaker::System);
        let turn = turns.next(&transcript.render())?;
        debug!(
            thought = turn.response.thought.trim(),
            tool = turn.response.tool.tag(),
            "agent turn parsed"
        );
        transcript.append(turn.response.transcript_text.clone(), Speaker::Agent);

        if config.confirm && turn.origin == TurnOrigin::Live {
            console.confirm(CONFIRM_PROMPT)?;
        }

        let code = &turn.response.code;
        let (output, error) = match &turn.response.tool {
            ToolKind::CodeExec => {
                let execution = session.run(code);
                if let Some(answer) = session.take_final_answer() {
                    info!(turns = taken, "final answer");
                    return Ok(response_body(&answer));
                }
                (
                    execution.output,
                    execution.error.map(|err| err.description()),
                )
            }
            ToolKind::TemplateRender => match template::render(code, session.namespace()) {
                Ok(html) => {
                    info!(turns = taken, "template rendered");
                    return Ok(ResponseBody::html(html));
                }
                Err(message) => {
                    let mut output = format!("Error: {message}");
                    if !output.ends_with('\n') {
                        output.push('\n');
                    }
                    (output, Some(describe_template_error(&message)))
                }
            },
            ToolKind::Unrecognized(tag) => (format!("Agent responded with unknown tool {tag}"), None),
        };

        transcript.append(output, Speaker::Execution);

        if let Some(error) = error {
            let follow_up = corrective_follow_up(&error, |name| session.is_bound_class(name));
            if let Some(follow_up) = follow_up {
                debug!(subject = ?error.subject, member = ?error.member, "suggesting inspection");
                turns.push_front(follow_up);
            }
        }
    }
}
