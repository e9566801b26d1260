//! Agent turn protocol: scripted responses first, then the live agent.

use std::collections::VecDeque;

use tracing::{debug, instrument};

use crate::core::response::{AgentResponse, STOP_MARKERS, parse_response};
use crate::io::agent::Agent;
use crate::looping::LoopError;

/// Where a turn's raw text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOrigin {
    Scripted,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub response: AgentResponse,
    pub origin: TurnOrigin,
}

/// Pending scripted responses plus an optional live agent.
pub struct Turns<'a> {
    pending: VecDeque<String>,
    agent: Option<&'a mut dyn Agent>,
}

impl<'a> Turns<'a> {
    pub fn new(pending: VecDeque<String>, agent: Option<&'a mut dyn Agent>) -> Self {
        Self { pending, agent }
    }

    /// True while scripted responses remain.
    pub fn is_replaying(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Make `raw` the very next response.
    pub fn push_front(&mut self, raw: String) {
        self.pending.push_front(raw);
    }

    /// Produce the next turn for a conversation rendered as `prompt`.
    #[instrument(skip_all, fields(pending = self.pending.len()))]
    pub fn next(&mut self, prompt: &str) -> Result<Turn, LoopError> {
        let (raw, origin) = match self.pending.pop_front() {
            Some(raw) => (raw, TurnOrigin::Scripted),
            None => {
                let agent = self.agent.as_deref_mut().ok_or(LoopError::ReplayExhausted)?;
                (agent.complete(prompt, &STOP_MARKERS)?, TurnOrigin::Live)
            }
        };
        debug!(?origin, bytes = raw.len(), "agent turn");
        let response = parse_response(&raw).ok_or(LoopError::MalformedResponse(raw))?;
        Ok(Turn { response, origin })
    }
}

impl std::fmt::Debug for Turns<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turns")
            .field("pending", &self.pending)
            .field("live", &self.agent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::response::ToolKind;
    use crate::test_support::ScriptedAgent;

    #[test]
    fn scripted_responses_come_first() {
        let mut agent = ScriptedAgent::new([" live\n```rhai\nprint(2);"]);
        let mut turns = Turns::new(
            VecDeque::from([" scripted\n```rhai\nprint(1);".to_string()]),
            Some(&mut agent),
        );
        let first = turns.next("prompt").expect("first");
        assert_eq!(first.origin, TurnOrigin::Scripted);
        assert_eq!(first.response.code, "print(1);");
        let second = turns.next("prompt").expect("second");
        assert_eq!(second.origin, TurnOrigin::Live);
        assert_eq!(second.response.tool, ToolKind::CodeExec);
        assert_eq!(agent.prompts(), ["prompt"]);
    }

    #[test]
    fn empty_queue_without_agent_is_exhausted() {
        let mut turns = Turns::new(VecDeque::new(), None);
        assert!(matches!(turns.next("p"), Err(LoopError::ReplayExhausted)));
    }

    #[test]
    fn malformed_response_is_fatal() {
        let mut turns = Turns::new(VecDeque::from(["no fence here".to_string()]), None);
        assert!(matches!(turns.next("p"), Err(LoopError::MalformedResponse(_))));
    }

    #[test]
    fn pushed_follow_up_is_next() {
        let mut turns = Turns::new(VecDeque::from(["a\n```rhai\n1".to_string()]), None);
        turns.push_front("b\n```rhai\n2".to_string());
        assert_eq!(turns.next("p").expect("turn").response.code, "2");
        assert_eq!(turns.next("p").expect("turn").response.code, "1");
        assert!(!turns.is_replaying());
    }
}
