//! Append-only, speaker-tagged conversation buffer.
//!
//! The concatenation of every entry is the prompt sent to the agent on the
//! next turn. Entries never change once appended; the buffer lives for one
//! request.

use std::fmt;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// Framework text: the seeded prompt and the per-turn `Thought:` marker.
    System,
    /// Raw agent responses.
    Agent,
    /// Captured output of executed fragments.
    Execution,
}

impl Speaker {
    pub fn as_str(self) -> &'static str {
        match self {
            Speaker::System => "system",
            Speaker::Agent => "agent",
            Speaker::Execution => "execution",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub text: String,
    pub speaker: Speaker,
}

/// Receives every appended entry, e.g. to echo it to the operator.
pub type Observer = Box<dyn FnMut(&str, Speaker)>;

/// Request-scoped conversation with the agent.
#[derive(Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    observer: Option<Observer>,
}

impl Transcript {
    /// Create a transcript seeded with the system turn.
    pub fn new(system: impl Into<String>) -> Self {
        let mut transcript = Self::default();
        transcript.append(system, Speaker::System);
        transcript
    }

    /// Create a transcript that forwards each entry to `observer`, starting with
    /// the seeded system turn.
    pub fn with_observer(system: impl Into<String>, observer: Observer) -> Self {
        let mut transcript = Self {
            entries: Vec::new(),
            observer: Some(observer),
        };
        transcript.append(system, Speaker::System);
        transcript
    }

    pub fn append(&mut self, text: impl Into<String>, speaker: Speaker) {
        let text = text.into();
        if let Some(observer) = self.observer.as_mut() {
            observer(&text, speaker);
        }
        self.entries.push(Entry { text, speaker });
    }

    /// Prompt text for the next agent turn.
    pub fn render(&self) -> String {
        self.entries.iter().map(|entry| entry.text.as_str()).collect()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcript")
            .field("entries", &self.entries)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}
