//! Append-only transcript of one simulated call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    #[serde(rename = "AI")]
    Ai,
    User,
    System,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Speaker::Ai => "AI",
            Speaker::User => "User",
            Speaker::System => "System",
        };
        f.write_str(s)
    }
}

/// One immutable line of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub sequence: u64,
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Ordered conversation record. Entries can only be appended.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    next_sequence: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line and return it. Sequence numbers start at 1.
    pub fn append(&mut self, speaker: Speaker, text: impl Into<String>) -> &TranscriptEntry {
        self.next_sequence += 1;
        self.entries.push(TranscriptEntry {
            sequence: self.next_sequence,
            speaker,
            text: text.into(),
            at: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// True once a User line has been answered by an AI line.
    pub fn has_exchange(&self) -> bool {
        let mut user_seen = false;
        for entry in &self.entries {
            match entry.speaker {
                Speaker::User => user_seen = true,
                Speaker::Ai if user_seen => return true,
                _ => {}
            }
        }
        false
    }

    /// `Speaker: text` lines, one per entry.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.speaker, e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Remembers how far a reader got through which call's transcript.
#[derive(Debug, Clone, Default)]
pub struct TranscriptCursor {
    call_id: Option<String>,
    seen: usize,
}

impl TranscriptCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries not returned before. A different call starts from the top.
    pub fn unseen<'a>(
        &mut self,
        call_id: Option<&str>,
        transcript: &'a Transcript,
    ) -> &'a [TranscriptEntry] {
        if self.call_id.as_deref() != call_id || self.seen > transcript.len() {
            self.call_id = call_id.map(str::to_string);
            self.seen = 0;
        }
        let fresh = &transcript.entries[self.seen..];
        self.seen = transcript.len();
        fresh
    }
}
