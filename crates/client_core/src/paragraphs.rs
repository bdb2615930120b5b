use tracing::debug;

pub const DEFAULT_BREAK_THRESHOLD_MS: i64 = 9_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub text: String,
    pub timestamp: i64,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub id: u64,
    pub text: String,
    pub timestamp: i64,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutcome {
    Dropped,
    Started { id: u64 },
    Extended { id: u64 },
    Duplicate { id: u64 },
    Interim,
}

impl FragmentOutcome {
    pub fn changed(self) -> bool {
        matches!(self, Self::Started { .. } | Self::Extended { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ParagraphEngine {
    break_threshold_ms: i64,
    // Chronological; the last entry is the one being extended.
    paragraphs: Vec<Paragraph>,
    last_fragment_at: Option<i64>,
    final_transcript: String,
    interim: Option<String>,
    next_id: u64,
}

impl Default for ParagraphEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BREAK_THRESHOLD_MS)
    }
}

impl ParagraphEngine {
    pub fn new(break_threshold_ms: i64) -> Self {
        Self {
            break_threshold_ms,
            paragraphs: Vec::new(),
            last_fragment_at: None,
            final_transcript: String::new(),
            interim: None,
            next_id: 1,
        }
    }

    pub fn break_threshold_ms(&self) -> i64 {
        self.break_threshold_ms
    }

    pub fn push_fragment(&mut self, fragment: TranscriptFragment) -> FragmentOutcome {
        let text = fragment.text.trim();
        if text.is_empty() {
            return FragmentOutcome::Dropped;
        }

        let starts_paragraph = match (self.paragraphs.last(), self.last_fragment_at) {
            (None, _) | (_, None) => true,
            (Some(_), Some(last)) => {
                fragment.timestamp.saturating_sub(last) >= self.break_threshold_ms
            }
        };
        self.last_fragment_at = Some(fragment.timestamp);

        if starts_paragraph {
            let id = self.allocate_id();
            self.paragraphs.push(Paragraph {
                id,
                text: text.to_string(),
                timestamp: fragment.timestamp,
                source: fragment.source,
            });
            if !self.final_transcript.is_empty() {
                self.final_transcript.push('\n');
            }
            self.final_transcript.push_str(text);
            debug!(paragraph_id = id, "transcript: started paragraph");
            return FragmentOutcome::Started { id };
        }

        let Some(current) = self.paragraphs.last_mut() else {
            return FragmentOutcome::Dropped;
        };
        if current.text == text {
            return FragmentOutcome::Duplicate { id: current.id };
        }
        append_with_space(&mut current.text, text);
        append_with_space(&mut self.final_transcript, text);
        FragmentOutcome::Extended { id: current.id }
    }

    /// Replaces everything with one paragraph per non-empty line, all stamped `now`.
    pub fn replace_with_lines<I, S>(&mut self, lines: I, now: i64)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.paragraphs.clear();
        self.final_transcript.clear();
        self.interim = None;
        self.last_fragment_at = None;
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            let id = self.allocate_id();
            self.paragraphs.push(Paragraph {
                id,
                text: line.to_string(),
                timestamp: now,
                source: None,
            });
            if !self.final_transcript.is_empty() {
                self.final_transcript.push('\n');
            }
            self.final_transcript.push_str(line);
        }
    }

    pub fn set_interim(&mut self, text: &str) {
        let text = text.trim();
        self.interim = (!text.is_empty()).then(|| text.to_string());
    }

    pub fn clear_interim(&mut self) -> bool {
        self.interim.take().is_some()
    }

    pub fn interim(&self) -> Option<&str> {
        self.interim.as_deref()
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &Paragraph> {
        self.paragraphs.iter().rev()
    }

    pub fn current(&self) -> Option<&Paragraph> {
        self.paragraphs.last()
    }

    pub fn recent(&self, count: usize) -> &[Paragraph] {
        let start = self.paragraphs.len().saturating_sub(count);
        &self.paragraphs[start..]
    }

    pub fn final_transcript(&self) -> &str {
        &self.final_transcript
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn append_with_space(target: &mut String, text: &str) {
    if !target.is_empty() && !target.ends_with(char::is_whitespace) {
        target.push(' ');
    }
    target.push_str(text);
}

#[cfg(test)]
#[path = "tests/paragraphs_tests.rs"]
mod tests;
