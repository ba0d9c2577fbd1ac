//! Bounded prompt assembly.
//!
//! The composed prompt has a fixed layout:
//!
//! ```text
//! <system role>
//!
//! CONTEXT: <context>
//!
//! USER QUERY: <query>
//!
//! RELEVANT DOCUMENT CONTENT:        (only when at least one chunk fits)
//! [Source 1: policy.pdf]
//! <chunk text>
//!
//! INSTRUCTIONS:
//! 1. ...
//!
//! Please provide your analysis:
//! ```
//!
//! Chunks go in rank order. When the whole set does not fit within
//! `max_chars`, the lowest-ranked chunks are dropped until it does; chunk
//! text is never cut.

use crate::models::RankedChunk;

pub const DEFAULT_MAX_PROMPT_CHARS: usize = 12_000;

pub const DEFAULT_CONTEXT: &str = "General document query";

pub const DEFAULT_SYSTEM_ROLE: &str = "You are a document analysis assistant specialized in \
insurance policies, contracts, and legal documents.\n\n\
Your task is to provide clear, accurate, and helpful answers based on the provided document content.";

const CONTENT_HEADER: &str = "RELEVANT DOCUMENT CONTENT:\n";

const INSTRUCTIONS: &str = "INSTRUCTIONS:\n\
1. Analyze the user query carefully\n\
2. Extract relevant information from the provided document content\n\
3. Provide a clear, structured answer\n\
4. If the information is not available in the documents, clearly state that\n\
5. Include specific details like coverage amounts, exclusions, waiting periods, etc.\n\
6. Format your response in a professional, easy-to-understand manner\n\
7. If applicable, mention the source document for key information\n";

const NO_CONTENT_INSTRUCTION: &str = "8. No document content matched this query; \
say that the information is not available in the documents\n";

const CLOSING: &str = "\nPlease provide your analysis:";

/// The payload sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub text: String,
    /// Number of ranked chunks included, always a prefix of the ranking.
    pub chunks_included: usize,
}

#[derive(Debug, Clone)]
pub struct PromptComposer {
    system_role: String,
    max_chars: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_ROLE, DEFAULT_MAX_PROMPT_CHARS)
    }
}

impl PromptComposer {
    pub fn new(system_role: impl Into<String>, max_chars: usize) -> Self {
        Self {
            system_role: system_role.into(),
            max_chars,
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Assemble the prompt for `query`, `context`, and `ranked` chunks.
    ///
    /// A missing or blank context falls back to [`DEFAULT_CONTEXT`]. The
    /// fixed parts are always present even if they alone exceed the
    /// budget; only chunk sections are subject to dropping.
    pub fn compose(
        &self,
        query: &str,
        context: Option<&str>,
        ranked: &[RankedChunk],
    ) -> ComposedPrompt {
        let context = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CONTEXT);
        let head = format!(
            "{}\n\nCONTEXT: {}\n\nUSER QUERY: {}\n\n",
            self.system_role, context, query
        );

        let sections: Vec<String> = ranked
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "[Source {}: {}]\n{}\n\n",
                    i + 1,
                    r.chunk.document_name,
                    r.chunk.content
                )
            })
            .collect();

        let fixed_len = char_len(&head) + char_len(INSTRUCTIONS) + char_len(CLOSING);
        let mut included = 0usize;
        let mut body_len = 0usize;
        for section in &sections {
            let header_len = if included == 0 {
                char_len(CONTENT_HEADER)
            } else {
                0
            };
            let next = fixed_len + body_len + header_len + char_len(section);
            if next > self.max_chars {
                break;
            }
            body_len += header_len + char_len(section);
            included += 1;
        }

        let mut text = head;
        if included > 0 {
            text.push_str(CONTENT_HEADER);
            for section in &sections[..included] {
                text.push_str(section);
            }
        }
        text.push_str(INSTRUCTIONS);
        if included == 0 {
            text.push_str(NO_CONTENT_INSTRUCTION);
        }
        text.push_str(CLOSING);

        ComposedPrompt {
            text,
            chunks_included: included,
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateChunk;
    use chrono::Utc;

    fn ranked(rank: usize, name: &str, content: &str) -> RankedChunk {
        RankedChunk {
            chunk: CandidateChunk {
                chunk_id: format!("c{}", rank),
                document_id: "d1".to_string(),
                document_name: name.to_string(),
                document_created_at: Utc::now(),
                chunk_index: rank as i64 - 1,
                content: content.to_string(),
            },
            score: 1.0,
            rank,
        }
    }

    #[test]
    fn test_no_chunks_has_no_source_sections() {
        let prompt = PromptComposer::default().compose("What is covered?", None, &[]);
        assert_eq!(prompt.chunks_included, 0);
        assert!(!prompt.text.contains("RELEVANT DOCUMENT CONTENT"));
        assert!(!prompt.text.contains("[Source"));
        assert!(prompt.text.contains("CONTEXT: General document query"));
        assert!(prompt.text.contains("USER QUERY: What is covered?"));
        assert!(prompt.text.contains("8. No document content matched"));
        assert!(prompt.text.ends_with("Please provide your analysis:"));
    }

    #[test]
    fn test_chunks_labeled_in_rank_order() {
        let chunks = vec![
            ranked(1, "policy.pdf", "First chunk."),
            ranked(2, "terms.docx", "Second chunk."),
        ];
        let prompt = PromptComposer::default().compose("q", Some("Health plan"), &chunks);
        assert_eq!(prompt.chunks_included, 2);
        let first = prompt.text.find("[Source 1: policy.pdf]\nFirst chunk.").unwrap();
        let second = prompt.text.find("[Source 2: terms.docx]\nSecond chunk.").unwrap();
        assert!(first < second);
        assert!(prompt.text.contains("CONTEXT: Health plan"));
        assert!(!prompt.text.contains("8. No document content"));
    }

    #[test]
    fn test_budget_drops_lowest_ranked_whole_chunks() {
        let composer = PromptComposer::default();
        let base = composer.compose("q", None, &[]).text;
        let chunks = vec![
            ranked(1, "a.txt", &"x".repeat(300)),
            ranked(2, "b.txt", &"y".repeat(300)),
            ranked(3, "c.txt", &"0".repeat(300)),
        ];
        // Room for roughly two chunk sections on top of the fixed text.
        let budget = base.chars().count() + 700;
        let prompt = PromptComposer::new(DEFAULT_SYSTEM_ROLE, budget).compose("q", None, &chunks);

        assert_eq!(prompt.chunks_included, 2);
        assert!(prompt.text.chars().count() <= budget);
        assert!(prompt.text.contains(&"x".repeat(300)));
        assert!(prompt.text.contains(&"y".repeat(300)));
        assert!(!prompt.text.contains(&"0".repeat(300)));
        assert!(!prompt.text.contains("[Source 3"));
    }

    #[test]
    fn test_tiny_budget_keeps_fixed_text_only() {
        let chunks = vec![ranked(1, "a.txt", "some text")];
        let prompt = PromptComposer::new("role", 10).compose("q", None, &chunks);
        assert_eq!(prompt.chunks_included, 0);
        assert!(prompt.text.starts_with("role"));
        assert!(!prompt.text.contains("some text"));
    }

    #[test]
    fn test_deterministic() {
        let chunks = vec![ranked(1, "a.txt", "alpha"), ranked(2, "b.txt", "beta")];
        let composer = PromptComposer::default();
        assert_eq!(
            composer.compose("q", Some("ctx"), &chunks),
            composer.compose("q", Some("ctx"), &chunks)
        );
    }
}
