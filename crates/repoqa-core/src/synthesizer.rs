//! Answer generation constrained to retrieved context.

use std::fmt::Write as _;
use std::sync::Arc;

use repoqa_index::intent::Intent;
use repoqa_index::metadata::IndexedDocument;
use repoqa_index::retriever::RetrievalResult;
use repoqa_llm::provider::{LlmProvider, Message};
use repoqa_llm::retry::{RetryPolicy, call_with_retry};
use repoqa_llm::LlmError;
use serde::Serialize;

use crate::citation::{Citation, CitationCheck, ContextHeader, REFUSAL, strip_citations, validate_citations};

const SYSTEM_PROMPT: &str = "\
You answer questions about a code repository using only the code excerpts provided.\n\
\n\
Rules:\n\
- Use only the supplied context. Do not rely on outside knowledge of the project.\n\
- Be concise and precise.\n\
- Cite every claim with the header of the excerpt it comes from, exactly as written: [path:start-end].\n\
- Never cite a file or line range that does not appear as an excerpt header.\n\
- If the context does not contain the answer, reply exactly: I don't know based on the indexed code.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Verified,
    Unverified {
        /// Citation markers that matched no supplied chunk, already removed
        /// from the answer text.
        rejected: Vec<String>,
        missing_citations: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    /// Headers of every chunk the model was shown, in context order.
    pub sources: Vec<ContextHeader>,
    pub intent: Intent,
    pub verification: Verification,
}

impl Answer {
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verification == Verification::Verified
    }
}

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// Extra generations allowed after a citation check fails.
    pub regeneration_attempts: u32,
    pub retry: RetryPolicy,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            regeneration_attempts: 1,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Synthesizer<P: LlmProvider> {
    provider: Arc<P>,
    config: SynthesizerConfig,
}

impl<P: LlmProvider> Synthesizer<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, config: SynthesizerConfig) -> Self {
        Self { provider, config }
    }

    /// Generate an answer to `question` from `retrieval`.
    ///
    /// A reply whose citations fail validation is regenerated with stricter
    /// instructions up to `regeneration_attempts` times. If it still fails,
    /// the invalid markers are stripped and the answer is flagged unverified.
    ///
    /// # Errors
    ///
    /// Returns the provider error once retries are exhausted.
    pub async fn synthesize(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
    ) -> Result<Answer, LlmError> {
        let headers: Vec<ContextHeader> = retrieval.iter().map(ContextHeader::from_document).collect();
        let mut messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(user_prompt(question, retrieval)),
        ];

        let mut attempt = 0u32;
        let (text, check) = loop {
            let text = call_with_retry("chat", &self.config.retry, || {
                self.provider.chat(&messages)
            })
            .await?;
            let check = validate_citations(&text, &headers);
            if check.is_verified() || attempt >= self.config.regeneration_attempts {
                break (text, check);
            }
            attempt += 1;
            tracing::info!(
                attempt,
                rejected = check.rejected.len(),
                missing_citations = check.missing_citations,
                "citation check failed, regenerating"
            );
            messages.push(Message::assistant(text));
            messages.push(Message::user(stricter_prompt(&headers, &check)));
        };

        Ok(finish(text, check, headers, retrieval.intent))
    }
}

fn finish(text: String, check: CitationCheck, sources: Vec<ContextHeader>, intent: Intent) -> Answer {
    if check.is_verified() {
        return Answer {
            text: text.trim().to_owned(),
            citations: check.valid,
            sources,
            intent,
            verification: Verification::Verified,
        };
    }
    tracing::warn!(
        rejected = ?check.rejected,
        missing_citations = check.missing_citations,
        "answer failed citation check"
    );
    Answer {
        text: strip_citations(&text, &check.rejected).trim().to_owned(),
        citations: check.valid,
        sources,
        intent,
        verification: Verification::Unverified {
            rejected: check.rejected,
            missing_citations: check.missing_citations,
        },
    }
}

/// One section per chunk: `### [path:start-end] (language, kind)` and a fenced body.
#[must_use]
pub fn build_context<'a>(documents: impl IntoIterator<Item = &'a IndexedDocument>) -> String {
    let mut out = String::new();
    for doc in documents {
        let header = ContextHeader::from_document(doc);
        let fence = fence_for(&doc.chunk.text);
        let _ = writeln!(
            out,
            "### {} ({}, {})",
            header.citation(),
            doc.language,
            doc.chunk.kind
        );
        let _ = writeln!(out, "{fence}{}", doc.language);
        out.push_str(&doc.chunk.text);
        if !doc.chunk.text.ends_with('\n') {
            out.push('\n');
        }
        let _ = writeln!(out, "{fence}\n");
    }
    out
}

/// A backtick fence longer than any run inside `text`.
fn fence_for(text: &str) -> String {
    let longest = text
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

fn user_prompt(question: &str, retrieval: &RetrievalResult) -> String {
    format!(
        "Context:\n\n{}Question: {question}",
        build_context(retrieval.iter())
    )
}

fn stricter_prompt(headers: &[ContextHeader], check: &CitationCheck) -> String {
    let mut prompt = String::from("Your previous answer broke the citation rules.\n");
    if !check.rejected.is_empty() {
        let _ = writeln!(
            prompt,
            "These citations do not match any excerpt: {}",
            check.rejected.join(", ")
        );
    }
    if check.missing_citations {
        prompt.push_str("It made claims without citing any excerpt.\n");
    }
    prompt.push_str("\nThe only citations you may use are:\n");
    for header in headers {
        let _ = writeln!(prompt, "- {}", header.citation());
    }
    let _ = write!(
        prompt,
        "\nRewrite the answer. Copy citations exactly from the list above and cite every claim. \
         If the excerpts do not answer the question, reply exactly: {REFUSAL}"
    );
    prompt
}
