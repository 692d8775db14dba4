//! Answer synthesis.
//!
//! Combines the active instruction, recent conversation turns, retrieved
//! context, and the question into one LLM call, then appends a sources
//! block and records the completed turn.
//!
//! When retrieval found nothing, the LLM is still invoked, grounded only in
//! chat history; the sentinel never reaches the prompt or the user.

use std::sync::Arc;

use crate::errors::ApiError;
use crate::history::{ConversationStore, ConversationTurn};
use crate::llm::LlmClient;
use crate::prompts::{PromptStore, DEFAULT_INSTRUCTION};
use crate::retriever::{Reference, RetrievedContext};

const EMPTY_CONTEXT_NOTE: &str = "No retrieved context is available for this question.";

pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptStore>,
    memory: Arc<ConversationStore>,
    history_limit: i64,
}

impl AnswerSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptStore>,
        memory: Arc<ConversationStore>,
        history_limit: i64,
    ) -> Self {
        Self {
            llm,
            prompts,
            memory,
            history_limit,
        }
    }

    pub async fn answer(
        &self,
        conversation_id: &str,
        question: &str,
        context: &RetrievedContext,
    ) -> Result<String, ApiError> {
        let instruction = self
            .prompts
            .active_instruction()
            .await?
            .unwrap_or_else(|| DEFAULT_INSTRUCTION.to_string());

        let turns = self.memory.recent(conversation_id, self.history_limit).await?;
        let prompt = build_prompt(&instruction, &turns, context, question);

        tracing::debug!(conversation_id, prompt_chars = prompt.len(), "invoking llm");
        let raw = self.llm.complete(&prompt).await?;
        let answer = append_citations(raw, &context.references);

        // The turn is recorded only after a successful completion, so a
        // failed call leaves no half-written history.
        self.memory.append(conversation_id, question, &answer).await?;
        Ok(answer)
    }
}

/// Assembles the single prompt sent to the model.
pub fn build_prompt(
    instruction: &str,
    turns: &[ConversationTurn],
    context: &RetrievedContext,
    question: &str,
) -> String {
    let mut history = String::new();
    for turn in turns {
        history.push_str(&format!("User: {}\nAssistant: {}\n", turn.question, turn.answer));
    }
    if history.is_empty() {
        history.push_str("(none)\n");
    }

    let context_text = if context.is_no_information() {
        EMPTY_CONTEXT_NOTE
    } else {
        context.text.as_str()
    };

    format!(
        "{instruction}\n\n\
         # Previous Chat History:\n{history}\n\
         # Question:\n{question}\n\n\
         # Context:\n{context_text}\n\n\
         # Answer:"
    )
}

/// Appends a human-readable sources block when any reference exists, in
/// retrieval order (already similarity-ranked).
fn append_citations(answer: String, references: &[Reference]) -> String {
    if references.is_empty() {
        return answer;
    }

    let mut out = answer;
    out.push_str("\n\nSources:\n");
    for reference in references {
        if reference.origin.is_empty() {
            out.push_str(&format!("- {}\n", reference.title));
        } else {
            out.push_str(&format!("- {} ({})\n", reference.title, reference.origin));
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::retriever::Reference;

    /// Records every prompt and returns a fixed completion.
    struct CapturingLlm {
        prompts: Mutex<Vec<String>>,
        reply: String,
    }

    impl CapturingLlm {
        fn new(reply: &str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: reply.to_string(),
            }
        }
    }

    #[async_trait]
    impl LlmClient for CapturingLlm {
        fn name(&self) -> &str {
            "capturing"
        }

        async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    async fn stores() -> (Arc<PromptStore>, Arc<ConversationStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let prompts = Arc::new(PromptStore::new(dir.path().join("db.sqlite")).await.unwrap());
        let memory = Arc::new(
            ConversationStore::new(dir.path().join("chat.sqlite"))
                .await
                .unwrap(),
        );
        (prompts, memory, dir)
    }

    fn context_with(title: &str) -> RetrievedContext {
        RetrievedContext {
            text: format!("[1] (Source: {title}, file://{title}, relevance: 0.90)\nchunk text"),
            references: vec![Reference {
                title: title.to_string(),
                origin: format!("file://{title}"),
                relevance_score: 0.9,
            }],
        }
    }

    #[tokio::test]
    async fn appends_citations_and_records_turn() {
        let (prompts, memory, _dir) = stores().await;
        let llm = Arc::new(CapturingLlm::new("The answer."));
        let synthesizer =
            AnswerSynthesizer::new(llm.clone(), prompts, memory.clone(), 10);

        let conversation = memory.create_conversation(None).await.unwrap();
        let answer = synthesizer
            .answer(&conversation, "What is it?", &context_with("Doc1"))
            .await
            .unwrap();

        assert!(answer.starts_with("The answer."));
        assert!(answer.contains("Sources:"));
        assert!(answer.contains("- Doc1 (file://Doc1)"));

        let turns = memory.recent(&conversation, 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].question, "What is it?");
        assert_eq!(turns[0].answer, answer);
    }

    #[tokio::test]
    async fn second_turn_prompt_contains_first_exchange() {
        let (prompts, memory, _dir) = stores().await;
        let llm = Arc::new(CapturingLlm::new("Reply."));
        let synthesizer =
            AnswerSynthesizer::new(llm.clone(), prompts, memory.clone(), 10);

        let conversation = memory.create_conversation(None).await.unwrap();
        synthesizer
            .answer(&conversation, "first question", &context_with("Doc1"))
            .await
            .unwrap();
        synthesizer
            .answer(&conversation, "second question", &context_with("Doc1"))
            .await
            .unwrap();

        let prompts_sent = llm.prompts.lock().unwrap();
        assert_eq!(prompts_sent.len(), 2);
        assert!(prompts_sent[1].contains("first question"));
        assert!(prompts_sent[1].contains("Reply."));
        assert!(prompts_sent[1].contains("second question"));
    }

    #[tokio::test]
    async fn empty_context_still_invokes_llm_without_citations() {
        let (prompts, memory, _dir) = stores().await;
        let llm = Arc::new(CapturingLlm::new("From history alone."));
        let synthesizer =
            AnswerSynthesizer::new(llm.clone(), prompts, memory.clone(), 10);

        let conversation = memory.create_conversation(None).await.unwrap();
        let answer = synthesizer
            .answer(&conversation, "q", &RetrievedContext::no_information())
            .await
            .unwrap();

        assert_eq!(answer, "From history alone.");
        assert!(!answer.contains("Sources:"));

        let prompts_sent = llm.prompts.lock().unwrap();
        assert!(prompts_sent[0].contains(EMPTY_CONTEXT_NOTE));
        assert!(!prompts_sent[0].contains(RetrievedContext::NO_INFORMATION));
    }

    #[tokio::test]
    async fn uses_active_prompt_with_default_fallback() {
        let (prompts, memory, _dir) = stores().await;
        let llm = Arc::new(CapturingLlm::new("ok"));
        let synthesizer = AnswerSynthesizer::new(
            llm.clone(),
            prompts.clone(),
            memory.clone(),
            10,
        );

        let conversation = memory.create_conversation(None).await.unwrap();
        synthesizer
            .answer(&conversation, "q1", &context_with("Doc1"))
            .await
            .unwrap();

        let id = prompts
            .create("pirate", "Answer like a pirate.", "admin")
            .await
            .unwrap();
        prompts.activate(id).await.unwrap();

        synthesizer
            .answer(&conversation, "q2", &context_with("Doc1"))
            .await
            .unwrap();

        let prompts_sent = llm.prompts.lock().unwrap();
        assert!(prompts_sent[0].starts_with(DEFAULT_INSTRUCTION));
        assert!(prompts_sent[1].starts_with("Answer like a pirate."));
    }
}
