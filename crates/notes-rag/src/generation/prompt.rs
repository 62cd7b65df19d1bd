//! Prompt templates for grounded answers over study notes

use crate::types::SearchHit;

/// Reply the model is told to give when the notes do not cover a question
pub const NOT_IN_NOTES: &str = "I cannot find this information in my study notes";

/// Prompt builder for note-grounded questions
pub struct PromptBuilder;

impl PromptBuilder {
    /// Join retrieved chunk texts, in retrieval order, separated by blank lines
    pub fn build_context(hits: &[SearchHit]) -> String {
        hits.iter()
            .map(|hit| hit.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Build the full prompt with strict grounding
    pub fn build_notes_prompt(question: &str, context: &str) -> String {
        format!(
            r#"You are a helpful study assistant. Answer the question based ONLY on the provided study notes.

STUDY NOTES CONTEXT:
{context}

QUESTION: {question}

INSTRUCTIONS:
1. Answer using ONLY the information from the study notes above
2. If the information isn't in the notes, say "{not_found}"
3. Write in clear, proper sentences with good paragraph structure
4. Be comprehensive but concise
5. Do not add any external knowledge or information not in the notes
6. Format your answer with clear paragraphs and bullet points if helpful

ANSWER:"#,
            context = context,
            question = question,
            not_found = NOT_IN_NOTES,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ChunkSource};

    fn hit(text: &str) -> SearchHit {
        SearchHit {
            chunk: Chunk::new(
                text.to_string(),
                ChunkSource {
                    unit: "unit1".to_string(),
                    source: "unit1.pdf".to_string(),
                    page: 0,
                },
                0,
            ),
            similarity: 0.9,
        }
    }

    #[test]
    fn test_context_keeps_retrieval_order() {
        let context = PromptBuilder::build_context(&[hit("second best"), hit("first"), hit("third")]);
        assert_eq!(context, "second best\n\nfirst\n\nthird");
        assert_eq!(PromptBuilder::build_context(&[]), "");
    }

    #[test]
    fn test_prompt_embeds_question_and_rules() {
        let prompt = PromptBuilder::build_notes_prompt("What is a perceptron?", "A perceptron is a unit.");
        assert!(prompt.contains("STUDY NOTES CONTEXT:\nA perceptron is a unit."));
        assert!(prompt.contains("QUESTION: What is a perceptron?"));
        assert!(prompt.contains(NOT_IN_NOTES));
        assert!(prompt.trim_end().ends_with("ANSWER:"));
    }
}
