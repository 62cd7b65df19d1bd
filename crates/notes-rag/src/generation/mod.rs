//! Answer generation over retrieved note chunks

mod answer;
pub mod prompt;

pub use answer::{
    AnswerGenerator, EMPTY_RESPONSE_PREFIX, GENERATION_ERROR_PREFIX, NO_CONTEXT_MESSAGE,
    RETRIEVAL_ONLY_PREFIX,
};
pub use prompt::{PromptBuilder, NOT_IN_NOTES};
