//! Prompt assembler: fixed prefix, budgeted `<record>` context, instruction.

use std::sync::Arc;

use tracing::info;

use crate::select::{allowed_item_count, effective_budget, fixed_cost, item_cost, wrap_record};
use crate::tokenizer::TokenCounter;

/// Opening text describing the records that follow.
pub const PROMPT_PREFIX: &str = "The following records contain information taken from tax records \
for non-profit organizations operating in the US. \
The data for a single organization is delimited by <record> and </record>. \
At the end of these records, there is a question for you to answer about \
these non-profit organizations. \
Try to keep the total response below 500 words.\n";

/// Extra directive added once an attempt was cut off.
pub const BREVITY_DIRECTIVE: &str = "Be *EXTREMELY* BRIEF in your answer. ";

/// Closing instruction including the question.
pub fn instruction(question: &str, failures: u32) -> String {
    let brevity = if failures > 0 { BREVITY_DIRECTIVE } else { "" };
    format!(
        "Please answer the question below about non-profit organizations. \
Some of the records above may not be relevant to the question. Please ignore \
any irrelevant records. The most relevant ones may be near the top of the list. \
Remember to keep the response below 500 words. If you are asked to provide a list, \
you may need to omit some items from the list. \
If so, state that the list is representative and not complete. \
Capitalize any responses appropriately, even if the source data was presented in ALL CAPS. \
{brevity}\
Answer the question precisely and exclude any records that are not relevant to the question. \
The answer should be responsive. \
It's better to provide no response than to provide a response with irrelevant information. \
Base your answer primarily on the records above, but you may fill in \
holes based on any prior knowledge you have of these organizations.\n\
Question: {question}\n\
Answer: "
    )
}

/// Result of [`PromptAssembler::assemble`].
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledPrompt {
    pub prompt: String,
    /// Number of leading items that made it into the context.
    pub selected: usize,
    /// Token allowance used for this attempt.
    pub effective_budget: f64,
    /// Tokenizer estimate for the whole prompt.
    pub estimated_tokens: usize,
}

/// Builds prompts that fit `base_budget` tokens, halving per failure.
#[derive(Clone)]
pub struct PromptAssembler {
    counter: Arc<dyn TokenCounter>,
    base_budget: usize,
}

impl PromptAssembler {
    pub fn new(counter: Arc<dyn TokenCounter>, base_budget: usize) -> Self {
        Self {
            counter,
            base_budget,
        }
    }

    pub fn base_budget(&self) -> usize {
        self.base_budget
    }

    /// `prefix \n selected records \n instruction`.
    ///
    /// `items` are the rendered documents, most relevant first.
    pub fn assemble<S: AsRef<str>>(
        &self,
        question: &str,
        items: &[S],
        failures: u32,
    ) -> AssembledPrompt {
        let counter = self.counter.as_ref();
        let instruction = instruction(question, failures);
        let wrapped: Vec<String> = items.iter().map(|i| wrap_record(i.as_ref())).collect();

        let fixed = fixed_cost(counter, PROMPT_PREFIX, &instruction);
        let costs: Vec<usize> = wrapped.iter().map(|w| item_cost(counter, w)).collect();
        let budget = effective_budget(self.base_budget, failures);
        let selected = allowed_item_count(budget, fixed, &costs);

        let context = wrapped[..selected].join("\n");
        let prompt = format!("{PROMPT_PREFIX}\n{context}\n{instruction}");
        let estimated_tokens = counter.count(&prompt);

        info!(
            estimated_tokens,
            selected,
            candidates = items.len(),
            budget,
            failures,
            "prompt assembled"
        );

        AssembledPrompt {
            prompt,
            selected,
            effective_budget: budget,
            estimated_tokens,
        }
    }
}
