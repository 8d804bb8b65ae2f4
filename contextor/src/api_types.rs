//! Public API types re-used by the CLI.

/// Result of one question.
///
/// # Example
/// ```
/// use contextor::AskOutcome;
/// let out = AskOutcome { answer: None, context_count: 100 };
/// assert!(out.answer.is_none());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AskOutcome {
    /// `None` when every attempt was cut off before a natural stop.
    pub answer: Option<String>,
    /// Documents retrieved and offered to the prompt assembler.
    pub context_count: usize,
}
