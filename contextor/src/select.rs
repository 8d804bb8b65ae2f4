//! Token budgeter: how many ranked context items fit into a prompt.
//!
//! Greedy prefix selection. Items arrive most relevant first and are never
//! reordered or skipped to make room for a later one.

use crate::tokenizer::TokenCounter;

/// Separators inserted around the context block (`prefix \n context \n instruction`).
const FIXED_SEPARATOR_TOKENS: usize = 2;

/// Separator inserted after each item when the context is joined.
const ITEM_SEPARATOR_TOKENS: usize = 1;

/// Wraps one item in its `<record>` delimiters.
pub fn wrap_record(body: &str) -> String {
    format!("<record>\n{body}</record>\n")
}

/// Cost of the fixed texts: prefix, instruction and the two block separators.
pub fn fixed_cost(counter: &dyn TokenCounter, prefix: &str, instruction: &str) -> usize {
    counter.count(prefix) + counter.count(instruction) + FIXED_SEPARATOR_TOKENS
}

/// Cost of an already wrapped item, including its separator.
pub fn item_cost(counter: &dyn TokenCounter, item: &str) -> usize {
    counter.count(item) + ITEM_SEPARATOR_TOKENS
}

/// Largest `k` such that the first `k` item costs sum to strictly less than
/// `budget - fixed`. Returns `0` if the fixed texts alone use up the budget.
pub fn allowed_item_count(budget: f64, fixed: usize, item_costs: &[usize]) -> usize {
    let allowance = budget - fixed as f64;
    let mut cumulative = 0usize;
    item_costs
        .iter()
        .take_while(|cost| {
            cumulative += **cost;
            (cumulative as f64) < allowance
        })
        .count()
}

/// Budget for attempt number `failures` (0-based): halves on every failure.
pub fn effective_budget(base: usize, failures: u32) -> f64 {
    base as f64 / 2f64.powi(failures.min(i32::MAX as u32) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per whitespace-separated word.
    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    #[test]
    fn excludes_the_item_that_would_cross_the_budget() {
        // raw costs [30, 30, 35] + 1 separator each -> cumulative [31, 62, 98]
        let costs = [31, 31, 36];
        assert_eq!(allowed_item_count(100.0, 20, &costs), 2);
        assert_eq!(allowed_item_count(100.0, 20, &[31, 31, 17]), 3);
    }

    #[test]
    fn selection_is_maximal_and_never_over_budget() {
        let costs = [5, 9, 3, 12, 7, 1, 20];
        for budget in 0..80 {
            let k = allowed_item_count(budget as f64, 10, &costs);
            let used: usize = costs[..k].iter().sum();
            let allowance = budget as f64 - 10.0;
            if k > 0 {
                assert!((used as f64) < allowance, "budget {budget}: k={k}");
            }
            if k < costs.len() {
                assert!((used + costs[k]) as f64 >= allowance, "budget {budget}: k={k}");
            }
        }
    }

    #[test]
    fn a_huge_first_item_is_not_skipped_for_smaller_ones() {
        assert_eq!(allowed_item_count(100.0, 0, &[200, 1, 1]), 0);
    }

    #[test]
    fn fixed_text_over_budget_selects_nothing() {
        assert_eq!(allowed_item_count(10.0, 50, &[1, 1]), 0);
        assert_eq!(allowed_item_count(10.0, 10, &[]), 0);
    }

    #[test]
    fn budget_halves_per_failure() {
        assert_eq!(effective_budget(14_900, 0), 14_900.0);
        assert_eq!(effective_budget(14_900, 1), 7_450.0);
        assert_eq!(effective_budget(14_900, 2), 3_725.0);
        for f in 0..6 {
            assert_eq!(effective_budget(1_000, f + 1) * 2.0, effective_budget(1_000, f));
        }
    }

    #[test]
    fn costs_include_delimiters_and_separators() {
        let wrapped = wrap_record("Name: Food Bank\n");
        assert_eq!(wrapped, "<record>\nName: Food Bank\n</record>\n");
        // "<record>", "Name:", "Food", "Bank", "</record>" + separator
        assert_eq!(item_cost(&WordCounter, &wrapped), 6);
        assert_eq!(fixed_cost(&WordCounter, "a b", "c"), 5);
    }
}
