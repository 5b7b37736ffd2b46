//! Token-budget fitting for compressed facts.
//!
//! Token counts are estimated as `ceil(chars / chars_per_token)`, which is
//! monotone in length and close enough for budgeting prompt context.

use crate::compress::truncate_chars;
use crate::models::FactRecord;
use crate::params::BudgetParams;

/// Estimated token count of `text`.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> usize {
    text.chars().count().div_ceil(chars_per_token.max(1))
}

/// Facts that fit the budget, in input order.
#[derive(Debug, Clone, Default)]
pub struct BudgetFit {
    pub selected: Vec<FactRecord>,
    /// Nothing fit, so the top facts were included in truncated form.
    pub forced: bool,
    pub tokens: usize,
}

/// Greedily keep facts that fit the remaining budget.
///
/// A fact that alone exceeds what is left is skipped, not treated as the
/// end of the list. If nothing at all fits, the top `max_forced` facts are
/// force-included truncated to `tiny_fact_chars`, and `forced` is set.
pub fn fit_to_budget(facts: Vec<FactRecord>, token_budget: usize, params: &BudgetParams) -> BudgetFit {
    let mut remaining = token_budget;
    let mut fit = BudgetFit::default();

    for fact in &facts {
        let tokens = estimate_tokens(&fact.fact, params.chars_per_token);
        if tokens <= remaining {
            remaining -= tokens;
            fit.tokens += tokens;
            fit.selected.push(fact.clone());
        }
    }

    if fit.selected.is_empty() && !facts.is_empty() {
        fit.forced = true;
        for fact in facts.into_iter().take(params.max_forced) {
            let tiny = truncate_chars(&fact.fact, params.tiny_fact_chars);
            fit.tokens += estimate_tokens(&tiny, params.chars_per_token);
            fit.selected.push(FactRecord { fact: tiny, ..fact });
        }
    }

    fit
}
