/// Prompt verbosity presets selected from the token window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStrategy {
    /// Ultra-compact, for windows under 3000 tokens.
    Concise,
    /// Balanced, 3000–6000 tokens.
    Semi,
    /// Detailed, 6000–10000 tokens.
    Expanded,
    /// Comprehensive, above 10000 tokens.
    Large,
}

impl ContextStrategy {
    pub fn from_max_tokens(max_tokens: usize) -> Self {
        if max_tokens < 3000 {
            ContextStrategy::Concise
        } else if max_tokens < 6000 {
            ContextStrategy::Semi
        } else if max_tokens < 10000 {
            ContextStrategy::Expanded
        } else {
            ContextStrategy::Large
        }
    }

    /// Resolve a configured strategy name; `auto` and unknown names fall
    /// back to the token-based selection.
    pub fn resolve(name: &str, max_tokens: usize) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "concise" => ContextStrategy::Concise,
            "semi" => ContextStrategy::Semi,
            "expanded" => ContextStrategy::Expanded,
            "large" => ContextStrategy::Large,
            "auto" | "" => Self::from_max_tokens(max_tokens),
            other => {
                log::warn!(
                    "Unknown context strategy '{}', falling back to auto",
                    other
                );
                Self::from_max_tokens(max_tokens)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContextStrategy::Concise => "concise",
            ContextStrategy::Semi => "semi",
            ContextStrategy::Expanded => "expanded",
            ContextStrategy::Large => "large",
        }
    }

    /// Cap on tables rendered into the schema section when no focus
    /// list restricts it.
    pub fn max_schema_tables(&self) -> usize {
        match self {
            ContextStrategy::Concise => 15,
            ContextStrategy::Semi => 30,
            ContextStrategy::Expanded => 50,
            ContextStrategy::Large => 100,
        }
    }
}

/// Per-section token allocations for one strategy.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    pub max_tokens: usize,
    pub system_prompt: usize,
    pub schema: usize,
    pub conversation: usize,
    pub error_context: usize,
    pub reserved: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize, strategy: ContextStrategy) -> Self {
        // Percentages per strategy: system / schema / history / error / reserve.
        let (system, schema, conversation, error, reserve) = match strategy {
            ContextStrategy::Concise => (15, 40, 20, 15, 10),
            ContextStrategy::Semi => (12, 45, 20, 13, 10),
            ContextStrategy::Expanded => (10, 50, 20, 10, 10),
            ContextStrategy::Large => (8, 55, 20, 10, 7),
        };

        Self {
            max_tokens,
            system_prompt: max_tokens * system / 100,
            schema: max_tokens * schema / 100,
            conversation: max_tokens * conversation / 100,
            error_context: max_tokens * error / 100,
            reserved: max_tokens * reserve / 100,
        }
    }
}

/// Token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(4)
}

const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Truncate to a token budget, preserving a prefix and appending the
/// truncation marker. The result always estimates within the budget.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }

    let char_limit = (max_tokens * 4).saturating_sub(TRUNCATION_MARKER.len());
    let prefix: String = text.chars().take(char_limit).collect();
    format!("{}{}", prefix, TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_thresholds() {
        assert_eq!(
            ContextStrategy::from_max_tokens(2000),
            ContextStrategy::Concise
        );
        assert_eq!(
            ContextStrategy::from_max_tokens(3000),
            ContextStrategy::Semi
        );
        assert_eq!(
            ContextStrategy::from_max_tokens(6000),
            ContextStrategy::Expanded
        );
        assert_eq!(
            ContextStrategy::from_max_tokens(10000),
            ContextStrategy::Large
        );
    }

    #[test]
    fn named_strategy_overrides_auto() {
        assert_eq!(
            ContextStrategy::resolve("concise", 50000),
            ContextStrategy::Concise
        );
        assert_eq!(
            ContextStrategy::resolve("auto", 50000),
            ContextStrategy::Large
        );
    }

    #[test]
    fn budget_sections_sum_within_max() {
        for max_tokens in [1000, 4000, 8000, 16000] {
            for strategy in [
                ContextStrategy::Concise,
                ContextStrategy::Semi,
                ContextStrategy::Expanded,
                ContextStrategy::Large,
            ] {
                let budget = TokenBudget::new(max_tokens, strategy);
                let total = budget.system_prompt
                    + budget.schema
                    + budget.conversation
                    + budget.error_context
                    + budget.reserved;
                assert!(total <= max_tokens, "{strategy:?} overflows at {max_tokens}");
            }
        }
    }

    #[test]
    fn estimation_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn truncation_fits_budget_and_marks() {
        let text = "x".repeat(1000);
        let truncated = truncate_to_tokens(&text, 50);
        assert!(truncated.ends_with("... (truncated)"));
        assert!(estimate_tokens(&truncated) <= 50);
        assert!(truncated.starts_with("xxx"));
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_to_tokens("SELECT 1", 100), "SELECT 1");
    }
}
