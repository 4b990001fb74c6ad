use hiveboard_types::LlmCallData;

/// Per-1k-token pricing for one model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPrice {
    pub in_per_1k: f64,
    pub out_per_1k: f64,
}

// Static catalog. Unknown models simply get no estimate; the dashboard shows
// the call with cost null rather than a guess.
const PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o", ModelPrice { in_per_1k: 0.0025, out_per_1k: 0.01 }),
    ("gpt-4o-mini", ModelPrice { in_per_1k: 0.00015, out_per_1k: 0.0006 }),
    ("gpt-4.1", ModelPrice { in_per_1k: 0.002, out_per_1k: 0.008 }),
    ("gpt-4.1-mini", ModelPrice { in_per_1k: 0.0004, out_per_1k: 0.0016 }),
    ("o3", ModelPrice { in_per_1k: 0.002, out_per_1k: 0.008 }),
    ("claude-sonnet-4", ModelPrice { in_per_1k: 0.003, out_per_1k: 0.015 }),
    ("claude-opus-4", ModelPrice { in_per_1k: 0.015, out_per_1k: 0.075 }),
    ("claude-haiku-3.5", ModelPrice { in_per_1k: 0.0008, out_per_1k: 0.004 }),
    ("gemini-2.5-pro", ModelPrice { in_per_1k: 0.00125, out_per_1k: 0.01 }),
    ("gemini-2.5-flash", ModelPrice { in_per_1k: 0.0003, out_per_1k: 0.0025 }),
    ("deepseek-v3", ModelPrice { in_per_1k: 0.00027, out_per_1k: 0.0011 }),
    ("llama-3.3-70b", ModelPrice { in_per_1k: 0.00059, out_per_1k: 0.00079 }),
];

/// Look up a model's price entry. Exact match first, then prefix match so
/// dated variants ("gpt-4o-2024-11-20") resolve to their family.
pub fn price_for(model: &str) -> Option<ModelPrice> {
    if let Some((_, price)) = PRICES.iter().find(|(name, _)| *name == model) {
        return Some(*price);
    }
    PRICES
        .iter()
        .find(|(name, _)| model.starts_with(name))
        .map(|(_, price)| *price)
}

/// Estimate a call's cost from the static table.
pub fn estimate_cost(model: &str, tokens_in: u64, tokens_out: u64) -> Option<f64> {
    let price = price_for(model)?;
    Some(
        tokens_in as f64 / 1000.0 * price.in_per_1k
            + tokens_out as f64 / 1000.0 * price.out_per_1k,
    )
}

/// Cost reported for an llm_call: the SDK-supplied value wins; otherwise an
/// estimate from the table, flagged as such.
pub fn effective_cost(call: &LlmCallData) -> (Option<f64>, bool) {
    if let Some(cost) = call.cost {
        return (Some(cost), false);
    }
    let model = match call.model.as_deref() {
        Some(model) => model,
        None => return (None, false),
    };
    match estimate_cost(
        model,
        call.tokens_in.unwrap_or(0),
        call.tokens_out.unwrap_or(0),
    ) {
        Some(estimate) => (Some(estimate), true),
        None => (None, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_prefix_lookup() {
        assert!(price_for("gpt-4o").is_some());
        assert!(price_for("gpt-4o-2024-11-20").is_some());
        assert!(price_for("some-local-model").is_none());
    }

    #[test]
    fn test_estimate_math() {
        // 1000 in + 2000 out on gpt-4o: 0.0025 + 2 * 0.01
        let cost = estimate_cost("gpt-4o", 1000, 2000).unwrap();
        assert!((cost - 0.0225).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_cost_wins() {
        let call = LlmCallData {
            model: Some("gpt-4o".to_string()),
            tokens_in: Some(1000),
            tokens_out: Some(1000),
            cost: Some(0.5),
            ..LlmCallData::default()
        };
        let (cost, estimated) = effective_cost(&call);
        assert_eq!(cost, Some(0.5));
        assert!(!estimated);
    }

    #[test]
    fn test_estimate_flagged() {
        let call = LlmCallData {
            model: Some("gpt-4o".to_string()),
            tokens_in: Some(1000),
            tokens_out: Some(0),
            ..LlmCallData::default()
        };
        let (cost, estimated) = effective_cost(&call);
        assert!(cost.is_some());
        assert!(estimated);
    }

    #[test]
    fn test_unknown_model_no_estimate() {
        let call = LlmCallData {
            model: Some("mystery-9b".to_string()),
            tokens_in: Some(1000),
            tokens_out: Some(1000),
            ..LlmCallData::default()
        };
        let (cost, estimated) = effective_cost(&call);
        assert_eq!(cost, None);
        assert!(!estimated);
    }
}
