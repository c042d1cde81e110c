//! Per-token pricing for the models we know about.

use rust_decimal::Decimal;

/// (input, output) USD cost per token for a model name, matched by prefix.
pub fn model_cost(model: &str) -> Option<(Decimal, Decimal)> {
    // Prices are per million tokens, scaled down to per-token.
    let per_million = |input: i64, output: i64, scale: u32| {
        (
            Decimal::new(input, scale) / Decimal::from(1_000_000),
            Decimal::new(output, scale) / Decimal::from(1_000_000),
        )
    };

    let model = model.to_ascii_lowercase();
    if model.starts_with("gpt-4o-mini") {
        Some(per_million(15, 60, 2))
    } else if model.starts_with("gpt-4o") {
        Some(per_million(250, 1000, 2))
    } else if model.starts_with("gpt-3.5") {
        Some(per_million(50, 150, 2))
    } else if model.starts_with("claude-3-5-haiku") || model.starts_with("claude-haiku") {
        Some(per_million(80, 400, 2))
    } else if model.starts_with("claude") {
        Some(per_million(300, 1500, 2))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mini_is_cheaper_than_full() {
        let (mini_in, _) = model_cost("gpt-4o-mini").unwrap();
        let (full_in, _) = model_cost("gpt-4o").unwrap();
        assert!(mini_in < full_in);
    }

    #[test]
    fn unknown_model_has_no_price() {
        assert!(model_cost("llama-3").is_none());
    }

    #[test]
    fn price_is_per_token() {
        let (input, output) = model_cost("gpt-4o-mini").unwrap();
        assert_eq!(input * Decimal::from(1_000_000), Decimal::new(15, 2));
        assert_eq!(output * Decimal::from(1_000_000), Decimal::new(60, 2));
    }
}
