//! Model pricing
//!
//! USD prices per million tokens for the models the pipelines call.

use tracing::warn;

/// (model, input per million, output per million)
const PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4o-2024-08-06", 2.50, 10.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4", 30.00, 60.00),
    ("gpt-4-turbo", 10.00, 30.00),
];

/// Input and output price per million tokens, if the model is known.
pub fn model_price(model: &str) -> Option<(f64, f64)> {
    PRICES
        .iter()
        .find(|(name, _, _)| *name == model)
        .map(|(_, input, output)| (*input, *output))
}

/// Cost of a call in USD. Unknown models cost nothing.
pub fn calculate_price(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    match model_price(model) {
        Some((input, output)) => {
            (input_tokens as f64 * input + output_tokens as f64 * output) / 1_000_000.0
        }
        None => {
            warn!("No pricing for model {}, recording cost as 0", model);
            0.0
        }
    }
}
