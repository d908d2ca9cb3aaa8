use super::Usd;
use crate::models::Provider;

/// Price of one model in micro-dollars per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPrice {
    pub provider: Provider,
    pub input_per_million: i64,
    pub output_per_million: i64,
}

const fn price(provider: Provider, input: i64, output: i64) -> ModelPrice {
    ModelPrice {
        provider,
        input_per_million: input,
        output_per_million: output,
    }
}

static PRICE_TABLE: &[(&str, ModelPrice)] = &[
    // Anthropic
    ("claude-3-haiku-20240307", price(Provider::Anthropic, 250_000, 1_250_000)),
    ("claude-3-5-haiku-20241022", price(Provider::Anthropic, 800_000, 4_000_000)),
    ("claude-3-5-sonnet-20241022", price(Provider::Anthropic, 3_000_000, 15_000_000)),
    ("claude-3-7-sonnet-20250219", price(Provider::Anthropic, 3_000_000, 15_000_000)),
    ("claude-sonnet-4-20250514", price(Provider::Anthropic, 3_000_000, 15_000_000)),
    ("claude-opus-4-20250514", price(Provider::Anthropic, 15_000_000, 75_000_000)),
    // OpenAI embeddings
    ("text-embedding-3-small", price(Provider::OpenAi, 20_000, 0)),
    ("text-embedding-3-large", price(Provider::OpenAi, 130_000, 0)),
    ("text-embedding-ada-002", price(Provider::OpenAi, 100_000, 0)),
];

pub fn price_for(model: &str) -> Option<ModelPrice> {
    PRICE_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, price)| *price)
}

/// Cost of one call. Unknown models cost nothing: a pricing gap is logged,
/// never allowed to abort a pipeline.
pub fn cost(model: &str, input_tokens: u64, output_tokens: u64) -> Usd {
    let Some(price) = price_for(model) else {
        tracing::warn!(model, "No price configured for model, recording zero cost");
        return Usd::ZERO;
    };

    let picos = input_tokens as i128 * price.input_per_million as i128
        + output_tokens as i128 * price.output_per_million as i128;
    Usd::from_picos_rounded(picos)
}
