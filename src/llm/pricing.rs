//! Per-model token pricing (USD per 1M tokens).

use tracing::warn;

/// Prompt size above which tiered models switch to their higher rate.
pub const LONG_CONTEXT_THRESHOLD: u64 = 200_000;

/// Model used to price unknown model names.
pub const FALLBACK_MODEL: &str = "gemini-2.5-pro";

/// Input and output rates in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub input: f64,
    pub output: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pricing {
    Flat(Rates),
    /// Rate depends on prompt size relative to [`LONG_CONTEXT_THRESHOLD`].
    Tiered { short: Rates, long: Rates },
}

const GEMINI_25_PRO: Pricing = Pricing::Tiered {
    short: Rates {
        input: 1.25,
        output: 10.00,
    },
    long: Rates {
        input: 2.50,
        output: 15.00,
    },
};

fn pricing_for(model: &str) -> Option<Pricing> {
    let pricing = match model {
        "gemini-2.5-flash" => Pricing::Flat(Rates {
            input: 0.03,
            output: 2.50,
        }),
        "gemini-3-flash-preview" => Pricing::Flat(Rates {
            input: 0.50,
            output: 3.00,
        }),
        FALLBACK_MODEL => GEMINI_25_PRO,
        // Cache-miss input rate
        m if m.starts_with("deepseek") => Pricing::Flat(Rates {
            input: 0.28,
            output: 0.42,
        }),
        _ => return None,
    };
    Some(pricing)
}

/// Rates for a model at a given prompt size.
///
/// Unknown models are priced as [`FALLBACK_MODEL`] with a warning.
pub fn rates_for(model: &str, input_tokens: u64) -> Rates {
    let pricing = pricing_for(model).unwrap_or_else(|| {
        warn!(
            "No pricing for model '{}', using {} rates",
            model, FALLBACK_MODEL
        );
        GEMINI_25_PRO
    });

    match pricing {
        Pricing::Flat(rates) => rates,
        Pricing::Tiered { short, long } => {
            if input_tokens <= LONG_CONTEXT_THRESHOLD {
                short
            } else {
                long
            }
        }
    }
}

/// Whether the model has an entry in the price table.
pub fn is_known_model(model: &str) -> bool {
    pricing_for(model).is_some()
}

/// Cost of `tokens` at `rate_per_million`.
pub fn fee(tokens: u64, rate_per_million: f64) -> f64 {
    tokens as f64 / 1_000_000.0 * rate_per_million
}
