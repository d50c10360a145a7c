//! Model selection for smart routing.

/// Chooses a model for a step from its resolved input.
///
/// Implementations must be pure: same context, same model.
pub trait ModelRouter: Send + Sync {
    fn choose_model(&self, context: &str) -> String;
}

/// Picks a model by input length.
#[derive(Debug, Clone)]
pub struct SizeTierRouter {
    /// `(max_chars, model)` pairs, ascending by `max_chars`
    tiers: Vec<(usize, String)>,
    fallback: String,
}

impl SizeTierRouter {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            tiers: Vec::new(),
            fallback: fallback.into(),
        }
    }

    /// Add a tier used for contexts of at most `max_chars` characters.
    pub fn tier(mut self, max_chars: usize, model: impl Into<String>) -> Self {
        self.tiers.push((max_chars, model.into()));
        self.tiers.sort_by_key(|(max, _)| *max);
        self
    }
}

impl Default for SizeTierRouter {
    fn default() -> Self {
        Self::new("long-context")
            .tier(2_000, "fast")
            .tier(20_000, "balanced")
    }
}

impl ModelRouter for SizeTierRouter {
    fn choose_model(&self, context: &str) -> String {
        let len = context.chars().count();
        self.tiers
            .iter()
            .find(|(max, _)| len <= *max)
            .map(|(_, model)| model.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}
