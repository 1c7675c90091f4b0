//! The model allow-list the upstream service is known to serve.

/// Model used when a request names none.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Models the upstream service accepts through the unified chat mode.
pub const KNOWN_MODELS: &[&str] = &[
    "gpt-4o-mini",
    "gpt-5-nano",
    "gemini-2.5-flash",
    "deepseek-chat",
];

pub fn default_models() -> Vec<String> {
    KNOWN_MODELS.iter().map(|m| (*m).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_is_known() {
        assert!(KNOWN_MODELS.contains(&DEFAULT_MODEL));
    }
}
