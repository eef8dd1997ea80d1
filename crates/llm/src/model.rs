pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Low temperature keeps replies close to the system instruction.
pub const DEFAULT_TEMPERATURE: f64 = 0.4;

/// Model parameters and system instruction bound to one chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model_id: String,
    pub system_instruction: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl SessionConfig {
    pub fn new(model_id: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into().trim().to_string(),
            system_instruction: system_instruction.into(),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u64>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Returns the model used when settings do not name one.
pub fn default_model_for(provider_id: &str) -> &'static str {
    match provider_id {
        "openai" | "rig-openai" => DEFAULT_OPENAI_MODEL,
        _ => DEFAULT_GEMINI_MODEL,
    }
}
