use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use pumpdesk_llm::{
    DEFAULT_TEMPERATURE, ProviderConfig, RIG_GEMINI_PROVIDER_ID, RIG_OPENAI_PROVIDER_ID,
    SessionConfig, default_model_for,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::content::SYSTEM_INSTRUCTION;

pub const DEFAULT_PROVIDER_ID: &str = RIG_GEMINI_PROVIDER_ID;
pub const SETTINGS_DIRECTORY_NAME: &str = "pumpdesk";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "PUMPDESK_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
    /// Empty means the provider's default model.
    #[serde(default)]
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub system_instruction_file: Option<PathBuf>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: String::new(),
            model_name: String::new(),
            temperature: default_temperature(),
            max_tokens: None,
            system_instruction_file: None,
        }
    }
}

impl ProviderSettings {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.provider_id, &self.api_key, &self.endpoint)
    }

    pub fn model_name(&self) -> String {
        if self.model_name.trim().is_empty() {
            default_model_for(&self.provider_id).to_string()
        } else {
            self.model_name.trim().to_string()
        }
    }

    pub fn session_config(&self) -> Result<SessionConfig, SettingsError> {
        let instruction = match &self.system_instruction_file {
            Some(path) => std::fs::read_to_string(path).context(ReadInstructionSnafu {
                stage: "read-system-instruction",
                path: path.clone(),
            })?,
            None => SYSTEM_INSTRUCTION.to_string(),
        };

        Ok(SessionConfig::new(self.model_name(), instruction)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens))
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = if self.provider_id.trim().is_empty() {
            default_provider_id()
        } else {
            self.provider_id.trim().to_ascii_lowercase()
        };
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = self.endpoint.trim().to_string();
        self.model_name = self.model_name.trim().to_string();
        self.temperature = self
            .temperature
            .filter(|value| value.is_finite())
            .map(|value| value.clamp(0.0, 2.0));
        self.max_tokens = self.max_tokens.filter(|value| *value > 0);
        self.system_instruction_file = self
            .system_instruction_file
            .filter(|path| !path.as_os_str().is_empty());

        self
    }

    /// Fills an empty api key from the provider's conventional environment variables.
    pub fn with_api_key_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if !self.api_key.is_empty() {
            return self;
        }

        self.api_key = api_key_variables(&self.provider_id)
            .iter()
            .filter_map(|name| lookup(name))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .unwrap_or_default();
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ProviderSettings>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".pumpdesk"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let figment = Self::file_figment(&config_path).merge(Env::prefixed(ENV_PREFIX));
        let settings = Self::extract(figment, &config_path)
            .with_api_key_fallback(|name| std::env::var(name).ok());
        Self::with_settings(config_path, settings)
    }

    pub fn from_file(config_path: PathBuf) -> Self {
        let settings = Self::extract(Self::file_figment(&config_path), &config_path);
        Self::with_settings(config_path, settings)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ProviderSettings> {
        Arc::clone(&self.settings)
    }

    pub fn init_config(&self) -> Result<bool, SettingsError> {
        if self.config_path.exists() {
            return Ok(false);
        }

        self.persist(&ProviderSettings::default())?;
        Ok(true)
    }

    fn with_settings(config_path: PathBuf, settings: ProviderSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            config_path,
        }
    }

    fn file_figment(path: &Path) -> Figment {
        let figment = Figment::from(Serialized::defaults(ProviderSettings::default()));
        if path.exists() {
            figment.merge(Json::file(path))
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            figment
        }
    }

    fn extract(figment: Figment, path: &Path) -> ProviderSettings {
        match figment.extract::<ProviderSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ProviderSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ProviderSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to read system instruction at {path:?} on `{stage}`: {source}"))]
    ReadInstruction {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_temperature() -> Option<f64> {
    Some(DEFAULT_TEMPERATURE)
}

fn api_key_variables(provider_id: &str) -> &'static [&'static str] {
    match provider_id {
        RIG_OPENAI_PROVIDER_ID | "rig-openai" => &["OPENAI_API_KEY", "API_KEY"],
        _ => &["GEMINI_API_KEY", "API_KEY"],
    }
}
