use std::collections::HashMap;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Maximum agent loop iterations if a mode does not override it.
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;
/// Default history window size (messages) if a mode does not override it.
pub const DEFAULT_HISTORY_SIZE: usize = 20;

/// Top-level config (`muaddib.toml` + `MUADDIB_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MuaddibConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rooms: HashMap<String, RoomConfig>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub context_reducer: Option<ReducerConfig>,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub chronicler: DeferredGate,
    #[serde(default)]
    pub quests: DeferredGate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_chronicle_path")]
    pub chronicle_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            chronicle_path: default_chronicle_path(),
        }
    }
}

/// A room is one channel/server the bot listens on (`serverTag#channelName`
/// granularity is within `command`; a room groups the command settings for
/// one transport+workspace pairing, e.g. one Discord guild or IRC network).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    #[serde(default)]
    pub command: CommandConfig,
    /// Deferred: proactive (unprompted) message scheduling.
    #[serde(default)]
    pub proactive: DeferredGate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    pub default_mode: String,
    #[serde(default)]
    pub modes: HashMap<String, ModeConfig>,
    pub mode_classifier: Option<ClassifierConfig>,
    /// `serverTag#channelName` → channel-mode policy string (see §4.1).
    #[serde(default)]
    pub channel_modes: HashMap<String, String>,
    #[serde(default = "default_response_max_bytes")]
    pub response_max_bytes: usize,
    #[serde(default)]
    pub ignore_users: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            default_mode: "default".to_string(),
            modes: HashMap::new(),
            mode_classifier: None,
            channel_modes: HashMap::new(),
            response_max_bytes: default_response_max_bytes(),
            ignore_users: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    /// `provider:model` spec.
    pub model: String,
    pub prompt: String,
    /// Registered trigger tokens for this mode, e.g. `["!s"]`. The first is
    /// the mode's default trigger.
    pub triggers: Vec<String>,
    pub reasoning_effort: Option<String>,
    /// `None` = all tools allowed.
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default = "bool_true")]
    pub steering: bool,
    #[serde(default)]
    pub auto_reduce_context: bool,
    #[serde(default)]
    pub include_chapter_summary: bool,
    pub vision_model: Option<String>,
    pub history_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub model: String,
    /// label → trigger mapping.
    pub labels: HashMap<String, String>,
    pub fallback_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub key: String,
    /// Must be absent — static API keys only. Presence is an operator-guidance
    /// configuration error caught at load time, see `MuaddibConfig::validate`.
    pub refresh: Option<String>,
    pub session: Option<String>,
    pub oauth: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouterConfig {
    /// Fully-qualified `provider:model`, used when the primary model refuses.
    pub refusal_fallback_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    pub summary: Option<SummaryToolConfig>,
    pub oracle: Option<OracleToolConfig>,
    pub jina: Option<JinaConfig>,
    pub artifacts: Option<ArtifactsConfig>,
    pub image_gen: Option<ImageGenConfig>,
    pub sprites: Option<SpritesConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryToolConfig {
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleToolConfig {
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JinaConfig {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenConfig {
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpritesConfig {
    pub token: String,
    pub arc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducerConfig {
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    pub irc: Option<IrcConfig>,
    pub discord: Option<DiscordConfig>,
    pub slack: Option<SlackConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    pub server_tag: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    pub nick: String,
    pub channels: Vec<String>,
    pub nickserv_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    #[serde(default)]
    pub require_mention: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub bot_token: String,
    pub app_token: String,
}

/// A config gate for a feature this expansion does not implement the full
/// lifecycle of. Logs a warning when present-but-disabled (the default);
/// fails configuration validation if explicitly enabled.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeferredGate {
    #[serde(default)]
    pub enabled: bool,
}

fn bool_true() -> bool {
    true
}
fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}
fn default_response_max_bytes() -> usize {
    4000
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.muaddib/muaddib.db")
}
fn default_chronicle_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.muaddib/chronicle.db")
}
fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.muaddib/muaddib.toml")
}

impl MuaddibConfig {
    /// Load config from a TOML file with `MUADDIB_*` env var overrides.
    ///
    /// Checks, in order: an explicit path argument, then
    /// `~/.muaddib/muaddib.toml`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MuaddibConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MUADDIB_").split("_"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Operator-guidance validation beyond what serde/figment can express:
    /// static-key-only providers, deferred feature gates, duplicate triggers.
    pub fn validate(&self) -> Result<()> {
        for (name, provider) in &self.providers {
            if provider.refresh.is_some() || provider.session.is_some() || provider.oauth.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "providers.{name}: only a static `key` is supported; refresh/session/oauth \
                     fields are not — configure a long-lived API key instead"
                )));
            }
        }

        if self.chronicler.enabled {
            return Err(ConfigError::Invalid(
                "chronicler.enabled = true: chronicler lifecycle rollover is not implemented, \
                 only basic chapter/paragraph storage — leave disabled or unset"
                    .to_string(),
            ));
        }
        if self.quests.enabled {
            return Err(ConfigError::Invalid(
                "quests.enabled = true: quest runtime is not implemented in this build — \
                 leave disabled or unset"
                    .to_string(),
            ));
        }
        for (room_name, room) in &self.rooms {
            if room.proactive.enabled {
                return Err(ConfigError::Invalid(format!(
                    "rooms.{room_name}.proactive.enabled = true: proactive scheduling is not \
                     implemented in this build — leave disabled or unset"
                )));
            }
        }

        for (room_name, room) in &self.rooms {
            let mut seen_triggers = std::collections::HashSet::new();
            for (mode_key, mode) in &room.command.modes {
                for trigger in &mode.triggers {
                    if !seen_triggers.insert(trigger.clone()) {
                        return Err(ConfigError::Invalid(format!(
                            "rooms.{room_name}.command.modes.{mode_key}: trigger `{trigger}` \
                             is registered by more than one mode"
                        )));
                    }
                }
            }
            if let Some(classifier) = &room.command.mode_classifier {
                if !classifier.labels.values().any(|t| t == &classifier.fallback_label)
                    && !classifier.labels.contains_key(&classifier.fallback_label)
                {
                    return Err(ConfigError::Invalid(format!(
                        "rooms.{room_name}.command.modeClassifier: fallback_label \
                         `{}` is not itself a registered label",
                        classifier.fallback_label
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_trigger_is_rejected() {
        let mut modes = HashMap::new();
        modes.insert(
            "serious".to_string(),
            ModeConfig {
                model: "openai:gpt-4o-mini".to_string(),
                prompt: "be serious".to_string(),
                triggers: vec!["!s".to_string()],
                reasoning_effort: None,
                allowed_tools: None,
                steering: true,
                auto_reduce_context: false,
                include_chapter_summary: false,
                vision_model: None,
                history_size: None,
            },
        );
        modes.insert(
            "silly".to_string(),
            ModeConfig {
                model: "openai:gpt-4o-mini".to_string(),
                prompt: "be silly".to_string(),
                triggers: vec!["!s".to_string()],
                reasoning_effort: None,
                allowed_tools: None,
                steering: true,
                auto_reduce_context: false,
                include_chapter_summary: false,
                vision_model: None,
                history_size: None,
            },
        );
        let mut rooms = HashMap::new();
        rooms.insert(
            "irc".to_string(),
            RoomConfig {
                command: CommandConfig {
                    modes,
                    ..Default::default()
                },
                proactive: DeferredGate::default(),
            },
        );
        let cfg = MuaddibConfig {
            rooms,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oauth_provider_field_is_rejected() {
        let mut providers = HashMap::new();
        providers.insert(
            "anthropic".to_string(),
            ProviderConfig {
                key: "sk-ant-xxx".to_string(),
                refresh: None,
                session: None,
                oauth: Some("enabled".to_string()),
            },
        );
        let cfg = MuaddibConfig {
            providers,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn quests_enabled_fails_fast() {
        let cfg = MuaddibConfig {
            quests: DeferredGate { enabled: true },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
