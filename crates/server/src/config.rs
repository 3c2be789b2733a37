use std::{env, path::PathBuf, time::Duration};

use reqwest::Url;
use secrecy::SecretString;
use services::services::chatbot::{ChatConfig, DEFAULT_API_URL, DEFAULT_LOGIN_URL};
use thiserror::Error;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_TOOL_DIR: &str = "/sw/local/bin";
const DEFAULT_GROUP_ROOT: &str = "/scratch/group";
const DEFAULT_SENDMAIL: &str = "/usr/sbin/sendmail";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FANOUT_LIMIT: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    MissingVar(&'static str),
    #[error("environment variable `{name}` has invalid value `{value}`")]
    InvalidVar { name: &'static str, value: String },
}

/// Process-wide settings, read once at startup.
#[derive(Debug)]
pub struct DashboardConfig {
    pub listen_addr: String,
    pub cluster_name: String,
    pub help_email: String,
    pub request_email: String,
    pub hprcbot_route: Option<String>,
    pub user: String,
    pub home: PathBuf,
    pub scratch: PathBuf,
    pub group_root: PathBuf,
    pub tool_dir: Option<PathBuf>,
    pub layout_dir: PathBuf,
    pub request_log_dir: PathBuf,
    pub sendmail: PathBuf,
    pub command_timeout: Duration,
    pub fanout_limit: usize,
    /// Echo executed commands and their raw output in responses.
    pub debug_output: bool,
    pub chat: Option<ChatConfig>,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source; empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::MissingVar(name));

        let user = required("USER")?;
        let home = PathBuf::from(required("HOME")?);

        let help_email = var("DASHBOARD_HELP_EMAIL").unwrap_or_else(|| "help@localhost".to_string());
        let request_email = var("DASHBOARD_REQUEST_EMAIL").unwrap_or_else(|| help_email.clone());

        let scratch = var("SCRATCH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/scratch/user").join(&user));
        let layout_dir = var("DASHBOARD_LAYOUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config/hpc-dashboard/layouts"));

        let command_timeout = match var("DASHBOARD_COMMAND_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: "DASHBOARD_COMMAND_TIMEOUT_SECS",
                        value,
                    });
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        let fanout_limit = match var("DASHBOARD_FANOUT_LIMIT") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: "DASHBOARD_FANOUT_LIMIT",
                        value,
                    });
                }
            },
            None => DEFAULT_FANOUT_LIMIT,
        };
        let debug_output = match var("DASHBOARD_DEBUG_OUTPUT").as_deref().map(str::trim) {
            None | Some("0" | "false" | "no") => false,
            Some("1" | "true" | "yes") => true,
            Some(other) => {
                return Err(ConfigError::InvalidVar {
                    name: "DASHBOARD_DEBUG_OUTPUT",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            listen_addr: var("DASHBOARD_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            cluster_name: var("DASHBOARD_CLUSTER_NAME").unwrap_or_else(|| "cluster".to_string()),
            help_email,
            request_email,
            hprcbot_route: var("DASHBOARD_HPRCBOT_ROUTE"),
            scratch,
            group_root: PathBuf::from(var("DASHBOARD_GROUP_ROOT").unwrap_or_else(|| DEFAULT_GROUP_ROOT.to_string())),
            tool_dir: Some(PathBuf::from(var("DASHBOARD_TOOL_DIR").unwrap_or_else(|| DEFAULT_TOOL_DIR.to_string()))),
            layout_dir,
            request_log_dir: PathBuf::from(var("DASHBOARD_REQUEST_LOG_DIR").unwrap_or_else(|| "logs".to_string())),
            sendmail: PathBuf::from(var("DASHBOARD_SENDMAIL").unwrap_or_else(|| DEFAULT_SENDMAIL.to_string())),
            command_timeout,
            fanout_limit,
            debug_output,
            chat: chat_config(&var)?,
            user,
            home,
        })
    }
}

/// Chat is enabled only when all three credentials are present.
fn chat_config(var: &impl Fn(&str) -> Option<String>) -> Result<Option<ChatConfig>, ConfigError> {
    let (Some(username), Some(password), Some(collection_id)) = (
        var("CHAT_USERNAME"),
        var("CHAT_PASSWORD"),
        var("CHAT_COLLECTION_ID"),
    ) else {
        return Ok(None);
    };
    let url = |name: &'static str, default: &str| {
        let value = var(name).unwrap_or_else(|| default.to_string());
        Url::parse(&value).map_err(|_| ConfigError::InvalidVar { name, value })
    };
    Ok(Some(ChatConfig {
        username,
        password: SecretString::from(password),
        collection_id,
        login_url: url("CHAT_LOGIN_URL", DEFAULT_LOGIN_URL)?,
        api_url: url("CHAT_API_URL", DEFAULT_API_URL)?,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<DashboardConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        DashboardConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_derive_from_user_and_home() {
        let config = config(&[("USER", "jdoe"), ("HOME", "/home/jdoe")]).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:5000");
        assert_eq!(config.scratch, PathBuf::from("/scratch/user/jdoe"));
        assert_eq!(
            config.layout_dir,
            PathBuf::from("/home/jdoe/.config/hpc-dashboard/layouts")
        );
        assert_eq!(config.request_email, config.help_email);
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert!(!config.debug_output);
        assert!(config.chat.is_none());
    }

    #[test]
    fn user_is_required() {
        assert!(matches!(
            config(&[("HOME", "/home/jdoe")]),
            Err(ConfigError::MissingVar("USER"))
        ));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config(&[
            ("USER", "jdoe"),
            ("HOME", "/home/jdoe"),
            ("DASHBOARD_COMMAND_TIMEOUT_SECS", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                name: "DASHBOARD_COMMAND_TIMEOUT_SECS",
                ..
            }
        ));
        assert!(config(&[("USER", "jdoe"), ("HOME", "/h"), ("DASHBOARD_FANOUT_LIMIT", "0")]).is_err());
    }

    #[test]
    fn chat_needs_every_credential() {
        let partial = config(&[("USER", "u"), ("HOME", "/h"), ("CHAT_USERNAME", "bot")]).unwrap();
        assert!(partial.chat.is_none());

        let full = config(&[
            ("USER", "u"),
            ("HOME", "/h"),
            ("CHAT_USERNAME", "bot"),
            ("CHAT_PASSWORD", "secret"),
            ("CHAT_COLLECTION_ID", "c-1"),
        ])
        .unwrap();
        let chat = full.chat.unwrap();
        assert_eq!(chat.login_url.as_str(), DEFAULT_LOGIN_URL);
        assert_eq!(chat.collection_id, "c-1");
    }
}
