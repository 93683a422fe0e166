//! Server configuration with `${VAR}` environment expansion.
//!
//! Secrets like the Slack token live in the environment; the JSON file
//! references them as `"${SLACK_BOT_TOKEN}"` and is safe to commit.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub controller: ControllerSection,
    pub notifier: NotifierSection,
    /// Directory served under /assets (notification icons live here).
    pub assets_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            controller: ControllerSection::default(),
            notifier: NotifierSection::default(),
            assets_dir: "assets".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 12345,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    pub time_without_event_to_declare_idle_secs: f64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            time_without_event_to_declare_idle_secs: 300.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifierSection {
    /// Slack bot token; empty disables Slack and transitions only reach
    /// the log.
    pub token: String,
    pub channel: String,
    /// Public base URL the icons are reachable under (Slack fetches them).
    pub assets_url: String,
}

impl Default for NotifierSection {
    fn default() -> Self {
        Self {
            token: String::new(),
            channel: "pingpong".to_string(),
            assets_url: "http://127.0.0.1:12345/assets".to_string(),
        }
    }
}

impl NotifierSection {
    /// Slack is in play only when a token is configured.
    pub fn enabled(&self) -> bool {
        !self.token.is_empty()
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        expand_env(&mut value);
        let cfg: Self = serde_json::from_value(value)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.controller.time_without_event_to_declare_idle_secs <= 0.0 {
            bail!("controller.time_without_event_to_declare_idle_secs must be positive");
        }
        if self.notifier.enabled() {
            if self.notifier.channel.is_empty() {
                bail!("notifier.channel must be set");
            }
            Url::parse(&self.notifier.assets_url).with_context(|| {
                format!("invalid notifier.assets_url '{}'", self.notifier.assets_url)
            })?;
        }
        Ok(())
    }
}

/// Expand `${VAR}` references in every string of a JSON tree.
fn expand_env(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => *s = expand_str(s),
        serde_json::Value::Array(items) => items.iter_mut().for_each(expand_env),
        serde_json::Value::Object(map) => map.values_mut().for_each(expand_env),
        _ => {}
    }
}

/// Unset variables expand to the empty string, like the shell; an
/// unterminated `${` stays literal.
fn expand_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match env::var(name) {
                    Ok(v) => out.push_str(&v),
                    Err(_) => {
                        tracing::warn!("config references unset environment variable {}", name);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_pass_validation() {
        ServerConfig::default().validate().unwrap();
    }

    #[test]
    fn set_variables_are_substituted() {
        // PATH is set in any environment the tests run in.
        let path = env::var("PATH").unwrap();
        assert_eq!(expand_str("pre ${PATH} post"), format!("pre {path} post"));
    }

    #[test]
    fn unset_variables_become_empty() {
        assert_eq!(expand_str("x${NO_SUCH_PINGPONG_VAR_SET}y"), "xy");
    }

    #[test]
    fn unterminated_references_stay_literal() {
        assert_eq!(expand_str("token ${OOPS"), "token ${OOPS");
    }

    #[test]
    fn plain_strings_pass_through() {
        assert_eq!(expand_str("nothing to see"), "nothing to see");
    }

    #[test]
    fn expansion_walks_nested_objects() {
        let mut value = json!({
            "notifier": { "token": "${NO_SUCH_PINGPONG_VAR_SET}", "channel": "pingpong" },
            "ports": ["${NO_SUCH_PINGPONG_VAR_SET}"]
        });
        expand_env(&mut value);
        assert_eq!(value["notifier"]["token"], "");
        assert_eq!(value["ports"][0], "");
    }

    #[test]
    fn empty_token_disables_slack() {
        let cfg: ServerConfig =
            serde_json::from_value(json!({ "notifier": { "token": "" } })).unwrap();
        assert!(!cfg.notifier.enabled());
        cfg.validate().unwrap();
    }

    #[test]
    fn enabled_notifier_requires_a_sane_assets_url() {
        let cfg: ServerConfig = serde_json::from_value(json!({
            "notifier": { "token": "xoxb-1", "assets_url": "not a url" }
        }))
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn idle_timeout_must_be_positive() {
        let cfg: ServerConfig = serde_json::from_value(json!({
            "controller": { "time_without_event_to_declare_idle_secs": 0.0 }
        }))
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: ServerConfig =
            serde_json::from_value(json!({ "server": { "port": 8080 } })).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.controller.time_without_event_to_declare_idle_secs, 300.0);
        assert_eq!(cfg.notifier.channel, "pingpong");
    }
}
