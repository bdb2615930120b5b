use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;
use shared::domain::SessionId;
use tracing::warn;
use url::Url;

use crate::{
    commands::DEFAULT_CONTEXT_PARAGRAPHS, error::ConsoleError,
    paragraphs::DEFAULT_BREAK_THRESHOLD_MS,
};

pub const DEFAULT_CONFIG_FILE: &str = "copilot.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSettings {
    pub server_url: String,
    pub api_url: Option<String>,
    pub socket_path: String,
    pub device_type: String,
    pub paragraph_break_ms: i64,
    pub context_paragraphs: usize,
    pub token_file: Option<PathBuf>,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            api_url: None,
            socket_path: "/ws".into(),
            device_type: "desktop".into(),
            paragraph_break_ms: DEFAULT_BREAK_THRESHOLD_MS,
            context_paragraphs: DEFAULT_CONTEXT_PARAGRAPHS,
            token_file: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    api_url: Option<String>,
    socket_path: Option<String>,
    device_type: Option<String>,
    paragraph_break_ms: Option<i64>,
    context_paragraphs: Option<usize>,
    token_file: Option<PathBuf>,
}

/// Defaults, then the TOML file (if readable), then environment overrides.
pub fn load_settings(path: Option<&Path>) -> ConsoleSettings {
    let mut settings = ConsoleSettings::default();
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), %err, "config: ignoring unparsable file"),
        }
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file_settings(settings: &mut ConsoleSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if file_cfg.api_url.is_some() {
        settings.api_url = file_cfg.api_url;
    }
    if let Some(v) = file_cfg.socket_path {
        settings.socket_path = v;
    }
    if let Some(v) = file_cfg.device_type {
        settings.device_type = v;
    }
    if let Some(v) = file_cfg.paragraph_break_ms {
        settings.paragraph_break_ms = v;
    }
    if let Some(v) = file_cfg.context_paragraphs {
        settings.context_paragraphs = v;
    }
    if file_cfg.token_file.is_some() {
        settings.token_file = file_cfg.token_file;
    }
}

/// Each key is read as `COPILOT_<KEY>` and then `APP__<KEY>`; the latter wins.
pub fn apply_env_overrides<F>(settings: &mut ConsoleSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| {
        lookup(&format!("APP__{key}")).or_else(|| lookup(&format!("COPILOT_{key}")))
    };

    if let Some(v) = read("SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = read("API_URL") {
        settings.api_url = Some(v);
    }
    if let Some(v) = read("DEVICE_TYPE") {
        settings.device_type = v;
    }
    if let Some(v) = read("PARAGRAPH_BREAK_MS") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.paragraph_break_ms = parsed;
        }
    }
    if let Some(v) = read("CONTEXT_PARAGRAPHS") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.context_paragraphs = parsed;
        }
    }
    if let Some(v) = read("TOKEN_FILE") {
        settings.token_file = Some(PathBuf::from(v));
    }
}

impl ConsoleSettings {
    pub fn token_file_path(&self) -> Option<PathBuf> {
        self.token_file
            .clone()
            .or_else(|| dirs::config_dir().map(|dir| dir.join("copilot").join("token")))
    }

    pub fn api_base(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or(&self.server_url)
            .trim_end_matches('/')
    }

    pub fn transcript_url(&self, session_id: &SessionId) -> String {
        format!("{}/api/sessions/{}/transcript", self.api_base(), session_id)
    }

    pub fn socket_url(
        &self,
        session_id: &SessionId,
        join_code: Option<&str>,
        token: Option<&str>,
    ) -> Result<Url, ConsoleError> {
        let base = self.server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(ConsoleError::InvalidServerUrl(self.server_url.clone()));
        };

        let path = if self.socket_path.starts_with('/') {
            self.socket_path.clone()
        } else {
            format!("/{}", self.socket_path)
        };
        let mut url = Url::parse(&format!("{ws_base}{path}"))
            .map_err(|err| ConsoleError::InvalidServerUrl(format!("{}: {err}", self.server_url)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("sessionId", session_id.as_str());
            if let Some(code) = join_code.filter(|code| !code.is_empty()) {
                query.append_pair("joinCode", code);
            }
            if let Some(token) = token {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
