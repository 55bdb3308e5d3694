//! Client configuration: the page metadata every controller is initialised
//! with, plus transport settings for the collaborator API.
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional TOML file, environment variables and finally CLI flags.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Default delay before the push stream is reopened after a transport error.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Server used when neither the config file nor the environment names one.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Page-embedded metadata: who is looking at what.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub is_authenticated: bool,
    pub login_url: String,
    pub csrf_token: String,
    /// Set on question-scoped views; the push stream only runs when present.
    pub question_id: Option<u64>,
    /// Once a question is answered it is closed to further AI responses.
    pub question_answered: bool,
    /// Path and query of the current view, used as the login return target.
    pub current_location: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            login_url: "/auth/login".to_string(),
            csrf_token: String::new(),
            question_id: None,
            question_answered: false,
            current_location: "/".to_string(),
        }
    }
}

impl PageConfig {
    /// Login URL carrying the current location as the `next` return target.
    pub fn login_redirect(&self) -> String {
        let next: String =
            url::form_urlencoded::byte_serialize(self.current_location.as_bytes()).collect();
        let sep = if self.login_url.contains('?') { '&' } else { '?' };
        format!("{}{}next={}", self.login_url, sep, next)
    }

    /// `Ok(())` for authenticated viewers, otherwise the redirect error.
    pub fn require_auth(&self) -> Result<()> {
        if self.is_authenticated {
            Ok(())
        } else {
            Err(ClientError::AuthRequired { redirect: self.login_redirect() })
        }
    }
}

/// Full client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the discussion server (e.g. `http://127.0.0.1:5000`).
    pub base_url: String,
    /// Raw `Cookie` header value identifying the session, if any.
    pub session_cookie: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
    /// Where the notification-sound preference is persisted.
    pub preferences_path: Option<PathBuf>,
    pub page: PageConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    base_url: Option<String>,
    session_cookie: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    reconnect_delay_secs: Option<u64>,
    preferences_path: Option<PathBuf>,
    page: Option<PageConfig>,
}

impl ClientConfig {
    /// Create a config with sensible defaults.
    ///
    /// - connect_timeout: 3 s
    /// - request_timeout: 10 s
    /// - reconnect_delay: 5 s
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_cookie: None,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            preferences_path: None,
            page: PageConfig::default(),
        }
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(raw).map_err(|e| ClientError::Config(e.to_string()))?;
        let mut cfg = ClientConfig::new(file.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()));
        cfg.session_cookie = file.session_cookie;
        if let Some(s) = file.connect_timeout_secs {
            cfg.connect_timeout = Duration::from_secs(s);
        }
        if let Some(s) = file.request_timeout_secs {
            cfg.request_timeout = Duration::from_secs(s);
        }
        if let Some(s) = file.reconnect_delay_secs {
            cfg.reconnect_delay = Duration::from_secs(s);
        }
        cfg.preferences_path = file.preferences_path;
        if let Some(page) = file.page {
            cfg.page = page;
        }
        Ok(cfg)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Apply `DISCUSSION_*` environment overrides.
    pub fn apply_env(mut self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok());
        self
    }

    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get("DISCUSSION_BASE_URL") {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(token) = get("DISCUSSION_CSRF_TOKEN") {
            self.page.csrf_token = token;
        }
        if let Some(cookie) = get("DISCUSSION_SESSION") {
            self.session_cookie = Some(cookie);
            self.page.is_authenticated = true;
        }
    }

    pub fn with_page(mut self, page: PageConfig) -> Self {
        self.page = page;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_preferences_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.preferences_path = Some(path.into());
        self
    }

    /// Preferences file location: explicit path, else the platform config dir.
    pub fn resolved_preferences_path(&self) -> Option<PathBuf> {
        self.preferences_path.clone().or_else(|| {
            dirs::config_dir().map(|d| d.join("discussion-client").join("preferences.json"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn login_redirect_encodes_current_location() {
        let page = PageConfig {
            login_url: "/auth/login".into(),
            current_location: "/questions/7?sort=votes".into(),
            ..Default::default()
        };
        assert_eq!(page.login_redirect(), "/auth/login?next=%2Fquestions%2F7%3Fsort%3Dvotes");
    }

    #[test]
    fn login_redirect_appends_to_existing_query() {
        let page = PageConfig {
            login_url: "/login?lang=en".into(),
            current_location: "/".into(),
            ..Default::default()
        };
        assert_eq!(page.login_redirect(), "/login?lang=en&next=%2F");
    }

    #[test]
    fn require_auth_returns_redirect_for_anonymous() {
        let page = PageConfig::default();
        match page.require_auth() {
            Err(ClientError::AuthRequired { redirect }) => assert!(redirect.starts_with("/auth/login?next=")),
            other => panic!("expected AuthRequired, got {other:?}"),
        }
        let authed = PageConfig { is_authenticated: true, ..Default::default() };
        assert!(authed.require_auth().is_ok());
    }

    #[test]
    fn new_applies_defaults_and_trims_slash() {
        let cfg = ClientConfig::new("http://localhost:5000/");
        assert_eq!(cfg.base_url, "http://localhost:5000");
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(5));
        assert_eq!(cfg.connect_timeout, Duration::from_secs(3));
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn toml_overrides_defaults() {
        let raw = r#"
            base_url = "http://forum.test"
            reconnect_delay_secs = 2

            [page]
            is_authenticated = true
            csrf_token = "tok"
            question_id = 42
            question_answered = true
        "#;
        let cfg = ClientConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.base_url, "http://forum.test");
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(2));
        assert!(cfg.page.is_authenticated);
        assert_eq!(cfg.page.csrf_token, "tok");
        assert_eq!(cfg.page.question_id, Some(42));
        assert!(cfg.page.question_answered);
        assert_eq!(cfg.page.login_url, "/auth/login");
    }

    #[test]
    fn toml_rejects_garbage() {
        assert!(matches!(ClientConfig::from_toml_str("base_url = ["), Err(ClientError::Config(_))));
    }

    #[test]
    fn env_vars_override_file_values() {
        let vars: HashMap<&str, &str> = [
            ("DISCUSSION_BASE_URL", "http://env.test/"),
            ("DISCUSSION_CSRF_TOKEN", "env-token"),
            ("DISCUSSION_SESSION", "session=abc"),
        ]
        .into_iter()
        .collect();
        let mut cfg = ClientConfig::new("http://file.test");
        cfg.apply_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.base_url, "http://env.test");
        assert_eq!(cfg.page.csrf_token, "env-token");
        assert_eq!(cfg.session_cookie.as_deref(), Some("session=abc"));
        assert!(cfg.page.is_authenticated);
    }

    #[test]
    fn explicit_preferences_path_wins() {
        let cfg = ClientConfig::new("http://x").with_preferences_path("/tmp/prefs.json");
        assert_eq!(cfg.resolved_preferences_path(), Some(PathBuf::from("/tmp/prefs.json")));
    }
}
