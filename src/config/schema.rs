use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Scopes requested from Google at login.
/// Longest accepted session idle timeout (one year).
pub const MAX_IDLE_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

pub const DEFAULT_OAUTH_SCOPES: &[&str] = &[
    "openid",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/userinfo.email",
];

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path the config was loaded from - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub oauth: OAuthConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub renderer: RendererConfig,
}

// ── Gateway ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 5000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Allow binding to a non-loopback address (default: false)
    #[serde(default)]
    pub allow_public_bind: bool,
    /// Externally visible base URL, used to build the OAuth redirect URI.
    /// Defaults to `http://{host}:{port}`.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Whole-request timeout, including upstream AI and converter calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Max accepted request body size.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_body_bytes() -> usize {
    256 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            allow_public_bind: false,
            public_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ── Session ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Key used to sign session cookies. Required to serve.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Sessions untouched for longer than this are dropped.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Sessions that never complete sign-in are dropped after this long.
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,
    /// Most sessions kept in memory at once.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Mark the cookie `Secure` (enable behind HTTPS).
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_cookie_name() -> String {
    "travelbuddy_session".into()
}

fn default_idle_timeout_secs() -> u64 {
    24 * 60 * 60
}

fn default_login_timeout_secs() -> u64 {
    crate::session::DEFAULT_LOGIN_TIMEOUT_SECS
}

fn default_max_sessions() -> usize {
    crate::session::DEFAULT_MAX_SESSIONS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secret_key: None,
            idle_timeout_secs: default_idle_timeout_secs(),
            login_timeout_secs: default_login_timeout_secs(),
            max_sessions: default_max_sessions(),
            secure_cookie: false,
        }
    }
}

// ── OAuth (Google) ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_oauth_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_oauth_scopes() -> Vec<String> {
    DEFAULT_OAUTH_SCOPES.iter().map(|s| (*s).to_string()).collect()
}

fn default_upstream_timeout_secs() -> u64 {
    60
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            scopes: default_oauth_scopes(),
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

// ── AI provider ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Provider name (default: "gemini")
    #[serde(default = "default_ai_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ai_provider() -> String {
    "gemini".into()
}

fn default_ai_model() -> String {
    "gemini-1.5-pro".into()
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_ai_provider(),
            api_key: None,
            model: default_ai_model(),
            temperature: default_temperature(),
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

// ── PDF renderer ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Explicit path to `wkhtmltopdf`. When unset, the binary is looked up on PATH.
    #[serde(default)]
    pub wkhtmltopdf_path: Option<PathBuf>,
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            wkhtmltopdf_path: None,
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

// ── Config impl ───────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: default_config_path().unwrap_or_else(|| PathBuf::from("config.toml")),
            gateway: GatewayConfig::default(),
            session: SessionConfig::default(),
            oauth: OAuthConfig::default(),
            ai: AiConfig::default(),
            renderer: RendererConfig::default(),
        }
    }
}

/// `~/.travelbuddy/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    UserDirs::new().map(|u| u.home_dir().join(".travelbuddy").join("config.toml"))
}

impl Config {
    /// Load configuration from `explicit`, `TRAVELBUDDY_CONFIG`, or the default
    /// location, in that order. A missing file yields defaults. Environment
    /// overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = explicit
            .map(Path::to_path_buf)
            .or_else(|| {
                std::env::var("TRAVELBUDDY_CONFIG")
                    .ok()
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
            })
            .or_else(default_config_path)
            .context("Could not determine config path (no home directory)")?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file {}", config_path.display())
            })?;
            Self::from_toml_str(&contents).with_context(|| {
                format!("Failed to parse config file {}", config_path.display())
            })?
        } else {
            if explicit.is_some() {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Config::default()
        };

        config.config_path = config_path;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
        };

        if let Some(id) = get(&["GOOGLE_OAUTH_CLIENT_ID"]) {
            self.oauth.client_id = Some(id);
        }
        if let Some(secret) = get(&["GOOGLE_OAUTH_CLIENT_SECRET"]) {
            self.oauth.client_secret = Some(secret);
        }

        if let Some(key) = get(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]) {
            self.ai.api_key = Some(key);
        }
        if let Some(model) = get(&["TRAVELBUDDY_MODEL"]) {
            self.ai.model = model;
        }

        if let Some(secret) = get(&["TRAVELBUDDY_SECRET_KEY", "SECRET_KEY"]) {
            self.session.secret_key = Some(secret);
        }

        if let Some(port) = get(&["TRAVELBUDDY_PORT", "PORT"]).and_then(|p| p.parse::<u16>().ok())
        {
            self.gateway.port = port;
        }
        if let Some(host) = get(&["TRAVELBUDDY_HOST", "HOST"]) {
            self.gateway.host = host;
        }
        if let Some(url) = get(&["TRAVELBUDDY_PUBLIC_URL"]) {
            self.gateway.public_url = Some(url);
        }
        if let Some(val) = get(&["TRAVELBUDDY_ALLOW_PUBLIC_BIND"]) {
            self.gateway.allow_public_bind = val == "1" || val.eq_ignore_ascii_case("true");
        }

        if let Some(path) = get(&["TRAVELBUDDY_WKHTMLTOPDF", "WKHTMLTOPDF_PATH"]) {
            self.renderer.wkhtmltopdf_path = Some(PathBuf::from(path));
        }
    }

    /// Externally visible base URL without a trailing slash.
    pub fn public_base_url(&self) -> String {
        match self.gateway.public_url.as_deref() {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.gateway.host, self.gateway.port),
        }
    }

    /// Redirect URI registered with Google for the login callback.
    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}/login/google/authorized", self.public_base_url())
    }

    /// Collect every missing setting that `serve` needs.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(self.session.secret_key.as_deref()) {
            missing.push("TRAVELBUDDY_SECRET_KEY (session.secret_key)");
        }
        if is_blank(self.oauth.client_id.as_deref()) {
            missing.push("GOOGLE_OAUTH_CLIENT_ID (oauth.client_id)");
        }
        if is_blank(self.oauth.client_secret.as_deref()) {
            missing.push("GOOGLE_OAUTH_CLIENT_SECRET (oauth.client_secret)");
        }
        if is_blank(self.ai.api_key.as_deref()) {
            missing.push("GEMINI_API_KEY (ai.api_key)");
        }
        missing
    }

    /// Fail with every missing setting listed at once.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing required configuration:\n  - {}\nSet them in the environment, a .env file, or {}",
                missing.join("\n  - "),
                self.config_path.display()
            );
        }
        for (name, secs) in [
            ("gateway.request_timeout_secs", self.gateway.request_timeout_secs),
            ("oauth.timeout_secs", self.oauth.timeout_secs),
            ("ai.timeout_secs", self.ai.timeout_secs),
            ("renderer.timeout_secs", self.renderer.timeout_secs),
            ("session.login_timeout_secs", self.session.login_timeout_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        if !(1..=MAX_IDLE_TIMEOUT_SECS).contains(&self.session.idle_timeout_secs) {
            anyhow::bail!(
                "session.idle_timeout_secs must be between 1 and {MAX_IDLE_TIMEOUT_SECS}"
            );
        }
        if self.session.max_sessions == 0 {
            anyhow::bail!("session.max_sessions must be greater than zero");
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.gateway.port, 5000);
        assert_eq!(c.gateway.host, "127.0.0.1");
        assert!(!c.gateway.allow_public_bind);
        assert_eq!(c.session.cookie_name, "travelbuddy_session");
        assert_eq!(c.ai.provider, "gemini");
        assert_eq!(c.ai.model, "gemini-1.5-pro");
        assert!(c.renderer.wkhtmltopdf_path.is_none());
        assert_eq!(c.oauth.scopes.len(), 3);
        assert!(c.oauth.scopes.contains(&"openid".to_string()));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = Config::from_toml_str(
            r#"
[gateway]
port = 8088

[renderer]
wkhtmltopdf_path = "/opt/wkhtmltopdf/bin/wkhtmltopdf"
"#,
        )
        .unwrap();
        assert_eq!(c.gateway.port, 8088);
        assert_eq!(c.gateway.host, "127.0.0.1");
        assert_eq!(c.session.idle_timeout_secs, 86_400);
        assert_eq!(
            c.renderer.wkhtmltopdf_path.as_deref(),
            Some(Path::new("/opt/wkhtmltopdf/bin/wkhtmltopdf"))
        );
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(Config::from_toml_str("[gateway]\nport = \"not a port\"").is_err());
    }

    #[test]
    fn env_overrides_apply_secrets_and_gateway() {
        let mut c = Config::default();
        c.apply_overrides_from(lookup_from(&[
            ("GOOGLE_OAUTH_CLIENT_ID", "client-id"),
            ("GOOGLE_OAUTH_CLIENT_SECRET", "client-secret"),
            ("GEMINI_API_KEY", "gemini-key"),
            ("SECRET_KEY", "generic-secret"),
            ("PORT", "9090"),
            ("TRAVELBUDDY_ALLOW_PUBLIC_BIND", "true"),
            ("TRAVELBUDDY_WKHTMLTOPDF", "/usr/local/bin/wkhtmltopdf"),
        ]));
        assert_eq!(c.oauth.client_id.as_deref(), Some("client-id"));
        assert_eq!(c.oauth.client_secret.as_deref(), Some("client-secret"));
        assert_eq!(c.ai.api_key.as_deref(), Some("gemini-key"));
        assert_eq!(c.session.secret_key.as_deref(), Some("generic-secret"));
        assert_eq!(c.gateway.port, 9090);
        assert!(c.gateway.allow_public_bind);
        assert_eq!(
            c.renderer.wkhtmltopdf_path,
            Some(PathBuf::from("/usr/local/bin/wkhtmltopdf"))
        );
    }

    #[test]
    fn env_overrides_prefer_specific_keys() {
        let mut c = Config::default();
        c.apply_overrides_from(lookup_from(&[
            ("TRAVELBUDDY_SECRET_KEY", "new-secret"),
            ("SECRET_KEY", "generic-secret"),
            ("TRAVELBUDDY_PORT", "7000"),
            ("PORT", "8000"),
        ]));
        assert_eq!(c.session.secret_key.as_deref(), Some("new-secret"));
        assert_eq!(c.gateway.port, 7000);
    }

    #[test]
    fn env_overrides_ignore_empty_and_invalid_values() {
        let mut c = Config::default();
        c.apply_overrides_from(lookup_from(&[
            ("GEMINI_API_KEY", "   "),
            ("PORT", "not-a-number"),
        ]));
        assert!(c.ai.api_key.is_none());
        assert_eq!(c.gateway.port, 5000);
    }

    #[test]
    fn redirect_uri_uses_public_url_when_set() {
        let mut c = Config::default();
        assert_eq!(
            c.oauth_redirect_uri(),
            "http://127.0.0.1:5000/login/google/authorized"
        );
        c.gateway.public_url = Some("https://trips.example.com/".into());
        assert_eq!(
            c.oauth_redirect_uri(),
            "https://trips.example.com/login/google/authorized"
        );
    }

    #[test]
    fn validate_lists_every_missing_setting() {
        let c = Config::default();
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("TRAVELBUDDY_SECRET_KEY"));
        assert!(err.contains("GOOGLE_OAUTH_CLIENT_ID"));
        assert!(err.contains("GOOGLE_OAUTH_CLIENT_SECRET"));
        assert!(err.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn validate_passes_with_all_secrets() {
        let mut c = Config::default();
        c.apply_overrides_from(lookup_from(&[
            ("GOOGLE_OAUTH_CLIENT_ID", "id"),
            ("GOOGLE_OAUTH_CLIENT_SECRET", "secret"),
            ("GEMINI_API_KEY", "key"),
            ("TRAVELBUDDY_SECRET_KEY", "session-secret"),
        ]));
        assert!(c.validate().is_ok());
        assert!(c.missing_required().is_empty());
    }

    fn valid_config() -> Config {
        let mut c = Config::default();
        c.apply_overrides_from(lookup_from(&[
            ("GOOGLE_OAUTH_CLIENT_ID", "id"),
            ("GOOGLE_OAUTH_CLIENT_SECRET", "secret"),
            ("GEMINI_API_KEY", "key"),
            ("TRAVELBUDDY_SECRET_KEY", "session-secret"),
        ]));
        c
    }

    #[test]
    fn validate_bounds_idle_timeout() {
        for secs in [0, MAX_IDLE_TIMEOUT_SECS + 1, 9_000_000_000_000_000, u64::MAX] {
            let mut c = valid_config();
            c.session.idle_timeout_secs = secs;
            let err = c.validate().unwrap_err().to_string();
            assert!(err.contains("session.idle_timeout_secs"), "{secs}: {err}");
        }
        let mut c = valid_config();
        c.session.idle_timeout_secs = MAX_IDLE_TIMEOUT_SECS;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_timeouts_and_capacity() {
        let cases: [(&str, fn(&mut Config)); 5] = [
            ("ai.timeout_secs", |c| c.ai.timeout_secs = 0),
            ("renderer.timeout_secs", |c| c.renderer.timeout_secs = 0),
            ("oauth.timeout_secs", |c| c.oauth.timeout_secs = 0),
            ("session.login_timeout_secs", |c| c.session.login_timeout_secs = 0),
            ("session.max_sessions", |c| c.session.max_sessions = 0),
        ];
        for (name, break_it) in cases {
            let mut c = valid_config();
            break_it(&mut c);
            let err = c.validate().unwrap_err().to_string();
            assert!(err.contains(name), "{name}: {err}");
        }
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[renderer]\ntimeout_secs = 15\n").unwrap();
        let c = Config::load(Some(&path)).unwrap();
        assert_eq!(c.renderer.timeout_secs, 15);
        assert_eq!(c.config_path, path);
    }

    #[test]
    fn load_rejects_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
