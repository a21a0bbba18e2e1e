use crate::config::Config;
use crate::gateway::is_public_bind;
use crate::render::PdfRenderer;
use crate::util::mask_secret;
use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub ok: bool,
    pub message: String,
}

impl Check {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

fn secret_check(label: &str, value: Option<&str>, env_hint: &str, reveal: bool) -> Check {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) if reveal => Check::pass(format!("{label} set ({})", mask_secret(v))),
        Some(_) => Check::pass(format!("{label} set")),
        None => Check::fail(format!("{label} missing (set {env_hint})")),
    }
}

/// Everything `serve` depends on, checked without starting it.
pub fn checks(config: &Config) -> Vec<Check> {
    let mut out = Vec::new();

    if config.config_path.exists() {
        out.push(Check::pass(format!(
            "config file: {}",
            config.config_path.display()
        )));
    } else {
        out.push(Check::pass(format!(
            "no config file at {} (using defaults + environment)",
            config.config_path.display()
        )));
    }

    out.push(secret_check(
        "session secret",
        config.session.secret_key.as_deref(),
        "TRAVELBUDDY_SECRET_KEY",
        false,
    ));
    out.push(secret_check(
        "Google OAuth client id",
        config.oauth.client_id.as_deref(),
        "GOOGLE_OAUTH_CLIENT_ID",
        true,
    ));
    out.push(secret_check(
        "Google OAuth client secret",
        config.oauth.client_secret.as_deref(),
        "GOOGLE_OAUTH_CLIENT_SECRET",
        false,
    ));
    out.push(secret_check(
        "Gemini API key",
        config.ai.api_key.as_deref(),
        "GEMINI_API_KEY",
        true,
    ));

    match PdfRenderer::resolve(config.renderer.wkhtmltopdf_path.as_deref()) {
        Ok(path) => out.push(Check::pass(format!("wkhtmltopdf: {}", path.display()))),
        Err(e) => out.push(Check::fail(e.to_string())),
    }

    let host = &config.gateway.host;
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        out.push(Check::fail(format!(
            "host {host} is not loopback and gateway.allow_public_bind is off"
        )));
    } else {
        out.push(Check::pass(format!("bind {host}:{}", config.gateway.port)));
    }

    out
}

pub fn run(config: &Config) -> Result<()> {
    println!("🩺 TravelBuddy Doctor");

    let results = checks(config);
    for check in &results {
        let mark = if check.ok { "✅" } else { "❌" };
        println!("  {mark} {}", check.message);
    }

    println!("  Model: {}", config.ai.model);
    println!("  OAuth redirect URI: {}", config.oauth_redirect_uri());

    let failed = results.iter().filter(|c| !c.ok).count();
    if failed == 0 {
        println!("  All checks passed.");
    } else {
        println!("  💡 {failed} check(s) failed; `travelbuddy serve` will refuse to start.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(checks: &'a [Check], prefix: &str) -> &'a Check {
        checks
            .iter()
            .find(|c| c.message.starts_with(prefix))
            .unwrap_or_else(|| panic!("no check starting with {prefix}"))
    }

    #[test]
    fn missing_secrets_fail() {
        let config = Config::default();
        let results = checks(&config);
        assert!(!find(&results, "session secret").ok);
        assert!(!find(&results, "Google OAuth client id").ok);
        assert!(!find(&results, "Gemini API key").ok);
    }

    #[test]
    fn configured_secrets_pass_and_are_masked() {
        let mut config = Config::default();
        config.session.secret_key = Some("s3cr3t-value".into());
        config.ai.api_key = Some("AIzaSyExampleKeyx9Qk".into());
        let results = checks(&config);
        let secret = find(&results, "session secret");
        assert!(secret.ok);
        assert!(!secret.message.contains("s3cr3t"));
        let key = find(&results, "Gemini API key");
        assert!(key.ok);
        assert!(key.message.contains("AIza…x9Qk"));
    }

    #[test]
    fn explicit_missing_converter_fails() {
        let mut config = Config::default();
        config.renderer.wkhtmltopdf_path = Some("/nonexistent/wkhtmltopdf".into());
        let results = checks(&config);
        assert!(!find(&results, "wkhtmltopdf not found").ok);
    }

    #[test]
    fn public_host_without_opt_in_fails() {
        let mut config = Config::default();
        config.gateway.host = "0.0.0.0".into();
        assert!(!find(&checks(&config), "host 0.0.0.0").ok);
        config.gateway.allow_public_bind = true;
        assert!(find(&checks(&config), "bind 0.0.0.0").ok);
    }
}
