//! User configuration.
//!
//! The native format is INI with a `DEFAULT` and a `GitHub` section, the
//! layout other Mediumroast tools already write. Key lookup ignores case
//! and underscores, so `clientId` and `client_id` are the same key. A path
//! ending in `.toml` is read and written as TOML with `[default]` and
//! `[github]` tables instead.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use directories::BaseDirs;
use ini::{EscapePolicy, Ini, ParseOption, Properties, WriteOption};
use mr_container::RetryPolicy;
use mr_github::GitHubSettings;
use mr_lock::LockConfig;
use serde::{Deserialize, Serialize};

/// Environment variable that replaces `GitHub.token`.
pub const TOKEN_ENV: &str = "MRCLI_GITHUB_TOKEN";

const DEFAULT_SECTION: &str = "DEFAULT";
const GITHUB_SECTION: &str = "GitHub";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default: DefaultSection,
    pub github: GitHubSection,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Github,
    Local,
}

impl BackendKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Local => "local",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "local" => Ok(Self::Local),
            other => bail!("unknown backend {other:?}; expected github or local"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultSection {
    pub process_name: String,
    pub branch: String,
    /// Minutes before a lock counts as abandoned; `0` never expires locks.
    pub stale_lock_minutes: u64,
    pub write_attempts: u32,
    pub backend: BackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            process_name: "mr_cli".to_string(),
            branch: "main".to_string(),
            stale_lock_minutes: 10,
            write_attempts: 3,
            backend: BackendKind::Github,
            local_root: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubSection {
    pub org: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    pub api_url: String,
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            org: String::new(),
            repo: None,
            client_id: None,
            token: None,
            token_expires_at: None,
            api_url: "https://api.github.com".to_string(),
        }
    }
}

impl Config {
    /// `~/.mediumroast/config.ini` for the current user.
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(".mediumroast").join("config.ini"))
    }

    pub fn from_ini_str(raw: &str) -> anyhow::Result<Self> {
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(raw, options).context("invalid configuration")?;
        let mut config = Config::default();

        if let Some(props) = section(&ini, DEFAULT_SECTION) {
            let default = &mut config.default;
            if let Some(v) = value(props, "process_name") {
                default.process_name = v.to_string();
            }
            if let Some(v) = value(props, "branch") {
                default.branch = v.to_string();
            }
            if let Some(v) = value(props, "stale_lock_minutes") {
                default.stale_lock_minutes = v
                    .parse()
                    .with_context(|| format!("DEFAULT.stale_lock_minutes must be a whole number, got {v:?}"))?;
            }
            if let Some(v) = value(props, "write_attempts") {
                default.write_attempts = v
                    .parse()
                    .with_context(|| format!("DEFAULT.write_attempts must be a whole number, got {v:?}"))?;
            }
            if let Some(v) = value(props, "backend") {
                default.backend = v.parse()?;
            }
            default.local_root = value(props, "local_root").map(PathBuf::from);
        }

        if let Some(props) = section(&ini, GITHUB_SECTION) {
            let github = &mut config.github;
            if let Some(v) = value(props, "org") {
                github.org = v.to_string();
            }
            if let Some(v) = value(props, "api_url") {
                github.api_url = v.to_string();
            }
            github.repo = value(props, "repo").map(str::to_string);
            github.client_id = value(props, "client_id").map(str::to_string);
            github.token = value(props, "token").map(str::to_string);
            github.token_expires_at = value(props, "expires_at")
                .map(|v| {
                    DateTime::parse_from_rfc3339(v)
                        .map(|at| at.with_timezone(&Utc))
                        .with_context(|| format!("GitHub.expiresAt is not an RFC 3339 time: {v:?}"))
                })
                .transpose()?;
        }
        Ok(config)
    }

    pub fn to_ini_string(&self) -> anyhow::Result<String> {
        let mut ini = Ini::new();
        let default = &self.default;
        ini.with_section(Some(DEFAULT_SECTION))
            .set("process_name", default.process_name.as_str())
            .set("branch", default.branch.as_str())
            .set("stale_lock_minutes", default.stale_lock_minutes.to_string())
            .set("write_attempts", default.write_attempts.to_string())
            .set("backend", default.backend.as_str());
        if let Some(root) = &default.local_root {
            ini.with_section(Some(DEFAULT_SECTION))
                .set("local_root", root.display().to_string());
        }

        let github = &self.github;
        ini.with_section(Some(GITHUB_SECTION))
            .set("org", github.org.as_str())
            .set("apiUrl", github.api_url.as_str());
        let optional = [
            ("repo", github.repo.clone()),
            ("clientId", github.client_id.clone()),
            ("token", github.token.clone()),
            ("expiresAt", github.token_expires_at.map(|at| at.to_rfc3339())),
        ];
        for (key, v) in optional {
            if let Some(v) = v {
                ini.with_section(Some(GITHUB_SECTION)).set(key, v);
            }
        }

        let options = WriteOption {
            escape_policy: EscapePolicy::Nothing,
            ..WriteOption::default()
        };
        let mut out = Vec::new();
        ini.write_to_opt(&mut out, options)
            .context("cannot serialize configuration")?;
        String::from_utf8(out).context("configuration is not UTF-8")
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("invalid configuration")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration {}", path.display()))?;
        let config = if is_toml(path) {
            Self::from_toml_str(&raw)
        } else {
            Self::from_ini_str(&raw)
        };
        config.with_context(|| format!("in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let raw = if is_toml(path) {
            toml::to_string_pretty(self).context("cannot serialize configuration")?
        } else {
            self.to_ini_string()?
        };
        std::fs::write(path, raw).with_context(|| format!("cannot write {}", path.display()))
    }

    /// Replace the stored token with `value` when it is set and non-empty.
    pub fn apply_token_override(&mut self, value: Option<String>) {
        if let Some(token) = value.filter(|t| !t.trim().is_empty()) {
            self.github.token = Some(token);
            self.github.token_expires_at = None;
        }
    }

    /// Check everything the selected backend needs.
    pub fn validate(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        if self.default.process_name.trim().is_empty() {
            bail!("DEFAULT.process_name must not be empty");
        }
        if self.default.branch.trim().is_empty() {
            bail!("DEFAULT.branch must not be empty");
        }
        self.stale_after()?;
        match self.default.backend {
            BackendKind::Local => {
                if self.default.local_root.is_none() {
                    bail!("DEFAULT.local_root is required for the local backend");
                }
            }
            BackendKind::Github => {
                if self.github.org.trim().is_empty() {
                    bail!("GitHub.org is not set; run `mrcli setup --org <ORG>`");
                }
                if self.github.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
                    bail!("no GitHub token; set GitHub.token or {TOKEN_ENV}");
                }
                if let Some(expires) = self.github.token_expires_at {
                    if expires <= now {
                        bail!(
                            "GitHub token expired at {}; replace it or set {TOKEN_ENV}",
                            expires.to_rfc3339()
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// The age past which a lock is overridable; `None` when expiry is off.
    pub fn stale_after(&self) -> anyhow::Result<Option<Duration>> {
        let minutes = self.default.stale_lock_minutes;
        if minutes == 0 {
            return Ok(None);
        }
        i64::try_from(minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .map(Some)
            .with_context(|| format!("DEFAULT.stale_lock_minutes = {minutes} is out of range"))
    }

    /// The discovery repository name, `<org>_discovery` unless overridden.
    pub fn repo_name(&self) -> String {
        self.github
            .repo
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("{}_discovery", self.github.org))
    }

    pub fn lock_config(&self) -> anyhow::Result<LockConfig> {
        Ok(LockConfig {
            branch: self.default.branch.clone(),
            process_name: self.default.process_name.clone(),
            stale_after: self.stale_after()?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.default.write_attempts.max(1),
        }
    }

    pub fn github_settings(&self) -> anyhow::Result<GitHubSettings> {
        let token = self
            .github
            .token
            .clone()
            .context("no GitHub token configured")?;
        Ok(GitHubSettings {
            api_url: self.github.api_url.clone(),
            owner: self.github.org.clone(),
            repo: self.repo_name(),
            token,
            user_agent: format!("mrcli/{}", env!("CARGO_PKG_VERSION")),
        })
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn section<'a>(ini: &'a Ini, name: &str) -> Option<&'a Properties> {
    ini.iter()
        .find(|(section, _)| section.is_some_and(|s| s.eq_ignore_ascii_case(name)))
        .map(|(_, props)| props)
}

// Non-empty value for `key`, ignoring case and underscores in key names.
fn value<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    let wanted = normalize(key);
    props
        .iter()
        .find(|(k, _)| normalize(k) == wanted)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
