use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PortalError;
use crate::storage::find_project_root;

/// The only control plane whose portal APIs are reachable.
pub const SUPPORTED_PORTAL_URL: &str = "https://mgmtui.apigee.net";

pub const DEFAULT_LOGIN_URL: &str = "https://login.apigee.com/oauth/token";

// ---------------------------------------------------------------------------
// Top-level Config — all fields have defaults, unknown keys silently ignored.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: OrgConfig,
    pub destination: OrgConfig,
    pub auth: AuthConfig,
    pub http: HttpConfig,
    pub proxy: ProxyConfig,
    pub ssl: SslConfig,
    pub export: ExportConfig,
}

/// One Apigee organization plus the credentials used to log into it.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct OrgConfig {
    pub org: String,
    pub username: String,
    pub password: String,
    pub portal_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub login_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout in seconds for portal requests. 0 = no timeout.
    pub timeout: u64,
    /// Timeout in seconds for the token request.
    pub login_timeout: u64,
    pub follow_redirects: bool,
    pub max_redirects: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub url: Option<String>,
    pub no_proxy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub verify: bool,
    pub ca_cert: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dest: PathBuf,
    /// Upper bound on in-flight portal requests. 0 = unbounded.
    pub max_concurrency: usize,
    /// Treat any failed branch as a failed run.
    pub strict: bool,
}

impl fmt::Debug for OrgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrgConfig")
            .field("org", &self.org)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("portal_url", &self.portal_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for Config {
    fn default() -> Self {
        Self {
            source: OrgConfig::default(),
            destination: OrgConfig::default(),
            auth: AuthConfig::default(),
            http: HttpConfig::default(),
            proxy: ProxyConfig::default(),
            ssl: SslConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            org: String::new(),
            username: String::new(),
            password: String::new(),
            portal_url: SUPPORTED_PORTAL_URL.to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            client_id: "edgecli".to_string(),
            client_secret: "edgeclisecret".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            login_timeout: 5,
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            verify: true,
            ca_cert: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dest: PathBuf::from("data").join("portals"),
            max_concurrency: 0,
            strict: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Overlay config — partial deserialization for field-level merging.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct OverlayConfig {
    source: OverlayOrgConfig,
    destination: OverlayOrgConfig,
    auth: OverlayAuthConfig,
    http: OverlayHttpConfig,
    proxy: OverlayProxyConfig,
    ssl: OverlaySslConfig,
    export: OverlayExportConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct OverlayOrgConfig {
    org: Option<String>,
    username: Option<String>,
    password: Option<String>,
    portal_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct OverlayAuthConfig {
    login_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct OverlayHttpConfig {
    timeout: Option<u64>,
    login_timeout: Option<u64>,
    follow_redirects: Option<bool>,
    max_redirects: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct OverlayProxyConfig {
    url: Option<String>,
    no_proxy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct OverlaySslConfig {
    verify: Option<bool>,
    ca_cert: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct OverlayExportConfig {
    dest: Option<PathBuf>,
    max_concurrency: Option<usize>,
    strict: Option<bool>,
}

impl OrgConfig {
    fn merge(&mut self, overlay: OverlayOrgConfig) {
        if let Some(v) = overlay.org {
            self.org = v;
        }
        if let Some(v) = overlay.username {
            self.username = v;
        }
        if let Some(v) = overlay.password {
            self.password = v;
        }
        if let Some(v) = overlay.portal_url {
            self.portal_url = v;
        }
    }
}

impl Config {
    /// Apply overlay values over self. Only `Some` fields are overridden.
    fn merge(mut self, overlay: OverlayConfig) -> Self {
        self.source.merge(overlay.source);
        self.destination.merge(overlay.destination);
        if let Some(v) = overlay.auth.login_url {
            self.auth.login_url = v;
        }
        if let Some(v) = overlay.auth.client_id {
            self.auth.client_id = v;
        }
        if let Some(v) = overlay.auth.client_secret {
            self.auth.client_secret = v;
        }
        if let Some(v) = overlay.http.timeout {
            self.http.timeout = v;
        }
        if let Some(v) = overlay.http.login_timeout {
            self.http.login_timeout = v;
        }
        if let Some(v) = overlay.http.follow_redirects {
            self.http.follow_redirects = v;
        }
        if let Some(v) = overlay.http.max_redirects {
            self.http.max_redirects = v;
        }
        if let Some(v) = overlay.proxy.url {
            self.proxy.url = Some(v);
        }
        if let Some(v) = overlay.proxy.no_proxy {
            self.proxy.no_proxy = Some(v);
        }
        if let Some(v) = overlay.ssl.verify {
            self.ssl.verify = v;
        }
        if let Some(v) = overlay.ssl.ca_cert {
            self.ssl.ca_cert = Some(v);
        }
        if let Some(v) = overlay.export.dest {
            self.export.dest = v;
        }
        if let Some(v) = overlay.export.max_concurrency {
            self.export.max_concurrency = v;
        }
        if let Some(v) = overlay.export.strict {
            self.export.strict = v;
        }
        self
    }

    /// Passwords are usually kept out of config files.
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PORTALSYNC_SOURCE_PASSWORD") {
            self.source.password = v;
        }
        if let Some(v) = lookup("PORTALSYNC_DESTINATION_PASSWORD") {
            self.destination.password = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

const CONFIG_DIR_NAME: &str = "portalsync";
const CONFIG_FILE_NAME: &str = "config.toml";

fn global_config_path() -> Option<PathBuf> {
    if let Ok(dir) = env::var("XDG_CONFIG_HOME") {
        if !dir.trim().is_empty() {
            return Some(PathBuf::from(dir).join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn project_config_path() -> Option<PathBuf> {
    let root = find_project_root()?;
    let path = root.join(".portalsync").join(CONFIG_FILE_NAME);
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(rest) = s.strip_prefix('~') {
            if let Ok(home) = env::var("HOME") {
                return PathBuf::from(home).join(rest.strip_prefix('/').unwrap_or(rest));
            }
        }
    }
    path.to_path_buf()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Checks settings shared by every command. Organization sections are
    /// checked separately, only for the side a command actually talks to.
    pub fn validate(&self) -> Result<(), PortalError> {
        let mut errors = Vec::new();

        if self.http.timeout > 600 {
            errors.push(format!(
                "config error: http.timeout = {} is out of range (0..=600)",
                self.http.timeout
            ));
        }
        if !(1..=600).contains(&self.http.login_timeout) {
            errors.push(format!(
                "config error: http.login_timeout = {} is out of range (1..=600)",
                self.http.login_timeout
            ));
        }
        if self.http.max_redirects > 100 {
            errors.push(format!(
                "config error: http.max_redirects = {} is out of range (0..=100)",
                self.http.max_redirects
            ));
        }
        if reqwest::Url::parse(&self.auth.login_url).is_err() {
            errors.push(format!(
                "config error: auth.login_url = \"{}\" is not a valid URL",
                self.auth.login_url
            ));
        }
        if let Some(ref url) = self.proxy.url {
            if reqwest::Url::parse(url).is_err() {
                errors.push(format!(
                    "config error: proxy.url = \"{}\" is not a valid URL",
                    url
                ));
            }
        }
        if let Some(ref path) = self.ssl.ca_cert {
            if !path.exists() {
                errors.push(format!(
                    "config error: ssl.ca_cert = \"{}\" is not an existing file",
                    path.display()
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PortalError::Config(errors.join("\n")))
        }
    }

    /// Expand tilde in all path fields. Called after merging, before validation.
    fn expand_paths(&mut self) {
        if let Some(ref path) = self.ssl.ca_cert {
            self.ssl.ca_cert = Some(expand_tilde(path));
        }
        self.export.dest = expand_tilde(&self.export.dest);
    }
}

impl OrgConfig {
    /// Fails unless this organization can be reached through the portal APIs.
    /// `section` names the config table in messages.
    pub fn check(&self, section: &str) -> Result<(), PortalError> {
        let mut errors = Vec::new();

        if self.portal_url.trim_end_matches('/') != SUPPORTED_PORTAL_URL {
            errors.push(format!(
                "{}.portal_url = \"{}\": portal APIs only work with Apigee Edge cloud ({})",
                section, self.portal_url, SUPPORTED_PORTAL_URL
            ));
        }
        for (key, value) in [
            ("org", &self.org),
            ("username", &self.username),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{}.{} is not set", section, key));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PortalError::Config(errors.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn load_overlay(path: &Path) -> Result<OverlayConfig, PortalError> {
    let content = fs::read_to_string(path).map_err(|e| {
        PortalError::Config(format!("could not read \"{}\": {}", path.display(), e))
    })?;
    toml::from_str(&content).map_err(|e| {
        PortalError::Config(format!("failed to parse \"{}\": {}", path.display(), e))
    })
}

/// Load configuration from the global file, the project file and an optional
/// explicit file, then apply environment overrides.
/// Missing global/project files are skipped; a missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, PortalError> {
    let mut config = Config::default();

    if let Some(path) = global_config_path() {
        if path.exists() {
            config = config.merge(load_overlay(&path)?);
        }
    }

    if let Some(path) = project_config_path() {
        config = config.merge(load_overlay(&path)?);
    }

    if let Some(path) = explicit {
        config = config.merge(load_overlay(path)?);
    }

    config.apply_env(|key| env::var(key).ok().filter(|v| !v.is_empty()));
    config.expand_paths();
    config.validate()?;

    Ok(config)
}
