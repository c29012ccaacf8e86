use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;

/// Default configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".sentry-provision.toml";

/// Top-level configuration loaded from `.sentry-provision.toml`.
///
/// Supports layered resolution: env vars > config file > defaults. The
/// binary loads it once at start-up and hands it to the provisioner.
///
/// # Examples
///
/// ```
/// use provision_core::{NotificationTarget, ProvisionConfig};
///
/// let config = ProvisionConfig::default();
/// assert_eq!(config.sentry.platform, "php");
/// assert_eq!(config.notification, NotificationTarget::None);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Sentry API access and project defaults.
    #[serde(default)]
    pub sentry: SentryConfig,
    /// Where alert rules send notifications.
    #[serde(default)]
    pub notification: NotificationTarget,
    /// Alert rule tuning.
    #[serde(default)]
    pub rule: RuleConfig,
    /// DSN output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

impl ProvisionConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Io`] if the file cannot be read, or
    /// [`ProvisionError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, ProvisionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use provision_core::ProvisionConfig;
    ///
    /// let toml = r#"
    /// [sentry]
    /// organization = "acme"
    /// "#;
    /// let config = ProvisionConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.sentry.organization.as_deref(), Some("acme"));
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ProvisionError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Resolve the full configuration for this process.
    ///
    /// An explicit `path` must exist. Without one, [`CONFIG_FILE_NAME`] is
    /// read from the working directory when present. Process environment
    /// variables are layered on top.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::FileNotFound`] for a missing explicit path,
    /// or any error from [`ProvisionConfig::from_file`].
    pub fn load(path: Option<&Path>) -> Result<Self, ProvisionError> {
        let mut config = match path {
            Some(path) if !path.exists() => {
                return Err(ProvisionError::FileNotFound(path.to_path_buf()))
            }
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from environment variables onto this configuration.
    ///
    /// `lookup` maps a variable name to its value; empty values count as
    /// unset. Recognised variables: `AUTH_TOKEN`, `ORG`, `OWNER`,
    /// `SENTRY_TEAM`, `SENTRY_PLATFORM`, `SENTRY_BASE_URL`,
    /// `SENTRY_TEMPLATE`, and the notification variables read by
    /// [`NotificationTarget::from_env`].
    ///
    /// # Examples
    ///
    /// ```
    /// use provision_core::ProvisionConfig;
    ///
    /// let mut config = ProvisionConfig::default();
    /// config.apply_env(|key| (key == "ORG").then(|| "acme".to_string()));
    /// assert_eq!(config.sentry.organization.as_deref(), Some("acme"));
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(token) = var("AUTH_TOKEN") {
            self.sentry.auth_token = Some(token);
        }
        if let Some(org) = var("ORG") {
            self.sentry.organization = Some(org);
        }
        if let Some(owner) = var("OWNER") {
            self.sentry.owner = Some(owner);
        }
        if let Some(team) = var("SENTRY_TEAM") {
            self.sentry.team = Some(team);
        }
        if let Some(platform) = var("SENTRY_PLATFORM") {
            self.sentry.platform = platform;
        }
        if let Some(base_url) = var("SENTRY_BASE_URL") {
            self.sentry.base_url = base_url;
        }
        if let Some(template) = var("SENTRY_TEMPLATE") {
            self.output.template = PathBuf::from(template);
        }
        if let Some(mut target) = NotificationTarget::from_env(&var) {
            target.fill_from(&self.notification);
            self.notification = target;
        }
    }
}

/// Sentry API access settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SentryConfig {
    /// Bearer token with `project:read`, `project:write` and `alerts:write` scopes.
    pub auth_token: Option<String>,
    /// Organization slug.
    pub organization: Option<String>,
    /// Owner assigned to created alert rules (e.g. `team:123`).
    pub owner: Option<String>,
    /// Team that new projects are created under (default: the organization slug).
    pub team: Option<String>,
    /// Platform recorded on new projects (default: `"php"`).
    #[serde(default = "default_platform")]
    pub platform: String,
    /// API root, including the `/api/0` prefix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_platform() -> String {
    "php".into()
}

fn default_base_url() -> String {
    "https://sentry.io/api/0".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            organization: None,
            owner: None,
            team: None,
            platform: default_platform(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for SentryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentryConfig")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("organization", &self.organization)
            .field("owner", &self.owner)
            .field("team", &self.team)
            .field("platform", &self.platform)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SentryConfig {
    /// The API token, or a configuration error naming how to provide it.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Config`] when no token is configured.
    pub fn auth_token(&self) -> Result<&str, ProvisionError> {
        self.auth_token.as_deref().ok_or_else(|| {
            ProvisionError::Config(
                "AUTH_TOKEN not set. Export AUTH_TOKEN or set auth_token in .sentry-provision.toml"
                    .into(),
            )
        })
    }

    /// The organization slug, or a configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Config`] when no organization is configured.
    pub fn organization(&self) -> Result<&str, ProvisionError> {
        self.organization.as_deref().ok_or_else(|| {
            ProvisionError::Config(
                "ORG not set. Export ORG or set organization in .sentry-provision.toml".into(),
            )
        })
    }

    /// Team used when creating and linking projects.
    ///
    /// Falls back to the organization slug, which is the default team of a
    /// fresh Sentry organization.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Config`] when neither is configured.
    pub fn team(&self) -> Result<&str, ProvisionError> {
        match self.team.as_deref() {
            Some(team) => Ok(team),
            None => self.organization(),
        }
    }
}

/// Notification destination for alert rule actions.
///
/// Resolved once when configuration is loaded. In TOML it is written as a
/// table tagged by `type`:
///
/// ```
/// use provision_core::{NotificationTarget, ProvisionConfig};
///
/// let toml = r##"
/// [notification]
/// type = "slack"
/// workspace = "12345"
/// channel = "#alerts"
/// "##;
/// let config = ProvisionConfig::from_toml(toml).unwrap();
/// assert_eq!(
///     config.notification,
///     NotificationTarget::Slack { workspace: "12345".into(), channel: "#alerts".into() }
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotificationTarget {
    /// Slack integration: workspace (integration) id and channel name.
    Slack {
        /// Sentry integration id of the Slack workspace.
        workspace: String,
        /// Channel name, e.g. `#alerts`.
        #[serde(default)]
        channel: String,
    },
    /// Microsoft Teams integration.
    Teams {
        /// Sentry integration id of the Teams tenant.
        team: String,
        /// Channel display name.
        #[serde(default)]
        channel: String,
        /// Teams channel id.
        #[serde(default)]
        channel_id: String,
    },
    /// Rules are created without a notification action.
    #[default]
    None,
}

impl NotificationTarget {
    /// Build a target from `ACTION_*` variables.
    ///
    /// `ACTION_TEAM` selects Teams; otherwise `ACTION_SLACK_ID` selects
    /// Slack. Returns `None` when neither is set. Both share
    /// `ACTION_CHANNEL`; Teams also reads `ACTION_CHANNEL_ID`.
    ///
    /// # Examples
    ///
    /// ```
    /// use provision_core::NotificationTarget;
    ///
    /// let target = NotificationTarget::from_env(|key| match key {
    ///     "ACTION_SLACK_ID" => Some("998".into()),
    ///     "ACTION_CHANNEL" => Some("#ops".into()),
    ///     _ => None,
    /// });
    /// assert!(matches!(target, Some(NotificationTarget::Slack { .. })));
    /// ```
    pub fn from_env<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let channel = lookup("ACTION_CHANNEL").unwrap_or_default();
        if let Some(team) = lookup("ACTION_TEAM") {
            return Some(Self::Teams {
                team,
                channel,
                channel_id: lookup("ACTION_CHANNEL_ID").unwrap_or_default(),
            });
        }
        lookup("ACTION_SLACK_ID").map(|workspace| Self::Slack { workspace, channel })
    }

    /// Fill empty fields from `base` when both select the same integration.
    ///
    /// Lets `ACTION_TEAM` alone retarget a Teams table from the config file
    /// while keeping its channel settings. A different integration in `base`
    /// contributes nothing.
    pub fn fill_from(&mut self, base: &Self) {
        fn fill(field: &mut String, base: &str) {
            if field.is_empty() {
                *field = base.to_string();
            }
        }

        match (self, base) {
            (
                Self::Slack { workspace, channel },
                Self::Slack {
                    workspace: base_workspace,
                    channel: base_channel,
                },
            ) => {
                fill(workspace, base_workspace);
                fill(channel, base_channel);
            }
            (
                Self::Teams {
                    team,
                    channel,
                    channel_id,
                },
                Self::Teams {
                    team: base_team,
                    channel: base_channel,
                    channel_id: base_channel_id,
                },
            ) => {
                fill(team, base_team);
                fill(channel, base_channel);
                fill(channel_id, base_channel_id);
            }
            _ => {}
        }
    }

    /// Names of required fields left empty; Sentry rejects such actions.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let required: Vec<(&'static str, &str)> = match self {
            Self::Slack { workspace, channel } => {
                vec![("workspace", workspace.as_str()), ("channel", channel.as_str())]
            }
            Self::Teams {
                team,
                channel,
                channel_id,
            } => vec![
                ("team", team.as_str()),
                ("channel", channel.as_str()),
                ("channel_id", channel_id.as_str()),
            ],
            Self::None => Vec::new(),
        };
        required
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name)
            .collect()
    }

    /// Returns `true` when rules will carry a notification action.
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for NotificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slack { workspace, channel } => {
                write!(f, "Slack workspace {workspace}, channel {channel}")
            }
            Self::Teams {
                team,
                channel,
                channel_id,
            } => write!(f, "Teams {team}, channel {channel} ({channel_id})"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Alert rule tuning.
///
/// # Examples
///
/// ```
/// use provision_core::RuleConfig;
///
/// let rule = RuleConfig::default();
/// assert_eq!(rule.name, "Sentry alert");
/// assert_eq!(rule.frequency, 1440);
/// assert_eq!(rule.threshold, 10);
/// assert_eq!(rule.interval, "5m");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule name; also used to find previously created rules (default: `"Sentry alert"`).
    #[serde(default = "default_rule_name")]
    pub name: String,
    /// Minutes between repeated notifications for one issue (default: 1440).
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    /// Event frequency window (default: `"5m"`).
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Events within `interval` that trigger the rule (default: 10).
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Tags included in the notification (default: `"environment,url"`).
    #[serde(default = "default_tags")]
    pub tags: String,
}

fn default_rule_name() -> String {
    "Sentry alert".into()
}

fn default_frequency() -> u32 {
    1440
}

fn default_interval() -> String {
    "5m".into()
}

fn default_threshold() -> u32 {
    10
}

fn default_tags() -> String {
    "environment,url".into()
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            name: default_rule_name(),
            frequency: default_frequency(),
            interval: default_interval(),
            threshold: default_threshold(),
            tags: default_tags(),
        }
    }
}

/// DSN output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Template substituted with `TEST_DSN` / `LIVE_DSN` (default: `assets/sentry.tmpl`).
    #[serde(default = "default_template")]
    pub template: PathBuf,
}

fn default_template() -> PathBuf {
    PathBuf::from("assets/sentry.tmpl")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
        }
    }
}
