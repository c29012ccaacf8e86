use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment environment a Sentry project is provisioned for.
///
/// Every application gets one project per environment, named
/// `<app>-<suffix>`.
///
/// # Examples
///
/// ```
/// use provision_core::Environment;
///
/// assert_eq!(Environment::Test.project_slug("shop"), "shop-test");
/// assert_eq!(Environment::Prod.dsn_key(), "LIVE_DSN");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Staging / UAT.
    Test,
    /// Production.
    Prod,
}

impl Environment {
    /// All environments in provisioning order.
    pub const ALL: [Environment; 2] = [Environment::Test, Environment::Prod];

    /// Slug suffix without the leading dash.
    pub fn suffix(self) -> &'static str {
        match self {
            Environment::Test => "test",
            Environment::Prod => "prod",
        }
    }

    /// Template variable that receives this environment's DSN.
    pub fn dsn_key(self) -> &'static str {
        match self {
            Environment::Test => "TEST_DSN",
            Environment::Prod => "LIVE_DSN",
        }
    }

    /// Project slug for `app` in this environment.
    pub fn project_slug(self, app: &str) -> String {
        format!("{app}-{}", self.suffix())
    }

    /// Split a project slug into its base application name and environment.
    ///
    /// Returns `None` for slugs without a recognised suffix or with an empty
    /// base name.
    ///
    /// # Examples
    ///
    /// ```
    /// use provision_core::Environment;
    ///
    /// assert_eq!(
    ///     Environment::split_slug("shop-prod"),
    ///     Some(("shop", Environment::Prod))
    /// );
    /// assert_eq!(Environment::split_slug("shop"), None);
    /// ```
    pub fn split_slug(slug: &str) -> Option<(&str, Environment)> {
        Self::ALL.into_iter().find_map(|env| {
            slug.strip_suffix(env.suffix())
                .and_then(|rest| rest.strip_suffix('-'))
                .filter(|base| !base.is_empty())
                .map(|base| (base, env))
        })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Public DSNs for the test and live projects of one application.
///
/// # Examples
///
/// ```
/// use provision_core::{DsnBundle, Environment};
///
/// let mut bundle = DsnBundle::default();
/// bundle.insert(Environment::Test, "https://a@o1.ingest.sentry.io/1");
/// assert!(!bundle.is_complete());
/// bundle.insert(Environment::Prod, "https://b@o1.ingest.sentry.io/2");
/// assert!(bundle.is_complete());
/// assert_eq!(bundle.vars().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsnBundle {
    /// DSN of the `-test` project.
    pub test_dsn: Option<String>,
    /// DSN of the `-prod` project.
    pub live_dsn: Option<String>,
}

impl DsnBundle {
    /// Record the DSN for `env`, replacing any previous value.
    pub fn insert(&mut self, env: Environment, dsn: impl Into<String>) {
        let slot = match env {
            Environment::Test => &mut self.test_dsn,
            Environment::Prod => &mut self.live_dsn,
        };
        *slot = Some(dsn.into());
    }

    /// DSN recorded for `env`, if any.
    pub fn get(&self, env: Environment) -> Option<&str> {
        match env {
            Environment::Test => self.test_dsn.as_deref(),
            Environment::Prod => self.live_dsn.as_deref(),
        }
    }

    /// Both DSNs are known.
    pub fn is_complete(&self) -> bool {
        self.test_dsn.is_some() && self.live_dsn.is_some()
    }

    /// Template variables (`TEST_DSN`, `LIVE_DSN`) for the DSNs present.
    pub fn vars(&self) -> HashMap<&'static str, &str> {
        Environment::ALL
            .into_iter()
            .filter_map(|env| self.get(env).map(|dsn| (env.dsn_key(), dsn)))
            .collect()
    }
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use provision_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown tables.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
