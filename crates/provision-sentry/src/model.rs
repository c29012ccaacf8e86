//! Entities returned by the Sentry API.
//!
//! Only the fields this tool reads are modelled; unknown fields are ignored.

use serde::{Deserialize, Deserializer, Serialize};

/// A Sentry project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Numeric id, sent by the API as a string.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// URL-safe project identifier.
    pub slug: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// SDK platform, e.g. `php`.
    #[serde(default)]
    pub platform: Option<String>,
    /// Teams with access to the project.
    #[serde(default)]
    pub teams: Vec<TeamRef>,
    /// Owning organization. Present on the cross-organization `/projects/` listing.
    #[serde(default)]
    pub organization: Option<OrgRef>,
}

impl Project {
    /// Whether the project belongs to `org`. Projects without an embedded
    /// organization are assumed to match.
    pub fn in_organization(&self, org: &str) -> bool {
        self.organization.as_ref().map_or(true, |o| o.slug == org)
    }
}

/// Organization reference embedded in a [`Project`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgRef {
    /// Organization slug.
    pub slug: String,
    /// Organization display name.
    #[serde(default)]
    pub name: String,
}

/// Team reference embedded in a [`Project`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRef {
    /// Team slug.
    pub slug: String,
    /// Team display name.
    #[serde(default)]
    pub name: String,
}

/// A client key of a project, carrying its DSNs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectKey {
    /// Key id (the public key).
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Key label, e.g. `Default`.
    #[serde(default)]
    pub name: String,
    /// DSN variants for this key.
    pub dsn: Dsn,
    /// Disabled keys reject events.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// DSN variants of a [`ProjectKey`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dsn {
    /// Public DSN, used by SDKs.
    pub public: String,
    /// Legacy DSN including the secret key.
    #[serde(default)]
    pub secret: Option<String>,
    /// Content-Security-Policy report endpoint.
    #[serde(default)]
    pub csp: Option<String>,
}

/// An issue alert rule as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSummary {
    /// Rule id.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Rule name.
    pub name: String,
    /// Project slugs the rule applies to.
    #[serde(default)]
    pub projects: Vec<String>,
    /// `all`, `any` or `none`.
    #[serde(default)]
    pub action_match: Option<String>,
    /// Minutes between notifications for the same issue.
    #[serde(default)]
    pub frequency: Option<u32>,
    /// Notification actions, passed through untouched.
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
}

/// Accept ids encoded either as JSON strings or numbers.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}
