use std::collections::BTreeMap;

use provision_core::{template, DsnBundle, Environment, ProvisionConfig, ProvisionError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::SentryClient;
use crate::model::{Project, RuleSummary};
use crate::rules::{rule_payload, RulePayload};

/// Sequences the API calls behind each CLI command.
///
/// Holds the loaded configuration; nothing is read from the environment
/// after construction.
pub struct Provisioner {
    client: SentryClient,
    config: ProvisionConfig,
}

/// Outcome of [`Provisioner::create_rules`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleReport {
    /// Project the rule was attached to.
    pub project: String,
    /// The rule as created by the API.
    pub created: RuleSummary,
    /// Ids of replaced rules that were deleted.
    pub deleted: Vec<String>,
    /// Ids of replaced rules whose deletion the API rejected.
    pub failed_deletes: Vec<String>,
}

/// One project created by [`Provisioner::new_app`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedProject {
    /// Environment the project serves.
    pub environment: Environment,
    /// Slug assigned by Sentry.
    pub slug: String,
    /// Public DSN.
    pub dsn: String,
}

/// Outcome of [`Provisioner::new_app`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApp {
    /// Base application name.
    pub app: String,
    /// Created projects, test first.
    pub projects: Vec<ProvisionedProject>,
    /// DSNs keyed for the template.
    pub bundle: DsnBundle,
    /// Alert rule attached to the production project.
    pub rule: RuleSummary,
}

impl Provisioner {
    /// Build a provisioner and its API client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Config`] if the token or organization is missing.
    pub fn new(config: ProvisionConfig) -> Result<Self, ProvisionError> {
        let client = SentryClient::new(&config.sentry)?;
        Ok(Self { client, config })
    }

    /// The underlying API client.
    pub fn client(&self) -> &SentryClient {
        &self.client
    }

    /// The configuration this provisioner was built with.
    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Slugs of the configured organization's projects, across all pages.
    ///
    /// `/projects/` lists every project the token can see; projects owned by
    /// other organizations are dropped.
    pub async fn list_apps(&self) -> Result<Vec<String>, ProvisionError> {
        let org = self.client.organization();
        let projects = self.client.list_projects().await?;
        Ok(projects
            .into_iter()
            .filter(|p| {
                let keep = p.in_organization(org);
                if !keep {
                    debug!(slug = %p.slug, "skipping project of another organization");
                }
                keep
            })
            .map(|p| p.slug)
            .collect())
    }

    /// The configured alert rule for `slug`.
    pub fn rule_for(&self, slug: &str) -> RulePayload {
        rule_payload(
            slug,
            self.config.sentry.owner.as_deref(),
            &self.config.rule,
            &self.config.notification,
        )
    }

    /// Attach the standard alert rule to `app`.
    ///
    /// With `replace`, existing rules carrying the configured rule name are
    /// deleted first. Deletions the API rejects are reported, not fatal.
    ///
    /// # Errors
    ///
    /// Fails if listing rules or creating the rule fails.
    pub async fn create_rules(&self, app: &str, replace: bool) -> Result<RuleReport, ProvisionError> {
        let mut deleted = Vec::new();
        let mut failed_deletes = Vec::new();

        if replace {
            let existing = self.client.list_rules(app).await?;
            for rule in existing.into_iter().filter(|r| r.name == self.config.rule.name) {
                if self.client.delete_rule(app, &rule.id).await? {
                    info!(app, rule_id = %rule.id, "deleted existing rule");
                    deleted.push(rule.id);
                } else {
                    failed_deletes.push(rule.id);
                }
            }
        }

        let created = self.client.create_rule(app, &self.rule_for(app)).await?;
        info!(app, rule_id = %created.id, "created alert rule");

        Ok(RuleReport {
            project: app.to_string(),
            created,
            deleted,
            failed_deletes,
        })
    }

    /// Give a team access to `app`. Defaults to the configured team.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Config`] if no team is given or configured.
    pub async fn link_team(&self, app: &str, team: Option<&str>) -> Result<Project, ProvisionError> {
        let team = match team {
            Some(team) => team,
            None => self.config.sentry.team()?,
        };
        let project = self.client.link_team(app, team).await?;
        info!(app, team, "linked team to project");
        Ok(project)
    }

    /// Public DSN of the first active key of `slug`, if it has one.
    pub async fn existing_dsn(&self, slug: &str) -> Result<Option<String>, ProvisionError> {
        let keys = self.client.list_keys(slug).await?;
        Ok(keys
            .into_iter()
            .find(|k| k.is_active)
            .map(|k| k.dsn.public))
    }

    /// Public DSN of `slug`, creating a client key when none is active.
    pub async fn project_dsn(&self, slug: &str) -> Result<String, ProvisionError> {
        if let Some(dsn) = self.existing_dsn(slug).await? {
            return Ok(dsn);
        }
        let key = self.client.create_key(slug).await?;
        info!(slug, key = %key.id, "created client key");
        Ok(key.dsn.public)
    }

    /// Create `<app>-test` and `<app>-prod`, collect their DSNs, and attach
    /// the alert rule to the production project.
    ///
    /// # Errors
    ///
    /// Stops at the first failing call; projects created before it remain.
    pub async fn new_app(&self, app: &str) -> Result<NewApp, ProvisionError> {
        let team = self.config.sentry.team()?;
        let mut projects = Vec::new();
        let mut bundle = DsnBundle::default();
        let mut rule = None;

        for env in Environment::ALL {
            let name = env.project_slug(app);
            let project = self
                .client
                .create_project(team, &name, &self.config.sentry.platform)
                .await?;
            info!(app, environment = %env, slug = %project.slug, "created project");

            let dsn = self.project_dsn(&project.slug).await?;
            bundle.insert(env, dsn.clone());

            if env == Environment::Prod {
                let created = self
                    .client
                    .create_rule(&project.slug, &self.rule_for(&project.slug))
                    .await?;
                info!(slug = %project.slug, rule_id = %created.id, "created alert rule");
                rule = Some(created);
            }

            projects.push(ProvisionedProject {
                environment: env,
                slug: project.slug,
                dsn,
            });
        }

        let rule = rule.ok_or_else(|| {
            ProvisionError::Config("no production environment was provisioned".into())
        })?;

        Ok(NewApp {
            app: app.to_string(),
            projects,
            bundle,
            rule,
        })
    }

    /// Group the DSNs of existing `*-test` / `*-prod` projects by base name.
    ///
    /// Projects without an environment suffix, or without an active key,
    /// are skipped.
    pub async fn collect_bundles(&self) -> Result<BTreeMap<String, DsnBundle>, ProvisionError> {
        let mut bundles: BTreeMap<String, DsnBundle> = BTreeMap::new();

        for slug in self.list_apps().await? {
            let Some((base, env)) = Environment::split_slug(&slug) else {
                continue;
            };
            match self.existing_dsn(&slug).await? {
                Some(dsn) => bundles.entry(base.to_string()).or_default().insert(env, dsn),
                None => warn!(slug = %slug, "project has no active client key, skipping"),
            }
        }

        Ok(bundles)
    }

    /// Substitute `bundle` into the configured template.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::FileNotFound`] if the template is missing, or
    /// [`ProvisionError::Template`] if it references a DSN the bundle lacks.
    pub fn render_bundle(&self, bundle: &DsnBundle) -> Result<String, ProvisionError> {
        template::render_file(&self.config.output.template, &bundle.vars())
    }
}
