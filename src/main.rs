use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use provision_core::{DsnBundle, OutputFormat, ProvisionConfig, CONFIG_FILE_NAME};
use provision_sentry::provision::{NewApp, RuleReport};
use provision_sentry::Provisioner;

#[derive(Parser)]
#[command(
    name = "sentry-provision",
    version,
    about = "Provision Sentry projects, alert rules and DSN configuration",
    long_about = "Create Sentry projects for an application, attach the standard alert rule,\n\
                   link teams, and print DSN configuration for deployment templates.\n\n\
                   Configuration comes from .sentry-provision.toml, .env and the environment\n\
                   (AUTH_TOKEN, ORG, OWNER, ACTION_TEAM / ACTION_SLACK_ID, ACTION_CHANNEL, ...).\n\n\
                   Examples:\n  \
                     sentry-provision list                      List project slugs\n  \
                     sentry-provision list --as-yml             Print DSN templates for every app\n  \
                     sentry-provision new --app shop --as-yml   Create shop-test and shop-prod\n  \
                     sentry-provision rules --app shop-prod     Attach the alert rule\n  \
                     sentry-provision link --app shop-prod      Link the configured team\n  \
                     sentry-provision doctor                    Check configuration"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .sentry-provision.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable tables (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// List projects in the organization
    #[command(long_about = "List projects in the organization.\n\n\
        Follows pagination until every project is listed. With --as-yml, groups\n\
        <app>-test / <app>-prod projects by app and prints the DSN template for each.\n\n\
        Examples:\n  sentry-provision list\n  sentry-provision list --format json\n  sentry-provision list --as-yml")]
    List {
        /// Print the DSN template for every app instead of slugs
        #[arg(long)]
        as_yml: bool,
    },
    /// Attach the standard alert rule to a project
    #[command(long_about = "Attach the standard alert rule to a project.\n\n\
        The rule fires on event frequency and regressions, and notifies the configured\n\
        Slack or Teams channel.\n\n\
        Examples:\n  sentry-provision rules --app shop-prod\n  sentry-provision rules --app shop-prod --replace")]
    Rules {
        /// Project slug
        #[arg(long)]
        app: String,
        /// Delete existing rules with the same name first
        #[arg(long)]
        replace: bool,
    },
    /// Give a team access to a project
    #[command(long_about = "Give a team access to a project.\n\n\
        Uses the configured team (SENTRY_TEAM, falling back to ORG) unless --team is given.\n\n\
        Example:\n  sentry-provision link --app shop-prod --team backend")]
    Link {
        /// Project slug
        #[arg(long)]
        app: String,
        /// Team slug (default: configured team)
        #[arg(long)]
        team: Option<String>,
    },
    /// Create test and prod projects for a new app
    #[command(long_about = "Create test and prod projects for a new app.\n\n\
        Creates <app>-test and <app>-prod, fetches their public DSNs, and attaches the\n\
        alert rule to <app>-prod. With --as-yml, the DSNs are substituted into the\n\
        template (default: assets/sentry.tmpl) as $TEST_DSN and $LIVE_DSN.\n\n\
        Examples:\n  sentry-provision new --app shop\n  sentry-provision new --app shop --as-yml")]
    New {
        /// Base application name
        #[arg(long)]
        app: String,
        /// Print the substituted DSN template
        #[arg(long)]
        as_yml: bool,
    },
    /// Create a default .sentry-provision.toml configuration file
    #[command(long_about = "Create a default .sentry-provision.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .sentry-provision.toml already exists.")]
    Init,
    /// Check your configuration and environment
    #[command(long_about = "Check your configuration and environment.\n\n\
        Reports the config file, API token, organization, owner, notification target\n\
        and DSN template. Use --format json for machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

const DEFAULT_CONFIG: &str = r##"# sentry-provision configuration
# Environment variables (also read from .env) override these values.

[sentry]
# auth_token = "sntrys_..."          # AUTH_TOKEN
# organization = "my-org"            # ORG
# owner = "team:123"                 # OWNER, owner of created alert rules
# team = "my-team"                   # SENTRY_TEAM, defaults to the organization
# platform = "php"                   # SENTRY_PLATFORM
# base_url = "https://sentry.io/api/0"
# timeout_secs = 30

# Notification target for alert rules.
# ACTION_TEAM selects Teams, ACTION_SLACK_ID selects Slack.
# [notification]
# type = "slack"
# workspace = "123456"
# channel = "#alerts"
#
# [notification]
# type = "teams"
# team = "123456"
# channel = "General"
# channel_id = "19:...@thread.tacv2"

[rule]
# name = "Sentry alert"
# frequency = 1440
# interval = "5m"
# threshold = 10
# tags = "environment,url"

[output]
# template = "assets/sentry.tmpl"    # SENTRY_TEMPLATE
"##;

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!("sentry-provision v{version}: Sentry projects, alert rules and DSNs\n");

    println!("Quick start:");
    println!("  sentry-provision init                    Create a .sentry-provision.toml file");
    println!("  sentry-provision doctor                  Check your configuration");
    println!("  sentry-provision new --app shop --as-yml Provision shop-test and shop-prod\n");

    println!("All commands:");
    println!("  list      List projects, or DSN templates with --as-yml");
    println!("  rules     Attach the standard alert rule to a project");
    println!("  link      Give a team access to a project");
    println!("  new       Create test and prod projects for an app");
    println!("  doctor    Check your configuration");
    println!("  init      Create default configuration\n");

    println!("Run 'sentry-provision <command> --help' for details.");
}

fn load_dotenv() -> Result<()> {
    match dotenvy::from_path(Path::new(".env")) {
        Ok(()) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).into_diagnostic().wrap_err("loading .env"),
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,sentry_provision=debug,provision_sentry=debug,provision_core=debug")
        } else {
            EnvFilter::new("warn,provision_sentry=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

fn print_apps(slugs: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(slugs).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("| Project |");
            println!("|---------|");
            for slug in slugs {
                println!("| `{slug}` |");
            }
        }
        OutputFormat::Text => {
            for slug in slugs {
                println!("{slug}");
            }
            eprintln!("{} projects", slugs.len());
        }
    }
    Ok(())
}

fn print_bundles(
    provisioner: &Provisioner,
    bundles: &BTreeMap<String, DsnBundle>,
    format: OutputFormat,
) -> Result<()> {
    let mut rendered = BTreeMap::new();
    for (app, bundle) in bundles {
        if !bundle.is_complete() {
            tracing::warn!(app = %app, "app is missing a test or prod project, skipping");
            continue;
        }
        let yml = provisioner
            .render_bundle(bundle)
            .into_diagnostic()
            .wrap_err(format!("rendering template for {app}"))?;
        rendered.insert(app.as_str(), yml);
    }

    match format {
        OutputFormat::Json => {
            let json: serde_json::Map<String, serde_json::Value> = bundles
                .iter()
                .map(|(app, bundle)| {
                    let mut entry = serde_json::json!({
                        "testDsn": bundle.test_dsn,
                        "liveDsn": bundle.live_dsn,
                    });
                    if let Some(yml) = rendered.get(app.as_str()) {
                        entry["yml"] = serde_json::Value::from(yml.as_str());
                    }
                    (app.clone(), entry)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            for (app, yml) in &rendered {
                println!("## {app}\n");
                println!("```yaml\n{}\n```\n", yml.trim_end());
            }
        }
        OutputFormat::Text => {
            for (app, yml) in &rendered {
                println!("Sentry yml for {app}:");
                println!("###");
                println!("{}", yml.trim_end());
                println!("###");
            }
        }
    }
    Ok(())
}

fn print_rule_report(report: &RuleReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("| Project | Rule | Name | Replaced | Failed deletes |");
            println!("|---------|------|------|----------|----------------|");
            println!(
                "| `{}` | {} | {} | {} | {} |",
                report.project,
                report.created.id,
                report.created.name,
                report.deleted.join(", "),
                report.failed_deletes.join(", "),
            );
        }
        OutputFormat::Text => {
            println!(
                "Created rule {} ({}) on {}",
                report.created.id, report.created.name, report.project
            );
            for id in &report.deleted {
                println!("  deleted rule {id}");
            }
            for id in &report.failed_deletes {
                println!("  failed to delete rule {id}");
            }
        }
    }
    Ok(())
}

fn print_new_app(
    provisioner: &Provisioner,
    app: &NewApp,
    as_yml: bool,
    format: OutputFormat,
) -> Result<()> {
    let yml = if as_yml {
        Some(
            provisioner
                .render_bundle(&app.bundle)
                .into_diagnostic()
                .wrap_err("rendering DSN template")?,
        )
    } else {
        None
    };

    match format {
        OutputFormat::Json => {
            let mut json = serde_json::to_value(app).into_diagnostic()?;
            if let Some(yml) = &yml {
                json["yml"] = serde_json::Value::from(yml.as_str());
            }
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("# {}\n", app.app);
            println!("| Environment | Project | DSN |");
            println!("|-------------|---------|-----|");
            for p in &app.projects {
                println!("| {} | `{}` | `{}` |", p.environment, p.slug, p.dsn);
            }
            println!("\n**Alert rule:** {} ({})", app.rule.name, app.rule.id);
            if let Some(yml) = &yml {
                println!("\n```yaml\n{}\n```", yml.trim_end());
            }
        }
        OutputFormat::Text => {
            println!("{:<12} {:<32} DSN", "ENVIRONMENT", "PROJECT");
            for p in &app.projects {
                println!("{:<12} {:<32} {}", p.environment, p.slug, p.dsn);
            }
            println!("\nAlert rule {} ({}) created", app.rule.id, app.rule.name);
            if let Some(yml) = &yml {
                println!("\nSentry yml for {}:", app.app);
                println!("###");
                println!("{}", yml.trim_end());
                println!("###");
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Info,
}

impl CheckStatus {
    fn marker(self, use_color: bool) -> String {
        let (plain, color) = match self {
            Self::Pass => ("\u{2713}", "32"),
            Self::Warn => ("!", "33"),
            Self::Fail => ("\u{2717}", "31"),
            Self::Info => ("~", "36"),
        };
        if use_color {
            format!("\x1b[{color}m{plain}\x1b[0m")
        } else {
            plain.to_string()
        }
    }
}

/// One line of `doctor` output.
#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
            hint: None,
        }
    }

    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Pass, detail)
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Info, detail)
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Fail, detail).with_hint(hint)
    }

    fn warn(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warn, detail).with_hint(hint)
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn run_doctor(
    config: &ProvisionConfig,
    config_path: Option<&Path>,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    let config_path = config_path.unwrap_or(Path::new(CONFIG_FILE_NAME));
    if config_path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", config_path.display()),
        ));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            format!("{} not found, using environment only", config_path.display()),
        ));
    }

    if config.sentry.auth_token.is_some() {
        checks.push(CheckResult::pass("auth_token", "AUTH_TOKEN set"));
    } else {
        checks.push(CheckResult::fail(
            "auth_token",
            "AUTH_TOKEN not set",
            "export AUTH_TOKEN=... (scopes: project:read, project:write, alerts:write)",
        ));
    }

    match &config.sentry.organization {
        Some(org) => checks.push(CheckResult::pass("organization", org.clone())),
        None => checks.push(CheckResult::fail(
            "organization",
            "ORG not set",
            "export ORG=<organization slug> or set organization in .sentry-provision.toml",
        )),
    }

    match config.sentry.team() {
        Ok(team) => checks.push(CheckResult::info("team", team.to_string())),
        Err(_) => checks.push(CheckResult::info("team", "not set")),
    }

    match &config.sentry.owner {
        Some(owner) => checks.push(CheckResult::pass("rule_owner", owner.clone())),
        None => checks.push(CheckResult::info(
            "rule_owner",
            "not set, rules are created without an owner",
        )),
    }

    let missing = config.notification.missing_fields();
    if !missing.is_empty() {
        checks.push(CheckResult::warn(
            "notification",
            format!("{} (missing {})", config.notification, missing.join(", ")),
            "set ACTION_CHANNEL / ACTION_CHANNEL_ID or fill [notification] in the config file",
        ));
    } else if config.notification.is_configured() {
        checks.push(CheckResult::pass(
            "notification",
            config.notification.to_string(),
        ));
    } else {
        checks.push(CheckResult::fail(
            "notification",
            "no notification target",
            "export ACTION_SLACK_ID or ACTION_TEAM with ACTION_CHANNEL",
        ));
    }

    let template = &config.output.template;
    if template.exists() {
        checks.push(CheckResult::pass(
            "dsn_template",
            format!("{} found", template.display()),
        ));
    } else {
        checks.push(CheckResult::fail(
            "dsn_template",
            format!("{} not found", template.display()),
            "set SENTRY_TEMPLATE or [output] template (needed for --as-yml)",
        ));
    }

    checks.push(CheckResult::info("api", config.sentry.base_url.clone()));

    match format {
        OutputFormat::Json => {
            let version = env!("CARGO_PKG_VERSION");
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("sentry-provision v{version} environment check\n");

            for check in &checks {
                let sym = check.status.marker(use_color);
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<16} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let count = |status: CheckStatus| checks.iter().filter(|c| c.status == status).count();
            println!(
                "\n{} passed, {} warnings, {} failed",
                count(CheckStatus::Pass),
                count(CheckStatus::Warn),
                count(CheckStatus::Fail),
            );
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();

    load_dotenv()?;
    init_logging(cli.verbose);

    let config = ProvisionConfig::load(cli.config.as_deref())
        .into_diagnostic()
        .wrap_err("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome();
        }
        Some(Command::List { as_yml }) => {
            let provisioner = Provisioner::new(config).into_diagnostic()?;
            if as_yml {
                let bundles = provisioner.collect_bundles().await.into_diagnostic()?;
                print_bundles(&provisioner, &bundles, cli.format)?;
            } else {
                let slugs = provisioner.list_apps().await.into_diagnostic()?;
                print_apps(&slugs, cli.format)?;
            }
        }
        Some(Command::Rules { app, replace }) => {
            let provisioner = Provisioner::new(config).into_diagnostic()?;
            let report = provisioner
                .create_rules(&app, replace)
                .await
                .into_diagnostic()
                .wrap_err(format!("creating alert rule on {app}"))?;
            print_rule_report(&report, cli.format)?;
        }
        Some(Command::Link { app, team }) => {
            let provisioner = Provisioner::new(config).into_diagnostic()?;
            let project = provisioner
                .link_team(&app, team.as_deref())
                .await
                .into_diagnostic()
                .wrap_err(format!("linking team to {app}"))?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&project).into_diagnostic()?);
                }
                _ => {
                    let teams: Vec<&str> = project.teams.iter().map(|t| t.slug.as_str()).collect();
                    println!("{}: teams {}", project.slug, teams.join(", "));
                }
            }
        }
        Some(Command::New { app, as_yml }) => {
            let provisioner = Provisioner::new(config).into_diagnostic()?;
            if as_yml && !provisioner.config().output.template.exists() {
                miette::bail!(miette::miette!(
                    help = "set SENTRY_TEMPLATE or [output] template in .sentry-provision.toml",
                    "DSN template {} not found",
                    provisioner.config().output.template.display()
                ));
            }
            let result = provisioner
                .new_app(&app)
                .await
                .into_diagnostic()
                .wrap_err(format!("provisioning {app}"))?;
            print_new_app(&provisioner, &result, as_yml, cli.format)?;
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE_NAME);
            if path.exists() {
                miette::bail!("{CONFIG_FILE_NAME} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE_NAME} with default configuration");
        }
        Some(Command::Doctor) => {
            run_doctor(&config, cli.config.as_deref(), cli.format, use_color)?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "sentry-provision", &mut std::io::stdout());
        }
    }

    Ok(())
}
