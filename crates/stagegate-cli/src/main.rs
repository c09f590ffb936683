//! Stagegate - staged deployment pipeline runner
//!
//! ## Commands
//!
//! - `run`: Execute the pipeline from a configuration file
//! - `plan`: Show which stages a run would execute
//! - `config`: Print the effective configuration

mod approvals;
mod webhook;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use stagegate_core::{
    write_report_json, write_report_md, ApprovalGate, Environment, PipelineConfig,
    PipelineEngine, RunParameters, RunReport, RunStatus, StageOutcome, StageRecord, Verdict,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use approvals::{spawn_approver, ApprovalPolicy};
use webhook::WebhookNotifier;

#[derive(Parser)]
#[command(name = "stagegate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Staged deployment pipeline with gated promotions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline
    Run {
        #[command(flatten)]
        params: ParamArgs,

        /// Pipeline configuration file (JSON). The built-in defaults configure
        /// no stage commands, so a run needs one.
        #[arg(short, long, env = "STAGEGATE_CONFIG")]
        config: Option<PathBuf>,

        /// Approve promotion to this environment without prompting (repeatable)
        #[arg(long = "approve", value_name = "ENV")]
        approve: Vec<Environment>,

        /// Prompt on stdin for promotions that were not pre-approved
        #[arg(long)]
        interactive: bool,

        /// Name recorded as the approver
        #[arg(long, env = "STAGEGATE_APPROVER", default_value = "stagegate-cli")]
        approver: String,

        /// Directory for run reports (default archive root is <dir>/archive)
        #[arg(long, env = "STAGEGATE_REPORT_DIR", default_value = ".stagegate/runs")]
        report_dir: PathBuf,

        /// Webhook receiving notifications (overrides the config file)
        #[arg(long, env = "STAGEGATE_WEBHOOK_URL")]
        webhook_url: Option<String>,
    },

    /// Show which stages would run, assuming every stage passes
    Plan {
        #[command(flatten)]
        params: ParamArgs,

        /// Pipeline configuration file (JSON)
        #[arg(short, long, env = "STAGEGATE_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Config {
        /// Pipeline configuration file (default: built-in defaults)
        #[arg(short, long, env = "STAGEGATE_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Run parameters shared by `run` and `plan`.
#[derive(Args, Debug, Clone)]
struct ParamArgs {
    /// Highest environment to promote into (dev, staging, prod)
    #[arg(short, long, env = "STAGEGATE_TARGET_ENV")]
    target_env: Environment,

    /// Run the security scan stage
    #[arg(long, env = "STAGEGATE_RUN_SECURITY_SCAN", default_value_t = true, action = ArgAction::Set)]
    run_security_scan: bool,

    /// Run the compliance check stage
    #[arg(long, env = "STAGEGATE_RUN_COMPLIANCE_CHECK", default_value_t = true, action = ArgAction::Set)]
    run_compliance_check: bool,

    /// Version tag (default: vYYYY.MM.DD-<build number>)
    #[arg(long, env = "STAGEGATE_VERSION_TAG")]
    version_tag: Option<String>,

    /// Job identifier
    #[arg(long, env = "STAGEGATE_JOB_NAME", default_value = "stagegate")]
    job_name: String,

    /// Run number within the job
    #[arg(long, env = "STAGEGATE_BUILD_NUMBER", default_value_t = 1)]
    build_number: u64,
}

impl ParamArgs {
    fn to_params(&self) -> RunParameters {
        let mut params = RunParameters::new(self.target_env)
            .with_job(self.job_name.clone(), self.build_number)
            .with_security_scan(self.run_security_scan)
            .with_compliance_check(self.run_compliance_check);
        if let Some(tag) = &self.version_tag {
            params = params.with_version_tag(tag.clone());
        }
        params
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    stagegate_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            params,
            config,
            approve,
            interactive,
            approver,
            report_dir,
            webhook_url,
        } => {
            let policy = ApprovalPolicy {
                pre_approved: approve,
                interactive,
                approver,
            };
            cmd_run(
                &params,
                config.as_deref(),
                policy,
                &report_dir,
                webhook_url,
            )
            .await
        }
        Commands::Plan { params, config } => cmd_plan(&params, config.as_deref()),
        Commands::Config { config } => cmd_config(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load pipeline config {:?}", path)),
        None => Ok(PipelineConfig::default()),
    }
}

async fn cmd_run(
    args: &ParamArgs,
    config_path: Option<&Path>,
    policy: ApprovalPolicy,
    report_dir: &Path,
    webhook_url: Option<String>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if webhook_url.is_some() {
        config.notify_webhook = webhook_url;
    }
    if config.archive_dir.is_none() {
        config.archive_dir = Some(report_dir.join("archive"));
    }
    config.validate().context("Invalid pipeline config")?;

    let params = args.to_params();
    println!(
        "Running {} #{} targeting {}",
        params.job_name, params.build_number, params.target_env
    );

    let (gate, inbox) = ApprovalGate::channel();
    let mut engine = PipelineEngine::from_config(config.clone(), gate);
    let unconfigured = unconfigured_planned(&engine, &params);
    if !unconfigured.is_empty() {
        anyhow::bail!(
            "No command configured for stage(s) this run would reach: {} (see `stagegate config`)",
            unconfigured.join(", ")
        );
    }
    if let Some(url) = &config.notify_webhook {
        engine = engine.with_notifier(Arc::new(WebhookNotifier::new(url)?));
    }

    let approver = spawn_approver(inbox, policy);
    let report = engine.run(params).await;
    drop(engine);

    let run_dir = report_dir.join(report.run_id.to_string());
    let written = write_reports(&run_dir, &report);
    approver.abort();
    approver.await.ok();
    written?;

    print_summary(&report);
    println!("Report: {}", run_dir.join("run_report.json").display());

    match report.status {
        RunStatus::Failure => anyhow::bail!(
            "Pipeline failed: {}",
            report.abort_reason.as_deref().unwrap_or("unknown reason")
        ),
        RunStatus::Unstable => {
            warn!(
                findings = report.findings.len(),
                "pipeline finished unstable"
            );
            Ok(())
        }
        RunStatus::Success | RunStatus::Running => Ok(()),
    }
}

/// Planned stages whose command is missing from the configuration.
fn unconfigured_planned(engine: &PipelineEngine, params: &RunParameters) -> Vec<&'static str> {
    let unconfigured = engine.config().unconfigured_stages();
    engine
        .plan(params)
        .into_iter()
        .filter(|(stage, runs)| *runs && unconfigured.contains(stage))
        .map(|(stage, _)| stage.name())
        .collect()
}

fn write_reports(run_dir: &Path, report: &RunReport) -> Result<()> {
    std::fs::create_dir_all(run_dir)
        .with_context(|| format!("Failed to create report directory {:?}", run_dir))?;
    write_report_json(&run_dir.join("run_report.json"), report)
        .context("Failed to write run_report.json")?;
    write_report_md(&run_dir.join("run_report.md"), report)
        .context("Failed to write run_report.md")?;
    info!(path = %run_dir.display(), "run report written");
    Ok(())
}

fn stage_line(record: &StageRecord) -> String {
    let (mark, note) = match (&record.outcome, &record.verdict) {
        (StageOutcome::Skipped, _) => ("-", "skipped".to_string()),
        (StageOutcome::NotApproved, Some(Verdict::Abort { reason })) => ("✗", reason.clone()),
        (StageOutcome::NotApproved, _) => ("✗", "not approved".to_string()),
        (_, Some(Verdict::Abort { reason })) => ("✗", reason.clone()),
        (_, Some(Verdict::Warn { finding })) => ("!", finding.clone()),
        (_, _) => ("✓", "ok".to_string()),
    };
    format!("  {} {:<18} {}", mark, record.stage.name(), note)
}

fn print_summary(report: &RunReport) {
    println!();
    println!("Run ID: {}", report.run_id);
    println!("Version: {}", report.version_tag);
    println!("Duration: {}ms", report.duration_ms);
    println!();
    for record in &report.stages {
        println!("{}", stage_line(record));
    }
    println!();
    if !report.archived.is_empty() {
        println!("Archived {} artifact(s)", report.archived.len());
    }
    for error in &report.post_run_errors {
        println!("Post-run error: {}", error);
    }
    println!("Status: {}", report.status.name().to_uppercase());
}

fn cmd_plan(args: &ParamArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = PipelineEngine::from_config(config, ApprovalGate::detached());
    let params = args.to_params();

    let unconfigured = engine.config().unconfigured_stages();

    println!("Plan for target {}:", params.target_env);
    for (stage, runs) in engine.plan(&params) {
        let gated = engine
            .stages()
            .iter()
            .any(|s| s.kind == stage && s.gated);
        let mut notes = Vec::new();
        if runs && gated {
            notes.push("approval required");
        }
        if runs && unconfigured.contains(&stage) {
            notes.push("no command configured");
        }
        println!(
            "  {} {}{}",
            if runs { "run " } else { "skip" },
            stage,
            if notes.is_empty() {
                String::new()
            } else {
                format!(" ({})", notes.join(", "))
            }
        );
    }
    Ok(())
}

fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let rendered =
        serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "stagegate",
            "run",
            "--target-env",
            "production",
            "--run-security-scan",
            "false",
            "--approve",
            "staging",
            "--approve",
            "prod",
            "--job-name",
            "billing",
            "--build-number",
            "42",
        ])
        .expect("parse");

        match cli.command {
            Commands::Run {
                params, approve, ..
            } => {
                let params = params.to_params();
                assert_eq!(params.target_env, Environment::Prod);
                assert!(!params.run_security_scan);
                assert!(params.run_compliance_check);
                assert_eq!(params.job_name, "billing");
                assert_eq!(params.build_number, 42);
                assert_eq!(approve, vec![Environment::Staging, Environment::Prod]);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_unknown_environment_rejected() {
        let result = Cli::try_parse_from(["stagegate", "plan", "--target-env", "qa"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_defaults_without_path() {
        let config = load_config(None).expect("defaults");
        assert_eq!(config, PipelineConfig::default());
    }

    #[tokio::test]
    async fn test_run_with_static_failure_writes_report_and_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("pipeline.json");
        std::fs::write(
            &config_path,
            r#"{"stages": {
                "validate": {"command": ["false"]},
                "unit_test": {"command": ["true"]},
                "integration_test": [{"command": ["true"]}],
                "build_package": {"command": ["true"]},
                "deploy_dev": {"deploy": {"command": ["true"]}}
            }}"#,
        )
        .expect("write config");

        let args = ParamArgs {
            target_env: Environment::Dev,
            run_security_scan: false,
            run_compliance_check: false,
            version_tag: Some("v0.1.0".to_string()),
            job_name: "billing".to_string(),
            build_number: 1,
        };
        let policy = ApprovalPolicy {
            pre_approved: vec![],
            interactive: false,
            approver: "test".to_string(),
        };
        let report_dir = dir.path().join("runs");

        let err = cmd_run(&args, Some(&config_path), policy, &report_dir, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("validate failed"));

        let run_dirs: Vec<_> = std::fs::read_dir(&report_dir)
            .expect("report dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "archive")
            .collect();
        assert_eq!(run_dirs.len(), 1);
        assert!(run_dirs[0].path().join("run_report.json").exists());
        assert!(run_dirs[0].path().join("run_report.md").exists());
    }

    #[tokio::test]
    async fn test_run_without_commands_fails_before_starting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = ParamArgs {
            target_env: Environment::Dev,
            run_security_scan: false,
            run_compliance_check: true,
            version_tag: None,
            job_name: "billing".to_string(),
            build_number: 2,
        };
        let policy = ApprovalPolicy {
            pre_approved: vec![],
            interactive: false,
            approver: "test".to_string(),
        };
        let report_dir = dir.path().join("runs");

        let err = cmd_run(&args, None, policy, &report_dir, None)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("validate"));
        assert!(message.contains("compliance_check"));
        assert!(!message.contains("security_scan"));
        assert!(!message.contains("deploy_staging"));
        assert!(!report_dir.exists());
    }
}
