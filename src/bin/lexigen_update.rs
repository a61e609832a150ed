//! Command-line front end for the LexiGen updater.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use lexigen::progress::{AlwaysConfirm, Args, Confirm, EnglishTranslations, Translate};
use lexigen::update::{
    AutoUpdatePreference, InstallPlan, PayloadKind, ScriptOptions, UpdateState, render_script,
};
use lexigen::{AppConfig, Platform, ProgressSink, UpdateOrchestrator, UpdateStage};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Check for, download and install LexiGen updates.
#[derive(Parser)]
#[command(name = "lexigen-update", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the persisted update state.
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Report whether a newer release exists.
    Check,

    /// Download and install the latest release, then exit so it can relaunch.
    Update {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,

        /// Behave like a background check (honour dismissals and preference).
        #[arg(long)]
        auto: bool,

        /// Platform family to install for.
        #[arg(long)]
        platform: Option<Platform>,

        /// Installation to replace (defaults to the running executable).
        #[arg(long)]
        install_path: Option<PathBuf>,
    },

    /// Print the helper script for a hypothetical install.
    RenderScript {
        /// Platform family.
        #[arg(long)]
        platform: Platform,

        /// Payload type.
        #[arg(long, value_enum)]
        kind: Kind,

        /// Payload path (bundle, extracted root, executable or installer).
        #[arg(long)]
        artifact: PathBuf,

        /// Installation being replaced.
        #[arg(long)]
        install: PathBuf,

        /// Downloaded file (defaults to the artifact).
        #[arg(long)]
        download: Option<PathBuf>,

        /// Disk image mount point.
        #[arg(long)]
        mount: Option<PathBuf>,

        /// Extraction directory.
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Show or change the persisted update state.
    State {
        /// Set the auto-update preference (ask, always, never).
        #[arg(long)]
        auto_update: Option<AutoUpdatePreference>,

        /// Skip this release version in background checks.
        #[arg(long)]
        dismiss: Option<String>,

        /// Forget a dismissed release.
        #[arg(long)]
        clear_dismissed: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    AppBundle,
    Installer,
    RawFiles,
    Executable,
}

impl From<Kind> for PayloadKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::AppBundle => Self::AppBundle,
            Kind::Installer => Self::Installer,
            Kind::RawFiles => Self::RawFiles,
            Kind::Executable => Self::Executable,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("cannot load {}", config_path.display()))?;
    config.update.validate()?;

    let _log_guard = lexigen::logging::init(&config.logging);
    tracing::debug!(config = %config_path.display(), "configuration loaded");

    let state_path = cli
        .state_file
        .clone()
        .unwrap_or_else(lexigen::app_dirs::update_state_file);

    match cli.command {
        Command::Check => run_check(config, state_path),
        Command::Update {
            yes,
            auto,
            platform,
            install_path,
        } => run_update(
            config,
            state_path,
            UpdateArgs {
                yes,
                auto,
                platform: platform.unwrap_or_else(Platform::current),
                install_path,
            },
        ),
        Command::RenderScript {
            platform,
            kind,
            artifact,
            install,
            download,
            mount,
            work_dir,
        } => {
            let plan = InstallPlan {
                platform,
                download_path: download.unwrap_or_else(|| artifact.clone()),
                artifact_path: artifact,
                current_install_path: install,
                payload_kind: kind.into(),
                mount_point: mount,
                work_dir,
            };
            let options = ScriptOptions {
                delay_secs: config.update.relaunch_delay_secs,
                ..ScriptOptions::default()
            };
            match render_script(&plan, &options) {
                Some(script) => print!("{script}"),
                None => println!(
                    "no helper script: {} is launched directly",
                    plan.artifact_path.display()
                ),
            }
            Ok(())
        }
        Command::State {
            auto_update,
            dismiss,
            clear_dismissed,
        } => run_state(state_path, auto_update, dismiss, clear_dismissed),
    }
}

fn run_check(config: AppConfig, state_path: PathBuf) -> anyhow::Result<()> {
    let state = UpdateState::load_from(&state_path);
    let mut orchestrator = UpdateOrchestrator::new(config.update, state, Platform::current())
        .with_state_path(&state_path);
    let mut sink = TerminalSink::default();

    match orchestrator.check(&mut sink)? {
        Some(release) => {
            println!("LexiGen v{} is available.", release.version());
            if let Some(url) = release.html_url() {
                println!("{url}");
            }
        }
        None => {
            let version = &orchestrator.state().current_version;
            println!(
                "{}",
                EnglishTranslations.translate("no_updates_msg", &[("version", version.clone())])
            );
        }
    }
    Ok(())
}

struct UpdateArgs {
    yes: bool,
    auto: bool,
    platform: Platform,
    install_path: Option<PathBuf>,
}

fn run_update(config: AppConfig, state_path: PathBuf, args: UpdateArgs) -> anyhow::Result<()> {
    let state = UpdateState::load_from(&state_path);
    let mut orchestrator = UpdateOrchestrator::new(config.update, state, args.platform)
        .with_state_path(&state_path)
        .manual(!args.auto)
        .with_exit_hook(|| {
            tracing::info!("exiting so the update helper can replace this installation");
            std::process::exit(0);
        });
    if let Some(path) = args.install_path {
        orchestrator = orchestrator.with_install_path(path);
    }

    let mut sink = TerminalSink::default();
    let result = if args.yes {
        orchestrator.run(&mut sink, &mut AlwaysConfirm)
    } else {
        orchestrator.run(&mut sink, &mut StdinConfirm)
    };
    let stage = result.map_err(|e| anyhow::anyhow!("update failed ({}): {e}", e.kind()))?;

    tracing::debug!(%stage, "update finished");
    Ok(())
}

fn run_state(
    state_path: PathBuf,
    auto_update: Option<AutoUpdatePreference>,
    dismiss: Option<String>,
    clear_dismissed: bool,
) -> anyhow::Result<()> {
    let mut state = UpdateState::load_from(&state_path);
    let changed = auto_update.is_some() || dismiss.is_some() || clear_dismissed;

    if let Some(pref) = auto_update {
        state.auto_update = pref;
    }
    if clear_dismissed {
        state.dismissed_release = None;
    }
    if let Some(version) = dismiss {
        state.dismiss(lexigen::update::checker::strip_version_prefix(&version));
    }
    if changed {
        state.save_to(&state_path)?;
    }

    println!("state file:        {}", state_path.display());
    println!("current version:   {}", state.current_version);
    println!("auto update:       {}", state.auto_update);
    println!(
        "last check:        {}",
        state
            .last_check
            .map_or_else(|| "never".to_owned(), |t| t.to_rfc3339())
    );
    println!(
        "dismissed release: {}",
        state.dismissed_release.as_deref().unwrap_or("none")
    );
    Ok(())
}

/// Renders pipeline events on the terminal with an indicatif bar.
#[derive(Default)]
struct TerminalSink {
    bar: Option<ProgressBar>,
}

impl TerminalSink {
    fn bar(&mut self) -> &ProgressBar {
        self.bar.get_or_insert_with(|| {
            let pb = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::with_template("  {msg} [{bar:30}] {pos}%") {
                pb.set_style(style);
            }
            pb.set_message("Downloading");
            pb
        })
    }
}

impl ProgressSink for TerminalSink {
    fn on_progress(&mut self, percent: u8) {
        self.bar().set_position(u64::from(percent));
    }

    fn on_state_change(&mut self, stage: &UpdateStage) {
        match stage {
            UpdateStage::Downloading { version } => {
                println!("Downloading LexiGen v{version}...");
            }
            UpdateStage::Downloaded { .. } | UpdateStage::Failed { .. } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
            }
            UpdateStage::Installing => println!("Installing..."),
            UpdateStage::Exiting => println!("Update helper started; LexiGen will restart."),
            UpdateStage::Declined { version } | UpdateStage::Skipped { version } => {
                println!("Not updating to v{version}.");
            }
            _ => tracing::debug!(%stage, "stage"),
        }
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

/// Asks on stdin; anything starting with `y` is a yes.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, prompt_key: &str, args: &Args<'_>) -> bool {
        let prompt = EnglishTranslations.translate(prompt_key, args);
        print!("{prompt} [y/N] ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => answer.trim().to_ascii_lowercase().starts_with('y'),
            Err(_) => false,
        }
    }
}
