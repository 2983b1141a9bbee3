//! Rim CLI - module status of a git workspace with embedded repositories.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use rim::{
    ChecksumDirtyCheck, Config, GitSession, ModuleStatus, RevStatus, RimInfoProvider, StatusBuilder, StatusOptions,
    StopMode,
};
use std::fs;
use std::path::{Component, Path, PathBuf};

mod cli;

use cli::{Cli, Command, parse_range, status_records, verify_dirty};

fn setup_logging(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;

    let log_file = config.log_file();

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_workspace_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn format_dirty(dirty: bool) -> ColoredString {
    if dirty { "[DIRTY]".red() } else { "[   OK]".green() }
}

/// Leaf revisions are where the walk stopped and are not reported.
fn is_reported(node: &RevStatus) -> bool {
    node.rev().is_none() || !node.is_boundary()
}

fn print_node(session: &GitSession, node: &RevStatus, detailed: bool) -> Result<()> {
    if !is_reported(node) {
        return Ok(());
    }

    let headline = match node.rev() {
        Some(rev) => session.headline(rev).context("Failed to read commit")?,
        None => "------- uncommitted changes".to_string(),
    };
    let dirty: Vec<&ModuleStatus> = node.dirty_modules().collect();
    let stat_info = format_dirty(!dirty.is_empty());

    if detailed {
        println!("{} {}", stat_info, headline);
        for module in &dirty {
            println!("        - {}", module.dir.yellow());
        }
    } else if !dirty.is_empty() {
        println!("{} {} {}", stat_info, headline, format!("({} modules dirty)", dirty.len()).dimmed());
    } else {
        println!("{} {}", stat_info, headline);
    }

    Ok(())
}

/// Print every node of a status tree once, newest first.
fn print_tree(session: &GitSession, root: &RevStatus, detailed: bool) -> Result<()> {
    for node in root.walk() {
        print_node(session, node, detailed)?;
    }
    Ok(())
}

fn print_module(module: &ModuleStatus) {
    let target = module
        .metadata
        .target_revision
        .as_deref()
        .map(|t| format!(" @{}", t))
        .unwrap_or_default();
    println!(
        "{} {} {}{}",
        format_dirty(module.dirty),
        module.dir.cyan(),
        module.metadata.remote_url.dimmed(),
        target.dimmed()
    );
}

#[allow(clippy::too_many_arguments)]
fn run_status(
    config: &Config,
    session: &GitSession,
    range: Option<String>,
    detailed: bool,
    verify_clean: bool,
    gerrit: bool,
    fast: bool,
    json: bool,
) -> Result<()> {
    let builder = StatusBuilder::new(session, &RimInfoProvider, &ChecksumDirtyCheck);
    let mode = if gerrit { StopMode::Gerrit } else { config.stop_mode };

    let mut working_copy = None;
    let (stop_rev, target) = match range {
        Some(range) => parse_range(&range),
        None => {
            if session.has_uncommitted_changes()? {
                working_copy = Some(
                    builder
                        .working_copy(session.root())
                        .context("Failed to check working copy")?,
                );
            }
            (None, session.current_branch()?)
        }
    };

    let mut options = StatusOptions::new().mode(mode).fast(fast);
    if let Some(stop_rev) = stop_rev {
        options = options.stop_rev(stop_rev);
    }
    let history = builder
        .history(&target, &options)
        .with_context(|| format!("Failed to compute status of {}", target))?;

    if json {
        let records = status_records(working_copy.as_ref(), &history);
        println!("{}", serde_json::to_string_pretty(&records).context("Failed to serialize status")?);
    } else {
        if let Some(wc) = &working_copy {
            print_node(session, wc, detailed)?;
        }
        print_tree(session, &history, detailed)?;
    }

    if verify_clean && verify_dirty(working_copy.as_ref(), &history) {
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli, config: &Config) -> Result<()> {
    let session = GitSession::open(&config.root).context("Failed to open workspace")?;

    match cli.command {
        Command::Status {
            range,
            detailed,
            verify_clean,
            gerrit,
            fast,
            json,
        } => run_status(config, &session, range, detailed, verify_clean, gerrit, fast, json)?,

        Command::Show { rev } => {
            let builder = StatusBuilder::new(&session, &RimInfoProvider, &ChecksumDirtyCheck);
            let status = builder
                .rev_status(&rev)
                .with_context(|| format!("Failed to compute status of {}", rev))?;

            println!("{} {}", format_dirty(status.is_dirty()), session.headline(&rev)?);
            if status.modules().is_empty() {
                println!("{}", "No modules found".dimmed());
            }
            for module in status.modules() {
                print_module(module);
            }
        }

        Command::Module { path, rev } => {
            let builder = StatusBuilder::new(&session, &RimInfoProvider, &ChecksumDirtyCheck);
            let path = module_path(&config.root, &path);
            match builder
                .module_status(&rev, &path)
                .with_context(|| format!("Failed to compute status of module {}", path))?
            {
                Some(module) => print_module(&module),
                None => {
                    eprintln!("{} No module at {} in {}", "✗".red(), path, rev);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Module path relative to the workspace root, accepting absolute paths too.
fn module_path(root: &Path, path: &str) -> String {
    let relative = Path::new(path).strip_prefix(root).map(Path::to_path_buf);
    let relative = relative.unwrap_or_else(|_| PathBuf::from(path));
    relative
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::new(get_workspace_dir(&cli)).from_env();

    setup_logging(&config).context("Failed to setup logging")?;
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli, &config) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
