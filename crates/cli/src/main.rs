//! trainpath CLI - sequential training paths with gated modules.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use trainpath_core::{AccessStatus, LearnerId, ModuleId, PathId, ProgressStatus};
use trainpath_progress::{
    AccessWatcher, CapstoneAvailability, CapstoneGate, CapstoneSubmission, ModuleProgress,
    PathAccessEngine, PathProgressSummary, ProgressConfig,
};
use trainpath_storage::{Catalog, JsonStorage, ModuleCatalog};

#[derive(Parser)]
#[command(name = "trainpath")]
#[command(about = "Sequential training paths with gated modules", long_about = None)]
struct Cli {
    /// Data directory
    #[arg(long, global = true, default_value = ".trainpath")]
    data: PathBuf,

    /// Configuration file (defaults apply when missing)
    #[arg(long, global = true, default_value = "trainpath.toml")]
    config: PathBuf,

    /// Learner ID
    #[arg(long, global = true)]
    learner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import paths and modules from a catalog JSON file
    Import {
        /// Catalog file
        file: PathBuf,
    },
    /// List active paths
    Paths,
    /// Show which modules of a path are locked
    Access {
        /// Path ID
        path: String,
    },
    /// Show completion of a path
    Summary {
        /// Path ID
        path: String,
    },
    /// Open a module
    View {
        /// Module ID
        module: String,
    },
    /// Submit a module quiz
    Quiz {
        /// Module ID
        module: String,
        /// Comma-separated option indexes, `_` for unanswered
        #[arg(long)]
        answers: String,
    },
    /// Complete a module without a quiz
    Complete {
        /// Module ID
        module: String,
    },
    /// Reset a module to not started
    Reset {
        /// Module ID
        module: String,
    },
    /// Show or submit the capstone quiz of a path
    Capstone {
        /// Path ID
        path: String,
        /// Comma-separated option indexes, `_` for unanswered
        #[arg(long)]
        answers: Option<String>,
    },
    /// Follow access changes of a path until interrupted
    Watch {
        /// Path ID
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TRAINPATH_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    debug!("Using data directory {}", cli.data.display());

    let storage = Arc::new(
        JsonStorage::new(&cli.data)
            .await
            .with_context(|| format!("opening data directory {}", cli.data.display()))?,
    );
    let engine = PathAccessEngine::new(storage.clone(), storage.clone())
        .with_retry_policy(config.retry_attempts, config.retry_delay());

    match cli.command {
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let catalog: Catalog = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", file.display()))?;
            storage.import_catalog(&catalog).await.context("importing catalog")?;
            println!(
                "Imported {} paths, {} modules",
                catalog.paths.len(),
                catalog.modules.len()
            );
        }
        Commands::Paths => {
            let paths = storage.list_paths().await?;
            println!("Paths ({})", paths.len());
            for path in paths {
                let modules = storage.list_modules_for_path(path.id).await?;
                let capstone = if path.capstone.is_some() { " + capstone" } else { "" };
                println!("  {} | {} | {} modules{}", path.id, path.name, modules.len(), capstone);
            }
        }
        Commands::Access { path } => {
            let learner = learner(&cli.learner)?;
            let path_id = parse_path(&path)?;
            let statuses = engine.get_access_status(&learner, path_id).await?;
            for status in &statuses {
                println!("{}", format_access(status));
            }
        }
        Commands::Summary { path } => {
            let learner = learner(&cli.learner)?;
            let path_id = parse_path(&path)?;
            let summary = PathProgressSummary::new(storage.clone(), storage.clone())
                .summarize(&learner, path_id)
                .await?;
            println!(
                "Progress: {}/{} modules ({}%)",
                summary.completed_count, summary.total_count, summary.percentage
            );
            if summary.is_path_complete {
                println!("All modules complete");
            }
        }
        Commands::View { module } => {
            let learner = learner(&cli.learner)?;
            let module_id = parse_module(&module)?;
            ensure_unlocked(&engine, &*storage, &learner, module_id).await?;
            let record = module_progress(&storage, &config).record_view(&learner, module_id).await?;
            println!("Module {}: {}", module_id, format_status(record.status));
        }
        Commands::Quiz { module, answers } => {
            let learner = learner(&cli.learner)?;
            let module_id = parse_module(&module)?;
            let answers = parse_answers(&answers)?;
            ensure_unlocked(&engine, &*storage, &learner, module_id).await?;
            let outcome = module_progress(&storage, &config)
                .submit_quiz(&learner, module_id, &answers)
                .await?;
            println!(
                "Score: {}% ({}/{}) - {}",
                outcome.score,
                outcome.correct,
                outcome.total,
                if outcome.passed { "passed" } else { "not passed" }
            );
            println!("Status: {} (attempt {})", format_status(outcome.status), outcome.attempts);
        }
        Commands::Complete { module } => {
            let learner = learner(&cli.learner)?;
            let module_id = parse_module(&module)?;
            ensure_unlocked(&engine, &*storage, &learner, module_id).await?;
            let record = module_progress(&storage, &config).mark_complete(&learner, module_id).await?;
            println!("Module {}: {}", module_id, format_status(record.status));
        }
        Commands::Reset { module } => {
            let learner = learner(&cli.learner)?;
            let module_id = parse_module(&module)?;
            let record = module_progress(&storage, &config)
                .override_status(&learner, module_id, ProgressStatus::NotStarted)
                .await?;
            println!("Module {}: {}", module_id, format_status(record.status));
        }
        Commands::Capstone { path, answers } => {
            let learner = learner(&cli.learner)?;
            let path_id = parse_path(&path)?;
            let gate = CapstoneGate::new(storage.clone(), storage.clone(), storage.clone());
            match answers {
                None => {
                    let availability = gate.availability(&learner, path_id).await?;
                    println!("{}", format_availability(&availability));
                }
                Some(answers) => {
                    let answers = parse_answers(&answers)?;
                    match gate.submit(&learner, path_id, &answers).await? {
                        CapstoneSubmission::Scored(outcome) => {
                            println!(
                                "Score: {}% ({}/{}) - {}",
                                outcome.score,
                                outcome.correct,
                                outcome.total,
                                if outcome.passed { "passed" } else { "not passed" }
                            );
                            println!("Attempts remaining: {}", outcome.attempts_remaining);
                        }
                        CapstoneSubmission::Refused(availability) => {
                            bail!("Capstone not available: {}", format_availability(&availability));
                        }
                    }
                }
            }
        }
        Commands::Watch { path } => {
            let learner = learner(&cli.learner)?;
            let path_id = parse_path(&path)?;
            // Other processes write to the directory, so only polling sees them.
            let storage = Arc::new(JsonStorage::new(&cli.data).await?.without_change_feed());
            let engine = PathAccessEngine::new(storage.clone(), storage)
                .with_retry_policy(config.retry_attempts, config.retry_delay());
            let mut watcher = AccessWatcher::spawn(engine, learner, path_id, &config).await;

            print_snapshot(&watcher.current());
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    next = watcher.changed() => match next {
                        Some(snapshot) => print_snapshot(&snapshot),
                        None => break,
                    },
                }
            }
            info!("Stopped watching path {}", path_id);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<ProgressConfig> {
    if !path.exists() {
        return Ok(ProgressConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    ProgressConfig::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn learner(arg: &Option<String>) -> Result<LearnerId> {
    match arg.as_deref() {
        Some(id) if !id.trim().is_empty() => Ok(LearnerId::new(id.trim())),
        _ => Err(anyhow!("--learner is required for this command")),
    }
}

fn parse_path(id: &str) -> Result<PathId> {
    id.parse().map_err(|_| anyhow!("Invalid path ID: {id}"))
}

fn parse_module(id: &str) -> Result<ModuleId> {
    id.parse().map_err(|_| anyhow!("Invalid module ID: {id}"))
}

fn parse_answers(raw: &str) -> Result<Vec<Option<usize>>> {
    raw.split(',')
        .map(str::trim)
        .map(|answer| match answer {
            "_" | "" => Ok(None),
            n => n
                .parse()
                .map(Some)
                .map_err(|_| anyhow!("Invalid answer '{n}', expected an option index or '_'")),
        })
        .collect()
}

fn module_progress(storage: &Arc<JsonStorage>, config: &ProgressConfig) -> ModuleProgress {
    ModuleProgress::new(storage.clone(), storage.clone()).with_passing_score(config.passing_score())
}

async fn ensure_unlocked(
    engine: &PathAccessEngine,
    catalog: &dyn ModuleCatalog,
    learner: &LearnerId,
    module_id: ModuleId,
) -> Result<()> {
    if !engine.is_module_locked(learner, module_id).await {
        return Ok(());
    }

    let Some(module) = catalog.load_module(module_id).await? else {
        bail!("Module {} not found", module_id);
    };
    let reason = match module.path_id {
        Some(path_id) => engine
            .get_access_status(learner, path_id)
            .await
            .ok()
            .and_then(|statuses| statuses.into_iter().find(|s| s.module_id == module_id))
            .and_then(|s| s.reason),
        None => None,
    };
    bail!(
        "Module '{}' is locked: {}",
        module.title,
        reason.as_deref().unwrap_or("not available")
    )
}

fn print_snapshot(snapshot: &trainpath_progress::AccessSnapshot) {
    println!("--- {}", snapshot.computed_at.format("%H:%M:%S"));
    if let Some(error) = &snapshot.error {
        println!("  (unavailable: {})", error);
    }
    for status in &snapshot.statuses {
        println!("{}", format_access(status));
    }
}

fn format_access(status: &AccessStatus) -> String {
    let tag = if status.is_locked {
        "LOCKED"
    } else if status.status.is_completed() {
        "DONE"
    } else {
        "OPEN"
    };
    let mut line = format!(
        "  [{:<6}] {}. {} | {}",
        tag, status.order_index, status.module_title, status.module_id
    );
    if let Some(reason) = &status.reason {
        line.push_str(&format!(" ({})", reason));
    }
    line
}

fn format_status(status: ProgressStatus) -> &'static str {
    match status {
        ProgressStatus::NotStarted => "NOT STARTED",
        ProgressStatus::InProgress => "IN PROGRESS",
        ProgressStatus::Completed => "COMPLETED",
    }
}

fn format_availability(availability: &CapstoneAvailability) -> String {
    match availability {
        CapstoneAvailability::NoCapstone => "This path has no capstone quiz".to_string(),
        CapstoneAvailability::Locked { summary } => format!(
            "Locked until every module is complete ({}/{})",
            summary.completed_count, summary.total_count
        ),
        CapstoneAvailability::Open { attempts_remaining, best_score, .. } => format!(
            "Open, {} attempts remaining, best score {}",
            attempts_remaining,
            format_score(*best_score)
        ),
        CapstoneAvailability::Passed { best_score, .. } => {
            format!("Passed with {}", format_score(*best_score))
        }
        CapstoneAvailability::Exhausted { best_score, attempts_used } => format!(
            "No attempts left after {}, best score {}",
            attempts_used,
            format_score(*best_score)
        ),
    }
}

fn format_score(score: Option<u8>) -> String {
    score.map(|s| format!("{}%", s)).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answers() {
        assert_eq!(parse_answers("0,2,1").unwrap(), vec![Some(0), Some(2), Some(1)]);
        assert_eq!(parse_answers("1, _ ,3").unwrap(), vec![Some(1), None, Some(3)]);
        assert!(parse_answers("a,1").is_err());
    }

    #[test]
    fn test_learner_is_required() {
        assert!(learner(&None).is_err());
        assert!(learner(&Some("  ".into())).is_err());
        assert_eq!(learner(&Some("emp-1".into())).unwrap().as_str(), "emp-1");
    }
}
