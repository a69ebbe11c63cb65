use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use l10n_tracker::config::{self, Config, ContentLayout, InvalidContentDir, InvalidLanguage};
use l10n_tracker::daemon::{self, RefreshLock};
use l10n_tracker::store::CachePaths;
use l10n_tracker::{Cancel, CommitId, StalenessDetector};

#[derive(Parser)]
#[command(
    name = "l10n-tracker",
    about = "Track translation staleness against git history"
)]
struct Cli {
    #[command(flatten)]
    repo: RepoArgs,

    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RepoArgs {
    /// Working copy of the documentation repository
    #[arg(long, env = "L10N_REPO", default_value = ".")]
    repo: PathBuf,

    /// Remote the main branch is fetched from
    #[arg(long, env = "L10N_REMOTE", default_value = config::DEFAULT_REMOTE)]
    remote: String,

    /// Main branch (defaults to the checked-out branch)
    #[arg(long, env = "L10N_BRANCH")]
    branch: Option<String>,

    /// Directory holding one subdirectory per language
    #[arg(long, env = "L10N_CONTENT_DIR", default_value = config::DEFAULT_CONTENT_DIR, value_parser = parse_content_dir)]
    content_dir: PathBuf,

    /// Language translations are made from
    #[arg(long, env = "L10N_ORIGIN", default_value = config::DEFAULT_ORIGIN, value_parser = parse_language)]
    origin: String,

    /// Cache directory (defaults to the system cache dir)
    #[arg(long, env = "L10N_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

impl RepoArgs {
    fn into_config(self) -> Config {
        Config {
            repo: self.repo,
            remote: self.remote,
            branch: self.branch,
            layout: ContentLayout::new(self.content_dir, self.origin),
            cache: self.cache_dir.map(CachePaths::new).unwrap_or_default(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch upstream, invalidate affected cache entries and fast-forward
    Refresh,

    /// Print the staleness of a language's files as JSON
    Check {
        #[arg(value_parser = parse_language)]
        language: String,
        /// Paths relative to the language directory (default: all files)
        paths: Vec<String>,
    },

    /// Show the main-branch commit a commit forked from
    Fork { commit: CommitId },

    /// Show the main-branch commit that merged a commit
    Merge { commit: CommitId },

    /// Refresh and write reports periodically until interrupted
    Watch {
        /// Seconds between runs
        #[arg(long, default_value_t = 600)]
        interval: u64,
        #[arg(required = true, value_parser = parse_language)]
        languages: Vec<String>,
    },

    /// Check dependencies and configuration
    Doctor,
}

fn parse_language(value: &str) -> Result<String, InvalidLanguage> {
    config::validate_language(value)?;
    Ok(value.to_string())
}

fn parse_content_dir(value: &str) -> Result<PathBuf, InvalidContentDir> {
    config::validate_content_dir(std::path::Path::new(value))
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let cancel = Cancel::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            log::warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    let config = cli.repo.into_config();
    let result = match cli.command {
        Commands::Refresh => cmd_refresh(&config, &cancel),
        Commands::Check { language, paths } => cmd_check(&config, &language, &paths, &cancel),
        Commands::Fork { commit } => cmd_fork(&config, &commit, &cancel),
        Commands::Merge { commit } => cmd_merge(&config, &commit, &cancel),
        Commands::Watch {
            interval,
            languages,
        } => cmd_watch(&config, languages, interval, &cancel),
        Commands::Doctor => cmd_doctor(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn lock(config: &Config) -> Result<RefreshLock, Box<dyn std::error::Error>> {
    let path = config.cache.lock_path("refresh");
    if let Some(lock) = RefreshLock::try_acquire(&path)? {
        return Ok(lock);
    }
    eprintln!("Waiting for another refresh to finish...");
    Ok(RefreshLock::acquire(&path)?)
}

fn cmd_refresh(config: &Config, cancel: &Cancel) -> Result<(), Box<dyn std::error::Error>> {
    let _lock = lock(config)?;
    let graph = config.open_graph()?;
    let outcome = graph.pull_refresh(cancel)?;

    if outcome.fresh_commits.is_empty() {
        println!("Already up to date");
        return Ok(());
    }
    println!("Pulled {} commits", outcome.fresh_commits.len());
    for commit in &outcome.fresh_commits {
        println!("  {}", commit);
    }
    println!("Invalidated {} files", outcome.changed_files.len());
    Ok(())
}

fn cmd_check(
    config: &Config,
    language: &str,
    paths: &[String],
    cancel: &Cancel,
) -> Result<(), Box<dyn std::error::Error>> {
    let _lock = lock(config)?;
    let graph = config.open_graph()?;
    let detector = StalenessDetector::new(&graph, &config.layout);

    let states = if paths.is_empty() {
        detector.check_language(cancel, language)?
    } else {
        detector.check_files(cancel, paths, language)?
    };
    println!("{}", serde_json::to_string_pretty(&states)?);
    Ok(())
}

fn cmd_fork(config: &Config, commit: &CommitId, cancel: &Cancel) -> Result<(), Box<dyn std::error::Error>> {
    let _lock = lock(config)?;
    let graph = config.open_graph()?;
    match graph.find_fork_commit(cancel, commit)? {
        Some(fork) => println!("{}", fork),
        None => println!("{} is on the main branch", commit),
    }
    Ok(())
}

fn cmd_merge(config: &Config, commit: &CommitId, cancel: &Cancel) -> Result<(), Box<dyn std::error::Error>> {
    let _lock = lock(config)?;
    let graph = config.open_graph()?;
    if graph.is_main_branch_commit(cancel, commit)? {
        println!("{} is on the main branch", commit);
        return Ok(());
    }
    match graph.find_merge_commit(cancel, commit)? {
        Some(merge) => println!("{}", merge),
        None => println!("{} is not merged yet", commit),
    }
    Ok(())
}

fn cmd_watch(
    config: &Config,
    languages: Vec<String>,
    interval: u64,
    cancel: &Cancel,
) -> Result<(), Box<dyn std::error::Error>> {
    if interval == 0 {
        return Err("interval must be at least one second".into());
    }
    daemon::watch(config, languages, Duration::from_secs(interval), cancel)?;
    Ok(())
}

fn cmd_doctor(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("l10n-tracker System Check\n");

    let git_ok = std::process::Command::new("git")
        .args(["--version"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    println!(
        "[{}] git: {}",
        if git_ok { "OK" } else { "FAIL" },
        if git_ok { "available" } else { "not found" }
    );

    match config.open_graph() {
        Ok(graph) => println!(
            "[OK] Repository: {} (main branch {})",
            graph.backend().workdir().display(),
            graph.backend().branch()
        ),
        Err(e) => println!("[FAIL] Repository: {}", e),
    }

    let cache_ok = config.cache.root().exists();
    println!(
        "[{}] Cache dir: {}",
        if cache_ok { "OK" } else { "INFO" },
        config.cache.root().display()
    );

    let lock_path = config.cache.lock_path("refresh");
    match RefreshLock::try_acquire(&lock_path) {
        Ok(Some(_)) => println!("[OK] Refresh lock: free"),
        Ok(None) => println!("[INFO] Refresh lock: held by a running refresh"),
        Err(e) => println!("[FAIL] Refresh lock: {}", e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    type Command = fn(&Config, &CommitId, &Cancel) -> Result<(), Box<dyn std::error::Error>>;

    fn assert_waits_for_refresh_lock(command: Command) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(dir.path().join("missing-repo"));
        config.cache = CachePaths::new(dir.path().join("cache"));
        let held = RefreshLock::try_acquire(&config.cache.lock_path("refresh"))
            .unwrap()
            .unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let config = config.clone();
            std::thread::spawn(move || {
                let commit: CommitId = "abc123".parse().unwrap();
                let result = command(&config, &commit, &Cancel::new()).map_err(|e| e.to_string());
                tx.send(result).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        drop(held);
        let result = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(result.is_err(), "opened a repository that does not exist");
        waiter.join().unwrap();
    }

    #[test]
    fn fork_waits_for_refresh_lock() {
        assert_waits_for_refresh_lock(cmd_fork);
    }

    #[test]
    fn merge_waits_for_refresh_lock() {
        assert_waits_for_refresh_lock(cmd_merge);
    }

    #[test]
    fn content_dir_flag_is_normalized() {
        let cli = Cli::parse_from(["l10n-tracker", "--content-dir", "./docs", "doctor"]);
        assert_eq!(cli.repo.content_dir, PathBuf::from("docs"));
        assert!(Cli::try_parse_from(["l10n-tracker", "--content-dir", "../docs", "doctor"]).is_err());
    }
}
