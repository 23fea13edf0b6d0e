use std::env;
use std::path::Path;
use std::process::{Command, ExitCode};
use std::time::{Duration, Instant};

use clap::Parser;
use env_logger::Env;
use log::error;

mod checksum;
mod config;
mod launch;
mod manifest;
mod networking;
mod patcher;
mod report;
mod selfupdate;
mod util;

use config::Config;
use networking::NetworkClient;
use patcher::RemoteSource;
use report::SessionLog;
use selfupdate::SelfUpdateOutcome;

const DEFAULT_PATCHER_URL: &str = "https://patch.projecteq.net/rof";

#[derive(Parser, Debug)]
#[command(
    name = "EQ Launcher",
    author,
    version,
    about = "Unattended EverQuest patcher: self-updates, reconciles game files against the remote file list, then starts the game"
)]
struct Cli {
    /// Base URL for patch files and the launcher self-update endpoints.
    #[arg(long, default_value = DEFAULT_PATCHER_URL)]
    patcher_url: String,

    /// Base URL for the file list (defaults to the patcher URL).
    #[arg(long)]
    filelist_url: Option<String>,

    /// Game client identifier used in file list and download paths.
    #[arg(long, default_value = "rof")]
    client: String,

    /// Skip the launcher self-update check.
    #[arg(long)]
    skip_self_update: bool,

    /// Print launcher version and exit without patching.
    #[arg(long)]
    version_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.version_only {
        println!("EQ Launcher {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    ExitCode::from(run(&cli).await)
}

async fn run(cli: &Cli) -> u8 {
    let start = Instant::now();
    let mut errored = false;

    let root = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            error!("wd invalid: {err}");
            pause_for_review();
            return 1;
        }
    };

    let mut cfg = match Config::load_or_create(&root) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("Failed to load config: {err}");
            pause_for_review();
            return 1;
        }
    };

    let mut log = SessionLog::new();
    log.record(format!("Starting eqlauncher {}", env!("CARGO_PKG_VERSION")));

    let net = NetworkClient::new();

    if !cli.skip_self_update {
        match selfupdate::self_update(&net, &cli.patcher_url, &mut cfg, &mut log).await {
            Ok(SelfUpdateOutcome::Applied) => {
                log.record("Restarting with the updated launcher");
                return relaunch_and_exit(&root, &mut log);
            }
            Ok(SelfUpdateOutcome::UpToDate) => log.record("Self update not needed"),
            Ok(SelfUpdateOutcome::Skipped(reason)) => {
                log.record(format!("Skipping self update: {reason}"));
            }
            Err(err) => log.warn(format!("Failed self update, skipping: {err}")),
        }
    }

    let filelist_url = cli.filelist_url.as_deref().unwrap_or(&cli.patcher_url);
    match manifest::fetch_filelist(&net, filelist_url, &cli.client, &mut log).await {
        Ok(list) => {
            let source = RemoteSource::new(net.clone(), &cli.patcher_url, &cli.client);
            if let Err(err) = patcher::reconcile(&source, &root, &list, &mut cfg, &mut log).await {
                log.warn(format!("Failed patch: {err}"));
                errored = true;
            }
        }
        Err(err) => log.warn(format!("Failed fetch file list, skipping: {err}")),
    }

    let username = match launch::fetch_username(&root) {
        Ok(name) if !name.is_empty() => name,
        Ok(_) => "x".into(),
        Err(err) => {
            log.warn(format!(
                "Failed grabbing username from eqlsPlayerData.ini: {err}"
            ));
            "x".into()
        }
    };

    if let Err(err) = launch::launch_game(&root, &username) {
        log.warn(format!("Failed to run eqgame.exe: {err}"));
        errored = true;
    }

    log.record(format!(
        "Finished in {:.2} seconds",
        start.elapsed().as_secs_f32()
    ));

    if let Err(err) = log.flush(&root) {
        error!("Failed to write log: {err}");
        errored = true;
    }

    if errored {
        error!("There was an error while launching EQ. Review above or eqlauncher.txt to see why.");
        pause_for_review();
    }

    0
}

// A swapped-in binary must never fall through to patching in this process;
// whatever happens here, the caller exits.
fn relaunch_and_exit(root: &Path, log: &mut SessionLog) -> u8 {
    let spawned =
        env::current_exe().and_then(|exe| Command::new(exe).current_dir(root).spawn());
    let code = match spawned {
        Ok(_) => 0,
        Err(err) => {
            log.warn(format!("Failed to relaunch updated launcher: {err}"));
            1
        }
    };
    if let Err(err) = log.flush(root) {
        error!("Failed to write log: {err}");
    }
    if code != 0 {
        pause_for_review();
    }
    code
}

/// Give interactive users a chance to read console output before the
/// window closes.
fn pause_for_review() {
    if cfg!(target_os = "windows") {
        std::thread::sleep(Duration::from_secs(10));
    }
}
