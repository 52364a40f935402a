//! CLI entry point (spec §6.5): parses flags, loads configuration, mounts
//! the prefix's standard hives, and runs the engine task, save scheduler
//! and transport concurrently on one `LocalSet`.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use regtree::config::Config;
use regtree::dispatcher::{EngineTask, Message};
use regtree::engine::{Engine, LookupAttr};
use regtree::key::{KeyFlags, KeyRef};

/// Syntactic stand-in for a real per-user SID; assigning one is an
/// external identity collaborator's concern (spec §1).
const DEFAULT_USER_SID: &str = "Current";

#[derive(Parser, Debug)]
#[command(name = "regtreed", about = "A hierarchical configuration-tree server")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the config file's listen socket path.
    #[arg(long)]
    listen: Option<PathBuf>,
    /// Overrides the config file's data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Increases log verbosity; may be repeated (-v, -vv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Suppresses all logging below warnings.
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => Config::load(path).unwrap_or_else(|err| {
            tracing::error!(%err, "falling back to default configuration");
            Config::default()
        }),
        None => Config::default(),
    };
    if let Some(listen) = cli.listen {
        config.socket_path = listen;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let local = tokio::task::LocalSet::new();
    local.run_until(run(config)).await
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: Config) -> std::io::Result<()> {
    let engine = Engine::new(config.arch.into());
    mount_standard_hives(&engine, &config);
    wire_wow64_mirrors(&engine);

    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let task = EngineTask::new(engine);

    tokio::task::spawn_local(task.run(rx));
    tokio::task::spawn_local(regtree::scheduler::run(tx.clone(), config.save_interval()));

    regtree::server::serve(&config.socket_path, tx).await
}

/// Mounts the prefix's three standard hives (spec §1, §4.7): the machine
/// branch, the default-user template, and the current user's branch.
/// Each file is seeded if present and created fresh otherwise.
fn mount_standard_hives(engine: &Engine, config: &Config) {
    let root = engine.root.clone();
    mount(engine, &root, "Machine", config.data_dir.join("system.reg"));
    mount(engine, &root, "User\\.Default", config.data_dir.join("userdef.reg"));
    mount(engine, &root, &format!("User\\{DEFAULT_USER_SID}"), config.data_dir.join("user.reg"));

    for branch in &config.branches {
        mount(engine, &root, &branch.path, branch.file.clone());
    }
}

fn mount(engine: &Engine, root: &KeyRef, path: &str, file: PathBuf) {
    if let Err(err) = engine.mount_branch(root, path, file) {
        tracing::error!(%path, %err, "failed to mount hive");
    }
}

/// Wires the well-known 32-bit mirror points under a 64-bit prefix
/// (spec §4.1 step 3, §4.3): `SOFTWARE` gets a `Wow6432Node` child, and
/// `SOFTWARE\Classes` shares its children across both views. A 32-bit
/// prefix has nothing to mirror.
fn wire_wow64_mirrors(engine: &Engine) {
    if engine.arch != regtree::engine::Arch::Win64 {
        return;
    }
    let attr = LookupAttr::default();
    let Ok(Some(software)) = engine.lookup(&engine.root, "Machine\\SOFTWARE", attr) else {
        return;
    };
    if engine.create_key(&software, "Wow6432Node", None, false, false, attr).is_err() {
        return;
    }
    software.borrow_mut().flags.insert(KeyFlags::WOW64);

    if let Ok(Some(classes)) = engine.lookup(&software, "Classes", attr) {
        classes.borrow_mut().flags.insert(KeyFlags::WOWSHARE);
    }
}
