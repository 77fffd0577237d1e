mod logging;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use treesync::kernel::services::adapters::{load_config, LocalFsProvider};
use treesync::kernel::services::ports::SyncConfig;
use treesync::kernel::Synchronizer;

fn main() -> io::Result<()> {
    let root = match std::env::args_os().nth(1) {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    let (config, settings_error) = match load_config(&root) {
        Ok(config) => (config, None),
        Err(err) => (SyncConfig::default(), Some(err)),
    };
    let logging = logging::init(&config);
    if let Some(err) = settings_error {
        tracing::warn!(error = %err, "settings ignored, using defaults");
    }
    if let Some(guard) = logging.as_ref() {
        eprintln!("logging to {}", guard.log_dir().display());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    runtime.block_on(run(root, config))
}

async fn run(root: PathBuf, config: SyncConfig) -> io::Result<()> {
    let provider = LocalFsProvider::new(&root);
    tracing::info!(root = %provider.root().display(), "watching workspace");
    let sync = Synchronizer::start(Arc::new(provider), config)
        .await
        .map_err(io::Error::other)?;

    let mut changes = sync.subscribe();
    print_tree(&sync);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            change = changes.recv() => match change {
                Ok(change) => {
                    tracing::debug!(version = change.version, cause = ?change.cause, "tree changed");
                    print_tree(&sync);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change notifications lagged");
                    print_tree(&sync);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    sync.shutdown();
    Ok(())
}

fn print_tree(sync: &Synchronizer) {
    println!("-- version {} --", sync.version());
    for row in sync.visible_rows() {
        let indent = "  ".repeat(usize::from(row.depth));
        let marker = if row.is_dir { "/" } else { "" };
        println!("{indent}{}{marker}", row.name);
    }
}
