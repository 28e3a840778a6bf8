pub mod auth;
pub mod chat;
pub mod config;
pub mod profile;

use std::rc::Rc;

use anyhow::Context;
use so_bridge::controller::UiController;
use so_bridge::{AppContext, Spawner};
use so_core::config::Config;
use so_core::storage::{FileStorage, KeyValueStore};
use tokio::io::{AsyncBufReadExt, BufReader};

/// The terminal has no focus targets.
pub type Ui = UiController<()>;

/// Spawner backed by the current `LocalSet`.
pub fn local_spawner() -> Spawner {
    Spawner::new(
        |task| {
            tokio::task::spawn_local(task);
        },
        |duration| Box::pin(tokio::time::sleep(duration)),
    )
}

/// Wire the app against the configured backend and the JSON storage file.
///
/// Must be called from inside a `LocalSet`.
pub fn open(config: Config) -> anyhow::Result<Ui> {
    let path = config.storage.resolved_path();
    tracing::debug!(path = %path.display(), "opening storage");
    let kv: Rc<dyn KeyValueStore> = Rc::new(FileStorage::new(path));
    let ctx = AppContext::from_config(config, kv, local_spawner())
        .context("Could not start the backend")?;
    Ok(UiController::new(ctx))
}

/// Prompt on stderr and read one line from stdin.
pub async fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Could not read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
