use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use so_bridge::controller::ChatOpenOutcome;
use so_bridge::feed::{FeedEntry, FeedView};
use so_bridge::notifications::ToastLevel;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::Ui;

/// How long to wait for in-flight sends before leaving.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn format_entry(entry: &FeedEntry) -> String {
    let who = if entry.from_self {
        "you"
    } else {
        entry.message.author_name.as_str()
    };
    format!(
        "[{}] {}: {}",
        entry.message.sent_at.format("%H:%M"),
        who,
        entry.message.body
    )
}

/// Lines for entries of `view` that have not been printed yet.
///
/// Snapshots replace the whole view, so already-printed ids are remembered;
/// pending entries wait for their confirmed copy.
fn new_lines(view: &FeedView, printed: &mut HashSet<String>) -> Vec<String> {
    view.entries
        .iter()
        .filter(|e| !e.pending)
        .filter(|e| printed.insert(e.message.id.clone()))
        .map(format_entry)
        .collect()
}

pub async fn run(ui: &Ui, peer: Option<&str>) -> anyhow::Result<()> {
    let ctx = ui.context().clone();

    let printed = Rc::new(RefCell::new(HashSet::new()));
    ctx.feed.on_render(move |view| {
        for line in new_lines(view, &mut printed.borrow_mut()) {
            println!("{line}");
        }
    });

    let shown_toasts = RefCell::new(HashSet::new());
    ctx.toasts.on_change(move |toasts| {
        for toast in toasts {
            // info toasts announce messages that are printed anyway
            if matches!(toast.level, ToastLevel::Warning | ToastLevel::Error)
                && shown_toasts.borrow_mut().insert(toast.id)
            {
                eprintln!("! {}", toast.message);
            }
        }
    });

    let outcome = match peer {
        Some(peer) => ui.start_direct_chat(peer, None),
        None => ui.open_chat(None),
    };
    let conversation = match outcome {
        ChatOpenOutcome::Opened(id) => id,
        ChatOpenOutcome::SignInRequired => {
            anyhow::bail!("Please sign in first (`so login <email>`)")
        }
    };
    eprintln!("-- joined {conversation}; type a message, /quit to leave --");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Could not read from stdin")? {
        match line.trim() {
            "/quit" | "/exit" => break,
            "" => continue,
            _ => {
                ui.submit_chat(&line);
            }
        }
    }

    drain_pending(ui).await;
    ui.close_chat();
    Ok(())
}

/// Let spawned sends finish so they are not dropped with the runtime.
async fn drain_pending(ui: &Ui) {
    let feed = ui.context().feed.clone();
    let wait = async {
        loop {
            tokio::task::yield_now().await;
            if !feed.view().entries.iter().any(|e| e.pending) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, wait).await.is_err() {
        tracing::warn!("leaving with unconfirmed messages");
    }
}
