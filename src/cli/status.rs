use std::time::Duration;

use chrono::{DateTime, Local};
use tabled::Table;

use crate::{
    cli::{load_context, play::describe},
    management::FileStore,
    types::StatusTableRow,
    warning,
};

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn status() {
    let ctx = load_context().await;
    let logged_in = ctx.tokens.tokens().is_authenticated();

    if logged_in {
        let mut changes = ctx.player.subscribe();
        match ctx.ready_device(STATUS_TIMEOUT).await {
            // the first push after ready carries the current playback
            Ok(_) => {
                let _ = tokio::time::timeout(STATUS_TIMEOUT, changes.changed()).await;
            }
            Err(e) => warning!("{}", e),
        }
    }

    let handle = ctx.device.handle();
    let playback = ctx.device.playback();
    ctx.device.shutdown().await;

    let saved_at = session_saved_at().await;

    let rows = vec![
        StatusTableRow {
            key: "Logged in".to_string(),
            value: if logged_in { "yes" } else { "no" }.to_string(),
        },
        StatusTableRow {
            key: "Session saved".to_string(),
            value: saved_at.unwrap_or_else(|| "-".to_string()),
        },
        StatusTableRow {
            key: "Device".to_string(),
            value: ctx.config.device_name.clone(),
        },
        StatusTableRow {
            key: "Device id".to_string(),
            value: handle.id.unwrap_or_else(|| "-".to_string()),
        },
        StatusTableRow {
            key: "Device state".to_string(),
            value: handle.state.to_string(),
        },
        StatusTableRow {
            key: "Playback".to_string(),
            value: describe(&playback),
        },
    ];

    println!("{}", Table::new(rows));
}

/// Local time the session file was last written, if there is one.
async fn session_saved_at() -> Option<String> {
    let store = FileStore::default_location();
    let modified = async_fs::metadata(store.path()).await.ok()?.modified().ok()?;
    Some(
        DateTime::<Local>::from(modified)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    )
}
