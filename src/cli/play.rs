use std::time::Duration;

use crate::{
    cli::{fail, load_context},
    info, success,
    types::PlaybackState,
};

pub async fn play(uri: String) {
    let ctx = load_context().await;

    if let Err(e) = ctx.ready_device(ctx.config.ready_timeout).await {
        fail(e);
    }

    let result = ctx.player.play_track(&uri).await;
    ctx.device.shutdown().await;

    match result {
        Ok(()) => success!("Playing {}", uri),
        Err(e) => fail(e),
    }
}

pub async fn toggle() {
    let ctx = load_context().await;

    if let Err(e) = ctx.ready_device(ctx.config.ready_timeout).await {
        fail(e);
    }

    let mut changes = ctx.player.subscribe();
    if let Err(e) = ctx.player.toggle_play_pause().await {
        ctx.device.shutdown().await;
        fail(e);
    }

    // the binding confirms the toggle with its next push
    let confirmed = tokio::time::timeout(Duration::from_secs(5), changes.changed()).await;
    let state = ctx.device.playback();
    ctx.device.shutdown().await;

    match confirmed {
        Ok(Ok(())) => success!("{}", describe(&state)),
        _ => info!("Toggle sent, waiting for Spotify to confirm timed out."),
    }
}

pub(crate) fn describe(state: &PlaybackState) -> String {
    let track = state
        .current_track
        .as_ref()
        .map(|track| track.name.clone().unwrap_or_else(|| track.uri.clone()))
        .unwrap_or_else(|| "nothing".to_string());

    if state.is_playing {
        format!("Playing {track}")
    } else {
        format!("Paused ({track})")
    }
}
