use reqwest::Url;
use tokio::sync::watch;

use crate::{
    error::{Error, Result},
    spotify::{device::DeviceController, request::ApiClient},
    types::{ApiRequest, PlaybackState, PlayerStateSnapshot, StartPlaybackRequest, TrackRef},
};

/// Inputs of the playback state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A `player_state_changed` push; `None` means no active context.
    Pushed(Option<PlayerStateSnapshot>),
    /// A play command for this track was accepted by the provider.
    CommandSucceeded(TrackRef),
}

impl PlaybackState {
    /// Computes the state after `event`.
    ///
    /// Pushes are authoritative and overwrite everything, including an earlier
    /// optimistic update.
    pub fn apply(&self, event: &PlaybackEvent) -> PlaybackState {
        match event {
            PlaybackEvent::Pushed(None) => PlaybackState::default(),
            PlaybackEvent::Pushed(Some(snapshot)) => PlaybackState {
                is_playing: !snapshot.paused,
                current_track: snapshot
                    .track_window
                    .current_track
                    .as_ref()
                    .map(TrackRef::from),
            },
            PlaybackEvent::CommandSucceeded(track) => PlaybackState {
                is_playing: true,
                current_track: Some(track.clone()),
            },
        }
    }
}

/// Play and pause commands against the bound device.
///
/// The state the UI observes lives in the [`DeviceController`], which feeds
/// pushes into it; this type adds the optimistic update after a successful
/// play command.
///
/// # Example
///
/// ```
/// let player = Player::new(device.clone(), api.clone());
/// device.await_ready(Duration::from_secs(30)).await?;
/// player.play_track("spotify:track:4uLU6hMCjMI75M1A2tKUQC").await?;
/// assert!(player.is_playing());
/// ```
#[derive(Clone)]
pub struct Player {
    device: DeviceController,
    api: ApiClient,
}

impl Player {
    pub fn new(device: DeviceController, api: ApiClient) -> Self {
        Self { device, api }
    }

    pub fn device(&self) -> &DeviceController {
        &self.device
    }

    pub fn is_playing(&self) -> bool {
        self.device.playback().is_playing
    }

    pub fn current_track(&self) -> Option<TrackRef> {
        self.device.playback().current_track
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.device.subscribe_playback()
    }

    /// Starts `track_uri` on the bound device.
    ///
    /// Fails with [`Error::PlayerNotReady`] before any request when the device
    /// is not ready. The first play on a freshly readied device transfers
    /// playback first; a failed transfer is only logged. On success the state
    /// is updated optimistically, on failure it is left untouched.
    pub async fn play_track(&self, track_uri: &str) -> Result<()> {
        let device_id = self.device.ready_device_id()?;

        if !self.device.handle().transferred {
            if let Err(e) = self.device.transfer_playback_here().await {
                tracing::warn!(error = %e, "continuing without transfer");
            }
        }

        let url = Url::parse_with_params(
            &self.api.url("/me/player/play"),
            &[("device_id", device_id.as_str())],
        )
        .map_err(|e| Error::Config(format!("invalid api url: {e}")))?;
        let body = serde_json::to_value(StartPlaybackRequest {
            uris: vec![track_uri.to_string()],
        })
        .map_err(|e| Error::Config(e.to_string()))?;

        if let Err(e) = self.api.send(&ApiRequest::put(url, Some(body))).await {
            tracing::warn!(%track_uri, %device_id, error = %e, "play command failed");
            return Err(e);
        }

        tracing::info!(%track_uri, %device_id, "playback started");
        self.device
            .apply_playback(&PlaybackEvent::CommandSucceeded(TrackRef::from_uri(track_uri)));
        Ok(())
    }

    /// Pauses or resumes through the binding.
    ///
    /// The local state is not flipped here; the binding's next push confirms
    /// the change.
    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.device.toggle_play().await
    }
}
