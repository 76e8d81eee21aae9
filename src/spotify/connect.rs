use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    management::TokenProvider,
    spotify::{
        device::{PlayerBinding, PlayerFactory},
        request::ApiClient,
    },
    types::{
        ApiRequest, CurrentPlaybackResponse, DevicesResponse, PlayerEvent, PlayerStateSnapshot,
        TrackWindow,
    },
};

/// Builds [`ConnectBinding`]s for the configured device name.
///
/// Bindings send their requests through the given [`ApiClient`], so an
/// expired access token is refreshed like on any other call.
pub struct ConnectFactory {
    api: ApiClient,
}

impl ConnectFactory {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

impl PlayerFactory for ConnectFactory {
    fn create(
        &self,
        _token_provider: TokenProvider,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Arc<dyn PlayerBinding> {
        let config = self.api.tokens().config();
        Arc::new(ConnectBinding {
            inner: Arc::new(Watcher {
                api: self.api.clone(),
                device_name: config.device_name.clone(),
                poll_interval: config.poll_interval,
                events,
                device_id: Mutex::new(None),
            }),
            running: Mutex::new(None),
        })
    }
}

/// A player binding for a named Spotify Connect device.
///
/// Spotify has no push channel for Connect devices outside the browser SDK,
/// so the binding watches the Web API and turns what it sees into the same
/// `ready`/`not_ready`/`state_changed` events: the device showing up or
/// disappearing from `/me/player/devices`, and changes of `/me/player`.
pub struct ConnectBinding {
    inner: Arc<Watcher>,
    running: Mutex<Option<CancellationToken>>,
}

struct Watcher {
    api: ApiClient,
    device_name: String,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<PlayerEvent>,
    device_id: Mutex<Option<String>>,
}

#[async_trait]
impl PlayerBinding for ConnectBinding {
    async fn connect(&self) -> Result<bool> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Ok(true);
        }

        let cancel = CancellationToken::new();
        *running = Some(cancel.clone());
        tokio::spawn(Arc::clone(&self.inner).watch(cancel));
        tracing::debug!(device_name = %self.inner.device_name, "watching connect device");
        Ok(true)
    }

    async fn toggle_play(&self) -> Result<()> {
        let device_id = self.inner.known_device_id().ok_or(Error::PlayerNotReady)?;
        let playing = self
            .inner
            .current_playback()
            .await?
            .is_some_and(|playback| playback.is_playing);

        let path = if playing { "/me/player/pause" } else { "/me/player/play" };
        let url = Url::parse_with_params(
            &self.inner.api.url(path),
            &[("device_id", device_id.as_str())],
        )
        .map_err(|e| Error::Config(format!("invalid api url: {e}")))?;

        self.inner.api.send(&ApiRequest::put(url, None)).await?;
        Ok(())
    }

    async fn disconnect(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = running {
            cancel.cancel();
        }
    }
}

impl Watcher {
    async fn watch(self: Arc<Self>, cancel: CancellationToken) {
        let mut last_state: Option<Option<PlayerStateSnapshot>> = None;

        loop {
            match self.poll_device().await {
                Ok(Some(device_id)) => match self.poll_state(&device_id).await {
                    Ok(state) if last_state.as_ref() != Some(&state) => {
                        last_state = Some(state.clone());
                        let _ = self.events.send(PlayerEvent::StateChanged(state));
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "failed to read playback state"),
                },
                Ok(None) => last_state = None,
                Err(e) => tracing::warn!(error = %e, "failed to list devices"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::debug!("connect watcher stopped");
    }

    /// Emits `ready`/`not_ready` when the device appears or vanishes and
    /// returns its id while it is present.
    async fn poll_device(&self) -> Result<Option<String>> {
        let devices: Option<DevicesResponse> = self.get("/me/player/devices").await?;
        let found = devices
            .into_iter()
            .flat_map(|response| response.devices)
            .find(|device| device.name == self.device_name)
            .and_then(|device| device.id);

        let previous = {
            let mut known = self.device_id.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *known, found.clone())
        };

        match (previous, &found) {
            (Some(previous), Some(current)) if previous == *current => {}
            (Some(previous), None) => {
                let _ = self.events.send(PlayerEvent::NotReady {
                    device_id: previous,
                });
            }
            (_, Some(current)) => {
                let _ = self.events.send(PlayerEvent::Ready {
                    device_id: current.clone(),
                });
            }
            (None, None) => {}
        }

        Ok(found)
    }

    /// Playback as this device sees it; `None` when it is not the active one.
    async fn poll_state(&self, device_id: &str) -> Result<Option<PlayerStateSnapshot>> {
        let Some(playback) = self.current_playback().await? else {
            return Ok(None);
        };

        let active_here = playback
            .device
            .as_ref()
            .and_then(|device| device.id.as_deref())
            == Some(device_id);
        if !active_here {
            return Ok(None);
        }

        Ok(Some(PlayerStateSnapshot {
            paused: !playback.is_playing,
            track_window: TrackWindow {
                current_track: playback.item,
            },
        }))
    }

    async fn current_playback(&self) -> Result<Option<CurrentPlaybackResponse>> {
        self.get("/me/player").await
    }

    fn known_device_id(&self) -> Option<String> {
        self.device_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `None` when Spotify answers without a body (204).
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.api.send_json(&ApiRequest::get(self.api.url(path))).await
    }
}
