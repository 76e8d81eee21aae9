use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    management::{SessionStore, StoreKey, TokenProvider},
    spotify::{playback::PlaybackEvent, request::ApiClient},
    types::{
        ApiRequest, DeviceHandle, DeviceState, PlaybackState, PlayerEvent, TransferPlaybackRequest,
    },
};

/// The external player a [`DeviceController`] binds to.
///
/// A binding reports what happens to its device by pushing [`PlayerEvent`]s
/// into the sender it was created with.
#[async_trait]
pub trait PlayerBinding: Send + Sync {
    /// Asks the binding to connect. `Ok(false)` means the binding refused.
    async fn connect(&self) -> Result<bool>;

    /// Pauses when playing, resumes when paused.
    async fn toggle_play(&self) -> Result<()>;

    async fn disconnect(&self);
}

/// Constructs player bindings.
pub trait PlayerFactory: Send + Sync {
    fn create(
        &self,
        token_provider: TokenProvider,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Arc<dyn PlayerBinding>;
}

/// Applies a push event to the device handle.
///
/// `ready` always wins and resets the transfer flag. A `not_ready` for some
/// other device than the one currently ready is stale and ignored.
pub fn apply_device_event(handle: &DeviceHandle, event: &PlayerEvent) -> DeviceHandle {
    match event {
        PlayerEvent::Ready { device_id } => DeviceHandle {
            id: Some(device_id.clone()),
            state: DeviceState::Ready,
            transferred: false,
        },
        PlayerEvent::NotReady { device_id } => {
            let foreign = handle.id.as_deref().is_some_and(|id| id != device_id.as_str());
            if foreign && handle.state == DeviceState::Ready {
                return handle.clone();
            }
            DeviceHandle {
                state: DeviceState::NotReady,
                ..handle.clone()
            }
        }
        PlayerEvent::StateChanged(_) => handle.clone(),
    }
}

/// Moves an idle handle to `Connecting`; any other state is left alone.
fn begin_connecting(handle: &mut DeviceHandle) -> bool {
    if !matches!(
        handle.state,
        DeviceState::Uninitialized | DeviceState::NotReady
    ) {
        return false;
    }
    handle.state = DeviceState::Connecting;
    true
}

/// Owns the one player binding of the process and its readiness.
///
/// Clones share the same binding. All access to the binding goes through the
/// controller; a second binding is never constructed while one exists.
/// After [`DeviceController::shutdown`] the controller stays inert.
#[derive(Clone)]
pub struct DeviceController {
    inner: Arc<Inner>,
}

struct Inner {
    api: ApiClient,
    factory: Arc<dyn PlayerFactory>,
    binding: tokio::sync::Mutex<Option<Arc<dyn PlayerBinding>>>,
    handle: Arc<watch::Sender<DeviceHandle>>,
    playback: Arc<watch::Sender<PlaybackState>>,
    events: mpsc::UnboundedSender<PlayerEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<PlayerEvent>>>,
    cancel: CancellationToken,
}

impl DeviceController {
    pub fn new(api: ApiClient, factory: Arc<dyn PlayerFactory>) -> Self {
        Self::with_device_id(api, factory, None)
    }

    /// Creates a controller that remembers the device id of the last run.
    ///
    /// The state still starts at `Uninitialized`; only a fresh `ready` event
    /// makes the device usable.
    pub async fn load(api: ApiClient, factory: Arc<dyn PlayerFactory>) -> Result<Self> {
        let device_id = api.tokens().store().get(StoreKey::DeviceId).await?;
        Ok(Self::with_device_id(api, factory, device_id))
    }

    fn with_device_id(
        api: ApiClient,
        factory: Arc<dyn PlayerFactory>,
        device_id: Option<String>,
    ) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let (handle, _) = watch::channel(DeviceHandle {
            id: device_id,
            ..DeviceHandle::default()
        });
        let (playback, _) = watch::channel(PlaybackState::default());

        Self {
            inner: Arc::new(Inner {
                api,
                factory,
                binding: tokio::sync::Mutex::new(None),
                handle: Arc::new(handle),
                playback: Arc::new(playback),
                events,
                receiver: Mutex::new(Some(receiver)),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn handle(&self) -> DeviceHandle {
        self.inner.handle.borrow().clone()
    }

    pub fn state(&self) -> DeviceState {
        self.inner.handle.borrow().state
    }

    pub fn device_id(&self) -> Option<String> {
        self.inner.handle.borrow().id.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == DeviceState::Ready
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceHandle> {
        self.inner.handle.subscribe()
    }

    pub fn playback(&self) -> PlaybackState {
        self.inner.playback.borrow().clone()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackState> {
        self.inner.playback.subscribe()
    }

    /// Binds the player and asks it to connect.
    ///
    /// Does nothing while connecting or ready, without an access token, or
    /// after shutdown. Otherwise reuses the existing binding or constructs the
    /// first one, then moves to `Connecting`.
    pub async fn initialize(&self) -> Result<()> {
        let mut slot = self.inner.binding.lock().await;

        if self.inner.cancel.is_cancelled() {
            tracing::debug!("device controller is shut down, not initializing");
            return Ok(());
        }
        let state = self.state();
        if matches!(state, DeviceState::Connecting | DeviceState::Ready) {
            tracing::debug!(%state, "player already bound");
            return Ok(());
        }
        if self.inner.api.tokens().access_token().is_none() {
            tracing::debug!("no access token, not initializing player");
            return Ok(());
        }

        let binding = match slot.as_ref() {
            Some(existing) => Arc::clone(existing),
            None => {
                self.spawn_event_loop();
                let created = self.inner.factory.create(
                    self.inner.api.tokens().token_provider(),
                    self.inner.events.clone(),
                );
                *slot = Some(Arc::clone(&created));
                tracing::info!("player binding created");
                created
            }
        };

        // a ready event may have been applied since the check above
        if !self.inner.handle.send_if_modified(begin_connecting) {
            tracing::debug!(state = %self.state(), "device moved on, not connecting");
            return Ok(());
        }

        let connected = binding.connect().await;
        if !matches!(connected, Ok(true)) {
            // a ready event may already have arrived while connecting
            self.inner.handle.send_if_modified(|handle| {
                if handle.state != DeviceState::Connecting {
                    return false;
                }
                handle.state = DeviceState::NotReady;
                true
            });
        }

        match connected {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!("player binding refused to connect");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "player binding failed to connect");
                Err(e)
            }
        }
    }

    /// Waits until the device reports ready and returns its id.
    ///
    /// # Errors
    ///
    /// [`Error::PlayerNotReady`] when `timeout` elapses first or the controller
    /// is shut down.
    pub async fn await_ready(&self, timeout: Duration) -> Result<String> {
        let mut receiver = self.inner.handle.subscribe();
        let wait = receiver.wait_for(|handle| handle.state == DeviceState::Ready && handle.id.is_some());

        tokio::select! {
            _ = self.inner.cancel.cancelled() => Err(Error::PlayerNotReady),
            waited = tokio::time::timeout(timeout, wait) => match waited {
                Ok(Ok(handle)) => handle.id.clone().ok_or(Error::PlayerNotReady),
                _ => {
                    tracing::debug!(?timeout, "gave up waiting for device");
                    Err(Error::PlayerNotReady)
                }
            },
        }
    }

    /// The device id, if and only if the device is ready right now.
    pub fn ready_device_id(&self) -> Result<String> {
        let handle = self.inner.handle.borrow();
        match (&handle.id, handle.state) {
            (Some(id), DeviceState::Ready) => Ok(id.clone()),
            _ => Err(Error::PlayerNotReady),
        }
    }

    /// Moves the playback context to this device, paused.
    ///
    /// # Errors
    ///
    /// [`Error::PlayerNotReady`] without a ready device, otherwise
    /// [`Error::TransferFailed`] wrapping whatever went wrong. Callers treat
    /// the latter as non-fatal.
    pub async fn transfer_playback_here(&self) -> Result<()> {
        let device_id = self.ready_device_id()?;
        let body = serde_json::to_value(TransferPlaybackRequest {
            device_ids: vec![device_id.clone()],
            play: false,
        })
        .map_err(|e| Error::TransferFailed {
            device_id: device_id.clone(),
            reason: e.to_string(),
        })?;

        let api = &self.inner.api;
        let request = ApiRequest::put(api.url("/me/player"), Some(body));
        match api.send(&request).await {
            Ok(_) => {
                self.inner.handle.send_if_modified(|handle| {
                    if handle.id.as_deref() != Some(device_id.as_str()) {
                        return false;
                    }
                    handle.transferred = true;
                    true
                });
                tracing::info!(%device_id, "playback transferred");
                Ok(())
            }
            Err(e) => {
                let err = Error::TransferFailed {
                    device_id,
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "playback transfer failed");
                Err(err)
            }
        }
    }

    /// Delegates to the binding's own pause/resume.
    pub async fn toggle_play(&self) -> Result<()> {
        let binding = self.inner.binding.lock().await.clone();
        match binding {
            Some(binding) => binding.toggle_play().await,
            None => Err(Error::PlayerNotReady),
        }
    }

    /// Cancels the event loop and pending waits and disconnects the binding.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let binding = self.inner.binding.lock().await.take();
        if let Some(binding) = binding {
            binding.disconnect().await;
        }
        self.inner
            .handle
            .send_modify(|handle| handle.state = DeviceState::NotReady);
        tracing::info!("device controller shut down");
    }

    pub(crate) fn apply_playback(&self, event: &PlaybackEvent) {
        self.inner
            .playback
            .send_modify(|state| *state = state.apply(event));
    }

    fn spawn_event_loop(&self) {
        let receiver = self
            .inner
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(receiver) = receiver else {
            return;
        };

        let event_loop = EventLoop {
            store: self.inner.api.tokens().store(),
            handle: Arc::clone(&self.inner.handle),
            playback: Arc::clone(&self.inner.playback),
        };
        let cancel = self.inner.cancel.clone();
        tokio::spawn(event_loop.run(receiver, cancel));
    }
}

/// Consumes push events and feeds them through the transition functions.
struct EventLoop {
    store: Arc<dyn SessionStore>,
    handle: Arc<watch::Sender<DeviceHandle>>,
    playback: Arc<watch::Sender<PlaybackState>>,
}

impl EventLoop {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<PlayerEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.dispatch(event).await;
        }
        tracing::debug!("player event loop stopped");
    }

    async fn dispatch(&self, event: PlayerEvent) {
        match &event {
            PlayerEvent::Ready { device_id } => {
                tracing::info!(%device_id, "device ready");
                if let Err(e) = self.store.set(StoreKey::DeviceId, device_id).await {
                    tracing::warn!(error = %e, "failed to persist device id");
                }
            }
            PlayerEvent::NotReady { device_id } => {
                tracing::info!(%device_id, "device went offline");
            }
            PlayerEvent::StateChanged(snapshot) => {
                let pushed = PlaybackEvent::Pushed(snapshot.clone());
                self.playback
                    .send_modify(|state| *state = state.apply(&pushed));
                return;
            }
        }

        self.handle
            .send_modify(|handle| *handle = apply_device_event(handle, &event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_handle(id: &str) -> DeviceHandle {
        DeviceHandle {
            id: Some(id.to_string()),
            state: DeviceState::Ready,
            transferred: true,
        }
    }

    #[test]
    fn test_ready_sets_id_and_resets_transfer() {
        let next = apply_device_event(
            &ready_handle("old"),
            &PlayerEvent::Ready {
                device_id: "new".to_string(),
            },
        );
        assert_eq!(next.id.as_deref(), Some("new"));
        assert_eq!(next.state, DeviceState::Ready);
        assert!(!next.transferred);
    }

    #[test]
    fn test_not_ready_keeps_id() {
        let next = apply_device_event(
            &ready_handle("dev-1"),
            &PlayerEvent::NotReady {
                device_id: "dev-1".to_string(),
            },
        );
        assert_eq!(next.id.as_deref(), Some("dev-1"));
        assert_eq!(next.state, DeviceState::NotReady);
    }

    #[test]
    fn test_not_ready_for_other_device_is_ignored() {
        let handle = ready_handle("dev-1");
        let next = apply_device_event(
            &handle,
            &PlayerEvent::NotReady {
                device_id: "dev-0".to_string(),
            },
        );
        assert_eq!(next, handle);
    }

    #[test]
    fn test_ready_after_not_ready_recovers() {
        let offline = apply_device_event(
            &ready_handle("dev-1"),
            &PlayerEvent::NotReady {
                device_id: "dev-1".to_string(),
            },
        );
        let back = apply_device_event(
            &offline,
            &PlayerEvent::Ready {
                device_id: "dev-1".to_string(),
            },
        );
        assert_eq!(back.state, DeviceState::Ready);
        assert_eq!(back.id.as_deref(), Some("dev-1"));
    }

    #[test]
    fn test_begin_connecting_keeps_ready_device() {
        let mut handle = ready_handle("dev-1");
        assert!(!begin_connecting(&mut handle));
        assert_eq!(handle.state, DeviceState::Ready);

        let mut idle = DeviceHandle {
            state: DeviceState::NotReady,
            ..ready_handle("dev-1")
        };
        assert!(begin_connecting(&mut idle));
        assert_eq!(idle.state, DeviceState::Connecting);
        assert!(!begin_connecting(&mut idle));
    }

    #[test]
    fn test_not_ready_while_connecting() {
        let handle = DeviceHandle {
            id: Some("persisted".to_string()),
            state: DeviceState::Connecting,
            transferred: false,
        };
        let next = apply_device_event(
            &handle,
            &PlayerEvent::NotReady {
                device_id: "fresh".to_string(),
            },
        );
        assert_eq!(next.state, DeviceState::NotReady);
    }

    #[test]
    fn test_state_changed_leaves_handle_alone() {
        let handle = ready_handle("dev-1");
        assert_eq!(
            apply_device_event(&handle, &PlayerEvent::StateChanged(None)),
            handle
        );
    }
}
