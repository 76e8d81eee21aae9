#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use sporlplay::{
    Result,
    config::SpotifyConfig,
    management::{MemoryStore, SessionStore, StoreKey, TokenManager, TokenProvider},
    spotify::{ApiClient, DeviceController, PlayerBinding, PlayerFactory},
    types::PlayerEvent,
};
use tokio::sync::mpsc;

/// Records what the controller does with its binding.
#[derive(Default)]
pub struct FakePlayer {
    pub created: AtomicUsize,
    pub connects: AtomicUsize,
    pub toggles: AtomicUsize,
    pub disconnected: AtomicBool,
    pub events: Mutex<Option<mpsc::UnboundedSender<PlayerEvent>>>,
    pub token_provider: Mutex<Option<TokenProvider>>,
}

impl FakePlayer {
    pub fn push(&self, event: PlayerEvent) {
        self.events
            .lock()
            .unwrap()
            .as_ref()
            .expect("binding was never created")
            .send(event)
            .unwrap();
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

pub struct FakeFactory(pub Arc<FakePlayer>);

struct FakeBinding(Arc<FakePlayer>);

impl PlayerFactory for FakeFactory {
    fn create(
        &self,
        token_provider: TokenProvider,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Arc<dyn PlayerBinding> {
        self.0.created.fetch_add(1, Ordering::SeqCst);
        *self.0.events.lock().unwrap() = Some(events);
        *self.0.token_provider.lock().unwrap() = Some(token_provider);
        Arc::new(FakeBinding(Arc::clone(&self.0)))
    }
}

#[async_trait]
impl PlayerBinding for FakeBinding {
    async fn connect(&self) -> Result<bool> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn toggle_play(&self) -> Result<()> {
        self.0.toggles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.0.disconnected.store(true, Ordering::SeqCst);
    }
}

/// A token manager talking to `server_url`, rehydrated from a memory store
/// seeded with the given tokens.
pub async fn session(
    server_url: &str,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> (TokenManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    if let Some(token) = access_token {
        store.set(StoreKey::AccessToken, token).await.unwrap();
    }
    if let Some(token) = refresh_token {
        store.set(StoreKey::RefreshToken, token).await.unwrap();
    }

    let tokens = TokenManager::load(SpotifyConfig::for_base_url(server_url), store.clone())
        .await
        .unwrap();
    (tokens, store)
}

/// A device controller over a fake binding.
pub fn device(tokens: &TokenManager) -> (DeviceController, ApiClient, Arc<FakePlayer>) {
    let api = ApiClient::new(tokens.clone());
    let fake = Arc::new(FakePlayer::default());
    let controller = DeviceController::new(api.clone(), Arc::new(FakeFactory(Arc::clone(&fake))));
    (controller, api, fake)
}
