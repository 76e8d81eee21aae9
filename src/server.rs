use std::{
    net::SocketAddr,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use axum::{Extension, Router, routing::get};
use tokio::sync::oneshot;

use crate::{
    api,
    error::{Error, Result},
    spotify::AuthFlow,
};

/// What the callback handler needs: the login flow and a one-shot channel
/// telling the waiting command how the login ended.
#[derive(Clone)]
pub struct CallbackState {
    pub flow: AuthFlow,
    done: Arc<Mutex<Option<oneshot::Sender<std::result::Result<(), String>>>>>,
}

impl CallbackState {
    pub fn new(flow: AuthFlow) -> (Self, oneshot::Receiver<std::result::Result<(), String>>) {
        let (sender, receiver) = oneshot::channel();
        let state = Self {
            flow,
            done: Arc::new(Mutex::new(Some(sender))),
        };
        (state, receiver)
    }

    /// Reports the login outcome; only the first report counts.
    pub fn finish(&self, outcome: std::result::Result<(), String>) {
        let sender = self
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(outcome);
        }
    }
}

pub fn router(state: CallbackState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback).layer(Extension(state)))
}

pub async fn start_api_server(address: &str, state: CallbackState) -> Result<()> {
    let addr = SocketAddr::from_str(address)
        .map_err(|e| Error::Config(format!("invalid server address {address}: {e}")))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("cannot bind {addr}: {e}")))?;
    tracing::info!(%addr, "callback server listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::UpstreamUnavailable(format!("callback server stopped: {e}")))
}
