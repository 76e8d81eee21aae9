use std::time::Duration;

use tokio::task::JoinError;

use crate::{
    cli::{fail, load_context},
    error, info,
    server::{self, CallbackState},
    success,
};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn auth() {
    let ctx = load_context().await;

    let (state, done) = CallbackState::new(ctx.flow.clone());
    let address = ctx.config.server_address.clone();
    let mut server = tokio::spawn(async move { server::start_api_server(&address, state).await });

    let auth_url = match ctx.flow.begin_login().await {
        Ok(url) => url,
        Err(e) => fail(e),
    };
    info!(
        "If the browser did not open, navigate to the following URL manually:\n{}",
        auth_url
    );

    let outcome = tokio::select! {
        finished = &mut server => {
            ctx.device.shutdown().await;
            error!("{}", server_exit_message(&finished))
        }
        outcome = tokio::time::timeout(LOGIN_TIMEOUT, done) => outcome,
    };
    ctx.device.shutdown().await;
    server.abort();

    match outcome {
        Ok(Ok(Ok(()))) => success!("Authentication successful!"),
        Ok(Ok(Err(e))) => error!("Authentication failed: {}", e),
        Ok(Err(_)) => error!("Callback server stopped before the login finished."),
        Err(_) => error!("Authentication timed out."),
    }
}

pub async fn logout() {
    let ctx = load_context().await;
    match ctx.flow.logout().await {
        Ok(()) => success!("Logged out."),
        Err(e) => fail(e),
    }
}

/// Why the callback server ended before the login did.
fn server_exit_message(finished: &Result<crate::Result<()>, JoinError>) -> String {
    match finished {
        Ok(Err(e)) => format!("Callback server failed: {e}"),
        Ok(Ok(())) => "Callback server stopped before the login finished.".to_string(),
        Err(e) => format!("Callback server crashed: {e}"),
    }
}
