use std::collections::HashMap;

use axum::{Extension, extract::Query, response::Html};

use crate::{server::CallbackState, warning};

pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<CallbackState>,
) -> Html<&'static str> {
    if let Some(error) = params.get("error") {
        warning!("Authorization was denied: {}", error);
        state.finish(Err(format!("authorization denied: {error}")));
        return Html("<h4>Login was cancelled.</h4>");
    }

    let Some(code) = params.get("code") else {
        return Html("<h4>Missing authorization code.</h4>");
    };

    match state.flow.complete_login(code).await {
        Ok(()) => {
            state.finish(Ok(()));
            Html("<h2>Authentication successful.</h2><p>Close the browser window.</p>")
        }
        Err(e) => {
            warning!("Token exchange failed: {}", e);
            state.finish(Err(e.to_string()));
            Html("<h4>Login failed.</h4>")
        }
    }
}
