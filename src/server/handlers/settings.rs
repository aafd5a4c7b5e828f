use crate::server::state::AppState;
use axum::{Form, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::info;

/// Form payload for `POST /settings`.
///
/// Absent or empty fields leave the corresponding knob untouched, so a
/// caller can flip one setting without knowing the others.
#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    setup: Option<String>,
    policy: Option<String>,
    prefetch: Option<String>,
}

/// Adjust runtime knobs: setup mode, rewrite policy, prefetch.
pub async fn update_settings(
    State(state): State<AppState>,
    Form(form): Form<SettingsForm>,
) -> StatusCode {
    if let Some(setup) = form.setup.filter(|value| !value.is_empty()) {
        let on = setup == "1";
        state.controls.set_setup_mode(on);
        info!(setup_mode = on, "settings update");
    }
    if let Some(policy) = form.policy.filter(|value| !value.is_empty()) {
        info!(policy = %policy, "settings update");
        state.controls.set_policy(policy);
    }
    if let Some(prefetch) = form.prefetch.filter(|value| !value.is_empty()) {
        let off = prefetch == "0";
        state.controls.set_prefetch_off(off);
        info!(prefetch_off = off, "settings update");
    }

    StatusCode::OK
}
