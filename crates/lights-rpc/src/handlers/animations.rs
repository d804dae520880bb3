//! Animation registry and animator handlers.

use super::require_str_param;
use crate::server::AppState;
use base64::Engine as _;
use lights_core::LightsError;
use serde_json::{json, Value};
use tracing::info;

pub fn animate(state: &AppState, params: &Value) -> lights_core::Result<Value> {
    let name = require_str_param(params, "name", "name")?;
    let queued = state.controller.animate(&name)?;
    Ok(json!({"queued": queued}))
}

pub fn stop_animation(state: &AppState, _params: &Value) -> lights_core::Result<Value> {
    state.controller.stop_animation();
    Ok(json!({"stopped": true}))
}

pub fn register_animation(state: &AppState, params: &Value) -> lights_core::Result<Value> {
    let name = require_str_param(params, "name", "name")?;
    let encoded = require_str_param(params, "animation", "animation")?;
    let artifact = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| LightsError::InvalidParams {
            message: format!("animation is not valid base64: {}", e),
        })?;

    state.controller.register_animation(&name, &artifact)?;
    info!("Registered animation '{}'", name);
    Ok(json!({"registered": name}))
}

pub fn unregister_animation(state: &AppState, params: &Value) -> lights_core::Result<Value> {
    let name = require_str_param(params, "name", "name")?;
    state.controller.unregister_animation(&name)?;
    Ok(json!({"unregistered": name}))
}

pub fn list_animations(state: &AppState, _params: &Value) -> lights_core::Result<Value> {
    let animations = state.controller.list_animations()?;
    Ok(json!({"animations": animations}))
}
