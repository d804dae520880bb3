//! JSON-RPC request handlers, split by domain.

mod animations;
mod pixels;

use crate::server::AppState;
use lights_core::rpc::method_not_found;
use lights_core::LightsError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_str())
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> lights_core::Result<String> {
    get_str_param(params, snake, camel)
        .map(String::from)
        .ok_or_else(|| LightsError::InvalidParams {
            message: format!("Missing required parameter: {}", snake),
        })
}

/// Extract a required integer parameter or return an error.
pub(crate) fn require_i64_param(params: &Value, name: &str) -> lights_core::Result<i64> {
    params
        .get(name)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| LightsError::InvalidParams {
            message: format!("Missing or non-integer parameter: {}", name),
        })
}

/// Deserialize a required structured parameter.
pub(crate) fn require_param<T: DeserializeOwned>(
    params: &Value,
    name: &str,
) -> lights_core::Result<T> {
    let value = params.get(name).ok_or_else(|| LightsError::InvalidParams {
        message: format!("Missing required parameter: {}", name),
    })?;

    serde_json::from_value(value.clone()).map_err(|e| LightsError::InvalidParams {
        message: format!("Invalid parameter {}: {}", name, e),
    })
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate domain handler.
pub(crate) fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> lights_core::Result<Value> {
    match method {
        "health_check" => Ok(json!({"status": "ok"})),

        // Pixels
        "set" => pixels::set(state, params),
        "setAll" => pixels::set_all(state, params),
        "fill" => pixels::fill(state, params),
        "brightness" => pixels::brightness(state, params),
        "mode" => pixels::mode(state, params),
        "show" => pixels::show(state, params),
        "state" => pixels::state(state, params),

        // Animations
        "animate" => animations::animate(state, params),
        "stopAnimation" => animations::stop_animation(state, params),
        "registerAnimation" => animations::register_animation(state, params),
        "unregisterAnimation" => animations::unregister_animation(state, params),
        "listAnimations" => animations::list_animations(state, params),

        _ => Err(method_not_found(method)),
    }
}
