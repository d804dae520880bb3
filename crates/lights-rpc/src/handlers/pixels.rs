//! Pixel surface handlers.

use super::{require_i64_param, require_param};
use crate::server::AppState;
use lights_core::{Color, Position, WriteMode};
use serde_json::{json, Value};

pub fn set(state: &AppState, params: &Value) -> lights_core::Result<Value> {
    let position: Position = require_param(params, "position")?;
    let color: Color = require_param(params, "color")?;
    let applied = state.controller.set(&position, color)?;
    Ok(json!({"applied": applied}))
}

pub fn set_all(state: &AppState, params: &Value) -> lights_core::Result<Value> {
    let colors: Vec<Color> = require_param(params, "colors")?;
    let applied = state.controller.set_all(&colors)?;
    Ok(json!({"applied": applied}))
}

pub fn fill(state: &AppState, params: &Value) -> lights_core::Result<Value> {
    let color: Color = require_param(params, "color")?;
    Ok(json!({"applied": state.controller.fill(color)}))
}

pub fn brightness(state: &AppState, params: &Value) -> lights_core::Result<Value> {
    let level = require_i64_param(params, "level")?;
    Ok(json!({"applied": state.controller.brightness(level)}))
}

pub fn mode(state: &AppState, params: &Value) -> lights_core::Result<Value> {
    let mode: WriteMode = require_param(params, "mode")?;
    let applied = state.controller.mode(mode == WriteMode::Instant);
    Ok(json!({"applied": applied}))
}

pub fn show(state: &AppState, _params: &Value) -> lights_core::Result<Value> {
    Ok(json!({"applied": state.controller.show()}))
}

pub fn state(state: &AppState, _params: &Value) -> lights_core::Result<Value> {
    Ok(serde_json::to_value(state.controller.state())?)
}
