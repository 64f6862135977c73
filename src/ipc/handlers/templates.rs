use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::templates;
use serde_json::json;

use super::common::required_str;

pub fn effective_body<'a>(state: &'a AppState, key: &str) -> Option<&'a str> {
    if let Some(over) = state.template_overrides.get(key) {
        return Some(over.as_str());
    }
    templates::default_body(key)
}

fn handle_templates_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let list: Vec<serde_json::Value> = templates::TEMPLATE_KEYS
        .iter()
        .map(|key| {
            json!({
                "key": key,
                "title": templates::title(key),
                "body": effective_body(state, key),
                "customized": state.template_overrides.contains_key(*key),
            })
        })
        .collect();
    ok(&req.id, json!({ "templates": list }))
}

fn handle_templates_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match required_str(&req.params, "key") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let body = match required_str(&req.params, "body") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if templates::default_body(&key).is_none() {
        return err(
            &req.id,
            "not_found",
            "unknown template",
            Some(json!({ "key": key })),
        );
    }

    // Kept in memory for the session only.
    state.template_overrides.insert(key.clone(), body);
    ok(&req.id, json!({ "key": key, "saved": true }))
}

fn handle_templates_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match required_str(&req.params, "key") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if templates::default_body(&key).is_none() {
        return err(
            &req.id,
            "not_found",
            "unknown template",
            Some(json!({ "key": key })),
        );
    }
    state.template_overrides.remove(&key);
    ok(&req.id, json!({ "key": key, "reset": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "templates.list" => Some(handle_templates_list(state, req)),
        "templates.save" => Some(handle_templates_save(state, req)),
        "templates.reset" => Some(handle_templates_reset(state, req)),
        _ => None,
    }
}
