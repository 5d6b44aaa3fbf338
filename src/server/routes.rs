use crate::engine::BossEngine;
use crate::server::api::{self, ApiError, ApiResult};

pub struct HttpResponse {
    pub status_code: u16,
    pub content_type: &'static str,
    pub body: String,
}

/// Dispatch one request. `path` may carry a query string; `caller` is the
/// authenticated user id, if any.
pub fn route_request(
    engine: &BossEngine,
    method: &str,
    path: &str,
    body: &str,
    caller: Option<u64>,
) -> HttpResponse {
    let (route, query) = path.split_once('?').unwrap_or((path, ""));
    let segments: Vec<&str> = route.split('/').filter(|segment| !segment.is_empty()).collect();

    if let ("GET", ["api", "health"]) = (method, segments.as_slice()) {
        return respond(200, api::health_payload());
    }
    if !matches!(segments.first(), Some(&"api")) {
        return error_response(404, "Route not found");
    }
    let Some(caller) = caller else {
        return error_response(401, "Authentication required");
    };

    match (method, &segments[1..]) {
        ("GET", ["bosses"]) => respond(200, api::bosses_payload(engine, query)),
        ("GET", ["bosses", id]) => respond(
            200,
            api::parse_boss_id(id).and_then(|id| api::boss_detail_payload(engine, id)),
        ),
        ("POST", ["bosses", id, "estimate"]) => respond(
            200,
            api::parse_boss_id(id).and_then(|id| api::estimate_payload(engine, id, body)),
        ),
        ("POST", ["bosses", id, "attack"]) => respond(
            200,
            api::parse_boss_id(id).and_then(|id| api::attack_payload(engine, id, caller, body)),
        ),
        ("GET", ["bosses", id, "leaderboard"]) => respond(
            200,
            api::parse_boss_id(id).and_then(|id| api::leaderboard_payload(engine, id, query)),
        ),
        ("GET", ["bosses", id, "attempts"]) => respond(
            200,
            api::parse_boss_id(id).and_then(|id| api::boss_attempts_payload(engine, id, query)),
        ),
        ("GET", ["raids"]) => respond(200, api::raids_payload(engine, query)),
        ("POST", ["raids", "create"]) => respond(201, api::raid_create_payload(engine, caller, body)),
        ("GET", ["raids", id]) => respond(
            200,
            api::parse_raid_id(id).and_then(|id| api::raid_detail_payload(engine, id)),
        ),
        ("POST", ["raids", id, "join"]) => respond(
            200,
            api::parse_raid_id(id).and_then(|id| api::raid_join_payload(engine, id, caller)),
        ),
        ("POST", ["raids", id, "start"]) => respond(
            200,
            api::parse_raid_id(id).and_then(|id| api::raid_start_payload(engine, id, caller)),
        ),
        ("POST", ["raids", id, "contribute"]) => respond(
            200,
            api::parse_raid_id(id).and_then(|id| api::raid_contribute_payload(engine, id, caller, body)),
        ),
        ("GET", ["user", "boss-attempts"]) => respond(200, api::user_attempts_payload(engine, caller, query)),
        ("POST", ["admin", "spawn-boss"]) => respond(201, api::spawn_boss_payload(engine, caller, body)),
        _ => error_response(404, "Route not found"),
    }
}

fn respond(success_code: u16, result: ApiResult) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse {
            status_code: success_code,
            content_type: "application/json",
            body,
        },
        Err(err) => api_error_response(&err),
    }
}

fn api_error_response(err: &ApiError) -> HttpResponse {
    let status_code = err.status_code();
    if status_code >= 500 {
        tracing::error!(status_code, error = %err, "request failed");
    } else {
        tracing::debug!(status_code, error = %err, "request rejected");
    }
    error_response(status_code, &err.to_string())
}

fn error_response(status_code: u16, message: &str) -> HttpResponse {
    HttpResponse {
        status_code,
        content_type: "application/json",
        body: format!(
            "{{\n  \"status\": \"error\",\n  \"message\": {}\n}}",
            serde_json::to_string(message).unwrap_or_else(|_| "\"Unknown error\"".to_string())
        ),
    }
}
