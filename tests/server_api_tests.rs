use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bossraid::config::EngineConfig;
use bossraid::raid::Alliance;
use bossraid::server::build_router;
use bossraid::server::routes::route_request;
use bossraid::BossEngine;
use serde_json::Value;
use tower::util::ServiceExt;

const ADMIN: u64 = 900;
const LEADER: u64 = 1;

fn engine() -> BossEngine {
    let config = EngineConfig {
        admins: vec![ADMIN],
        alliances: vec![Alliance {
            id: 4,
            leaders: vec![LEADER],
            members: vec![2, 3],
        }],
        ..EngineConfig::default()
    };
    BossEngine::new(&config).expect("engine should build")
}

fn json(body: &str) -> Value {
    serde_json::from_str(body).expect("response should be valid json")
}

/// Spawns a boss through the admin endpoint and returns its id.
fn spawn_boss(engine: &BossEngine, base_hp: u64) -> u64 {
    let body = format!(r#"{{"boss_type":"elite_guardian","tier":"blue","base_hp":{base_hp}}}"#);
    let response = route_request(engine, "POST", "/api/admin/spawn-boss", &body, Some(ADMIN));
    assert_eq!(response.status_code, 201, "{}", response.body);
    json(&response.body)["boss_id"].as_u64().expect("boss id")
}

#[test]
fn health_endpoint_needs_no_caller() {
    let engine = engine();
    let response = route_request(&engine, "GET", "/api/health", "", None);
    assert_eq!(response.status_code, 200);
    assert_eq!(response.content_type, "application/json");
    assert!(response.body.contains("\"status\": \"ok\""));
}

#[test]
fn other_endpoints_require_a_caller() {
    let engine = engine();
    let response = route_request(&engine, "GET", "/api/bosses", "", None);
    assert_eq!(response.status_code, 401);
    assert_eq!(json(&response.body)["status"], "error");
}

#[test]
fn unknown_routes_are_not_found() {
    let engine = engine();
    assert_eq!(route_request(&engine, "GET", "/api/nope", "", Some(1)).status_code, 404);
    assert_eq!(route_request(&engine, "DELETE", "/api/bosses", "", Some(1)).status_code, 404);
    assert_eq!(route_request(&engine, "GET", "/index.html", "", Some(1)).status_code, 404);
}

#[test]
fn spawn_boss_is_admin_only_and_validated() {
    let engine = engine();
    let body = r#"{"boss_type":"void_reaver","base_hp":5000}"#;

    let forbidden = route_request(&engine, "POST", "/api/admin/spawn-boss", body, Some(LEADER));
    assert_eq!(forbidden.status_code, 403);

    let malformed = route_request(&engine, "POST", "/api/admin/spawn-boss", "{not json", Some(ADMIN));
    assert_eq!(malformed.status_code, 400);
    let missing_hp = route_request(&engine, "POST", "/api/admin/spawn-boss", r#"{"boss_type":"void_reaver"}"#, Some(ADMIN));
    assert_eq!(missing_hp.status_code, 400);
    let zero_hp = route_request(
        &engine,
        "POST",
        "/api/admin/spawn-boss",
        r#"{"boss_type":"void_reaver","base_hp":0}"#,
        Some(ADMIN),
    );
    assert_eq!(zero_hp.status_code, 400);

    let created = route_request(&engine, "POST", "/api/admin/spawn-boss", body, Some(ADMIN));
    assert_eq!(created.status_code, 201);
    let payload = json(&created.body);
    assert_eq!(payload["boss_type"], "void_reaver");
    assert_eq!(payload["hp"]["current"], 5000);
    assert_eq!(payload["phase"], 1);
}

#[test]
fn boss_listing_filters_by_tier() {
    let engine = engine();
    spawn_boss(&engine, 10_000);

    let all = json(&route_request(&engine, "GET", "/api/bosses", "", Some(2)).body);
    assert_eq!(all["count"], 1);

    let blue = json(&route_request(&engine, "GET", "/api/bosses?tier=blue", "", Some(2)).body);
    assert_eq!(blue["count"], 1);
    let golden = json(&route_request(&engine, "GET", "/api/bosses?tier=golden", "", Some(2)).body);
    assert_eq!(golden["count"], 0);

    let bad = route_request(&engine, "GET", "/api/bosses?tier=plaid", "", Some(2));
    assert_eq!(bad.status_code, 400);
}

#[test]
fn attack_requires_units() {
    let engine = engine();
    let boss_id = spawn_boss(&engine, 10_000);
    let path = format!("/api/bosses/{boss_id}/attack");

    let response = route_request(&engine, "POST", &path, r#"{"tactic":"aggressive"}"#, Some(2));
    assert_eq!(response.status_code, 400);
    assert_eq!(json(&response.body)["message"], "units required");

    let empty = route_request(&engine, "POST", &path, r#"{"units":{}}"#, Some(2));
    assert_eq!(empty.status_code, 400);
}

#[test]
fn attack_then_leaderboard_and_attempts() {
    let engine = engine();
    let boss_id = spawn_boss(&engine, 1_000_000);

    let attack = route_request(
        &engine,
        "POST",
        &format!("/api/bosses/{boss_id}/attack"),
        r#"{"units":{"infantry":100,"cavalry":20},"tactic":"aggressive"}"#,
        Some(2),
    );
    assert_eq!(attack.status_code, 200, "{}", attack.body);
    let attack = json(&attack.body);
    assert_eq!(attack["result"], "defeat");
    let dealt = attack["damage_dealt"].as_u64().expect("damage");
    assert!(dealt > 0);

    let board = json(
        &route_request(
            &engine,
            "GET",
            &format!("/api/bosses/{boss_id}/leaderboard?limit=5"),
            "",
            Some(3),
        )
        .body,
    );
    assert_eq!(board["entries"][0]["user"], 2);
    assert_eq!(board["entries"][0]["damage_dealt"], dealt);
    assert_eq!(board["entries"][0]["rank"], 1);

    let mine = json(&route_request(&engine, "GET", "/api/user/boss-attempts", "", Some(2)).body);
    assert_eq!(mine["attempts"].as_array().map(Vec::len), Some(1));
    let theirs = json(&route_request(&engine, "GET", "/api/user/boss-attempts", "", Some(3)).body);
    assert_eq!(theirs["attempts"].as_array().map(Vec::len), Some(0));

    let history = json(
        &route_request(&engine, "GET", &format!("/api/bosses/{boss_id}/attempts"), "", Some(3)).body,
    );
    assert_eq!(history["attempts"][0]["user_id"], 2);
}

#[test]
fn defeated_boss_answers_conflict() {
    let engine = engine();
    let boss_id = spawn_boss(&engine, 100);
    let path = format!("/api/bosses/{boss_id}/attack");
    let body = r#"{"units":{"siege":10}}"#;

    let kill = route_request(&engine, "POST", &path, body, Some(2));
    assert_eq!(json(&kill.body)["result"], "victory");

    let again = route_request(&engine, "POST", &path, body, Some(3));
    assert_eq!(again.status_code, 409);
    assert_eq!(json(&again.body)["status"], "error");
}

#[test]
fn estimate_does_not_touch_the_boss() {
    let engine = engine();
    let boss_id = spawn_boss(&engine, 50_000);
    let response = route_request(
        &engine,
        "POST",
        &format!("/api/bosses/{boss_id}/estimate"),
        r#"{"units":{"infantry":100}}"#,
        Some(2),
    );
    assert_eq!(response.status_code, 200);
    let payload = json(&response.body);
    assert!(payload["projectedDamage"].as_u64().unwrap_or(0) > 0);
    assert!(payload["playerPower"].as_f64().unwrap_or(0.0) > 0.0);
    assert!(payload["powerRatio"].is_number());
    assert!(payload["estimate"].is_string());

    let detail = json(&route_request(&engine, "GET", &format!("/api/bosses/{boss_id}"), "", Some(2)).body);
    assert_eq!(detail["hp"]["current"], 50_000);
    assert_eq!(detail["stats"]["total_attempts"], 0);
}

#[test]
fn malformed_ids_are_bad_requests() {
    let engine = engine();
    assert_eq!(route_request(&engine, "GET", "/api/bosses/abc", "", Some(2)).status_code, 400);
    assert_eq!(route_request(&engine, "GET", "/api/raids/xyz", "", Some(2)).status_code, 400);
    assert_eq!(route_request(&engine, "GET", "/api/bosses/42", "", Some(2)).status_code, 404);
}

#[test]
fn raid_lifecycle_over_routes() {
    let engine = engine();
    let boss_id = spawn_boss(&engine, 2_000);
    let create_body = format!(
        r#"{{"boss_id":{boss_id},"alliance_id":4,"min_participants":2,"max_participants":3}}"#
    );

    let denied = route_request(&engine, "POST", "/api/raids/create", &create_body, Some(2));
    assert_eq!(denied.status_code, 403);

    let created = route_request(&engine, "POST", "/api/raids/create", &create_body, Some(LEADER));
    assert_eq!(created.status_code, 201, "{}", created.body);
    let raid_id = json(&created.body)["id"].as_u64().expect("raid id");
    assert_eq!(json(&created.body)["status"], "forming");

    let early = route_request(&engine, "POST", &format!("/api/raids/{raid_id}/start"), "", Some(LEADER));
    assert_eq!(early.status_code, 400);

    let joined = route_request(&engine, "POST", &format!("/api/raids/{raid_id}/join"), "", Some(2));
    assert_eq!(joined.status_code, 200);
    let started = route_request(&engine, "POST", &format!("/api/raids/{raid_id}/start"), "", Some(LEADER));
    assert_eq!(json(&started.body)["status"], "active");

    let hit = route_request(
        &engine,
        "POST",
        &format!("/api/raids/{raid_id}/contribute"),
        r#"{"units":{"siege":100}}"#,
        Some(2),
    );
    assert_eq!(hit.status_code, 200, "{}", hit.body);
    let hit = json(&hit.body);
    assert_eq!(hit["attack"]["result"], "victory");
    assert_eq!(hit["raid"]["status"], "completed");

    let detail = json(&route_request(&engine, "GET", &format!("/api/raids/{raid_id}"), "", Some(3)).body);
    assert_eq!(detail["participants"][0]["user_id"], 2);
    assert_eq!(detail["participants"][0]["contribution_percent"], 100.0);

    let listed = json(&route_request(&engine, "GET", "/api/raids?alliance_id=4&status=completed", "", Some(3)).body);
    assert_eq!(listed["raids"].as_array().map(Vec::len), Some(1));
}

#[test]
fn raid_listing_requires_alliance() {
    let engine = engine();
    let response = route_request(&engine, "GET", "/api/raids", "", Some(2));
    assert_eq!(response.status_code, 400);
    assert_eq!(json(&response.body)["message"], "alliance_id required");
}

async fn call(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(request).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn router_reads_caller_from_header() {
    let engine = Arc::new(engine());
    let boss_id = spawn_boss(&engine, 10_000);

    let (status, _) = call(
        build_router(Arc::clone(&engine)),
        Request::builder().uri("/api/bosses").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, payload) = call(
        build_router(Arc::clone(&engine)),
        Request::builder()
            .method("POST")
            .uri(format!("/api/bosses/{boss_id}/attack"))
            .header("x-user-id", "3")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"units":{"infantry":10}}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["user_id"], 3);

    let (status, payload) = call(
        build_router(engine),
        Request::builder()
            .uri(format!("/api/bosses/{boss_id}/leaderboard?limit=1"))
            .header("x-user-id", "2")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["entries"][0]["user"], 3);
}
