//! HTTP routes against the fake daemon.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use banbridge_core::api::{router, ApiState};
use banbridge_config::KeyAliases;
use banbridge_core::{Command, RawReply, StatusParser};
use banbridge_test_utils::tracing_setup::init_test_tracing;
use banbridge_test_utils::{FakeDaemon, Reply, TestConfigBuilder};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

fn state_for(daemon: &FakeDaemon) -> Arc<ApiState> {
    Arc::new(ApiState::new(
        daemon.client(),
        StatusParser::default(),
        std::env::temp_dir(),
    ))
}

async fn call(state: Arc<ApiState>, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn sent(daemon: &FakeDaemon) -> Vec<String> {
    let received = daemon.received();
    assert_eq!(received.len(), 1, "expected exactly one command");
    received[0].tokens().to_vec()
}

/// `[0, "OK"]`, the usual answer to a control command.
fn ok_reply() -> RawReply {
    RawReply::seq([RawReply::int(0), RawReply::str("OK")])
}

// ── Queries ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_status_and_jails() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(RawReply::seq([
        RawReply::int(0),
        RawReply::seq([
            RawReply::pair("Number of jail", RawReply::int(2)),
            RawReply::pair("Jail list", RawReply::str("sshd, nginx")),
        ]),
    ]));
    let state = state_for(&daemon);

    let (status, body) = call(Arc::clone(&state), get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"jailCount": 2, "jailNames": ["sshd", "nginx"]}));

    let (status, body) = call(state, get("/api/jails")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["sshd", "nginx"]));

    let received = daemon.received();
    assert!(received.iter().all(|c| c.tokens() == ["status"]));
}

#[tokio::test]
async fn test_status_from_text_reply() {
    init_test_tracing();
    let text = "Status\n|- Number of jail:\t1\n`- Jail list:\tsshd\n";
    let daemon = FakeDaemon::start(move |_| Reply::Raw(text.as_bytes().to_vec()));

    let (status, body) = call(state_for(&daemon), get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"jailCount": 1, "jailNames": ["sshd"]}));
}

#[tokio::test]
async fn test_banned_collects_addresses() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(RawReply::seq([
        RawReply::int(0),
        RawReply::seq([
            RawReply::pair(
                "sshd",
                RawReply::seq([RawReply::str("10.0.0.2"), RawReply::str("9.9.9.9")]),
            ),
            RawReply::pair("nginx", RawReply::seq([RawReply::str("10.0.0.2 not-an-ip")])),
        ]),
    ]));

    let (status, body) = call(state_for(&daemon), get("/api/banned")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ips": ["9.9.9.9", "10.0.0.2"], "count": 2}));
    assert_eq!(sent(&daemon), vec!["banned"]);
}

#[tokio::test]
async fn test_jail_status() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(RawReply::seq([
        RawReply::int(0),
        RawReply::seq([
            RawReply::pair(
                "Filter",
                RawReply::seq([
                    RawReply::pair("Currently failed", RawReply::int(1)),
                    RawReply::pair("Total failed", RawReply::int(5)),
                    RawReply::pair(
                        "File list",
                        RawReply::seq([RawReply::str("/nonexistent/banbridge/auth.log")]),
                    ),
                ]),
            ),
            RawReply::pair(
                "Actions",
                RawReply::seq([
                    RawReply::pair("Currently banned", RawReply::int(1)),
                    RawReply::pair("Total banned", RawReply::int(2)),
                    RawReply::pair("Banned IP list", RawReply::seq([RawReply::str("203.0.113.7")])),
                ]),
            ),
        ]),
    ]));

    let (status, body) = call(state_for(&daemon), get("/api/jail/sshd/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "filter": {
                "currentlyFailed": 1,
                "totalFailed": 5,
                "watchedFiles": [{"path": "/nonexistent/banbridge/auth.log", "exists": false}]
            },
            "actions": {
                "currentlyBanned": 1,
                "totalBanned": 2,
                "bannedAddresses": ["203.0.113.7"]
            }
        })
    );
    assert_eq!(sent(&daemon), vec!["status", "sshd"]);
}

#[tokio::test]
async fn test_single_value_getters() {
    init_test_tracing();
    let cases = [
        ("/api/version", vec!["version"], "version"),
        ("/api/loglevel", vec!["get", "loglevel"], "loglevel"),
        ("/api/db/file", vec!["get", "dbfile"], "dbfile"),
        ("/api/db/maxmatches", vec!["get", "dbmaxmatches"], "dbmaxmatches"),
        ("/api/db/purgeage", vec!["get", "dbpurgeage"], "dbpurgeage"),
    ];
    for (uri, command, key) in cases {
        let daemon = FakeDaemon::replying(RawReply::seq([RawReply::int(0), RawReply::str(" 42 ")]));
        let (status, body) = call(state_for(&daemon), get(uri)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, json!({ key: "0\n 42" }), "{uri}");
        assert_eq!(sent(&daemon), command, "{uri}");
    }
}

#[tokio::test]
async fn test_version_answers_post_too() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(RawReply::str("1.1.0"));
    let (status, body) = call(state_for(&daemon), post("/api/version", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"version": "1.1.0"}));
}

// ── Control ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ban_and_unban_in_jail() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(RawReply::seq([RawReply::int(0), RawReply::int(1)]));
    let state = state_for(&daemon);

    let (status, body) = call(
        Arc::clone(&state),
        post("/api/jail/sshd/ban", json!({"ip": "203.0.113.7"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": "0\n1"}));

    let (status, _) = call(state, post("/api/jail/sshd/unban", json!({"ip": "203.0.113.7"}))).await;
    assert_eq!(status, StatusCode::OK);

    let commands: Vec<Vec<String>> = daemon.received().iter().map(|c| c.tokens().to_vec()).collect();
    assert_eq!(
        commands,
        vec![
            vec!["set", "sshd", "banip", "203.0.113.7"],
            vec!["set", "sshd", "unbanip", "203.0.113.7"],
        ]
    );
}

#[tokio::test]
async fn test_invalid_ban_never_reaches_daemon() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(ok_reply());
    let (status, _) = call(state_for(&daemon), post("/api/jail/sshd/ban", json!({"ip": "1.2.3.256"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(daemon.received().is_empty());
}

#[tokio::test]
async fn test_jail_reload_and_restart_flags() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(ok_reply());

    let (status, body) = call(
        state_for(&daemon),
        post("/api/jail/nginx/reload", json!({"restart": 1, "unban": "no", "ifExists": "on"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"result": "0\nOK", "command": ["reload", "--restart", "--if-exists", "nginx"]})
    );

    let daemon = FakeDaemon::replying(ok_reply());
    let (_, body) = call(
        state_for(&daemon),
        post("/api/jail/nginx/restart", json!({"unban": true})),
    )
    .await;
    assert_eq!(body["command"], json!(["restart", "--unban", "nginx"]));
    assert_eq!(sent(&daemon), vec!["restart", "--unban", "nginx"]);
}

#[tokio::test]
async fn test_server_control() {
    init_test_tracing();
    for (uri, command) in [
        ("/api/server/start", vec!["start"]),
        ("/api/server/restart", vec!["restart"]),
        ("/api/server/stop", vec!["stop"]),
    ] {
        let daemon = FakeDaemon::replying(ok_reply());
        let (status, body) = call(state_for(&daemon), post(uri, json!({}))).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, json!({"result": "0\nOK"}), "{uri}");
        assert_eq!(sent(&daemon), command, "{uri}");
    }

    let daemon = FakeDaemon::replying(ok_reply());
    let (_, body) = call(
        state_for(&daemon),
        post("/api/server/reload", json!({"all": true, "unban": false})),
    )
    .await;
    assert_eq!(body["command"], json!(["reload", "--all"]));
}

#[tokio::test]
async fn test_unban_routes() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(ok_reply());
    let state = state_for(&daemon);

    let (_, body) = call(Arc::clone(&state), post("/api/unban/all", json!({}))).await;
    assert_eq!(body["command"], json!(["unban", "--all"]));

    let (_, body) = call(Arc::clone(&state), post("/api/unban/198.51.100.4", json!({}))).await;
    assert_eq!(body["command"], json!(["unban", "198.51.100.4"]));

    let (_, body) = call(state, post("/api/unban", json!({"ip": "198.51.100.5"}))).await;
    assert_eq!(body["command"], json!(["unban", "198.51.100.5"]));

    assert_eq!(daemon.received().len(), 3);
}

// ── Settings ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_loglevel() {
    init_test_tracing();
    for (level, token) in [(json!("  debug"), "DEBUG"), (json!(10), "10")] {
        let daemon = FakeDaemon::replying(ok_reply());
        let (status, body) = call(state_for(&daemon), post("/api/loglevel", json!({"level": level}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["command"], json!(["set", "loglevel", token]));
        assert_eq!(sent(&daemon), vec!["set", "loglevel", token]);
    }
}

#[tokio::test]
async fn test_set_database_settings() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(ok_reply());
    let (status, body) = call(state_for(&daemon), post("/api/db/maxmatches", json!({"value": 20}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": "0\nOK"}));
    assert_eq!(sent(&daemon), vec!["set", "dbmaxmatches", "20"]);

    let daemon = FakeDaemon::replying(ok_reply());
    let (status, _) = call(state_for(&daemon), post("/api/db/purgeage", json!({"seconds": "86400"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent(&daemon), vec!["set", "dbpurgeage", "86400"]);
}

// ── Failures ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_daemon_error_reply_is_still_200() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(RawReply::seq([
        RawReply::int(1),
        RawReply::str("UnknownJailException('nope')"),
    ]));
    let (status, body) = call(state_for(&daemon), post("/api/jail/nope/ban", json!({"ip": "1.2.3.4"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": "1\nUnknownJailException('nope')"}));
}

#[tokio::test]
async fn test_state_from_config_uses_socket_and_aliases() {
    init_test_tracing();
    let daemon = FakeDaemon::replying(RawReply::seq([
        RawReply::int(0),
        RawReply::seq([
            RawReply::pair("Jails", RawReply::int(1)),
            RawReply::pair("Names", RawReply::str("sshd")),
        ]),
    ]));
    let aliases = KeyAliases {
        jail_count: vec!["Jails".to_string()],
        jail_list: vec!["Names".to_string()],
        ..KeyAliases::default()
    };
    let config = TestConfigBuilder::new()
        .socket_path(daemon.socket_path())
        .timeout_secs(2)
        .aliases(aliases)
        .build();
    let state = Arc::new(ApiState::from_config(&config).unwrap());

    let (status, body) = call(Arc::clone(&state), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["socket_path"], daemon.socket_path().display().to_string());

    let (status, body) = call(state, get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"jailCount": 1, "jailNames": ["sshd"]}));
}

#[tokio::test]
async fn test_state_from_config_serves_static_root() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("manifest.json"), r#"{"name":"banbridge"}"#).unwrap();
    let daemon = FakeDaemon::replying(ok_reply());
    let config = TestConfigBuilder::new()
        .socket_path(daemon.socket_path())
        .static_root(dir.path())
        .listen_port(8080)
        .log_level("debug")
        .build();
    config.validate().unwrap();
    let state = Arc::new(ApiState::from_config(&config).unwrap());

    let (status, body) = call(state, get("/manifest.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "banbridge"}));
}

#[tokio::test]
async fn test_daemon_gone_mid_request_is_500() {
    init_test_tracing();
    let daemon = FakeDaemon::echo();
    let state = state_for(&daemon);
    drop(daemon);
    tokio::task::yield_now().await;

    let (status, body) = call(state, get("/api/status")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("fail2ban.sock"));
}

#[test]
fn test_command_display_matches_wire_tokens() {
    let command = Command::parse("set sshd banip 1.2.3.4").unwrap();
    assert_eq!(command.to_string(), "set sshd banip 1.2.3.4");
}
