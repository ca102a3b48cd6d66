//! 发布 API 端到端测试
//!
//! 通过 `tower::ServiceExt::oneshot` 直接驱动路由，不监听端口

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use bot_publisher::middleware::API_KEY_HEADER;
use bot_publisher::state::AppState;
use bot_publisher::EnvConfig;

const API_KEY: &str = "test-key";

struct Harness {
    app: Router,
    state: Arc<AppState>,
    bot_dir: TempDir,
    scratch: TempDir,
    _plugins: TempDir,
    _data: TempDir,
}

fn write_local_plugin(plugins_dir: &Path) {
    let dir = plugins_dir.join("local");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("plugin.json"),
        r#"{
            "name": "localPublish",
            "description": "Publish bot to a local directory",
            "publish": { "targetTypes": ["localpublish"], "runtime": "local" }
        }"#,
    )
    .unwrap();
}

/// 脚本等待项目目录下的 release 文件，内容为 ok 时成功
fn write_script_plugin(plugins_dir: &Path) {
    let dir = plugins_dir.join("shell");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("plugin.json"),
        r#"{
            "name": "shellPublish",
            "description": "Publish bot through a gated shell script",
            "publish": {
                "targetTypes": ["shell"],
                "runtime": "script",
                "command": "echo publishing $PUBLISH_VERSION; while [ ! -f release ]; do sleep 0.05; done; grep -q ok release",
                "rollbackCommand": "true",
                "timeoutSecs": 30
            }
        }"#,
    )
    .unwrap();
}

fn write_bot(dir: &Path) {
    std::fs::create_dir_all(dir.join("settings")).unwrap();
    std::fs::create_dir_all(dir.join("dialogs")).unwrap();
    std::fs::write(dir.join("main.dialog"), r#"{"$kind":"Microsoft.AdaptiveDialog"}"#).unwrap();
    std::fs::write(dir.join("dialogs/greeting.dialog"), "{}").unwrap();
    std::fs::write(
        dir.join("settings/appsettings.json"),
        r#"{"publishTargets":[
            {"name":"staging","type":"localpublish","configuration":{"slot":"staging"}},
            {"name":"azure","type":"azurePublish"},
            {"name":"gated","type":"shell"}
        ]}"#,
    )
    .unwrap();
}

fn harness(with_plugins: bool) -> Harness {
    let plugins = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let bot_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    if with_plugins {
        write_local_plugin(plugins.path());
        write_script_plugin(plugins.path());
    }
    write_bot(bot_dir.path());

    let config = EnvConfig {
        api_key: API_KEY.to_string(),
        port: 0,
        plugins_dir: plugins.path().to_path_buf(),
        data_dir: data.path().to_path_buf(),
        history_limit: 10,
    };
    let state = Arc::new(AppState::new(config).unwrap());

    Harness {
        app: bot_publisher::app(state.clone()),
        state,
        bot_dir,
        scratch,
        _plugins: plugins,
        _data: data,
    }
}

impl Harness {
    async fn send(&self, method: Method, uri: &str, body: Option<Value>, with_key: bool) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if with_key {
            builder = builder.header(API_KEY_HEADER, API_KEY);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None, false).await
    }

    async fn post(&self, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(Method::POST, uri, body, true).await
    }

    async fn open(&self, path: &Path) -> String {
        let (status, body) = self
            .post("/projects/open", Some(json!({ "path": path })))
            .await;
        assert_eq!(status, StatusCode::OK, "open failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    async fn publish(&self, project_id: &str, target: &str) -> Value {
        let (status, body) = self
            .post(
                &format!("/publish/{}/publish/{}", project_id, target),
                Some(json!({ "comment": "test publish" })),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "publish failed: {}", body);
        body["status"].clone()
    }

    async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// 通过 history 轮询插件记录，history 不会推进台账
    async fn wait_for_plugin(&self, project_id: &str, target: &str, expected: &str) {
        for _ in 0..250 {
            let (_, body) = self
                .get(&format!("/publish/{}/history/{}", project_id, target))
                .await;
            if body["history"][0]["status"] == expected {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("plugin never reported {} for {}", expected, target);
    }

    fn release(&self, outcome: &str) {
        std::fs::write(self.bot_dir.path().join("release"), outcome).unwrap();
    }

    fn scratch_path(&self, name: &str) -> PathBuf {
        self.scratch.path().join(name)
    }
}

#[tokio::test]
async fn test_types_are_listed_and_stable() {
    let h = harness(true);

    let (status, first) = h.get("/publish/types").await;
    assert_eq!(status, StatusCode::OK);
    let types = first["types"].as_array().unwrap();
    assert!(!types.is_empty());
    assert_eq!(types[0]["name"], "localpublish");
    assert_eq!(types[0]["features"]["rollback"], true);

    let (_, second) = h.get("/publish/types").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_status_of_unpublished_project() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    for target in ["default", "staging"] {
        let (status, body) = h.get(&format!("/publish/{}/status/{}", id, target)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["status"], "unpublished");
        assert_eq!(body["status"]["projectId"], id.as_str());
        assert_eq!(body["status"]["target"], target);
    }
}

#[tokio::test]
async fn test_history_and_rollback_rejected_before_first_publish() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    let (status, body) = h.get(&format!("/publish/{}/history/default", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no_history");

    let (status, body) = h.post(&format!("/publish/{}/rollback/default", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no_history");
}

#[tokio::test]
async fn test_saved_copy_does_not_inherit_history() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;
    h.publish(&id, "default").await;

    let copy_path = h.scratch_path("copy");
    let (status, body) = h
        .post(
            &format!("/projects/{}/save-as", id),
            Some(json!({ "storageId": "default", "path": copy_path })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let copy_id = body["id"].as_str().unwrap().to_string();
    assert_ne!(copy_id, id);

    let (status, body) = h.get(&format!("/projects/{}", copy_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["files"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f == "dialogs/greeting.dialog"));

    let (status, body) = h.get(&format!("/publish/{}/status/default", copy_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["status"], "unpublished");

    let (status, _) = h.get(&format!("/publish/{}/history/default", copy_id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = h.post(&format!("/publish/{}/rollback/default", copy_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 原项目的历史不受影响
    let (status, _) = h.get(&format!("/publish/{}/history/default", id)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_plugin_is_invalid_target() {
    let h = harness(false);
    let id = h.open(h.bot_dir.path()).await;

    let (status, body) = h.get("/publish/types").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["types"], json!([]));

    let (status, body) = h.get(&format!("/publish/{}/status/default", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_target");

    let (status, body) = h.get(&format!("/publish/{}/history/default", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_target");

    let (status, body) = h.post(&format!("/publish/{}/rollback/default", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_target");
}

#[tokio::test]
async fn test_target_type_without_plugin() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    let (status, body) = h.get(&format!("/publish/{}/status/azure", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_target");
    assert!(body["message"].as_str().unwrap().contains("azurePublish"));
}

#[tokio::test]
async fn test_publish_history_and_rollback() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    let first = h.publish(&id, "staging").await;
    assert_eq!(first["status"], "succeeded");
    assert_eq!(first["comment"], "test publish");
    let first_version = first["version"].as_str().unwrap().to_string();

    let (status, body) = h.get(&format!("/publish/{}/history/staging", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"].as_array().unwrap().len(), 1);

    let second = h.publish(&id, "staging").await;
    let second_version = second["version"].as_str().unwrap().to_string();
    assert_ne!(first_version, second_version);

    let (status, body) = h.post(&format!("/publish/{}/rollback/staging", id), None).await;
    assert_eq!(status, StatusCode::OK, "rollback failed: {}", body);
    assert_eq!(body["status"]["status"], "succeeded");
    assert_eq!(body["status"]["version"], first_version.as_str());

    let (_, body) = h.get(&format!("/publish/{}/status/staging", id)).await;
    assert_eq!(body["status"]["version"], first_version.as_str());

    // 其他目标仍未发布
    let (status, _) = h.get(&format!("/publish/{}/history/default", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rollback_to_explicit_version() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    let first = h.publish(&id, "default").await;
    h.publish(&id, "default").await;
    h.publish(&id, "default").await;

    let (status, body) = h
        .post(
            &format!("/publish/{}/rollback/default", id),
            Some(json!({ "version": first["version"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["version"], first["version"]);

    let (status, body) = h
        .post(
            &format!("/publish/{}/rollback/default", id),
            Some(json!({ "version": "no-such-version" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    // 回滚到已经生效的版本
    let (status, body) = h
        .post(
            &format!("/publish/{}/rollback/default", id),
            Some(json!({ "version": first["version"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn test_rollback_after_single_publish() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;
    let first = h.publish(&id, "default").await;

    let (status, body) = h.post(&format!("/publish/{}/rollback/default", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_state");

    // 仍停留在首次发布的版本
    let (status, body) = h.get(&format!("/publish/{}/status/default", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["version"], first["version"]);
}

#[tokio::test]
async fn test_publish_and_rollback_conflict_while_publishing() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    let running = h.publish(&id, "gated").await;
    assert_eq!(running["status"], "running");
    assert!(running["log"].as_str().unwrap().starts_with("/logs/"));

    let (status, body) = h
        .post(&format!("/publish/{}/publish/gated", id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = h
        .post(&format!("/publish/{}/rollback/gated", id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (_, body) = h.get("/health").await;
    assert_eq!(body["active_publishes"], 1);

    h.release("ok");
    h.wait_for_plugin(&id, "gated", "succeeded").await;
}

#[tokio::test]
async fn test_finished_script_publish_unblocks_next_publish() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    let first = h.publish(&id, "gated").await;
    h.release("ok");
    h.wait_for_plugin(&id, "gated", "succeeded").await;

    // 台账仍是 Publishing，新的发布会先向插件刷新状态
    assert_eq!(h.state.ledger.publishing_count().await, 1);
    let second = h.publish(&id, "gated").await;
    assert_ne!(second["version"], first["version"]);
    h.wait_for_plugin(&id, "gated", "succeeded").await;

    let (status, body) = h
        .post(&format!("/publish/{}/rollback/gated", id), None)
        .await;
    assert_eq!(status, StatusCode::OK, "rollback failed: {}", body);
    assert_eq!(body["status"]["version"], first["version"]);
}

#[tokio::test]
async fn test_rollback_after_only_failed_publish() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    h.publish(&id, "gated").await;
    h.release("fail");
    h.wait_for_plugin(&id, "gated", "failed").await;

    let (status, body) = h
        .post(&format!("/publish/{}/rollback/gated", id), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_state");
    assert_eq!(h.state.ledger.publishing_count().await, 0);
}

#[tokio::test]
async fn test_log_stream_available_after_publish_finishes() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;
    h.release("ok");

    let record = h.publish(&id, "gated").await;
    h.wait_for_plugin(&id, "gated", "succeeded").await;

    let log_url = record["log"].as_str().unwrap().to_string();
    let (status, body) = h.get_text(&log_url).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: complete"));

    let (status, _) = h.get_text("/logs/no-such-log/stream").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mutations_require_api_key() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    let (status, body) = h
        .send(Method::POST, &format!("/publish/{}/publish/default", id), None, false)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = h
        .send(Method::POST, &format!("/publish/{}/rollback/default", id), None, false)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(h.state.ledger.count().await, 0);
}

#[tokio::test]
async fn test_unknown_project_and_target() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;

    let (status, body) = h.get("/publish/no-such-project/status/default").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = h.get(&format!("/publish/{}/status/missing", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = h.get(&format!("/publish/{}/status/a%20b", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_open_is_stable_and_save_as_rejects_occupied_location() {
    let h = harness(true);
    let id = h.open(h.bot_dir.path()).await;
    assert_eq!(h.open(h.bot_dir.path()).await, id);

    let occupied = h.scratch_path("occupied");
    std::fs::create_dir_all(&occupied).unwrap();
    std::fs::write(occupied.join("keep.txt"), "x").unwrap();

    let (status, body) = h
        .post(&format!("/projects/{}/save-as", id), Some(json!({ "path": occupied })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_health_and_errors() {
    let h = harness(true);

    let (status, body) = h.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "bot-publisher");
    assert_eq!(body["target_types"], json!(["localpublish", "shell"]));
    assert_eq!(body["has_error"], false);

    h.state
        .errors
        .report(bot_publisher::state::error_channel::ErrorSource::Task, "disk full");

    let (status, body) = h.get("/errors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current"]["message"], "disk full");

    let (status, body) = h.post("/errors/ack", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);

    let (_, body) = h.get("/errors").await;
    assert_eq!(body["current"], Value::Null);
}
