//! Integration tests for the Anthropic Messages client.

mod common;

use gitscribe::config::Task;
use gitscribe::error::LlmError;
use gitscribe::llm::{InvokeOptions, ProviderId};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{ReleaseNotes, engine, profile, release_schema, request_bodies, single_profile_config, v1};

#[tokio::test]
async fn test_text_call_sends_version_and_key_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "feature/login-form"}],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut claude = profile(ProviderId::Anthropic, "claude-sonnet-4-5", v1(&server));
    claude.api_key = Some("sk-ant".to_string());
    let text = engine(single_profile_config(claude, 1))
        .invoke_text(
            Task::Branch,
            "name a branch",
            &InvokeOptions::default().with_system_prompt("Reply with a branch name."),
        )
        .await
        .unwrap();
    assert_eq!(text, "feature/login-form");

    let body = &request_bodies(&server).await[0];
    assert_eq!(body["system"], "Reply with a branch name.");
    assert_eq!(body["messages"][0]["role"], "user");
    assert!(body.get("tools").is_none());
}

#[tokio::test]
async fn test_structured_call_forces_tool_use() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{
                "type": "tool_use",
                "id": "toolu_1",
                "name": "release_notes",
                "input": {"title": "v3.1.0", "notes": "Bug fixes"}
            }],
            "stop_reason": "tool_use"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut claude = profile(ProviderId::Anthropic, "claude-sonnet-4-5", v1(&server));
    claude.api_key = Some("sk-ant".to_string());
    let notes: ReleaseNotes = engine(single_profile_config(claude, 1))
        .invoke_structured(
            Task::Release,
            "notes",
            &release_schema(),
            &InvokeOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(notes.title, "v3.1.0");

    let body = &request_bodies(&server).await[0];
    assert_eq!(body["tools"][0]["name"], "release_notes");
    assert_eq!(body["tools"][0]["input_schema"]["required"][1], "notes");
    assert_eq!(body["tool_choice"]["type"], "tool");
    assert_eq!(body["tool_choice"]["name"], "release_notes");
}

#[tokio::test]
async fn test_missing_key_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut claude = profile(ProviderId::Anthropic, "claude-sonnet-4-5", v1(&server));
    claude.api_key_env = None;
    let err = engine(single_profile_config(claude, 3))
        .invoke_text(Task::Commit, "diff", &InvokeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LlmError::MissingCredential {
            provider: ProviderId::Anthropic,
            ..
        }
    ));
    assert!(err.is_configuration_issue());
}

#[tokio::test]
async fn test_profile_headers_cannot_duplicate_version_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "chore: bump deps"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut claude = profile(ProviderId::Anthropic, "claude-sonnet-4-5", v1(&server));
    claude.api_key = Some("sk-ant".to_string());
    claude
        .custom_headers
        .insert("Anthropic-Version".to_string(), "2022-01-01".to_string());
    claude
        .custom_headers
        .insert("X-Team".to_string(), "platform".to_string());

    engine(single_profile_config(claude, 1))
        .invoke_text(Task::Commit, "diff", &InvokeOptions::default())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let versions: Vec<_> = requests[0]
        .headers
        .get_all("anthropic-version")
        .iter()
        .collect();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0], "2023-06-01");
    assert_eq!(requests[0].headers.get("x-team").unwrap(), "platform");
}
