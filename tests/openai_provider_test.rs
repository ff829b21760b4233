//! Integration tests for the OpenAI and OpenAI-compatible clients against a mock server.

mod common;

use gitscribe::config::Task;
use gitscribe::error::LlmError;
use gitscribe::llm::{InvokeOptions, ProviderId};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    ReleaseNotes, engine, openai_completion, profile, release_schema, request_bodies,
    single_profile_config, v1,
};

#[tokio::test]
async fn test_gpt5_recovers_after_transient_failures_without_temperature() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("feat: add x")))
        .mount(&server)
        .await;

    let mut gpt5 = profile(ProviderId::OpenAi, "gpt-5.2", v1(&server));
    gpt5.temperature = Some(0.7);
    gpt5.api_key = Some("sk-test".to_string());
    let engine = engine(single_profile_config(gpt5, 3));

    let text = engine
        .invoke_text(
            Task::Commit,
            "diff --git a/x b/x",
            &InvokeOptions::default().with_temperature(0.2),
        )
        .await
        .unwrap();
    assert_eq!(text, "feat: add x");

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 3);
    for body in &bodies {
        assert_eq!(body["model"], "gpt-5.2");
        assert!(body.get("temperature").is_none(), "temperature sent: {body}");
    }
}

#[tokio::test]
async fn test_non_gpt5_model_sends_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("ok")))
        .mount(&server)
        .await;

    let mut gpt4 = profile(ProviderId::OpenAi, "gpt-4o", v1(&server));
    gpt4.api_key = Some("sk-test".to_string());
    gpt4.max_tokens = Some(300);
    engine(single_profile_config(gpt4, 1))
        .invoke_text(Task::Pr, "describe", &InvokeOptions::default())
        .await
        .unwrap();

    let body = &request_bodies(&server).await[0];
    assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    assert_eq!(body["max_completion_tokens"], 300);
}

#[tokio::test]
async fn test_exhausted_retries_surface_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .expect(2)
        .mount(&server)
        .await;

    let mut openai = profile(ProviderId::OpenAi, "gpt-4o", v1(&server));
    openai.api_key = Some("sk-test".to_string());
    let err = engine(single_profile_config(openai, 2))
        .invoke_text(Task::Branch, "name it", &InvokeOptions::default())
        .await
        .unwrap_err();

    match err {
        LlmError::InvocationFailed {
            task,
            attempts,
            last_error,
        } => {
            assert_eq!(task, "branch");
            assert_eq!(attempts, 2);
            assert!(last_error.contains("429"));
            assert!(last_error.contains("rate limited"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_native_structured_output_uses_json_schema_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion(
            r#"{"title":"v1.2.0","notes":"Faster startup"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut openai = profile(ProviderId::OpenAi, "gpt-4o", v1(&server));
    openai.api_key = Some("sk-test".to_string());
    let notes: ReleaseNotes = engine(single_profile_config(openai, 1))
        .invoke_structured(
            Task::Release,
            "Summarize the release",
            &release_schema(),
            &InvokeOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(notes.title, "v1.2.0");

    let body = &request_bodies(&server).await[0];
    assert_eq!(body["response_format"]["type"], "json_schema");
    assert_eq!(body["response_format"]["json_schema"]["name"], "release_notes");
    assert_eq!(body["response_format"]["json_schema"]["strict"], true);
}

#[tokio::test]
async fn test_schema_rejection_escalates_to_text_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "Invalid schema for response_format 'release_notes': 'format' is not permitted.",
                "type": "invalid_request_error"
            }
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion(
            "Here you go:\n```json\n{\"title\":\"v2.0.0\",\"notes\":\"Breaking\"}\n```",
        )))
        .mount(&server)
        .await;

    let mut openai = profile(ProviderId::OpenAi, "gpt-4o", v1(&server));
    openai.api_key = Some("sk-test".to_string());
    let notes: ReleaseNotes = engine(single_profile_config(openai, 1))
        .invoke_structured(
            Task::Release,
            "Summarize the release",
            &release_schema(),
            &InvokeOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(notes.title, "v2.0.0");

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert!(bodies[0].get("response_format").is_some());
    assert!(bodies[1].get("response_format").is_none());
    let prompt = bodies[1]["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.starts_with("Summarize the release"));
    assert!(prompt.contains("## Output format"));
}

#[tokio::test]
async fn test_custom_compatible_endpoint_needs_no_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("x-team", "platform"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("docs: readme")))
        .expect(1)
        .mount(&server)
        .await;

    let mut custom = profile(
        ProviderId::CustomOpenAiCompatible,
        "qwen2.5-coder",
        format!("{}/v1/", server.uri()),
    );
    custom
        .custom_headers
        .insert("X-Team".to_string(), "platform".to_string());
    custom.max_tokens = Some(128);

    let text = engine(single_profile_config(custom, 1))
        .invoke_text(Task::Commit, "diff", &InvokeOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "docs: readme");

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["max_tokens"], 128);
}

#[tokio::test]
async fn test_profile_authorization_header_does_not_duplicate_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("fix: typo")))
        .expect(1)
        .mount(&server)
        .await;

    let mut gpt = profile(ProviderId::OpenAi, "gpt-4o", v1(&server));
    gpt.api_key = Some("sk-test".to_string());
    gpt.custom_headers
        .insert("Authorization".to_string(), "Bearer stale".to_string());

    let text = engine(single_profile_config(gpt, 1))
        .invoke_text(Task::Commit, "diff", &InvokeOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "fix: typo");

    let requests = server.received_requests().await.unwrap();
    let auth: Vec<_> = requests[0].headers.get_all("authorization").iter().collect();
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0], "Bearer sk-test");
}
