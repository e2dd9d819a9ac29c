use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use llm_checkpoint_core::report::{render_turn, OutputFormat};
use llm_checkpoint_core::{
    AirsScanClient, CompletionClient, CompletionError, Orchestrator, Outcome, Region, ScanAction,
    ScanClient, ScanError, ScanRole, ScanSettings, UpstreamErrorKind,
};
use serde_json::json;

struct FixedCompleter(&'static str);

#[async_trait]
impl CompletionClient for FixedCompleter {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Ok(self.0.to_string())
    }
}

fn settings(endpoint: String) -> ScanSettings {
    ScanSettings {
        api_key: "pan-key".into(),
        profile_name: "chatbot-profile".into(),
        region: Region::Us,
        endpoint: Some(endpoint),
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn posts_prompt_with_token_and_profile() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/scan/sync/request")
                .header("x-pan-token", "pan-key")
                .json_body(json!({
                    "tr_id": "tx-100",
                    "ai_profile": {"profile_name": "chatbot-profile"},
                    "contents": [{"prompt": "What is the capital of France?"}]
                }));
            then.status(200).json_body(json!({
                "category": "benign",
                "action": "allow",
                "tr_id": "tx-100",
                "scan_id": "scan-1",
                "prompt_detected": {"injection": false, "dlp": false}
            }));
        })
        .await;

    let client = AirsScanClient::new(&settings(server.base_url())).unwrap();
    let verdict = client
        .scan("What is the capital of France?", ScanRole::Prompt, "tx-100")
        .await
        .unwrap();

    assert_eq!(verdict.category, "benign");
    assert_eq!(verdict.action, ScanAction::Allow);
    assert_eq!(verdict.transaction_id, "tx-100");
    assert_eq!(verdict.scan_id.as_deref(), Some("scan-1"));
    assert!(verdict.detections.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn response_scans_use_the_response_key() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/scan/sync/request")
                .json_body_partial(r#"{"contents":[{"response":"Paris."}]}"#);
            then.status(200).json_body(json!({
                "category": "malicious",
                "action": "block",
                "response_detected": {"dlp": true, "url_cats": false}
            }));
        })
        .await;

    let client = AirsScanClient::new(&settings(server.base_url())).unwrap();
    let verdict = client
        .scan("Paris.", ScanRole::Response, "tx-101")
        .await
        .unwrap();

    assert_eq!(verdict.action, ScanAction::Block);
    assert_eq!(verdict.detections, vec!["dlp"]);
    mock.assert_async().await;
}

#[tokio::test]
async fn unauthorized_and_forbidden_are_auth_errors() {
    for status in [401u16, 403] {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/scan/sync/request");
                then.status(status).body("invalid token");
            })
            .await;

        let client = AirsScanClient::new(&settings(server.base_url())).unwrap();
        let err = client
            .scan("hello", ScanRole::Prompt, "tx")
            .await
            .unwrap_err();
        assert!(
            matches!(err, ScanError::Auth { status: s, .. } if s == status),
            "status {status} gave {err:?}"
        );
        assert_eq!(err.kind(), UpstreamErrorKind::ScanAuth);
    }
}

#[tokio::test]
async fn server_errors_are_unavailable_and_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/scan/sync/request");
            then.status(502).body("bad gateway");
        })
        .await;

    let client = AirsScanClient::new(&settings(server.base_url())).unwrap();
    let err = client
        .scan("hello", ScanRole::Prompt, "tx")
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Unavailable { .. }));
    assert!(err.to_string().contains("502"));
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn malformed_body_is_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/scan/sync/request");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    let client = AirsScanClient::new(&settings(server.base_url())).unwrap();
    let err = client
        .scan("hello", ScanRole::Prompt, "tx")
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Unavailable { .. }));
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/scan/sync/request");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(json!({"category": "benign", "action": "allow"}));
        })
        .await;

    let mut settings = settings(server.base_url());
    settings.timeout = Duration::from_millis(200);
    let client = AirsScanClient::new(&settings).unwrap();
    let err = client
        .scan("hello", ScanRole::Prompt, "tx")
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Unavailable { ref reason } if reason.contains("timed out")));
}

#[tokio::test]
async fn empty_text_never_hits_the_network() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/scan/sync/request");
            then.status(200)
                .json_body(json!({"category": "benign", "action": "allow"}));
        })
        .await;

    let client = AirsScanClient::new(&settings(server.base_url())).unwrap();
    let err = client
        .scan("  ", ScanRole::Prompt, "tx")
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::EmptyText));
    mock.assert_hits_async(0).await;
}

#[test]
fn region_selects_base_url() {
    let mut eu = settings(String::new());
    eu.endpoint = None;
    eu.region = Region::Eu;
    let client = AirsScanClient::new(&eu).unwrap();
    assert_eq!(
        client.url(),
        "https://service-de.api.aisecurity.paloaltonetworks.com/v1/scan/sync/request"
    );
}

#[tokio::test]
async fn masked_echo_of_withheld_response_stays_out_of_the_report() {
    const LEAK: &str = "Customer card 4111-1111-1111-1111 ships to 12 Secret Lane";
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/scan/sync/request")
                .json_body_partial(json!({"contents": [{"prompt": "where is my order?"}]}).to_string());
            then.status(200)
                .json_body(json!({"category": "benign", "action": "allow"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/scan/sync/request")
                .json_body_partial(json!({"contents": [{"response": LEAK}]}).to_string());
            then.status(200).json_body(json!({
                "category": "malicious",
                "action": "block",
                "response_detected": {"dlp": true},
                "response_masked_data": {"data": LEAK}
            }));
        })
        .await;

    let scanner = AirsScanClient::new(&settings(server.base_url())).unwrap();
    let orchestrator = Orchestrator::new(Arc::new(scanner), Arc::new(FixedCompleter(LEAK)));
    let report = orchestrator.run("where is my order?").await.unwrap();

    assert_eq!(
        report.outcome,
        Outcome::BlockedOutput {
            reason: "Data Loss Prevention".into()
        }
    );
    let json = render_turn(&report, OutputFormat::Json).unwrap();
    assert!(!json.contains("12 Secret Lane"), "{json}");
    let human = render_turn(&report, OutputFormat::Human).unwrap();
    assert!(!human.contains("12 Secret Lane"));
    assert!(!format!("{report:?}").contains("12 Secret Lane"));
}
