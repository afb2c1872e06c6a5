use super::*;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(attempts: u32) -> EmbeddingConfig {
    EmbeddingConfig {
        api_key: Some("test-key".to_string()),
        model: "text-embedding-004".to_string(),
        dimension: 4,
        timeout_secs: 5,
        retry_attempts: attempts,
    }
}

#[test]
fn missing_api_key_is_a_config_error() {
    let config = EmbeddingConfig {
        api_key: None,
        ..EmbeddingConfig::default()
    };
    assert!(GeminiClient::new(&config).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_parses_response_vector() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:embedContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": { "values": [0.1, 0.2, 0.3, 0.4] }
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&test_config(1))
        .expect("can create client")
        .with_base_url(server.uri().parse().expect("mock server URL is valid"));

    let vector = client.embed("some text").await.expect("embed succeeds");
    assert_eq!(vector, vec![0.1, 0.2, 0.3, 0.4]);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_error_is_rejected_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&test_config(3))
        .expect("can create client")
        .with_base_url(server.uri().parse().expect("mock server URL is valid"));

    let result = client.embed("bad input").await;
    assert!(matches!(result, Err(EmbeddingError::Rejected(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_maps_to_unreachable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&test_config(1))
        .expect("can create client")
        .with_base_url(server.uri().parse().expect("mock server URL is valid"));

    let result = client.embed("text").await;
    assert!(matches!(result, Err(EmbeddingError::Unreachable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn dimension_mismatch_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": { "values": [0.1, 0.2] }
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::new(&test_config(1))
        .expect("can create client")
        .with_base_url(server.uri().parse().expect("mock server URL is valid"));

    let result = client.embed("text").await;
    assert!(matches!(result, Err(EmbeddingError::Rejected(_))));
}
