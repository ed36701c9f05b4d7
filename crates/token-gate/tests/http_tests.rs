//! HTTP host integration tests.
//!
//! Drives the router with `tower::ServiceExt::oneshot` against a mocked
//! key-set endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use gate_test_utils::{TestJwksServer, TestSigningKey, TestTokenBuilder, TEST_AUDIENCE};
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use token_gate::config::Config;
use token_gate::gate::TokenGate;
use token_gate::routes::{build_routes, AppState};
use tower::ServiceExt;

const METHOD_ARN: &str = "arn:aws:execute-api:us-east-1:123456789012:abcdef123/prod/POST/orders";

fn app_for(server: &TestJwksServer) -> Router {
    let vars = HashMap::from([
        ("AWS_REGION".to_string(), "us-east-1".to_string()),
        ("USERPOOL_ID".to_string(), "us-east-1_TestPool".to_string()),
        ("APP_CLIENT_ID".to_string(), TEST_AUDIENCE.to_string()),
        ("JWKS_URL".to_string(), server.jwks_url()),
    ]);
    let config = Config::from_vars(&vars).expect("test config should load");
    let gate = Arc::new(TokenGate::from_config(&config));

    // A recorder that is never installed globally, so tests don't collide
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

    build_routes(Arc::new(AppState { gate, config }), metrics_handle)
}

fn authorize_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/authorize")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builder should succeed")
}

async fn body_json(response: axum::response::Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn test_authorize_returns_allow_decision() -> Result<()> {
    let key = TestSigningKey::rsa("rsa-1")?;
    let server = TestJwksServer::start(&[&key]).await;
    let app = app_for(&server);

    let token = key.sign(&TestTokenBuilder::new().for_user("user-42").build());
    let response = app
        .oneshot(authorize_request(&json!({
            "type": "TOKEN",
            "authorizationToken": token,
            "methodArn": METHOD_ARN
        })))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(
        body,
        json!({
            "principalId": "user-42",
            "policyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Action": "execute-api:Invoke",
                    "Effect": "Allow",
                    "Resource": METHOD_ARN
                }]
            }
        })
    );

    Ok(())
}

#[tokio::test]
async fn test_authorize_accepts_bearer_prefix() -> Result<()> {
    let key = TestSigningKey::ed25519(3, "ed-1")?;
    let server = TestJwksServer::start(&[&key]).await;
    let app = app_for(&server);

    let token = key.sign(&TestTokenBuilder::new().build());
    let response = app
        .oneshot(authorize_request(&json!({
            "authorizationToken": format!("Bearer {}", token),
            "methodArn": METHOD_ARN
        })))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_rejections_share_one_response_shape() -> Result<()> {
    let key = TestSigningKey::rsa("rsa-1")?;
    let server = TestJwksServer::start(&[&key]).await;
    let app = app_for(&server);

    let tokens = [
        key.sign(&TestTokenBuilder::new().expires_in(-60).build()),
        key.sign(&TestTokenBuilder::new().with_audience("other").build()),
        TestSigningKey::rsa_alternate("rsa-1")?.sign(&TestTokenBuilder::new().build()),
        "garbage".to_string(),
    ];

    for token in tokens {
        let response = app
            .clone()
            .oneshot(authorize_request(&json!({
                "authorizationToken": token,
                "methodArn": METHOD_ARN
            })))
            .await?;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get("WWW-Authenticate")
                .and_then(|v| v.to_str().ok()),
            Some("Bearer error=\"invalid_token\"")
        );
        let body = body_json(response).await?;
        assert_eq!(body, json!({ "message": "Unauthorized" }));
    }

    Ok(())
}

#[tokio::test]
async fn test_key_set_outage_returns_503() -> Result<()> {
    let key = TestSigningKey::rsa("rsa-1")?;
    let server = TestJwksServer::start(&[&key]).await;
    server.serve_status(502).await;
    let app = app_for(&server);

    let token = key.sign(&TestTokenBuilder::new().build());
    let response = app
        .oneshot(authorize_request(&json!({
            "authorizationToken": token,
            "methodArn": METHOD_ARN
        })))
        .await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().get("WWW-Authenticate").is_none());

    Ok(())
}

#[tokio::test]
async fn test_authorize_rejects_incomplete_event() -> Result<()> {
    let key = TestSigningKey::rsa("rsa-1")?;
    let server = TestJwksServer::start(&[&key]).await;
    let app = app_for(&server);

    let response = app
        .oneshot(authorize_request(&json!({ "authorizationToken": "a.b.c" })))
        .await?;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(server.request_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_health_returns_ok() -> Result<()> {
    let server = TestJwksServer::start(&[]).await;
    let app = app_for(&server);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await?.to_bytes();
    assert_eq!(bytes.as_ref(), b"OK");

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_served() -> Result<()> {
    let server = TestJwksServer::start(&[]).await;
    let app = app_for(&server);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_404() -> Result<()> {
    let server = TestJwksServer::start(&[]).await;
    let app = app_for(&server);

    let response = app
        .oneshot(Request::builder().uri("/v2/authorize").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}
