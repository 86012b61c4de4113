//! Rate limiting integration tests.
//!
//! The limiter runs ahead of authentication: a rejected request must not
//! cost a key-set fetch or a downstream call.

use futures::future::join_all;
use gateway_test_utils::{MockJwks, TestGatewayServer, TestKeypair, TestTokenBuilder};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    key: TestKeypair,
    jwks: MockJwks,
    transactions: MockServer,
    server: TestGatewayServer,
}

/// Gateway with a two-request burst that effectively never refills.
async fn fixture(expected_downstream_calls: u64) -> Result<Fixture, anyhow::Error> {
    let key = TestKeypair::new(11, "rl-key");
    let jwks = MockJwks::start(&[&key]).await;
    let transactions = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/banking/users/u1/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(expected_downstream_calls)
        .mount(&transactions)
        .await;

    let mut vars = jwks.gateway_vars();
    vars.insert("TRANSACTION_SERVICE_URL".to_string(), transactions.uri());
    vars.insert("RATE_LIMIT_RPS".to_string(), "0.001".to_string());
    vars.insert("RATE_LIMIT_BURST".to_string(), "2".to_string());
    let server = TestGatewayServer::spawn(vars).await?;

    Ok(Fixture {
        key,
        jwks,
        transactions,
        server,
    })
}

fn summary_url(server: &TestGatewayServer) -> String {
    format!("{}/v1/dashboard/users/u1/summary", server.url())
}

#[tokio::test]
async fn test_burst_then_too_many_requests() -> Result<(), anyhow::Error> {
    let f = fixture(2).await?;
    let client = reqwest::Client::new();
    let token = f.key.sign(&TestTokenBuilder::new().build());

    for _ in 0..2 {
        let response = client
            .get(summary_url(&f.server))
            .bearer_auth(&token)
            .header("x-user-id", "alice")
            .send()
            .await?;
        assert_eq!(response.status(), 200);
    }

    let response = client
        .get(summary_url(&f.server))
        .bearer_auth(&token)
        .header("x-user-id", "alice")
        .send()
        .await?;

    assert_eq!(response.status(), 429);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    assert!(retry_after >= 1);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    Ok(())
}

/// A request rejected by the limiter is never authenticated, even when its
/// credential is garbage.
#[tokio::test]
async fn test_rejection_happens_before_verification() -> Result<(), anyhow::Error> {
    let f = fixture(0).await?;
    let client = reqwest::Client::new();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let response = client
            .get(summary_url(&f.server))
            .header("authorization", "Bearer not-a-jwt")
            .header("x-user-id", "bob")
            .send()
            .await?;
        statuses.push(response.status().as_u16());
    }

    assert_eq!(statuses, vec![401, 401, 429]);
    assert_eq!(f.jwks.fetch_count().await, 0);
    assert!(f
        .transactions
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());

    Ok(())
}

#[tokio::test]
async fn test_identity_hints_have_separate_buckets() -> Result<(), anyhow::Error> {
    let f = fixture(0).await?;
    let client = reqwest::Client::new();

    for user in ["carol", "dave"] {
        for _ in 0..2 {
            let response = client
                .get(summary_url(&f.server))
                .header("x-user-id", user)
                .send()
                .await?;
            assert_eq!(response.status(), 401, "{user} should still be admitted");
        }
    }

    assert_eq!(f.server.rate_limiter().len(), 2);
    Ok(())
}

/// Without a hint, all requests from one peer share its address bucket.
#[tokio::test]
async fn test_peer_address_bucket_without_hint() -> Result<(), anyhow::Error> {
    let f = fixture(0).await?;
    let client = reqwest::Client::new();

    let responses = join_all((0..5).map(|_| client.get(summary_url(&f.server)).send())).await;

    let mut rejected = 0;
    for response in responses {
        if response?.status() == 429 {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 3);
    assert_eq!(f.server.rate_limiter().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_health_and_metrics_are_exempt() -> Result<(), anyhow::Error> {
    let f = fixture(0).await?;
    let client = reqwest::Client::new();

    for _ in 0..10 {
        let response = client
            .get(format!("{}/healthz", f.server.url()))
            .header("x-user-id", "eve")
            .send()
            .await?;
        assert_eq!(response.status(), 200);

        let response = client
            .get(format!("{}/metrics", f.server.url()))
            .send()
            .await?;
        assert_eq!(response.status(), 200);
    }

    assert!(f.server.rate_limiter().is_empty());
    Ok(())
}
