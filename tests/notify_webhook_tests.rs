//! Webhook delivery tests against a mock receiver.

use std::time::Duration;

use adgate::models::permission_grant::CapabilitySet;
use adgate::notify::{GovernanceEvent, Notifier, SIGNATURE_HEADER, WebhookNotifier, sign_payload};
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn wait_for_requests(server: &MockServer, expected: usize) -> Vec<Request> {
    for _ in 0..50 {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= expected {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    server.received_requests().await.unwrap_or_default()
}

fn notifier(server: &MockServer, secret: Option<&str>) -> WebhookNotifier {
    let url = Url::parse(&format!("{}/hooks/adgate", server.uri())).unwrap();
    WebhookNotifier::new(url, secret.map(str::to_string), Duration::from_secs(2)).unwrap()
}

fn grant_event(tenant_id: Uuid) -> GovernanceEvent {
    GovernanceEvent::GrantAssigned {
        tenant_id,
        advertiser_account_id: "123-456-7890".to_string(),
        capabilities: CapabilitySet {
            read: true,
            write: false,
            admin: false,
        },
        actor_id: None,
    }
}

#[tokio::test]
async fn delivers_signed_json_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/adgate"))
        .and(header("X-Adgate-Event", "grant_assigned"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let tenant = Uuid::new_v4();
    notifier(&server, Some("hook-secret")).notify(grant_event(tenant));

    let received = wait_for_requests(&server, 1).await;
    assert_eq!(received.len(), 1);
    let request = &received[0];

    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["event"], "grant_assigned");
    assert_eq!(body["tenant_id"], tenant.to_string());
    assert_eq!(body["capabilities"]["read"], true);

    let signature = request
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap();
    assert_eq!(signature, sign_payload("hook-secret", &request.body));
}

#[tokio::test]
async fn unsigned_when_no_secret_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    notifier(&server, None).notify(GovernanceEvent::GrantsRevoked {
        advertiser_account_id: "123-456-7890".to_string(),
        tenant_ids: vec![Uuid::new_v4()],
        actor_id: None,
    });

    let received = wait_for_requests(&server, 1).await;
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get(SIGNATURE_HEADER).is_none());
}

#[tokio::test]
async fn receiver_errors_are_swallowed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sink = notifier(&server, Some("s"));
    sink.notify(grant_event(Uuid::new_v4()));
    sink.notify(grant_event(Uuid::new_v4()));

    // Both attempts reach the receiver; neither failure propagates.
    assert_eq!(wait_for_requests(&server, 2).await.len(), 2);
}
