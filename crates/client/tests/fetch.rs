use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use solmap_client::{build_snapshot, fetch_snapshot, ClientError, Fetcher, VeociClient};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

type Route = dyn Fn(&str, bool) -> (u16, Value) + Send + Sync;

/// Minimal HTTP/1.1 responder: one request per connection, JSON bodies only
async fn serve(route: Arc<Route>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let route = route.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf).to_string();
                let target = request.split_whitespace().nth(1).unwrap_or("/");
                let path = target.split('?').next().unwrap_or(target);
                let authorized = request
                    .to_ascii_lowercase()
                    .contains("authorization: bearer secret");

                let (status, body) = route(path, authorized);
                let body = body.to_string();
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

fn platform(path: &str, authorized: bool) -> (u16, Value) {
    if !authorized {
        return (401, json!({"error": "unauthorized"}));
    }
    match path {
        "/api/v2/forms" => (
            200,
            json!([{"id": 1, "name": "Incident"}, {"id": 2, "name": "Location"}]),
        ),
        "/api/v2/workflows" => (200, json!({"items": [{"processId": "wf-1", "name": "Escalation"}]})),
        "/api/v2/forms/1" => (
            200,
            json!({
                "id": 1,
                "name": "Incident",
                "fields": {
                    "10": {"name": "Site", "fieldType": "LOOKUP", "sourceFormId": 2},
                    "11": {"name": "Shared", "fieldType": "REFERENCE", "sourceFormId": 77},
                    "12": {"name": "Gone", "fieldType": "REFERENCE", "sourceFormId": 88},
                    "13": {"name": "Run", "fieldType": "WORKFLOW", "properties": {"processId": "wf-1"}}
                }
            }),
        ),
        "/api/v2/forms/2" => (500, json!({"error": "boom"})),
        "/api/v2/forms/77" => (200, json!({"id": 77, "name": "Shared Lookup", "containerId": 9})),
        _ => (404, json!({"error": "not found"})),
    }
}

#[tokio::test]
async fn fetches_definitions_with_fallback_and_external_forms() {
    let base = serve(Arc::new(platform)).await;
    let client = VeociClient::new("secret", &base).unwrap();

    let (fetched, snapshot) = fetch_snapshot(client, "room-1", 2).await.unwrap();

    assert_eq!(fetched.container_id, "room-1");
    assert_eq!(fetched.forms.len(), 2);
    assert_eq!(fetched.workflows.len(), 1);
    assert_eq!(fetched.form_definitions.len(), 2);
    assert!(fetched.form_definitions[0].get("fields").is_some());
    // 500 on the definition keeps the list entry
    assert_eq!(fetched.form_definitions[1], fetched.forms[1]);

    // 88 is 404 and skipped
    assert_eq!(fetched.external_forms.len(), 1);
    assert_eq!(fetched.external_forms[0]["id"], json!(77));
    assert_eq!(fetched.external_forms[0]["external"], json!(true));

    assert_eq!(snapshot.references.len(), 4);
    assert_eq!(snapshot, build_snapshot(&fetched));
}

#[tokio::test]
async fn rejected_token_is_an_authentication_error() {
    let base = serve(Arc::new(platform)).await;
    let client = VeociClient::new("wrong", &base).unwrap();

    let err = Fetcher::new(client, 5)
        .fetch_solution("room-1")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Authentication(_)), "{err}");
}

#[tokio::test]
async fn missing_definition_is_not_found() {
    let base = serve(Arc::new(platform)).await;
    let client = VeociClient::new("secret", &base).unwrap();

    let err = Fetcher::new(client, 1)
        .form_definition("404")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)), "{err}");
}
