//! Sequential per-record fan-out to the ingestion boundary.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

/// Upper bound on one outbound request, connection setup included.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Dispatcher {
    client: reqwest::Client,
    endpoint: String,
    post_token: String,
}

impl Dispatcher {
    pub fn new(endpoint: String, post_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            post_token,
        })
    }

    /// Send every record of one decoded batch, in order. A failed record
    /// (transport error or non-success response) is logged and skipped; it
    /// never aborts the rest of the batch. At most one attempt per record.
    pub async fn dispatch_batch(&self, records: &[Value]) {
        let total = records.len();
        for (i, record) in records.iter().enumerate() {
            info!("processing match {} of {}", i + 1, total);
            if let Err(e) = self.send_record(record).await {
                error!("error posting match {} of {}: {e:#}", i + 1, total);
            }
        }
        info!("all matches processed");
    }

    async fn send_record(&self, record: &Value) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .bearer_auth(&self.post_token)
            .json(record)
            .send()
            .await
            .context("dispatch request failed")?
            .error_for_status()
            .context("dispatch rejected")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Received(Arc<Mutex<Vec<i64>>>);

    async fn ingest(State(received): State<Received>, Json(record): Json<Value>) -> StatusCode {
        let id = record["fixture"]["id"].as_i64().unwrap_or(-1);
        received.0.lock().push(id);
        if id == 1 {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::CREATED
        }
    }

    async fn spawn_boundary(received: Received) -> String {
        let app = Router::new()
            .route("/fixtures", post(ingest))
            .with_state(received);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}/fixtures")
    }

    #[tokio::test]
    async fn failed_record_does_not_abort_the_batch() {
        let received = Received::default();
        let endpoint = spawn_boundary(received.clone()).await;

        let dispatcher = Dispatcher::new(endpoint, "secret".to_string()).expect("dispatcher");
        // The boundary rejects fixture id 1 with a 500.
        let batch = vec![
            json!({"fixture": {"id": 1}}),
            json!({"fixture": {"id": 2}}),
        ];
        dispatcher.dispatch_batch(&batch).await;

        assert_eq!(*received.0.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn unreachable_boundary_still_drains_the_batch() {
        // Nothing listens on this port; every send fails fast with a
        // connection error and the loop must still visit every record.
        let dispatcher = Dispatcher::new(
            "http://127.0.0.1:1/fixtures".to_string(),
            "secret".to_string(),
        )
        .expect("dispatcher");

        let batch = vec![json!({"fixture": {"id": 1}}), json!({"fixture": {"id": 2}})];
        dispatcher.dispatch_batch(&batch).await;
    }
}
