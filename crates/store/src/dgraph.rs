use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use extract::Upsert;

use crate::error::StoreError;
use crate::{GraphStore, Transaction};

/// Dgraph over its HTTP API.
#[derive(Clone)]
pub struct DgraphClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct DgraphResponse {
    #[serde(default)]
    errors: Vec<DgraphError>,
    #[serde(default)]
    extensions: Option<Extensions>,
}

#[derive(Deserialize)]
struct DgraphError {
    message: String,
}

#[derive(Deserialize)]
struct Extensions {
    #[serde(default)]
    txn: Option<TxnContext>,
}

#[derive(Deserialize)]
struct TxnContext {
    start_ts: u64,
}

impl DgraphResponse {
    fn into_result(self) -> Result<Option<u64>, (Option<u64>, StoreError)> {
        let start_ts = self
            .extensions
            .and_then(|e| e.txn)
            .map(|t| t.start_ts);
        if self.errors.is_empty() {
            return Ok(start_ts);
        }
        let message = self
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        Err((start_ts, StoreError::Rejected(message)))
    }
}

impl DgraphClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: String,
    ) -> Result<DgraphResponse, StoreError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl GraphStore for DgraphClient {
    async fn alter_schema(&self, schema: &str) -> Result<(), StoreError> {
        let url = format!("{}/alter", self.base_url);
        let response = self.post(&url, "application/dql", schema.to_string()).await?;
        response.into_result().map_err(|(_, e)| e)?;

        info!(url = %self.base_url, "Graph schema applied");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn begin(&self) -> Box<dyn Transaction + '_> {
        Box::new(DgraphTxn {
            client: self,
            start_ts: None,
            finished: false,
        })
    }
}

/// Render the upsert block sent to `/mutate`.
pub fn upsert_body(upsert: &Upsert) -> String {
    let mut body = String::from("upsert {\n");
    if !upsert.lookups.is_empty() {
        body.push_str("  query ");
        body.push_str(&upsert.query_block());
        body.push('\n');
    }
    body.push_str("  mutation {\n    set {\n");
    for statement in &upsert.statements {
        body.push_str("      ");
        body.push_str(&statement.to_string());
        body.push('\n');
    }
    body.push_str("    }\n  }\n}");
    body
}

struct DgraphTxn<'a> {
    client: &'a DgraphClient,
    start_ts: Option<u64>,
    finished: bool,
}

#[async_trait]
impl Transaction for DgraphTxn<'_> {
    async fn upsert_and_commit(&mut self, upsert: &Upsert) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        if upsert.statements.is_empty() {
            debug!("Nothing to write, skipping mutation");
            self.finished = true;
            return Ok(());
        }

        let url = format!("{}/mutate?commitNow=true", self.client.base_url);
        let response = self
            .client
            .post(&url, "application/rdf", upsert_body(upsert))
            .await?;

        match response.into_result() {
            Ok(start_ts) => {
                self.start_ts = start_ts;
                self.finished = true;
                Ok(())
            }
            Err((start_ts, e)) => {
                self.start_ts = start_ts;
                Err(e)
            }
        }
    }

    async fn discard(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let Some(start_ts) = self.start_ts else {
            return Ok(());
        };

        let url = format!(
            "{}/commit?startTs={}&abort=true",
            self.client.base_url, start_ts
        );
        let response = self.client.post(&url, "application/json", String::new()).await;
        if let Err(e) = &response {
            warn!(start_ts, error = %e, "Failed to abort transaction");
        }
        response?.into_result().map_err(|(_, e)| e)?;
        Ok(())
    }
}
