use std::time::Duration;

use chtop_core::RawRow;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::query::{QueryClient, QueryOutput, ResultFormat};

/// Blocking client for the ClickHouse HTTP interface.
///
/// Each query is a `POST` of the SQL text to the endpoint root, with the
/// output format selected through the `default_format` setting.
pub struct HttpQueryClient {
    client: reqwest::blocking::Client,
    base_url: String,
    timeout: Duration,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct JsonResponse {
    #[serde(default)]
    data: Vec<RawRow>,
}

impl HttpQueryClient {
    /// Create a new client with the given base URL and hard request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidEndpoint(base_url));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(ClientError::Transport)?;
        Ok(Self {
            client,
            base_url,
            timeout,
            user: None,
            password: None,
        })
    }

    pub fn set_auth(&mut self, user: String, password: Option<String>) {
        self.user = Some(user);
        self.password = password;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self) -> String {
        format!("{}/", self.base_url)
    }

    fn map_transport(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::Transport(err)
        }
    }
}

impl QueryClient for HttpQueryClient {
    fn query(&self, sql: &str, format: ResultFormat) -> Result<QueryOutput> {
        debug!(format = format.clickhouse_name(), "query: {sql}");
        let mut req = self
            .client
            .post(self.url())
            .query(&[("default_format", format.clickhouse_name())])
            .body(sql.to_string());
        if let Some(user) = &self.user {
            req = req.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            req = req.header("X-ClickHouse-Key", password);
        }

        let resp = req.send().map_err(|e| self.map_transport(e))?;
        let status = resp.status();
        let body = resp.text().map_err(|e| self.map_transport(e))?;
        if !status.is_success() {
            return Err(ClientError::Status {
                code: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        match format {
            ResultFormat::Json => {
                let parsed: JsonResponse = serde_json::from_str(&body)?;
                Ok(QueryOutput::Rows {
                    raw: body,
                    rows: parsed.data,
                })
            }
            ResultFormat::Text => Ok(QueryOutput::Text(body)),
        }
    }
}
