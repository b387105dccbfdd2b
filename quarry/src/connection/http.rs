//! reqwest-backed connection to an Elasticsearch-compatible cluster

use super::Connection;
use crate::config::ConnectionConfig;
use crate::dsl::{BulkRequest, DeleteByQuery, DocumentGet, DslDocument, IndexRequest};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;

/// Keep-alive sent with every scroll continuation
const SCROLL_KEEP_ALIVE: &str = crate::query::SCROLL_KEEP_ALIVE;

/// HTTP connection to a single cluster endpoint
#[derive(Debug, Clone)]
pub struct HttpConnection {
    client: Client,
    base: Url,
}

impl HttpConnection {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid cluster url {}: {}", config.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Cluster url {} cannot carry a path",
                config.url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, base })
    }

    pub fn url(&self) -> &str {
        self.base.as_str()
    }

    /// Base url extended by `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Cluster url {} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, op: &'static str, request: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(op, %status, "request finished");
        Ok((status, body))
    }

    async fn send_json(&self, op: &'static str, request: RequestBuilder) -> Result<Value> {
        let (status, body) = self.send(op, request).await?;
        if !status.is_success() {
            return Err(Error::Transport {
                status: Some(status.as_u16()),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn search(&self, request: &DslDocument) -> Result<Value> {
        let url = self.endpoint(&[request.index.as_str(), "_search"])?;
        let mut builder = self.client.post(url).json(&request.body);
        if let Some(scroll) = &request.scroll {
            builder = builder.query(&[("scroll", scroll.as_str())]);
        }
        self.send_json("search", builder).await
    }

    async fn scroll(&self, scroll_id: &str) -> Result<Value> {
        let url = self.endpoint(&["_search", "scroll"])?;
        let body = json!({"scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id});
        self.send_json("scroll", self.client.post(url).json(&body))
            .await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<Value> {
        let url = self.endpoint(&["_search", "scroll"])?;
        let body = json!({"scroll_id": [scroll_id]});
        self.send_json("clear_scroll", self.client.delete(url).json(&body))
            .await
    }

    async fn get(&self, request: &DocumentGet) -> Result<Option<Value>> {
        let url = self.endpoint(&[request.index.as_str(), "_doc", request.id.as_str()])?;
        let (status, body) = self.send("get", self.client.get(url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::Transport {
                status: Some(status.as_u16()),
                body,
            });
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn delete_by_query(&self, request: &DeleteByQuery) -> Result<Value> {
        let url = self.endpoint(&[request.index.as_str(), "_delete_by_query"])?;
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(conflicts) = request.conflicts {
            params.push(("conflicts", conflicts.as_str().to_string()));
        }
        if let Some(refresh) = request.refresh {
            params.push(("refresh", refresh.as_str().to_string()));
        }
        if let Some(max_docs) = request.max_docs {
            params.push(("max_docs", max_docs.to_string()));
        }
        let builder = self.client.post(url).query(&params).json(&request.body);
        self.send_json("delete_by_query", builder).await
    }

    async fn index(&self, request: &IndexRequest) -> Result<Value> {
        let routing = request.routing.as_deref().or(request.parent.as_deref());
        let params: Vec<(&str, &str)> = routing.map(|r| ("routing", r)).into_iter().collect();

        if request.partial {
            let url = self.endpoint(&[request.index.as_str(), "_update", request.id.as_str()])?;
            let body = json!({"doc": request.body, "doc_as_upsert": true});
            let builder = self.client.post(url).query(&params).json(&body);
            self.send_json("update", builder).await
        } else {
            let url = self.endpoint(&[request.index.as_str(), "_doc", request.id.as_str()])?;
            let builder = self.client.put(url).query(&params).json(&request.body);
            self.send_json("index", builder).await
        }
    }

    async fn bulk(&self, request: &BulkRequest) -> Result<Value> {
        let url = self.endpoint(&["_bulk"])?;
        let builder = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(request.to_ndjson()?);
        self.send_json("bulk", builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(url: &str) -> Result<HttpConnection> {
        HttpConnection::new(&ConnectionConfig {
            url: url.to_string(),
            timeout_secs: 5,
        })
    }

    #[test]
    fn test_segments_are_escaped() {
        let conn = connection("http://localhost:9200/").unwrap();
        let url = conn.endpoint(&["posts", "_doc", "a/b?x=1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9200/posts/_doc/a%2Fb%3Fx=1");
    }

    #[test]
    fn test_base_path_is_kept() {
        let conn = connection("http://localhost:9200/es").unwrap();
        let url = conn.endpoint(&["posts", "_search"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9200/es/posts/_search");
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(matches!(connection("not a url"), Err(Error::Config(_))));
        assert!(matches!(connection("mailto:ops@example.com"), Err(Error::Config(_))));
    }
}
