//! Riak HTTP client.
//!
//! Maps every [`StoreClient`] primitive onto one or more requests against
//! the Riak HTTP interface using a blocking reqwest client.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::client::StoreClient;
use crate::error::{Result, StoreError};
use crate::index::{IndexEntry, IndexQuery, IndexResults};
use crate::mapreduce::MapReduce;
use crate::object::{RawResult, StoreObject, JSON_CONTENT_TYPE};

const INDEX_HEADER_PREFIX: &str = "x-riak-index-";
const CLIENT_ID_HEADER: &str = "X-Riak-ClientId";
const DEFAULT_PORT: u16 = 8098;
const SEARCH_HOOK_MODULE: &str = "riak_search_kv_hook";
const SEARCH_HOOK_FUNCTION: &str = "precommit";

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_prefix() -> String {
    "riak".to_string()
}

fn default_mapred_prefix() -> String {
    "mapred".to_string()
}

/// Connection parameters for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub port: Option<u16>,

    /// Path prefix of the key/value resources.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Path of the map-reduce resource.
    #[serde(default = "default_mapred_prefix")]
    pub mapred_prefix: String,

    /// Sent as `X-Riak-ClientId` with every write.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Transport specific options. `timeout` (seconds) sets the
    /// per-request timeout.
    #[serde(default)]
    pub transport_options: HashMap<String, Value>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            prefix: default_prefix(),
            mapred_prefix: default_mapred_prefix(),
            client_id: None,
            transport_options: HashMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn base_url(&self) -> Result<Url> {
        let port = self.port.unwrap_or(DEFAULT_PORT);
        Ok(Url::parse(&format!("http://{}:{}/", self.host, port))?)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.transport_options
            .get("timeout")
            .and_then(Value::as_f64)
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

#[derive(Deserialize)]
struct IndexResponse {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    results: Vec<Map<String, Value>>,
    #[serde(default)]
    continuation: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    response: SearchDocs,
}

#[derive(Deserialize)]
struct SearchDocs {
    #[serde(default)]
    docs: Vec<Value>,
}

#[derive(Deserialize)]
struct BucketList {
    buckets: Vec<String>,
}

#[derive(Deserialize)]
struct KeyList {
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct BucketProps {
    props: Map<String, Value>,
}

/// A [`StoreClient`] speaking the Riak HTTP API.
///
/// The underlying reqwest client is created on first use, so it is built
/// (and normally dropped) on a worker thread rather than inside an async
/// context.
///
/// # Example
///
/// ```ignore
/// use riakpersist_client::{ClientConfig, RiakHttpClient, StoreClient};
///
/// let client = RiakHttpClient::new(ClientConfig::default())?;
/// let raw = client.fetch("prefix.contact", "k1")?;
/// ```
pub struct RiakHttpClient {
    config: ClientConfig,
    base_url: Url,
    timeout: Option<Duration>,
    http: OnceLock<Client>,
}

impl RiakHttpClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let timeout = config.request_timeout();
        Ok(Self {
            config,
            base_url,
            timeout,
            http: OnceLock::new(),
        })
    }

    /// Create a client against an explicit base URL, e.g. a test server.
    pub fn with_base_url(base_url: &str, config: ClientConfig) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let timeout = config.request_timeout();
        Ok(Self {
            config,
            base_url,
            timeout,
            http: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn http(&self) -> Result<&Client> {
        if let Some(client) = self.http.get() {
            return Ok(client);
        }
        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(self.http.get_or_init(|| client))
    }

    /// Resource URL under `root`. An empty `root` is left out; every other
    /// segment is kept as given, empty ones included.
    fn url(&self, root: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| StoreError::InvalidUrl {
                message: format!("{} cannot be a base URL", self.base_url),
            })?;
            path.pop_if_empty();
            if !root.is_empty() {
                path.push(root);
            }
            path.extend(segments);
        }
        Ok(url)
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        if key.is_empty() {
            return Err(StoreError::InvalidRequest {
                message: format!("empty key in bucket {}", bucket),
            });
        }
        self.url(&self.config.prefix, &[bucket, key])
    }

    fn bucket_url(&self, bucket: &str) -> Result<Url> {
        self.url(&self.config.prefix, &[bucket])
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send()?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(response))
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        tracing::debug!(%url, "GET");
        let response = self.send(self.http()?.get(url).query(query))?;
        Ok(response.json()?)
    }

    fn bucket_props(&self, bucket: &str) -> Result<Map<String, Value>> {
        let props: BucketProps = self.get_json(
            self.bucket_url(bucket)?,
            &[("props", "true".to_string()), ("keys", "false".to_string())],
        )?;
        Ok(props.props)
    }
}

fn status_error(response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    StoreError::Status { status, body }
}

fn indexes_from_headers(response: &Response) -> Vec<(String, String)> {
    let mut indexes = Vec::new();
    for (name, value) in response.headers() {
        let Some(index) = name.as_str().strip_prefix(INDEX_HEADER_PREFIX) else {
            continue;
        };
        let Ok(value) = value.to_str() else {
            continue;
        };
        for v in value.split(',') {
            indexes.push((index.to_string(), v.trim().to_string()));
        }
    }
    indexes
}

fn index_entry(term_map: &Map<String, Value>) -> Result<IndexEntry> {
    let (term, key) = term_map
        .iter()
        .next()
        .ok_or_else(|| StoreError::invalid_response("empty index result entry"))?;
    let key = key.as_str().ok_or_else(|| {
        StoreError::invalid_response(format!("index key is not a string: {}", key))
    })?;
    Ok(IndexEntry::Term {
        term: term.clone(),
        key: key.to_string(),
    })
}

fn is_search_hook(hook: &Value) -> bool {
    hook.get("mod").and_then(Value::as_str) == Some(SEARCH_HOOK_MODULE)
        && hook.get("fun").and_then(Value::as_str) == Some(SEARCH_HOOK_FUNCTION)
}

impl StoreClient for RiakHttpClient {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Option<RawResult>> {
        let url = self.object_url(bucket, key)?;
        tracing::debug!(%url, "fetching object");
        let response = self.http()?.get(url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(JSON_CONTENT_TYPE)
            .to_string();
        let indexes = indexes_from_headers(&response);
        let data: Bytes = response.bytes()?;

        Ok(Some(RawResult {
            content_type,
            indexes,
            data,
        }))
    }

    fn store(&self, object: &StoreObject) -> Result<()> {
        let url = self.object_url(object.bucket(), object.key())?;
        tracing::debug!(%url, "storing object");

        let mut grouped: Vec<(String, Vec<&str>)> = Vec::new();
        for (name, value) in object.indexes() {
            match grouped.last_mut() {
                Some((last, values)) if last == name => values.push(value),
                _ => grouped.push((name.to_string(), vec![value])),
            }
        }

        let mut request = self
            .http()?
            .put(url)
            .query(&[("returnbody", "false")])
            .header(CONTENT_TYPE, object.content_type());
        for (name, values) in grouped {
            request = request.header(format!("{}{}", INDEX_HEADER_PREFIX, name), values.join(", "));
        }
        if let Some(client_id) = &self.config.client_id {
            request = request.header(CLIENT_ID_HEADER, client_id);
        }

        self.send(request.body(object.encoded_data()?.to_vec()))?;
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let url = self.object_url(bucket, key)?;
        tracing::debug!(%url, "deleting object");
        let mut request = self.http()?.delete(url);
        if let Some(client_id) = &self.config.client_id {
            request = request.header(CLIENT_ID_HEADER, client_id);
        }
        let response = request.send()?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(status_error(response))
        }
    }

    fn get_index(&self, bucket: &str, query: &IndexQuery) -> Result<IndexResults> {
        let mut segments = vec![bucket, "index", query.index.as_str(), query.start.as_str()];
        if let Some(end) = &query.end {
            segments.push(end.as_str());
        }
        let url = self.url("buckets", &segments)?;

        let mut params = Vec::new();
        if query.return_terms {
            params.push(("return_terms", "true".to_string()));
        }
        if let Some(max_results) = query.max_results {
            params.push(("max_results", max_results.to_string()));
        }
        if let Some(continuation) = &query.continuation {
            params.push(("continuation", continuation.clone()));
        }

        let response: IndexResponse = self.get_json(url, &params)?;
        let entries = if query.return_terms && !response.results.is_empty() {
            response
                .results
                .iter()
                .map(index_entry)
                .collect::<Result<Vec<_>>>()?
        } else {
            response.keys.into_iter().map(IndexEntry::Key).collect()
        };

        Ok(IndexResults {
            entries,
            continuation: response.continuation,
        })
    }

    fn search(&self, bucket: &str, query: &str, rows: usize, start: usize) -> Result<Vec<Value>> {
        let url = self.url("solr", &[bucket, "select"])?;
        let response: SearchResponse = self.get_json(
            url,
            &[
                ("q", query.to_string()),
                ("wt", "json".to_string()),
                ("rows", rows.to_string()),
                ("start", start.to_string()),
            ],
        )?;
        Ok(response.response.docs)
    }

    fn map_reduce(&self, job: &MapReduce, timeout: Duration) -> Result<Vec<Value>> {
        let url = self.url(&self.config.mapred_prefix, &[])?;
        let body = job.to_job(timeout)?;
        tracing::debug!(%url, ?timeout, "running map-reduce job");

        let response = self.send(self.http()?.post(url).timeout(timeout).json(&body))?;
        match response.json::<Value>()? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    fn enable_search(&self, bucket: &str) -> Result<()> {
        let props = self.bucket_props(bucket)?;
        let mut precommit = match props.get("precommit") {
            Some(Value::Array(hooks)) => hooks.clone(),
            _ => Vec::new(),
        };
        if !precommit.iter().any(is_search_hook) {
            precommit.push(json!({"mod": SEARCH_HOOK_MODULE, "fun": SEARCH_HOOK_FUNCTION}));
        }

        let url = self.bucket_url(bucket)?;
        tracing::debug!(%url, "enabling search");
        self.send(
            self.http()?
                .put(url)
                .json(&json!({"props": {"precommit": precommit, "search": true}})),
        )?;
        Ok(())
    }

    fn search_enabled(&self, bucket: &str) -> Result<bool> {
        let props = self.bucket_props(bucket)?;
        if props.get("search").and_then(Value::as_bool) == Some(true) {
            return Ok(true);
        }
        Ok(match props.get("precommit") {
            Some(Value::Array(hooks)) => hooks.iter().any(is_search_hook),
            _ => false,
        })
    }

    fn list_buckets(&self) -> Result<Vec<String>> {
        let url = self.url(&self.config.prefix, &[])?;
        let list: BucketList = self.get_json(url, &[("buckets", "true".to_string())])?;
        Ok(list.buckets)
    }

    fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        let list: KeyList = self.get_json(
            self.bucket_url(bucket)?,
            &[("keys", "true".to_string()), ("props", "false".to_string())],
        )?;
        Ok(list.keys)
    }
}
