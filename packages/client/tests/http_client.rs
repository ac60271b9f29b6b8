use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, headers, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use riakpersist_client::{
    ClientConfig, IndexEntry, IndexQuery, MapReduce, PhaseFunction, RiakHttpClient, StoreClient,
    StoreError, StoreObject,
};

fn client_for(uri: &str) -> RiakHttpClient {
    RiakHttpClient::with_base_url(uri, ClientConfig::default()).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_object_with_indexes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/riak/test.contact/k1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"$VERSION": 2, "name": "alice"}"#, "application/json")
                .insert_header("x-riak-index-name_bin", "alice, ally"),
        )
        .mount(&server)
        .await;

    let uri = server.uri();
    let raw = tokio::task::spawn_blocking(move || client_for(&uri).fetch("test.contact", "k1"))
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(raw.content_type, "application/json");
    assert_eq!(
        raw.indexes,
        vec![
            ("name_bin".to_string(), "alice".to_string()),
            ("name_bin".to_string(), "ally".to_string()),
        ]
    );

    let mut object = StoreObject::from_raw("test.contact", "k1", raw);
    object.decode().unwrap();
    assert_eq!(object.data_version(), Some(2));
}

#[tokio::test]
async fn test_fetch_returns_none_on_404() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/riak/test.contact/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found\n"))
        .mount(&server)
        .await;

    let uri = server.uri();
    let result =
        tokio::task::spawn_blocking(move || client_for(&uri).fetch("test.contact", "missing"))
            .await
            .unwrap()
            .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_server_error_is_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/riak/test.contact/k1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let uri = server.uri();
    let result = tokio::task::spawn_blocking(move || client_for(&uri).fetch("test.contact", "k1"))
        .await
        .unwrap();

    match result {
        Err(StoreError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_store_sends_indexes_and_client_id() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/riak/test.contact/k1"))
        .and(header("content-type", "application/json"))
        .and(headers("x-riak-index-group_bin", vec!["family", "friends"]))
        .and(header("x-riak-clientid", "worker-1"))
        .and(body_json(json!({"$VERSION": 1})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let result = tokio::task::spawn_blocking(move || {
        let config = ClientConfig {
            client_id: Some("worker-1".to_string()),
            ..ClientConfig::default()
        };
        let client = RiakHttpClient::with_base_url(&uri, config).unwrap();

        let mut object = StoreObject::versioned("test.contact", "k1", 1);
        object.add_index("group_bin", "friends");
        object.add_index("group_bin", "family");
        object.store(&client)
    })
    .await
    .unwrap();

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_delete_accepts_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/riak/test.contact/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let client = client_for(&uri);
        client.delete("test.contact", "gone").unwrap();
        client.delete("test.contact", "gone").unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_index_query_with_terms_and_continuation() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/buckets/test.contact/index/name_bin/a/m"))
        .and(query_param("return_terms", "true"))
        .and(query_param("max_results", "2"))
        .and(query_param("continuation", "g2abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"alice": "k1"}, {"bob": "k2"}],
            "continuation": "g2def"
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let results = tokio::task::spawn_blocking(move || {
        let query = IndexQuery::range("name_bin", "a", "m")
            .with_return_terms(true)
            .with_max_results(2)
            .with_continuation("g2abc");
        client_for(&uri).get_index("test.contact", &query)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(
        results.entries,
        vec![
            IndexEntry::Term {
                term: "alice".to_string(),
                key: "k1".to_string()
            },
            IndexEntry::Term {
                term: "bob".to_string(),
                key: "k2".to_string()
            },
        ]
    );
    assert_eq!(results.continuation.as_deref(), Some("g2def"));
}

#[tokio::test]
async fn test_index_query_keys_only() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/buckets/test.contact/index/group_bin/friends"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": ["k1", "k2"]})))
        .mount(&server)
        .await;

    let uri = server.uri();
    let results = tokio::task::spawn_blocking(move || {
        client_for(&uri).get_index("test.contact", &IndexQuery::new("group_bin", "friends"))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(
        results.entries,
        vec![IndexEntry::Key("k1".to_string()), IndexEntry::Key("k2".to_string())]
    );
    assert_eq!(results.continuation, None);
}

#[tokio::test]
async fn test_index_range_keeps_empty_start() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/buckets/test.contact/index/name_bin//m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": ["k1"]})))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let results = tokio::task::spawn_blocking(move || {
        client_for(&uri).get_index("test.contact", &IndexQuery::range("name_bin", "", "m"))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(results.entries, vec![IndexEntry::Key("k1".to_string())]);
}

#[tokio::test]
async fn test_empty_key_is_rejected_without_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let uri = server.uri();
    let (fetched, deleted) = tokio::task::spawn_blocking(move || {
        let client = client_for(&uri);
        (client.fetch("test.contact", ""), client.delete("test.contact", ""))
    })
    .await
    .unwrap();

    assert!(matches!(fetched, Err(StoreError::InvalidRequest { .. })));
    assert!(matches!(deleted, Err(StoreError::InvalidRequest { .. })));
}

#[tokio::test]
async fn test_search_returns_docs() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/solr/test.contact/select"))
        .and(query_param("q", "name:alice"))
        .and(query_param("wt", "json"))
        .and(query_param("rows", "10"))
        .and(query_param("start", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"numFound": 21, "start": 20, "docs": [{"id": "k21"}]}
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let docs = tokio::task::spawn_blocking(move || {
        client_for(&uri).search("test.contact", "name:alice", 10, 20)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(docs, vec![json!({"id": "k21"})]);
}

#[tokio::test]
async fn test_map_reduce_posts_job() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mapred"))
        .and(body_json(json!({
            "inputs": "test.contact",
            "query": [{
                "map": {"language": "javascript", "name": "Riak.mapValuesJson", "keep": true}
            }],
            "timeout": 5000
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"a": 1}, {"a": 2}])))
        .mount(&server)
        .await;

    let uri = server.uri();
    let rows = tokio::task::spawn_blocking(move || {
        let mut job = MapReduce::new();
        job.add_bucket("test.contact")
            .map(PhaseFunction::javascript_named("Riak.mapValuesJson"));
        client_for(&uri).map_reduce(&job, Duration::from_secs(5))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(rows, vec![json!({"a": 1}), json!({"a": 2})]);
}

#[tokio::test]
async fn test_enable_search_installs_hook() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/riak/test.contact"))
        .and(query_param("props", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "props": {"precommit": []}
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/riak/test.contact"))
        .and(body_json(json!({
            "props": {
                "precommit": [{"mod": "riak_search_kv_hook", "fun": "precommit"}],
                "search": true
            }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let (enabled_before, result) = tokio::task::spawn_blocking(move || {
        let client = client_for(&uri);
        let enabled = client.search_enabled("test.contact").unwrap();
        (enabled, client.enable_search("test.contact"))
    })
    .await
    .unwrap();

    assert!(!enabled_before);
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_purge_all_deletes_prefixed_buckets() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/riak"))
        .and(query_param("buckets", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "buckets": ["test.contact", "prod.contact"]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/riak/test.contact"))
        .and(query_param("keys", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": ["k1", "k2"]})))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/riak/test.contact/k1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/riak/test.contact/k2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let result = tokio::task::spawn_blocking(move || client_for(&uri).purge_all("test."))
        .await
        .unwrap();

    assert!(result.is_ok());
}
