//! Map-reduce job descriptions.
//!
//! A [`MapReduce`] is plain data: inputs plus a list of phases. It has no
//! way to run itself; execution goes through a [`crate::StoreClient`] (or
//! the async manager built on top of one).

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Inputs of a map-reduce job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Inputs {
    /// Every key in a bucket.
    Bucket(String),

    /// Explicit `(bucket, key)` pairs.
    Keys(Vec<(String, String)>),

    /// Keys matching a secondary index query.
    Index {
        bucket: String,
        index: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        start: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end: Option<String>,
    },

    /// Keys matching a full-text search.
    Search {
        module: String,
        function: String,
        arg: (String, String),
    },
}

/// A map or reduce function reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseFunction {
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<Value>,
    pub keep: bool,
}

impl PhaseFunction {
    fn with_language(language: &str) -> Self {
        Self {
            language: language.to_string(),
            source: None,
            name: None,
            module: None,
            function: None,
            arg: None,
            keep: false,
        }
    }

    /// An anonymous JavaScript function.
    pub fn javascript(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::with_language("javascript")
        }
    }

    /// A named built-in JavaScript function, e.g. `Riak.mapValuesJson`.
    pub fn javascript_named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::with_language("javascript")
        }
    }

    pub fn erlang(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            function: Some(function.into()),
            ..Self::with_language("erlang")
        }
    }

    pub fn with_arg(mut self, arg: Value) -> Self {
        self.arg = Some(arg);
        self
    }

    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

/// One phase of a map-reduce job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Map(PhaseFunction),
    Reduce(PhaseFunction),
    Link { bucket: String, tag: String, keep: bool },
}

impl Phase {
    fn keeps(&self) -> bool {
        match self {
            Phase::Map(f) | Phase::Reduce(f) => f.keep,
            Phase::Link { keep, .. } => *keep,
        }
    }

    fn set_keep(&mut self, value: bool) {
        match self {
            Phase::Map(f) | Phase::Reduce(f) => f.keep = value,
            Phase::Link { keep, .. } => *keep = value,
        }
    }
}

/// A map-reduce job under construction.
///
/// ```
/// use riakpersist_client::{MapReduce, PhaseFunction};
///
/// let mut job = MapReduce::new();
/// job.index("prefix.contact", "group_bin", "friends", None)
///     .map(PhaseFunction::javascript_named("Riak.mapValuesJson"));
/// assert_eq!(job.phases().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapReduce {
    inputs: Option<Inputs>,
    phases: Vec<Phase>,
}

impl MapReduce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> Option<&Inputs> {
        self.inputs.as_ref()
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Use every key in a bucket as input.
    pub fn add_bucket(&mut self, bucket: impl Into<String>) -> &mut Self {
        self.inputs = Some(Inputs::Bucket(bucket.into()));
        self
    }

    /// Add one `(bucket, key)` input. Replaces non-key inputs.
    pub fn add(&mut self, bucket: impl Into<String>, key: impl Into<String>) -> &mut Self {
        let pair = (bucket.into(), key.into());
        match &mut self.inputs {
            Some(Inputs::Keys(keys)) => keys.push(pair),
            _ => self.inputs = Some(Inputs::Keys(vec![pair])),
        }
        self
    }

    /// Use the keys matching an index query as input. Without `end` the
    /// query is an exact match on `start`.
    pub fn index(
        &mut self,
        bucket: impl Into<String>,
        index: impl Into<String>,
        start: impl Into<String>,
        end: Option<String>,
    ) -> &mut Self {
        let start = start.into();
        let (key, start) = match end {
            Some(_) => (None, Some(start)),
            None => (Some(start), None),
        };
        self.inputs = Some(Inputs::Index {
            bucket: bucket.into(),
            index: index.into(),
            key,
            start,
            end,
        });
        self
    }

    /// Use the keys matching a search query as input.
    pub fn search(&mut self, bucket: impl Into<String>, query: impl Into<String>) -> &mut Self {
        self.inputs = Some(Inputs::Search {
            module: "riak_search".to_string(),
            function: "mapred_search".to_string(),
            arg: (bucket.into(), query.into()),
        });
        self
    }

    pub fn map(&mut self, function: PhaseFunction) -> &mut Self {
        self.phases.push(Phase::Map(function));
        self
    }

    pub fn reduce(&mut self, function: PhaseFunction) -> &mut Self {
        self.phases.push(Phase::Reduce(function));
        self
    }

    pub fn link(&mut self, bucket: impl Into<String>, tag: impl Into<String>) -> &mut Self {
        self.phases.push(Phase::Link {
            bucket: bucket.into(),
            tag: tag.into(),
            keep: false,
        });
        self
    }

    /// The job as the JSON document the store expects.
    ///
    /// When no phase is marked to keep its results the last one is, so the
    /// job always returns something.
    pub fn to_job(&self, timeout: Duration) -> Result<Value> {
        let inputs = self.inputs.as_ref().ok_or_else(|| StoreError::InvalidRequest {
            message: "map-reduce job has no inputs".to_string(),
        })?;

        let mut phases = self.phases.clone();
        if !phases.iter().any(Phase::keeps) {
            if let Some(last) = phases.last_mut() {
                last.set_keep(true);
            }
        }

        Ok(serde_json::json!({
            "inputs": inputs,
            "query": phases,
            "timeout": u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_with_key_inputs() {
        let mut job = MapReduce::new();
        job.add("b", "k1")
            .add("b", "k2")
            .map(PhaseFunction::javascript_named("Riak.mapValuesJson"));

        let doc = job.to_job(Duration::from_secs(4)).unwrap();
        assert_eq!(
            doc,
            json!({
                "inputs": [["b", "k1"], ["b", "k2"]],
                "query": [{"map": {
                    "language": "javascript",
                    "name": "Riak.mapValuesJson",
                    "keep": true
                }}],
                "timeout": 4000
            })
        );
    }

    #[test]
    fn exact_index_input_uses_key() {
        let mut job = MapReduce::new();
        job.index("b", "group_bin", "friends", None);
        assert_eq!(
            job.to_job(Duration::from_millis(10)).unwrap()["inputs"],
            json!({"bucket": "b", "index": "group_bin", "key": "friends"})
        );
    }

    #[test]
    fn range_index_input_uses_start_and_end() {
        let mut job = MapReduce::new();
        job.index("b", "age_int", "1", Some("9".to_string()));
        assert_eq!(
            job.to_job(Duration::from_millis(10)).unwrap()["inputs"],
            json!({"bucket": "b", "index": "age_int", "start": "1", "end": "9"})
        );
    }

    #[test]
    fn search_input() {
        let mut job = MapReduce::new();
        job.search("b", "name:foo");
        assert_eq!(
            job.to_job(Duration::from_millis(10)).unwrap()["inputs"],
            json!({"module": "riak_search", "function": "mapred_search", "arg": ["b", "name:foo"]})
        );
    }

    #[test]
    fn explicit_keep_is_preserved() {
        let mut job = MapReduce::new();
        job.add_bucket("b")
            .map(PhaseFunction::javascript("function(v) { return [1]; }").keep(true))
            .reduce(PhaseFunction::erlang("riak_kv_mapreduce", "reduce_sum"));

        let doc = job.to_job(Duration::from_secs(1)).unwrap();
        assert_eq!(doc["query"][0]["map"]["keep"], json!(true));
        assert_eq!(doc["query"][1]["reduce"]["keep"], json!(false));
    }

    #[test]
    fn job_without_inputs_is_rejected() {
        let job = MapReduce::new();
        assert!(matches!(
            job.to_job(Duration::from_secs(1)),
            Err(StoreError::InvalidRequest { .. })
        ));
    }
}
