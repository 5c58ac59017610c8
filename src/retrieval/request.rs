//! Retrieval requests, records and tagged results.

use crate::cache::{CacheKey, Fingerprint};
use crate::error_code::ErrorCode;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One row of analysis data held by the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub domain: String,
    pub key: String,
    pub content: String,
    pub confidence: f64,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        domain: impl Into<String>,
        key: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            key: key.into(),
            content: content.into(),
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// A query against one domain of the backing store.
///
/// `min_confidence` and `limit` fall back to the coordinator's defaults when
/// unset. `fingerprint` lets the caller tie a cached result to the version of
/// the data it was computed from; without one, the request itself is hashed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetrievalRequest {
    pub query: String,
    pub domain: String,
    pub min_confidence: Option<f64>,
    pub limit: Option<usize>,
    pub fingerprint: Option<Fingerprint>,
}

impl RetrievalRequest {
    pub fn new(domain: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            domain: domain.into(),
            ..Default::default()
        }
    }
    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Same request against another domain.
    pub fn for_domain(&self, domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..self.clone()
        }
    }

    /// Fill unset options from the given defaults.
    pub fn resolved(mut self, default_limit: usize, default_min_confidence: f64) -> Self {
        self.limit.get_or_insert(default_limit);
        self.min_confidence.get_or_insert(default_min_confidence);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: &str| {
            Err(Error::validation_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(format!("request.{}", field))
                    .with_source("retrieval_request"),
            ))
        };
        if self.domain.trim().is_empty() {
            return invalid("domain", "domain must not be empty");
        }
        if self.query.trim().is_empty() {
            return invalid("query", "query must not be empty");
        }
        if self.limit == Some(0) {
            return invalid("limit", "limit must be at least 1");
        }
        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return invalid("min_confidence", "min_confidence must be within [0, 1]");
            }
        }
        Ok(())
    }

    /// Stable textual form with fixed key order. Floats use their shortest
    /// round-trip text, so distinct thresholds never share a key.
    pub fn canonical(&self) -> String {
        let mut parts: BTreeMap<&str, String> = BTreeMap::new();
        parts.insert("domain", self.domain.clone());
        parts.insert("query", self.query.clone());
        if let Some(min) = self.min_confidence {
            parts.insert("min_confidence", min.to_string());
        }
        if let Some(limit) = self.limit {
            parts.insert("limit", limit.to_string());
        }
        serde_json::to_string(&parts).unwrap_or_default()
    }

    pub fn cache_key(&self) -> CacheKey {
        let canonical = self.canonical();
        let fingerprint = self
            .fingerprint
            .clone()
            .unwrap_or_else(|| Fingerprint::of(canonical.as_bytes()));
        CacheKey::new(canonical, fingerprint)
    }
}

/// Where a result's records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Cache,
    Store,
    Error,
}

/// Failure marker attached to an error result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl RetrievalFailure {
    pub fn from_error(err: &Error) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code.retryable()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub domain: String,
    pub records: Vec<Record>,
    pub source: ResultSource,
    pub error: Option<RetrievalFailure>,
    pub elapsed: Duration,
    /// Set when these records came from a fallback request.
    pub fallback_used: bool,
}

impl RetrievalResult {
    pub fn hit(domain: impl Into<String>, records: Vec<Record>, elapsed: Duration) -> Self {
        Self::with_source(domain, records, ResultSource::Cache, elapsed)
    }

    pub fn stored(domain: impl Into<String>, records: Vec<Record>, elapsed: Duration) -> Self {
        Self::with_source(domain, records, ResultSource::Store, elapsed)
    }

    pub fn failed(domain: impl Into<String>, failure: RetrievalFailure, elapsed: Duration) -> Self {
        Self {
            domain: domain.into(),
            records: Vec::new(),
            source: ResultSource::Error,
            error: Some(failure),
            elapsed,
            fallback_used: false,
        }
    }

    fn with_source(
        domain: impl Into<String>,
        records: Vec<Record>,
        source: ResultSource,
        elapsed: Duration,
    ) -> Self {
        Self {
            domain: domain.into(),
            records,
            source,
            error: None,
            elapsed,
            fallback_used: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.source == ResultSource::Error
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
