//! Ordered fallback requests.

use super::request::RetrievalRequest;

/// Requests tried one after another until one yields records.
#[derive(Debug, Clone, Default)]
pub struct FallbackChain {
    candidates: Vec<RetrievalRequest>,
}

impl FallbackChain {
    pub fn new(primary: RetrievalRequest) -> Self {
        Self {
            candidates: vec![primary],
        }
    }

    pub fn then(mut self, fallback: RetrievalRequest) -> Self {
        self.candidates.push(fallback);
        self
    }

    /// Fall back to the same query in each of `domains`, in order.
    pub fn across_domains<I, D>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        let Some(primary) = self.candidates.first().cloned() else {
            return self;
        };
        self.candidates
            .extend(domains.into_iter().map(|d| primary.for_domain(d)));
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[RetrievalRequest] {
        &self.candidates
    }

    /// The request to try after the one at `failed`, if any.
    pub fn next_after(&self, failed: usize) -> Option<&RetrievalRequest> {
        self.candidates.get(failed + 1)
    }
}

impl From<Vec<RetrievalRequest>> for FallbackChain {
    fn from(candidates: Vec<RetrievalRequest>) -> Self {
        Self { candidates }
    }
}

impl IntoIterator for FallbackChain {
    type Item = RetrievalRequest;
    type IntoIter = std::vec::IntoIter<RetrievalRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}
