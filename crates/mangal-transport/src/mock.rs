//! In-memory [`RecordSource`] for tests.
//!
//! Serves fixed records per kind, applies filters the way the API does for
//! plain field filters, slices pages, and records every request so tests can
//! assert on the exact traffic a component generated.
//!
//! ```ignore
//! let source = MockSource::new()
//!     .with_records(EntityKind::Network, [json!({"id": 1}), json!({"id": 2})])
//!     .failing_get(EntityKind::Node, 9, TransportError::Timeout);
//!
//! // ... exercise a component ...
//! assert_eq!(source.get_calls(EntityKind::Network, 1), 1);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use mangal_types::{EntityKey, EntityKind};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::TransportError;
use crate::query::{FilterValue, Query, SEARCH_KEY};
use crate::source::{PageRequest, RecordSource};

#[derive(Debug, Default)]
struct RequestLog {
    lists: Vec<(EntityKind, Query, PageRequest)>,
    gets: HashMap<EntityKey, usize>,
    counts: Vec<(EntityKind, Query)>,
}

/// A fake Mangal API backed by vectors of JSON records.
#[derive(Debug, Default)]
pub struct MockSource {
    records: HashMap<EntityKind, Vec<Value>>,
    page_failures: HashMap<(EntityKind, u64), TransportError>,
    /// Error and the number of requests it applies to (`None`: all).
    get_failures: HashMap<EntityKey, (TransportError, Option<usize>)>,
    count_failures: HashMap<EntityKind, TransportError>,
    latency: Option<Duration>,
    log: Mutex<RequestLog>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records of one kind, served in the given order.
    pub fn with_records(mut self, kind: EntityKind, records: impl IntoIterator<Item = Value>) -> Self {
        self.records.entry(kind).or_default().extend(records);
        self
    }

    pub fn with_record(self, kind: EntityKind, record: Value) -> Self {
        self.with_records(kind, [record])
    }

    /// Fail every request for one page of `kind`, whatever the filters.
    pub fn failing_page(mut self, kind: EntityKind, index: u64, error: TransportError) -> Self {
        self.page_failures.insert((kind, index), error);
        self
    }

    /// Fail every single-entity request for `(kind, id)`.
    pub fn failing_get(mut self, kind: EntityKind, id: u64, error: TransportError) -> Self {
        self.get_failures.insert(EntityKey::new(kind, id), (error, None));
        self
    }

    /// Fail the first `times` single-entity requests for `(kind, id)`, then
    /// serve the record. Counts against the request log, so `clear_log`
    /// rearms the failure.
    pub fn failing_get_times(
        mut self,
        kind: EntityKind,
        id: u64,
        error: TransportError,
        times: usize,
    ) -> Self {
        self.get_failures
            .insert(EntityKey::new(kind, id), (error, Some(times)));
        self
    }

    pub fn failing_count(mut self, kind: EntityKind, error: TransportError) -> Self {
        self.count_failures.insert(kind, error);
        self
    }

    /// Sleep this long inside every request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Page indices requested for `kind`, in request order.
    pub fn listed_pages(&self, kind: EntityKind) -> Vec<u64> {
        self.log
            .lock()
            .lists
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, _, page)| page.index)
            .collect()
    }

    /// Every listing request, in request order.
    pub fn list_requests(&self) -> Vec<(EntityKind, Query, PageRequest)> {
        self.log.lock().lists.clone()
    }

    /// Single-entity requests made for `(kind, id)`.
    pub fn get_calls(&self, kind: EntityKind, id: u64) -> usize {
        self.log
            .lock()
            .gets
            .get(&EntityKey::new(kind, id))
            .copied()
            .unwrap_or(0)
    }

    /// Single-entity requests made for any key.
    pub fn total_get_calls(&self) -> usize {
        self.log.lock().gets.values().sum()
    }

    pub fn count_calls(&self) -> usize {
        self.log.lock().counts.len()
    }

    /// Every count request, in request order.
    pub fn count_requests(&self) -> Vec<(EntityKind, Query)> {
        self.log.lock().counts.clone()
    }

    pub fn clear_log(&self) {
        *self.log.lock() = RequestLog::default();
    }

    fn pause(&self) {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
    }

    fn matching(&self, kind: EntityKind, query: &Query) -> Vec<&Value> {
        self.records
            .get(&kind)
            .map(|records| records.iter().filter(|r| matches(r, query)).collect())
            .unwrap_or_default()
    }
}

impl RecordSource for MockSource {
    fn list(
        &self,
        kind: EntityKind,
        query: &Query,
        page: PageRequest,
    ) -> Result<Vec<Value>, TransportError> {
        self.log.lock().lists.push((kind, query.clone(), page));
        self.pause();
        if let Some(err) = self.page_failures.get(&(kind, page.index)) {
            return Err(err.clone());
        }

        Ok(self
            .matching(kind, query)
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size)
            .cloned()
            .collect())
    }

    fn count(&self, kind: EntityKind, query: &Query) -> Result<u64, TransportError> {
        self.log.lock().counts.push((kind, query.clone()));
        self.pause();
        if let Some(err) = self.count_failures.get(&kind) {
            return Err(err.clone());
        }
        Ok(self.matching(kind, query).len() as u64)
    }

    fn get(&self, kind: EntityKind, id: u64) -> Result<Option<Value>, TransportError> {
        let key = EntityKey::new(kind, id);
        let calls = {
            let mut log = self.log.lock();
            let calls = log.gets.entry(key).or_insert(0);
            *calls += 1;
            *calls
        };
        self.pause();
        if let Some((err, times)) = self.get_failures.get(&key) {
            if times.map_or(true, |times| calls <= times) {
                return Err(err.clone());
            }
        }

        Ok(self.records.get(&kind).and_then(|records| {
            records
                .iter()
                .find(|r| r.get("id").and_then(Value::as_u64) == Some(id))
                .cloned()
        }))
    }
}

// Pairs with the same key are alternatives; different keys must all match.
fn matches(record: &Value, query: &Query) -> bool {
    let mut by_key: HashMap<&str, Vec<&FilterValue>> = HashMap::new();
    for (key, value) in query.pairs() {
        by_key.entry(key.as_str()).or_default().push(value);
    }

    by_key.into_iter().all(|(key, wanted)| {
        if key == SEARCH_KEY {
            return wanted.iter().any(|text| contains_text(record, &text.to_string()));
        }
        match record.get(key).and_then(render) {
            Some(actual) => wanted.iter().any(|w| w.to_string() == actual),
            None => false,
        }
    })
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn contains_text(record: &Value, text: &str) -> bool {
    let needle = text.to_lowercase();
    record
        .as_object()
        .into_iter()
        .flat_map(|body| body.values())
        .filter_map(Value::as_str)
        .any(|s| s.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interactions() -> MockSource {
        MockSource::new().with_records(
            EntityKind::Interaction,
            [
                json!({"id": 1, "network_id": 42, "type": "predation"}),
                json!({"id": 2, "network_id": 42, "type": "mutualism"}),
                json!({"id": 3, "network_id": 7, "type": "predation"}),
                json!({"id": 4, "network_id": 42, "type": "herbivory"}),
            ],
        )
    }

    #[test]
    fn test_filters_and_across_keys_or_within_key() {
        let source = interactions();
        let scoped = Query::new().with("type", "predation").with("network_id", 42u64);
        assert_eq!(source.count(EntityKind::Interaction, &scoped).unwrap(), 1);

        let either = Query::new().with("type", "predation").with("type", "herbivory");
        assert_eq!(source.count(EntityKind::Interaction, &either).unwrap(), 3);

        let unknown = Query::new().with("colour", "red");
        assert_eq!(source.count(EntityKind::Interaction, &unknown).unwrap(), 0);
        assert_eq!(source.count_calls(), 3);
    }

    #[test]
    fn test_pages_slice_in_order() {
        let source = interactions();
        let page = source
            .list(EntityKind::Interaction, &Query::new(), PageRequest::new(1, 3))
            .unwrap();
        assert_eq!(page, vec![json!({"id": 4, "network_id": 42, "type": "herbivory"})]);

        let past_end = source
            .list(EntityKind::Interaction, &Query::new(), PageRequest::new(5, 3))
            .unwrap();
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_get_and_failures() {
        let source = interactions().failing_get(EntityKind::Interaction, 2, TransportError::Timeout);
        assert!(source.get(EntityKind::Interaction, 1).unwrap().is_some());
        assert!(source.get(EntityKind::Interaction, 99).unwrap().is_none());
        assert!(source.get(EntityKind::Node, 1).unwrap().is_none());
        assert_eq!(
            source.get(EntityKind::Interaction, 2).unwrap_err(),
            TransportError::Timeout
        );
        assert_eq!(source.get_calls(EntityKind::Interaction, 2), 1);
        assert_eq!(source.total_get_calls(), 4);

        source.clear_log();
        assert_eq!(source.total_get_calls(), 0);
    }

    #[test]
    fn test_failure_wears_off_after_given_requests() {
        let source = interactions().failing_get_times(
            EntityKind::Interaction,
            1,
            TransportError::Status {
                status: 503,
                message: "unavailable".into(),
            },
            2,
        );
        assert!(source.get(EntityKind::Interaction, 1).is_err());
        assert!(source.get(EntityKind::Interaction, 1).is_err());
        assert!(source.get(EntityKind::Interaction, 1).unwrap().is_some());

        source.clear_log();
        assert!(source.get(EntityKind::Interaction, 1).is_err());
    }

    #[test]
    fn test_search_matches_text_fields() {
        let source = MockSource::new().with_records(
            EntityKind::ReferenceTaxon,
            [
                json!({"id": 1, "name": "Canis lupus"}),
                json!({"id": 2, "name": "Vulpes vulpes"}),
            ],
        );
        assert_eq!(
            source
                .count(EntityKind::ReferenceTaxon, &Query::search("LUPUS"))
                .unwrap(),
            1
        );
    }
}
