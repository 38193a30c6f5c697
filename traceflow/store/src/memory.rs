use crate::{Error, Query, Store};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use traceflow_model::{Span, Trace};

/// Concurrent in-memory trace storage.
///
/// Spans and per-trace span lists live in sharded maps so point reads and
/// writes do not contend; the secondary indexes are guarded by a single
/// reader/writer lock held only while index sequences are touched.
pub struct MemoryStore {
    spans: DashMap<String, Span>,
    traces: DashMap<String, Vec<String>>,

    indexes: RwLock<Indexes>,

    /// Traces to keep before evicting the oldest.
    max_traces: usize,
}

#[derive(Default)]
struct Indexes {
    /// Service name to trace IDs that include a span from that service.
    by_service: HashMap<String, Vec<String>>,
    /// Unix hour to trace IDs with a span starting in that hour.
    by_timestamp: HashMap<i64, Vec<String>>,
    by_duration: DurationBuckets,
    by_cost: CostBuckets,
}

/// Traces categorized by root-span duration.
#[derive(Default)]
struct DurationBuckets {
    fast: Vec<String>,      // < 10ms
    medium: Vec<String>,    // 10ms - 100ms
    slow: Vec<String>,      // 100ms - 1s
    very_slow: Vec<String>, // >= 1s
}

/// Traces categorized by root-span cost.
#[derive(Default)]
struct CostBuckets {
    cheap: Vec<String>,     // < $0.0001
    moderate: Vec<String>,  // $0.0001 - $0.001
    expensive: Vec<String>, // >= $0.001
}

// === impl MemoryStore ===

impl MemoryStore {
    /// Creates an in-memory store that retains at most `max_traces` traces.
    pub fn new(max_traces: usize) -> Self {
        Self {
            spans: DashMap::new(),
            traces: DashMap::new(),
            indexes: RwLock::new(Indexes::default()),
            max_traces,
        }
    }

    /// Appends a span ID to its trace's span list, once.
    fn link_span(&self, trace_id: &str, span_id: &str) {
        let mut span_ids = self.traces.entry(trace_id.to_string()).or_default();
        if !span_ids.iter().any(|id| id == span_id) {
            span_ids.push(span_id.to_string());
        }
    }

    fn update_indexes(&self, span: &Span) {
        let mut indexes = self.indexes.write();

        let by_service = indexes
            .by_service
            .entry(span.service_name.clone())
            .or_default();
        push_unique(by_service, &span.trace_id);

        let hour = span.start_time.timestamp() / 3600;
        let bucket = indexes.by_timestamp.entry(hour).or_default();
        push_unique(bucket, &span.trace_id);

        // Duration and cost classification is taken from root spans at
        // insertion; a root span arriving after non-root spans still indexes,
        // but an already-classified trace is not reclassified.
        if span.parent_span_id.is_empty() {
            let bucket = indexes.by_duration.bucket_mut(span.duration);
            push_unique(bucket, &span.trace_id);

            let bucket = indexes.by_cost.bucket_mut(span.cost);
            push_unique(bucket, &span.trace_id);
        }
    }

    /// Collects candidate trace IDs from the narrowest applicable index.
    fn candidates(&self, query: &Query) -> Vec<String> {
        if !query.service.is_empty() {
            let indexes = self.indexes.read();
            let ids = indexes
                .by_service
                .get(&query.service)
                .cloned()
                .unwrap_or_default();
            return deduplicate(ids);
        }

        if query.start_time.is_some() || query.end_time.is_some() {
            let ids = self.traces_in_time_range(query.start_time, query.end_time);
            return deduplicate(ids);
        }

        self.traces.iter().map(|e| e.key().clone()).collect()
    }

    /// Unions the hourly buckets covering the given range. A missing start
    /// defaults to the epoch; a missing end to a day past now.
    fn traces_in_time_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<String> {
        let start = start.unwrap_or(DateTime::UNIX_EPOCH);
        let end = end.unwrap_or_else(|| Utc::now() + TimeDelta::hours(24));

        let start_hour = start.timestamp() / 3600;
        let end_hour = end.timestamp() / 3600;

        let indexes = self.indexes.read();
        let mut trace_ids = Vec::new();
        for hour in start_hour..=end_hour {
            if let Some(bucket) = indexes.by_timestamp.get(&hour) {
                trace_ids.extend_from_slice(bucket);
            }
        }
        trace_ids
    }

    fn matches(trace: &Trace, query: &Query) -> bool {
        if !query.service.is_empty() && !trace.services.iter().any(|s| *s == query.service) {
            return false;
        }

        if query.min_duration > TimeDelta::zero() && trace.duration < query.min_duration {
            return false;
        }
        if query.max_duration > TimeDelta::zero() && trace.duration > query.max_duration {
            return false;
        }

        if query.min_cost > 0.0 && trace.total_cost < query.min_cost {
            return false;
        }
        if query.max_cost > 0.0 && trace.total_cost > query.max_cost {
            return false;
        }

        if let Some(start) = query.start_time {
            if trace.start_time < start {
                return false;
            }
        }
        // The end bound compares against the trace's start time, inclusive.
        if let Some(end) = query.end_time {
            if trace.start_time > end {
                return false;
            }
        }

        true
    }

    fn assemble_trace(trace_id: &str, spans: Vec<Span>) -> Trace {
        let mut start_time = spans[0].start_time;
        let mut end_time = spans[0].end_time();
        for span in &spans[1..] {
            if span.start_time < start_time {
                start_time = span.start_time;
            }
            let span_end = span.end_time();
            if span_end > end_time {
                end_time = span_end;
            }
        }
        let duration = end_time - start_time;

        let mut services: Vec<String> = Vec::new();
        for span in &spans {
            if !services.contains(&span.service_name) {
                services.push(span.service_name.clone());
            }
        }
        services.sort();

        let mut total_cost = 0.0;
        let mut cost_breakdown: HashMap<String, f64> = HashMap::new();
        for span in &spans {
            total_cost += span.cost;
            *cost_breakdown.entry(span.service_name.clone()).or_default() += span.cost;
        }

        let mut deployments = HashMap::new();
        for span in &spans {
            if !span.deployment_id.is_empty() {
                deployments.insert(span.service_name.clone(), span.deployment_id.clone());
            }
        }

        Trace {
            trace_id: trace_id.to_string(),
            spans,
            start_time,
            duration,
            services,
            deployments,
            total_cost,
            cost_breakdown,
        }
    }

    /// Evicts oldest traces when the trace count exceeds capacity.
    ///
    /// Runs inline on the write path; there is no background evictor and no
    /// LRU by access.
    fn maybe_evict(&self) {
        let count = self.traces.len();
        if count <= self.max_traces {
            return;
        }
        self.evict_oldest(count - self.max_traces);
    }

    /// Removes the `n` traces with the oldest first-stored-span start time.
    fn evict_oldest(&self, n: usize) {
        let mut ages: Vec<(String, DateTime<Utc>)> = Vec::new();
        for entry in self.traces.iter() {
            if let Some(first_span_id) = entry.value().first() {
                if let Some(span) = self.spans.get(first_span_id) {
                    ages.push((entry.key().clone(), span.start_time));
                }
            }
        }

        ages.sort_by_key(|(_, start_time)| *start_time);

        debug!(evicting = n.min(ages.len()), traces = ages.len(), "Evicting oldest traces");
        for (trace_id, _) in ages.into_iter().take(n) {
            self.evict_trace(&trace_id);
        }
    }

    /// Removes a trace, all of its spans, and every index entry for it.
    fn evict_trace(&self, trace_id: &str) {
        let span_ids = match self.traces.get(trace_id) {
            Some(entry) => entry.value().clone(),
            None => return,
        };

        for span_id in &span_ids {
            self.spans.remove(span_id);
        }
        self.traces.remove(trace_id);

        let mut indexes = self.indexes.write();
        for trace_ids in indexes.by_service.values_mut() {
            trace_ids.retain(|id| id != trace_id);
        }
        for trace_ids in indexes.by_timestamp.values_mut() {
            trace_ids.retain(|id| id != trace_id);
        }
        let durations = &mut indexes.by_duration;
        durations.fast.retain(|id| id != trace_id);
        durations.medium.retain(|id| id != trace_id);
        durations.slow.retain(|id| id != trace_id);
        durations.very_slow.retain(|id| id != trace_id);

        let costs = &mut indexes.by_cost;
        costs.cheap.retain(|id| id != trace_id);
        costs.moderate.retain(|id| id != trace_id);
        costs.expensive.retain(|id| id != trace_id);
    }
}

impl Store for MemoryStore {
    fn write_span(&self, span: Span) -> Result<(), Error> {
        span.validate()?;

        self.spans.insert(span.span_id.clone(), span.clone());
        self.link_span(&span.trace_id, &span.span_id);
        self.update_indexes(&span);

        self.maybe_evict();
        Ok(())
    }

    fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, Error> {
        let span_ids = match self.traces.get(trace_id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };

        let spans: Vec<Span> = span_ids
            .iter()
            .filter_map(|span_id| self.spans.get(span_id).map(|s| s.clone()))
            .collect();
        if spans.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self::assemble_trace(trace_id, spans)))
    }

    fn find_traces(&self, query: &Query) -> Result<Vec<Trace>, Error> {
        let mut results = Vec::new();
        for trace_id in self.candidates(query) {
            if let Some(trace) = self.get_trace(&trace_id)? {
                if Self::matches(&trace, query) {
                    results.push(trace);
                }
            }
        }

        // Newest first.
        results.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        let total = results.len();
        if query.offset >= total {
            return Ok(Vec::new());
        }
        let end = if query.limit == 0 {
            total
        } else {
            total.min(query.offset + query.limit)
        };
        results.truncate(end);
        Ok(results.split_off(query.offset))
    }

    fn services(&self) -> Result<Vec<String>, Error> {
        let indexes = self.indexes.read();
        let mut services: Vec<String> = indexes.by_service.keys().cloned().collect();
        services.sort();
        Ok(services)
    }

    fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

// === impl DurationBuckets ===

impl DurationBuckets {
    fn bucket_mut(&mut self, duration: TimeDelta) -> &mut Vec<String> {
        let ms = duration.num_milliseconds();
        if ms < 10 {
            &mut self.fast
        } else if ms < 100 {
            &mut self.medium
        } else if ms < 1000 {
            &mut self.slow
        } else {
            &mut self.very_slow
        }
    }
}

// === impl CostBuckets ===

impl CostBuckets {
    fn bucket_mut(&mut self, cost: f64) -> &mut Vec<String> {
        if cost < 0.0001 {
            &mut self.cheap
        } else if cost < 0.001 {
            &mut self.moderate
        } else {
            &mut self.expensive
        }
    }
}

fn push_unique(trace_ids: &mut Vec<String>, trace_id: &str) {
    if !trace_ids.iter().any(|id| id == trace_id) {
        trace_ids.push(trace_id.to_string());
    }
}

fn deduplicate(trace_ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(trace_ids.len());
    trace_ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
