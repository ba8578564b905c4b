//! Per-run execution context shared by every capability in the run.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Datelike, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::types::{Exchange, ToolResult};

pub const FACT_TODAY: &str = "today";
pub const FACT_WEEKDAY: &str = "weekday";
pub const FACT_ONE_WEEK_FROM_NOW: &str = "one_week_from_now";

/// Facts computed once at run start and read by capabilities and prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFacts {
    today: NaiveDate,
    values: BTreeMap<String, String>,
}

impl ContextFacts {
    pub fn for_date(today: NaiveDate) -> Self {
        let mut values = BTreeMap::new();
        values.insert(FACT_TODAY.to_string(), today.format("%Y-%m-%d").to_string());
        values.insert(FACT_WEEKDAY.to_string(), weekday_name(today).to_string());
        values.insert(
            FACT_ONE_WEEK_FROM_NOW.to_string(),
            (today + Duration::days(7)).format("%Y-%m-%d").to_string(),
        );
        Self { today, values }
    }

    pub fn now() -> Self {
        Self::for_date(Utc::now().date_naive())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Instruction block describing the current date.
    pub fn render(&self) -> String {
        let mut out = String::from("**CURRENT DATE/TIME CONTEXT:**\n");
        out.push_str(&format!(
            "- Today is {}, {}\n- One week from now: {}",
            self.get(FACT_WEEKDAY).unwrap_or_default(),
            self.get(FACT_TODAY).unwrap_or_default(),
            self.get(FACT_ONE_WEEK_FROM_NOW).unwrap_or_default(),
        ));
        for (key, value) in self.iter() {
            if ![FACT_TODAY, FACT_WEEKDAY, FACT_ONE_WEEK_FROM_NOW].contains(&key) {
                out.push_str(&format!("\n- {}: {}", key, value));
            }
        }
        out
    }
}

impl Default for ContextFacts {
    fn default() -> Self {
        Self::now()
    }
}

fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mutable state owned by exactly one run.
///
/// Not `Clone`: capabilities receive `&ExecutionContext` and all mutation goes
/// through interior locks, so concurrent dispatches within the run append
/// atomically while runs never share a context. Recording never awaits, so
/// bookkeeping cannot be interrupted by a cancelled pass.
///
/// Boolean state such as a review's completion lives in typed extensions;
/// counters cover the scalar case.
pub struct ExecutionContext {
    run_id: Uuid,
    facts: ContextFacts,
    result_log: Mutex<Vec<ToolResult>>,
    exchanges: Mutex<Vec<Exchange>>,
    counters: DashMap<String, u64>,
    extensions: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    pub fn new(facts: ContextFacts) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            facts,
            result_log: Mutex::new(Vec::new()),
            exchanges: Mutex::new(Vec::new()),
            counters: DashMap::new(),
            extensions: HashMap::new(),
        }
    }

    /// Attaches typed per-run state, such as a review session, for capabilities to find.
    pub fn with_extension<T: Any + Send + Sync>(mut self, value: Arc<T>) -> Self {
        self.extensions.insert(TypeId::of::<T>(), value);
        self
    }

    pub fn extension<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn facts(&self) -> &ContextFacts {
        &self.facts
    }

    pub fn record_result(&self, result: ToolResult) {
        lock(&self.result_log).push(result);
    }

    /// Snapshot of the result log in completion order.
    pub fn results(&self) -> Vec<ToolResult> {
        lock(&self.result_log).clone()
    }

    pub fn result_count(&self) -> usize {
        lock(&self.result_log).len()
    }

    pub fn record_exchange(&self, exchange: Exchange) {
        lock(&self.exchanges).push(exchange);
    }

    /// Appends several exchanges with no interleaving from concurrent writers.
    pub fn record_exchanges(&self, batch: impl IntoIterator<Item = Exchange>) {
        lock(&self.exchanges).extend(batch);
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        lock(&self.exchanges).clone()
    }

    pub fn increment(&self, counter: &str) -> u64 {
        let mut entry = self.counters.entry(counter.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn counter(&self, counter: &str) -> u64 {
        self.counters.get(counter).map(|v| *v).unwrap_or(0)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(ContextFacts::now())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("facts", &self.facts)
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}
