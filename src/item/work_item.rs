use crate::config::RetryConfig;
use crate::item::{parse_target, Fingerprint};
use crate::{ItemError, ItemResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

fn next_item_id() -> u64 {
    NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed)
}

/// Transfer method of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl FromStr for Method {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            _ => Err(ItemError::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names the continuation that handles a work item's response
///
/// The producer is referenced by identity only; it is resolved through the
/// crawler's producer registry when the response arrives. This keeps work
/// items serializable and lets a restored item find its producer again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Callback {
    pub producer: String,
    pub name: String,
}

impl Callback {
    pub fn new(producer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            name: name.into(),
        }
    }
}

/// One unit of outbound work
///
/// Everything that identifies the work (target, method, payload, callback) is
/// fixed at construction. Only the scheduler touches the timeout budget and the
/// cool-down, and only while it owns the item.
#[derive(Debug, Clone)]
pub struct WorkItem {
    id: u64,
    name: String,
    target: Url,
    method: Method,
    payload: Value,
    headers: BTreeMap<String, String>,
    tags: HashMap<String, Value>,
    timeout: Duration,
    timeout_wait: Duration,
    timeout_retries: u32,
    defaulted: DefaultedRetry,
    ready_at: Option<Instant>,
    callback: Callback,
    fingerprint: Fingerprint,
}

/// Retry fields the builder filled in from built-in defaults
#[derive(Debug, Clone, Copy, Default)]
struct DefaultedRetry {
    timeout: bool,
    timeout_wait: bool,
    timeout_retries: bool,
}

impl WorkItem {
    /// Starts building a work item for `target`, answered by `callback`
    ///
    /// # Example
    ///
    /// ```
    /// use tidepool::item::{Callback, Method, WorkItem};
    ///
    /// let item = WorkItem::builder("https://example.com/api", Callback::new("books|", "parse_list"))
    ///     .method(Method::Post)
    ///     .payload(serde_json::json!({"page": 1}))
    ///     .tag("book", "dune")
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(item.method(), Method::Post);
    /// ```
    pub fn builder(target: impl Into<String>, callback: Callback) -> WorkItemBuilder {
        WorkItemBuilder::new(target.into(), callback)
    }

    /// Process-unique id, distinct even for items sharing a fingerprint
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn tags(&self) -> &HashMap<String, Value> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&Value> {
        self.tags.get(key)
    }

    /// Per-transfer timeout handed to the fetcher
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Cool-down applied before a timed out item is dispatched again
    pub fn timeout_wait(&self) -> Duration {
        self.timeout_wait
    }

    /// Remaining timeout retries
    pub fn timeout_retries(&self) -> u32 {
        self.timeout_retries
    }

    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Identity of the producer that owns this item
    pub fn producer(&self) -> &str {
        &self.callback.producer
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Instant after which the item may be dispatched, if it is cooling down
    pub fn ready_at(&self) -> Option<Instant> {
        self.ready_at
    }

    /// Whether the cool-down has elapsed at `now`
    pub fn is_ready(&self, now: Instant) -> bool {
        self.ready_at.map_or(true, |at| at <= now)
    }

    /// Cool-down left at `now`
    pub fn remaining_cool_down(&self, now: Instant) -> Duration {
        self.ready_at
            .map_or(Duration::ZERO, |at| at.saturating_duration_since(now))
    }

    /// Short label for log lines
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("#{}", self.id)
        } else {
            format!("#{} {}", self.id, self.name)
        }
    }

    /// Replaces built-in retry defaults with `config`, keeping explicit settings
    pub(crate) fn apply_retry_defaults(&mut self, config: &RetryConfig) {
        if self.defaulted.timeout {
            self.timeout = Duration::from_millis(config.request_timeout);
        }
        if self.defaulted.timeout_wait {
            self.timeout_wait = Duration::from_millis(config.timeout_wait);
        }
        if self.defaulted.timeout_retries {
            self.timeout_retries = config.timeout_retries;
        }
        self.defaulted = DefaultedRetry::default();
    }

    pub(crate) fn set_cool_down(&mut self, wait: Duration, now: Instant) {
        self.ready_at = if wait.is_zero() {
            None
        } else {
            Some(now + wait)
        };
    }

    /// Spends one timeout retry; returns false when the budget was already empty
    pub(crate) fn consume_timeout_retry(&mut self) -> bool {
        if self.timeout_retries == 0 {
            return false;
        }
        self.timeout_retries -= 1;
        true
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.label(), self.method, self.target)
    }
}

/// Builder for [`WorkItem`]
#[derive(Debug, Clone)]
pub struct WorkItemBuilder {
    target: String,
    callback: Callback,
    name: String,
    method: Method,
    payload: Value,
    headers: BTreeMap<String, String>,
    tags: HashMap<String, Value>,
    timeout: Option<Duration>,
    timeout_wait: Option<Duration>,
    timeout_retries: Option<u32>,
    cool_down: Duration,
}

impl WorkItemBuilder {
    fn new(target: String, callback: Callback) -> Self {
        Self {
            target,
            callback,
            name: String::new(),
            method: Method::Get,
            payload: Value::Null,
            headers: BTreeMap::new(),
            tags: HashMap::new(),
            timeout: None,
            timeout_wait: None,
            timeout_retries: None,
            cool_down: Duration::ZERO,
        }
    }

    /// Applies timeout settings from configuration
    pub fn retry_defaults(mut self, config: &RetryConfig) -> Self {
        self.timeout = Some(Duration::from_millis(config.request_timeout));
        self.timeout_wait = Some(Duration::from_millis(config.timeout_wait));
        self.timeout_retries = Some(config.timeout_retries);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tags(mut self, tags: HashMap<String, Value>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_wait(mut self, wait: Duration) -> Self {
        self.timeout_wait = Some(wait);
        self
    }

    pub fn timeout_retries(mut self, retries: u32) -> Self {
        self.timeout_retries = Some(retries);
        self
    }

    /// Delays the first dispatch by `wait`
    pub fn cool_down(mut self, wait: Duration) -> Self {
        self.cool_down = wait;
        self
    }

    /// Validates the target and produces the work item
    pub fn build(self) -> ItemResult<WorkItem> {
        if self.callback.producer.is_empty() || self.callback.name.is_empty() {
            return Err(ItemError::MissingCallback);
        }

        let target = parse_target(&self.target)?;
        let fingerprint = Fingerprint::compute(self.method.as_str(), target.as_str(), &self.payload);
        let ready_at = if self.cool_down.is_zero() {
            None
        } else {
            Some(Instant::now() + self.cool_down)
        };
        let defaults = RetryConfig::default();
        let defaulted = DefaultedRetry {
            timeout: self.timeout.is_none(),
            timeout_wait: self.timeout_wait.is_none(),
            timeout_retries: self.timeout_retries.is_none(),
        };

        Ok(WorkItem {
            id: next_item_id(),
            name: self.name,
            target,
            method: self.method,
            payload: self.payload,
            headers: self.headers,
            tags: self.tags,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_millis(defaults.request_timeout)),
            timeout_wait: self
                .timeout_wait
                .unwrap_or(Duration::from_millis(defaults.timeout_wait)),
            timeout_retries: self.timeout_retries.unwrap_or(defaults.timeout_retries),
            defaulted,
            ready_at,
            callback: self.callback,
            fingerprint,
        })
    }
}
