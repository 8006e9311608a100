use crate::{
    counters::AggregateCounters,
    error::DeckError,
    filters::ConflictSet,
    plugin::{lenient_list, null_as_default, PluginRecord, RawMessage, RawTag},
    sync::{self, PluginUpdate},
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    any::Any,
    collections::BTreeMap,
    fs,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread,
    time::Duration,
};

pub const CONFLICT_QUERY: &str = "getConflictingPlugins";
const USER_AGENT: &str = concat!("plugindeck/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl EngineRequest {
    pub fn conflicting_plugins(plugin: &str) -> Self {
        Self {
            name: CONFLICT_QUERY.to_string(),
            args: vec![plugin.to_string()],
        }
    }
}

/// Fresh engine data for one plugin, plus whether it conflicts with the
/// plugin the query was made for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub crc: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_empty: bool,
    #[serde(default, deserialize_with = "lenient_list")]
    pub messages: Vec<RawMessage>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tags: Vec<RawTag>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_dirty: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conflicts: bool,
}

pub type ConflictResponse = BTreeMap<String, ConflictData>;

/// The sorting engine, seen only through its query call. The reply is the
/// raw JSON text.
pub trait ConflictEngine: Send + Sync {
    fn query(&self, request: &EngineRequest) -> Result<String>;
}

/// Used when no engine is configured; every query fails.
pub struct UnavailableEngine;

impl ConflictEngine for UnavailableEngine {
    fn query(&self, request: &EngineRequest) -> Result<String> {
        bail!("no conflict engine configured for {}", request.name)
    }
}

/// Posts the request JSON to an engine that listens on HTTP.
pub struct HttpEngine {
    url: String,
    agent: ureq::Agent,
}

impl HttpEngine {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(timeout)
            .timeout_write(Duration::from_secs(10))
            .build();
        Self {
            url: url.into(),
            agent,
        }
    }
}

impl ConflictEngine for HttpEngine {
    fn query(&self, request: &EngineRequest) -> Result<String> {
        let body = serde_json::to_value(request).context("encode engine request")?;
        let response = self
            .agent
            .post(&self.url)
            .set("User-Agent", USER_AGENT)
            .send_json(body)
            .with_context(|| format!("query engine at {}", self.url))?;
        response.into_string().context("read engine response")
    }
}

/// Serves precomputed answers from a JSON file keyed by filter plugin name.
pub struct FileEngine {
    path: PathBuf,
}

impl FileEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConflictEngine for FileEngine {
    fn query(&self, request: &EngineRequest) -> Result<String> {
        if request.name != CONFLICT_QUERY {
            bail!("unsupported engine query: {}", request.name);
        }
        let plugin = request
            .args
            .first()
            .context("conflict query without plugin name")?;
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read conflict data {}", self.path.display()))?;
        let mut answers: BTreeMap<String, Value> =
            serde_json::from_str(&raw).context("parse conflict data")?;
        let answer = answers.remove(plugin).unwrap_or(Value::Null);
        Ok(answer.to_string())
    }
}

/// Parses an engine reply. `null`, `false`, an empty string and an empty
/// object all mean "no data".
pub fn parse_response(plugin: &str, raw: &str) -> Result<Option<ConflictResponse>, DeckError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|source| DeckError::MalformedResponse {
            plugin: plugin.to_string(),
            source,
        })?;
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Object(ref map) if map.is_empty() => Ok(None),
        other => serde_json::from_value(other)
            .map(Some)
            .map_err(|source| DeckError::MalformedResponse {
                plugin: plugin.to_string(),
                source,
            }),
    }
}

pub enum ConflictMessage {
    Completed {
        plugin: String,
        response: Option<ConflictResponse>,
    },
    Failed {
        plugin: String,
        error: String,
    },
}

impl ConflictMessage {
    pub fn plugin(&self) -> &str {
        match self {
            ConflictMessage::Completed { plugin, .. } | ConflictMessage::Failed { plugin, .. } => {
                plugin
            }
        }
    }
}

/// Runs one query against the engine and classifies the outcome.
pub fn query_conflicts(engine: &dyn ConflictEngine, plugin: &str) -> ConflictMessage {
    let request = EngineRequest::conflicting_plugins(plugin);
    let result = engine
        .query(&request)
        .and_then(|raw| parse_response(plugin, &raw).map_err(anyhow::Error::from));
    match result {
        Ok(response) => ConflictMessage::Completed {
            plugin: plugin.to_string(),
            response,
        },
        Err(err) => ConflictMessage::Failed {
            plugin: plugin.to_string(),
            error: format!("{err:#}"),
        },
    }
}

/// Owns the single outstanding engine query. The query runs on a worker
/// thread; its result comes back through the channel and is picked up with
/// [`ConflictResolver::poll`] or [`ConflictResolver::wait`].
pub struct ConflictResolver {
    engine: Arc<dyn ConflictEngine>,
    tx: Sender<ConflictMessage>,
    rx: Receiver<ConflictMessage>,
    active: Option<String>,
}

impl ConflictResolver {
    pub fn new(engine: Arc<dyn ConflictEngine>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            engine,
            tx,
            rx,
            active: None,
        }
    }

    pub fn active_plugin(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Starts a query unless one is already in flight. Returns whether a new
    /// query was started.
    pub fn start(&mut self, plugin: &str) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some(plugin.to_string());
        tracing::info!(plugin, "conflict query started");

        let tx = self.tx.clone();
        let engine = Arc::clone(&self.engine);
        let plugin = plugin.to_string();
        thread::spawn(move || {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| query_conflicts(engine.as_ref(), &plugin)));
            let message = outcome.unwrap_or_else(|payload| ConflictMessage::Failed {
                error: format!("conflict engine panicked: {}", panic_text(payload.as_ref())),
                plugin,
            });
            let _ = tx.send(message);
        });
        true
    }

    pub fn poll(&mut self) -> Option<ConflictMessage> {
        match self.rx.try_recv() {
            Ok(message) => {
                self.active = None;
                Some(message)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocks until the in-flight query reports back.
    pub fn wait(&mut self) -> Option<ConflictMessage> {
        self.active.as_ref()?;
        let message = self.rx.recv().ok();
        self.active = None;
        message
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text
    } else {
        "unknown panic"
    }
}

/// Folds an engine reply into the collection and returns the names the
/// conflict filter should let through. The filter plugin is always included.
pub fn merge_response(
    plugins: &mut [PluginRecord],
    counters: &mut AggregateCounters,
    filter_plugin: &str,
    response: Option<ConflictResponse>,
) -> ConflictSet {
    let mut conflicts = ConflictSet::new();
    conflicts.insert(filter_plugin.to_string());

    let Some(response) = response else {
        return conflicts;
    };

    for (name, data) in response {
        if data.conflicts {
            conflicts.insert(name.clone());
        }
        let Some(record) = plugins.iter_mut().find(|plugin| plugin.name == name) else {
            tracing::debug!(plugin = %name, "conflict data for plugin not in load order");
            continue;
        };
        sync::apply_update(
            record,
            PluginUpdate {
                crc: Some(data.crc),
                is_empty: Some(data.is_empty),
                messages: Some(data.messages),
                tags: Some(data.tags),
                is_dirty: Some(data.is_dirty),
                ..PluginUpdate::default()
            },
            counters,
        );
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{MessageType, RawPlugin};
    use serde_json::json;
    use std::{io::Write, sync::Mutex};

    struct CannedEngine {
        reply: String,
        seen: Mutex<Vec<EngineRequest>>,
    }

    impl CannedEngine {
        fn new(reply: Value) -> Self {
            Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ConflictEngine for CannedEngine {
        fn query(&self, request: &EngineRequest) -> Result<String> {
            self.seen.lock().expect("lock").push(request.clone());
            Ok(self.reply.clone())
        }
    }

    struct BrokenEngine;

    impl ConflictEngine for BrokenEngine {
        fn query(&self, _request: &EngineRequest) -> Result<String> {
            bail!("connection reset")
        }
    }

    fn plugins() -> Vec<PluginRecord> {
        ["A.esp", "B.esp", "F.esp"]
            .iter()
            .map(|name| PluginRecord::new(name.to_string(), RawPlugin::default()))
            .collect()
    }

    fn resolve(engine: Arc<dyn ConflictEngine>, records: &mut [PluginRecord]) -> ConflictSet {
        let mut counters = AggregateCounters::from_plugins(records);
        let mut resolver = ConflictResolver::new(engine);
        assert!(resolver.start("F.esp"));
        let message = resolver.wait().expect("reply");
        assert!(!resolver.is_active());
        match message {
            ConflictMessage::Completed { plugin, response } => {
                merge_response(records, &mut counters, &plugin, response)
            }
            ConflictMessage::Failed { plugin, .. } => {
                merge_response(records, &mut counters, &plugin, None)
            }
        }
    }

    fn set(names: &[&str]) -> ConflictSet {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn request_uses_engine_query_shape() {
        let request = EngineRequest::conflicting_plugins("F.esp");
        assert_eq!(
            serde_json::to_value(&request).expect("encode"),
            json!({ "name": "getConflictingPlugins", "args": ["F.esp"] })
        );
    }

    #[test]
    fn successful_reply_yields_filter_plugin_and_conflicts() {
        let engine = Arc::new(CannedEngine::new(json!({
            "A.esp": { "crc": 1, "isEmpty": false, "messages": [], "tags": [], "isDirty": false, "conflicts": true },
            "B.esp": { "crc": 2, "isEmpty": false, "messages": [], "tags": [], "isDirty": false, "conflicts": false },
        })));
        let mut records = plugins();
        let conflicts = resolve(engine.clone(), &mut records);
        assert_eq!(conflicts, set(&["F.esp", "A.esp"]));
        let seen = engine.seen.lock().expect("lock");
        assert_eq!(seen.as_slice(), &[EngineRequest::conflicting_plugins("F.esp")]);
    }

    #[test]
    fn transport_failure_yields_only_filter_plugin() {
        let mut records = plugins();
        let conflicts = resolve(Arc::new(BrokenEngine), &mut records);
        assert_eq!(conflicts, set(&["F.esp"]));
    }

    #[test]
    fn null_reply_yields_only_filter_plugin() {
        let mut records = plugins();
        let conflicts = resolve(Arc::new(CannedEngine::new(Value::Null)), &mut records);
        assert_eq!(conflicts, set(&["F.esp"]));
    }

    #[test]
    fn malformed_reply_is_a_failure() {
        struct GarbageEngine;
        impl ConflictEngine for GarbageEngine {
            fn query(&self, _request: &EngineRequest) -> Result<String> {
                Ok("{not json".to_string())
            }
        }
        match query_conflicts(&GarbageEngine, "F.esp") {
            ConflictMessage::Failed { plugin, error } => {
                assert_eq!(plugin, "F.esp");
                assert!(error.contains("malformed"));
            }
            ConflictMessage::Completed { .. } => panic!("garbage reply accepted"),
        }
    }

    #[test]
    fn empty_replies_mean_no_data() {
        assert!(parse_response("F.esp", "").expect("empty").is_none());
        assert!(parse_response("F.esp", "false").expect("false").is_none());
        assert!(parse_response("F.esp", "{}").expect("object").is_none());
    }

    #[test]
    fn merge_updates_records_and_counters() {
        let mut records = plugins();
        let mut counters = AggregateCounters::from_plugins(&records);
        let response: ConflictResponse = serde_json::from_value(json!({
            "B.esp": {
                "crc": 0xff,
                "isEmpty": true,
                "messages": [
                    { "type": "warn", "content": [{ "str": "Contains dirty edits" }] },
                    { "type": "error", "content": [{ "str": "Missing master" }] },
                ],
                "tags": [{ "name": "Delev" }, { "name": "-Relev" }],
                "isDirty": true,
                "conflicts": true,
            },
            "Unknown.esp": { "conflicts": true },
        }))
        .expect("response");

        let conflicts = merge_response(&mut records, &mut counters, "F.esp", Some(response));
        assert_eq!(conflicts, set(&["F.esp", "B.esp", "Unknown.esp"]));

        let b = &records[1];
        assert_eq!(b.crc_display(), "000000FF");
        assert!(b.is_empty);
        assert!(b.is_dirty());
        assert_eq!(b.tags_added(), "Delev");
        assert_eq!(b.tags_removed(), "Relev");
        assert_eq!(b.messages()[0].kind, MessageType::Warn);
        assert_eq!(b.messages()[1].content, "Missing master");

        assert_eq!(counters.total_messages, 2);
        assert_eq!(counters.total_warnings, 1);
        assert_eq!(counters.total_errors, 1);
        assert_eq!(counters.dirty_plugin_count, 1);
    }

    #[test]
    fn panicking_engine_reports_failure_and_frees_resolver() {
        struct PanickingEngine;
        impl ConflictEngine for PanickingEngine {
            fn query(&self, _request: &EngineRequest) -> Result<String> {
                panic!("engine crashed")
            }
        }
        let mut resolver = ConflictResolver::new(Arc::new(PanickingEngine));
        assert!(resolver.start("F.esp"));
        match resolver.wait().expect("reply") {
            ConflictMessage::Failed { plugin, error } => {
                assert_eq!(plugin, "F.esp");
                assert!(error.contains("engine crashed"));
            }
            ConflictMessage::Completed { .. } => panic!("panic reported as success"),
        }
        assert!(!resolver.is_active());
        assert!(resolver.start("F.esp"));
        assert!(resolver.wait().is_some());
    }

    #[test]
    fn second_start_is_refused_while_in_flight() {
        let mut resolver = ConflictResolver::new(Arc::new(CannedEngine::new(Value::Null)));
        assert!(resolver.start("F.esp"));
        assert!(!resolver.start("G.esp"));
        assert_eq!(resolver.active_plugin(), Some("F.esp"));
        assert!(resolver.wait().is_some());
        assert!(resolver.start("G.esp"));
        assert!(resolver.wait().is_some());
    }

    #[test]
    fn file_engine_answers_by_plugin_name() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            "{}",
            json!({ "F.esp": { "A.esp": { "conflicts": true } } })
        )
        .expect("write");
        let engine = FileEngine::new(file.path());

        let raw = engine
            .query(&EngineRequest::conflicting_plugins("F.esp"))
            .expect("query");
        let response = parse_response("F.esp", &raw).expect("parse").expect("data");
        assert!(response["A.esp"].conflicts);

        let missing = engine
            .query(&EngineRequest::conflicting_plugins("Other.esp"))
            .expect("query");
        assert!(parse_response("Other.esp", &missing).expect("parse").is_none());
    }

    #[test]
    fn unavailable_engine_always_fails() {
        assert!(UnavailableEngine
            .query(&EngineRequest::conflicting_plugins("F.esp"))
            .is_err());
    }
}
