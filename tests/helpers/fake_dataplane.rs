//! In-memory Data Plane API served by wiremock.
//!
//! Implements just enough of the real API to exercise the client: configuration versions,
//! transactions that stage changes on a copy of the committed configuration, commits that are
//! refused when the configuration moved on, and injectable faults.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, ResponseTemplate, Respond};

use haptik_dataplane::requests::ApiVersion;
use haptik_dataplane::{Connection, ConnectionBuilder, Orchestrator, RetryPolicy};

const CONFIGURATION: &str = "/services/haproxy/configuration";
const TRANSACTIONS: &str = "/services/haproxy/transactions";

/// Collections keyed by path plus sorted query, objects kept in insertion order.
type Store = BTreeMap<String, Vec<(String, Value)>>;

/// A canned failure returned instead of processing a matching request.
#[derive(Clone, Debug)]
pub struct Fault {
    /// `read`, `create`, `replace`, `delete`, `commit` or `rollback`.
    action: &'static str,
    /// Substring of the target, e.g. `/backends/be_app/servers`.
    target: String,
    status: u16,
    message: String,
    /// `None` fails forever.
    remaining: Option<u32>,
}

impl Fault {
    pub fn new(action: &'static str, target: &str, status: u16, message: &str) -> Self {
        Self {
            action,
            target: target.to_string(),
            status,
            message: message.to_string(),
            remaining: None,
        }
    }

    pub fn times(mut self, times: u32) -> Self {
        self.remaining = Some(times);
        self
    }
}

struct StagedTransaction {
    base_version: i64,
    store: Store,
}

#[derive(Default)]
struct State {
    version: i64,
    committed: Store,
    transactions: HashMap<String, StagedTransaction>,
    next_transaction: u32,
    events: Vec<String>,
    faults: Vec<Fault>,
}

pub struct FakeDataplane {
    server: MockServer,
    state: Arc<Mutex<State>>,
    api_version: ApiVersion,
}

/// Route client logs to the test output; `RUST_LOG=haptik_dataplane=debug` shows requests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl FakeDataplane {
    pub async fn start(api_version: ApiVersion) -> Self {
        init_tracing();
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(State {
            version: 1,
            ..State::default()
        }));

        Mock::given(any())
            .respond_with(Responder {
                state: state.clone(),
                prefix: format!("/{}", api_version.segment()),
                api_version,
            })
            .mount(&server)
            .await;

        Self {
            server,
            state,
            api_version,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn connection(&self) -> Connection {
        ConnectionBuilder::new(self.uri())
            .credentials("admin", "adminpwd")
            .api_version(self.api_version)
            .connect()
            .unwrap()
    }

    /// An orchestrator that retries quickly.
    pub fn orchestrator(&self, max_attempts: u32) -> Orchestrator {
        Orchestrator::with_policy(
            self.connection(),
            RetryPolicy::new(max_attempts, std::time::Duration::from_millis(5)),
        )
    }

    pub fn fail(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push(fault);
    }

    /// Simulate another writer committing a change.
    pub fn bump_version(&self) {
        self.state.lock().unwrap().version += 1;
    }

    pub fn version(&self) -> i64 {
        self.state.lock().unwrap().version
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    /// Events starting with `prefix`, e.g. `begin` or `commit`.
    pub fn events_of(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| event.starts_with(prefix))
            .collect()
    }

    /// Mutations only, without the transaction bookkeeping.
    pub fn changes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| {
                event.starts_with("create ")
                    || event.starts_with("replace ")
                    || event.starts_with("delete ")
            })
            .collect()
    }

    pub fn open_transactions(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    /// Every committed object, for checking that nothing leaked.
    pub fn committed_objects(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .committed
            .values()
            .map(|objects| objects.len())
            .sum()
    }
}

struct Responder {
    state: Arc<Mutex<State>>,
    prefix: String,
    api_version: ApiVersion,
}

fn error(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({ "code": status, "message": message }))
}

/// Split `/a/b/c` into (`/a/b`, `c`).
fn split_last(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

fn with_query(path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}?{}", path, pairs.join("&"))
}

fn key_of(object: &Value) -> Option<String> {
    match (object.get("name"), object.get("index")) {
        (Some(Value::String(name)), _) => Some(name.clone()),
        (_, Some(Value::Number(index))) => Some(index.to_string()),
        _ => None,
    }
}

impl Responder {
    fn wrap(&self, version: i64, payload: Value) -> Value {
        match self.api_version {
            ApiVersion::V2 => json!({ "_version": version, "data": payload }),
            ApiVersion::V3 => payload,
        }
    }

    fn take_fault(state: &mut State, action: &str, target: &str) -> Option<ResponseTemplate> {
        let position = state.faults.iter().position(|fault| {
            fault.action == action
                && target.contains(&fault.target)
                && fault.remaining.map_or(true, |n| n > 0)
        })?;
        let fault = &mut state.faults[position];
        if let Some(n) = fault.remaining.as_mut() {
            *n -= 1;
        }
        let response = error(fault.status, &fault.message);
        state.events.push(format!("fault {} {}", action, target));
        Some(response)
    }

    fn transactions(&self, state: &mut State, method: &str, rest: &str, request: &Request) -> ResponseTemplate {
        let id = rest.trim_start_matches('/');
        match (method, id.is_empty()) {
            ("POST", true) => {
                let version = request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "version")
                    .and_then(|(_, v)| v.parse::<i64>().ok());
                let version = match version {
                    Some(version) => version,
                    None => return error(400, "version or transaction not specified"),
                };
                if version != state.version {
                    return error(409, "version mismatch");
                }
                state.next_transaction += 1;
                let id = format!("tx-{}", state.next_transaction);
                state.transactions.insert(
                    id.clone(),
                    StagedTransaction {
                        base_version: version,
                        store: state.committed.clone(),
                    },
                );
                state.events.push(format!("begin {}", id));
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "id": id, "_version": version, "status": "in_progress" }))
            }
            ("PUT", false) => {
                if let Some(response) = Self::take_fault(state, "commit", id) {
                    return response;
                }
                let base_version = match state.transactions.get(id) {
                    Some(transaction) => transaction.base_version,
                    None => return error(404, &format!("transaction {} does not exist", id)),
                };
                if base_version != state.version {
                    state.events.push(format!("outdated {}", id));
                    return error(
                        406,
                        &format!("transaction {} is outdated and cannot be committed", id),
                    );
                }
                let Some(transaction) = state.transactions.remove(id) else {
                    return error(404, &format!("transaction {} does not exist", id));
                };
                state.committed = transaction.store;
                state.version += 1;
                state.events.push(format!("commit {}", id));
                ResponseTemplate::new(202).set_body_json(json!({ "id": id, "status": "success" }))
            }
            ("DELETE", false) => {
                if let Some(response) = Self::take_fault(state, "rollback", id) {
                    return response;
                }
                match state.transactions.remove(id) {
                    Some(_) => {
                        state.events.push(format!("rollback {}", id));
                        ResponseTemplate::new(204)
                    }
                    None => error(404, &format!("transaction {} does not exist", id)),
                }
            }
            _ => error(405, "method not allowed"),
        }
    }

    fn configuration(&self, state: &mut State, method: &str, rest: &str, request: &Request) -> ResponseTemplate {
        if rest == "/version" && method == "GET" {
            return ResponseTemplate::new(200).set_body_json(json!(state.version));
        }

        let mut transaction_id = None;
        let mut query: Vec<(String, String)> = Vec::new();
        for (key, value) in request.url.query_pairs().into_owned() {
            if key == "transaction_id" {
                transaction_id = Some(value);
            } else {
                query.push((key, value));
            }
        }
        query.sort();

        let action = match method {
            "GET" => "read",
            "POST" => "create",
            "PUT" => "replace",
            "DELETE" => "delete",
            _ => return error(405, "method not allowed"),
        };
        let target = with_query(rest, &query);
        if let Some(response) = Self::take_fault(state, action, &target) {
            return response;
        }

        if action != "read" && transaction_id.is_none() {
            return error(400, "version or transaction not specified");
        }
        let version = state.version;
        let store = match &transaction_id {
            Some(id) => match state.transactions.get_mut(id) {
                Some(transaction) => &mut transaction.store,
                None => return error(404, &format!("transaction {} does not exist", id)),
            },
            None => &mut state.committed,
        };

        let (parent, last) = split_last(rest);
        let collection = with_query(rest, &query);
        let parent_collection = with_query(parent, &query);

        let response = match action {
            "read" => {
                if let Some(objects) = store.get(&collection) {
                    let list: Vec<Value> = objects.iter().map(|(_, v)| v.clone()).collect();
                    return ResponseTemplate::new(200).set_body_json(self.wrap(version, json!(list)));
                }
                match store
                    .get(&parent_collection)
                    .and_then(|objects| objects.iter().find(|(k, _)| k == last))
                {
                    Some((_, object)) => {
                        return ResponseTemplate::new(200)
                            .set_body_json(self.wrap(version, object.clone()))
                    }
                    None => return error(404, &format!("missing object: {}", target)),
                }
            }
            "create" => {
                let object: Value = match serde_json::from_slice(&request.body) {
                    Ok(object) => object,
                    Err(_) => return error(400, "invalid JSON body"),
                };
                let (collection, key) = if last.parse::<i64>().is_ok() {
                    (parent_collection.clone(), last.to_string())
                } else {
                    match key_of(&object) {
                        Some(key) => (collection.clone(), key),
                        None => return error(422, "object has no name or index"),
                    }
                };
                let objects = store.entry(collection.clone()).or_default();
                if objects.iter().any(|(k, _)| *k == key) {
                    return error(409, &format!("object {} already exists", key));
                }
                objects.push((key.clone(), object.clone()));
                (
                    format!("create {}", with_query(&format!("{}/{}", rest_path(&collection), key), &query_of(&collection))),
                    ResponseTemplate::new(201).set_body_json(self.wrap(version, object)),
                )
            }
            "replace" => {
                let object: Value = match serde_json::from_slice(&request.body) {
                    Ok(object) => object,
                    Err(_) => return error(400, "invalid JSON body"),
                };
                match store
                    .get_mut(&parent_collection)
                    .and_then(|objects| objects.iter_mut().find(|(k, _)| k == last))
                {
                    Some(slot) => slot.1 = object.clone(),
                    None => return error(404, &format!("missing object: {}", target)),
                }
                (
                    format!("replace {}", target),
                    ResponseTemplate::new(200).set_body_json(self.wrap(version, object)),
                )
            }
            _ => {
                let objects = match store.get_mut(&parent_collection) {
                    Some(objects) => objects,
                    None => return error(404, &format!("missing object: {}", target)),
                };
                match objects.iter().position(|(k, _)| k == last) {
                    Some(position) => {
                        objects.remove(position);
                    }
                    None => return error(404, &format!("missing object: {}", target)),
                }
                (format!("delete {}", target), ResponseTemplate::new(204))
            }
        };

        state.events.push(response.0);
        response.1
    }
}

/// Path part of a collection key.
fn rest_path(collection: &str) -> &str {
    collection.split('?').next().unwrap_or(collection)
}

/// Query part of a collection key.
fn query_of(collection: &str) -> Vec<(String, String)> {
    match collection.split_once('?') {
        Some((_, query)) => query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        None => Vec::new(),
    }
}

impl Respond for Responder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock().unwrap();
        let method = request.method.as_str().to_string();
        let path = request.url.path().to_string();

        let path = match path.strip_prefix(&self.prefix) {
            Some(path) => path,
            None => return error(404, "unknown API version"),
        };

        if let Some(rest) = path.strip_prefix(TRANSACTIONS) {
            return self.transactions(&mut state, &method, rest, request);
        }
        if let Some(rest) = path.strip_prefix(CONFIGURATION) {
            return self.configuration(&mut state, &method, rest, request);
        }
        error(404, "not found")
    }
}
