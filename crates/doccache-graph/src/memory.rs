//! In-process graph store.
//!
//! Evaluates request trees directly instead of parsing DQL, following
//! Dgraph's rules where the mirror depends on them: type declarations replace
//! the field list, `set` on a uid predicate appends, `orderasc` sorts nested
//! lists, `expand(_all_)` returns scalar predicates, and deleting a bare
//! `{uid}` removes the node. A predicate keeps the value type it was first
//! declared with. Used for tests and dry-run replays.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{DoccacheError, DoccacheResult};
use crate::queries::dql::{Field, QueryBlock, Request, RootFunc, Selection, TYPE_PREDICATE};
use crate::schema::{PredicateKind, Schema};
use crate::store::GraphStore;

#[derive(Debug, Default, Clone)]
struct Node {
    types: Vec<String>,
    scalars: BTreeMap<String, Value>,
    edges: BTreeMap<String, Vec<u64>>,
}

#[derive(Debug, Default)]
struct Graph {
    nodes: BTreeMap<u64, Node>,
    last_uid: u64,
    types: BTreeMap<String, Vec<String>>,
    predicates: BTreeMap<String, PredicateKind>,
}

fn format_uid(uid: u64) -> String {
    format!("0x{:x}", uid)
}

fn parse_uid(uid: &str) -> Option<u64> {
    uid.strip_prefix("0x")
        .and_then(|hex| u64::from_str_radix(hex, 16).ok())
}

impl Graph {
    fn create_node(&mut self) -> u64 {
        self.last_uid += 1;
        self.nodes.insert(self.last_uid, Node::default());
        self.last_uid
    }

    fn resolve_uid(&mut self, obj: &Map<String, Value>, blanks: &mut HashMap<String, u64>) -> DoccacheResult<u64> {
        match obj.get("uid") {
            None => Ok(self.create_node()),
            Some(Value::String(uid)) => {
                if let Some(name) = uid.strip_prefix("_:") {
                    if let Some(existing) = blanks.get(name) {
                        return Ok(*existing);
                    }
                    let created = self.create_node();
                    blanks.insert(name.to_string(), created);
                    return Ok(created);
                }
                parse_uid(uid)
                    .filter(|id| self.nodes.contains_key(id))
                    .ok_or_else(|| DoccacheError::store(format!("unknown uid {}", uid)))
            }
            Some(other) => Err(DoccacheError::store(format!("invalid uid {}", other))),
        }
    }

    fn ingest(&mut self, obj: &Map<String, Value>, blanks: &mut HashMap<String, u64>) -> DoccacheResult<u64> {
        let uid = self.resolve_uid(obj, blanks)?;

        for (key, value) in obj {
            if key == "uid" {
                continue;
            }

            if key == TYPE_PREDICATE {
                let names: Vec<String> = match value {
                    Value::String(s) => vec![s.clone()],
                    Value::Array(items) => items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };
                let node = self.node_mut(uid)?;
                for name in names {
                    if !node.types.contains(&name) {
                        node.types.push(name);
                    }
                }
                continue;
            }

            let children: Option<Vec<&Map<String, Value>>> = match value {
                Value::Object(child) => Some(vec![child]),
                Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                    Some(items.iter().filter_map(Value::as_object).collect())
                }
                _ => None,
            };

            match children {
                Some(children) => {
                    let mut targets = Vec::with_capacity(children.len());
                    for child in children {
                        targets.push(self.ingest(child, blanks)?);
                    }
                    let list = self.node_mut(uid)?.edges.entry(key.clone()).or_default();
                    for target in targets {
                        if !list.contains(&target) {
                            list.push(target);
                        }
                    }
                }
                None if value.is_null() => {}
                None => {
                    self.node_mut(uid)?.scalars.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(uid)
    }

    fn delete(&mut self, obj: &Map<String, Value>) -> DoccacheResult<()> {
        let uid = match obj.get("uid").and_then(Value::as_str).and_then(parse_uid) {
            Some(uid) => uid,
            None => return Err(DoccacheError::store("delete requires an existing uid")),
        };
        if !self.nodes.contains_key(&uid) {
            return Ok(());
        }

        let predicates: Vec<(&String, &Value)> = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "uid" && k.as_str() != TYPE_PREDICATE)
            .collect();

        if predicates.is_empty() {
            self.nodes.remove(&uid);
            for node in self.nodes.values_mut() {
                for targets in node.edges.values_mut() {
                    targets.retain(|t| *t != uid);
                }
            }
            return Ok(());
        }

        let node = self.node_mut(uid)?;
        for (key, value) in predicates {
            let targets: Vec<u64> = match value {
                Value::Object(child) => child
                    .get("uid")
                    .and_then(Value::as_str)
                    .and_then(parse_uid)
                    .into_iter()
                    .collect(),
                Value::Array(items) => items
                    .iter()
                    .filter_map(|v| v.get("uid").and_then(Value::as_str).and_then(parse_uid))
                    .collect(),
                Value::Null => {
                    node.scalars.remove(key);
                    node.edges.remove(key);
                    continue;
                }
                scalar => {
                    if node.scalars.get(key) == Some(scalar) {
                        node.scalars.remove(key);
                    }
                    continue;
                }
            };
            if let Some(list) = node.edges.get_mut(key) {
                list.retain(|t| !targets.contains(t));
            }
        }
        Ok(())
    }

    fn node_mut(&mut self, uid: u64) -> DoccacheResult<&mut Node> {
        self.nodes
            .get_mut(&uid)
            .ok_or_else(|| DoccacheError::store(format!("unknown uid {}", format_uid(uid))))
    }

    fn run_block(&self, block: &QueryBlock, variables: &BTreeMap<String, String>) -> DoccacheResult<Value> {
        let (predicate, wanted): (&str, Vec<&str>) = match &block.func {
            RootFunc::Eq { predicate, var } => {
                let value = variables
                    .get(var)
                    .ok_or_else(|| DoccacheError::store(format!("variable ${} not bound", var)))?;
                (predicate.as_str(), vec![value.as_str()])
            }
            RootFunc::EqAny { predicate, values } => {
                (predicate.as_str(), values.iter().map(String::as_str).collect())
            }
        };

        let matches: Vec<Value> = self
            .nodes
            .iter()
            .filter(|(_, node)| {
                node.scalars
                    .get(predicate)
                    .and_then(Value::as_str)
                    .map(|v| wanted.contains(&v))
                    .unwrap_or(false)
            })
            .map(|(uid, _)| Value::Object(self.project(*uid, &block.selection)))
            .collect();

        let mut data = Map::new();
        data.insert(block.name.clone(), Value::Array(matches));
        Ok(Value::Object(data))
    }

    fn project(&self, uid: u64, selection: &Selection) -> Map<String, Value> {
        let mut out = Map::new();
        let node = match self.nodes.get(&uid) {
            Some(node) => node,
            None => return out,
        };

        for field in &selection.fields {
            match field {
                Field::Predicate(name) if name == "uid" => {
                    out.insert("uid".to_string(), Value::String(format_uid(uid)));
                }
                Field::Predicate(name) if name == TYPE_PREDICATE => {
                    if !node.types.is_empty() {
                        out.insert(name.clone(), json!(node.types));
                    }
                }
                Field::Predicate(name) => {
                    if let Some(value) = node.scalars.get(name) {
                        out.insert(name.clone(), value.clone());
                    }
                }
                Field::ExpandAll => {
                    for (name, value) in &node.scalars {
                        out.insert(name.clone(), value.clone());
                    }
                }
                Field::Edge(edge) => {
                    let mut targets: Vec<u64> = node
                        .edges
                        .get(&edge.predicate)
                        .map(|t| t.iter().copied().filter(|id| self.nodes.contains_key(id)).collect())
                        .unwrap_or_default();

                    if let Some(order) = &edge.order_asc {
                        targets.sort_by(|a, b| {
                            compare_values(
                                self.nodes[a].scalars.get(order),
                                self.nodes[b].scalars.get(order),
                            )
                        });
                    }

                    let expanded: Vec<Value> = targets
                        .into_iter()
                        .map(|t| Value::Object(self.project(t, &edge.selection)))
                        .collect();
                    if !expanded.is_empty() {
                        out.insert(edge.predicate.clone(), Value::Array(expanded));
                    }
                }
            }
        }
        out
    }

    fn describe_types(&self, names: &[String]) -> Value {
        let types: Vec<Value> = names
            .iter()
            .filter_map(|name| {
                self.types.get(name).map(|fields| {
                    let fields: Vec<Value> = fields.iter().map(|f| json!({ "name": f })).collect();
                    json!({ "name": name, "fields": fields })
                })
            })
            .collect();

        if types.is_empty() {
            json!({})
        } else {
            json!({ "types": types })
        }
    }
}

/// Missing values sort last; numbers numerically, strings lexically.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// A graph store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: Mutex<Graph>,
    schema_updates: AtomicUsize,
    queries: AtomicUsize,
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of schema updates received.
    pub fn schema_update_count(&self) -> usize {
        self.schema_updates.load(AtomicOrdering::SeqCst)
    }

    /// Number of read requests received.
    pub fn query_count(&self) -> usize {
        self.queries.load(AtomicOrdering::SeqCst)
    }

    /// Number of mutations received, edge mutations included.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(AtomicOrdering::SeqCst)
    }

    /// Number of nodes currently stored.
    pub fn node_count(&self) -> usize {
        self.graph.lock().map(|g| g.nodes.len()).unwrap_or(0)
    }

    /// Declared fields of type `name`.
    pub fn type_fields(&self, name: &str) -> Vec<String> {
        self.graph
            .lock()
            .ok()
            .and_then(|g| g.types.get(name).cloned())
            .unwrap_or_default()
    }

    fn graph(&self) -> DoccacheResult<MutexGuard<'_, Graph>> {
        self.graph
            .lock()
            .map_err(|_| DoccacheError::store("memory store lock poisoned"))
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn update_schema(&self, schema: &Schema) -> DoccacheResult<()> {
        let mut graph = self.graph()?;
        for pred in &schema.predicates {
            match graph.predicates.get(&pred.name) {
                Some(kind) if *kind != pred.kind => {
                    return Err(DoccacheError::Schema(format!(
                        "predicate {} is {}, cannot redeclare as {}",
                        pred.name,
                        kind.as_str(),
                        pred.kind.as_str()
                    )));
                }
                _ => {}
            }
        }

        for ty in &schema.types {
            graph.types.insert(ty.name.clone(), ty.fields.clone());
        }
        for pred in &schema.predicates {
            graph.predicates.insert(pred.name.clone(), pred.kind);
        }
        self.schema_updates.fetch_add(1, AtomicOrdering::SeqCst);
        debug!(types = schema.types.len(), predicates = schema.predicates.len(), "Memory schema updated");
        Ok(())
    }

    async fn query(&self, request: &Request) -> DoccacheResult<Value> {
        let graph = self.graph()?;
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        match request {
            Request::Block { block, variables } => graph.run_block(block, variables),
            Request::Schema { types } => Ok(graph.describe_types(types)),
        }
    }

    async fn mutate(&self, graph_json: &Value, delete: bool) -> DoccacheResult<HashMap<String, String>> {
        let objects: Vec<&Map<String, Value>> = match graph_json {
            Value::Object(obj) => vec![obj],
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            _ => return Err(DoccacheError::store("mutation must be an object or an array of objects")),
        };

        let mut graph = self.graph()?;
        let mut blanks = HashMap::new();
        for obj in objects {
            if delete {
                graph.delete(obj)?;
            } else {
                graph.ingest(obj, &mut blanks)?;
            }
        }
        self.mutations.fetch_add(1, AtomicOrdering::SeqCst);

        Ok(blanks
            .into_iter()
            .map(|(name, uid)| (name, format_uid(uid)))
            .collect())
    }
}
