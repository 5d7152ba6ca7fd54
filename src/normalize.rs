use log::{debug, info};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::utils::extract_json_value;

pub const DEFAULT_NODE_TYPE: &str = "process";

const NODE_LIST_FIELDS: &[&str] = &["nodes", "elements"];
const CONNECTION_LIST_FIELDS: &[&str] = &["connections", "edges", "links"];
const NODE_ID_FIELDS: &[&str] = &["id", "key"];
const NODE_TEXT_FIELDS: &[&str] = &["text", "label", "name"];
const NODE_TYPE_FIELDS: &[&str] = &["type", "kind", "nodeType"];
const SOURCE_FIELDS: &[&str] = &["from", "sourceId", "source"];
const TARGET_FIELDS: &[&str] = &["to", "targetId", "target"];
const LABEL_FIELDS: &[&str] = &["label", "text"];

const MAX_UNWRAP_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedNode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl NormalizedNode {
    pub fn is_decision(&self) -> bool {
        self.kind.trim().eq_ignore_ascii_case("decision")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedConnection {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "reason", content = "detail")]
pub enum FallbackReason {
    /// Nothing resembling a diagram could be parsed.
    MalformedResponse,
    /// A diagram was found but no node survived normalization.
    EmptyDiagram,
    /// A normalization stage failed; the message describes why.
    Recovered(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagramOrigin {
    Parsed,
    Fallback(FallbackReason),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDiagram {
    pub nodes: Vec<NormalizedNode>,
    pub connections: Vec<NormalizedConnection>,
    pub origin: DiagramOrigin,
    /// True when the connections were synthesized as a linear chain.
    pub synthesized_chain: bool,
    /// Number of connection endpoints that fell back to a default node.
    pub defaulted_endpoints: usize,
}

impl NormalizedDiagram {
    /// The fixed start → process → end diagram.
    pub fn fallback(reason: FallbackReason) -> Self {
        let nodes = vec![
            NormalizedNode {
                id: "node1".to_string(),
                original_id: None,
                text: "Start".to_string(),
                kind: "start".to_string(),
            },
            NormalizedNode {
                id: "node2".to_string(),
                original_id: None,
                text: "Process".to_string(),
                kind: "process".to_string(),
            },
            NormalizedNode {
                id: "node3".to_string(),
                original_id: None,
                text: "End".to_string(),
                kind: "end".to_string(),
            },
        ];
        let connections = chain_connections(&nodes);

        Self {
            nodes,
            connections,
            origin: DiagramOrigin::Fallback(reason),
            synthesized_chain: true,
            defaulted_endpoints: 0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, DiagramOrigin::Fallback(_))
    }

    pub fn is_error_recovery(&self) -> bool {
        matches!(
            self.origin,
            DiagramOrigin::Fallback(FallbackReason::Recovered(_))
        )
    }

    pub fn node(&self, id: &str) -> Option<&NormalizedNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// One-line summary suitable for an informational chat message.
    pub fn notice(&self) -> Option<String> {
        match &self.origin {
            DiagramOrigin::Parsed => None,
            DiagramOrigin::Fallback(FallbackReason::MalformedResponse) => Some(
                "The response did not contain a readable diagram; showing a starter diagram instead."
                    .to_string(),
            ),
            DiagramOrigin::Fallback(FallbackReason::EmptyDiagram) => Some(
                "The response described no nodes; showing a starter diagram instead.".to_string(),
            ),
            DiagramOrigin::Fallback(FallbackReason::Recovered(message)) => Some(format!(
                "The diagram could not be processed ({message}); showing a starter diagram instead."
            )),
        }
    }
}

#[derive(Debug, Error)]
enum NormalizeError {
    #[error("`{field}` must be a list, found {found}")]
    NotAList { field: &'static str, found: &'static str },
    #[error("diagram payload is {found}, expected an object")]
    NotAnObject { found: &'static str },
}

/// Normalizes free text that may embed a JSON diagram.
pub fn normalize_text(text: &str) -> NormalizedDiagram {
    match extract_json_value(text) {
        Some(value) => normalize_response(&value),
        None => {
            info!("no JSON document found in response text; using fallback diagram");
            NormalizedDiagram::fallback(FallbackReason::MalformedResponse)
        }
    }
}

/// Converts an arbitrary AI response into a canonical diagram. Never fails.
pub fn normalize_response(response: &Value) -> NormalizedDiagram {
    let Some(payload) = locate_payload(response, 0) else {
        info!("response does not contain a diagram payload; using fallback diagram");
        return NormalizedDiagram::fallback(FallbackReason::MalformedResponse);
    };

    match normalize_payload(&payload) {
        Ok(diagram) if diagram.nodes.is_empty() => {
            info!("diagram payload produced no nodes; using fallback diagram");
            NormalizedDiagram::fallback(FallbackReason::EmptyDiagram)
        }
        Ok(diagram) => {
            debug!(
                "normalized diagram with {} nodes and {} connections",
                diagram.nodes.len(),
                diagram.connections.len()
            );
            diagram
        }
        Err(err) => {
            info!("failed to normalize diagram payload: {err}; using fallback diagram");
            NormalizedDiagram::fallback(FallbackReason::Recovered(err.to_string()))
        }
    }
}

fn locate_payload(value: &Value, depth: usize) -> Option<Value> {
    if depth > MAX_UNWRAP_DEPTH {
        return None;
    }

    match value {
        Value::String(text) => {
            let inner = extract_json_value(text)?;
            locate_payload(&inner, depth + 1)
        }
        Value::Object(map) => match map.get("diagram") {
            Some(diagram @ (Value::Object(_) | Value::String(_))) => {
                locate_payload(diagram, depth + 1)
            }
            _ => Some(value.clone()),
        },
        Value::Array(_) => Some(value.clone()),
        Value::Null | Value::Bool(_) | Value::Number(_) => None,
    }
}

fn normalize_payload(payload: &Value) -> Result<NormalizedDiagram, NormalizeError> {
    let map = match payload {
        Value::Object(map) => map,
        other => {
            return Err(NormalizeError::NotAnObject {
                found: json_kind(other),
            });
        }
    };

    let raw_nodes = list_field(map, NODE_LIST_FIELDS, "nodes")?;
    let raw_connections = list_field(map, CONNECTION_LIST_FIELDS, "connections")?;

    let nodes = normalize_nodes(raw_nodes);
    if nodes.is_empty() {
        return Ok(NormalizedDiagram {
            nodes,
            connections: Vec::new(),
            origin: DiagramOrigin::Parsed,
            synthesized_chain: false,
            defaulted_endpoints: 0,
        });
    }

    let (mut connections, defaulted_endpoints) = normalize_connections(raw_connections, &nodes);
    let mut synthesized_chain = false;
    if connections.is_empty() && nodes.len() >= 2 {
        connections = chain_connections(&nodes);
        synthesized_chain = true;
    }

    Ok(NormalizedDiagram {
        nodes,
        connections,
        origin: DiagramOrigin::Parsed,
        synthesized_chain,
        defaulted_endpoints,
    })
}

fn list_field<'a>(
    map: &'a Map<String, Value>,
    candidates: &[&str],
    field: &'static str,
) -> Result<&'a [Value], NormalizeError> {
    match first_field(map, candidates) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(NormalizeError::NotAList {
            field,
            found: json_kind(other),
        }),
    }
}

/// Returns the first present field among `candidates`, in priority order.
fn first_field<'a>(map: &'a Map<String, Value>, candidates: &[&str]) -> Option<&'a Value> {
    candidates
        .iter()
        .find_map(|name| map.get(*name).filter(|value| !value.is_null()))
}

fn first_text(map: &Map<String, Value>, candidates: &[&str]) -> Option<String> {
    first_field(map, candidates)
        .and_then(scalar_to_string)
        .filter(|text| !text.is_empty())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(match (number.as_u64(), number.as_f64()) {
            (Some(n), _) => n.to_string(),
            // `2.0` names the same node as `2`.
            (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 => {
                (f as u64).to_string()
            }
            _ => number.to_string(),
        }),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Object(map) => first_field(map, NODE_ID_FIELDS).and_then(scalar_to_string),
        Value::Null | Value::Array(_) => None,
    }
}

fn normalize_nodes(raw_nodes: &[Value]) -> Vec<NormalizedNode> {
    raw_nodes
        .iter()
        .filter(|raw| !raw.is_null())
        .enumerate()
        .map(|(idx, raw)| {
            let n = idx + 1;
            let (original_id, text, kind) = match raw {
                Value::Object(map) => (
                    first_text(map, NODE_ID_FIELDS),
                    first_text(map, NODE_TEXT_FIELDS),
                    first_text(map, NODE_TYPE_FIELDS),
                ),
                Value::String(text) => (None, Some(text.trim().to_string()), None),
                _ => (None, None, None),
            };

            NormalizedNode {
                id: format!("node{n}"),
                original_id,
                text: text
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| format!("Node {n}")),
                kind: kind
                    .map(|kind| kind.to_ascii_lowercase())
                    .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string()),
            }
        })
        .collect()
}

struct EndpointResolver<'a> {
    nodes: &'a [NormalizedNode],
    by_original: HashMap<&'a str, &'a str>,
}

impl<'a> EndpointResolver<'a> {
    fn new(nodes: &'a [NormalizedNode]) -> Self {
        let mut by_original = HashMap::new();
        for node in nodes {
            if let Some(original) = node.original_id.as_deref() {
                by_original.entry(original).or_insert(node.id.as_str());
            }
        }
        Self { nodes, by_original }
    }

    fn resolve(&self, raw: Option<&str>) -> Option<String> {
        let raw = raw?;

        if let Some(id) = self.by_original.get(raw) {
            return Some((*id).to_string());
        }

        if !raw.is_empty() && raw.bytes().all(|byte| byte.is_ascii_digit()) {
            if let Ok(index) = raw.parse::<usize>() {
                if (1..=self.nodes.len()).contains(&index) {
                    return Some(self.nodes[index - 1].id.clone());
                }
            }
        }

        self.nodes
            .iter()
            .find(|node| node.id == raw)
            .map(|node| node.id.clone())
    }

    fn default_source(&self) -> String {
        self.nodes[0].id.clone()
    }

    fn default_target(&self) -> String {
        self.nodes.get(1).unwrap_or(&self.nodes[0]).id.clone()
    }
}

fn normalize_connections(
    raw_connections: &[Value],
    nodes: &[NormalizedNode],
) -> (Vec<NormalizedConnection>, usize) {
    let resolver = EndpointResolver::new(nodes);
    let mut defaulted = 0_usize;
    let mut connections = Vec::new();

    for raw in raw_connections.iter().filter(|raw| !raw.is_null()) {
        let map = raw.as_object();
        let endpoint = |candidates: &[&str]| {
            map.and_then(|map| first_field(map, candidates))
                .and_then(scalar_to_string)
        };

        let source = match resolver.resolve(endpoint(SOURCE_FIELDS).as_deref()) {
            Some(id) => id,
            None => {
                defaulted += 1;
                resolver.default_source()
            }
        };
        let target = match resolver.resolve(endpoint(TARGET_FIELDS).as_deref()) {
            Some(id) => id,
            None => {
                defaulted += 1;
                resolver.default_target()
            }
        };
        let label = map.and_then(|map| first_text(map, LABEL_FIELDS));

        connections.push(NormalizedConnection {
            id: format!("conn{}", connections.len() + 1),
            source,
            target,
            label,
        });
    }

    (connections, defaulted)
}

fn chain_connections(nodes: &[NormalizedNode]) -> Vec<NormalizedConnection> {
    nodes
        .windows(2)
        .enumerate()
        .map(|(idx, pair)| NormalizedConnection {
            id: format!("conn{}", idx + 1),
            source: pair[0].id.clone(),
            target: pair[1].id.clone(),
            label: None,
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
