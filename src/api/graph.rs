//! Knowledge graph endpoints: rebuild and browsing

use std::collections::BTreeSet;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::graph::{GraphEdge, GraphNode};
use crate::infrastructure::graph::GraphStore;

/// POST /graph/rebuild
pub async fn rebuild(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.ask.rebuild_graph().await?;
    Ok(Json(json!({ "success": true, "stats": stats })).into_response())
}

/// GET /graph/stats
pub async fn stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let graph = state.stores.graph.read().await;
    let stats = graph.stats();
    let mut labels = serde_json::Map::new();
    for node in graph.iter_nodes() {
        labels
            .entry(node.node_type.as_str().to_string())
            .or_insert_with(|| json!(node.node_type.label()));
    }
    Ok(Json(json!({ "stats": stats, "type_labels": labels })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct NodeListQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub include_structural: bool,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

fn node_payload(node: &GraphNode) -> serde_json::Value {
    json!({
        "id": node.id,
        "type": node.node_type.as_str(),
        "type_label": node.node_type.label(),
        "name": node.name,
        "attrs": node.attrs,
        "evidence_count": node.evidence.len(),
    })
}

fn edge_payload(graph: &GraphStore, source: &str, edge: &GraphEdge) -> serde_json::Value {
    let source_node = graph.get_node(source);
    let target_node = graph.get_node(&edge.target);
    json!({
        "source": source,
        "source_name": source_node.map(|n| n.name.clone()).unwrap_or_default(),
        "source_type": source_node.map(|n| n.node_type.as_str()).unwrap_or_default(),
        "target": edge.target,
        "target_name": target_node.map(|n| n.name.clone()).unwrap_or_default(),
        "target_type": target_node.map(|n| n.node_type.as_str()).unwrap_or_default(),
        "relation": edge.relation.as_str(),
        "weight": edge.weight,
        "evidence_count": edge.evidence_count(),
    })
}

/// GET /graph/nodes
pub async fn list_nodes(
    State(state): State<AppState>,
    Query(params): Query<NodeListQuery>,
) -> Result<Response, ApiError> {
    let graph = state.stores.graph.read().await;
    let keyword = params.keyword.as_deref().map(str::to_lowercase);

    let nodes: Vec<serde_json::Value> = graph
        .iter_nodes()
        .filter(|n| params.include_structural || !n.node_type.is_structural())
        .filter(|n| {
            params
                .node_type
                .as_deref()
                .map_or(true, |t| n.node_type.as_str() == t)
        })
        .filter(|n| {
            keyword
                .as_deref()
                .map_or(true, |k| n.name.to_lowercase().contains(k))
        })
        .map(node_payload)
        .collect();

    let page = params.page.max(1);
    let page_size = params.page_size.clamp(1, 200);
    let total = nodes.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = (start + page_size).min(total);

    Ok(Json(json!({
        "total": total,
        "page": page,
        "page_size": page_size,
        "nodes": &nodes[start..end],
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct EdgeListQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub include_structural: bool,
}

/// GET /graph/edges
pub async fn list_edges(
    State(state): State<AppState>,
    Query(params): Query<EdgeListQuery>,
) -> Result<Response, ApiError> {
    let graph = state.stores.graph.read().await;

    let edges: Vec<serde_json::Value> = graph
        .iter_edges()
        .filter(|(source, edge)| {
            if params.include_structural {
                return true;
            }
            let source_ok = graph
                .get_node(source)
                .map_or(false, |n| !n.node_type.is_structural());
            let target_ok = graph
                .get_node(&edge.target)
                .map_or(false, |n| !n.node_type.is_structural());
            source_ok && target_ok
        })
        .filter(|(_, edge)| {
            params
                .relation
                .as_deref()
                .map_or(true, |r| edge.relation.as_str() == r)
        })
        .map(|(source, edge)| edge_payload(&graph, source, edge))
        .collect();

    let page = params.page.max(1);
    let page_size = params.page_size.clamp(1, 200);
    let total = edges.len();
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = (start + page_size).min(total);

    Ok(Json(json!({
        "total": total,
        "page": page,
        "page_size": page_size,
        "edges": &edges[start..end],
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct SubgraphQuery {
    pub query: String,
    #[serde(default = "default_hops")]
    pub hops: u8,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
}

fn default_hops() -> u8 {
    2
}

fn default_max_nodes() -> usize {
    120
}

/// GET /graph/subgraph — neighbourhood of query-matched seed nodes
pub async fn subgraph(
    State(state): State<AppState>,
    Query(params): Query<SubgraphQuery>,
) -> Result<Response, ApiError> {
    if params.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let hops = params.hops.clamp(1, 4);
    let max_nodes = params.max_nodes.clamp(10, 300);

    let graph = state.stores.graph.read().await;
    let seeds: Vec<String> = graph
        .find_nodes_by_query(&params.query, 12)
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    let mut visited: BTreeSet<String> = seeds.iter().cloned().collect();
    let mut frontier: Vec<String> = seeds.clone();
    for _ in 0..hops {
        let mut next = Vec::new();
        for node_id in &frontier {
            for edge in graph.neighbors(node_id) {
                let keep = graph
                    .get_node(&edge.target)
                    .map_or(false, |n| !n.node_type.is_structural());
                if keep && visited.insert(edge.target.clone()) {
                    next.push(edge.target.clone());
                }
                if visited.len() >= max_nodes {
                    break;
                }
            }
            if visited.len() >= max_nodes {
                break;
            }
        }
        if next.is_empty() || visited.len() >= max_nodes {
            break;
        }
        frontier = next;
    }

    let nodes: Vec<serde_json::Value> = visited
        .iter()
        .filter_map(|id| graph.get_node(id))
        .map(node_payload)
        .collect();
    let edges: Vec<serde_json::Value> = visited
        .iter()
        .flat_map(|source| {
            graph
                .neighbors(source)
                .iter()
                .filter(|e| visited.contains(&e.target))
                .map(|e| edge_payload(&graph, source, e))
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(Json(json!({
        "seed_nodes": seeds,
        "hops": hops,
        "max_nodes": max_nodes,
        "nodes": nodes,
        "edges": edges,
    }))
    .into_response())
}
