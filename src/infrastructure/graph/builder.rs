//! Graph builder: runs the extractor pipeline over committed chunks

use tracing::info;

use crate::domain::graph::{
    chunk_node_id, document_node_id, entity_node_id, Evidence, GraphNode, NodeType, Relation,
};
use crate::domain::ingestion::ChunkRecord;

use super::entity_linker::EntityLinker;
use super::extractors::{extractor_pipeline, EntityExtractor};
use super::store::GraphStore;

/// Builds and incrementally extends the knowledge graph from chunks.
#[derive(Debug)]
pub struct GraphBuilder {
    extractors: Vec<Box<dyn EntityExtractor>>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            extractors: extractor_pipeline(),
        }
    }

    /// Rebuild from scratch. Deterministic for a fixed chunk order, so
    /// consecutive rebuilds over an unchanged registry produce equal
    /// digests.
    pub fn build<'a>(&self, chunks: impl Iterator<Item = &'a ChunkRecord>) -> GraphStore {
        let mut graph = GraphStore::new();
        let mut count = 0usize;
        for chunk in chunks {
            self.extend(&mut graph, chunk);
            count += 1;
        }
        info!(
            chunks = count,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph build complete"
        );
        graph
    }

    /// Merge one chunk's structural nodes and extracted entities into
    /// the graph.
    pub fn extend(&self, graph: &mut GraphStore, chunk: &ChunkRecord) {
        if chunk.text.trim().is_empty() {
            return;
        }

        let doc_node = document_node_id(&chunk.doc_id);
        let chunk_node = chunk_node_id(&chunk.chunk_id);
        let doc_name = if chunk.title.is_empty() {
            if chunk.filename.is_empty() {
                chunk.doc_id.clone()
            } else {
                chunk.filename.clone()
            }
        } else {
            chunk.title.clone()
        };

        graph.add_node(
            GraphNode::new(doc_node.clone(), NodeType::Document, doc_name)
                .with_attr("doc_id", serde_json::json!(chunk.doc_id))
                .with_attr("doc_type", serde_json::json!(chunk.doc_type.as_str()))
                .with_attr("filename", serde_json::json!(chunk.filename)),
        );
        graph.add_node(
            GraphNode::new(chunk_node.clone(), NodeType::Chunk, chunk.chunk_id.clone())
                .with_attr("chunk_id", serde_json::json!(chunk.chunk_id))
                .with_attr("doc_id", serde_json::json!(chunk.doc_id))
                .with_attr("doc_type", serde_json::json!(chunk.doc_type.as_str()))
                .with_attr("filename", serde_json::json!(chunk.filename))
                .with_attr("title", serde_json::json!(chunk.title))
                .with_attr("header", serde_json::json!(chunk.header))
                .with_attr("boundary", serde_json::json!(chunk.boundary.as_str()))
                .with_attr("page_nos", serde_json::json!(chunk.page_nos)),
        );
        graph.add_edge_bidirectional(
            &doc_node,
            &chunk_node,
            Relation::Contains,
            1.0,
            vec![Evidence::new(
                &chunk.doc_id,
                &chunk.chunk_id,
                "graph_builder",
                1.0,
            )],
        );

        for extractor in &self.extractors {
            for entity in extractor.entities(chunk) {
                // Canonicalise before hashing so name variants land on
                // the same node.
                let Some(name) = EntityLinker::normalize(entity.node_type, &entity.name) else {
                    continue;
                };
                let entity_id = entity_node_id(entity.node_type, &name);
                let mut node = GraphNode::new(entity_id.clone(), entity.node_type, name.as_str())
                    .with_evidence(Evidence::new(
                        &chunk.doc_id,
                        &chunk.chunk_id,
                        extractor.name(),
                        entity.confidence,
                    ));
                for (key, value) in entity.attrs {
                    node = node.with_attr(key, value);
                }
                graph.add_node(node);

                graph.add_edge_bidirectional(
                    &chunk_node,
                    &entity_id,
                    Relation::Mentions,
                    1.0,
                    vec![Evidence::new(
                        &chunk.doc_id,
                        &chunk.chunk_id,
                        extractor.name(),
                        0.7,
                    )],
                );

                // Clause nodes in regulations belong to their document.
                if entity.node_type == NodeType::Clause && chunk.doc_type.is_regulation() {
                    graph.add_edge_bidirectional(
                        &entity_id,
                        &doc_node,
                        Relation::PartOf,
                        1.0,
                        vec![Evidence::new(
                            &chunk.doc_id,
                            &chunk.chunk_id,
                            extractor.name(),
                            0.85,
                        )],
                    );
                }
            }

            for record in extractor.relations(chunk) {
                let Some(source_name) = EntityLinker::normalize(record.source.0, &record.source.1)
                else {
                    continue;
                };
                let Some(target_name) = EntityLinker::normalize(record.target.0, &record.target.1)
                else {
                    continue;
                };
                let source_id = entity_node_id(record.source.0, &source_name);
                let target_id = entity_node_id(record.target.0, &target_name);
                let evidence = Evidence::new(
                    &chunk.doc_id,
                    &chunk.chunk_id,
                    extractor.name(),
                    record.confidence,
                );

                // Endpoints may come from a different extractor's pass;
                // make sure both exist before wiring the edge.
                graph.add_node(
                    GraphNode::new(source_id.clone(), record.source.0, source_name.as_str())
                        .with_evidence(evidence.clone()),
                );
                graph.add_node(
                    GraphNode::new(target_id.clone(), record.target.0, target_name.as_str())
                        .with_evidence(evidence.clone()),
                );
                graph.add_edge_bidirectional(
                    &source_id,
                    &target_id,
                    record.relation,
                    record.weight,
                    vec![evidence],
                );
            }
        }
    }
}
