//! Resource tree (carrier): hierarchical grouping and ordered execution
//!
//! A rendered resource set is grouped into a hierarchy using the
//! slash-separated path each document carries in its `stevedore.io/path`
//! annotation. A caller-supplied handler then runs once per node, in one of
//! two traversal orders:
//!
//! - *Positive*: children complete (siblings concurrently) before their
//!   parent runs. Use when downstream results must be known before
//!   evaluating the parent.
//! - *Reversed*: a node runs before its children, and a node failure
//!   short-circuits its whole subtree. Use when children should only be
//!   processed after their parent succeeded (install hooks).
//!
//! All documents must share a single root segment; a document without a
//! valid path, or one whose root conflicts with the tree's, fails the build.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, join_all};
use stevedore_core::ResourceDoc;

use crate::context::ExecContext;
use crate::error::{KubeError, Result};

/// Annotation carrying a document's position in the hierarchy
pub const PATH_ANNOTATION: &str = "stevedore.io/path";

/// Traversal order for `ResourceTree::execute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Children first, then the parent
    Positive,
    /// Parent first; a parent failure skips its subtree
    Reversed,
}

/// Per-node execution callback
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Handle one node's own documents (not its descendants')
    async fn handle(&self, ctx: &ExecContext, path: &str, resources: &[ResourceDoc]) -> Result<()>;
}

#[derive(Debug)]
struct Node {
    path: String,
    resources: Vec<ResourceDoc>,
    children: Vec<usize>,
}

/// Hierarchical grouping of a rendered resource set
#[derive(Debug)]
pub struct ResourceTree {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    root: usize,
}

impl ResourceTree {
    /// Build a tree from rendered documents
    pub fn build(docs: &[ResourceDoc]) -> Result<Self> {
        let mut nodes: Vec<Node> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut root: Option<usize> = None;

        for doc in docs {
            let path = doc.annotation(PATH_ANNOTATION).ok_or_else(|| {
                KubeError::InvalidHierarchy(format!(
                    "resource '{}' has no {} annotation",
                    doc.display_name(),
                    PATH_ANNOTATION
                ))
            })?;

            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            if segments.is_empty() {
                return Err(KubeError::InvalidHierarchy(format!(
                    "resource '{}' has an empty hierarchy path",
                    doc.display_name()
                )));
            }

            let mut current_path = String::new();
            let mut parent: Option<usize> = None;

            for segment in &segments {
                if current_path.is_empty() {
                    current_path.push_str(segment);
                } else {
                    current_path.push('/');
                    current_path.push_str(segment);
                }

                let node_idx = match index.get(&current_path) {
                    Some(&idx) => idx,
                    None => {
                        let idx = nodes.len();
                        nodes.push(Node {
                            path: current_path.clone(),
                            resources: Vec::new(),
                            children: Vec::new(),
                        });
                        index.insert(current_path.clone(), idx);
                        if let Some(parent_idx) = parent {
                            nodes[parent_idx].children.push(idx);
                        }
                        idx
                    }
                };

                if parent.is_none() {
                    match root {
                        None => root = Some(node_idx),
                        Some(existing) if existing != node_idx => {
                            return Err(KubeError::InvalidHierarchy(format!(
                                "conflicting roots '{}' and '{}'",
                                nodes[existing].path, current_path
                            )));
                        }
                        Some(_) => {}
                    }
                }

                parent = Some(node_idx);
            }

            if let Some(leaf) = parent {
                nodes[leaf].resources.push(doc.clone());
            }
        }

        let root = root.ok_or_else(|| {
            KubeError::InvalidHierarchy("cannot build a tree from an empty resource set".to_string())
        })?;

        Ok(Self { nodes, index, root })
    }

    /// All documents in pre-order (node before its children)
    pub fn resources(&self) -> Vec<&ResourceDoc> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            out.extend(node.resources.iter());
            // Reverse so the leftmost child is visited first
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Documents attached to exactly one node
    pub fn resources_of(&self, path: &str) -> Result<&[ResourceDoc]> {
        self.index
            .get(path)
            .map(|&idx| self.nodes[idx].resources.as_slice())
            .ok_or_else(|| {
                KubeError::InvalidHierarchy(format!("no node at path '{}'", path))
            })
    }

    /// Number of nodes (including intermediate ones)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Run a handler over the hierarchy in the given order
    pub async fn execute(
        &self,
        ctx: &ExecContext,
        order: TraversalOrder,
        handler: Arc<dyn NodeHandler>,
    ) -> Result<()> {
        match order {
            TraversalOrder::Positive => self.visit_positive(ctx, self.root, &handler).await,
            TraversalOrder::Reversed => self.visit_reversed(ctx, self.root, &handler).await,
        }
    }

    /// Children to completion (siblings concurrent, all awaited, errors
    /// aggregated), then the node itself; any child error skips the node.
    fn visit_positive<'a>(
        &'a self,
        ctx: &'a ExecContext,
        idx: usize,
        handler: &'a Arc<dyn NodeHandler>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if ctx.is_cancelled() {
                return Err(KubeError::Cancelled);
            }

            let node = &self.nodes[idx];
            let results = join_all(
                node.children
                    .iter()
                    .map(|&child| self.visit_positive(ctx, child, handler)),
            )
            .await;

            let errors: Vec<KubeError> = results.into_iter().filter_map(|r| r.err()).collect();
            if !errors.is_empty() {
                return Err(KubeError::aggregate(errors));
            }

            handler.handle(ctx, &node.path, &node.resources).await
        })
    }

    /// The node first; on failure its children are never started. Sibling
    /// subtrees elsewhere are unaffected.
    fn visit_reversed<'a>(
        &'a self,
        ctx: &'a ExecContext,
        idx: usize,
        handler: &'a Arc<dyn NodeHandler>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if ctx.is_cancelled() {
                return Err(KubeError::Cancelled);
            }

            let node = &self.nodes[idx];
            handler.handle(ctx, &node.path, &node.resources).await?;

            let results = join_all(
                node.children
                    .iter()
                    .map(|&child| self.visit_reversed(ctx, child, handler)),
            )
            .await;

            let errors: Vec<KubeError> = results.into_iter().filter_map(|r| r.err()).collect();
            if !errors.is_empty() {
                return Err(KubeError::aggregate(errors));
            }

            Ok(())
        })
    }
}
