//! Tagging pass: swaps eligible fenced blocks for [`PipedBlock`] nodes.
//!
//! Candidates are collected in one read-only walk and replaced afterwards,
//! so the tree is never edited while it is being traversed.

use std::convert::Infallible;
use std::sync::Arc;

use crate::ast::{Document, Node, NodePath, PipedBlock, WalkStatus};
use crate::markdown::AstTransformer;
use crate::pipe::PipeRegistry;

/// Marks fenced blocks that have a registered pipe.
///
/// Only [`Node::Fenced`] nodes are considered, so running the pass again over
/// an already tagged document changes nothing.
#[derive(Debug, Clone)]
pub struct Tagger {
    pipes: Arc<PipeRegistry>,
}

impl Tagger {
    pub fn new(pipes: Arc<PipeRegistry>) -> Self {
        Self { pipes }
    }

    /// Tag every eligible block in `doc`, returning how many were tagged.
    pub fn tag(&self, doc: &mut Document<'_>) -> usize {
        let mut candidates: Vec<NodePath> = Vec::new();
        let Ok(_) = doc.walk(|node, path, entering| {
            if entering && matches!(node, Node::Fenced(_)) {
                candidates.push(path.clone());
            }
            Ok::<_, Infallible>(WalkStatus::Continue)
        });

        let mut tagged = 0;
        for path in &candidates {
            let Some(Node::Fenced(block)) = doc.node(path) else {
                continue;
            };
            let Some(language) = block.language() else {
                continue;
            };
            if !self.pipes.contains(language) {
                continue;
            }

            tracing::debug!(
                language = %String::from_utf8_lossy(language),
                span = ?block.span(),
                "tagging fenced block for piping"
            );
            let piped = Node::Piped(PipedBlock::from(block.clone()));
            doc.replace_node(path, piped);
            tagged += 1;
        }

        tracing::trace!(fenced = candidates.len(), tagged, "tagging pass done");
        tagged
    }
}

impl AstTransformer for Tagger {
    fn transform(&self, doc: &mut Document<'_>) {
        self.tag(doc);
    }
}
