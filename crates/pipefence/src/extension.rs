//! Wiring the tagging pass and the pipe renderer into a [`Markdown`].

use std::sync::Arc;

use crate::ast::NodeKind;
use crate::emitter::PipeRenderer;
use crate::markdown::{Extension, Markdown};
use crate::pipe::PipeRegistry;
use crate::tagger::Tagger;

/// Priority of both the tagging pass and the pipe renderer.
pub const PIPEFENCE_PRIORITY: i32 = 100;

/// Extension piping fenced code blocks through registered pipes.
///
/// For example, with a `pikchr` pipe converting pikchr to SVG, this block
/// renders as SVG:
///
/// ````text
/// ```pikchr
/// box "lolcat"
/// ```
/// ````
#[derive(Debug, Clone)]
pub struct Pipefence {
    pipes: Arc<PipeRegistry>,
}

impl Pipefence {
    pub fn new(pipes: PipeRegistry) -> Self {
        Self::from_shared(Arc::new(pipes))
    }

    /// Use a registry that is shared with other engines.
    pub fn from_shared(pipes: Arc<PipeRegistry>) -> Self {
        Self { pipes }
    }
}

impl Extension for Pipefence {
    fn extend(&self, md: &mut Markdown) {
        md.add_transformer(
            Arc::new(Tagger::new(self.pipes.clone())),
            PIPEFENCE_PRIORITY,
        );
        md.add_node_renderer(
            NodeKind::Piped,
            Arc::new(PipeRenderer::new(self.pipes.clone())),
            PIPEFENCE_PRIORITY,
        );
    }
}
