//! Render hook that writes a piped block's transformed content.

use std::io::Write;
use std::sync::Arc;

use crate::ast::{Node, WalkStatus};
use crate::pipe::PipeRegistry;
use crate::render::NodeRenderer;
use crate::{Error, Result};

/// Renders [`crate::PipedBlock`] nodes by running their content through the
/// matching pipe and writing the output verbatim.
///
/// The pipe is looked up again at render time. If it is gone (the registry
/// used for tagging differed), the block falls back to default rendering.
#[derive(Debug, Clone)]
pub struct PipeRenderer {
    pipes: Arc<PipeRegistry>,
}

impl PipeRenderer {
    pub fn new(pipes: Arc<PipeRegistry>) -> Self {
        Self { pipes }
    }
}

impl NodeRenderer for PipeRenderer {
    fn render(
        &self,
        w: &mut dyn Write,
        _source: &str,
        node: &Node<'_>,
        entering: bool,
    ) -> Result<WalkStatus> {
        let Node::Piped(piped) = node else {
            return Ok(WalkStatus::Continue);
        };
        if !entering {
            return Ok(WalkStatus::Continue);
        }

        let language = piped.language().unwrap_or_default();
        let Some(pipe) = self.pipes.get(language) else {
            tracing::warn!(
                language = %String::from_utf8_lossy(language),
                "no pipe registered for tagged block, rendering it as code"
            );
            return Ok(WalkStatus::Continue);
        };

        let content = piped.raw_content();
        tracing::debug!(
            language = %String::from_utf8_lossy(language),
            bytes = content.len(),
            "piping fenced block"
        );
        let output = pipe.pipe(&content).map_err(|source| Error::Pipe {
            language: String::from_utf8_lossy(language).into_owned(),
            source,
        })?;
        w.write_all(&output)?;
        Ok(WalkStatus::SkipChildren)
    }
}
