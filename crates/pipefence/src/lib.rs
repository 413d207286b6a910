//! # pipefence
//!
//! Markdown rendering where selected fenced code blocks are piped through
//! transformer functions instead of being rendered as `<pre><code>`.
//!
//! A fenced block whose language matches a registered pipe is replaced by
//! whatever that pipe returns, written verbatim into the HTML output. This is
//! the glue between markdown and tools like graphviz or pikchr:
//!
//! ````text
//! ```dot
//! digraph { a -> b }
//! ```
//! ````
//!
//! renders as the SVG produced by `dot -Tsvg`.
//!
//! Rendering happens in two steps:
//! - **Tagging**: after parsing, every fenced block with a registered
//!   language is swapped for a [`PipedBlock`] node.
//! - **Emitting**: during rendering, [`PipedBlock`] nodes are handed to their
//!   pipe and the result is written raw. Every other node goes through
//!   pulldown-cmark's HTML writer.
//!
//! ## Example
//!
//! ```
//! use pipefence::{Markdown, PipeRegistry, Pipefence};
//!
//! let pipes = PipeRegistry::new().with_fn("shout", |input: &[u8]| {
//!     Ok(input.to_ascii_uppercase())
//! });
//! let md = Markdown::new().with_extension(Pipefence::new(pipes));
//!
//! let html = md.convert_to_string("```shout\nhello\n```\n").unwrap();
//! assert_eq!(html, "HELLO\n");
//! ```

mod ast;
mod command;
mod emitter;
mod extension;
mod markdown;
mod pipe;
mod render;
mod tagger;

pub use ast::{
    ContentLine, Document, Element, FencedBlock, Leaf, Node, NodeKind, NodePath, PipedBlock,
    WalkStatus,
};
pub use command::{CommandError, CommandPipe};
pub use emitter::PipeRenderer;
pub use extension::{PIPEFENCE_PRIORITY, Pipefence};
pub use markdown::{AstTransformer, BoxedTransformer, Extension, Markdown, Prioritized};
pub use pipe::{BoxedPipe, Pipe, PipeError, PipeRegistry};
pub use render::{BoxedNodeRenderer, NodeRenderer, Renderer};
pub use tagger::Tagger;

/// Error type for pipefence operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A pipe failed to transform the content of a fenced block
    #[error("fenced block transformer {language:?}: {source}")]
    Pipe {
        language: String,
        #[source]
        source: PipeError,
    },

    /// Writing rendered output failed
    #[error("failed to write rendered output: {0}")]
    Io(#[from] std::io::Error),

    /// A pipe produced bytes that are not UTF-8 and a string was requested
    #[error("rendered output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type alias for pipefence operations.
pub type Result<T> = std::result::Result<T, Error>;
