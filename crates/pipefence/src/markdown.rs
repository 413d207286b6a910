//! The markdown engine: parse, transform, render.

use std::io::Write;
use std::sync::Arc;

use pulldown_cmark::Options;

use crate::Result;
use crate::ast::{Document, NodeKind};
use crate::render::{BoxedNodeRenderer, Renderer};

/// A value with a priority attached.
#[derive(Debug, Clone)]
pub struct Prioritized<T> {
    pub value: T,
    pub priority: i32,
}

impl<T> Prioritized<T> {
    pub fn new(value: T, priority: i32) -> Self {
        Self { value, priority }
    }
}

/// Rewrites a parsed document before it is rendered.
pub trait AstTransformer: Send + Sync {
    fn transform(&self, doc: &mut Document<'_>);
}

/// Type alias for a shared transformer.
pub type BoxedTransformer = Arc<dyn AstTransformer>;

/// Something that plugs transformers and render hooks into a [`Markdown`].
pub trait Extension {
    fn extend(&self, md: &mut Markdown);
}

/// Markdown to HTML conversion with pluggable extensions.
///
/// Conversion parses the source with pulldown-cmark, runs every registered
/// [`AstTransformer`] (highest priority first), then renders with the
/// registered hooks.
#[derive(Clone)]
pub struct Markdown {
    options: Options,
    transformers: Vec<Prioritized<BoxedTransformer>>,
    renderer: Renderer,
}

impl Default for Markdown {
    fn default() -> Self {
        Self {
            options: Options::empty(),
            transformers: Vec::new(),
            renderer: Renderer::new(),
        }
    }
}

impl Markdown {
    /// A CommonMark engine with no extensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pulldown-cmark parser options.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_extension<E: Extension>(mut self, extension: E) -> Self {
        extension.extend(&mut self);
        self
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Add a transformer. Equal priorities run in registration order.
    pub fn add_transformer(&mut self, transformer: BoxedTransformer, priority: i32) {
        let index = self
            .transformers
            .iter()
            .position(|existing| existing.priority < priority)
            .unwrap_or(self.transformers.len());
        self.transformers
            .insert(index, Prioritized::new(transformer, priority));
    }

    /// Add a render hook for a node kind. See [`Renderer::register`].
    pub fn add_node_renderer(&mut self, kind: NodeKind, hook: BoxedNodeRenderer, priority: i32) {
        self.renderer.register(kind, hook, priority);
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Parse `source` and run all transformers over it.
    pub fn parse<'a>(&self, source: &'a str) -> Document<'a> {
        let mut doc = Document::parse(source, self.options);
        for transformer in &self.transformers {
            transformer.value.transform(&mut doc);
        }
        doc
    }

    /// Render an already parsed document.
    pub fn render<W: Write>(&self, doc: &Document<'_>, sink: W) -> Result<()> {
        self.renderer.render(doc, sink)
    }

    /// Convert markdown to HTML, writing into `sink`.
    pub fn convert<W: Write>(&self, source: &str, sink: W) -> Result<()> {
        let doc = self.parse(source);
        self.render(&doc, sink)
    }

    /// Convert markdown to an HTML string.
    pub fn convert_to_string(&self, source: &str) -> Result<String> {
        let mut html = Vec::with_capacity(source.len() * 3 / 2);
        self.convert(source, &mut html)?;
        Ok(String::from_utf8(html)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Node, NodePath};
    use std::sync::Mutex;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl AstTransformer for Record {
        fn transform(&self, _doc: &mut Document<'_>) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    /// Empties the first top-level element.
    struct DropFirst;

    impl AstTransformer for DropFirst {
        fn transform(&self, doc: &mut Document<'_>) {
            let first = NodePath::new([0]);
            let Some(Node::Element(element)) = doc.node(&first).cloned() else {
                return;
            };
            let empty = Node::Element(crate::ast::Element {
                children: Vec::new(),
                ..element
            });
            doc.replace_node(&first, empty);
        }
    }

    #[test]
    fn test_transformers_run_by_priority() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut md = Markdown::new();
        for (name, priority) in [("low", 1), ("high", 100), ("mid", 50), ("mid-later", 50)] {
            let record = Record {
                name,
                log: log.clone(),
            };
            md.add_transformer(Arc::new(record), priority);
        }

        md.parse("text");
        assert_eq!(*log.lock().unwrap(), ["high", "mid", "mid-later", "low"]);
    }

    #[test]
    fn test_transformer_changes_rendering() {
        let mut md = Markdown::new();
        md.add_transformer(Arc::new(DropFirst), 0);
        assert_eq!(
            md.convert_to_string("gone\n\nkept\n").unwrap(),
            "<p></p>\n<p>kept</p>\n"
        );
    }

    #[test]
    fn test_options_reach_the_parser() {
        let source = "| a |\n|---|\n| b |\n";
        let plain = Markdown::new().convert_to_string(source).unwrap();
        let tables = Markdown::new()
            .with_options(Options::ENABLE_TABLES)
            .convert_to_string(source)
            .unwrap();

        assert!(!plain.contains("<table>"));
        assert!(tables.contains("<table>"));
    }
}
