//! HTML rendering with per-node-kind hooks.
//!
//! The document is turned back into pulldown-cmark events and streamed into
//! its HTML writer. Before a node's events are produced, the hook registered
//! for its [`NodeKind`] (if any) gets a chance to write the node itself.
//! Hooks and the HTML writer share the same sink, and the writer pulls events
//! lazily, so everything lands in document order.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::slice;
use std::sync::Arc;

use pulldown_cmark::Event;

use crate::ast::{Document, Node, NodeKind, WalkStatus};
use crate::markdown::Prioritized;
use crate::{Error, Result};

/// A render hook for one kind of node.
///
/// Called with `entering == true` before the node is rendered and with
/// `entering == false` once it is done. On entry the hook decides:
/// - [`WalkStatus::Continue`]: not handled, render the node normally
/// - [`WalkStatus::SkipChildren`]: the hook wrote the node, skip it
/// - [`WalkStatus::Stop`]: halt rendering
///
/// Returning an error halts rendering too.
pub trait NodeRenderer: Send + Sync {
    fn render(
        &self,
        w: &mut dyn Write,
        source: &str,
        node: &Node<'_>,
        entering: bool,
    ) -> Result<WalkStatus>;
}

/// Type alias for a shared render hook.
pub type BoxedNodeRenderer = Arc<dyn NodeRenderer>;

/// Renders documents to HTML, dispatching to hooks by node kind.
#[derive(Clone, Default)]
pub struct Renderer {
    hooks: HashMap<NodeKind, Prioritized<BoxedNodeRenderer>>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for a node kind.
    ///
    /// One hook per kind: the higher priority wins, and on equal priority the
    /// later registration replaces the earlier one.
    pub fn register(&mut self, kind: NodeKind, hook: BoxedNodeRenderer, priority: i32) {
        if let Some(existing) = self.hooks.get(&kind)
            && existing.priority > priority
        {
            tracing::debug!(
                ?kind,
                priority,
                existing = existing.priority,
                "keeping higher priority render hook"
            );
            return;
        }
        self.hooks.insert(kind, Prioritized::new(hook, priority));
    }

    /// The hook registered for `kind`.
    pub fn hook(&self, kind: NodeKind) -> Option<&BoxedNodeRenderer> {
        self.hooks.get(&kind).map(|hook| &hook.value)
    }

    /// Render `doc` as HTML into `sink`.
    ///
    /// If a hook fails, rendering stops there and the error is returned.
    /// Whatever was written before the failure stays in the sink.
    pub fn render<W: Write>(&self, doc: &Document<'_>, sink: W) -> Result<()> {
        let sink = RefCell::new(sink);
        let (written, failure) = {
            let mut events = EventStream::new(self, doc, &sink);
            let written = pulldown_cmark::html::write_html_io(SharedSink(&sink), &mut events);
            (written, events.failure)
        };
        if let Some(err) = failure {
            return Err(err);
        }
        written?;
        sink.into_inner().flush()?;
        Ok(())
    }
}

/// Lets the HTML writer and the hooks write to the same sink.
///
/// Never borrowed by both at once: the writer only writes between pulls from
/// the event stream, and hooks only run inside a pull.
struct SharedSink<'s, W>(&'s RefCell<W>);

impl<W: Write> Write for SharedSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

struct Frame<'t, 'a> {
    /// `None` for the document root
    node: Option<&'t Node<'a>>,
    children: slice::Iter<'t, Node<'a>>,
}

/// Walks the tree lazily, yielding events for default rendering and calling
/// hooks as nodes are reached.
struct EventStream<'t, 'a, W> {
    renderer: &'t Renderer,
    source: &'a str,
    sink: &'t RefCell<W>,
    stack: Vec<Frame<'t, 'a>>,
    pending: VecDeque<Event<'a>>,
    failure: Option<Error>,
    halted: bool,
}

impl<'t, 'a, W: Write> EventStream<'t, 'a, W> {
    fn new(renderer: &'t Renderer, doc: &'t Document<'a>, sink: &'t RefCell<W>) -> Self {
        Self {
            renderer,
            source: doc.source(),
            sink,
            stack: vec![Frame {
                node: None,
                children: doc.children().iter(),
            }],
            pending: VecDeque::new(),
            failure: None,
            halted: false,
        }
    }

    fn call_hook(&mut self, node: &Node<'a>, entering: bool) -> WalkStatus {
        let renderer = self.renderer;
        let Some(hook) = renderer.hook(node.kind()) else {
            return WalkStatus::Continue;
        };
        let cell = self.sink;
        let mut sink = cell.borrow_mut();
        match hook.render(&mut *sink, self.source, node, entering) {
            Ok(status) => status,
            Err(err) => {
                self.failure = Some(err);
                WalkStatus::Stop
            }
        }
    }

    fn enter(&mut self, node: &'t Node<'a>) {
        match self.call_hook(node, true) {
            WalkStatus::Stop => {
                self.halted = true;
                return;
            }
            WalkStatus::SkipChildren => {
                if self.call_hook(node, false) == WalkStatus::Stop {
                    self.halted = true;
                }
                return;
            }
            WalkStatus::Continue => {}
        }

        match node {
            Node::Element(element) => self.pending.push_back(Event::Start(element.tag.clone())),
            Node::Leaf(leaf) => self.pending.push_back(leaf.event.clone()),
            Node::Fenced(block) => self.pending.extend(block.events()),
            Node::Piped(piped) => self.pending.extend(piped.block().events()),
        }
        let children = if node.is_raw() {
            slice::Iter::default()
        } else {
            node.children().iter()
        };
        self.stack.push(Frame {
            node: Some(node),
            children,
        });
    }

    fn leave(&mut self, node: &'t Node<'a>) {
        if self.call_hook(node, false) == WalkStatus::Stop {
            self.halted = true;
            return;
        }
        if let Node::Element(element) = node {
            self.pending.push_back(Event::End(element.tag.to_end()));
        }
    }
}

impl<'a, W: Write> Iterator for EventStream<'_, 'a, W> {
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Event<'a>> {
        loop {
            if self.halted {
                return None;
            }
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let frame = self.stack.last_mut()?;
            if let Some(node) = frame.children.next() {
                self.enter(node);
                continue;
            }

            let frame = self.stack.pop()?;
            if let Some(node) = frame.node {
                self.leave(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulldown_cmark::{Options, Parser, html};

    fn render_to_string(renderer: &Renderer, source: &str) -> Result<String> {
        let doc = Document::parse(source, Options::empty());
        let mut out = Vec::new();
        renderer.render(&doc, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn push_html(source: &str) -> String {
        let mut html = String::new();
        html::push_html(&mut html, Parser::new(source));
        html
    }

    /// Writes a fixed string in place of every node of its kind.
    struct Stamp(&'static str);

    impl NodeRenderer for Stamp {
        fn render(
            &self,
            w: &mut dyn Write,
            _source: &str,
            _node: &Node<'_>,
            entering: bool,
        ) -> Result<WalkStatus> {
            if entering {
                w.write_all(self.0.as_bytes())?;
            }
            Ok(WalkStatus::SkipChildren)
        }
    }

    struct Fail;

    impl NodeRenderer for Fail {
        fn render(&self, _: &mut dyn Write, _: &str, _: &Node<'_>, _: bool) -> Result<WalkStatus> {
            Err(Error::Pipe {
                language: "fail".to_string(),
                source: "refused".into(),
            })
        }
    }

    #[test]
    fn test_without_hooks_matches_pulldown_cmark() {
        let source = "# Title\n\nSome *emphasis* and `code`.\n\n```rust\nfn main() {}\n```\n\n> quote\n\n- a\n- b\n";
        let html = render_to_string(&Renderer::new(), source).unwrap();
        assert_eq!(html, push_html(source));
    }

    #[test]
    fn test_crlf_code_renders_like_pulldown_cmark() {
        let source = "```x\r\n<a>\r\nb\r\n```\r\n";
        let html = render_to_string(&Renderer::new(), source).unwrap();
        assert_eq!(html, push_html(source));
    }

    #[test]
    fn test_hook_replaces_its_kind_only() {
        let mut renderer = Renderer::new();
        renderer.register(NodeKind::Fenced, Arc::new(Stamp("[block]\n")), 0);

        let html = render_to_string(&renderer, "intro\n\n```x\n<b>\n```\n\noutro\n").unwrap();
        assert_eq!(html, "<p>intro</p>\n[block]\n<p>outro</p>\n");
    }

    #[test]
    fn test_higher_priority_hook_wins() {
        let mut renderer = Renderer::new();
        renderer.register(NodeKind::Fenced, Arc::new(Stamp("high")), 10);
        renderer.register(NodeKind::Fenced, Arc::new(Stamp("low")), 1);
        assert_eq!(render_to_string(&renderer, "```x\ny\n```\n").unwrap(), "high");

        renderer.register(NodeKind::Fenced, Arc::new(Stamp("same")), 10);
        assert_eq!(render_to_string(&renderer, "```x\ny\n```\n").unwrap(), "same");
    }

    #[test]
    fn test_failure_halts_and_keeps_prior_output() {
        let mut renderer = Renderer::new();
        renderer.register(NodeKind::Fenced, Arc::new(Fail), 0);

        let doc = Document::parse("before\n\n```x\ny\n```\n\nafter\n", Options::empty());
        let mut out = Vec::new();
        let err = renderer.render(&doc, &mut out).unwrap_err();

        assert!(matches!(err, Error::Pipe { ref language, .. } if language == "fail"));
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out, "<p>before</p>\n");
    }

    #[test]
    fn test_hooks_inside_containers_keep_order() {
        let mut renderer = Renderer::new();
        renderer.register(NodeKind::Fenced, Arc::new(Stamp("STAMP")), 0);

        let html = render_to_string(&renderer, "> one\n>\n> ```x\n> y\n> ```\n>\n> two\n").unwrap();
        let one = html.find("one").unwrap();
        let stamp = html.find("STAMP").unwrap();
        let two = html.find("two").unwrap();
        let close = html.find("</blockquote>").unwrap();
        assert!(one < stamp && stamp < two && two < close);
    }

    #[test]
    fn test_continue_falls_back_to_default() {
        struct Decline;
        impl NodeRenderer for Decline {
            fn render(&self, _: &mut dyn Write, _: &str, _: &Node<'_>, _: bool) -> Result<WalkStatus> {
                Ok(WalkStatus::Continue)
            }
        }

        let mut renderer = Renderer::new();
        renderer.register(NodeKind::Element, Arc::new(Decline), 0);
        renderer.register(NodeKind::Fenced, Arc::new(Decline), 0);

        let source = "```x\n<y>\n```\n\n*z*\n";
        assert_eq!(render_to_string(&renderer, source).unwrap(), push_html(source));
    }
}
