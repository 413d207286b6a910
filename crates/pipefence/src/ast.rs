//! Document tree built over pulldown-cmark's event stream.
//!
//! pulldown-cmark hands out a flat stream of events. Rewriting blocks before
//! rendering is much simpler on a tree, so [`Document::parse`] folds the
//! stream into nested [`Node`]s. Fenced code blocks get their own node type
//! carrying their content lines, everything else stays a pulldown-cmark tag
//! or event so it can be fed back to the HTML writer untouched.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};

/// Identity of a node variant, used to key render hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A container tag (paragraph, list, blockquote, ...)
    Element,
    /// Any event that is not a container (text, html, rules, ...)
    Leaf,
    /// A fenced code block
    Fenced,
    /// A fenced code block selected for piping
    Piped,
}

/// Traversal control returned by visitors and render hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStatus {
    /// Keep going, descending into children
    Continue,
    /// Keep going, but do not descend into this node's children
    SkipChildren,
    /// Abort the traversal
    Stop,
}

/// Location of a node as child indices from the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// Build a path from child indices, outermost first.
    pub fn new(indices: impl Into<Vec<usize>>) -> Self {
        Self(indices.into())
    }

    /// Child indices, outermost first.
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Nesting depth (1 for top-level nodes).
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

/// One line of a fenced block's literal content.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentLine<'a> {
    /// Line text as written in the source, line terminator included
    pub text: &'a str,
    /// Byte range of the line in the source buffer
    pub range: Range<usize>,
}

impl<'a> ContentLine<'a> {
    /// The line's text.
    pub fn value(&self) -> &'a str {
        self.text
    }
}

/// A fenced code block.
#[derive(Debug, Clone, PartialEq)]
pub struct FencedBlock<'a> {
    info: CowStr<'a>,
    lines: Vec<ContentLine<'a>>,
    /// Text as pulldown-cmark reports it (line endings normalized), replayed
    /// for default rendering
    text: Vec<CowStr<'a>>,
    span: Range<usize>,
}

impl<'a> FencedBlock<'a> {
    pub fn new(info: CowStr<'a>, lines: Vec<ContentLine<'a>>, span: Range<usize>) -> Self {
        let text = lines.iter().map(|line| CowStr::Borrowed(line.text)).collect();
        Self {
            info,
            lines,
            text,
            span,
        }
    }

    /// The full info string following the opening fence.
    pub fn info(&self) -> &str {
        &self.info
    }

    /// The declared language: the first whitespace-delimited token of the
    /// info string, or `None` when the fence has no info string.
    pub fn language(&self) -> Option<&[u8]> {
        self.info.split_whitespace().next().map(str::as_bytes)
    }

    /// Content lines in source order.
    pub fn lines(&self) -> &[ContentLine<'a>] {
        &self.lines
    }

    /// Byte range of the whole block, fences included.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Everything between the fences, exactly as written.
    pub fn raw_content(&self) -> Vec<u8> {
        let len = self.lines.iter().map(|line| line.text.len()).sum();
        let mut content = Vec::with_capacity(len);
        for line in &self.lines {
            content.extend_from_slice(line.text.as_bytes());
        }
        content
    }

    /// The pulldown-cmark events this block was parsed from.
    pub(crate) fn events(&self) -> impl Iterator<Item = Event<'a>> + '_ {
        std::iter::once(Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(
            self.info.clone(),
        ))))
        .chain(self.text.iter().cloned().map(Event::Text))
        .chain(std::iter::once(Event::End(TagEnd::CodeBlock)))
    }
}

/// A fenced code block whose language has a registered pipe.
///
/// Same content as the [`FencedBlock`] it replaced; only the node kind
/// differs, so a render hook can be registered for these blocks alone.
/// Its content is raw: it is never escaped or traversed by default rendering
/// when a hook handles it.
#[derive(Debug, Clone, PartialEq)]
pub struct PipedBlock<'a> {
    block: FencedBlock<'a>,
}

impl<'a> PipedBlock<'a> {
    pub fn block(&self) -> &FencedBlock<'a> {
        &self.block
    }

    pub fn language(&self) -> Option<&[u8]> {
        self.block.language()
    }

    pub fn raw_content(&self) -> Vec<u8> {
        self.block.raw_content()
    }
}

impl<'a> From<FencedBlock<'a>> for PipedBlock<'a> {
    fn from(block: FencedBlock<'a>) -> Self {
        Self { block }
    }
}

/// A container tag with its children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element<'a> {
    pub tag: Tag<'a>,
    pub children: Vec<Node<'a>>,
    pub span: Range<usize>,
}

/// A non-container event.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf<'a> {
    pub event: Event<'a>,
    pub span: Range<usize>,
}

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<'a> {
    Element(Element<'a>),
    Leaf(Leaf<'a>),
    Fenced(FencedBlock<'a>),
    Piped(PipedBlock<'a>),
}

impl<'a> Node<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Element(_) => NodeKind::Element,
            Node::Leaf(_) => NodeKind::Leaf,
            Node::Fenced(_) => NodeKind::Fenced,
            Node::Piped(_) => NodeKind::Piped,
        }
    }

    pub fn children(&self) -> &[Node<'a>] {
        match self {
            Node::Element(element) => &element.children,
            _ => &[],
        }
    }

    /// Whether the node holds literal content rather than markdown. Raw nodes
    /// are leaves to traversal and rendering alike.
    pub fn is_raw(&self) -> bool {
        matches!(self, Node::Fenced(_) | Node::Piped(_))
    }
}

/// A parsed markdown document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<'a> {
    source: &'a str,
    children: Vec<Node<'a>>,
}

impl<'a> Document<'a> {
    /// Parse `source` with the given pulldown-cmark options.
    pub fn parse(source: &'a str, options: Options) -> Self {
        let mut root: Vec<Node<'a>> = Vec::new();
        let mut open: Vec<Element<'a>> = Vec::new();

        let mut events = Parser::new_ext(source, options).into_offset_iter();
        while let Some((event, span)) = events.next() {
            let node = match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                    // Code blocks only ever contain text
                    let mut text = Vec::new();
                    let mut pieces = Vec::new();
                    for (event, range) in events.by_ref() {
                        match event {
                            Event::Text(chunk) => {
                                text.push(chunk);
                                pieces.push(range);
                            }
                            Event::End(TagEnd::CodeBlock) => break,
                            _ => {}
                        }
                    }
                    Node::Fenced(FencedBlock {
                        info,
                        lines: source_lines(source, &pieces),
                        text,
                        span,
                    })
                }
                Event::Start(tag) => {
                    open.push(Element {
                        tag,
                        children: Vec::new(),
                        span,
                    });
                    continue;
                }
                Event::End(_) => match open.pop() {
                    Some(element) => Node::Element(element),
                    None => continue,
                },
                event => Node::Leaf(Leaf { event, span }),
            };
            attach(&mut root, &mut open, node);
        }

        // pulldown-cmark always balances its tags; close anything left anyway
        while let Some(element) = open.pop() {
            attach(&mut root, &mut open, Node::Element(element));
        }

        tracing::trace!(top_level = root.len(), "parsed document");
        Self {
            source,
            children: root,
        }
    }

    /// The source buffer this document was parsed from.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Top-level nodes.
    pub fn children(&self) -> &[Node<'a>] {
        &self.children
    }

    /// Look up the node at `path`.
    pub fn node(&self, path: &NodePath) -> Option<&Node<'a>> {
        let (last, parents) = path.indices().split_last()?;
        let mut siblings = self.children.as_slice();
        for &index in parents {
            siblings = siblings.get(index)?.children();
        }
        siblings.get(*last)
    }

    /// Replace the node at `path` in its parent's child list, keeping its
    /// position. Returns the replaced node, or `None` (and drops `node`) if
    /// the path does not exist.
    pub fn replace_node(&mut self, path: &NodePath, node: Node<'a>) -> Option<Node<'a>> {
        let (last, parents) = path.indices().split_last()?;
        let mut siblings = &mut self.children;
        for &index in parents {
            match siblings.get_mut(index)? {
                Node::Element(element) => siblings = &mut element.children,
                _ => return None,
            }
        }
        let slot = siblings.get_mut(*last)?;
        Some(std::mem::replace(slot, node))
    }

    /// Visit every node depth-first in document order.
    ///
    /// `visit` is called with `entering == true` before a node's children and
    /// with `entering == false` after them (also when the children were
    /// skipped). Returns [`WalkStatus::Stop`] if a visitor stopped the walk.
    pub fn walk<E, F>(&self, mut visit: F) -> Result<WalkStatus, E>
    where
        F: FnMut(&Node<'a>, &NodePath, bool) -> Result<WalkStatus, E>,
    {
        let mut path = NodePath::default();
        walk_nodes(&self.children, &mut path, &mut visit)
    }
}

/// Cut the source covered by a code block's text events into lines.
///
/// Text ranges skip container prefixes (`> `, list indentation) and the `\r`
/// of a CRLF ending. The `\r` is put back, so every line is a verbatim slice
/// of `source` ending with its original terminator.
fn source_lines<'a>(source: &'a str, pieces: &[Range<usize>]) -> Vec<ContentLine<'a>> {
    let bytes = source.as_bytes();
    let mut runs: Vec<Range<usize>> = Vec::new();
    for piece in pieces {
        let mut end = piece.end;
        if bytes.get(end) == Some(&b'\r') {
            end += 1;
        }
        match runs.last_mut() {
            Some(run) if piece.start <= run.end => run.end = run.end.max(end),
            _ => runs.push(piece.start..end),
        }
    }

    let mut lines = Vec::new();
    for run in runs {
        let mut start = run.start;
        for text in source[run].split_inclusive('\n') {
            let end = start + text.len();
            lines.push(ContentLine {
                text,
                range: start..end,
            });
            start = end;
        }
    }
    lines
}

fn attach<'a>(root: &mut Vec<Node<'a>>, open: &mut [Element<'a>], node: Node<'a>) {
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.push(node),
    }
}

fn walk_nodes<'a, E, F>(
    nodes: &[Node<'a>],
    path: &mut NodePath,
    visit: &mut F,
) -> Result<WalkStatus, E>
where
    F: FnMut(&Node<'a>, &NodePath, bool) -> Result<WalkStatus, E>,
{
    for (index, node) in nodes.iter().enumerate() {
        path.0.push(index);
        let status = walk_node(node, path, visit);
        path.0.pop();
        if status? == WalkStatus::Stop {
            return Ok(WalkStatus::Stop);
        }
    }
    Ok(WalkStatus::Continue)
}

fn walk_node<'a, E, F>(
    node: &Node<'a>,
    path: &mut NodePath,
    visit: &mut F,
) -> Result<WalkStatus, E>
where
    F: FnMut(&Node<'a>, &NodePath, bool) -> Result<WalkStatus, E>,
{
    match visit(node, path, true)? {
        WalkStatus::Stop => return Ok(WalkStatus::Stop),
        WalkStatus::Continue if !node.is_raw() => {
            if walk_nodes(node.children(), path, visit)? == WalkStatus::Stop {
                return Ok(WalkStatus::Stop);
            }
        }
        // Raw nodes hold literal content, never children to descend into
        WalkStatus::Continue | WalkStatus::SkipChildren => {}
    }
    match visit(node, path, false)? {
        WalkStatus::Stop => Ok(WalkStatus::Stop),
        _ => Ok(WalkStatus::Continue),
    }
}
