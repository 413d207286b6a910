//! Pipe trait and the registry mapping languages to pipes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Error returned by a [`Pipe`].
pub type PipeError = Box<dyn std::error::Error + Send + Sync>;

/// Transforms the content of a fenced code block.
///
/// The input is the block's content exactly as written between the fences,
/// newlines included. The output is written to the rendered document as-is,
/// without escaping or wrapping.
pub trait Pipe: Send + Sync {
    fn pipe(&self, input: &[u8]) -> Result<Vec<u8>, PipeError>;
}

impl<F> Pipe for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, PipeError> + Send + Sync,
{
    fn pipe(&self, input: &[u8]) -> Result<Vec<u8>, PipeError> {
        self(input)
    }
}

/// Type alias for a shared pipe.
pub type BoxedPipe = Arc<dyn Pipe>;

/// Pipes keyed by fenced block language.
///
/// Languages match by exact, case-sensitive equality against the first
/// token of a fence's info string.
#[derive(Clone, Default)]
pub struct PipeRegistry {
    pipes: HashMap<String, BoxedPipe>,
}

impl PipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure for a language.
    pub fn with_fn<F>(self, language: &str, f: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Vec<u8>, PipeError> + Send + Sync + 'static,
    {
        self.with_pipe(language, f)
    }

    /// Register a pipe for a language, replacing any previous one.
    pub fn with_pipe<P: Pipe + 'static>(mut self, language: &str, pipe: P) -> Self {
        self.insert(language, Arc::new(pipe));
        self
    }

    /// Register an already shared pipe, returning the one it replaced.
    pub fn insert(&mut self, language: &str, pipe: BoxedPipe) -> Option<BoxedPipe> {
        self.pipes.insert(language.to_string(), pipe)
    }

    /// Find the pipe for a declared language.
    pub fn get(&self, language: &[u8]) -> Option<&BoxedPipe> {
        let language = std::str::from_utf8(language).ok()?;
        self.pipes.get(language)
    }

    pub fn contains(&self, language: &[u8]) -> bool {
        self.get(language).is_some()
    }

    /// Registered languages, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.pipes.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }
}

impl fmt::Debug for PipeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}
