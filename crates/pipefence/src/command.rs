//! Pipes backed by external programs.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use crate::pipe::{Pipe, PipeError};

/// Error running a [`CommandPipe`].
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// No program was given
    #[error("pipe command is empty")]
    Empty,

    /// The program could not be started
    #[error("failed to execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Waiting for the program or reading its output failed
    #[error("failed to read output of '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The program exited unsuccessfully
    #[error("'{program}' failed with exit code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Pipes block content through a program: content on stdin, output from
/// stdout.
///
/// ```no_run
/// use pipefence::{CommandPipe, PipeRegistry};
///
/// let dot = CommandPipe::new(["dot", "-Tsvg"]).unwrap();
/// let pipes = PipeRegistry::new().with_pipe("dot", dot);
/// ```
#[derive(Debug, Clone)]
pub struct CommandPipe {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl CommandPipe {
    /// Build from an argv: program first, then its arguments.
    pub fn new<I, S>(argv: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or(CommandError::Empty)?;
        Ok(Self {
            program,
            args: argv.collect(),
            current_dir: None,
        })
    }

    /// Run the program from `dir` instead of the current directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run the program once with `input` on stdin and return its stdout.
    pub fn run(&self, input: &[u8]) -> Result<Vec<u8>, CommandError> {
        tracing::debug!(
            program = %self.program,
            args = ?self.args,
            bytes = input.len(),
            "running pipe command"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Feed stdin from its own thread: a program that writes a lot before
        // draining its input would otherwise deadlock against us.
        let stdin = child.stdin.take();
        let output = thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                scope.spawn(move || {
                    if let Err(e) = stdin.write_all(input) {
                        tracing::debug!(error = %e, "pipe command stopped reading stdin");
                    }
                });
            }
            child.wait_with_output()
        })
        .map_err(|source| CommandError::Io {
            program: self.program.clone(),
            source,
        })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(CommandError::Failed {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Pipe for CommandPipe {
    fn pipe(&self, input: &[u8]) -> Result<Vec<u8>, PipeError> {
        Ok(self.run(input)?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_empty_argv_is_rejected() {
        let argv: [&str; 0] = [];
        assert!(matches!(CommandPipe::new(argv), Err(CommandError::Empty)));
    }

    #[test]
    fn test_splits_program_and_args() {
        let pipe = CommandPipe::new(["tr", "o", "a"]).unwrap();
        assert_eq!(pipe.program(), "tr");
        assert_eq!(pipe.args(), ["o", "a"]);
    }

    #[test]
    fn test_pipes_stdin_to_stdout() {
        let pipe = CommandPipe::new(["tr", "o", "a"]).unwrap();
        assert_eq!(pipe.run(b"foo\n").unwrap(), b"faa\n");
    }

    #[test]
    fn test_large_input_does_not_deadlock() {
        let input = vec![b'x'; 4 * 1024 * 1024];
        let pipe = CommandPipe::new(["cat"]).unwrap();
        assert_eq!(pipe.run(&input).unwrap().len(), input.len());
    }

    #[test]
    fn test_failing_program_reports_stderr() {
        let pipe = CommandPipe::new(["sh", "-c", "echo 'syntax error' >&2; exit 3"]).unwrap();
        match pipe.run(b"ignored") {
            Err(CommandError::Failed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "syntax error");
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_program() {
        let pipe = CommandPipe::new(["pipefence-no-such-program"]).unwrap();
        let err = pipe.run(b"").unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
        assert!(err.to_string().contains("pipefence-no-such-program"));
    }

    #[test]
    fn test_current_dir() {
        let dir = std::env::temp_dir();
        let pipe = CommandPipe::new(["pwd"]).unwrap().current_dir(&dir);
        let out = String::from_utf8(pipe.run(b"").unwrap()).unwrap();
        let expected = dir.canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(out.trim()).canonicalize().unwrap(),
            expected
        );
    }
}
