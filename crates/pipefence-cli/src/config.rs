//! Configuration file discovery and parsing
//!
//! Searches for `.config/pipefence.toml` walking up from the current
//! directory. The project root is the parent of `.config/`, and pipe
//! commands run from there.
//!
//! ```toml
//! [markdown]
//! tables = true
//!
//! [pipes.dot]
//! command = ["dot", "-Tsvg"]
//! ```

use std::collections::HashMap;
use std::env;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{Result, eyre::eyre};
use facet::Facet;
use pipefence::{CommandPipe, PipeRegistry};
use pulldown_cmark::Options;

const CONFIG_DIR: &str = ".config";
const CONFIG_FILE: &str = "pipefence.toml";

/// Contents of `pipefence.toml`
#[derive(Debug, Clone, Default, Facet)]
#[facet(rename_all = "snake_case")]
pub struct PipefenceConfig {
    /// Markdown syntax extensions
    #[facet(default)]
    pub markdown: Option<MarkdownConfig>,

    /// Pipes keyed by fenced block language
    #[facet(default)]
    pub pipes: Option<HashMap<String, PipeDef>>,
}

/// Markdown syntax extensions, all off by default
#[derive(Debug, Clone, Default, Facet)]
#[facet(rename_all = "snake_case")]
pub struct MarkdownConfig {
    #[facet(default)]
    pub tables: Option<bool>,

    #[facet(default)]
    pub footnotes: Option<bool>,

    #[facet(default)]
    pub strikethrough: Option<bool>,

    #[facet(default)]
    pub tasklists: Option<bool>,
}

impl MarkdownConfig {
    fn options(&self) -> Options {
        let mut options = Options::empty();
        let flags = [
            (self.tables, Options::ENABLE_TABLES),
            (self.footnotes, Options::ENABLE_FOOTNOTES),
            (self.strikethrough, Options::ENABLE_STRIKETHROUGH),
            (self.tasklists, Options::ENABLE_TASKLISTS),
        ];
        for (enabled, flag) in flags {
            if enabled.unwrap_or(false) {
                options.insert(flag);
            }
        }
        options
    }
}

/// A pipe backed by an external command.
#[derive(Debug, Clone, Facet)]
#[facet(rename_all = "snake_case")]
pub struct PipeDef {
    /// Program and arguments. Block content is written to its stdin and its
    /// stdout replaces the block.
    pub command: Vec<String>,
}

/// Configuration ready to build a renderer from
pub struct ResolvedConfig {
    /// The file this came from, if any
    pub path: Option<Utf8PathBuf>,
    /// Parser options
    pub options: Options,
    /// Pipes built from the configured commands
    pub pipes: PipeRegistry,
}

impl ResolvedConfig {
    /// No config file: plain CommonMark, no pipes
    pub fn empty() -> Self {
        Self {
            path: None,
            options: Options::empty(),
            pipes: PipeRegistry::new(),
        }
    }

    /// Discover and load configuration from the current directory
    pub fn discover() -> Result<Self> {
        let cwd = env::current_dir()?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| {
            eyre!(
                "Current directory is not valid UTF-8: {}",
                e.as_path().display()
            )
        })?;

        match find_config_file(&cwd) {
            Some(path) => Self::load(&path),
            None => {
                tracing::warn!("no {CONFIG_DIR}/{CONFIG_FILE} found, no pipes configured");
                Ok(Self::empty())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load(config_path: &Utf8Path) -> Result<Self> {
        let content = fs_err::read_to_string(config_path)?;
        let config = parse_config(&content)
            .map_err(|e| eyre!("Failed to parse {}: {}", config_path, e))?;

        // Project root is the parent of .config/, or the file's own
        // directory when it lives elsewhere
        let config_dir = config_path
            .parent()
            .ok_or_else(|| eyre!("Config file has no parent directory"))?;
        let root = if config_dir.file_name() == Some(CONFIG_DIR) {
            config_dir.parent().unwrap_or(config_dir)
        } else {
            config_dir
        };

        let mut resolved = resolve(config, root)?;
        resolved.path = Some(config_path.to_owned());
        tracing::debug!(
            path = %config_path,
            pipes = ?resolved.pipes.languages(),
            "loaded configuration"
        );
        Ok(resolved)
    }
}

/// Parse the contents of a config file
pub fn parse_config(content: &str) -> Result<PipefenceConfig> {
    facet_toml::from_str::<PipefenceConfig>(content).map_err(|e| eyre!("{}", e))
}

/// Search for `.config/pipefence.toml` walking up from `start`
fn find_config_file(start: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = start;
    loop {
        let config_file = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_file.exists() {
            return Some(config_file);
        }
        current = current.parent()?;
    }
}

/// Turn parsed config into parser options and command pipes
fn resolve(config: PipefenceConfig, root: &Utf8Path) -> Result<ResolvedConfig> {
    let options = config
        .markdown
        .as_ref()
        .map(MarkdownConfig::options)
        .unwrap_or_else(Options::empty);

    let mut pipes = PipeRegistry::new();
    for (language, def) in config.pipes.unwrap_or_default() {
        let pipe = CommandPipe::new(def.command)
            .map_err(|e| eyre!("Pipe '{}': {}", language, e))?
            .current_dir(root.as_std_path());
        pipes = pipes.with_pipe(&language, pipe);
    }

    Ok(ResolvedConfig {
        path: None,
        options,
        pipes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_parse_pipes_and_options() {
        let config = parse_config(
            r#"
[markdown]
tables = true
footnotes = false

[pipes.dot]
command = ["dot", "-Tsvg"]

[pipes.pikchr]
command = ["pikchr", "--svg-only", "-"]
"#,
        )
        .unwrap();

        let pipes = config.pipes.as_ref().unwrap();
        assert_eq!(pipes.len(), 2);
        assert_eq!(pipes["dot"].command, ["dot", "-Tsvg"]);

        let resolved = resolve(config, Utf8Path::new("/")).unwrap();
        assert_eq!(resolved.options, Options::ENABLE_TABLES);
        assert_eq!(resolved.pipes.languages(), ["dot", "pikchr"]);
    }

    #[test]
    fn test_empty_config_is_plain_commonmark() {
        let resolved = resolve(parse_config("").unwrap(), Utf8Path::new("/")).unwrap();
        assert_eq!(resolved.options, Options::empty());
        assert!(resolved.pipes.is_empty());
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let config = parse_config("[pipes.dot]\ncommand = []\n").unwrap();
        let err = resolve(config, Utf8Path::new("/")).err().unwrap();
        assert!(err.to_string().contains("'dot'"));
    }

    #[test]
    fn test_find_config_walks_up() {
        let (_guard, root) = utf8_tempdir();
        let config_dir = root.join(CONFIG_DIR);
        fs_err::create_dir_all(&config_dir).unwrap();
        fs_err::write(config_dir.join(CONFIG_FILE), "").unwrap();
        let nested = root.join("docs").join("deep");
        fs_err::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_config_file(&nested),
            Some(config_dir.join(CONFIG_FILE))
        );
    }

    #[test]
    fn test_load_records_path() {
        let (_guard, root) = utf8_tempdir();
        let path = root.join("site.toml");
        fs_err::write(&path, "[pipes.upper]\ncommand = [\"tr\", \"a-z\", \"A-Z\"]\n").unwrap();

        let resolved = ResolvedConfig::load(&path).unwrap();
        assert_eq!(resolved.path.as_deref(), Some(path.as_path()));
        assert!(resolved.pipes.contains(b"upper"));
    }

    #[test]
    fn test_load_reports_bad_toml() {
        let (_guard, root) = utf8_tempdir();
        let path = root.join("broken.toml");
        fs_err::write(&path, "[pipes.dot\ncommand = 3\n").unwrap();

        let err = ResolvedConfig::load(&path).err().unwrap();
        assert!(err.to_string().contains("broken.toml"));
    }
}
