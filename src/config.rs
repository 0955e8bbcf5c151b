use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::{Error, Result};

/// Target chunk size in tokens when smart chunking is enabled.
///
/// Around 300 tokens suits models with an ~8k context window; larger
/// windows tolerate 400-700. Zero disables smart chunking.
pub const DEFAULT_TARGET_CHUNK_TOKENS: usize = 300;

/// Word window used for text files when smart chunking is disabled.
pub const DEFAULT_CHUNK_WORDS: usize = 300;

pub const DEFAULT_WINDOW_SIZE: usize = 0;

pub const DEFAULT_BATCH_SIZE: usize = 32;

pub const DEFAULT_INPUT_DIR: &str = "data";

pub const INDEX_FILE: &str = "index.flat";
pub const METADATA_FILE: &str = "metadata.json";

pub const INPUT_DIR_ENV_VAR: &str = "DOCWELL_INPUT_DIR";
pub const DATA_DIR_ENV_VAR: &str = "DOCWELL_DATA_DIR";
pub const CHUNK_TOKENS_ENV_VAR: &str = "DOCWELL_CHUNK_TOKENS";
pub const WINDOW_ENV_VAR: &str = "DOCWELL_WINDOW";
pub const CHUNK_WORDS_ENV_VAR: &str = "DOCWELL_CHUNK_WORDS";
pub const BATCH_SIZE_ENV_VAR: &str = "DOCWELL_BATCH_SIZE";

/// Everything the retriever needs to know about where documents live,
/// where the snapshot goes, and how text is chunked and expanded.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Directory scanned (non-recursively) for source documents.
    pub input_dir: PathBuf,
    /// Directory holding the persisted index and metadata.
    pub output_dir: PathBuf,
    /// Token budget per chunk; 0 disables smart chunking.
    pub target_chunk_tokens: usize,
    /// Neighbours added on each side of a hit; 0 disables expansion.
    pub window_size: usize,
    /// Word window for text files when smart chunking is disabled.
    pub default_chunk_words: usize,
    /// Number of chunks sent to the embedder per call during a build.
    pub batch_size: usize,
}

impl RetrieverConfig {
    /// A configuration with default knobs for the given directories.
    ///
    /// # Examples
    ///
    /// ```
    /// use docwell::config::{RetrieverConfig, DEFAULT_TARGET_CHUNK_TOKENS};
    ///
    /// let config = RetrieverConfig::new("data", "db");
    /// assert_eq!(config.target_chunk_tokens, DEFAULT_TARGET_CHUNK_TOKENS);
    /// assert_eq!(config.window_size, 0);
    /// assert!(config.index_path().ends_with("index.flat"));
    /// ```
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            target_chunk_tokens: DEFAULT_TARGET_CHUNK_TOKENS,
            window_size: DEFAULT_WINDOW_SIZE,
            default_chunk_words: DEFAULT_CHUNK_WORDS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Resolve the configuration from, in order of priority:
    /// 1. Explicit values (from command-line flags)
    /// 2. The `DOCWELL_*` environment variables
    /// 3. Built-in defaults (`./data` and the XDG data home)
    pub fn resolve(overrides: &Overrides) -> Result<Self> {
        let input_dir = match &overrides.input_dir {
            Some(path) => path.clone(),
            None => std::env::var(INPUT_DIR_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_INPUT_DIR)),
        };

        let output_dir = if let Some(path) = &overrides.data_dir {
            path.clone()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("docwell")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        let config = Self {
            input_dir,
            output_dir,
            target_chunk_tokens: knob(
                overrides.chunk_tokens,
                CHUNK_TOKENS_ENV_VAR,
                DEFAULT_TARGET_CHUNK_TOKENS,
            )?,
            window_size: knob(
                overrides.window,
                WINDOW_ENV_VAR,
                DEFAULT_WINDOW_SIZE,
            )?,
            default_chunk_words: knob(
                overrides.chunk_words,
                CHUNK_WORDS_ENV_VAR,
                DEFAULT_CHUNK_WORDS,
            )?,
            batch_size: knob(
                overrides.batch_size,
                BATCH_SIZE_ENV_VAR,
                DEFAULT_BATCH_SIZE,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_chunk_words == 0 {
            return Err(Error::Config(
                "default chunk word count must be greater than zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::Config(
                "embedding batch size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Word window applied to plain-text files.
    ///
    /// Smart chunking reuses the token target as the window; otherwise the
    /// fixed default applies.
    pub fn text_window_words(&self) -> usize {
        if self.target_chunk_tokens > 0 {
            self.target_chunk_tokens
        } else {
            self.default_chunk_words
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.output_dir.join(INDEX_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.output_dir.join(METADATA_FILE)
    }

    /// Create the output directory if it does not exist yet.
    pub fn ensure_output_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.output_dir).map_err(|source| {
            Error::DataDir {
                path: self.output_dir.clone(),
                source,
            }
        })?;
        Ok(&self.output_dir)
    }
}

/// Values supplied explicitly on the command line. `None` means "fall
/// back to the environment, then the default".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub chunk_tokens: Option<usize>,
    pub window: Option<usize>,
    pub chunk_words: Option<usize>,
    pub batch_size: Option<usize>,
}

fn knob<T>(explicit: Option<T>, env_var: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = explicit {
        return Ok(value);
    }
    match std::env::var(env_var) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            Error::Config(format!("invalid value {raw:?} for {env_var}: {e}"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_values() {
        let tmp = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            input_dir: Some(tmp.path().join("docs")),
            data_dir: Some(tmp.path().join("db")),
            chunk_tokens: Some(120),
            window: Some(2),
            chunk_words: Some(50),
            batch_size: Some(8),
        };

        let config = RetrieverConfig::resolve(&overrides).unwrap();
        assert_eq!(config.input_dir, tmp.path().join("docs"));
        assert_eq!(config.output_dir, tmp.path().join("db"));
        assert_eq!(config.target_chunk_tokens, 120);
        assert_eq!(config.window_size, 2);
        assert_eq!(config.default_chunk_words, 50);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.index_path(), tmp.path().join("db/index.flat"));
        assert_eq!(
            config.metadata_path(),
            tmp.path().join("db/metadata.json")
        );
    }

    #[test]
    fn zero_chunk_words_is_rejected() {
        let overrides = Overrides {
            input_dir: Some("in".into()),
            data_dir: Some("out".into()),
            chunk_words: Some(0),
            ..Default::default()
        };
        let err = RetrieverConfig::resolve(&overrides).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn text_window_follows_smart_chunking() {
        let mut config = RetrieverConfig::new("in", "out");
        config.target_chunk_tokens = 120;
        config.default_chunk_words = 40;
        assert_eq!(config.text_window_words(), 120);

        config.target_chunk_tokens = 0;
        assert_eq!(config.text_window_words(), 40);
    }

    #[test]
    fn output_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RetrieverConfig::new(tmp.path(), tmp.path().join("db"));
        let dir = config.ensure_output_dir().unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn output_dir_failure_keeps_io_cause() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let config = RetrieverConfig::new(tmp.path(), blocker.join("db"));
        match config.ensure_output_dir().unwrap_err() {
            Error::DataDir { path, source } => {
                assert_eq!(path, blocker.join("db"));
                assert!(!source.to_string().is_empty());
            }
            other => panic!("expected DataDir, got {other:?}"),
        }
    }
}
