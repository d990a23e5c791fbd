//! Run configuration.
//!
//! All run behaviour is controlled through [`RunConfig`], built via its
//! [`RunConfigBuilder`]. Keeping every knob in one struct makes it trivial to
//! share the config across documents in a run, log it, and diff two runs to
//! understand why their archives differ.
//!
//! # Design choice: builder over constructor
//! The run-mode flags are orthogonal and most callers set only one or two.
//! The builder lets them touch exactly those and rely on documented defaults
//! for the rest; validation happens once, in `build()`.

use crate::backend::ExtractionBackend;
use crate::error::DeckforgeError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum retry count for transient extraction failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default fixed delay between extraction retries.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
/// Default lower bound on chunk size, in pages.
pub const DEFAULT_CHUNK_MIN_PAGES: usize = 25;
/// Default upper bound on chunk size, in pages. Documents at or below this
/// page count are submitted whole.
pub const DEFAULT_CHUNK_MAX_PAGES: usize = 40;

/// Registered extraction backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Google Gemini (`generateContent` with an inline PDF part).
    Gemini,
    /// Anthropic Claude (messages API with a base64 document block).
    Claude,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::Claude => "claude",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = DeckforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "claude" => Ok(BackendKind::Claude),
            other => Err(DeckforgeError::InvalidConfig(format!(
                "Unknown backend '{other}' (expected 'gemini' or 'claude')"
            ))),
        }
    }
}

/// Configuration for one pipeline run.
///
/// Built via [`RunConfig::builder()`].
///
/// # Example
/// ```rust
/// use deckforge::RunConfig;
///
/// let config = RunConfig::builder("./workspace")
///     .prompt("qa_cloze")
///     .tag_prefix("Anatomy_")
///     .merge(Some("master".into()))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RunConfig {
    /// Workspace root containing raw/, slides/, cards/, decks/, errors/,
    /// prompts/.
    pub root: PathBuf,

    /// Which extraction backend to use. Default: Gemini.
    pub backend: BackendKind,

    /// Prompt file name (with or without `.txt`), resolved against the
    /// workspace prompts directory. Default: "qa_cloze".
    pub prompt: String,

    /// Optional prefix prepended to the document tag on every deck row.
    pub tag_prefix: String,

    /// Merge per-document decks into a master deck with this name.
    /// `None` skips the merge step entirely.
    pub merge: Option<String>,

    /// Compare mode: process documents but leave every file where it is, so
    /// repeated runs see identical inputs. Default: false.
    pub compare_mode: bool,

    /// Preserve intermediate card JSON (and archive it) instead of deleting
    /// it at run end. Default: false.
    pub no_cleanup: bool,

    /// Bypass the sanitizer: documents are expected to already sit in
    /// slides/ with clean names. Default: false.
    pub skip_sanitize: bool,

    /// Maximum retries per chunk on a transient extraction failure.
    /// Default: 3.
    ///
    /// Rate-limit and 5xx responses usually clear within seconds. Fatal
    /// failures (bad credentials, unparseable payloads) are never retried.
    pub max_retries: u32,

    /// Fixed delay between retries. Default: 5 s.
    ///
    /// Deliberately fixed rather than exponential so the worst-case stall per
    /// chunk stays `max_retries × retry_delay` and is easy to reason about.
    pub retry_delay: Duration,

    /// Lower bound on chunk size, in pages. Default: 25.
    pub chunk_min_pages: usize,

    /// Upper bound on chunk size, in pages. Default: 40.
    ///
    /// Bounded by backend token limits: a 40-page slide deck reliably fits a
    /// single extraction call on both supported backends.
    pub chunk_max_pages: usize,

    /// Concurrent extraction calls per document. Default: 1.
    ///
    /// Backends rate-limit per credential, so sequential is the safe
    /// default. Raising this overlaps chunk calls; deck ordering is
    /// unaffected because chunks are reassembled by sequence index.
    pub chunk_concurrency: usize,

    /// Model identifier override. `None` uses the backend's environment
    /// default (`GEMINI_MODEL` / `CLAUDE_MODEL`).
    pub model: Option<String>,

    /// Pre-constructed backend. Takes precedence over `backend`; the seam
    /// tests use to run the pipeline without network access.
    pub backend_override: Option<Arc<dyn ExtractionBackend>>,

    /// Progress callback, rendered by the caller (the CLI uses a progress
    /// bar). `None` disables progress reporting.
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("root", &self.root)
            .field("backend", &self.backend)
            .field("prompt", &self.prompt)
            .field("tag_prefix", &self.tag_prefix)
            .field("merge", &self.merge)
            .field("compare_mode", &self.compare_mode)
            .field("no_cleanup", &self.no_cleanup)
            .field("skip_sanitize", &self.skip_sanitize)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("chunk_min_pages", &self.chunk_min_pages)
            .field("chunk_max_pages", &self.chunk_max_pages)
            .field("chunk_concurrency", &self.chunk_concurrency)
            .field("model", &self.model)
            .field(
                "backend_override",
                &self.backend_override.as_ref().map(|_| "<dyn ExtractionBackend>"),
            )
            .finish()
    }
}

impl RunConfig {
    /// Create a builder rooted at the given workspace directory.
    pub fn builder(root: impl Into<PathBuf>) -> RunConfigBuilder {
        RunConfigBuilder {
            config: RunConfig {
                root: root.into(),
                backend: BackendKind::Gemini,
                prompt: "qa_cloze".to_string(),
                tag_prefix: String::new(),
                merge: None,
                compare_mode: false,
                no_cleanup: false,
                skip_sanitize: false,
                max_retries: DEFAULT_MAX_RETRIES,
                retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
                chunk_min_pages: DEFAULT_CHUNK_MIN_PAGES,
                chunk_max_pages: DEFAULT_CHUNK_MAX_PAGES,
                chunk_concurrency: 1,
                model: None,
                backend_override: None,
                progress: None,
            },
        }
    }
}

/// Builder for [`RunConfig`].
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    pub fn prompt(mut self, name: impl Into<String>) -> Self {
        self.config.prompt = name.into();
        self
    }

    pub fn tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.tag_prefix = prefix.into();
        self
    }

    pub fn merge(mut self, output: Option<String>) -> Self {
        self.config.merge = output;
        self
    }

    pub fn compare_mode(mut self, v: bool) -> Self {
        self.config.compare_mode = v;
        self
    }

    pub fn no_cleanup(mut self, v: bool) -> Self {
        self.config.no_cleanup = v;
        self
    }

    pub fn skip_sanitize(mut self, v: bool) -> Self {
        self.config.skip_sanitize = v;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn chunk_bounds(mut self, min_pages: usize, max_pages: usize) -> Self {
        self.config.chunk_min_pages = min_pages;
        self.config.chunk_max_pages = max_pages;
        self
    }

    pub fn chunk_concurrency(mut self, n: usize) -> Self {
        self.config.chunk_concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn backend_override(mut self, backend: Arc<dyn ExtractionBackend>) -> Self {
        self.config.backend_override = Some(backend);
        self
    }

    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.config.progress = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Pathological chunk bounds are rejected here, at startup, rather than
    /// surfacing later as per-document chunking failures.
    pub fn build(self) -> Result<RunConfig, DeckforgeError> {
        let c = &self.config;
        if c.chunk_min_pages == 0 {
            return Err(DeckforgeError::InvalidConfig(
                "Chunk minimum must be at least 1 page".into(),
            ));
        }
        if c.chunk_min_pages > c.chunk_max_pages {
            return Err(DeckforgeError::InvalidConfig(format!(
                "Chunk bounds are inverted: min {} > max {}",
                c.chunk_min_pages, c.chunk_max_pages
            )));
        }
        if c.prompt.trim().is_empty() {
            return Err(DeckforgeError::InvalidConfig(
                "Prompt name must not be empty".into(),
            ));
        }
        if let Some(name) = &c.merge {
            if name.trim().is_empty() {
                return Err(DeckforgeError::InvalidConfig(
                    "Merge output name must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}
