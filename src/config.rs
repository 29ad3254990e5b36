//! Configuration types for document text extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The OCR provider tiers live in a
//! nested [`CascadeConfig`] that is loaded once (JSON file, environment, or
//! constructed in code) and then shared read-only by every page of every
//! document the engine processes.
//!
//! Every threshold the pipeline uses is a field here rather than a constant
//! in the code. None of them has a derivation beyond "worked well on real
//! tender bundles", so they are tunable defaults.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Configuration for document text extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use bidtext::{CascadeConfig, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .render_scale(2.0)
///     .cascade(CascadeConfig::default())
///     .ocr_enabled(false)
///     .build()
///     .unwrap();
/// assert!(!config.ocr_enabled);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Geometry thresholds for the row/column reconstructor.
    pub layout: LayoutConfig,

    /// Ordered OCR provider tiers and their failure budgets.
    pub cascade: CascadeConfig,

    /// Run the OCR cascade for pages whose structural text is insufficient.
    /// Default: true. With no tiers configured OCR is skipped regardless.
    pub ocr_enabled: bool,

    /// Rasterisation scale relative to the page's native size. Default: 2.0.
    ///
    /// 2× native (144 DPI for a standard PDF) keeps 9 pt body text legible to
    /// vision models while a full A4 page stays around 1200 × 1700 px.
    pub render_scale: f32,

    /// Cap on the longest rendered edge in pixels. Default: 2400.
    pub max_rendered_pixels: u32,

    /// Structural text shorter than this (in characters) counts as
    /// under-performing. Default: 50.
    pub min_useful_chars: usize,

    /// Short structural text only triggers OCR when the page had at least
    /// this many fragments; fewer means the page is genuinely sparse.
    /// Default: 5.
    pub min_fragments_for_ocr: usize,

    /// Sampling temperature for OCR completions. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens a provider may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Per-OCR-call transport timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom OCR system instruction. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Custom OCR user instruction. If None, uses the built-in one.
    pub user_prompt: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection for PDFs. Default: all pages.
    pub pages: PageSelection,

    /// Separator inserted between PDF pages in the assembled text.
    pub page_separator: PageSeparator,

    /// Keep `[[unrecoverable page N]]` markers in the output. Default: true.
    pub keep_placeholders: bool,

    /// Maximum ZIP-in-ZIP nesting. Default: 3.
    pub max_archive_depth: usize,

    /// Archive members larger than this (uncompressed) are skipped.
    /// Default: 100 MiB.
    pub max_entry_bytes: u64,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            cascade: CascadeConfig::default(),
            ocr_enabled: true,
            render_scale: 2.0,
            max_rendered_pixels: 2400,
            min_useful_chars: 50,
            min_fragments_for_ocr: 5,
            temperature: 0.0,
            max_tokens: 4096,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            system_prompt: None,
            user_prompt: None,
            password: None,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            keep_placeholders: true,
            max_archive_depth: 3,
            max_entry_bytes: 100 * 1024 * 1024,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("layout", &self.layout)
            .field("cascade", &self.cascade)
            .field("ocr_enabled", &self.ocr_enabled)
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("min_useful_chars", &self.min_useful_chars)
            .field("min_fragments_for_ocr", &self.min_fragments_for_ocr)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .field("keep_placeholders", &self.keep_placeholders)
            .field("max_archive_depth", &self.max_archive_depth)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when OCR is enabled and at least one tier is configured.
    pub fn ocr_available(&self) -> bool {
        self.ocr_enabled && !self.cascade.tiers.is_empty()
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn layout(mut self, layout: LayoutConfig) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn cascade(mut self, cascade: CascadeConfig) -> Self {
        self.config.cascade = cascade;
        self
    }

    pub fn ocr_enabled(mut self, v: bool) -> Self {
        self.config.ocr_enabled = v;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn min_useful_chars(mut self, n: usize) -> Self {
        self.config.min_useful_chars = n;
        self
    }

    pub fn min_fragments_for_ocr(mut self, n: usize) -> Self {
        self.config.min_fragments_for_ocr = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn user_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.user_prompt = Some(prompt.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn keep_placeholders(mut self, v: bool) -> Self {
        self.config.keep_placeholders = v;
        self
    }

    pub fn max_archive_depth(mut self, depth: usize) -> Self {
        self.config.max_archive_depth = depth;
        self
    }

    pub fn max_entry_bytes(mut self, bytes: u64) -> Self {
        self.config.max_entry_bytes = bytes;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if !(0.5..=6.0).contains(&c.render_scale) {
            return Err(ExtractError::InvalidConfig(format!(
                "render scale must be 0.5–6.0, got {}",
                c.render_scale
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        c.layout.validate()?;
        c.cascade.validate()?;
        Ok(self.config)
    }
}

// ── Layout ───────────────────────────────────────────────────────────────

/// Geometry thresholds for [`crate::pipeline::layout`], in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Vertical positions are rounded to multiples of this to form rows.
    pub row_tolerance: f32,
    /// A row further than this below the previous one starts a new line.
    pub line_gap: f32,
    /// A horizontal gap wider than this is a column break (tab).
    pub column_gap: f32,
    /// A horizontal gap wider than this (but not a column) is a word break.
    pub word_gap: f32,
    /// Geometric text must beat naive text by this fraction to be preferred.
    pub geometric_margin: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            row_tolerance: 3.0,
            line_gap: 4.0,
            column_gap: 12.0,
            word_gap: 1.5,
            geometric_margin: 0.20,
        }
    }
}

impl LayoutConfig {
    fn validate(&self) -> Result<(), ExtractError> {
        if self.row_tolerance <= 0.0 {
            return Err(ExtractError::InvalidConfig(
                "row tolerance must be positive".into(),
            ));
        }
        if self.word_gap > self.column_gap {
            return Err(ExtractError::InvalidConfig(format!(
                "word gap ({}) must not exceed column gap ({})",
                self.word_gap, self.column_gap
            )));
        }
        if self.geometric_margin < 0.0 {
            return Err(ExtractError::InvalidConfig(
                "geometric margin must be ≥ 0".into(),
            ));
        }
        Ok(())
    }
}

// ── Cascade ──────────────────────────────────────────────────────────────

/// Ordered OCR provider tiers plus per-tier failure budgets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CascadeConfig {
    /// Tiers in priority order.
    #[serde(default)]
    pub tiers: Vec<ProviderTier>,
    #[serde(default)]
    pub budget: FailureBudget,
}

/// How many quota / bad-request failures a tier tolerates per page.
///
/// A tier is abandoned as soon as a counter *exceeds* its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureBudget {
    pub max_quota_failures: u32,
    pub max_bad_requests: u32,
    /// Same-call retries after a transient failure (timeout, 5xx, plain
    /// 429), shared by every model of the tier. Default: 1.
    pub max_transient_retries: u32,
    /// First retry delay; doubles on each further retry of the same call.
    pub retry_backoff_ms: u64,
}

impl Default for FailureBudget {
    fn default() -> Self {
        Self {
            max_quota_failures: 2,
            max_bad_requests: 3,
            max_transient_retries: 1,
            retry_backoff_ms: 500,
        }
    }
}

/// One provider and the models and credentials to try against it.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTier {
    pub provider: ProviderEndpoint,
    /// Models in priority order.
    pub models: Vec<ModelSpec>,
    /// General credentials, tried in order for non-dedicated models.
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

/// Where and how to reach a vision provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderEndpoint {
    /// Stable identifier; credentials are burned per provider id.
    pub id: String,
    pub kind: ProviderKind,
    /// Override the API root (e.g. an OpenRouter or self-hosted URL).
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderEndpoint {
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            kind,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// The configured base URL, or the provider kind's public endpoint.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
            .trim_end_matches('/')
    }
}

/// The wire dialect a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST {base}/chat/completions` with bearer auth.
    OpenAiCompatible,
    /// `POST {base}/v1/messages` with `x-api-key`.
    Anthropic,
    /// `POST {base}/v1beta/models/{model}:generateContent` with `x-goog-api-key`.
    Gemini,
}

impl ProviderKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiCompatible => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com",
        }
    }
}

/// A model to try within a tier.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    /// When set, this model only ever runs under this one credential.
    #[serde(default)]
    pub dedicated_credential: Option<Credential>,
}

impl ModelSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dedicated_credential: None,
        }
    }

    pub fn dedicated(id: impl Into<String>, credential: Credential) -> Self {
        Self {
            id: id.into(),
            dedicated_credential: Some(credential),
        }
    }
}

/// An API key with a human-readable label. The secret never appears in
/// `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "CredentialSpec")]
pub struct Credential {
    pub label: String,
    secret: String,
}

impl Credential {
    pub fn new(label: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// On-disk credential shape: either an inline `key` or a `key_env` variable
/// name, resolved once when the configuration is loaded.
#[derive(Deserialize)]
struct CredentialSpec {
    label: Option<String>,
    key: Option<String>,
    key_env: Option<String>,
}

impl TryFrom<CredentialSpec> for Credential {
    type Error = String;

    fn try_from(spec: CredentialSpec) -> Result<Self, Self::Error> {
        // Unlabeled inline keys are numbered per tier after parsing.
        let (secret, default_label) = match (spec.key, spec.key_env) {
            (Some(key), _) => (key, String::new()),
            (None, Some(var)) => {
                let key = std::env::var(&var)
                    .map_err(|_| format!("environment variable {var} is not set"))?;
                (key, var)
            }
            (None, None) => return Err("credential needs `key` or `key_env`".into()),
        };
        if secret.trim().is_empty() {
            let name = spec.label.as_deref().unwrap_or(&default_label);
            return Err(format!("credential '{name}' is empty"));
        }
        Ok(Credential {
            label: spec.label.unwrap_or(default_label),
            secret,
        })
    }
}

impl CascadeConfig {
    /// Parse tiers from a JSON document.
    ///
    /// ```json
    /// {
    ///   "budget": { "max_quota_failures": 2, "max_bad_requests": 3 },
    ///   "tiers": [{
    ///     "provider": { "id": "openai", "kind": "open_ai_compatible" },
    ///     "models": [{ "id": "gpt-4o-mini" }],
    ///     "credentials": [{ "label": "team", "key_env": "OPENAI_API_KEY" }]
    ///   }]
    /// }
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ExtractError> {
        let mut config: CascadeConfig = serde_json::from_str(json)
            .map_err(|e| ExtractError::InvalidConfig(format!("provider tiers: {e}")))?;
        config.label_inline_credentials();
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON tier file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ExtractError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_json_str(&json).map_err(|e| ExtractError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Build tiers from well-known API key variables.
    ///
    /// Each of `OPENAI_API_KEYS`, `ANTHROPIC_API_KEYS`, `GEMINI_API_KEYS` may
    /// hold a comma-separated list; the singular `*_API_KEY` forms are used
    /// when the plural one is absent. Tier order is OpenAI, Anthropic, Gemini.
    /// Read once here; the resulting config is injected, never re-read.
    pub fn from_env() -> Self {
        let sources: [(&str, &str, ProviderKind, &[&str]); 3] = [
            (
                "openai",
                "OPENAI",
                ProviderKind::OpenAiCompatible,
                &["gpt-4o-mini", "gpt-4.1-mini", "gpt-4o"],
            ),
            (
                "anthropic",
                "ANTHROPIC",
                ProviderKind::Anthropic,
                &["claude-3-5-haiku-latest", "claude-sonnet-4-20250514"],
            ),
            (
                "gemini",
                "GEMINI",
                ProviderKind::Gemini,
                &["gemini-2.0-flash", "gemini-2.5-flash"],
            ),
        ];

        let tiers = sources
            .iter()
            .filter_map(|(id, prefix, kind, models)| {
                let keys = env_key_list(prefix);
                if keys.is_empty() {
                    return None;
                }
                Some(ProviderTier {
                    provider: ProviderEndpoint::new(*id, *kind),
                    models: models.iter().map(|m| ModelSpec::new(*m)).collect(),
                    credentials: keys
                        .into_iter()
                        .enumerate()
                        .map(|(i, k)| Credential::new(format!("{id}#{}", i + 1), k))
                        .collect(),
                })
            })
            .collect();

        Self {
            tiers,
            budget: FailureBudget::default(),
        }
    }

    /// Total number of model slots across all tiers.
    pub fn model_count(&self) -> usize {
        self.tiers.iter().map(|t| t.models.len()).sum()
    }

    /// Give unlabeled inline keys `inline#1`, `inline#2`, ... in tier order
    /// (shared list first, then dedicated credentials).
    fn label_inline_credentials(&mut self) {
        for tier in &mut self.tiers {
            let dedicated = tier
                .models
                .iter_mut()
                .filter_map(|m| m.dedicated_credential.as_mut());
            let unlabeled = tier
                .credentials
                .iter_mut()
                .chain(dedicated)
                .filter(|c| c.label.is_empty());
            for (n, credential) in unlabeled.enumerate() {
                credential.label = format!("inline#{}", n + 1);
            }
        }
    }

    fn validate(&self) -> Result<(), ExtractError> {
        for (i, tier) in self.tiers.iter().enumerate() {
            // A label names one key per tier; reusing it for a different key
            // makes attempts and logs ambiguous.
            let mut seen: HashMap<&str, &str> = HashMap::new();
            let dedicated = tier.models.iter().filter_map(|m| m.dedicated_credential.as_ref());
            for c in tier.credentials.iter().chain(dedicated) {
                if c.label.is_empty() {
                    return Err(ExtractError::InvalidConfig(format!(
                        "tier {} ({}) has a credential with an empty label",
                        i + 1,
                        tier.provider.id
                    )));
                }
                match seen.insert(c.label.as_str(), c.secret()) {
                    Some(prev) if prev != c.secret() => {
                        return Err(ExtractError::InvalidConfig(format!(
                            "tier {} ({}) uses credential label '{}' for different keys",
                            i + 1,
                            tier.provider.id,
                            c.label
                        )));
                    }
                    _ => {}
                }
            }
            if tier.models.is_empty() {
                return Err(ExtractError::InvalidConfig(format!(
                    "tier {} ({}) has no models",
                    i + 1,
                    tier.provider.id
                )));
            }
            let has_general = !tier.credentials.is_empty();
            if let Some(m) = tier
                .models
                .iter()
                .find(|m| m.dedicated_credential.is_none() && !has_general)
            {
                return Err(ExtractError::InvalidConfig(format!(
                    "model '{}' in tier {} has no dedicated credential and the tier has none",
                    m.id,
                    i + 1
                )));
            }
        }
        Ok(())
    }
}

fn env_key_list(prefix: &str) -> Vec<String> {
    let raw = std::env::var(format!("{prefix}_API_KEYS"))
        .or_else(|_| std::env::var(format!("{prefix}_API_KEY")))
        .unwrap_or_default();
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of a PDF to extract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Extract all pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// How to separate PDF pages in the assembled text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Pages joined with a blank line. (default)
    #[default]
    None,
    /// A form feed between pages, as `pdftotext` does.
    FormFeed,
    /// A `--- page N ---` marker line.
    Marker,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::FormFeed => "\n\x0c\n".to_string(),
            PageSeparator::Marker => format!("\n\n--- page {} ---\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ExtractionConfig::builder().build().is_ok());
    }

    #[test]
    fn rejects_out_of_range_scale() {
        let err = ExtractionConfig::builder().render_scale(10.0).build();
        assert!(matches!(err, Err(ExtractError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_word_gap_above_column_gap() {
        let layout = LayoutConfig {
            word_gap: 20.0,
            column_gap: 10.0,
            ..LayoutConfig::default()
        };
        assert!(ExtractionConfig::builder().layout(layout).build().is_err());
    }

    #[test]
    fn parses_tier_json() {
        let json = r#"{
            "budget": { "max_quota_failures": 1 },
            "tiers": [{
                "provider": { "id": "router", "kind": "open_ai_compatible",
                              "base_url": "https://openrouter.ai/api/v1/" },
                "models": [
                    { "id": "qwen/qwen2.5-vl-72b-instruct" },
                    { "id": "vip-model", "dedicated_credential": { "label": "vip", "key": "sk-vip" } }
                ],
                "credentials": [ { "label": "a", "key": "sk-a" }, { "key": "sk-b" } ]
            }]
        }"#;
        let cfg = CascadeConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.budget.max_quota_failures, 1);
        assert_eq!(cfg.budget.max_bad_requests, 3);
        let tier = &cfg.tiers[0];
        assert_eq!(tier.provider.base_url(), "https://openrouter.ai/api/v1");
        assert_eq!(tier.credentials.len(), 2);
        assert_eq!(tier.credentials[1].label, "inline#1");
        assert_eq!(
            tier.models[1].dedicated_credential.as_ref().unwrap().secret(),
            "sk-vip"
        );
    }

    #[test]
    fn unlabeled_inline_keys_get_distinct_labels() {
        let json = r#"{ "tiers": [{
            "provider": { "id": "x", "kind": "open_ai_compatible" },
            "models": [
                { "id": "m1" },
                { "id": "m2", "dedicated_credential": { "key": "dedicated" } }
            ],
            "credentials": [{ "key": "bad" }, { "key": "good" }]
        }] }"#;
        let cfg = CascadeConfig::from_json_str(json).unwrap();
        let tier = &cfg.tiers[0];
        let labels: Vec<_> = tier.credentials.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["inline#1", "inline#2"]);
        assert_eq!(
            tier.models[1].dedicated_credential.as_ref().unwrap().label,
            "inline#3"
        );
    }

    #[test]
    fn rejects_duplicate_labels_for_different_keys() {
        let json = r#"{ "tiers": [{
            "provider": { "id": "x", "kind": "gemini" },
            "models": [{ "id": "m" }],
            "credentials": [{ "label": "team", "key": "k1" }, { "label": "team", "key": "k2" }]
        }] }"#;
        let err = CascadeConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("'team'"));

        let tier = ProviderTier {
            provider: ProviderEndpoint::new("x", ProviderKind::Gemini),
            models: vec![ModelSpec::dedicated("m", Credential::new("team", "k2"))],
            credentials: vec![Credential::new("team", "k1")],
        };
        let cascade = CascadeConfig {
            tiers: vec![tier],
            budget: FailureBudget::default(),
        };
        assert!(ExtractionConfig::builder().cascade(cascade).build().is_err());
    }

    #[test]
    fn budget_json_fills_retry_defaults() {
        let cfg = CascadeConfig::from_json_str(r#"{ "budget": { "retry_backoff_ms": 50 } }"#).unwrap();
        assert_eq!(cfg.budget.retry_backoff_ms, 50);
        assert_eq!(cfg.budget.max_transient_retries, 1);
        assert_eq!(cfg.budget.max_quota_failures, 2);
    }

    #[test]
    fn rejects_credential_without_key() {
        let json = r#"{ "tiers": [{
            "provider": { "id": "x", "kind": "gemini" },
            "models": [{ "id": "m" }],
            "credentials": [{ "label": "nothing" }]
        }] }"#;
        assert!(CascadeConfig::from_json_str(json).is_err());
    }

    #[test]
    fn rejects_model_without_any_credential() {
        let json = r#"{ "tiers": [{
            "provider": { "id": "x", "kind": "anthropic" },
            "models": [{ "id": "m" }]
        }] }"#;
        let err = CascadeConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("no dedicated credential"));
    }

    #[test]
    fn default_base_urls() {
        let ep = ProviderEndpoint::new("g", ProviderKind::Gemini);
        assert_eq!(ep.base_url(), "https://generativelanguage.googleapis.com");
    }

    #[test]
    fn credential_debug_redacts_secret() {
        let c = Credential::new("prod", "sk-very-secret");
        let dbg = format!("{c:?}");
        assert!(dbg.contains("prod"));
        assert!(!dbg.contains("sk-very-secret"));
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert!(PageSelection::Single(6).to_indices(5).is_empty());
        assert_eq!(PageSelection::Range(2, 4).to_indices(5), vec![1, 2, 3]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(5), vec![0, 2]);
    }

    #[test]
    fn separator_rendering() {
        assert_eq!(PageSeparator::None.render(2), "\n\n");
        assert!(PageSeparator::Marker.render(7).contains("--- page 7 ---"));
        assert!(PageSeparator::FormFeed.render(2).contains('\x0c'));
    }
}
