use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One suggested translation candidate.
///
/// Records are plain values: two records with equal fields are interchangeable.
/// Quality is always within 0-100, whether built with [`MatchRecord::new`] or
/// deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "source")]
    source_text: String,
    #[serde(rename = "target")]
    target_text: String,
    #[serde(default, deserialize_with = "clamped_quality")]
    quality: Option<u8>, // None = unknown
    #[serde(default)]
    context: Option<String>,
}

impl MatchRecord {
    pub fn new(
        source_text: impl Into<String>,
        target_text: impl Into<String>,
        quality: Option<u8>,
        context: Option<String>,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            target_text: target_text.into(),
            quality: quality.map(|q| q.min(100)),
            context,
        }
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn target_text(&self) -> &str {
        &self.target_text
    }

    pub fn quality(&self) -> Option<u8> {
        self.quality
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

fn clamped_quality<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
    Ok(Option::<u8>::deserialize(deserializer)?.map(|q| q.min(100)))
}

/// Stable name of a provider, used for cache partitioning and error attribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The active source/target language pair.
///
/// Setters report whether the value actually changed; an unchanged set is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
}

impl QueryContext {
    pub fn new(source_lang: Option<String>, target_lang: Option<String>) -> Self {
        Self {
            source_lang,
            target_lang,
        }
    }

    /// Returns `true` if this was a context change.
    pub fn set_source_lang(&mut self, code: Option<String>) -> bool {
        if self.source_lang == code {
            return false;
        }
        self.source_lang = code;
        true
    }

    /// Returns `true` if this was a context change.
    pub fn set_target_lang(&mut self, code: Option<String>) -> bool {
        if self.target_lang == code {
            return false;
        }
        self.target_lang = code;
        true
    }

    /// Both languages, if both are set.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (&self.source_lang, &self.target_lang) {
            (Some(source), Some(target)) => Some((source.as_str(), target.as_str())),
            _ => None,
        }
    }
}

impl fmt::Display for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.source_lang.as_deref().unwrap_or("?"),
            self.target_lang.as_deref().unwrap_or("?")
        )
    }
}

// 文档中的一个翻译单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub context: Option<String>,
}

impl TranslationUnit {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_translated(&self) -> bool {
        !self.target.trim().is_empty()
    }
}

/// An ordered collection of translation units, as held by the host document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub units: Vec<TranslationUnit>,
}

impl Document {
    pub fn new(units: Vec<TranslationUnit>) -> Self {
        Self { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Extract a match quality from free-form comments such as `"87% match"`.
///
/// The first run of digits directly followed by `%` wins. Values above 100 are
/// clamped; comments without a percentage give `None`.
pub fn parse_quality<S: AsRef<str>>(comments: &[S]) -> Option<u8> {
    comments
        .iter()
        .find_map(|comment| percentage_in(comment.as_ref()))
}

fn percentage_in(text: &str) -> Option<u8> {
    let bytes = text.as_bytes();
    let mut start = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            start.get_or_insert(i);
            continue;
        }
        if let Some(s) = start.take() {
            if *b == b'%' {
                // 数字过长时视为 100
                let value = text[s..i].parse::<u32>().unwrap_or(u32::MAX);
                return Some(value.min(100) as u8);
            }
        }
    }
    None
}
