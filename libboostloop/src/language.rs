//! Language detection for post text

/// Top-1 language guess for a piece of text
pub trait LanguageDetector: Send + Sync {
    /// Lowercase English name of the most likely language ("english",
    /// "german", ...), or `None` when no guess can be made
    fn detect(&self, text: &str) -> Option<String>;
}

/// Trigram-based detection backed by `whatlang`
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        whatlang::detect(text).map(|info| info.lang().eng_name().to_lowercase())
    }
}

/// Detector that always answers the same thing
#[derive(Debug, Clone, Default)]
pub struct FixedDetector(pub Option<String>);

impl FixedDetector {
    pub fn new(language: &str) -> Self {
        Self(Some(language.to_string()))
    }
}

impl LanguageDetector for FixedDetector {
    fn detect(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        self.0.clone()
    }
}
