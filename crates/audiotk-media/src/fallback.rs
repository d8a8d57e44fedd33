//! Classification of stream-copy failures that are worth one re-encode retry.

/// Stderr fragments FFmpeg prints when a stream copy cannot be muxed as-is.
pub const DEFAULT_FALLBACK_PATTERNS: &[&str] = &[
    "invalid argument",
    "could not find tag for codec",
    "codec not currently supported in container",
    "error initializing output stream",
    "invalid data found",
    "non-monotonous dts",
    "incorrect codec parameters",
];

/// Decides whether a failed fast attempt should be retried with re-encoding.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    patterns: Vec<String>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_PATTERNS.iter().copied())
    }
}

impl FallbackPolicy {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True when the diagnostics match any pattern, ignoring case.
    pub fn should_fall_back(&self, stderr: &str) -> bool {
        let haystack = stderr.to_lowercase();
        self.matching_pattern_in(&haystack).is_some()
    }

    /// The first pattern found in the diagnostics, for logging.
    pub fn matching_pattern(&self, stderr: &str) -> Option<&str> {
        self.matching_pattern_in(&stderr.to_lowercase())
    }

    fn matching_pattern_in(&self, lowered: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| lowered.contains(p.as_str()))
            .map(String::as_str)
    }
}
