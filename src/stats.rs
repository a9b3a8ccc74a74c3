//! Stage timing and response header assembly.
//!
//! The pipeline times each named stage and reports them, together with the
//! provenance of every source that contributed pixels, as a multi-valued
//! timing header next to the content type.

use std::time::Duration;

use unicode_normalization::UnicodeNormalization;

/// Ordered per-stage timings collected while a request renders.
///
/// A stage is recorded only after it succeeds; a failing stage aborts the
/// request and reports nothing.
#[derive(Debug, Default)]
pub struct RenderStats {
    entries: Vec<(&'static str, Duration)>,
}

impl RenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed stage.
    pub fn record(&mut self, label: &'static str, elapsed: Duration) {
        self.entries.push((label, elapsed));
    }

    /// Recorded stages in completion order.
    pub fn entries(&self) -> &[(&'static str, Duration)] {
        &self.entries
    }
}

/// Headers describing a finished render: the payload content type plus one
/// timing entry per stage and one provenance entry per source used.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHeaders {
    pub content_type: String,
    pub server_timing: Vec<String>,
}

impl ResponseHeaders {
    /// Assemble headers from the stage timings and the provenance
    /// `(name, url)` pairs of the sources that contributed.
    ///
    /// Stage entries come first (`op{i};desc="{label}";dur={ms}`, duration in
    /// milliseconds with two decimals), then source entries
    /// (`src{i};desc="{name} - {url}"`) with the name sanitized for header
    /// transport.
    pub fn assemble<'a>(
        content_type: impl Into<String>,
        stats: &RenderStats,
        sources_used: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut server_timing = Vec::new();
        for (i, (label, elapsed)) in stats.entries().iter().enumerate() {
            server_timing.push(format!(
                "op{};desc=\"{}\";dur={:.2}",
                i,
                label,
                elapsed.as_secs_f64() * 1000.0
            ));
        }
        for (i, (name, url)) in sources_used.into_iter().enumerate() {
            server_timing.push(format!(
                "src{};desc=\"{} - {}\"",
                i,
                sanitize_provenance(name),
                url
            ));
        }
        Self {
            content_type: content_type.into(),
            server_timing,
        }
    }

    /// Flatten to `(header name, value)` pairs, repeating the timing header
    /// once per entry.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("Content-Type".to_string(), self.content_type.clone())];
        for value in &self.server_timing {
            pairs.push(("Server-Timing".to_string(), value.clone()));
        }
        pairs
    }
}

/// Make a provenance name safe inside a quoted header value: decompose
/// (NFKD), escape embedded quotes, then drop everything outside ASCII.
fn sanitize_provenance(name: &str) -> String {
    name.nfkd()
        .collect::<String>()
        .replace('"', "\\\"")
        .chars()
        .filter(|c| c.is_ascii())
        .collect()
}
