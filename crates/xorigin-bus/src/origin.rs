//! Origin allowlist.
//!
//! Host patterns use `*` as the only wildcard. Matching is anchored at both
//! ends and case-insensitive; every other character is literal.

/// A compiled host pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPattern {
    source: String,
    // Lower-cased literal runs between the wildcards.
    parts: Vec<String>,
}

impl OriginPattern {
    /// Compile a host pattern.
    pub fn compile(host: &str) -> Self {
        Self {
            source: host.to_string(),
            parts: host.to_lowercase().split('*').map(str::to_string).collect(),
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the entire origin matches.
    pub fn matches(&self, origin: &str) -> bool {
        let origin = origin.to_lowercase();
        let (first, rest) = match self.parts.split_first() {
            Some(split) => split,
            None => return false,
        };
        let Some((last, middle)) = rest.split_last() else {
            return origin == *first;
        };

        if origin.len() < first.len() + last.len()
            || !origin.starts_with(first.as_str())
            || !origin.ends_with(last.as_str())
        {
            return false;
        }

        let mut remaining = &origin[first.len()..origin.len() - last.len()];
        for part in middle {
            match remaining.find(part.as_str()) {
                Some(at) => remaining = &remaining[at + part.len()..],
                None => return false,
            }
        }
        true
    }
}

/// The set of origins a bus trusts.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    patterns: Vec<OriginPattern>,
}

impl Allowlist {
    /// Compile every host pattern.
    pub fn compile<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: hosts
                .into_iter()
                .map(|host| OriginPattern::compile(host.as_ref()))
                .collect(),
        }
    }

    /// True iff any pattern matches the origin.
    pub fn verify(&self, origin: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(origin))
    }

    /// Whether a bare `*` pattern makes the list accept every origin.
    pub fn is_open(&self) -> bool {
        self.patterns.iter().any(|pattern| pattern.as_str() == "*")
    }

    /// Compiled patterns, in configuration order.
    pub fn patterns(&self) -> &[OriginPattern] {
        &self.patterns
    }
}
