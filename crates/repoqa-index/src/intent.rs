//! Query intent classification and per-intent retrieval profiles.

use std::fmt;
use std::sync::LazyLock;

use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

use crate::metadata::ChunkKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FileLocation,
    How,
    Why,
    Explain,
    Generic,
}

impl Intent {
    pub const ALL: [Self; 5] = [
        Self::FileLocation,
        Self::How,
        Self::Why,
        Self::Explain,
        Self::Generic,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileLocation => "file_location",
            Self::How => "how",
            Self::Why => "why",
            Self::Explain => "explain",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patterns that select one intent. Any match selects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRule {
    pub intent: Intent,
    pub patterns: Vec<String>,
}

impl IntentRule {
    fn new(intent: Intent, patterns: &[&str]) -> Self {
        Self {
            intent,
            patterns: patterns.iter().map(|&p| p.to_owned()).collect(),
        }
    }
}

/// Built-in rule table, in evaluation order.
#[must_use]
pub fn default_rules() -> Vec<IntentRule> {
    vec![
        IntentRule::new(
            Intent::FileLocation,
            &[
                r"^\s*(where|which file|what file|in which file)\b",
                r"\bwhich (file|module|directory|folder)\b",
                r"\bwhere (is|are|does|do)\b",
                r"\blocated\b",
            ],
        ),
        IntentRule::new(
            Intent::Why,
            &[
                r"^\s*why\b",
                r"\bexplain why\b",
                r"\bwhat is the reason\b",
                r"\breason (for|why)\b",
            ],
        ),
        IntentRule::new(Intent::How, &[r"^\s*how\b", r"\bhow (do|does|can|to|is|are)\b"]),
        IntentRule::new(
            Intent::Explain,
            &[
                r"^\s*explain\b",
                r"\bwhat does\b",
                r"\bwhat is\b",
                r"\bdescribe\b",
                r"\bwalk me through\b",
            ],
        ),
    ]
}

static DEFAULT_CLASSIFIER: LazyLock<IntentClassifier> = LazyLock::new(|| {
    IntentClassifier::new(&default_rules()).expect("built-in intent patterns are valid")
});

/// Ordered, case-insensitive rule table. First matching rule wins.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<(Intent, RegexSet)>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        DEFAULT_CLASSIFIER.clone()
    }
}

impl IntentClassifier {
    /// Compile a rule table.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn new(rules: &[IntentRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| {
                RegexSetBuilder::new(&rule.patterns)
                    .case_insensitive(true)
                    .build()
                    .map(|set| (rule.intent, set))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Classify a question. Total: unmatched input is [`Intent::Generic`].
    #[must_use]
    pub fn classify(&self, query: &str) -> Intent {
        self.rules
            .iter()
            .find(|(_, set)| set.is_match(query))
            .map_or(Intent::Generic, |(intent, _)| *intent)
    }
}

/// How many chunks to retrieve and which kinds to favour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalProfile {
    pub k: usize,
    /// Kinds searched first. Empty means no bias.
    pub preferred_kinds: Vec<ChunkKind>,
}

impl Default for RetrievalProfile {
    fn default() -> Self {
        Self::with_k(5)
    }
}

impl RetrievalProfile {
    #[must_use]
    pub fn with_k(k: usize) -> Self {
        Self {
            k,
            preferred_kinds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalProfiles {
    pub file_location: RetrievalProfile,
    pub how: RetrievalProfile,
    pub why: RetrievalProfile,
    pub explain: RetrievalProfile,
    pub generic: RetrievalProfile,
}

impl Default for RetrievalProfiles {
    fn default() -> Self {
        Self {
            file_location: RetrievalProfile {
                k: 3,
                preferred_kinds: vec![ChunkKind::TopLevel, ChunkKind::Function, ChunkKind::Class],
            },
            how: RetrievalProfile::with_k(6),
            why: RetrievalProfile::with_k(6),
            explain: RetrievalProfile::with_k(5),
            generic: RetrievalProfile::with_k(5),
        }
    }
}

impl RetrievalProfiles {
    #[must_use]
    pub fn for_intent(&self, intent: Intent) -> &RetrievalProfile {
        match intent {
            Intent::FileLocation => &self.file_location,
            Intent::How => &self.how,
            Intent::Why => &self.why,
            Intent::Explain => &self.explain,
            Intent::Generic => &self.generic,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Intent, &RetrievalProfile)> {
        Intent::ALL.into_iter().map(|i| (i, self.for_intent(i)))
    }
}
