//! Memory record model.
//!
//! Records are built through validating constructors; a record with an
//! out-of-range score or an empty identity field can never exist.
//! Deserialization funnels through the same constructors via raw shadow
//! structs, so untrusted JSON (model output, stored rows) gets the same
//! checks.

use mnemo_common::{MnemoError, Result};
use serde::{Deserialize, Serialize};

/// A preference the user has expressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPreference")]
pub struct Preference {
    pub(crate) category: String,
    pub(crate) preference: String,
    pub(crate) confidence: f64,
}

impl Preference {
    /// Create a preference, validating that both identity fields are
    /// non-empty and `confidence` lies in `[0, 1]`.
    pub fn new(
        category: impl Into<String>,
        preference: impl Into<String>,
        confidence: f64,
    ) -> Result<Self> {
        let category = category.into();
        let preference = preference.into();
        if category.trim().is_empty() {
            return Err(MnemoError::Validation(
                "preference category must not be empty".into(),
            ));
        }
        if preference.trim().is_empty() {
            return Err(MnemoError::Validation(
                "preference text must not be empty".into(),
            ));
        }
        validate_unit_range("confidence", confidence)?;
        Ok(Self {
            category,
            preference,
            confidence,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn preference(&self) -> &str {
        &self.preference
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Identity key used by the merge engine: exact category plus the
    /// lowercased preference text.
    pub fn identity_key(&self) -> (String, String) {
        (self.category.clone(), self.preference.to_lowercase())
    }
}

#[derive(Deserialize)]
struct RawPreference {
    category: String,
    preference: String,
    confidence: f64,
}

impl TryFrom<RawPreference> for Preference {
    type Error = MnemoError;

    fn try_from(raw: RawPreference) -> Result<Self> {
        Preference::new(raw.category, raw.preference, raw.confidence)
    }
}

/// A recurring emotional state, with the context it appears in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEmotionalPattern")]
pub struct EmotionalPattern {
    pub(crate) emotion: String,
    pub(crate) context: String,
    pub(crate) frequency: u32,
    pub(crate) triggers: Vec<String>,
}

impl EmotionalPattern {
    /// Create an emotional pattern. `frequency` is a counter, not a
    /// score; any non-negative value is accepted.
    pub fn new(
        emotion: impl Into<String>,
        context: impl Into<String>,
        frequency: u32,
        triggers: Vec<String>,
    ) -> Result<Self> {
        let emotion = emotion.into();
        let context = context.into();
        if emotion.trim().is_empty() {
            return Err(MnemoError::Validation(
                "pattern emotion must not be empty".into(),
            ));
        }
        if context.trim().is_empty() {
            return Err(MnemoError::Validation(
                "pattern context must not be empty".into(),
            ));
        }
        Ok(Self {
            emotion,
            context,
            frequency,
            triggers,
        })
    }

    pub fn emotion(&self) -> &str {
        &self.emotion
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    /// Identity key used by the merge engine: lowercased emotion and
    /// context.
    pub fn identity_key(&self) -> (String, String) {
        (self.emotion.to_lowercase(), self.context.to_lowercase())
    }
}

#[derive(Deserialize)]
struct RawEmotionalPattern {
    emotion: String,
    context: String,
    frequency: u32,
    #[serde(default)]
    triggers: Vec<String>,
}

impl TryFrom<RawEmotionalPattern> for EmotionalPattern {
    type Error = MnemoError;

    fn try_from(raw: RawEmotionalPattern) -> Result<Self> {
        EmotionalPattern::new(raw.emotion, raw.context, raw.frequency, raw.triggers)
    }
}

/// A fact about the user worth remembering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFact")]
pub struct Fact {
    pub(crate) fact: String,
    pub(crate) category: String,
    pub(crate) importance: f64,
    pub(crate) context: String,
}

impl Fact {
    /// Create a fact, validating the fact text and the `[0, 1]`
    /// importance range. Category and context are free text and may be
    /// empty; they are not part of the identity key.
    pub fn new(
        fact: impl Into<String>,
        category: impl Into<String>,
        importance: f64,
        context: impl Into<String>,
    ) -> Result<Self> {
        let fact = fact.into();
        if fact.trim().is_empty() {
            return Err(MnemoError::Validation("fact text must not be empty".into()));
        }
        validate_unit_range("importance", importance)?;
        Ok(Self {
            fact,
            category: category.into(),
            importance,
            context: context.into(),
        })
    }

    pub fn fact(&self) -> &str {
        &self.fact
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn importance(&self) -> f64 {
        self.importance
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Identity key used by the merge engine: the lowercased fact text.
    pub fn identity_key(&self) -> String {
        self.fact.to_lowercase()
    }
}

#[derive(Deserialize)]
struct RawFact {
    fact: String,
    #[serde(default)]
    category: String,
    importance: f64,
    #[serde(default)]
    context: String,
}

impl TryFrom<RawFact> for Fact {
    type Error = MnemoError;

    fn try_from(raw: RawFact) -> Result<Self> {
        Fact::new(raw.fact, raw.category, raw.importance, raw.context)
    }
}

/// The aggregate of everything extracted about one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub preferences: Vec<Preference>,

    #[serde(default)]
    pub emotional_patterns: Vec<EmotionalPattern>,

    #[serde(default)]
    pub facts: Vec<Fact>,
}

impl Memory {
    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty() && self.emotional_patterns.is_empty() && self.facts.is_empty()
    }

    /// Total number of records across all kinds.
    pub fn len(&self) -> usize {
        self.preferences.len() + self.emotional_patterns.len() + self.facts.len()
    }
}

fn validate_unit_range(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(MnemoError::Validation(format!(
            "{field} must be within [0.0, 1.0], got {value}"
        )));
    }
    Ok(())
}
