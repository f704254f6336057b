//! Sentiment labels, score normalization and the free-form response parser.
//!
//! Two normalization policies exist and exactly one is applied per engine:
//! - [`ScorePolicy::Signed`]: positive → +c, negative → −c, neutral → 0 (range [-1, 1]).
//! - [`ScorePolicy::LabelWeighted`]: {negative: 0, neutral: 1, positive: 2} × c (range [0, 2]).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::backend::LabelScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Models spell labels differently ("POSITIVE", "Positive", "positive").
    /// Anything that mentions neither polarity is neutral.
    pub fn from_model_label(raw: &str) -> Self {
        let l = raw.to_lowercase();
        if l.contains("positive") {
            SentimentLabel::Positive
        } else if l.contains("negative") {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorePolicy {
    #[default]
    Signed,
    LabelWeighted,
}

impl ScorePolicy {
    /// Parse a config value; unknown spellings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "signed" => Some(ScorePolicy::Signed),
            "label_weighted" | "weighted" => Some(ScorePolicy::LabelWeighted),
            _ => None,
        }
    }

    pub fn score(&self, label: SentimentLabel, confidence: f32) -> f32 {
        match self {
            ScorePolicy::Signed => match label {
                SentimentLabel::Positive => confidence,
                SentimentLabel::Negative => -confidence,
                SentimentLabel::Neutral => 0.0,
            },
            ScorePolicy::LabelWeighted => {
                let w = match label {
                    SentimentLabel::Negative => 0.0,
                    SentimentLabel::Neutral => 1.0,
                    SentimentLabel::Positive => 2.0,
                };
                w * confidence
            }
        }
    }
}

/// Normalized per-model sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub score: f32,
}

impl SentimentResult {
    pub fn normalize(raw: &LabelScore, policy: ScorePolicy) -> Self {
        let label = SentimentLabel::from_model_label(&raw.label);
        let confidence = raw.score.clamp(0.0, 1.0);
        Self {
            label,
            score: policy.score(label, confidence),
        }
    }
}

/// Confidence reported for a polar label found in generated text.
pub const GENERATED_POLAR_CONFIDENCE: f32 = 0.9;
/// Confidence reported when generated text names no polarity.
pub const GENERATED_NEUTRAL_CONFIDENCE: f32 = 0.5;

/// Parse a generative model's answer. Never fails: unrecognized text is neutral.
pub fn parse_generated(response: &str) -> LabelScore {
    let lower = response.to_lowercase();
    if lower.contains("positive") {
        LabelScore::new("positive", GENERATED_POLAR_CONFIDENCE)
    } else if lower.contains("negative") {
        LabelScore::new("negative", GENERATED_POLAR_CONFIDENCE)
    } else {
        LabelScore::new("neutral", GENERATED_NEUTRAL_CONFIDENCE)
    }
}
