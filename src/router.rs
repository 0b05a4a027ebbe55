use std::fmt;

use serde::{Deserialize, Serialize};

/// Claude model tiers, ordered by capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Haiku,
    Sonnet,
    Opus,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Haiku => write!(f, "haiku"),
            ModelTier::Sonnet => write!(f, "sonnet"),
            ModelTier::Opus => write!(f, "opus"),
        }
    }
}

impl ModelTier {
    /// Normalize a free-form model label ("claude-opus-4-6", "OPUS", ...) to
    /// a base tier. Returns `None` when the label names no known tier.
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.to_lowercase();
        if lower.contains("opus") {
            Some(ModelTier::Opus)
        } else if lower.contains("sonnet") {
            Some(ModelTier::Sonnet)
        } else if lower.contains("haiku") {
            Some(ModelTier::Haiku)
        } else {
            None
        }
    }
}

/// Routing recommendation with the matched keyword for display.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    pub tier: ModelTier,
    pub matched: Option<&'static str>,
    pub rationale: &'static str,
}

/// Recommends a model tier for a bead intent using weighted keyword scoring.
pub struct ModelRouter;

impl ModelRouter {
    /// Complexity-based tier recommendation for a bead intent.
    #[allow(dead_code)]
    pub fn route(intent: &str) -> ModelTier {
        Self::explain(intent).tier
    }

    /// Same as [`ModelRouter::route`], with the matched keyword and a
    /// one-line rationale for display.
    pub fn explain(intent: &str) -> RoutingDecision {
        let lower = intent.to_lowercase();

        let opus_keywords: &[(&str, u32)] = &[
            ("architect", 10),
            ("redesign", 10),
            ("research", 10),
            ("overhaul", 10),
            ("design", 8),
            ("strategy", 8),
            ("migrat", 8),
            ("refactor", 8),
            ("framework", 5),
            ("evaluate", 5),
        ];

        let haiku_keywords: &[(&str, u32)] = &[
            ("summarize", 10),
            ("typo", 10),
            ("rename", 10),
            ("format", 10),
            ("ledger", 5),
            ("comment", 5),
            ("delete", 5),
            ("remove", 5),
        ];

        let mut opus_score: u32 = 0;
        let mut opus_matched: Option<&'static str> = None;
        for &(keyword, weight) in opus_keywords {
            if lower.contains(keyword) {
                opus_score += weight;
                opus_matched.get_or_insert(keyword);
            }
        }

        let mut haiku_score: u32 = 0;
        let mut haiku_matched: Option<&'static str> = None;
        for &(keyword, weight) in haiku_keywords {
            if lower.contains(keyword) {
                haiku_score += weight;
                haiku_matched.get_or_insert(keyword);
            }
        }

        // Length heuristic
        if intent.len() < 20 {
            haiku_score += 5;
        }
        if intent.len() > 100 {
            opus_score += 5;
        }

        // Word count heuristic
        let word_count = intent.split_whitespace().count();
        if word_count > 15 {
            opus_score += 3;
        }

        if opus_score > haiku_score && opus_score >= 5 {
            RoutingDecision {
                tier: ModelTier::Opus,
                matched: opus_matched,
                rationale: "High-complexity task requiring long-horizon reasoning",
            }
        } else if haiku_score > opus_score && haiku_score >= 5 {
            RoutingDecision {
                tier: ModelTier::Haiku,
                matched: haiku_matched,
                rationale: "Simple, well-defined task",
            }
        } else {
            RoutingDecision {
                tier: ModelTier::Sonnet,
                matched: None,
                rationale: "Standard implementation task",
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- from_label tests ---

    #[test]
    fn from_label_full_model_ids() {
        assert_eq!(
            ModelTier::from_label("claude-opus-4-6"),
            Some(ModelTier::Opus)
        );
        assert_eq!(
            ModelTier::from_label("claude-sonnet-4-5-20250929"),
            Some(ModelTier::Sonnet)
        );
        assert_eq!(
            ModelTier::from_label("claude-haiku-4-5-20251001"),
            Some(ModelTier::Haiku)
        );
    }

    #[test]
    fn from_label_is_case_insensitive() {
        assert_eq!(ModelTier::from_label("OPUS"), Some(ModelTier::Opus));
        assert_eq!(ModelTier::from_label("Sonnet"), Some(ModelTier::Sonnet));
    }

    #[test]
    fn from_label_unknown_is_none() {
        assert_eq!(ModelTier::from_label("gpt-4"), None);
        assert_eq!(ModelTier::from_label(""), None);
    }

    // --- routing tests ---

    #[test]
    fn route_opus_for_architecture() {
        assert_eq!(
            ModelRouter::route("architect the new payment system"),
            ModelTier::Opus
        );
        assert_eq!(
            ModelRouter::route("research persistence alternatives for the cache"),
            ModelTier::Opus
        );
    }

    #[test]
    fn route_haiku_for_simple_edits() {
        assert_eq!(ModelRouter::route("fix typo in readme"), ModelTier::Haiku);
        assert_eq!(
            ModelRouter::route("rename the helper function"),
            ModelTier::Haiku
        );
    }

    #[test]
    fn route_haiku_for_short_intents() {
        assert_eq!(ModelRouter::route("add a button"), ModelTier::Haiku);
    }

    #[test]
    fn route_sonnet_default() {
        assert_eq!(
            ModelRouter::route("implement the user profile page"),
            ModelTier::Sonnet
        );
    }

    #[test]
    fn route_opus_for_long_descriptions() {
        assert_eq!(
            ModelRouter::route(
                "implement a complete multi-file authentication flow with token refresh, \
                 session storage and logout across the app"
            ),
            ModelTier::Opus
        );
    }

    #[test]
    fn explain_reports_matched_keyword() {
        let decision = ModelRouter::explain("redesign the database schema for scaling");
        assert_eq!(decision.tier, ModelTier::Opus);
        assert_eq!(decision.matched, Some("redesign"));
    }

    #[test]
    fn explain_sonnet_has_no_match() {
        let decision = ModelRouter::explain("implement the settings panel layout");
        assert_eq!(decision.tier, ModelTier::Sonnet);
        assert_eq!(decision.matched, None);
    }

    #[test]
    fn tier_display_and_serde() {
        assert_eq!(ModelTier::Opus.to_string(), "opus");
        assert_eq!(
            serde_json::to_string(&ModelTier::Haiku).unwrap(),
            "\"haiku\""
        );
        assert_eq!(
            serde_json::from_str::<ModelTier>("\"sonnet\"").unwrap(),
            ModelTier::Sonnet
        );
    }
}
