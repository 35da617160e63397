use serde::{Deserialize, Serialize};

use super::event::EventIndex;

/// An auxiliary item (e.g. a social post) that may be cited next to a
/// block. The engine never reads these fields itself; they only feed an
/// [`AttachmentScorer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentCandidate {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub is_team_account: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub engagement: u64,
    /// Event the item was posted closest to, if known.
    #[serde(default)]
    pub anchor_index: Option<EventIndex>,
}

/// What the block grouper actually consumes: an id and a scalar score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAttachment {
    pub id: String,
    pub score: f64,
    #[serde(default)]
    pub anchor_index: Option<EventIndex>,
}

pub trait AttachmentScorer {
    fn score(&self, candidate: &AttachmentCandidate) -> f64;

    fn score_all(&self, candidates: &[AttachmentCandidate]) -> Vec<ScoredAttachment> {
        candidates
            .iter()
            .map(|c| ScoredAttachment {
                id: c.id.clone(),
                score: self.score(c),
                anchor_index: c.anchor_index,
            })
            .collect()
    }
}

/// Weighted sum of the candidate's signals, with engagement on a log
/// scale so one viral post cannot drown everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultAttachmentScorer {
    pub media_weight: f64,
    pub team_account_weight: f64,
    pub verified_weight: f64,
    pub engagement_weight: f64,
    /// Posts shorter than this many characters score zero.
    pub min_text_len: usize,
}

impl Default for DefaultAttachmentScorer {
    fn default() -> Self {
        Self {
            media_weight: 2.0,
            team_account_weight: 3.0,
            verified_weight: 1.0,
            engagement_weight: 1.0,
            min_text_len: 4,
        }
    }
}

impl AttachmentScorer for DefaultAttachmentScorer {
    fn score(&self, candidate: &AttachmentCandidate) -> f64 {
        if candidate.text.trim().chars().count() < self.min_text_len {
            return 0.0;
        }
        let mut score = 0.0;
        if candidate.has_media {
            score += self.media_weight;
        }
        if candidate.is_team_account {
            score += self.team_account_weight;
        }
        if candidate.is_verified {
            score += self.verified_weight;
        }
        score + self.engagement_weight * (1.0 + candidate.engagement as f64).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str) -> AttachmentCandidate {
        AttachmentCandidate {
            id: id.to_string(),
            text: "What a finish from the corner!".to_string(),
            has_media: false,
            is_team_account: false,
            is_verified: false,
            engagement: 0,
            anchor_index: None,
        }
    }

    #[test]
    fn signals_add_up() {
        let scorer = DefaultAttachmentScorer::default();
        let plain = scorer.score(&candidate("a"));
        assert_eq!(plain, 0.0);

        let rich = AttachmentCandidate {
            has_media: true,
            is_team_account: true,
            is_verified: true,
            ..candidate("b")
        };
        assert_eq!(scorer.score(&rich), 6.0);
    }

    #[test]
    fn engagement_is_log_scaled() {
        let scorer = DefaultAttachmentScorer::default();
        let modest = scorer.score(&AttachmentCandidate {
            engagement: 100,
            ..candidate("a")
        });
        let viral = scorer.score(&AttachmentCandidate {
            engagement: 1_000_000,
            ..candidate("b")
        });
        assert!(viral > modest);
        assert!(viral < modest * 4.0);
    }

    #[test]
    fn blank_text_scores_zero() {
        let scorer = DefaultAttachmentScorer::default();
        let blank = AttachmentCandidate {
            text: "  ".to_string(),
            has_media: true,
            engagement: 5000,
            ..candidate("a")
        };
        assert_eq!(scorer.score(&blank), 0.0);
    }

    struct Constant(f64);

    impl AttachmentScorer for Constant {
        fn score(&self, _candidate: &AttachmentCandidate) -> f64 {
            self.0
        }
    }

    #[test]
    fn custom_scorer_is_used_by_score_all() {
        let scored = Constant(7.5).score_all(&[candidate("x"), candidate("y")]);
        assert_eq!(scored.len(), 2);
        assert!(scored.iter().all(|s| s.score == 7.5));
        assert_eq!(scored[1].id, "y");
    }
}
