//! Quality policy evaluation
//!
//! Decides whether a release quality is acceptable for a series and whether it
//! is worth grabbing over a file already on disk. Used by:
//! - the feed ingestion pipeline (policy gate and "is needed" check)
//! - `SeriesRepository::quality_wanted`

use tracing::trace;

use crate::quality::{Quality, QualityProfile};

/// Stateless quality policy rules
pub struct QualityEvaluator;

impl QualityEvaluator {
    /// Whether the profile accepts this quality at all
    ///
    /// The tier must be in the allowed set. A non-proper below the cutoff is
    /// rejected; a proper below the cutoff only when the profile allows proper
    /// upgrades. Proper never turns a disallowed tier into an allowed one.
    pub fn accepts(profile: &QualityProfile, quality: Quality) -> bool {
        let accepted = profile.allows(quality.tier)
            && (quality.tier >= profile.cutoff || (quality.is_proper && profile.allow_proper_upgrades));
        trace!(
            profile = %profile.name,
            quality = %quality,
            accepted = accepted,
            "Evaluated quality policy"
        );
        accepted
    }

    /// Whether the existing quality has reached the profile's cutoff
    pub fn meets_cutoff(profile: &QualityProfile, existing: Quality) -> bool {
        existing.tier >= profile.cutoff
    }

    /// Whether `candidate` should replace a file of `existing` quality
    pub fn is_wanted_upgrade(profile: &QualityProfile, existing: Quality, candidate: Quality) -> bool {
        if !Self::accepts(profile, candidate) {
            return false;
        }

        let below_cutoff = !Self::meets_cutoff(profile, existing);

        if candidate.tier > existing.tier {
            return below_cutoff;
        }

        // Same tier proper replacing a non-proper
        if candidate.tier == existing.tier && candidate.is_proper && !existing.is_proper {
            return below_cutoff || profile.allow_proper_upgrades;
        }

        false
    }
}
