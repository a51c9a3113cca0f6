//! Fusion of a correlated raw report into its local track.
//!
//! # Strategies
//! - **Replacement**: the local track takes the newest contributor's
//!   kinematics verbatim.
//! - **Weighted**: the local track is extrapolated to the report time and
//!   blended with the report using a Kalman gain K = P·(P + R)⁻¹, with the
//!   covariance updated in Joseph form (I − K)·P·(I − K)ᵀ + K·R·Kᵀ.
//!
//! Both strategies copy truth, side and IFF attributes from the report when
//! it carries them.

use crate::{
    geometry::Covariance,
    track::{LocalTrack, RawTrack},
    types::Mat3,
};
use serde::{Deserialize, Serialize};

pub trait FusionStrategy {
    /// Fold `raw` into `local`. Returns false when nothing could be fused.
    fn fuse(&self, sim_time: f64, raw: &RawTrack, local: &mut LocalTrack) -> bool;
}

/// Built-in fusion strategies, selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    #[default]
    Replacement,
    Weighted,
}

impl FusionMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "replacement" => Some(FusionMethod::Replacement),
            "weighted" => Some(FusionMethod::Weighted),
            _ => None,
        }
    }

    pub fn build(self) -> Box<dyn FusionStrategy> {
        match self {
            FusionMethod::Replacement => Box::new(ReplacementFusion),
            FusionMethod::Weighted => Box::new(WeightedFusion),
        }
    }
}

fn copy_attributes(raw: &RawTrack, local: &mut LocalTrack) {
    if raw.truth_id.is_some() {
        local.truth_id = raw.truth_id;
    }
    if raw.side.is_some() {
        local.side = raw.side.clone();
    }
    if raw.iff != Default::default() {
        local.iff = raw.iff;
    }
}

// ---------------------------------------------------------------------------
// Replacement
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct ReplacementFusion;

impl FusionStrategy for ReplacementFusion {
    fn fuse(&self, _sim_time: f64, raw: &RawTrack, local: &mut LocalTrack) -> bool {
        let Some(position) = raw.reported_position() else {
            // Angle-only data only refreshes the attributes.
            copy_attributes(raw, local);
            return false;
        };
        local.location = Some(position);
        if raw.velocity.is_some() {
            local.velocity = raw.velocity;
        }
        if let Some(cov) = raw.position_covariance() {
            local.state_covariance = Some(cov);
        }
        local.expected_location_error = Some(raw.expected_location_error());
        local.update_time = local.update_time.max(raw.update_time);
        local.update_count += 1;
        copy_attributes(raw, local);
        true
    }
}

// ---------------------------------------------------------------------------
// Weighted
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct WeightedFusion;

impl WeightedFusion {
    /// Covariance of a track, falling back to an isotropic one built from its
    /// scalar error.
    fn covariance_or_scalar(cov: Option<Covariance>, scalar_error: f64) -> Option<Mat3> {
        match cov {
            Some(c) => Some(*c.matrix()),
            None if scalar_error > 0.0 => Some(*Covariance::isotropic(scalar_error).matrix()),
            None => None,
        }
    }
}

impl FusionStrategy for WeightedFusion {
    fn fuse(&self, sim_time: f64, raw: &RawTrack, local: &mut LocalTrack) -> bool {
        let (Some(z), Some(_)) = (raw.reported_position(), local.location) else {
            return ReplacementFusion.fuse(sim_time, raw, local);
        };
        let Some(x) = local.extrapolated_position_at(raw.update_time) else {
            return ReplacementFusion.fuse(sim_time, raw, local);
        };
        let p = Self::covariance_or_scalar(local.state_covariance, local.expected_location_error());
        let r = Self::covariance_or_scalar(raw.position_covariance(), raw.expected_location_error());
        let (Some(p), Some(r)) = (p, r) else {
            return ReplacementFusion.fuse(sim_time, raw, local);
        };
        let Some(s_inv) = (p + r).try_inverse() else {
            return ReplacementFusion.fuse(sim_time, raw, local);
        };

        let k = p * s_inv;
        let i_k = Mat3::identity() - k;
        let fused = x + k * (z - x);
        let fused_cov = i_k * p * i_k.transpose() + k * r * k.transpose();

        local.location = Some(fused);
        if raw.velocity.is_some() {
            local.velocity = raw.velocity;
        }
        let fused_cov = Covariance::new(fused_cov);
        local.expected_location_error = Some(fused_cov.max_variance().max(0.0).sqrt());
        local.state_covariance = Some(fused_cov);
        local.update_time = local.update_time.max(raw.update_time);
        local.update_count += 1;
        copy_attributes(raw, local);
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
