//! Reduction of per-thread-group partial sums into final coefficients.

use std::f32::consts::PI;

use crate::plan::IntegrationPlan;

/// Environment maps integrate radiance over the full sphere: estimator
/// normalized by the 4*pi solid angle.
pub const EM_NORMALIZATION: f32 = 4.0 * PI;

/// Per-vertex transfer integrates the visibility-weighted cosine lobe over
/// the hemisphere. A cosine-weighted estimator would carry pi here, not 4;
/// DESIGN.md records why the constant is kept as-is.
pub const PRT_NORMALIZATION: f32 = 4.0;

/// Sum the `num_thread_groups` partials per (coefficient, channel) and scale
/// by `norm / num_events_rounded`. Partials are laid out
/// `[(coeff * groups + group) * channels + channel]`, the order the GPU
/// result buffer is written in.
pub fn reduce(
    partials: &[f32],
    plan: &IntegrationPlan,
    channels: usize,
    norm: f32,
) -> Vec<f32> {
    let groups = plan.num_thread_groups as usize;
    let n = plan.n_coefficients as usize;
    debug_assert_eq!(partials.len(), n * groups * channels);

    let scale = norm / plan.num_events_rounded as f32;
    let mut out = Vec::with_capacity(n * channels);
    for j in 0..n {
        for ch in 0..channels {
            let mut total = 0.0f32;
            for k in 0..groups {
                total += partials[(j * groups + k) * channels + ch];
            }
            out.push(total * scale);
        }
    }
    out
}

pub fn reduce_em(partials: &[f32], plan: &IntegrationPlan) -> Vec<f32> {
    reduce(partials, plan, 3, EM_NORMALIZATION)
}

pub fn reduce_prt(partials: &[f32], plan: &IntegrationPlan) -> Vec<f32> {
    reduce(partials, plan, 1, PRT_NORMALIZATION)
}
