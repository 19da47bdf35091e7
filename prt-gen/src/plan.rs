//! Integration descriptors and the thread-group-aligned plan derived from them.

/// Parameters for environment-map coefficient generation.
#[derive(Clone, Debug)]
pub struct EmDesc {
    /// Maximum spherical harmonic degree.
    pub max_l: u32,
    /// Total number of Monte Carlo events; rounded up to the next 64*n^2.
    pub num_events: u32,
    /// Grid points per angle axis used to tabulate the basis functions;
    /// rounded up to the next multiple of 8.
    pub sh_grid_num: u32,
    /// Silence stage banners and progress counters.
    pub suppress_output: bool,
}

impl Default for EmDesc {
    fn default() -> Self {
        Self {
            max_l: 3,
            num_events: 262_144,
            sh_grid_num: 512,
            suppress_output: false,
        }
    }
}

/// Parameters for per-vertex transfer coefficient generation.
#[derive(Clone, Debug)]
pub struct PrtDesc {
    pub max_l: u32,
    pub num_events: u32,
    pub sh_grid_num: u32,
    pub suppress_output: bool,
}

impl Default for PrtDesc {
    fn default() -> Self {
        let em = EmDesc::default();
        Self {
            max_l: em.max_l,
            num_events: em.num_events,
            sh_grid_num: em.sh_grid_num,
            suppress_output: em.suppress_output,
        }
    }
}

/// Quantities derived once per generation call. All GPU dispatch shapes and
/// buffer sizes come from here, never from the raw descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntegrationPlan {
    pub max_l: u32,
    pub n_coefficients: u32,
    /// `num_events` rounded up to `64 * n^2` so events tile 8x8 thread groups.
    pub num_events_rounded: u32,
    /// `sqrt(num_events_rounded)`; always a multiple of 8.
    pub num_events_per_axis: u32,
    /// `sh_grid_num` rounded up to a multiple of 8.
    pub sh_grid_rounded: u32,
    /// `num_events_rounded / 64`; partial sums are one slot per group.
    pub num_thread_groups: u32,
}

/// Round the descriptor inputs up to thread-group-aligned sizes. Inputs are
/// never decreased; already-aligned values pass through unchanged.
pub fn compute_plan(max_l: u32, num_events: u32, sh_grid_num: u32) -> IntegrationPlan {
    let n = ((num_events.max(1) as f32).sqrt() / 8.0).ceil() as u32;
    let num_events_rounded = 64 * n * n;
    let num_events_per_axis = 8 * n;

    let g = (sh_grid_num.max(1) as f32 / 8.0).ceil() as u32;
    let sh_grid_rounded = 8 * g;

    IntegrationPlan {
        max_l,
        n_coefficients: (max_l + 1) * (max_l + 1),
        num_events_rounded,
        num_events_per_axis,
        sh_grid_rounded,
        num_thread_groups: num_events_rounded / 64,
    }
}
