//! PRT generator: wgpu-based Monte Carlo projection of environment maps and
//! per-vertex transfer functions onto a spherical harmonic basis.

pub mod codec;
pub mod em;
pub mod plan;
pub mod prt;
pub mod reduce;
pub mod resources;
pub mod seeds;
pub mod sh;

use std::path::Path;

pub use codec::{NumberedVertex, PrtReader};
pub use plan::{compute_plan, EmDesc, IntegrationPlan, PrtDesc};

use em::EmPass;
use prt::PrtPasses;
use resources::{EmResourcePlan, EmResources, PrtResourcePlan, PrtResources};

/// Decoded triangle mesh: flat xyz positions, one xyz normal per vertex,
/// 0-based triangle indices. Parsing lives with the callers; the generator
/// only consumes arrays.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn validate(&self) -> Result<(), String> {
        if self.positions.is_empty() || self.positions.len() % 3 != 0 {
            return Err("mesh positions must be non-empty xyz triples".to_string());
        }
        if self.normals.len() != self.positions.len() {
            return Err("mesh needs one normal per vertex".to_string());
        }
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            return Err("mesh indices must be non-empty triangles".to_string());
        }
        let vertex_count = self.vertex_count() as u32;
        if self.indices.iter().any(|&i| i >= vertex_count) {
            return Err("mesh index out of range".to_string());
        }
        Ok(())
    }
}

/// Project an equirectangular RGB radiance image onto the SH basis. Returns
/// `3 * (max_l + 1)^2` coefficients, RGB interleaved per basis function.
///
/// Independent generation calls may run concurrently from separate threads;
/// each call owns its resource set and only shares the device and queue.
pub fn generate_em(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pixels_rgb: &[f32],
    width: u32,
    height: u32,
    desc: &EmDesc,
) -> Result<Vec<f32>, String> {
    if width == 0 || height == 0 {
        return Err("radiance image must not be empty".to_string());
    }
    if pixels_rgb.len() != width as usize * height as usize * 3 {
        return Err(format!(
            "radiance image is {} floats, expected {} for {}x{} rgb",
            pixels_rgb.len(),
            width as usize * height as usize * 3,
            width,
            height
        ));
    }

    let plan = compute_plan(desc.max_l, desc.num_events, desc.sh_grid_num);
    if !desc.suppress_output {
        log::info!("Initializing");
    }

    let grids = sh::basis_grids(&plan);
    let seeds = seeds::generate_seeds(plan.num_events_rounded);
    let spec = EmResourcePlan::new(&plan, width, height);
    let resources = EmResources::create(device, queue, &spec, pixels_rgb, seeds, grids)?;
    let pass = EmPass::new(device)?;

    if !desc.suppress_output {
        log::info!("Calculating coefficients");
    }
    let partials = pass.run(device, queue, &resources, &plan)?;
    Ok(reduce::reduce_em(&partials, &plan))
}

/// [`generate_em`], then write the coefficients to `out_path`. A write
/// failure does not discard the finished GPU work: it is logged and the
/// coefficients are still returned.
pub fn generate_em_to_file(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pixels_rgb: &[f32],
    width: u32,
    height: u32,
    desc: &EmDesc,
    out_path: &Path,
) -> Result<Vec<f32>, String> {
    let coefficients = generate_em(device, queue, pixels_rgb, width, height, desc)?;
    if !desc.suppress_output {
        log::info!("Writing file");
    }
    match codec::write_em_file(out_path, desc.max_l, &coefficients) {
        Ok(()) => {
            if !desc.suppress_output {
                log::info!("Finished writing to file: {}", out_path.display());
            }
        }
        Err(e) => log::warn!("unable to write {}: {}", out_path.display(), e),
    }
    Ok(coefficients)
}

/// Compute self-shadowed transfer coefficients for every vertex of `mesh`.
/// Returns `(max_l + 1)^2` coefficients per vertex, vertex-major. Vertices
/// are processed strictly one at a time; the GPU buffer set is reused
/// across the whole loop.
pub fn generate_prt(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    mesh: &MeshData,
    desc: &PrtDesc,
) -> Result<Vec<f32>, String> {
    mesh.validate()?;

    let plan = compute_plan(desc.max_l, desc.num_events, desc.sh_grid_num);
    if !desc.suppress_output {
        log::info!("Initializing");
    }

    let grids = sh::basis_grids(&plan);
    let seeds = seeds::generate_seeds(plan.num_events_rounded);
    let spec = PrtResourcePlan::new(
        &plan,
        mesh.vertex_count() as u32,
        mesh.triangle_count() as u32,
    );
    let resources = PrtResources::create(
        device,
        queue,
        &spec,
        &mesh.positions,
        &mesh.indices,
        seeds,
        grids,
    )?;
    let passes = PrtPasses::new(device, &resources)?;

    if !desc.suppress_output {
        log::info!("Calculating coefficients");
    }

    let vertex_count = mesh.vertex_count();
    let mut coefficients = Vec::with_capacity(vertex_count * plan.n_coefficients as usize);
    for i in 0..vertex_count {
        if i % 100 == 0 && !desc.suppress_output {
            log::info!("{} out of {} vertices processed", i, vertex_count);
        }
        let position = [
            mesh.positions[3 * i],
            mesh.positions[3 * i + 1],
            mesh.positions[3 * i + 2],
        ];
        let normal = [
            mesh.normals[3 * i],
            mesh.normals[3 * i + 1],
            mesh.normals[3 * i + 2],
        ];
        let partials = passes.run_vertex(device, queue, &resources, &plan, position, normal)?;
        coefficients.extend(reduce::reduce_prt(&partials, &plan));
    }
    Ok(coefficients)
}

/// [`generate_prt`], then write the mesh and its coefficients to `out_path`.
/// Write failures are logged, not fatal, matching [`generate_em_to_file`].
pub fn generate_prt_to_file(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    mesh: &MeshData,
    desc: &PrtDesc,
    out_path: &Path,
) -> Result<Vec<f32>, String> {
    let coefficients = generate_prt(device, queue, mesh, desc)?;
    if !desc.suppress_output {
        log::info!("Writing to file: {}", out_path.display());
    }
    if let Err(e) = codec::write_mesh_file(
        out_path,
        desc.max_l,
        &mesh.positions,
        &coefficients,
        &mesh.indices,
    ) {
        log::warn!("unable to write {}: {}", out_path.display(), e);
    }
    Ok(coefficients)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> MeshData {
        MeshData {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    #[test]
    fn mesh_validation_rejects_bad_input() {
        let mut mesh = quad_mesh();
        assert!(mesh.validate().is_ok());

        mesh.normals.pop();
        assert!(mesh.validate().is_err());

        let mut mesh = quad_mesh();
        mesh.indices[0] = 99;
        assert!(mesh.validate().is_err());

        let empty = MeshData::default();
        assert!(empty.validate().is_err());
    }
}
