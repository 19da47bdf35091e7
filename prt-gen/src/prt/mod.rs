//! Per-vertex transfer integration: prepass, ray trace, integrate, readback.
//!
//! The three pipelines share one reusable buffer set, so vertices run
//! strictly one after another: the ray-trace submission must retire before
//! the integrate pass may read the visibility buffer, and the integrate
//! submission must retire before the partial sums are mapped. Each wait is a
//! full submit-and-block round trip on the driving thread.

use crate::plan::IntegrationPlan;
use crate::resources::{
    coeff_bind_groups, read_back_f32, storage_entry, texture_entry, uniform_entry, PrtResources,
};

const PREPASS_SHADER: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/prt_prepass.wgsl"));
const RAYTRACE_SHADER: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/prt_raytrace.wgsl"));
const INTEGRATE_SHADER: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/prt_integrate.wgsl"));

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct RayParams {
    ray_pos: [f32; 4],
    forward: [f32; 4],
    x_dir: [f32; 4],
    num_events_per_axis: u32,
    num_plane_chunks: u32,
    num_planes: u32,
    _pad: u32,
}

pub struct PrtPasses {
    prepass: wgpu::ComputePipeline,
    raytrace: wgpu::ComputePipeline,
    integrate: wgpu::ComputePipeline,
    prepass_bind_group: wgpu::BindGroup,
    raytrace_bind_group: wgpu::BindGroup,
    integrate_bind_group: wgpu::BindGroup,
    coeff_bind_groups: Vec<wgpu::BindGroup>,
    ray_params: wgpu::Buffer,
}

impl PrtPasses {
    pub fn new(device: &wgpu::Device, resources: &PrtResources) -> Result<Self, String> {
        let ray_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ray_params"),
            size: std::mem::size_of::<RayParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let prepass_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prt_prepass_bind_group_layout"),
            entries: &[
                uniform_entry(0, 64),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        });
        let raytrace_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prt_raytrace_bind_group_layout"),
            entries: &[
                uniform_entry(0, 64),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, false),
            ],
        });
        let integrate_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prt_integrate_bind_group_layout"),
            entries: &[
                uniform_entry(0, 64),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        });
        let coeff_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("prt_coeff_bind_group_layout"),
            entries: &[uniform_entry(0, 16), texture_entry(1)],
        });

        let prepass = compute_pipeline(
            device,
            "prt_prepass",
            PREPASS_SHADER,
            &[&prepass_layout],
        );
        let raytrace = compute_pipeline(
            device,
            "prt_raytrace",
            RAYTRACE_SHADER,
            &[&raytrace_layout],
        );
        let integrate = compute_pipeline(
            device,
            "prt_integrate",
            INTEGRATE_SHADER,
            &[&integrate_layout, &coeff_layout],
        );

        let prepass_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("prt_prepass_bind_group"),
            layout: &prepass_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ray_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: resources.positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.indices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: resources.candidates.as_entire_binding(),
                },
            ],
        });
        let raytrace_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("prt_raytrace_bind_group"),
            layout: &raytrace_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ray_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: resources.positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.indices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: resources.candidates.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: resources.seeds.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: resources.visibility.as_entire_binding(),
                },
            ],
        });
        let integrate_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("prt_integrate_bind_group"),
            layout: &integrate_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: ray_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: resources.seeds.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.visibility.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: resources.result.as_entire_binding(),
                },
            ],
        });
        let coeff_bind_groups = coeff_bind_groups(
            device,
            &coeff_layout,
            &resources.basis,
            "prt_coeff_bind_group",
        );

        Ok(Self {
            prepass,
            raytrace,
            integrate,
            prepass_bind_group,
            raytrace_bind_group,
            integrate_bind_group,
            coeff_bind_groups,
            ray_params,
        })
    }

    /// Run the full prepass -> ray trace -> integrate -> readback sequence
    /// for one vertex and return the raw per-group partial sums.
    pub fn run_vertex(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        resources: &PrtResources,
        plan: &IntegrationPlan,
        position: [f32; 3],
        normal: [f32; 3],
    ) -> Result<Vec<f32>, String> {
        let x_dir = tangent_for(normal);
        let params = RayParams {
            ray_pos: [position[0], position[1], position[2], 0.0],
            forward: [normal[0], normal[1], normal[2], 0.0],
            x_dir: [x_dir[0], x_dir[1], x_dir[2], 0.0],
            num_events_per_axis: plan.num_events_per_axis,
            num_plane_chunks: resources.num_plane_chunks,
            num_planes: resources.num_triangles,
            _pad: 0,
        };
        queue.write_buffer(&self.ray_params, 0, bytemuck::bytes_of(&params));

        let groups_per_axis = plan.num_events_per_axis / 8;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("prt_visibility_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("prt_prepass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.prepass);
            pass.set_bind_group(0, &self.prepass_bind_group, &[]);
            pass.dispatch_workgroups(resources.num_plane_chunks, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("prt_raytrace"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.raytrace);
            pass.set_bind_group(0, &self.raytrace_bind_group, &[]);
            pass.dispatch_workgroups(groups_per_axis, groups_per_axis, 1);
        }
        queue.submit(Some(encoder.finish()));
        // The visibility buffer must be fully written before the integrate
        // pass is issued against it.
        let _ = device.poll(wgpu::Maintain::Wait);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("prt_integrate_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("prt_integrate"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.integrate);
            pass.set_bind_group(0, &self.integrate_bind_group, &[]);
            for bind_group in &self.coeff_bind_groups {
                pass.set_bind_group(1, bind_group, &[]);
                pass.dispatch_workgroups(groups_per_axis, groups_per_axis, 1);
            }
        }
        encoder.copy_buffer_to_buffer(
            &resources.result,
            0,
            &resources.readback,
            0,
            resources.result.size(),
        );
        queue.submit(Some(encoder.finish()));
        let _ = device.poll(wgpu::Maintain::Wait);

        read_back_f32(device, &resources.readback)
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    name: &'static str,
    source: &'static str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(name),
        bind_group_layouts,
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(name),
        layout: Some(&layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Tangent of the ray frame: `(-n.y, n.x, 0)` normalized, with a fixed
/// fallback axis when the normal points along z and the cross-plane
/// projection vanishes.
fn tangent_for(normal: [f32; 3]) -> [f32; 3] {
    let len = (normal[1] * normal[1] + normal[0] * normal[0]).sqrt();
    if len > 1e-6 {
        [-normal[1] / len, normal[0] / len, 0.0]
    } else {
        [1.0, 0.0, 0.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tangent_is_orthogonal_to_normal() {
        for n in [[0.0f32, 1.0, 0.0], [0.6, -0.8, 0.0], [0.3, 0.4, 0.866]] {
            let t = tangent_for(n);
            let dot = n[0] * t[0] + n[1] * t[1] + n[2] * t[2];
            assert!(dot.abs() < 1e-6);
            let len = (t[0] * t[0] + t[1] * t[1] + t[2] * t[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn tangent_falls_back_for_z_normals() {
        assert_eq!(tangent_for([0.0, 0.0, 1.0]), [1.0, 0.0, 0.0]);
        assert_eq!(tangent_for([0.0, 0.0, -1.0]), [1.0, 0.0, 0.0]);
    }
}
