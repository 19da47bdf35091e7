//! Environment-map integration pass.
//!
//! One compute pipeline, dispatched once per basis function into disjoint
//! slices of the partial-sum buffer, then a single copy to the readback
//! buffer and one submit-and-wait round trip.

use crate::plan::IntegrationPlan;
use crate::resources::{
    coeff_bind_groups, read_back_f32, storage_entry, texture_entry, uniform_entry, EmResources,
};

const EM_INTEGRATE_SHADER: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/em_integrate.wgsl"));

pub struct EmPass {
    pipeline: wgpu::ComputePipeline,
    common_layout: wgpu::BindGroupLayout,
    coeff_layout: wgpu::BindGroupLayout,
}

impl EmPass {
    pub fn new(device: &wgpu::Device) -> Result<Self, String> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("em_integrate_shader"),
            source: wgpu::ShaderSource::Wgsl(EM_INTEGRATE_SHADER.into()),
        });

        let common_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("em_common_bind_group_layout"),
            entries: &[
                storage_entry(0, true),
                texture_entry(1),
                storage_entry(2, false),
            ],
        });
        let coeff_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("em_coeff_bind_group_layout"),
            entries: &[uniform_entry(0, 16), texture_entry(1)],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("em_integrate_pipeline_layout"),
            bind_group_layouts: &[&common_layout, &coeff_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("em_integrate_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            pipeline,
            common_layout,
            coeff_layout,
        })
    }

    /// Issue every coefficient dispatch, copy the partial sums to the
    /// readback buffer, submit once and block until the GPU is done, then
    /// return the raw partial sums.
    pub fn run(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        resources: &EmResources,
        plan: &IntegrationPlan,
    ) -> Result<Vec<f32>, String> {
        let common_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("em_common_bind_group"),
            layout: &self.common_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: resources.seeds.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        &resources.radiance.create_view(&Default::default()),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.result.as_entire_binding(),
                },
            ],
        });
        let coeff_bind_groups = coeff_bind_groups(
            device,
            &self.coeff_layout,
            &resources.basis,
            "em_coeff_bind_group",
        );

        let groups_per_axis = plan.num_events_per_axis / 8;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("em_integrate_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("em_integrate_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &common_bind_group, &[]);
            for bind_group in &coeff_bind_groups {
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
