//! GPU resource plans and their materialization.
//!
//! The plan types are plain data: every buffer and texture a generation call
//! needs, with sizes derived from the integration plan. The `create`
//! constructors turn a plan into labeled wgpu objects and perform the one-time
//! uploads (seeds, basis grids, radiance pixels, mesh data), after which the
//! host copies are dropped. A resource set is owned exclusively by one
//! generation call; the per-vertex passes reuse its buffers in strict
//! sequence and nothing else may touch them until readback completes.

use wgpu::util::DeviceExt;

use crate::plan::IntegrationPlan;

/// Triangles per candidate-list chunk; one prepass workgroup compacts one
/// chunk.
pub const CANDIDATE_CHUNK: u32 = 512;

#[derive(Clone, Copy, Debug)]
pub struct BufferSpec {
    pub label: &'static str,
    /// Element count.
    pub len: u64,
    /// Bytes per element.
    pub stride: u64,
    pub usage: wgpu::BufferUsages,
}

impl BufferSpec {
    pub fn size(&self) -> u64 {
        self.len * self.stride
    }

    fn create(&self, device: &wgpu::Device) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label),
            size: self.size(),
            usage: self.usage,
            mapped_at_creation: false,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TextureSpec {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl TextureSpec {
    fn create(&self, device: &wgpu::Device) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(self.label),
            size: wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    fn create_with_data(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bytes_per_pixel: u32,
        data: &[u8],
    ) -> wgpu::Texture {
        let texture = self.create(device);
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.width * bytes_per_pixel),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        texture
    }
}

/// Buffer/texture contract for one environment-map integration.
#[derive(Clone, Debug)]
pub struct EmResourcePlan {
    pub seeds: BufferSpec,
    pub result: BufferSpec,
    pub readback: BufferSpec,
    pub radiance: TextureSpec,
    pub basis: TextureSpec,
}

impl EmResourcePlan {
    pub fn new(plan: &IntegrationPlan, width: u32, height: u32) -> Self {
        let partials = plan.n_coefficients as u64 * plan.num_thread_groups as u64 * 3;
        Self {
            seeds: BufferSpec {
                label: "em_seeds",
                len: plan.num_events_rounded as u64 * 8,
                stride: 4,
                usage: wgpu::BufferUsages::STORAGE,
            },
            result: BufferSpec {
                label: "em_result",
                len: partials,
                stride: 4,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            },
            readback: BufferSpec {
                label: "em_readback",
                len: partials,
                stride: 4,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            },
            // wgpu has no 3-channel float format; RGB pixels are padded to
            // RGBA on upload.
            radiance: TextureSpec {
                label: "em_radiance",
                width,
                height,
                format: wgpu::TextureFormat::Rgba32Float,
            },
            basis: TextureSpec {
                label: "sh_basis",
                width: plan.sh_grid_rounded,
                height: plan.sh_grid_rounded,
                format: wgpu::TextureFormat::R32Float,
            },
        }
    }
}

/// Buffer/texture contract for one per-vertex transfer integration.
#[derive(Clone, Debug)]
pub struct PrtResourcePlan {
    pub seeds: BufferSpec,
    pub positions: BufferSpec,
    pub indices: BufferSpec,
    /// Per-chunk count headers followed by `CANDIDATE_CHUNK` index slots per
    /// chunk.
    pub candidates: BufferSpec,
    pub visibility: BufferSpec,
    pub result: BufferSpec,
    pub readback: BufferSpec,
    pub basis: TextureSpec,
    pub num_plane_chunks: u32,
}

impl PrtResourcePlan {
    pub fn new(plan: &IntegrationPlan, vertex_count: u32, triangle_count: u32) -> Self {
        let num_plane_chunks = triangle_count / CANDIDATE_CHUNK + 1;
        let partials = plan.n_coefficients as u64 * plan.num_thread_groups as u64;
        Self {
            seeds: BufferSpec {
                label: "prt_seeds",
                len: plan.num_events_rounded as u64 * 8,
                stride: 4,
                usage: wgpu::BufferUsages::STORAGE,
            },
            positions: BufferSpec {
                label: "prt_positions",
                len: vertex_count as u64 * 3,
                stride: 4,
                usage: wgpu::BufferUsages::STORAGE,
            },
            indices: BufferSpec {
                label: "prt_indices",
                len: triangle_count as u64 * 3,
                stride: 4,
                usage: wgpu::BufferUsages::STORAGE,
            },
            candidates: BufferSpec {
                label: "prt_candidates",
                len: num_plane_chunks as u64 * (CANDIDATE_CHUNK as u64 + 1),
                stride: 4,
                usage: wgpu::BufferUsages::STORAGE,
            },
            visibility: BufferSpec {
                label: "prt_visibility",
                len: plan.num_events_rounded as u64,
                stride: 4,
                usage: wgpu::BufferUsages::STORAGE,
            },
            result: BufferSpec {
                label: "prt_result",
                len: partials,
                stride: 4,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            },
            readback: BufferSpec {
                label: "prt_readback",
                len: partials,
                stride: 4,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            },
            basis: TextureSpec {
                label: "sh_basis",
                width: plan.sh_grid_rounded,
                height: plan.sh_grid_rounded,
                format: wgpu::TextureFormat::R32Float,
            },
            num_plane_chunks,
        }
    }
}

/// Materialized GPU objects for environment-map integration.
pub struct EmResources {
    pub seeds: wgpu::Buffer,
    pub result: wgpu::Buffer,
    pub readback: wgpu::Buffer,
    pub radiance: wgpu::Texture,
    pub basis: Vec<wgpu::Texture>,
}

impl EmResources {
    pub fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        spec: &EmResourcePlan,
        pixels_rgb: &[f32],
        seeds: Vec<u32>,
        grids: Vec<Vec<f32>>,
    ) -> Result<Self, String> {
        let expected = spec.radiance.width as usize * spec.radiance.height as usize * 3;
        if pixels_rgb.len() != expected {
            return Err(format!(
                "radiance image is {} floats, expected {}",
                pixels_rgb.len(),
                expected
            ));
        }

        let seeds_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(spec.seeds.label),
            contents: bytemuck::cast_slice(&seeds),
            usage: spec.seeds.usage,
        });
        drop(seeds);

        let mut rgba = Vec::with_capacity(pixels_rgb.len() / 3 * 4);
        for px in pixels_rgb.chunks_exact(3) {
            rgba.extend_from_slice(px);
            rgba.push(1.0);
        }
        let radiance =
            spec.radiance
                .create_with_data(device, queue, 16, bytemuck::cast_slice(&rgba));
        drop(rgba);

        let basis = upload_basis_grids(device, queue, &spec.basis, grids);

        Ok(Self {
            seeds: seeds_buf,
            result: spec.result.create(device),
            readback: spec.readback.create(device),
            radiance,
            basis,
        })
    }
}

/// Materialized GPU objects for per-vertex transfer integration.
pub struct PrtResources {
    pub seeds: wgpu::Buffer,
    pub positions: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub candidates: wgpu::Buffer,
    pub visibility: wgpu::Buffer,
    pub result: wgpu::Buffer,
    pub readback: wgpu::Buffer,
    pub basis: Vec<wgpu::Texture>,
    pub num_plane_chunks: u32,
    pub num_triangles: u32,
}

impl PrtResources {
    pub fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        spec: &PrtResourcePlan,
        positions: &[f32],
        indices: &[u32],
        seeds: Vec<u32>,
        grids: Vec<Vec<f32>>,
    ) -> Result<Self, String> {
        if positions.len() as u64 != spec.positions.len {
            return Err(format!(
                "position data is {} floats, expected {}",
                positions.len(),
                spec.positions.len
            ));
        }
        if indices.len() as u64 != spec.indices.len {
            return Err(format!(
                "index data is {} values, expected {}",
                indices.len(),
                spec.indices.len
            ));
        }

        let seeds_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(spec.seeds.label),
            contents: bytemuck::cast_slice(&seeds),
            usage: spec.seeds.usage,
        });
        drop(seeds);

        let positions_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(spec.positions.label),
            contents: bytemuck::cast_slice(positions),
            usage: spec.positions.usage,
        });
        let indices_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(spec.indices.label),
            contents: bytemuck::cast_slice(indices),
            usage: spec.indices.usage,
        });

        let basis = upload_basis_grids(device, queue, &spec.basis, grids);

        Ok(Self {
            seeds: seeds_buf,
            positions: positions_buf,
            indices: indices_buf,
            candidates: spec.candidates.create(device),
            visibility: spec.visibility.create(device),
            result: spec.result.create(device),
            readback: spec.readback.create(device),
            basis,
            num_plane_chunks: spec.num_plane_chunks,
            num_triangles: (indices.len() / 3) as u32,
        })
    }
}

fn upload_basis_grids(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    spec: &TextureSpec,
    grids: Vec<Vec<f32>>,
) -> Vec<wgpu::Texture> {
    grids
        .into_iter()
        .map(|grid| spec.create_with_data(device, queue, 4, bytemuck::cast_slice(&grid)))
        .collect()
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CoeffParams {
    i_coefficient: u32,
    _pad: [u32; 3],
}

/// One bind group per basis function: its index as a uniform plus its grid
/// texture. The index must be a per-dispatch uniform rather than one buffer
/// rewritten inside the recording loop: queued writes land at submit, so a
/// single uniform would alias every dispatch to the final value.
pub(crate) fn coeff_bind_groups(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    basis: &[wgpu::Texture],
    label: &'static str,
) -> Vec<wgpu::BindGroup> {
    basis
        .iter()
        .enumerate()
        .map(|(i, texture)| {
            let params = CoeffParams {
                i_coefficient: i as u32,
                _pad: [0; 3],
            };
            let buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("coeff_params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(
                            &texture.create_view(&Default::default()),
                        ),
                    },
                ],
            })
        })
        .collect()
}

pub(crate) fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn uniform_entry(binding: u32, min_size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: std::num::NonZeroU64::new(min_size),
        },
        count: None,
    }
}

pub(crate) fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Block until `buffer` (MAP_READ) is mappable, then copy its contents out.
/// This is the only suspension point in the pipeline besides the explicit
/// submit-and-wait fences.
pub fn read_back_f32(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<Vec<f32>, String> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        tx.send(res).ok();
    });
    let _ = device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|_| "readback channel closed before map completed".to_string())?
        .map_err(|e| format!("readback map failed: {:?}", e))?;

    let data = slice.get_mapped_range();
    let out: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    buffer.unmap();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::compute_plan;

    #[test]
    fn em_plan_sizes() {
        let plan = compute_plan(2, 256, 10);
        let spec = EmResourcePlan::new(&plan, 32, 16);
        assert_eq!(spec.seeds.size(), 256 * 8 * 4);
        // 9 coefficients * 4 groups * rgb.
        assert_eq!(spec.result.len, 9 * 4 * 3);
        assert_eq!(spec.readback.len, spec.result.len);
        assert_eq!(spec.basis.width, 16);
        assert_eq!(spec.radiance.width, 32);
    }

    #[test]
    fn prt_plan_sizes() {
        let plan = compute_plan(1, 64, 8);
        let spec = PrtResourcePlan::new(&plan, 12, 20);
        // 20 triangles still occupy a single 512-slot chunk plus its header.
        assert_eq!(spec.num_plane_chunks, 1);
        assert_eq!(spec.candidates.len, 1 + 512);
        assert_eq!(spec.visibility.len, 64);
        assert_eq!(spec.result.len, 4);
        assert_eq!(spec.positions.len, 36);
        assert_eq!(spec.indices.len, 60);

        let spec = PrtResourcePlan::new(&plan, 4, 512);
        assert_eq!(spec.num_plane_chunks, 2);
        assert_eq!(spec.candidates.len, 2 * (1 + 512));
    }
}
