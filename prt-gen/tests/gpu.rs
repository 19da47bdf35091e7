//! Adapter-dependent end-to-end checks. Run with `cargo test -- --ignored`
//! on a machine with a GPU.

use std::f32::consts::PI;

use prt_gen::{generate_em, generate_prt, EmDesc, MeshData, PrtDesc};

const Y00: f32 = 0.282_094_79;

fn gpu() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .ok()
    })
}

#[test]
#[ignore] // needs a GPU adapter
fn uniform_image_projects_onto_the_constant_band() {
    let (device, queue) = gpu().expect("no GPU adapter");

    let (width, height) = (64u32, 32u32);
    let color = [0.8f32, 0.5, 0.2];
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for _ in 0..width * height {
        pixels.extend_from_slice(&color);
    }

    let desc = EmDesc {
        max_l: 2,
        num_events: 65_536,
        sh_grid_num: 64,
        suppress_output: true,
    };
    let coefficients = generate_em(&device, &queue, &pixels, width, height, &desc).unwrap();
    assert_eq!(coefficients.len(), 27);

    // l = 0 reconstructs the constant color: c0 * Y00 == color.
    for ch in 0..3 {
        let reconstructed = coefficients[ch] * Y00;
        assert!(
            (reconstructed - color[ch]).abs() < 0.05,
            "channel {} reconstructed {} from c0 {}",
            ch,
            reconstructed,
            coefficients[ch]
        );
    }
    // Higher bands integrate an odd product over the sphere; Monte Carlo
    // noise only.
    for c in &coefficients[3..] {
        assert!(c.abs() < 0.15, "higher-band coefficient {}", c);
    }
}

#[test]
#[ignore] // needs a GPU adapter
fn unoccluded_quad_matches_the_open_hemisphere_value() {
    let (device, queue) = gpu().expect("no GPU adapter");

    // Flat quad facing +z: nothing above any vertex, every ray escapes.
    let mesh = MeshData {
        positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        indices: vec![0, 1, 2, 0, 2, 3],
    };
    let desc = PrtDesc {
        max_l: 0,
        num_events: 16_384,
        sh_grid_num: 32,
        suppress_output: true,
    };
    let coefficients = generate_prt(&device, &queue, &mesh, &desc).unwrap();
    assert_eq!(coefficients.len(), 4);

    // With every visibility = 1 the estimator is 4 * E[cos] * Y00, and the
    // cosine weight sqrt(1 - u) averages 2/3.
    let expected = 4.0 * (2.0 / 3.0) * Y00;
    for (i, c) in coefficients.iter().enumerate() {
        assert!(
            (c - expected).abs() < 0.05 * expected,
            "vertex {} got {} expected {}",
            i,
            c,
            expected
        );
    }
}

#[test]
#[ignore] // needs a GPU adapter
fn convex_sphere_is_unshadowed() {
    let (device, queue) = gpu().expect("no GPU adapter");

    let mesh = uv_sphere(12, 8);
    let desc = PrtDesc {
        max_l: 0,
        num_events: 16_384,
        sh_grid_num: 32,
        suppress_output: true,
    };
    let coefficients = generate_prt(&device, &queue, &mesh, &desc).unwrap();
    assert_eq!(coefficients.len(), mesh.vertex_count());

    let expected = 4.0 * (2.0 / 3.0) * Y00;
    for (i, c) in coefficients.iter().enumerate() {
        assert!(
            (c - expected).abs() < 0.1 * expected,
            "vertex {} got {} expected {}",
            i,
            c,
            expected
        );
    }
}

fn uv_sphere(segments: u32, rings: u32) -> MeshData {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut indices = Vec::new();
    for r in 0..=rings {
        let theta = PI * r as f32 / rings as f32;
        for s in 0..segments {
            let phi = 2.0 * PI * s as f32 / segments as f32;
            let p = [
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            ];
            positions.extend_from_slice(&p);
            normals.extend_from_slice(&p);
        }
    }
    for r in 0..rings {
        for s in 0..segments {
            let a = r * segments + s;
            let b = r * segments + (s + 1) % segments;
            let c = (r + 1) * segments + s;
            let d = (r + 1) * segments + (s + 1) % segments;
            indices.extend_from_slice(&[a, c, b]);
            indices.extend_from_slice(&[b, c, d]);
        }
    }
    MeshData {
        positions,
        normals,
        indices,
    }
}
