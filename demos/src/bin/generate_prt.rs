//! Compute per-vertex transfer coefficients for an OBJ mesh and write the
//! result as a .prt file. The OBJ must carry vertex normals.
//! Usage: cargo run -p demos --bin generate_prt -- <input.obj> <out.prt> [max_l] [num_events]

use std::path::Path;

fn load_obj_mesh(path: &str) -> prt_gen::MeshData {
    let (models, _) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS).expect("read OBJ");
    let mesh = models.into_iter().next().expect("no mesh in OBJ").mesh;
    if mesh.normals.is_empty() {
        eprintln!("OBJ has no vertex normals; export the mesh with normals");
        std::process::exit(1);
    }
    prt_gen::MeshData {
        positions: mesh.positions,
        normals: mesh.normals,
        indices: mesh.indices,
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: generate_prt <input.obj> <out.prt> [max_l] [num_events]");
        std::process::exit(1);
    }

    let mesh = load_obj_mesh(&args[1]);

    let mut desc = prt_gen::PrtDesc::default();
    if let Some(l) = args.get(3) {
        desc.max_l = l.parse().expect("max_l must be an integer");
    }
    if let Some(n) = args.get(4) {
        desc.num_events = n.parse().expect("num_events must be an integer");
    }

    pollster::block_on(async {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .expect("No adapter");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .expect("No device");

        let started = std::time::Instant::now();
        let coefficients = prt_gen::generate_prt_to_file(
            &device,
            &queue,
            &mesh,
            &desc,
            Path::new(&args[2]),
        )
        .expect("generate_prt");
        println!(
            "generated {} coefficients for {} vertices in {:.1?}",
            coefficients.len(),
            mesh.vertex_count(),
            started.elapsed()
        );
    });
}
