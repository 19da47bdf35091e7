//! Project an equirectangular .hdr environment map onto the SH basis and
//! write the coefficients as a .prt file.
//! Usage: cargo run -p demos --bin generate_em -- <input.hdr> <out.prt> [max_l] [num_events]

use std::path::Path;

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: generate_em <input.hdr> <out.prt> [max_l] [num_events]");
        std::process::exit(1);
    }

    let img = image::open(&args[1]).expect("read input image").to_rgb32f();
    let (width, height) = img.dimensions();
    let pixels = img.into_raw();

    let mut desc = prt_gen::EmDesc::default();
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
        prt_gen::generate_em_to_file(
            &device,
            &queue,
            &pixels,
            width,
            height,
            &desc,
            Path::new(&args[2]),
        )
        .expect("generate_em");
        println!("generated {} in {:.1?}", args[2], started.elapsed());
    });
}
