use std::path::Path;

use litr_muxers::{OutputFormat, config, pcm};

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_mux", log::LevelFilter::Debug)
        .filter_module("litr_muxers", log::LevelFilter::Debug)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    ffmpeg_mux::init()?;

    let mut args = std::env::args().skip(1);
    let (input, output) = match (args.next(), args.next()) {
        (Some(input), Some(output)) => (input, output),
        _ => anyhow::bail!("usage: litr-mux <input.pcm> <output> [format]"),
    };
    let format = match args.next() {
        Some(name) => name.parse::<OutputFormat>()?,
        None => OutputFormat::guess_from_path(Path::new(&output))
            .ok_or_else(|| anyhow::anyhow!("cannot guess container format for {}", output))?,
    };

    let layout = config::config().pcm_layout();
    let data = std::fs::read(&input)?;
    log::info!(
        "muxing {} ({} bytes, {:?}) into {} as {}",
        input,
        data.len(),
        layout,
        output,
        format
    );
    let packets = pcm::mux_pcm(&data, &output, format, layout)?;
    println!("{}: {} packets", output, packets);
    Ok(())
}
