use std::{env, time::Instant};

use indicatif::{ProgressBar, ProgressStyle};
use phase_stepping::{
    Acquisition, Builder, Channel, ReductorBuilder, ScanSimulatorBuilder, SinogramGenerator,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let reductor = match env::var("REDUCTOR_TOML") {
        Ok(path) => ReductorBuilder::load(path)?,
        Err(_) => ReductorBuilder::default().total_periods(18),
    };
    let simulator = match env::var("SIMULATOR_TOML") {
        Ok(path) => ScanSimulatorBuilder::load(path)?,
        Err(_) => ScanSimulatorBuilder::default()
            .noise(5., 0)
            .sample(Default::default()),
    };
    let n_projections = reductor.total_periods;

    let mut acquisition = Acquisition::new(simulator.build()?, reductor.build()?)?;
    log::info!("{}", acquisition.reductor());

    let pb = ProgressBar::new(acquisition.n_frame() as u64);
    pb.set_style(ProgressStyle::with_template(
        "{msg} [{eta_precise}] {bar:50.cyan/blue} {pos:>7}/{len:7}",
    )?);
    pb.set_message("Phase stepping");
    let now = Instant::now();
    let images = acquisition.run(Some(pb))?;
    log::info!("{} projections reduced in {:?}", images.len(), now.elapsed());

    if let Some(image) = images.last() {
        println!("{image}");
    }

    let mut sino = SinogramGenerator::new(n_projections);
    for image in images {
        sino.push(image)?;
    }
    if let Some(sinograms) = sino.sinograms(Channel::Dpc) {
        for (y, sinogram) in sinograms.iter().enumerate().step_by(16) {
            log::info!(
                "DPC sinogram of row #{y}: [{:+.3},{:+.3}]",
                sinogram.min(),
                sinogram.max()
            );
        }
    }

    Ok(())
}
