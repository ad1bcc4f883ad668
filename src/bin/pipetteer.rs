//! Run a full pipetting cycle from the command line:
//!
//! 1. Pick up a fresh tip from the tip grid
//! 2. Refill from the tank
//! 3. Dispense into the next probe
//! 4. Drop the tip in the disposal tank, repeat
//!
//! With no controller on the serial port (or with --fake-hw) this drives a
//! mock HAL, which is handy for dry-running a bed configuration.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use pipetteer::config::PipetteerConfig;
use pipetteer::end_effector::EndEffector;
use pipetteer::motion::{Motion, MotionController};
use pipetteer::motion_hal_factory::MotionHalFactory;
use pipetteer::runner::SequencerRunner;
use pipetteer::sequencer::PipettingSequencer;

#[derive(Parser, Debug)]
#[clap(name = "pipetteer")]
struct Opts {
    /// JSON bed/geometry configuration; defaults apply when omitted.
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(long)]
    fake_hw: bool,

    /// Serial port override.
    #[clap(long)]
    port: Option<String>,

    #[clap(long, default_value = "100")]
    tick_ms: u64,

    /// Home all axes before starting the cycle.
    #[clap(long)]
    home_first: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts: Opts = Opts::parse();

    let config = match &opts.config {
        Some(path) => PipetteerConfig::load(path)?,
        None => PipetteerConfig::default(),
    };
    let port = opts.port.clone().unwrap_or_else(|| config.serial_port.clone());

    let hal = MotionHalFactory::new_maybe_mock(opts.fake_hw, port, config.baud_rate).create_hal()?;
    let mut motion = MotionController::new(hal, config.travel);
    if opts.home_first {
        motion.home()?;
    }

    let mut tool = EndEffector::new(config.press_deltas);
    tool.calibrate_neutral(&mut motion)?;

    let sequencer = PipettingSequencer::new(Box::new(motion), tool, config.build_bed()?);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    ctrlc::set_handler(move || stop_flag.store(true, Ordering::Relaxed))?;

    let runner = SequencerRunner::new(sequencer, Duration::from_millis(opts.tick_ms), stop);
    let sequencer = runner.run()?;

    let probes = &sequencer.bed().probes;
    let filled = probes.slots().filter(|(_, slot)| slot.occupied).count();
    println!("{filled} of {} probes dispensed", probes.active_count());
    Ok(())
}
