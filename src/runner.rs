use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use derive_new::new;
use log::{error, info, trace, warn};

use crate::sequencer::{Phase, PipettingSequencer};

/// Fixed-cadence host loop around the sequencer's `poll()`. The sequencer
/// never sleeps internally; all pacing lives here.
#[derive(new)]
pub struct SequencerRunner {
    sequencer: PipettingSequencer,
    tick_interval: Duration,
    stop: Arc<AtomicBool>,
}

impl SequencerRunner {
    /// Drive the cycle until it completes, the tips run out, or the stop
    /// flag is raised. Returns the sequencer so the caller can read the
    /// final occupancy.
    pub fn run(mut self) -> anyhow::Result<PipettingSequencer> {
        self.sequencer.start_pipetting()?;
        loop {
            if self.stop.load(Ordering::Relaxed) {
                warn!("stop requested, halting motion");
                self.sequencer.emergency_stop()?;
                break;
            }
            self.sequencer.poll()?;
            match self.sequencer.phase() {
                Phase::Completed => {
                    info!("pipetting cycle complete");
                    break;
                }
                Phase::TipsExhausted => {
                    error!("stopping: tip rack exhausted before all probes were dispensed");
                    break;
                }
                _ => trace!("<tick>"),
            }
            thread::sleep(self.tick_interval);
        }
        Ok(self.sequencer)
    }
}
