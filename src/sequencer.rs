//! The pipetting sequencer: a cooperative state machine driven by an external
//! poll loop. Each `poll()` performs at most one micro-action (issue a move,
//! check a confirmation) and returns immediately; a sub-step only advances
//! once its physical effect has been confirmed, never on command issuance.
//! Commands are idempotent and re-issued every tick, so transient controller
//! lag heals itself on the next poll.

use std::fmt;

use anyhow::Context;
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::bed::{Bed, Point, SlotKey};
use crate::end_effector::{EndEffector, PressKind};
use crate::motion::{Motion, POSITION_TOLERANCE_MM};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TipApproachStep {
    /// Lift straight up at the X/Y where the previous phase left the head.
    RaiseToSafe { anchor: Point },
    TravelToTip,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TipChangeStep {
    LowerToEngage,
    RaiseToSafe,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefillStep {
    Settle,
    PressPlunger,
    LowerToTank,
    ReleasePlunger,
    SettleBeforeRaise,
    RaiseToSafe,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispenseStep {
    Settle,
    LowerToProbe,
    PressPlunger,
    SettleBeforeRaise,
    RaiseToSafe,
    ReleasePlunger,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TipDropStep {
    LowerToRelease,
    RaiseToSafe,
}

/// Macro-phase of the cycle, carrying its typed sub-step where one exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Idle,
    MovingToNextTip(TipApproachStep),
    ChangingTip(TipChangeStep),
    MovingToRefill,
    Refilling(RefillStep),
    MovingToNextProbe,
    Dispensing(DispenseStep),
    MovingToDisposal,
    DisposingTip(TipDropStep),
    Completed,
    /// Tips ran out while probes remain. Terminal until the operator
    /// intervenes and calls `reset()`.
    TipsExhausted,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::MovingToNextTip(_) => "MovingToNextTip",
            Phase::ChangingTip(_) => "ChangingTip",
            Phase::MovingToRefill => "MovingToRefill",
            Phase::Refilling(_) => "Refilling",
            Phase::MovingToNextProbe => "MovingToNextProbe",
            Phase::Dispensing(_) => "Dispensing",
            Phase::MovingToDisposal => "MovingToDisposal",
            Phase::DisposingTip(_) => "DisposingTip",
            Phase::Completed => "Completed",
            Phase::TipsExhausted => "TipsExhausted",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SequencerError {
    #[error("cycle can only be started from Idle (currently {0})")]
    NotIdle(&'static str),
    #[error("{0} grid is not configured")]
    NotConfigured(&'static str),
}

pub struct PipettingSequencer {
    motion: Box<dyn Motion>,
    tool: EndEffector,
    bed: Bed,
    phase: Phase,
    current_probe: Option<SlotKey>,
    current_tip: Option<SlotKey>,
}

impl PipettingSequencer {
    pub fn new(motion: Box<dyn Motion>, tool: EndEffector, bed: Bed) -> Self {
        Self {
            motion,
            tool,
            bed,
            phase: Phase::Idle,
            current_probe: None,
            current_tip: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn bed(&self) -> &Bed {
        &self.bed
    }

    /// Reconfiguration and explicit occupancy resets happen through here,
    /// from the control surface only.
    pub fn bed_mut(&mut self) -> &mut Bed {
        &mut self.bed
    }

    pub fn tool(&self) -> &EndEffector {
        &self.tool
    }

    pub fn current_probe(&self) -> Option<SlotKey> {
        self.current_probe
    }

    pub fn current_tip(&self) -> Option<SlotKey> {
        self.current_tip
    }

    pub fn start_pipetting(&mut self) -> Result<(), SequencerError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(SequencerError::NotIdle(self.phase.name()));
        }
        if !self.bed.probes.is_configured() {
            return Err(SequencerError::NotConfigured("probe"));
        }
        if !self.bed.tips.is_configured() {
            return Err(SequencerError::NotConfigured("tip"));
        }
        self.current_probe = None;
        self.current_tip = None;
        info!(
            "starting cycle: {} probes, {} tips",
            self.bed.probes.active_count(),
            self.bed.tips.active_count()
        );
        self.enter_tip_approach();
        Ok(())
    }

    /// Force the machine back to Idle, abandoning the in-flight phase.
    /// Physical side effects already confirmed (occupancy, a pressed plunger)
    /// are not rolled back.
    pub fn reset(&mut self) {
        info!("reset from {}", self.phase.name());
        self.phase = Phase::Idle;
        self.current_probe = None;
        self.current_tip = None;
    }

    /// Halt motion immediately. The phase is left as-is; recovery is the
    /// operator's call (`reset()` or hardware intervention).
    pub fn emergency_stop(&mut self) -> anyhow::Result<()> {
        warn!("emergency stop");
        self.motion.emergency_stop()
    }

    /// One tick of the cycle. Returns `true` exactly on the call that
    /// completes a phase transition, `false` while mid-phase or idle.
    pub fn poll(&mut self) -> anyhow::Result<bool> {
        match self.phase {
            Phase::Idle | Phase::Completed | Phase::TipsExhausted => Ok(false),
            Phase::MovingToNextTip(step) => self.poll_moving_to_next_tip(step),
            Phase::ChangingTip(step) => self.poll_changing_tip(step),
            Phase::MovingToRefill => self.poll_moving_to_refill(),
            Phase::Refilling(step) => self.poll_refilling(step),
            Phase::MovingToNextProbe => self.poll_moving_to_next_probe(),
            Phase::Dispensing(step) => self.poll_dispensing(step),
            Phase::MovingToDisposal => self.poll_moving_to_disposal(),
            Phase::DisposingTip(step) => self.poll_disposing_tip(step),
        }
    }

    fn set_phase(&mut self, next: Phase) {
        if next.name() != self.phase.name() {
            info!("phase {} -> {}", self.phase.name(), next.name());
        } else {
            debug!("{}: {:?}", next.name(), next);
        }
        self.phase = next;
    }

    /// Issue the move (idempotent) and check arrival. One command, one query.
    fn travel_step(&mut self, target: Point, z: f64) -> anyhow::Result<bool> {
        self.motion.move_to(target.x, target.y, z)?;
        self.motion.is_at(target.x, target.y, z, POSITION_TOLERANCE_MM)
    }

    /// Entry gate for another tip loop. A finished job is detected here so a
    /// completed run does not burn one more tip, and an empty tip rack is
    /// surfaced instead of crashing on a missing slot lookup.
    fn enter_tip_approach(&mut self) {
        if self.bed.probes.next_unfilled().is_none() {
            info!("all probes dispensed");
            self.set_phase(Phase::Completed);
            return;
        }
        if self.bed.tips.next_unfilled().is_none() {
            error!("tip rack exhausted with probes remaining; operator attention required");
            self.set_phase(Phase::TipsExhausted);
            return;
        }
        let pos = self.motion.position();
        self.set_phase(Phase::MovingToNextTip(TipApproachStep::RaiseToSafe {
            anchor: Point::new(pos.x, pos.y),
        }));
    }

    fn poll_moving_to_next_tip(&mut self, step: TipApproachStep) -> anyhow::Result<bool> {
        match step {
            TipApproachStep::RaiseToSafe { anchor } => {
                if self.travel_step(anchor, self.bed.layout.safe_z)? {
                    self.set_phase(Phase::MovingToNextTip(TipApproachStep::TravelToTip));
                }
                Ok(false)
            }
            TipApproachStep::TravelToTip => {
                let tip = match self.bed.tips.next_unfilled() {
                    Some(key) => key,
                    // Guarded at phase entry; only external meddling with the
                    // rack mid-phase can land here.
                    None => {
                        self.set_phase(Phase::TipsExhausted);
                        return Ok(true);
                    }
                };
                self.current_tip = Some(tip);
                let target = self.bed.tips.slot_coordinates(tip.0, tip.1)?;
                if self.travel_step(target, self.bed.layout.safe_z)? {
                    self.set_phase(Phase::ChangingTip(TipChangeStep::LowerToEngage));
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    fn poll_changing_tip(&mut self, step: TipChangeStep) -> anyhow::Result<bool> {
        let tip = self.current_tip.context("no tip selected")?;
        let target = self.bed.tips.slot_coordinates(tip.0, tip.1)?;
        match step {
            TipChangeStep::LowerToEngage => {
                if self.travel_step(target, self.bed.layout.change_tip_z)? {
                    self.set_phase(Phase::ChangingTip(TipChangeStep::RaiseToSafe));
                }
                Ok(false)
            }
            TipChangeStep::RaiseToSafe => {
                if self.travel_step(target, self.bed.layout.safe_z)? {
                    self.bed.tips.set_occupied(tip.0, tip.1, true)?;
                    info!("picked up tip {tip:?}");
                    self.set_phase(Phase::MovingToRefill);
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    fn poll_moving_to_refill(&mut self) -> anyhow::Result<bool> {
        let tank = self.bed.layout.refilling_tank;
        if self.travel_step(tank, self.bed.layout.safe_z)? {
            self.set_phase(Phase::Refilling(RefillStep::Settle));
            return Ok(true);
        }
        Ok(false)
    }

    fn poll_refilling(&mut self, step: RefillStep) -> anyhow::Result<bool> {
        let tank = self.bed.layout.refilling_tank;
        match step {
            RefillStep::Settle => {
                self.set_phase(Phase::Refilling(RefillStep::PressPlunger));
                Ok(false)
            }
            RefillStep::PressPlunger => {
                if self.tool.press(PressKind::Full, self.motion.as_mut())? {
                    self.set_phase(Phase::Refilling(RefillStep::LowerToTank));
                }
                Ok(false)
            }
            RefillStep::LowerToTank => {
                if self.travel_step(tank, self.bed.layout.refilling_z)? {
                    self.set_phase(Phase::Refilling(RefillStep::ReleasePlunger));
                }
                Ok(false)
            }
            RefillStep::ReleasePlunger => {
                if self.tool.release(self.motion.as_mut())? {
                    self.set_phase(Phase::Refilling(RefillStep::SettleBeforeRaise));
                }
                Ok(false)
            }
            RefillStep::SettleBeforeRaise => {
                self.set_phase(Phase::Refilling(RefillStep::RaiseToSafe));
                Ok(false)
            }
            RefillStep::RaiseToSafe => {
                if self.travel_step(tank, self.bed.layout.safe_z)? {
                    self.set_phase(Phase::MovingToNextProbe);
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    fn poll_moving_to_next_probe(&mut self) -> anyhow::Result<bool> {
        let probe = match self.bed.probes.next_unfilled() {
            Some(key) => key,
            None => {
                info!("all probes dispensed");
                self.set_phase(Phase::Completed);
                return Ok(true);
            }
        };
        self.current_probe = Some(probe);
        let target = self.bed.probes.slot_coordinates(probe.0, probe.1)?;
        if self.travel_step(target, self.bed.layout.safe_z)? {
            self.set_phase(Phase::Dispensing(DispenseStep::Settle));
            return Ok(true);
        }
        Ok(false)
    }

    fn poll_dispensing(&mut self, step: DispenseStep) -> anyhow::Result<bool> {
        let probe = self.current_probe.context("no probe selected")?;
        let target = self.bed.probes.slot_coordinates(probe.0, probe.1)?;
        match step {
            DispenseStep::Settle => {
                self.set_phase(Phase::Dispensing(DispenseStep::LowerToProbe));
                Ok(false)
            }
            DispenseStep::LowerToProbe => {
                if self.travel_step(target, self.bed.layout.dispensing_z)? {
                    self.set_phase(Phase::Dispensing(DispenseStep::PressPlunger));
                }
                Ok(false)
            }
            DispenseStep::PressPlunger => {
                if self.tool.press(PressKind::Full, self.motion.as_mut())? {
                    // The dispense side effect, exactly once, synchronized
                    // with the confirmed press.
                    self.bed.probes.set_occupied(probe.0, probe.1, true)?;
                    info!("dispensed into probe {probe:?}");
                    self.set_phase(Phase::Dispensing(DispenseStep::SettleBeforeRaise));
                }
                Ok(false)
            }
            DispenseStep::SettleBeforeRaise => {
                self.set_phase(Phase::Dispensing(DispenseStep::RaiseToSafe));
                Ok(false)
            }
            DispenseStep::RaiseToSafe => {
                if self.travel_step(target, self.bed.layout.safe_z)? {
                    self.set_phase(Phase::Dispensing(DispenseStep::ReleasePlunger));
                }
                Ok(false)
            }
            DispenseStep::ReleasePlunger => {
                if self.tool.release(self.motion.as_mut())? {
                    self.set_phase(Phase::MovingToDisposal);
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }

    fn poll_moving_to_disposal(&mut self) -> anyhow::Result<bool> {
        let tank = self.bed.layout.disposal_tank;
        if self.travel_step(tank, self.bed.layout.safe_z)? {
            self.set_phase(Phase::DisposingTip(TipDropStep::LowerToRelease));
            return Ok(true);
        }
        Ok(false)
    }

    fn poll_disposing_tip(&mut self, step: TipDropStep) -> anyhow::Result<bool> {
        let tank = self.bed.layout.disposal_tank;
        match step {
            TipDropStep::LowerToRelease => {
                if self.travel_step(tank, self.bed.layout.drop_tip_z)? {
                    self.set_phase(Phase::DisposingTip(TipDropStep::RaiseToSafe));
                }
                Ok(false)
            }
            TipDropStep::RaiseToSafe => {
                if self.travel_step(tank, self.bed.layout.safe_z)? {
                    // Loop back for the next tip, or finish.
                    self.enter_tip_approach();
                    return Ok(true);
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::bed::{BedLayout, Grid, GridCorners};
    use crate::end_effector::PressDeltas;
    use crate::motion_hal::MachinePosition;

    #[derive(Default)]
    struct FakeMotion {
        confirm_moves: bool,
        confirm_tool: bool,
        position: MachinePosition,
        moves: Vec<(f64, f64, f64)>,
        tool_targets: Vec<f64>,
    }

    /// Shared handle so tests can flip confirmation behavior and inspect the
    /// command log after handing the double to the sequencer.
    #[derive(Clone)]
    struct SharedMotion(Rc<RefCell<FakeMotion>>);

    impl SharedMotion {
        fn new(confirm_moves: bool, confirm_tool: bool) -> Self {
            SharedMotion(Rc::new(RefCell::new(FakeMotion {
                confirm_moves,
                confirm_tool,
                ..Default::default()
            })))
        }

        fn instant() -> Self {
            Self::new(true, true)
        }

        fn stuck() -> Self {
            Self::new(false, false)
        }

        fn moves(&self) -> Vec<(f64, f64, f64)> {
            self.0.borrow().moves.clone()
        }
    }

    impl Motion for SharedMotion {
        fn move_to(&mut self, x: f64, y: f64, z: f64) -> anyhow::Result<()> {
            let mut m = self.0.borrow_mut();
            // Re-issues of the same target are expected every tick; only log
            // actual changes so tests can assert on the sequence.
            if m.moves.last() != Some(&(x, y, z)) {
                m.moves.push((x, y, z));
            }
            if m.confirm_moves {
                m.position.x = x;
                m.position.y = y;
                m.position.z = z;
            }
            Ok(())
        }

        fn is_at(&mut self, x: f64, y: f64, z: f64, tolerance: f64) -> anyhow::Result<bool> {
            let m = self.0.borrow();
            Ok((m.position.x - x).abs() <= tolerance
                && (m.position.y - y).abs() <= tolerance
                && (m.position.z - z).abs() <= tolerance)
        }

        fn position(&self) -> MachinePosition {
            self.0.borrow().position
        }

        fn tool_move_to(&mut self, position: f64) -> anyhow::Result<()> {
            let mut m = self.0.borrow_mut();
            if m.tool_targets.last() != Some(&position) {
                m.tool_targets.push(position);
            }
            if m.confirm_tool {
                m.position.tool = position;
            }
            Ok(())
        }

        fn tool_position(&mut self) -> anyhow::Result<f64> {
            Ok(self.0.borrow().position.tool)
        }

        fn home(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn emergency_stop(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn square_corners(origin: Point, size: f64) -> GridCorners {
        GridCorners {
            top_left: origin,
            top_right: Point::new(origin.x + size, origin.y),
            bottom_left: Point::new(origin.x, origin.y + size),
            bottom_right: Point::new(origin.x + size, origin.y + size),
        }
    }

    fn test_layout() -> BedLayout {
        // Distinct heights so the command log is unambiguous.
        BedLayout { dispensing_z: 12.0, refilling_z: 18.0, ..Default::default() }
    }

    fn test_bed() -> Bed {
        let probes = Grid::build(2, 2, square_corners(Point::new(0.0, 0.0), 10.0), 4).unwrap();
        let tips = Grid::build(2, 2, square_corners(Point::new(50.0, 50.0), 10.0), 4).unwrap();
        Bed::new(probes, tips, test_layout())
    }

    fn sequencer_with(motion: SharedMotion, bed: Bed) -> PipettingSequencer {
        PipettingSequencer::new(
            Box::new(motion),
            EndEffector::new(PressDeltas::default()),
            bed,
        )
    }

    fn poll_until(seq: &mut PipettingSequencer, pred: impl Fn(Phase) -> bool) {
        for _ in 0..2000 {
            if pred(seq.phase()) {
                return;
            }
            seq.poll().unwrap();
        }
        panic!("never reached expected phase, stuck at {:?}", seq.phase());
    }

    #[test]
    fn start_requires_idle() {
        let mut seq = sequencer_with(SharedMotion::instant(), test_bed());
        seq.start_pipetting().unwrap();
        assert_eq!(
            seq.start_pipetting(),
            Err(SequencerError::NotIdle("MovingToNextTip"))
        );
    }

    #[test]
    fn start_requires_configured_grids() {
        let mut bed = test_bed();
        bed.probes = Grid::unconfigured();
        let mut seq = sequencer_with(SharedMotion::instant(), bed);
        assert_eq!(
            seq.start_pipetting(),
            Err(SequencerError::NotConfigured("probe"))
        );
        assert_eq!(seq.phase(), Phase::Idle);
    }

    #[test]
    fn full_cycle_visits_probes_in_row_major_order() {
        let motion = SharedMotion::instant();
        let mut seq = sequencer_with(motion.clone(), test_bed());
        seq.start_pipetting().unwrap();
        poll_until(&mut seq, |p| p == Phase::Completed);

        for key in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            assert_eq!(seq.bed().probes.occupied(key.0, key.1), Ok(true));
            assert_eq!(seq.bed().tips.occupied(key.0, key.1), Ok(true));
        }

        let dispense_visits: Vec<(f64, f64)> = motion
            .moves()
            .iter()
            .filter(|m| m.2 == test_layout().dispensing_z)
            .map(|m| (m.0, m.1))
            .collect();
        assert_eq!(
            dispense_visits,
            vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)]
        );
    }

    #[test]
    fn poll_returns_true_exactly_on_transitions() {
        let mut seq = sequencer_with(SharedMotion::instant(), test_bed());
        seq.start_pipetting().unwrap();

        // MovingToNextTip with an instant double: one poll to confirm the
        // lift sub-step (still mid-phase), one to confirm arrival.
        assert!(!seq.poll().unwrap());
        assert_eq!(seq.phase().name(), "MovingToNextTip");
        assert!(seq.poll().unwrap());
        assert_eq!(seq.phase().name(), "ChangingTip");
    }

    #[test]
    fn stuck_motion_never_advances_or_mutates() {
        let mut seq = sequencer_with(SharedMotion::stuck(), test_bed());
        seq.start_pipetting().unwrap();
        seq.poll().unwrap();
        let held = seq.phase();
        for _ in 0..1000 {
            assert!(!seq.poll().unwrap());
        }
        assert_eq!(seq.phase(), held);
        assert_eq!(seq.bed().probes.next_unfilled(), Some((0, 0)));
        assert_eq!(seq.bed().tips.next_unfilled(), Some((0, 0)));
    }

    #[test]
    fn probe_is_marked_only_on_confirmed_press() {
        let motion = SharedMotion::instant();
        let mut seq = sequencer_with(motion.clone(), test_bed());
        seq.start_pipetting().unwrap();
        poll_until(&mut seq, |p| {
            p == Phase::Dispensing(DispenseStep::PressPlunger)
        });

        // Plunger stops confirming: the step must hold and the slot must
        // stay unmarked, no matter how long we poll.
        motion.0.borrow_mut().confirm_tool = false;
        for _ in 0..200 {
            assert!(!seq.poll().unwrap());
        }
        assert_eq!(seq.phase(), Phase::Dispensing(DispenseStep::PressPlunger));
        assert_eq!(seq.bed().probes.occupied(0, 0), Ok(false));

        motion.0.borrow_mut().confirm_tool = true;
        seq.poll().unwrap();
        assert_eq!(seq.bed().probes.occupied(0, 0), Ok(true));
        assert_eq!(seq.phase(), Phase::Dispensing(DispenseStep::SettleBeforeRaise));
    }

    #[test]
    fn reset_returns_to_idle_without_rollback() {
        // Tip rack larger than the probe grid, so the wasted tip from the
        // abandoned run leaves enough to finish after the restart.
        let probes = Grid::build(2, 2, square_corners(Point::new(0.0, 0.0), 10.0), 4).unwrap();
        let tips = Grid::build(3, 3, square_corners(Point::new(50.0, 50.0), 10.0), 9).unwrap();
        let mut seq = sequencer_with(
            SharedMotion::instant(),
            Bed::new(probes, tips, test_layout()),
        );
        seq.start_pipetting().unwrap();
        // Deep enough into the cycle that the first tip has been picked up.
        poll_until(&mut seq, |p| p == Phase::MovingToNextProbe);
        assert_eq!(seq.bed().tips.occupied(0, 0), Ok(true));

        seq.reset();
        assert_eq!(seq.phase(), Phase::Idle);
        assert_eq!(seq.current_probe(), None);
        assert_eq!(seq.current_tip(), None);
        assert!(!seq.poll().unwrap());
        // Confirmed side effects survive the reset.
        assert_eq!(seq.bed().tips.occupied(0, 0), Ok(true));

        // A fresh start picks up where the occupancy left off.
        seq.start_pipetting().unwrap();
        poll_until(&mut seq, |p| p == Phase::Completed);
        assert_eq!(seq.bed().probes.next_unfilled(), None);
    }

    #[test]
    fn tips_exhausted_mid_cycle_is_a_terminal_alert() {
        let probes = Grid::build(2, 2, square_corners(Point::new(0.0, 0.0), 10.0), 4).unwrap();
        let tips = Grid::build(1, 1, square_corners(Point::new(50.0, 50.0), 0.0), 1).unwrap();
        let mut seq = sequencer_with(
            SharedMotion::instant(),
            Bed::new(probes, tips, test_layout()),
        );
        seq.start_pipetting().unwrap();
        poll_until(&mut seq, |p| p == Phase::TipsExhausted);

        // One probe got its dispense before the rack ran dry.
        assert_eq!(seq.bed().probes.occupied(0, 0), Ok(true));
        assert_eq!(seq.bed().probes.next_unfilled(), Some((0, 1)));
        for _ in 0..50 {
            assert!(!seq.poll().unwrap());
        }
        assert_eq!(seq.phase(), Phase::TipsExhausted);
    }

    #[test]
    fn prefilled_probe_grid_completes_without_moving() {
        let motion = SharedMotion::instant();
        let mut bed = test_bed();
        for key in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            bed.probes.set_occupied(key.0, key.1, true).unwrap();
        }
        let mut seq = sequencer_with(motion.clone(), bed);
        seq.start_pipetting().unwrap();
        assert_eq!(seq.phase(), Phase::Completed);
        // No tip was burned on a finished job.
        assert!(motion.moves().is_empty());
        assert_eq!(seq.bed().tips.next_unfilled(), Some((0, 0)));
    }

    #[test]
    fn polls_after_completion_are_inert() {
        let motion = SharedMotion::instant();
        let mut seq = sequencer_with(motion.clone(), test_bed());
        seq.start_pipetting().unwrap();
        poll_until(&mut seq, |p| p == Phase::Completed);

        let commands_sent = motion.moves().len();
        for _ in 0..50 {
            assert!(!seq.poll().unwrap());
        }
        assert_eq!(seq.phase(), Phase::Completed);
        assert_eq!(motion.moves().len(), commands_sent);
    }
}
