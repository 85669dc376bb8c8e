// THEORY:
// The Auto-Capture State Machine decides, without flicker, when the live stream
// is good enough to take a photo on its own. It has two states:
//
//     Idle --(eligible sample)--> Counting(3) --tick--> Counting(2) --tick--> Counting(1) --tick--> fire, Idle
//       ^                              |                                                            |
//       +------(any gate fails)--------+---------------------------------------------------------+
//
// Key architectural principles:
// 1.  **Explicit Memory**: The two facts that must outlive every sample tick, when
//     the last automatic capture happened and which pose it had, live in a
//     `CaptureMemory` value owned by the session and lent to the machine on every
//     call. Nothing is hidden in globals or closures. The machine only reads it;
//     the session stamps it once a fired capture is actually stored.
// 2.  **Independent Gates**: The "good" gate (score >= 0.78 with zero warnings),
//     the pose-rotation rule, the cooldown, the budget, the enable switch and the
//     surface state are all checked on their own. The score gate and the warning
//     gate overlap, and both are kept.
// 3.  **Re-validation at Zero**: The countdown's last tick re-checks every gate
//     against the newest sample before firing. A countdown started on a good
//     frame never fires on a stale one.
// 4.  **Cancelable Countdown**: Any failed gate, disabling auto-capture, or a
//     manual capture resets the machine to `Idle` without firing.

use std::time::Instant;

use crate::config::AutoCaptureConfig;
use crate::core_modules::face::Pose;
use crate::core_modules::quality::QualitySample;

/// State that must survive across sample ticks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CaptureMemory {
    /// When the last automatic capture fired.
    pub last_auto_capture_at: Option<Instant>,
    /// The pose of the last automatic capture.
    pub last_captured_pose: Option<Pose>,
}

impl CaptureMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an automatic capture.
    pub fn stamp(&mut self, now: Instant, pose: Pose) {
        self.last_auto_capture_at = Some(now);
        self.last_captured_pose = Some(pose);
    }
}

/// Where the countdown currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoCaptureState {
    #[default]
    Idle,
    /// Ticks left before the capture fires.
    Counting(u32),
}

/// Facts about the capture surface that the machine reads but does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateContext {
    /// Whether the camera surface is live.
    pub surface_active: bool,
    /// Number of items already held by the capture session.
    pub captured_count: usize,
}

/// Why a sample cannot start or continue a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    Disabled,
    SurfaceInactive,
    BudgetReached,
    /// Score below the gate, or at least one warning.
    NotGood,
    /// Same pose as the last automatic capture.
    SamePose,
    Cooldown,
}

/// What the caller should do after feeding the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoCaptureAction {
    None,
    /// A countdown began at this many ticks.
    CountdownStarted(u32),
    /// The countdown advanced; this many ticks remain.
    CountdownTick(u32),
    /// A running countdown was cancelled.
    Aborted(Ineligible),
    /// Take the photo now. The caller stamps the memory once the capture is stored.
    Fire(Pose),
}

pub struct AutoCaptureMachine {
    // --- Configuration ---
    config: AutoCaptureConfig,

    // --- Current Status ---
    state: AutoCaptureState,
}

impl AutoCaptureMachine {
    pub fn new(config: AutoCaptureConfig) -> Self {
        Self {
            config,
            state: AutoCaptureState::Idle,
        }
    }

    pub fn state(&self) -> AutoCaptureState {
        self.state
    }

    pub fn is_counting(&self) -> bool {
        matches!(self.state, AutoCaptureState::Counting(_))
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &AutoCaptureConfig {
        &self.config
    }

    /// Turns auto-capture on or off. Disabling cancels a running countdown.
    pub fn set_enabled(&mut self, enabled: bool) -> AutoCaptureAction {
        self.config.enabled = enabled;
        if !enabled && self.is_counting() {
            self.state = AutoCaptureState::Idle;
            return AutoCaptureAction::Aborted(Ineligible::Disabled);
        }
        AutoCaptureAction::None
    }

    /// Cancels a running countdown without firing, e.g. before a manual capture.
    pub fn cancel(&mut self) -> bool {
        let was_counting = self.is_counting();
        self.state = AutoCaptureState::Idle;
        was_counting
    }

    /// Checks every gate against `sample`.
    pub fn eligibility(
        &self,
        sample: &QualitySample,
        memory: &CaptureMemory,
        ctx: GateContext,
        now: Instant,
    ) -> Result<(), Ineligible> {
        if !self.config.enabled {
            return Err(Ineligible::Disabled);
        }
        if !ctx.surface_active {
            return Err(Ineligible::SurfaceInactive);
        }
        if ctx.captured_count >= self.config.budget {
            return Err(Ineligible::BudgetReached);
        }
        if sample.score < self.config.min_score || sample.has_warnings() {
            return Err(Ineligible::NotGood);
        }
        if sample.pose != Pose::Unknown && memory.last_captured_pose == Some(sample.pose) {
            return Err(Ineligible::SamePose);
        }
        if let Some(last) = memory.last_auto_capture_at {
            if now.saturating_duration_since(last) <= self.config.cooldown {
                return Err(Ineligible::Cooldown);
            }
        }
        Ok(())
    }

    /// Feeds a new quality sample. Starts a countdown from `Idle` when every gate
    /// passes, and aborts a running one as soon as any gate fails.
    pub fn on_sample(
        &mut self,
        sample: &QualitySample,
        memory: &CaptureMemory,
        ctx: GateContext,
        now: Instant,
    ) -> AutoCaptureAction {
        let verdict = self.eligibility(sample, memory, ctx, now);
        match (self.state, verdict) {
            (AutoCaptureState::Idle, Ok(())) if self.config.countdown_ticks > 0 => {
                self.state = AutoCaptureState::Counting(self.config.countdown_ticks);
                AutoCaptureAction::CountdownStarted(self.config.countdown_ticks)
            }
            (AutoCaptureState::Counting(_), Err(reason)) => {
                self.state = AutoCaptureState::Idle;
                AutoCaptureAction::Aborted(reason)
            }
            _ => AutoCaptureAction::None,
        }
    }

    /// Advances the countdown by one tick using the newest sample. On the tick
    /// that reaches zero every gate is checked again before firing.
    pub fn on_countdown_tick(
        &mut self,
        latest: &QualitySample,
        memory: &CaptureMemory,
        ctx: GateContext,
        now: Instant,
    ) -> AutoCaptureAction {
        let AutoCaptureState::Counting(remaining) = self.state else {
            return AutoCaptureAction::None;
        };

        if let Err(reason) = self.eligibility(latest, memory, ctx, now) {
            self.state = AutoCaptureState::Idle;
            return AutoCaptureAction::Aborted(reason);
        }

        let remaining = remaining.saturating_sub(1);
        if remaining > 0 {
            self.state = AutoCaptureState::Counting(remaining);
            return AutoCaptureAction::CountdownTick(remaining);
        }

        self.state = AutoCaptureState::Idle;
        AutoCaptureAction::Fire(latest.pose)
    }
}
