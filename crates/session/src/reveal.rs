//! Scroll-and-highlight reveal flow for citation targets.
//!
//! Activating a citation has to wait for up to three things before it can
//! scroll: the side panel must be open, the open animation must settle,
//! and the panel's list data must have arrived. `transition` captures that
//! flow as a pure function over `RevealState`; `RevealCoordinator` drives
//! it, owning the settle and highlight timers.
//!
//! Every activation bumps a generation counter and every timer input
//! carries the generation it was armed under, so a superseded timer
//! expires into a no-op instead of clearing the wrong highlight.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Panel settle delay after the open animation
pub const SETTLE_DELAY: std::time::Duration = std::time::Duration::from_millis(300);
/// How long a revealed target stays highlighted
pub const HIGHLIGHT_DURATION: std::time::Duration = std::time::Duration::from_secs(5);

/// Where the reveal flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevealPhase {
    #[default]
    Idle,
    /// Waiting on the panel, its settle delay, or its list data
    Pending { target: i64, settled: bool },
    /// Asked the surface where the target sits in the list
    Locating { target: i64 },
    Highlighted { target: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RevealState {
    pub phase: RevealPhase,
    pub generation: u64,
    pub panel_open: bool,
    pub list_ready: bool,
}

impl RevealState {
    pub fn new(panel_open: bool) -> Self {
        Self {
            panel_open,
            ..Self::default()
        }
    }
}

/// Everything that can advance the reveal flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// A citation for `target` was activated
    Activate { target: i64 },
    PanelOpened,
    PanelClosed,
    /// The panel's list data finished loading
    ListDataReady,
    SettleElapsed { generation: u64 },
    LocateResult {
        generation: u64,
        position: Option<usize>,
    },
    HighlightExpired { generation: u64 },
}

/// What the surface (or the coordinator's timers) must do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    RequestPanelOpen,
    StartSettleTimer { generation: u64 },
    RequestLocate { target: i64, generation: u64 },
    ScrollTo { position: usize },
    SetHighlight { target: i64 },
    StartHighlightTimer { generation: u64 },
    ClearHighlight,
}

/// Advance the reveal flow by one input. Pure: same state and input
/// always produce the same successor and effects.
pub fn transition(state: RevealState, input: Input) -> (RevealState, Vec<Effect>) {
    let mut next = state;
    let mut effects = Vec::new();

    match input {
        Input::Activate { target } => {
            // A new activation supersedes whatever was in flight.
            next.generation += 1;
            if matches!(state.phase, RevealPhase::Highlighted { .. }) {
                effects.push(Effect::ClearHighlight);
            }
            if state.panel_open {
                if let RevealPhase::Pending { settled: false, .. } = state.phase {
                    // The panel is still settling from this flow's own open
                    // request; the new target waits out a fresh settle.
                    next.phase = RevealPhase::Pending {
                        target,
                        settled: false,
                    };
                    effects.push(Effect::StartSettleTimer {
                        generation: next.generation,
                    });
                } else if state.list_ready {
                    next.phase = RevealPhase::Locating { target };
                    effects.push(Effect::RequestLocate {
                        target,
                        generation: next.generation,
                    });
                } else {
                    // Panel open and settled; only the data is missing.
                    next.phase = RevealPhase::Pending {
                        target,
                        settled: true,
                    };
                }
            } else {
                next.phase = RevealPhase::Pending {
                    target,
                    settled: false,
                };
                effects.push(Effect::RequestPanelOpen);
            }
        }
        Input::PanelOpened => {
            next.panel_open = true;
            if let RevealPhase::Pending { settled: false, .. } = state.phase {
                effects.push(Effect::StartSettleTimer {
                    generation: state.generation,
                });
            }
        }
        Input::PanelClosed => {
            next.panel_open = false;
            match state.phase {
                RevealPhase::Highlighted { .. } => {
                    next.phase = RevealPhase::Idle;
                    effects.push(Effect::ClearHighlight);
                }
                RevealPhase::Pending { .. } | RevealPhase::Locating { .. } => {
                    next.phase = RevealPhase::Idle;
                }
                RevealPhase::Idle => {}
            }
        }
        Input::ListDataReady => {
            next.list_ready = true;
            if let RevealPhase::Pending {
                target,
                settled: true,
            } = state.phase
            {
                next.phase = RevealPhase::Locating { target };
                effects.push(Effect::RequestLocate {
                    target,
                    generation: state.generation,
                });
            }
        }
        Input::SettleElapsed { generation } => {
            if generation == state.generation {
                if let RevealPhase::Pending { target, .. } = state.phase {
                    if state.list_ready {
                        next.phase = RevealPhase::Locating { target };
                        effects.push(Effect::RequestLocate {
                            target,
                            generation: state.generation,
                        });
                    } else {
                        next.phase = RevealPhase::Pending {
                            target,
                            settled: true,
                        };
                    }
                }
            }
        }
        Input::LocateResult {
            generation,
            position,
        } => {
            if generation == state.generation {
                if let RevealPhase::Locating { target } = state.phase {
                    match position {
                        Some(position) => {
                            next.phase = RevealPhase::Highlighted { target };
                            effects.push(Effect::ScrollTo { position });
                            effects.push(Effect::SetHighlight { target });
                            effects.push(Effect::StartHighlightTimer {
                                generation: state.generation,
                            });
                        }
                        None => {
                            // Target not in the list; give up quietly.
                            next.phase = RevealPhase::Idle;
                        }
                    }
                }
            }
        }
        Input::HighlightExpired { generation } => {
            if generation == state.generation
                && matches!(state.phase, RevealPhase::Highlighted { .. })
            {
                next.phase = RevealPhase::Idle;
                effects.push(Effect::ClearHighlight);
            }
        }
    }

    (next, effects)
}

/// Handle to a running reveal coordinator (cheap to Clone)
#[derive(Clone)]
pub struct RevealHandle {
    input_tx: mpsc::Sender<Input>,
}

impl RevealHandle {
    pub async fn activate(&self, target: i64) {
        let _ = self.input_tx.send(Input::Activate { target }).await;
    }

    pub async fn panel_opened(&self) {
        let _ = self.input_tx.send(Input::PanelOpened).await;
    }

    pub async fn panel_closed(&self) {
        let _ = self.input_tx.send(Input::PanelClosed).await;
    }

    pub async fn list_ready(&self) {
        let _ = self.input_tx.send(Input::ListDataReady).await;
    }

    /// Answer a `RequestLocate` effect; echo back its generation.
    pub async fn locate_result(&self, generation: u64, position: Option<usize>) {
        let _ = self
            .input_tx
            .send(Input::LocateResult {
                generation,
                position,
            })
            .await;
    }
}

/// Spawn the coordinator. Timer effects are handled internally; all other
/// effects stream out on the returned receiver for the surface to apply.
pub fn spawn(panel_open: bool) -> (RevealHandle, mpsc::Receiver<Effect>, JoinHandle<()>) {
    let (input_tx, input_rx) = mpsc::channel(64);
    let (effect_tx, effect_rx) = mpsc::channel(64);
    let handle = RevealHandle {
        input_tx: input_tx.clone(),
    };
    let task = tokio::spawn(run(RevealState::new(panel_open), input_rx, input_tx, effect_tx));
    (handle, effect_rx, task)
}

async fn run(
    mut state: RevealState,
    mut input_rx: mpsc::Receiver<Input>,
    input_tx: mpsc::Sender<Input>,
    effect_tx: mpsc::Sender<Effect>,
) {
    while let Some(input) = input_rx.recv().await {
        let (next, effects) = transition(state, input);
        debug!(
            component = "reveal",
            event = "reveal.transition",
            input = ?input,
            phase = ?next.phase,
            generation = next.generation,
        );
        state = next;

        for effect in effects {
            match effect {
                Effect::StartSettleTimer { generation } => {
                    let tx = input_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(SETTLE_DELAY).await;
                        let _ = tx.send(Input::SettleElapsed { generation }).await;
                    });
                }
                Effect::StartHighlightTimer { generation } => {
                    let tx = input_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(HIGHLIGHT_DURATION).await;
                        let _ = tx.send(Input::HighlightExpired { generation }).await;
                    });
                }
                other => {
                    if effect_tx.send(other).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(state: RevealState, inputs: &[Input]) -> (RevealState, Vec<Effect>) {
        let mut state = state;
        let mut all = Vec::new();
        for &input in inputs {
            let (next, effects) = transition(state, input);
            state = next;
            all.extend(effects);
        }
        (state, all)
    }

    #[test]
    fn closed_panel_defers_reveal_until_open_settle_and_data() {
        let state = RevealState::new(false);

        let (state, effects) = transition(state, Input::Activate { target: 42 });
        assert_eq!(effects, vec![Effect::RequestPanelOpen]);
        assert_eq!(
            state.phase,
            RevealPhase::Pending {
                target: 42,
                settled: false
            }
        );

        let (state, effects) = transition(state, Input::PanelOpened);
        assert_eq!(effects, vec![Effect::StartSettleTimer { generation: 1 }]);

        // Settle fires before the list data; reveal still waits.
        let (state, effects) = transition(state, Input::SettleElapsed { generation: 1 });
        assert!(effects.is_empty());
        assert_eq!(
            state.phase,
            RevealPhase::Pending {
                target: 42,
                settled: true
            }
        );

        let (state, effects) = transition(state, Input::ListDataReady);
        assert_eq!(
            effects,
            vec![Effect::RequestLocate {
                target: 42,
                generation: 1
            }]
        );
        assert_eq!(state.phase, RevealPhase::Locating { target: 42 });
    }

    #[test]
    fn open_panel_with_data_locates_immediately() {
        let mut state = RevealState::new(true);
        state.list_ready = true;

        let (state, effects) = transition(state, Input::Activate { target: 7 });
        assert_eq!(
            effects,
            vec![Effect::RequestLocate {
                target: 7,
                generation: 1
            }]
        );
        assert_eq!(state.phase, RevealPhase::Locating { target: 7 });
    }

    #[test]
    fn located_target_scrolls_highlights_and_arms_expiry() {
        let mut state = RevealState::new(true);
        state.list_ready = true;
        let (state, _) = transition(state, Input::Activate { target: 7 });

        let (state, effects) = transition(
            state,
            Input::LocateResult {
                generation: 1,
                position: Some(4),
            },
        );
        assert_eq!(
            effects,
            vec![
                Effect::ScrollTo { position: 4 },
                Effect::SetHighlight { target: 7 },
                Effect::StartHighlightTimer { generation: 1 },
            ]
        );
        assert_eq!(state.phase, RevealPhase::Highlighted { target: 7 });

        let (state, effects) = transition(state, Input::HighlightExpired { generation: 1 });
        assert_eq!(effects, vec![Effect::ClearHighlight]);
        assert_eq!(state.phase, RevealPhase::Idle);
    }

    #[test]
    fn unlocatable_target_returns_quietly_to_idle() {
        let mut state = RevealState::new(true);
        state.list_ready = true;
        let (state, _) = transition(state, Input::Activate { target: 7 });

        let (state, effects) = transition(
            state,
            Input::LocateResult {
                generation: 1,
                position: None,
            },
        );
        assert!(effects.is_empty());
        assert_eq!(state.phase, RevealPhase::Idle);
    }

    #[test]
    fn new_activation_supersedes_the_old_highlight_and_its_timer() {
        let mut state = RevealState::new(true);
        state.list_ready = true;
        let (state, _) = drive(
            state,
            &[
                Input::Activate { target: 7 },
                Input::LocateResult {
                    generation: 1,
                    position: Some(4),
                },
            ],
        );
        assert_eq!(state.phase, RevealPhase::Highlighted { target: 7 });

        let (state, effects) = transition(state, Input::Activate { target: 9 });
        assert_eq!(effects[0], Effect::ClearHighlight);
        assert_eq!(state.generation, 2);

        // The first activation's 5s timer fires late; stale, ignored.
        let (state, effects) = transition(state, Input::HighlightExpired { generation: 1 });
        assert!(effects.is_empty());
        assert_eq!(state.phase, RevealPhase::Locating { target: 9 });
    }

    #[test]
    fn stale_settle_timer_is_ignored() {
        let state = RevealState::new(false);
        let (state, _) = drive(
            state,
            &[
                Input::Activate { target: 1 },
                Input::PanelOpened,
                // Second activation before the first settle fires.
                Input::Activate { target: 2 },
            ],
        );
        assert_eq!(state.generation, 2);

        let (state, effects) = transition(state, Input::SettleElapsed { generation: 1 });
        assert!(effects.is_empty());
        assert_eq!(
            state.phase,
            RevealPhase::Pending {
                target: 2,
                settled: false
            }
        );

        let (state, effects) = transition(state, Input::SettleElapsed { generation: 2 });
        assert!(effects.is_empty());
        assert_eq!(
            state.phase,
            RevealPhase::Pending {
                target: 2,
                settled: true
            }
        );
    }

    #[test]
    fn activation_during_settle_waits_out_a_fresh_settle() {
        let state = RevealState::new(false);
        let (state, _) = drive(
            state,
            &[
                Input::Activate { target: 1 },
                Input::ListDataReady,
                Input::PanelOpened,
            ],
        );

        // The panel is open but still animating; a new target must not
        // locate against it immediately.
        let (state, effects) = transition(state, Input::Activate { target: 2 });
        assert_eq!(effects, vec![Effect::StartSettleTimer { generation: 2 }]);
        assert_eq!(
            state.phase,
            RevealPhase::Pending {
                target: 2,
                settled: false
            }
        );

        let (state, effects) = transition(state, Input::SettleElapsed { generation: 2 });
        assert_eq!(
            effects,
            vec![Effect::RequestLocate {
                target: 2,
                generation: 2
            }]
        );
        assert_eq!(state.phase, RevealPhase::Locating { target: 2 });
    }

    #[test]
    fn closing_the_panel_cancels_an_in_flight_reveal() {
        let state = RevealState::new(false);
        let (state, _) = drive(
            state,
            &[Input::Activate { target: 3 }, Input::PanelOpened],
        );

        let (state, effects) = transition(state, Input::PanelClosed);
        assert!(effects.is_empty());
        assert_eq!(state.phase, RevealPhase::Idle);

        // The settle timer armed before the close fires into a no-op.
        let (state, effects) = transition(state, Input::SettleElapsed { generation: 1 });
        assert!(effects.is_empty());
        assert_eq!(state.phase, RevealPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn coordinator_runs_the_full_deferred_flow() {
        let (handle, mut effects, _task) = spawn(false);

        handle.activate(42).await;
        assert_eq!(effects.recv().await, Some(Effect::RequestPanelOpen));

        handle.list_ready().await;
        handle.panel_opened().await;

        // Settle delay elapses under paused time.
        let locate = effects.recv().await.expect("locate effect");
        let Effect::RequestLocate { target, generation } = locate else {
            panic!("expected locate request, got {locate:?}");
        };
        assert_eq!(target, 42);

        handle.locate_result(generation, Some(3)).await;
        assert_eq!(effects.recv().await, Some(Effect::ScrollTo { position: 3 }));
        assert_eq!(effects.recv().await, Some(Effect::SetHighlight { target: 42 }));

        // Highlight expires after its 5s window.
        assert_eq!(effects.recv().await, Some(Effect::ClearHighlight));
    }

    #[tokio::test(start_paused = true)]
    async fn coordinator_reactivation_restarts_the_highlight_window() {
        let (handle, mut effects, _task) = spawn(true);
        handle.list_ready().await;

        handle.activate(1).await;
        let Some(Effect::RequestLocate { generation, .. }) = effects.recv().await else {
            panic!("expected locate request");
        };
        handle.locate_result(generation, Some(0)).await;
        assert_eq!(effects.recv().await, Some(Effect::ScrollTo { position: 0 }));
        assert_eq!(effects.recv().await, Some(Effect::SetHighlight { target: 1 }));

        // Re-activate before the window expires.
        handle.activate(2).await;
        assert_eq!(effects.recv().await, Some(Effect::ClearHighlight));
        let Some(Effect::RequestLocate { generation, .. }) = effects.recv().await else {
            panic!("expected second locate request");
        };
        handle.locate_result(generation, Some(5)).await;
        assert_eq!(effects.recv().await, Some(Effect::ScrollTo { position: 5 }));
        assert_eq!(effects.recv().await, Some(Effect::SetHighlight { target: 2 }));

        // Only the second window's expiry clears.
        assert_eq!(effects.recv().await, Some(Effect::ClearHighlight));
    }
}
