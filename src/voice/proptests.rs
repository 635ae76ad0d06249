//! Property-based tests for the voice controller
//!
//! A small model of the speech engine applies the emitted effects, so the
//! properties are checked against what the hardware would actually be doing.

use super::*;
use crate::speech::{SpeechError, SpeechErrorKind};
use proptest::prelude::*;

// ============================================================================
// Engine Model
// ============================================================================

#[derive(Debug, Default)]
struct EngineModel {
    capturing: bool,
    playing: Option<PlaybackId>,
}

impl EngineModel {
    /// Apply effects in order; playback must never start over a live capture
    fn apply(&mut self, effects: &[VoiceEffect]) -> Result<(), String> {
        for effect in effects {
            match effect {
                VoiceEffect::StartCapture => {
                    if self.playing.is_some() {
                        return Err(format!("capture started during playback: {effects:?}"));
                    }
                    self.capturing = true;
                }
                VoiceEffect::StopCapture => self.capturing = false,
                VoiceEffect::Speak { playback, .. } => {
                    if self.capturing {
                        return Err(format!("playback started while capturing: {effects:?}"));
                    }
                    self.playing = Some(*playback);
                }
                VoiceEffect::CancelPlayback => self.playing = None,
                VoiceEffect::ResetTranscript
                | VoiceEffect::Dispatch { .. }
                | VoiceEffect::AbortTurn
                | VoiceEffect::ShowNotice { .. } => {}
            }
        }
        Ok(())
    }

    fn inactive(&self) -> bool {
        !self.capturing && self.playing.is_none()
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Enter,
    Exit,
    Mute,
    Unmute,
    Clear,
    Submit(String, InputMode),
    Response(String),
    TurnEnded(TurnOutcome),
    /// The engine finishes whatever it is currently playing
    FinishCurrent,
    FinishStale(u64),
    Fail(SpeechError),
}

fn arb_error_kind() -> impl Strategy<Value = SpeechErrorKind> {
    prop_oneof![
        Just(SpeechErrorKind::PermissionDenied),
        Just(SpeechErrorKind::NotSupported),
        Just(SpeechErrorKind::NetworkError),
        Just(SpeechErrorKind::RecognitionFailed),
        Just(SpeechErrorKind::TtsFailed),
    ]
}

fn arb_speech_error() -> impl Strategy<Value = SpeechError> {
    (arb_error_kind(), "[a-z ]{1,20}").prop_map(|(kind, message)| SpeechError::new(kind, message))
}

fn arb_input_mode() -> impl Strategy<Value = InputMode> {
    prop_oneof![Just(InputMode::Voice), Just(InputMode::Text)]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Enter),
        Just(Step::Exit),
        Just(Step::Mute),
        Just(Step::Unmute),
        Just(Step::Clear),
        ("[a-zA-Z ]{0,20}", arb_input_mode()).prop_map(|(text, mode)| Step::Submit(text, mode)),
        "[a-zA-Z ]{0,20}".prop_map(Step::Response),
        prop_oneof![Just(TurnOutcome::Aborted), Just(TurnOutcome::Failed)].prop_map(Step::TurnEnded),
        Just(Step::FinishCurrent),
        Just(Step::FinishCurrent),
        (1000u64..1004).prop_map(Step::FinishStale),
        arb_speech_error().prop_map(Step::Fail),
    ]
}

// ============================================================================
// Driver
// ============================================================================

fn context() -> VoiceContext {
    VoiceContext::new("Hello, I'm here to help.", true)
}

/// Turn a step into an event, or `None` if the engine has nothing to finish
fn to_event(step: Step, model: &mut EngineModel) -> Option<VoiceEvent> {
    Some(match step {
        Step::Enter => VoiceEvent::EnterVoiceMode,
        Step::Exit => VoiceEvent::ExitVoiceMode,
        Step::Mute => VoiceEvent::Mute,
        Step::Unmute => VoiceEvent::Unmute,
        Step::Clear => VoiceEvent::ClearError,
        Step::Submit(text, mode) => VoiceEvent::Submitted {
            utterance: Utterance::new(text, mode),
        },
        Step::Response(text) => VoiceEvent::ResponseReady { text },
        Step::TurnEnded(outcome) => VoiceEvent::TurnEnded { outcome },
        Step::FinishCurrent => VoiceEvent::PlaybackFinished {
            playback: model.playing.take()?,
        },
        Step::FinishStale(id) => VoiceEvent::PlaybackFinished {
            playback: PlaybackId(id),
        },
        Step::Fail(error) => VoiceEvent::EngineError { error },
    })
}

/// Run steps, checking the per-step invariants; returns the final session and model
fn run(steps: Vec<Step>) -> Result<(VoiceSession, EngineModel), TestCaseError> {
    let ctx = context();
    let mut session = VoiceSession::new();
    let mut model = EngineModel::default();

    for step in steps {
        let finishing_current = matches!(step, Step::FinishCurrent) && model.playing.is_some();
        let muted_before = session.mic.muted;
        let Some(event) = to_event(step, &mut model) else {
            continue;
        };

        match transition(&session, &ctx, event) {
            Ok(result) => {
                model.apply(&result.effects).map_err(TestCaseError::fail)?;
                session = result.session;

                if finishing_current {
                    // Capture resumes iff the mic is unmuted at completion time
                    let resumed = result.effects.contains(&VoiceEffect::StartCapture);
                    prop_assert_eq!(resumed, !muted_before);
                }
            }
            Err(_) => { /* Rejected transitions are fine */ }
        }

        prop_assert!(
            !(model.capturing && model.playing.is_some()),
            "capture and playback both active in {:?}",
            session
        );
        prop_assert_eq!(model.capturing, session.state.is_capturing());
        prop_assert_eq!(model.playing.is_some(), session.state.is_playing());
        prop_assert!(session.is_consistent(), "inconsistent session {:?}", session);
    }

    Ok((session, model))
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // Listening and speaking are never simultaneously true, and the mic only
    // resumes after playback when unmuted at that moment
    #[test]
    fn prop_capture_and_playback_exclusive(steps in proptest::collection::vec(arb_step(), 0..40)) {
        run(steps)?;
    }

    // Any engine error lands in Error, and clearing it leaves everything inactive
    #[test]
    fn prop_engine_errors_are_not_fatal(
        steps in proptest::collection::vec(arb_step(), 0..30),
        error in arb_speech_error(),
    ) {
        let (session, mut model) = run(steps)?;
        let ctx = context();

        let failed = transition(&session, &ctx, VoiceEvent::EngineError { error: error.clone() })
            .expect("engine errors are accepted in every state");
        model.apply(&failed.effects).map_err(TestCaseError::fail)?;
        prop_assert_eq!(&failed.session.state, &SessionState::Error { error: error.clone() });
        prop_assert_eq!(failed.session.last_error.as_ref(), Some(&error));
        prop_assert!(model.inactive());

        let cleared = transition(&failed.session, &ctx, VoiceEvent::ClearError)
            .expect("clearing an error always succeeds");
        model.apply(&cleared.effects).map_err(TestCaseError::fail)?;
        prop_assert!(matches!(cleared.session.state, SessionState::Idle | SessionState::Ready));
        prop_assert!(cleared.session.last_error.is_none());
        prop_assert!(model.inactive());
    }

    // Exiting voice mode always forces everything off
    #[test]
    fn prop_exit_forces_idle(steps in proptest::collection::vec(arb_step(), 0..30)) {
        let (session, mut model) = run(steps)?;

        let exited = transition(&session, &context(), VoiceEvent::ExitVoiceMode)
            .expect("exit is accepted in every state");
        model.apply(&exited.effects).map_err(TestCaseError::fail)?;

        if session.voice_mode {
            prop_assert_eq!(&exited.session.state, &SessionState::Idle);
            prop_assert!(model.inactive());
        }
        prop_assert!(!exited.session.voice_mode);
        prop_assert!(exited.session.mic.muted);
    }

    // A finished turn never leaves the controller processing
    #[test]
    fn prop_turn_end_leaves_processing(
        steps in proptest::collection::vec(arb_step(), 0..30),
        outcome in prop_oneof![Just(TurnOutcome::Aborted), Just(TurnOutcome::Failed)],
    ) {
        let (session, _) = run(steps)?;
        let ended = transition(&session, &context(), VoiceEvent::TurnEnded { outcome })
            .expect("turn end is accepted in every state");
        prop_assert_ne!(&ended.session.state, &SessionState::Processing);
        prop_assert!(ended.effects.is_empty());
    }
}
