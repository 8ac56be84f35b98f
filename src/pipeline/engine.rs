//! The recognition state machine: extract, window, classify, gate, debounce.
//!
//! [`InferenceEngine`] is synchronous and owns both models plus one
//! [`Window`]/[`Debouncer`] pair per session. The worker thread in
//! [`crate::pipeline::worker`] feeds it from the ingestion channel; tests can
//! drive it directly.

use crate::config::Config;
use crate::model::{ExtractError, FeatureExtractor, SequenceClassifier};
use crate::pipeline::error::{ErrorReporter, LogReporter, StageError};
use crate::pipeline::gate::{ConfidenceGate, Debouncer};
use crate::pipeline::types::{
    ClassList, Decision, Frame, KeypointVector, PipelineInput, SessionId,
};
use crate::pipeline::window::{ResetPolicy, Window};
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Knobs the engine needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Window length. Zero is treated as one.
    pub seq_len: usize,
    pub keypoint_len: usize,
    pub reset: ResetPolicy,
    pub threshold: f32,
    pub debounce: bool,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            seq_len: config.pipeline.seq_len,
            keypoint_len: config.model.keypoint_len,
            reset: ResetPolicy::from_settings(&config.pipeline),
            threshold: config.pipeline.threshold,
            debounce: config.pipeline.debounce,
        }
    }
}

/// What the engine did with one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Appended; the window is not full yet.
    Buffered { len: usize },
    /// A window completed and its decision went to the result queue.
    Emitted(Decision),
    /// A window completed but repeated the previous decision.
    Suppressed(Decision),
    /// The extractor faulted; the frame was discarded.
    Dropped,
    /// A window completed but the classifier failed on it.
    ClassificationFailed,
}

/// Counters for one session, or summed over all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub frames_dropped: u64,
    pub zero_filled: u64,
    pub windows: u64,
    pub classification_failures: u64,
    pub emitted: u64,
    pub suppressed: u64,
}

impl PipelineStats {
    pub fn merge(&mut self, other: &PipelineStats) {
        self.frames += other.frames;
        self.frames_dropped += other.frames_dropped;
        self.zero_filled += other.zero_filled;
        self.windows += other.windows;
        self.classification_failures += other.classification_failures;
        self.emitted += other.emitted;
        self.suppressed += other.suppressed;
    }
}

struct SessionState {
    window: Window,
    debouncer: Debouncer,
    results: Option<Sender<Decision>>,
    stats: PipelineStats,
}

impl SessionState {
    fn new(settings: &EngineSettings, results: Option<Sender<Decision>>) -> Self {
        Self {
            window: Window::new(settings.seq_len, settings.reset),
            debouncer: Debouncer::new(settings.debounce),
            results,
            stats: PipelineStats::default(),
        }
    }
}

pub struct InferenceEngine {
    extractor: Box<dyn FeatureExtractor>,
    classifier: Box<dyn SequenceClassifier>,
    classes: ClassList,
    settings: EngineSettings,
    gate: ConfidenceGate,
    sessions: HashMap<SessionId, SessionState>,
    closed: PipelineStats,
    reporter: Arc<dyn ErrorReporter>,
}

impl InferenceEngine {
    pub fn new(
        extractor: Box<dyn FeatureExtractor>,
        classifier: Box<dyn SequenceClassifier>,
        classes: ClassList,
        settings: EngineSettings,
    ) -> Self {
        if extractor.keypoint_len() != settings.keypoint_len {
            tracing::warn!(
                extractor = extractor.name(),
                produces = extractor.keypoint_len(),
                expected = settings.keypoint_len,
                "extractor keypoint length differs from configuration; mismatched frames will be dropped"
            );
        }
        Self {
            extractor,
            classifier,
            classes,
            gate: ConfidenceGate::new(settings.threshold),
            settings,
            sessions: HashMap::new(),
            closed: PipelineStats::default(),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn classes(&self) -> &ClassList {
        &self.classes
    }

    /// Registers a session and where its decisions go.
    ///
    /// Re-opening an existing session starts it over.
    pub fn open_session(&mut self, session: SessionId, results: Sender<Decision>) {
        tracing::debug!(%session, "session opened");
        self.sessions
            .insert(session, SessionState::new(&self.settings, Some(results)));
    }

    /// Drops a session's window and decision state and clears extractor
    /// tracking so the next session starts clean.
    pub fn close_session(&mut self, session: SessionId) -> Option<PipelineStats> {
        self.extractor.reset();
        let state = self.sessions.remove(&session)?;
        let stats = state.stats;
        self.closed.merge(&stats);
        tracing::info!(
            %session,
            frames = stats.frames,
            dropped = stats.frames_dropped,
            windows = stats.windows,
            emitted = stats.emitted,
            suppressed = stats.suppressed,
            "session closed"
        );
        Some(stats)
    }

    /// Number of frames currently buffered for `session`.
    pub fn window_len(&self, session: SessionId) -> Option<usize> {
        self.sessions.get(&session).map(|s| s.window.len())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Totals over closed and open sessions.
    pub fn stats(&self) -> PipelineStats {
        let mut total = self.closed;
        for state in self.sessions.values() {
            total.merge(&state.stats);
        }
        total
    }

    /// Dispatches one ingestion message. `Break` means end of stream.
    pub fn handle(&mut self, input: PipelineInput) -> ControlFlow<()> {
        match input {
            PipelineInput::Open { session, results } => self.open_session(session, results),
            PipelineInput::Frame(frame) => {
                self.process_frame(&frame);
            }
            PipelineInput::Close { session } => {
                self.close_session(session);
            }
            PipelineInput::EndOfStream => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Runs one frame through extraction and, if it completes a window,
    /// classification, gating and debounce.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutcome {
        let settings = self.settings;
        let session = frame.session;
        let state = self
            .sessions
            .entry(session)
            .or_insert_with(|| SessionState::new(&settings, None));
        state.stats.frames += 1;

        let keypoints = match self.extractor.extract(&frame.image) {
            Ok(keypoints) if keypoints.len() == settings.keypoint_len => keypoints,
            Ok(keypoints) => {
                state.stats.frames_dropped += 1;
                self.reporter.report(
                    session,
                    &StageError::Extraction(format!(
                        "{} returned {} values, expected {}",
                        self.extractor.name(),
                        keypoints.len(),
                        settings.keypoint_len
                    )),
                );
                return FrameOutcome::Dropped;
            }
            Err(ExtractError::NoDetection) => {
                state.stats.zero_filled += 1;
                KeypointVector::zeros(settings.keypoint_len)
            }
            Err(ExtractError::Fault(message)) => {
                state.stats.frames_dropped += 1;
                self.reporter.report(
                    session,
                    &StageError::Extraction(format!("frame {}: {}", frame.sequence, message)),
                );
                return FrameOutcome::Dropped;
            }
        };

        let Some(snapshot) = state.window.push(keypoints) else {
            return FrameOutcome::Buffered {
                len: state.window.len(),
            };
        };
        state.stats.windows += 1;

        let prediction = match self.classifier.classify(&snapshot) {
            Ok(prediction) if prediction.len() == self.classes.len() => prediction,
            Ok(prediction) => {
                state.stats.classification_failures += 1;
                self.reporter.report(
                    session,
                    &StageError::Classification(format!(
                        "{} returned {} scores for {} classes",
                        self.classifier.name(),
                        prediction.len(),
                        self.classes.len()
                    )),
                );
                return FrameOutcome::ClassificationFailed;
            }
            Err(e) => {
                state.stats.classification_failures += 1;
                self.reporter
                    .report(session, &StageError::Classification(e.to_string()));
                return FrameOutcome::ClassificationFailed;
            }
        };

        let candidate = self.gate.decide(&prediction, &self.classes);
        if let Some((index, p)) = prediction.argmax() {
            tracing::debug!(
                %session,
                class = self.classes.get(index).unwrap_or("?"),
                probability = p,
                decision = %candidate,
                latency_ms = frame.received.elapsed().as_millis() as u64,
                "window classified"
            );
        }

        let Some(decision) = state.debouncer.admit(candidate.clone()) else {
            state.stats.suppressed += 1;
            return FrameOutcome::Suppressed(candidate);
        };

        state.stats.emitted += 1;
        match &state.results {
            Some(results) => {
                if results.send(decision.clone()).is_err() {
                    tracing::debug!(%session, "result queue closed, decision discarded");
                }
            }
            None => tracing::warn!(%session, "decision for unregistered session discarded"),
        }
        FrameOutcome::Emitted(decision)
    }

    /// Closes every open session. Called when the worker stops.
    pub fn finish(&mut self) -> PipelineStats {
        let open: Vec<SessionId> = self.sessions.keys().copied().collect();
        for session in open {
            self.close_session(session);
        }
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MockExtractor, ScriptedClassifier};
    use crossbeam_channel::{Receiver, unbounded};
    use image::RgbImage;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    const K: usize = 4;
    const SEQ: usize = 5;

    #[derive(Default)]
    struct CollectingReporter {
        errors: Mutex<Vec<(SessionId, StageError)>>,
    }

    impl ErrorReporter for CollectingReporter {
        fn report(&self, session: SessionId, error: &StageError) {
            self.errors.lock().unwrap().push((session, error.clone()));
        }
    }

    fn classes() -> ClassList {
        ClassList::new(vec!["HELLO".into(), "THANKS".into(), "YES".into()]).unwrap()
    }

    fn settings(reset: ResetPolicy, debounce: bool) -> EngineSettings {
        EngineSettings {
            seq_len: SEQ,
            keypoint_len: K,
            reset,
            threshold: 0.8,
            debounce,
        }
    }

    fn engine_with(
        extractor: MockExtractor,
        classifier: ScriptedClassifier,
        settings: EngineSettings,
    ) -> InferenceEngine {
        InferenceEngine::new(Box::new(extractor), Box::new(classifier), classes(), settings)
    }

    fn open(engine: &mut InferenceEngine, id: u64) -> Receiver<Decision> {
        let (tx, rx) = unbounded();
        engine.open_session(SessionId(id), tx);
        rx
    }

    fn frame(session: u64, sequence: u64) -> Frame {
        Frame::new(RgbImage::new(2, 2), SessionId(session), sequence)
    }

    fn feed(engine: &mut InferenceEngine, session: u64, count: u64) -> Vec<FrameOutcome> {
        (0..count)
            .map(|seq| engine.process_frame(&frame(session, seq)))
            .collect()
    }

    fn hello() -> Decision {
        Decision::Word("HELLO".to_string())
    }

    #[test]
    fn test_no_decision_before_window_is_full() {
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, false),
        );
        let rx = open(&mut engine, 1);

        let outcomes = feed(&mut engine, 1, SEQ as u64 - 1);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(*outcome, FrameOutcome::Buffered { len: i + 1 });
        }
        assert!(rx.try_recv().is_err());

        assert_eq!(
            engine.process_frame(&frame(1, 99)),
            FrameOutcome::Emitted(hello())
        );
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![hello()]);
    }

    #[test]
    fn test_low_confidence_emits_uncertain() {
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::constant(vec![0.5, 0.3, 0.2]),
            settings(ResetPolicy::Full, true),
        );
        let rx = open(&mut engine, 1);
        feed(&mut engine, 1, SEQ as u64);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Decision::Uncertain]);
    }

    #[test]
    fn test_debounced_emits_repeated_word_once() {
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, true),
        );
        let rx = open(&mut engine, 1);
        feed(&mut engine, 1, SEQ as u64 * 3);

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![hello()]);
        let stats = engine.stats();
        assert_eq!(stats.windows, 3);
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.suppressed, 2);
    }

    #[test]
    fn test_non_debounced_emits_every_window() {
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, false),
        );
        let rx = open(&mut engine, 1);
        feed(&mut engine, 1, SEQ as u64 * 3);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![hello(), hello(), hello()]
        );
    }

    #[test]
    fn test_sliding_reset_classifies_every_stride() {
        let classifier = ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]);
        let calls = classifier.call_counter();
        let mut engine = engine_with(
            MockExtractor::new(K),
            classifier,
            settings(ResetPolicy::Sliding { stride: 2 }, false),
        );
        let _rx = open(&mut engine, 1);

        // First window after 5 frames, then one every 2 frames: 5, 7, 9, 11
        feed(&mut engine, 1, 11);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(engine.window_len(SessionId(1)), Some(3));
    }

    #[test]
    fn test_word_changes_are_emitted_in_window_order() {
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::scripted(vec![
                vec![0.9, 0.05, 0.05],
                vec![0.9, 0.05, 0.05],
                vec![0.05, 0.9, 0.05],
                vec![0.4, 0.3, 0.3],
                vec![0.05, 0.05, 0.9],
            ]),
            settings(ResetPolicy::Full, true),
        );
        let rx = open(&mut engine, 1);
        feed(&mut engine, 1, SEQ as u64 * 5);

        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![
                hello(),
                Decision::Word("THANKS".to_string()),
                Decision::Uncertain,
                Decision::Word("YES".to_string()),
            ]
        );
    }

    #[test]
    fn test_extractor_fault_drops_frame_and_continues() {
        let reporter = Arc::new(CollectingReporter::default());
        let mut engine = engine_with(
            MockExtractor::new(K).with_fault_on(2),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, false),
        )
        .with_error_reporter(reporter.clone());
        let rx = open(&mut engine, 1);

        let outcomes = feed(&mut engine, 1, SEQ as u64);
        assert_eq!(outcomes[2], FrameOutcome::Dropped);
        assert_eq!(outcomes[3], FrameOutcome::Buffered { len: 3 });
        // One frame short of a window because of the dropped frame
        assert!(rx.try_recv().is_err());

        assert_eq!(
            engine.process_frame(&frame(1, 5)),
            FrameOutcome::Emitted(hello())
        );

        let errors = reporter.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1.stage(), "extraction");
    }

    #[test]
    fn test_no_detection_is_zero_filled() {
        let mut engine = engine_with(
            MockExtractor::new(K).with_no_detection_on(0),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, false),
        );
        let _rx = open(&mut engine, 1);
        assert_eq!(
            engine.process_frame(&frame(1, 0)),
            FrameOutcome::Buffered { len: 1 }
        );
        assert_eq!(engine.stats().zero_filled, 1);
    }

    #[test]
    fn test_wrong_keypoint_length_is_dropped() {
        let mut engine = engine_with(
            MockExtractor::new(K + 1),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, false),
        );
        assert_eq!(engine.process_frame(&frame(1, 0)), FrameOutcome::Dropped);
        assert_eq!(engine.window_len(SessionId(1)), Some(0));
    }

    #[test]
    fn test_classification_failure_keeps_decision_state() {
        let reporter = Arc::new(CollectingReporter::default());
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]).with_failure_on(1),
            settings(ResetPolicy::Full, true),
        )
        .with_error_reporter(reporter.clone());
        let rx = open(&mut engine, 1);

        let outcomes = feed(&mut engine, 1, SEQ as u64 * 3);
        assert_eq!(outcomes[SEQ - 1], FrameOutcome::Emitted(hello()));
        assert_eq!(outcomes[2 * SEQ - 1], FrameOutcome::ClassificationFailed);
        // Still debounced against the first HELLO
        assert_eq!(outcomes[3 * SEQ - 1], FrameOutcome::Suppressed(hello()));
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(reporter.errors.lock().unwrap()[0].1.stage(), "classification");
    }

    #[test]
    fn test_prediction_size_mismatch_is_a_classification_failure() {
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::constant(vec![0.9, 0.1]),
            settings(ResetPolicy::Full, false),
        );
        let outcomes = feed(&mut engine, 1, SEQ as u64);
        assert_eq!(outcomes[SEQ - 1], FrameOutcome::ClassificationFailed);
    }

    #[test]
    fn test_sessions_have_independent_windows() {
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, false),
        );
        let rx1 = open(&mut engine, 1);
        let rx2 = open(&mut engine, 2);

        // Interleave: session 1 gets SEQ frames, session 2 gets SEQ - 1
        for seq in 0..SEQ as u64 {
            engine.process_frame(&frame(1, seq));
            if seq + 1 < SEQ as u64 {
                engine.process_frame(&frame(2, seq));
            }
        }

        assert_eq!(rx1.try_iter().count(), 1);
        assert_eq!(rx2.try_iter().count(), 0);
        assert_eq!(engine.window_len(SessionId(2)), Some(SEQ - 1));
    }

    #[test]
    fn test_close_session_resets_state_and_extractor() {
        let extractor = MockExtractor::new(K);
        let resets = extractor.reset_counter();
        let mut engine = engine_with(
            extractor,
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, true),
        );
        let rx = open(&mut engine, 1);
        feed(&mut engine, 1, SEQ as u64 + 2);
        assert_eq!(rx.try_iter().count(), 1);

        let stats = engine.close_session(SessionId(1)).unwrap();
        assert_eq!(stats.frames, SEQ as u64 + 2);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert_eq!(engine.window_len(SessionId(1)), None);

        // Reopened session starts with an empty window and no debounce memory
        let rx = open(&mut engine, 1);
        let outcomes = feed(&mut engine, 1, SEQ as u64);
        assert_eq!(outcomes[0], FrameOutcome::Buffered { len: 1 });
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![hello()]);
    }

    #[test]
    fn test_handle_stops_on_end_of_stream() {
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, false),
        );
        let (tx, rx) = unbounded();
        assert!(
            engine
                .handle(PipelineInput::Open {
                    session: SessionId(3),
                    results: tx,
                })
                .is_continue()
        );
        for seq in 0..SEQ as u64 - 1 {
            assert!(engine.handle(PipelineInput::Frame(frame(3, seq))).is_continue());
        }
        assert!(engine.handle(PipelineInput::EndOfStream).is_break());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_finish_closes_all_sessions() {
        let mut engine = engine_with(
            MockExtractor::new(K),
            ScriptedClassifier::constant(vec![0.9, 0.05, 0.05]),
            settings(ResetPolicy::Full, false),
        );
        let _a = open(&mut engine, 1);
        let _b = open(&mut engine, 2);
        feed(&mut engine, 1, 3);
        feed(&mut engine, 2, 4);

        let stats = engine.finish();
        assert_eq!(stats.frames, 7);
        assert_eq!(engine.session_count(), 0);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.pipeline.seq_len = 12;
        config.pipeline.threshold = 0.75;
        config.pipeline.debounce = false;
        config.model.keypoint_len = 99;

        let settings = EngineSettings::from_config(&config);
        assert_eq!(settings.seq_len, 12);
        assert_eq!(settings.keypoint_len, 99);
        assert_eq!(settings.threshold, 0.75);
        assert!(!settings.debounce);
        assert_eq!(settings.reset, ResetPolicy::Sliding { stride: 5 });
    }
}
