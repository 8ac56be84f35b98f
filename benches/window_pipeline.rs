//! Pipeline overhead with the models stubbed out: windowing, gating, debounce
//! and frame preprocessing.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use image::RgbImage;
use signstream::config::ResetMode;
use signstream::defaults;
use signstream::model::{MockExtractor, ScriptedClassifier};
use signstream::pipeline::{
    ClassList, EngineSettings, Frame, InferenceEngine, ResetPolicy, SessionId, prepare,
};
use std::hint::black_box;

fn engine(reset: ResetPolicy) -> InferenceEngine {
    let classes: Vec<String> = (0..20).map(|i| format!("SIGN{}", i)).collect();
    let mut probabilities = vec![0.01; classes.len()];
    probabilities[3] = 0.81;
    InferenceEngine::new(
        Box::new(MockExtractor::new(defaults::KEYPOINT_LEN)),
        Box::new(ScriptedClassifier::constant(probabilities)),
        ClassList::new(classes).unwrap_or_else(|e| panic!("class list: {e}")),
        EngineSettings {
            seq_len: defaults::SEQ_LEN,
            keypoint_len: defaults::KEYPOINT_LEN,
            reset,
            threshold: defaults::THRESHOLD,
            debounce: true,
        },
    )
}

fn bench_process_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_frame");
    let policies = [
        (ResetMode::Full, ResetPolicy::Full),
        (
            ResetMode::Sliding,
            ResetPolicy::Sliding {
                stride: defaults::STRIDE,
            },
        ),
    ];

    for (mode, policy) in policies {
        let mut engine = engine(policy);
        let (tx, rx) = crossbeam_channel::unbounded();
        engine.open_session(SessionId(1), tx);
        let frame = Frame::new(RgbImage::new(4, 4), SessionId(1), 0);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", mode).to_lowercase()),
            &frame,
            |b, frame| {
                b.iter(|| {
                    let outcome = engine.process_frame(black_box(frame));
                    rx.try_iter().for_each(drop);
                    outcome
                })
            },
        );
    }
    group.finish();
}

fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare");
    for (width, height) in [(640u32, 480u32), (1280, 720)] {
        let image = RgbImage::new(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &image,
            |b, image| b.iter(|| prepare(image.clone(), defaults::FRAME_HEIGHT, true)),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_process_frame, bench_prepare);
criterion_main!(benches);
