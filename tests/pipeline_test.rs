//! End-to-end tests for generation, derivation and assembly

use chrono::NaiveDate;
use cogtrend::config::{NoiseConfig, PatternTable};
use cogtrend::features::{COMBINED_WEIGHTS, SLOPE_OFFSET};
use cogtrend::schema::SessionRowAdapter;
use cogtrend::types::BaselineTraits;
use cogtrend::{
    DatasetAssembler, GeneratorConfig, SessionSimulator, SubjectProfile, SynthError,
    TimestampSequencer, TrendPattern, FEATURE_COUNT, WINDOW_SIZE,
};
use pretty_assertions::assert_eq;
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn config(subjects: usize, seed: u64) -> GeneratorConfig {
    GeneratorConfig {
        subjects,
        seed,
        ..GeneratorConfig::default()
    }
}

#[test]
fn test_session_metrics_stay_in_range() {
    let generated = DatasetAssembler::new(GeneratorConfig {
        min_sessions: 6,
        max_sessions: 12,
        ..config(300, 11)
    })
    .unwrap()
    .generate()
    .unwrap();

    for session in generated.subjects.iter().flat_map(|s| s.sessions.iter()) {
        assert!((0.1..=1.0).contains(&session.memory_accuracy));
        assert!((150.0..=1000.0).contains(&session.reaction_time_ms));
        assert!((1.0..=10.0).contains(&session.pattern_level));
        assert!((50.0..=250.0).contains(&session.language_wpm));
    }
}

#[test]
fn test_bounded_channels_and_exact_combined() {
    let dataset = DatasetAssembler::new(config(300, 3))
        .unwrap()
        .generate()
        .unwrap()
        .dataset;
    assert_eq!(dataset.len(), 300);

    for window in &dataset.windows {
        assert_eq!(window.vectors[0].stability, 1.0);
        for v in &window.vectors {
            for channel in [v.memory, v.reaction, v.pattern, v.language, v.stability, v.temporal] {
                assert!((0.0..=1.0).contains(&channel), "channel out of [0, 1]: {channel}");
            }
            let expected = COMBINED_WEIGHTS[0] * v.memory
                + COMBINED_WEIGHTS[1] * v.reaction
                + COMBINED_WEIGHTS[2] * v.pattern
                + COMBINED_WEIGHTS[3] * v.language;
            assert_eq!(v.combined, expected);
            assert!(v.slope.is_finite());
        }
    }
}

#[test]
fn test_declining_population_loses_memory() {
    let generated = DatasetAssembler::new(GeneratorConfig {
        patterns: PatternTable::only(TrendPattern::Declining),
        ..config(1000, 0)
    })
    .unwrap()
    .generate()
    .unwrap();
    assert_eq!(generated.subjects.len(), 1000);

    let n = generated.subjects.len() as f64;
    let first: f64 = generated
        .subjects
        .iter()
        .map(|s| s.sessions[0].memory_accuracy)
        .sum::<f64>()
        / n;
    let last: f64 = generated
        .subjects
        .iter()
        .map(|s| s.sessions[s.len() - 1].memory_accuracy)
        .sum::<f64>()
        / n;

    assert!(last < first, "mean memory did not decline: {first} -> {last}");
}

#[test]
fn test_window_boundary() {
    let assembler = DatasetAssembler::new(config(2, 5)).unwrap();
    let mut subjects = assembler.simulate_subjects().unwrap().0;
    assert_eq!(subjects[0].len(), WINDOW_SIZE);

    subjects[1].sessions.pop();
    let short_id = subjects[1].subject_id.clone();

    let dataset = assembler.assemble(subjects.clone()).unwrap();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset.windows[0].session_ids, vec![1, 2, 3, 4, 5, 6]);
    assert!(!dataset.subject_ids().contains(&short_id.as_str()));
    assert_eq!(dataset.summary.subjects_excluded, 1);
    assert_eq!(dataset.summary.subjects_total, 2);
}

#[test]
fn test_same_seed_reproduces_sessions() {
    let run = || {
        let generated = DatasetAssembler::new(config(50, 1234))
            .unwrap()
            .generate()
            .unwrap();
        serde_json::to_string(&generated.subjects).unwrap()
    };
    assert_eq!(run(), run());

    let sequential = DatasetAssembler::new(GeneratorConfig {
        parallel: false,
        ..config(50, 1234)
    })
    .unwrap()
    .generate()
    .unwrap();
    assert_eq!(serde_json::to_string(&sequential.subjects).unwrap(), run());
}

#[test]
fn test_silent_declining_subject_is_monotone() {
    let profile = SubjectProfile {
        subject_id: "SUB_0001".to_string(),
        pattern: TrendPattern::Declining,
        baseline: BaselineTraits {
            memory: 0.7,
            reaction_ms: 350.0,
            pattern: 6.0,
            language_wpm: 140.0,
        },
    };
    let simulator = SessionSimulator::new(NoiseConfig::silent()).unwrap();
    let mut rng = SmallRng::seed_from_u64(42);

    let sessions = simulator
        .simulate_subject(
            &profile,
            6,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            &TimestampSequencer::new(14, 2),
            &mut rng,
        )
        .unwrap();

    assert_eq!(sessions.len(), 6);
    for pair in sessions.windows(2) {
        assert!(pair[1].memory_accuracy <= pair[0].memory_accuracy);
        assert!(pair[1].date > pair[0].date);
    }
}

#[test]
fn test_external_rows_assemble() {
    let mut ndjson = String::new();
    for (subject, pattern, sessions) in [("EXT-A", "improving", 7), ("EXT-B", "volatile", 4)] {
        for i in 1..=sessions {
            ndjson.push_str(&format!(
                "{{\"subject_id\":\"{subject}\",\"session_id\":{i},\"date\":\"2024-02-{:02}\",\
                 \"memory_accuracy\":0.6,\"reaction_time_ms\":400.0,\"pattern_level\":5.0,\
                 \"language_wpm\":120.0,\"pattern_type\":\"{pattern}\"}}\n",
                i * 3
            ));
        }
    }

    let rows = SessionRowAdapter::parse_ndjson(&ndjson).unwrap();
    let subjects = SessionRowAdapter::group(rows);
    let dataset = DatasetAssembler::new(config(0, 0))
        .unwrap()
        .assemble(subjects)
        .unwrap();

    assert_eq!(dataset.subject_ids(), vec!["EXT-A"]);
    assert_eq!(dataset.labels(), vec![2]);
    assert_eq!(dataset.summary.subjects_excluded, 1);
    assert_eq!(dataset.features_flat().len(), WINDOW_SIZE * FEATURE_COUNT);

    let window = &dataset.windows[0];
    assert_eq!(window.session_ids, vec![2, 3, 4, 5, 6, 7]);
    // Constant metrics: flat slope, full stability
    assert!(window.vectors.iter().all(|v| v.stability == 1.0));
    assert!(window.vectors.iter().all(|v| v.slope == SLOPE_OFFSET));
}

#[test]
fn test_invalid_probability_table_rejected() {
    let result = DatasetAssembler::new(GeneratorConfig {
        patterns: PatternTable {
            stable: 0.5,
            declining: 0.2,
            improving: 0.1,
            volatile: 0.1,
        },
        ..config(1, 1)
    });
    assert!(matches!(result, Err(SynthError::Configuration(_))));
}

#[test]
fn test_out_of_range_rows_never_reach_a_window() {
    let ndjson: String = (1..=6)
        .map(|i| {
            format!(
                "{{\"subject_id\":\"EXT-C\",\"session_id\":{i},\"date\":\"2024-03-{:02}\",\
                 \"memory_accuracy\":1.8,\"reaction_time_ms\":-50.0,\"pattern_level\":40.0,\
                 \"language_wpm\":9000.0,\"pattern_type\":\"stable\"}}\n",
                i * 2
            )
        })
        .collect();
    let err = SessionRowAdapter::parse_ndjson(&ndjson).unwrap_err();
    assert!(matches!(err, SynthError::ParseError(_)));
    assert!(err.to_string().contains("line 1"));

    // Records handed straight to the assembler fail that subject only
    let assembler = DatasetAssembler::new(config(2, 8)).unwrap();
    let mut subjects = assembler.simulate_subjects().unwrap().0;
    subjects[0].sessions[2].memory_accuracy = 1.8;

    let dataset = assembler.assemble(subjects).unwrap();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset.summary.subjects_failed, 1);
    assert!(dataset
        .windows
        .iter()
        .flat_map(|w| w.vectors.iter())
        .all(|v| (0.0..=1.0).contains(&v.memory)));
}

#[test]
fn test_generated_csv_assembles_like_generate() {
    let assembler = DatasetAssembler::new(config(25, 99)).unwrap();
    let batch = assembler.generate().unwrap();

    let csv = SessionRowAdapter::to_csv(&SessionRowAdapter::to_rows(&batch.subjects, false)).unwrap();
    let subjects = SessionRowAdapter::group(SessionRowAdapter::parse_csv(&csv).unwrap());
    let dataset = assembler.assemble(subjects).unwrap();

    assert_eq!(dataset.subject_ids(), batch.dataset.subject_ids());
    assert_eq!(dataset.labels(), batch.dataset.labels());
    assert_eq!(dataset.summary, batch.dataset.summary);
}
