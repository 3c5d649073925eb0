use approx::assert_abs_diff_eq;
use habitnet::{
    Example, MetaLearnOutcome, MetaLearner, MetaLearningConfig, ModelError, NetworkShape,
    ParameterCodec, Task,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Test fixture: a habit whose targets follow its first two features
fn synthetic_task(id: usize, examples: usize, rng: &mut StdRng) -> Task {
    let bias = id as f32 * 0.05;
    let examples = (0..examples)
        .map(|_| {
            let features: Vec<f32> = (0..10).map(|_| rng.random_range(0.0..1.0)).collect();
            let target = vec![
                (features[0] * 0.8 + bias).min(1.0),
                features[1],
                1.0 - features[0],
            ];
            Example::new(features, target)
        })
        .collect();
    Task::new(format!("habit-{}", id), examples)
}

fn learner(seed: u64) -> MetaLearner {
    let mut rng = StdRng::seed_from_u64(seed);
    MetaLearner::new(MetaLearningConfig::default(), &mut rng).unwrap()
}

#[test]
fn test_four_tasks_fail_and_leave_parameters_untouched() {
    let mut rng = StdRng::seed_from_u64(100);
    let mut learner = learner(1);
    let tasks: Vec<Task> = (0..4).map(|i| synthetic_task(i, 20, &mut rng)).collect();
    let before = ParameterCodec::serialize(learner.parameters());

    let outcome = learner.meta_learn(&tasks, &mut rng);

    assert!(!outcome.is_success());
    assert!(matches!(
        outcome,
        MetaLearnOutcome::InsufficientTasks {
            provided: 4,
            required: 5
        }
    ));
    assert_eq!(ParameterCodec::serialize(learner.parameters()), before);
}

#[test]
fn test_trailing_partial_batch_is_dropped() {
    let mut rng = StdRng::seed_from_u64(101);
    let mut learner = learner(2);
    let tasks: Vec<Task> = (0..12).map(|i| synthetic_task(i, 10, &mut rng)).collect();

    match learner.meta_learn(&tasks, &mut rng) {
        MetaLearnOutcome::Completed {
            batches,
            tasks_used,
            tasks_skipped,
            mean_query_loss,
        } => {
            assert_eq!(batches, 2);
            assert_eq!(tasks_used, 10);
            assert_eq!(tasks_skipped, 0);
            assert!(mean_query_loss.is_finite());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(learner.meta_learning_progress().get(), 1.0);
    assert!(learner.parameters().is_finite());
}

#[test]
fn test_meta_learning_changes_shared_parameters() {
    let mut rng = StdRng::seed_from_u64(102);
    let mut learner = learner(3);
    let tasks: Vec<Task> = (0..5).map(|i| synthetic_task(i, 15, &mut rng)).collect();
    let before = learner.parameters().clone();

    assert!(learner.meta_learn(&tasks, &mut rng).is_success());
    assert_ne!(learner.parameters(), &before);
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let run = || {
        let mut rng = StdRng::seed_from_u64(77);
        let tasks: Vec<Task> = (0..10).map(|i| synthetic_task(i, 12, &mut rng)).collect();
        let mut learner = MetaLearner::new(MetaLearningConfig::default(), &mut rng).unwrap();
        learner.meta_learn(&tasks, &mut rng);
        ParameterCodec::serialize(learner.parameters())
    };
    assert_eq!(run(), run());
}

#[test]
fn test_meta_learning_repeated_stays_finite() {
    let mut rng = StdRng::seed_from_u64(103);
    let mut learner = learner(4);
    let tasks: Vec<Task> = (0..10).map(|i| synthetic_task(i, 20, &mut rng)).collect();
    for _ in 0..20 {
        assert!(learner.meta_learn(&tasks, &mut rng).is_success());
    }
    assert!(learner.parameters().is_finite());
}

#[test]
fn test_adapt_with_two_examples_returns_shared_clone() {
    let mut rng = StdRng::seed_from_u64(104);
    let learner = learner(5);
    let task = synthetic_task(0, 2, &mut rng);

    let adapted = learner.adapt_to_habit(&task).unwrap();

    for (a, b) in adapted
        .input_to_hidden()
        .iter()
        .zip(learner.parameters().input_to_hidden().iter())
    {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-7);
    }
    assert_eq!(&adapted, learner.parameters());
}

#[test]
fn test_adaptation_fits_the_habit_without_touching_shared() {
    let mut rng = StdRng::seed_from_u64(105);
    let learner = learner(6);
    let task = synthetic_task(3, 30, &mut rng);
    let shared_before = ParameterCodec::serialize(learner.parameters());
    let progress = learner.adaptation_progress();

    let adapted = learner.adapt_to_habit(&task).unwrap();

    assert_eq!(ParameterCodec::serialize(learner.parameters()), shared_before);
    assert_eq!(progress.get(), 1.0);
    assert!(
        learner.evaluate(&task.examples, &adapted)
            < learner.evaluate(&task.examples, learner.parameters())
    );
}

#[test]
fn test_adapt_rejects_mismatched_target() {
    let learner = learner(7);
    let examples = (0..4)
        .map(|_| Example::new(vec![0.5; 10], vec![1.0]))
        .collect();
    assert!(learner.adapt_to_habit(&Task::new("bad", examples)).is_err());
}

#[test]
fn test_predict_batch_matches_predict() {
    let mut rng = StdRng::seed_from_u64(106);
    let learner = learner(8);
    let task = synthetic_task(1, 16, &mut rng);
    let features: Vec<_> = task.examples.iter().map(|e| e.features.clone()).collect();

    let batch = learner.predict_batch(&features, learner.parameters());
    assert_eq!(batch.len(), features.len());
    for (f, out) in features.iter().zip(batch.iter()) {
        assert_eq!(&learner.predict(f, learner.parameters()), out);
    }
}

#[test]
fn test_custom_shape_learner() {
    let config = MetaLearningConfig {
        shape: NetworkShape::new(2, 2, 1),
        ..MetaLearningConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(107);
    let mut learner = MetaLearner::new(config, &mut rng).unwrap();
    let tasks: Vec<Task> = (0..5)
        .map(|i| {
            let examples = (0..6)
                .map(|j| {
                    let x = (i * 6 + j) as f32 / 30.0;
                    Example::new(vec![x, 1.0 - x], vec![x])
                })
                .collect();
            Task::new(format!("t{}", i), examples)
        })
        .collect();
    assert!(learner.meta_learn(&tasks, &mut rng).is_success());
}

#[test]
fn test_config_allowing_single_example_tasks_is_rejected() {
    let config = MetaLearningConfig {
        min_task_examples: 1,
        ..MetaLearningConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(108);
    assert!(matches!(
        MetaLearner::new(config.clone(), &mut rng),
        Err(ModelError::InvalidInput { .. })
    ));

    let shared = learner(9).into_parameters();
    assert!(MetaLearner::with_parameters(config, shared).is_err());
}

#[test]
fn test_single_example_tasks_are_skipped_with_default_config() {
    let mut rng = StdRng::seed_from_u64(109);
    let mut learner = learner(10);
    let tasks: Vec<Task> = (0..5).map(|i| synthetic_task(i, 1, &mut rng)).collect();

    assert!(matches!(
        learner.meta_learn(&tasks, &mut rng),
        MetaLearnOutcome::Completed {
            tasks_used: 0,
            tasks_skipped: 5,
            ..
        }
    ));
}

#[test]
fn test_meta_learning_progress_tracks_each_batch() {
    // Four meta-batches; a malformed task in batch k stops the run after k
    // batches, exposing the progress value reached at that point.
    for failing_batch in 1..4 {
        let mut rng = StdRng::seed_from_u64(110);
        let mut learner = learner(11);
        let mut tasks: Vec<Task> = (0..20).map(|i| synthetic_task(i, 8, &mut rng)).collect();
        tasks[failing_batch * 5].examples[0] = Example::new(vec![0.5; 10], vec![1.0]);

        let outcome = learner.meta_learn(&tasks, &mut rng);
        match outcome {
            MetaLearnOutcome::Failed {
                batches_applied, ..
            } => assert_eq!(batches_applied, failing_batch),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            learner.meta_learning_progress().get(),
            failing_batch as f32 / 4.0
        );
    }
}
