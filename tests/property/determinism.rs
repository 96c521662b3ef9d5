//! Property-based tests for change detection and queue guarantees

use async_trait::async_trait;
use coursegen::error::ApiError;
use coursegen::generation::{
    fingerprint, GenerationConfig, Orchestrator, RequestContext, TaskGenerateRequest,
    TaskGenerateResponse, TaskGenerator,
};
use coursegen::types::{PlanStep, StepNumber, TaskKind, Video};
use proptest::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn plan_step(step: i64, title: String, description: String, kind: TaskKind, difficulty: String) -> PlanStep {
    PlanStep {
        step,
        title,
        description,
        kind,
        difficulty,
        search_keyword: None,
        videos: Vec::new(),
        stage: None,
    }
}

fn kind_strategy() -> impl Strategy<Value = TaskKind> {
    prop_oneof![Just(TaskKind::Quiz), Just(TaskKind::Coding)]
}

/// Same generation-relevant fields always give the same fingerprint
#[test]
fn test_fingerprint_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                any::<String>(),
                any::<String>(),
                kind_strategy(),
                "[a-z]{0,12}",
                1i64..10_000,
                1i64..10_000,
            ),
            |(title, description, kind, difficulty, first, second)| {
                let a = plan_step(first, title.clone(), description.clone(), kind, difficulty.clone());
                let mut b = plan_step(second, title, description, kind, difficulty);
                b.videos.push(Video {
                    title: "Walkthrough".to_string(),
                    url: "https://video.example.com/1".to_string(),
                    cover: String::new(),
                    duration: "10:00".to_string(),
                });
                b.stage = Some("fundamentals".to_string());
                b.search_keyword = Some("anything".to_string());

                // Step number, videos, stage and keyword do not take part.
                prop_assert_eq!(fingerprint(&a), fingerprint(&b));
                prop_assert_eq!(fingerprint(&a).as_str().len(), 16);
                Ok(())
            },
        )
        .unwrap();
}

proptest! {
    #[test]
    fn test_title_change_changes_fingerprint(
        title in "[A-Za-z ]{1,24}",
        suffix in "[A-Za-z]{1,8}",
        description in ".{0,40}",
    ) {
        let original = plan_step(1, title.clone(), description.clone(), TaskKind::Quiz, "beginner".to_string());
        let edited = plan_step(1, format!("{}{}", title, suffix), description, TaskKind::Quiz, "beginner".to_string());
        prop_assert_ne!(fingerprint(&original), fingerprint(&edited));
    }

    #[test]
    fn test_kind_change_changes_fingerprint(title in "[A-Za-z ]{1,24}") {
        let quiz = plan_step(1, title.clone(), String::new(), TaskKind::Quiz, "beginner".to_string());
        let coding = plan_step(1, title, String::new(), TaskKind::Coding, "beginner".to_string());
        prop_assert_ne!(fingerprint(&quiz), fingerprint(&coding));
    }

    #[test]
    fn test_non_positive_step_numbers_rejected(raw in i64::MIN..=0) {
        prop_assert!(matches!(StepNumber::new(raw), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_positive_step_numbers_accepted(raw in 1i64..=u32::MAX as i64) {
        prop_assert_eq!(StepNumber::new(raw).unwrap().get() as i64, raw);
    }

    #[test]
    fn test_backoff_is_monotone_and_capped(
        base in 1u64..5_000,
        multiplier in 1.0f64..4.0,
        extra in 0u64..60_000,
    ) {
        let config = GenerationConfig {
            max_concurrency: 1,
            max_retries: 10,
            base_delay_ms: base,
            backoff_multiplier: multiplier,
            max_delay_ms: base + extra,
        };
        prop_assert!(config.validate().is_ok());

        let cap = Duration::from_millis(base + extra);
        let mut previous = Duration::ZERO;
        for retry in 1..=10 {
            let delay = config.backoff_delay(retry);
            prop_assert!(delay >= previous);
            prop_assert!(delay <= cap);
            previous = delay;
        }
        prop_assert_eq!(config.backoff_delay(1), Duration::from_millis(base));
    }
}

/// Generator tracking how many calls overlap
#[derive(Default)]
struct CountingGenerator {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl TaskGenerator for CountingGenerator {
    async fn generate(
        &self,
        request: TaskGenerateRequest,
    ) -> Result<TaskGenerateResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50 + request.step.get() as u64 % 7 * 10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(TaskGenerateResponse {
            success: true,
            task: Some(json!({ "step": request.step })),
            error: None,
        })
    }
}

/// In-flight calls never exceed the configured cap, and every step completes
#[test]
fn test_concurrency_cap_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(24));

    runner
        .run(&(1usize..6, 1i64..25), |(cap, steps)| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let (peak, calls, completed) = runtime.block_on(async {
                let generator = Arc::new(CountingGenerator::default());
                let config = GenerationConfig {
                    max_concurrency: cap,
                    max_retries: 0,
                    base_delay_ms: 10,
                    backoff_multiplier: 2.0,
                    max_delay_ms: 100,
                };
                let orchestrator =
                    Orchestrator::new(config, generator.clone(), RequestContext::default()).unwrap();
                for n in 1..=steps {
                    orchestrator
                        .on_step_arrived(plan_step(
                            n,
                            format!("Topic {}", n),
                            String::new(),
                            TaskKind::Coding,
                            "beginner".to_string(),
                        ))
                        .unwrap();
                }
                let stats = orchestrator
                    .wait_until_idle(Some(Duration::from_secs(600)))
                    .await
                    .unwrap();
                (
                    generator.peak.load(Ordering::SeqCst),
                    generator.calls.load(Ordering::SeqCst),
                    stats.completed,
                )
            });

            prop_assert!(peak <= cap);
            prop_assert_eq!(peak, cap.min(steps as usize));
            prop_assert_eq!(calls, steps as usize);
            prop_assert_eq!(completed, steps as usize);
            Ok(())
        })
        .unwrap();
}
