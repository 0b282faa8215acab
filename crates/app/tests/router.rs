mod support;

use std::time::Duration;

use router_app::{AdmissionStage, RouterError};
use router_core::{CacheSettings, InflightStatus, Pricing, cache_key};
use support::{FakeClient, WORKFLOW, model, setup_app, spend_of};

fn names<'a>(
    candidates: impl Iterator<Item = router_app::Result<&'a router_core::Model>>,
) -> Vec<String> {
    candidates
        .map(|candidate| candidate.expect("candidate").name.clone())
        .collect()
}

#[test]
fn budget_exhaustion_falls_back_to_the_next_candidate() {
    let mut model_a = model("a", 10.0, 0.6);
    model_a.routing.spend_ceiling = Some(1.0);
    let model_b = model("b", 1.0, 0.4);
    let test_app = setup_app(vec![model_a, model_b]);
    let client = FakeClient::new();
    let router = test_app.app.router(client.clone());

    let first = router
        .generate(WORKFLOW, None, "first prompt", 0.0, 64)
        .expect("first");
    assert_eq!(first.model_name, "a");
    assert!(first.failed_attempts.is_empty());
    assert!((spend_of(&test_app.app, "a") - 0.6).abs() < 1e-9);

    let second = router
        .generate(WORKFLOW, None, "second prompt", 0.0, 64)
        .expect("second");
    assert_eq!(second.model_name, "b");
    assert_eq!(second.failed_attempts.len(), 1);
    assert_eq!(second.failed_attempts[0].model_name, "a");
    assert_eq!(second.failed_attempts[0].kind, "budget_exhausted");
    assert_eq!(spend_of(&test_app.app, "a"), 1.0);
    assert!((spend_of(&test_app.app, "b") - 0.4).abs() < 1e-9);

    let third = router
        .generate(WORKFLOW, None, "third prompt", 0.0, 64)
        .expect("third");
    assert_eq!(third.model_name, "b");
    assert!(third.failed_attempts.is_empty());
    assert_eq!(client.calls(), 3);
    assert_eq!(spend_of(&test_app.app, "a"), 1.0);
}

#[test]
fn pre_check_rejects_without_calling_the_client() {
    let mut expensive = model("expensive", 1.0, 2.0);
    expensive.routing.spend_ceiling = Some(1.0);
    let test_app = setup_app(vec![expensive.clone()]);
    let client = FakeClient::new();
    let router = test_app.app.router(client.clone());

    let err = router
        .execute_generation(WORKFLOW, &expensive, "prompt", 0.0, 64)
        .expect_err("over budget");
    assert!(matches!(
        err,
        RouterError::BudgetExhausted {
            stage: AdmissionStage::PreCheck,
            ..
        }
    ));
    assert_eq!(client.calls(), 0);
    assert_eq!(spend_of(&test_app.app, "expensive"), 1.0);
}

#[test]
fn post_check_clamps_spend_and_fails_the_flight() {
    let mut wordy = model("wordy", 1.0, 0.5);
    wordy.routing.spend_ceiling = Some(1.0);
    wordy.pricing = Pricing {
        per_call: 0.5,
        prompt_per_1k: None,
        completion_per_1k: Some(1_000.0),
    };
    let test_app = setup_app(vec![wordy.clone()]);
    let client = FakeClient::new().with_output("abcd");
    let router = test_app.app.router(client.clone());

    let err = router
        .execute_generation(WORKFLOW, &wordy, "prompt", 0.0, 64)
        .expect_err("post-check");
    assert!(matches!(
        err,
        RouterError::BudgetExhausted {
            stage: AdmissionStage::PostCheck,
            ..
        }
    ));
    assert_eq!(client.calls(), 1);
    assert_eq!(spend_of(&test_app.app, "wordy"), 1.0);

    let key = cache_key("wordy", WORKFLOW, "prompt", 0.0, 64);
    let record = test_app
        .app
        .ledger()
        .transaction(|tx| tx.get_inflight(&key))
        .expect("load")
        .expect("present");
    assert_eq!(record.status, InflightStatus::Error);
    assert!(record.completed_at.is_none());
}

#[test]
fn client_errors_advance_to_the_next_candidate() {
    let flaky = model("flaky", 5.0, 0.1);
    let steady = model("steady", 1.0, 0.1);
    let test_app = setup_app(vec![flaky, steady]);
    let client = FakeClient::new().failing_for("flaky");
    let router = test_app.app.router(client.clone());

    let routed = router
        .generate(WORKFLOW, None, "hello", 0.2, 32)
        .expect("fallback");
    assert_eq!(routed.model_name, "steady");
    assert_eq!(routed.outcome.output, "steady-id says: hello");
    assert_eq!(routed.failed_attempts.len(), 1);
    assert_eq!(routed.failed_attempts[0].kind, "client_error");
    assert_eq!(spend_of(&test_app.app, "flaky"), 0.0);

    let key = cache_key("flaky", WORKFLOW, "hello", 0.2, 32);
    let record = test_app
        .app
        .ledger()
        .transaction(|tx| tx.get_inflight(&key))
        .expect("load")
        .expect("present");
    assert_eq!(record.status, InflightStatus::Error);
    assert!(record.error.unwrap_or_default().contains("unavailable"));
}

#[test]
fn exhausting_every_candidate_reports_no_candidates() {
    let test_app = setup_app(vec![model("a", 1.0, 0.0), model("b", 1.0, 0.0)]);
    let router = test_app
        .app
        .router(FakeClient::new().failing_for("a").failing_for("b"));

    let err = router
        .generate(WORKFLOW, None, "hello", 0.0, 16)
        .expect_err("all fail");
    match err {
        RouterError::NoCandidates {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert!(last_error.expect("last error").contains("a-id is unavailable"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn slow_model_is_excluded_until_latency_recovers() {
    let mut slow = model("slow", 10.0, 0.1);
    slow.routing.latency_threshold_ms = Some(20.0);
    let fast = model("fast", 1.0, 0.1);
    let test_app = setup_app(vec![slow.clone(), fast]);
    let router = test_app
        .app
        .router(FakeClient::new().with_delay(Duration::from_millis(60)));

    let err = router
        .execute_generation(WORKFLOW, &slow, "prompt", 0.0, 16)
        .expect_err("too slow");
    assert_eq!(err.kind(), "latency_exceeded");
    assert_eq!(spend_of(&test_app.app, "slow"), 0.0);
    assert_eq!(names(router.iter_candidates(WORKFLOW, None)), vec!["fast"]);
    assert_eq!(
        names(router.iter_candidates(WORKFLOW, Some("slow"))),
        vec!["fast"]
    );

    test_app
        .app
        .ledger()
        .transaction(|tx| tx.set_latency("slow", 5.0, chrono::Utc::now()))
        .expect("record fast call");
    assert_eq!(
        names(router.iter_candidates(WORKFLOW, None)),
        vec!["slow", "fast"]
    );
}

#[test]
fn candidates_put_the_hint_first_then_weight_and_name() {
    let mut light = model("a", 1.0, 0.0);
    light
        .routing
        .workflows
        .insert("batch".to_string(), router_core::RoutingOverride {
            weight: Some(50.0),
            ..Default::default()
        });
    let test_app = setup_app(vec![light, model("b", 5.0, 0.0), model("c", 5.0, 0.0)]);
    let router = test_app.app.router(FakeClient::new());

    assert_eq!(
        names(router.iter_candidates(WORKFLOW, None)),
        vec!["c", "b", "a"]
    );
    assert_eq!(
        names(router.iter_candidates(WORKFLOW, Some("a"))),
        vec!["a", "c", "b"]
    );
    assert_eq!(
        names(router.iter_candidates(WORKFLOW, Some("missing"))),
        vec!["c", "b", "a"]
    );
    assert_eq!(
        names(router.iter_candidates("batch", None)),
        vec!["a", "c", "b"]
    );
}

#[test]
fn cached_generation_skips_the_client() {
    let mut cached = model("cached", 1.0, 0.25);
    cached.routing.cache = CacheSettings::enabled();
    let test_app = setup_app(vec![cached.clone()]);
    let client = FakeClient::new();
    let router = test_app.app.router(client.clone());

    let first = router
        .execute_generation(WORKFLOW, &cached, "prompt", 0.7, 128)
        .expect("first");
    let second = router
        .execute_generation(WORKFLOW, &cached, "prompt", 0.7, 128)
        .expect("second");
    assert_eq!(first, second);
    assert_eq!(client.calls(), 1);
    assert_eq!(spend_of(&test_app.app, "cached"), 0.25);

    router
        .execute_generation(WORKFLOW, &cached, "prompt", 0.2, 128)
        .expect("different temperature");
    assert_eq!(client.calls(), 2);
}

#[test]
fn cache_evicts_the_oldest_entry_at_capacity() {
    let mut cached = model("cached", 1.0, 0.0);
    cached.routing.cache = CacheSettings {
        enabled: true,
        ttl_seconds: 3_600,
        max_entries: 2,
    };
    let test_app = setup_app(vec![cached.clone()]);
    let router = test_app.app.router(FakeClient::new());

    for prompt in ["one", "two", "three"] {
        router
            .execute_generation(WORKFLOW, &cached, prompt, 0.0, 16)
            .expect("generate");
    }

    let ledger = test_app.app.ledger();
    let size = ledger
        .transaction(|tx| tx.cache_size("cached"))
        .expect("size");
    assert_eq!(size, 2);
    let oldest = ledger
        .transaction(|tx| tx.get_cache_entry(&cache_key("cached", WORKFLOW, "one", 0.0, 16)))
        .expect("load");
    assert!(oldest.is_none());
    let newest = ledger
        .transaction(|tx| tx.get_cache_entry(&cache_key("cached", WORKFLOW, "three", 0.0, 16)))
        .expect("load")
        .expect("present");
    assert_eq!(newest.output, "cached-id says: three");
}
