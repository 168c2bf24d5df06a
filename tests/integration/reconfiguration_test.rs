// Integration tests for options replacement: pending marking, debounce,
// frame-aligned reprocessing and convergence of in-flight renders

use super::test_harness::{options_with_text, Harness};
use live_watermark::config::{Advanced, InstallMode, Options, Timing};
use live_watermark::document::{
    CACHED_SRCSET_ATTRIBUTE, CACHED_SRC_ATTRIBUTE, PARSE_STATE_ATTRIBUTE,
};
use live_watermark::error::ConfigError;
use live_watermark::orchestrator::{Dispatch, ParseState, SkipReason};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_reconfigure_rerenders_from_original() {
    let h = Harness::new();
    let image = h.image("photo.jpg", 300, 300);
    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    let generation = h.orchestrator.set_options(options_with_text("Draft")).unwrap();
    assert_eq!(generation, 1);
    assert_eq!(h.orchestrator.state(image), ParseState::Pending);
    assert_eq!(h.attr(image, PARSE_STATE_ATTRIBUTE).as_deref(), Some("pending"));
    assert_eq!(
        h.orchestrator.process(image, false),
        Dispatch::Skipped(SkipReason::AwaitingReconfiguration)
    );

    h.settle().await;

    assert_eq!(h.attr(image, "src").as_deref(), Some("Draft|photo.jpg"));
    assert_eq!(h.attr(image, CACHED_SRC_ATTRIBUTE).as_deref(), Some("photo.jpg"));
    assert_eq!(h.orchestrator.state(image), ParseState::Parsed);
    assert_eq!(h.renderer.sources(), vec!["photo.jpg", "photo.jpg"]);
}

#[tokio::test(start_paused = true)]
async fn test_cache_survives_repeated_reconfiguration() {
    let h = Harness::new();
    let image = h.srcset_image("fallback.jpg", "a.jpg 1x, b.jpg 2x", 300, 300);
    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    for text in ["One", "Two", "Three"] {
        h.orchestrator.set_options(options_with_text(text)).unwrap();
        h.settle().await;
    }

    assert_eq!(
        h.attr(image, CACHED_SRCSET_ATTRIBUTE).as_deref(),
        Some("a.jpg 1x, b.jpg 2x")
    );
    assert_eq!(
        h.attr(image, "srcset").as_deref(),
        Some("Three|a.jpg 1x, Three|b.jpg 2x")
    );
    assert!(h
        .renderer
        .sources()
        .iter()
        .all(|s| s == "a.jpg" || s == "b.jpg"));
    assert_eq!(h.orchestrator.generation(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_changes_reprocesses_once() {
    let h = Harness::new();
    let image = h.image("photo.jpg", 300, 300);
    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;
    assert_eq!(h.renderer.call_count(), 1);

    h.orchestrator.set_options(options_with_text("A")).unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    h.orchestrator.set_options(options_with_text("B")).unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    h.orchestrator.set_options(options_with_text("C")).unwrap();

    // The timer restarts with every call
    tokio::time::sleep(Duration::from_millis(1999)).await;
    assert_eq!(h.renderer.call_count(), 1);
    assert_eq!(h.orchestrator.state(image), ParseState::Pending);

    h.settle().await;
    assert_eq!(h.renderer.call_count(), 2);
    assert_eq!(h.renderer.calls()[1].text, "C");
    assert_eq!(h.attr(image, "src").as_deref(), Some("C|photo.jpg"));
    assert_eq!(h.orchestrator.metrics().snapshot().reconfigurations, 3);
}

#[tokio::test(start_paused = true)]
async fn test_reprocessing_is_frame_aligned() {
    let h = Harness::new();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        h.image(name, 300, 300);
    }
    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    h.orchestrator.set_options(options_with_text("Framed")).unwrap();
    h.settle().await;

    let calls = h.renderer.calls();
    assert_eq!(calls.len(), 6);
    let reprocessed = &calls[3..];
    assert_eq!(
        reprocessed.iter().map(|c| c.source.as_str()).collect::<Vec<_>>(),
        vec!["a.jpg", "b.jpg", "c.jpg"]
    );
    for pair in reprocessed.windows(2) {
        assert_eq!(pair[1].started - pair[0].started, Duration::from_millis(16));
    }
}

#[tokio::test(start_paused = true)]
async fn test_change_during_first_render_converges() {
    let h = Harness::new();
    let image = h.image("photo.jpg", 300, 300);
    h.renderer.delay("photo.jpg", Duration::from_millis(500));

    h.orchestrator.bootstrap(InstallMode::Live);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.orchestrator.state(image), ParseState::Parsing);

    h.orchestrator.set_options(options_with_text("Fresh")).unwrap();
    h.settle().await;

    // The stale result was never written
    assert_eq!(h.attr(image, "src").as_deref(), Some("Fresh|photo.jpg"));
    assert_eq!(h.attr(image, CACHED_SRC_ATTRIBUTE).as_deref(), Some("photo.jpg"));
    let texts: Vec<String> = h.renderer.calls().into_iter().map(|c| c.text).collect();
    assert_eq!(texts, vec!["Copyright", "Fresh"]);
    assert_eq!(h.orchestrator.metrics().snapshot().renders_restarted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_newer_run_supersedes_older_one() {
    let h = Harness::new();
    let image = h.image("photo.jpg", 300, 300);
    h.renderer.delay("photo.jpg", Duration::from_millis(3000));

    h.orchestrator.bootstrap(InstallMode::Live);
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.orchestrator.set_options(options_with_text("Fresh")).unwrap();

    // The debounced reprocess starts a second run while the first is in flight
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.renderer.call_count(), 2);
    assert_eq!(h.orchestrator.state(image), ParseState::Parsing);

    h.settle().await;
    assert_eq!(h.attr(image, "src").as_deref(), Some("Fresh|photo.jpg"));
    let metrics = h.orchestrator.metrics().snapshot();
    assert_eq!(metrics.renders_superseded, 1);
    assert_eq!(metrics.renders_succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_options_are_rejected() {
    let h = Harness::new();
    let image = h.image("photo.jpg", 300, 300);
    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    let result = h.orchestrator.set_options(Options {
        opacity: 101.0,
        ..Options::default()
    });

    assert!(matches!(result, Err(ConfigError::Invalid(_))));
    assert_eq!(h.orchestrator.generation(), 0);
    assert_eq!(h.orchestrator.state(image), ParseState::Parsed);
    h.settle().await;
    assert_eq!(h.renderer.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_image_below_new_minimum_stays_pending() {
    let h = Harness::new();
    let image = h.image("photo.jpg", 300, 300);
    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    h.orchestrator
        .set_options(Options {
            advanced: Advanced {
                min_width: 500,
                ..Advanced::default()
            },
            ..Options::default()
        })
        .unwrap();
    h.settle().await;

    assert_eq!(h.orchestrator.state(image), ParseState::Pending);
    assert_eq!(h.attr(image, "src").as_deref(), Some("Copyright|photo.jpg"));
    assert_eq!(h.renderer.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_scheduled_reprocess() {
    let h = Harness::with(
        Options::default(),
        Timing {
            reconfigure_delay_ms: 500,
            ..Timing::default()
        },
    );
    let image = h.image("photo.jpg", 300, 300);
    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    h.orchestrator.set_options(options_with_text("Never")).unwrap();
    h.orchestrator.shutdown();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(h.orchestrator.is_idle());
    assert_eq!(h.renderer.call_count(), 1);
    assert_eq!(h.orchestrator.state(image), ParseState::Pending);
}
