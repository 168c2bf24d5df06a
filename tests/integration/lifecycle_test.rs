// Integration tests for the per-image lifecycle: eligibility, rendering,
// write-back and the attribute cache

use super::test_harness::{Harness, ScriptedRenderer};
use live_watermark::config::{Advanced, InstallMode, Options, Timing};
use live_watermark::document::{
    Dimensions, Document, MemoryDocument, CACHED_SRCSET_ATTRIBUTE, CACHED_SRC_ATTRIBUTE,
    MODE_ATTRIBUTE, PARSE_STATE_ATTRIBUTE,
};
use live_watermark::orchestrator::{Dispatch, Orchestrator, ParseState, SkipReason};
use live_watermark::watermark::AttributeKind;
use rstest::rstest;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_eligible_image_is_watermarked() {
    let options: Options = serde_json::from_str(
        r#"{
            "text": "X",
            "position": "bottom-right",
            "opacity": 50,
            "advanced": { "minWidth": 50, "minHeight": 50 }
        }"#,
    )
    .unwrap();
    let h = Harness::with(options, Timing::default());
    let image = h.image("photo.jpg", 200, 200);

    assert!(h.orchestrator.bootstrap(InstallMode::Live));
    assert_eq!(h.orchestrator.state(image), ParseState::Parsing);
    h.settle().await;

    assert_eq!(h.attr(image, "src").as_deref(), Some("X|photo.jpg"));
    assert_eq!(h.attr(image, CACHED_SRC_ATTRIBUTE).as_deref(), Some("photo.jpg"));
    assert_eq!(h.attr(image, PARSE_STATE_ATTRIBUTE).as_deref(), Some("parsed"));
    assert_eq!(h.orchestrator.state(image), ParseState::Parsed);
    assert_eq!(
        h.orchestrator.cached_original(image, AttributeKind::Src).as_deref(),
        Some("photo.jpg")
    );
    assert_eq!(
        h.attr(h.document.body(), MODE_ATTRIBUTE).as_deref(),
        Some("live")
    );

    let metrics = h.orchestrator.metrics().snapshot();
    assert_eq!(metrics.renders_started, 1);
    assert_eq!(metrics.renders_succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_parsed_image_is_never_rerendered() {
    let h = Harness::new();
    let image = h.image("photo.jpg", 200, 200);
    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    assert_eq!(h.orchestrator.scan(), 0);
    assert_eq!(
        h.orchestrator.process(image, false),
        Dispatch::Skipped(SkipReason::AlreadyParsed)
    );
    assert_eq!(
        h.orchestrator.process(image, true),
        Dispatch::Skipped(SkipReason::AlreadyParsed)
    );
    h.settle().await;

    assert_eq!(h.renderer.call_count(), 1);
    assert_eq!(h.attr(image, "src").as_deref(), Some("Copyright|photo.jpg"));
}

#[rstest]
#[case(99, 200)]
#[case(200, 99)]
#[case(50, 50)]
#[tokio::test(start_paused = true)]
async fn test_small_images_are_left_alone(#[case] width: u32, #[case] height: u32) {
    let h = Harness::new();
    let image = h.image("icon.png", width, height);

    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    assert_eq!(
        h.orchestrator.process(image, true),
        Dispatch::Skipped(SkipReason::TooSmall)
    );
    assert_eq!(h.orchestrator.state(image), ParseState::Unset);
    assert_eq!(
        h.document.attributes(image),
        BTreeMap::from([("src".to_string(), "icon.png".to_string())])
    );
    assert_eq!(h.renderer.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_minimum_size_is_inclusive() {
    let h = Harness::new();
    let image = h.image("exact.jpg", 100, 100);
    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    assert_eq!(h.orchestrator.state(image), ParseState::Parsed);
}

#[tokio::test(start_paused = true)]
async fn test_srcset_candidates_are_rewritten_in_order() {
    let h = Harness::new();
    let image = h.srcset_image("fallback.jpg", "a.jpg 1x, b.jpg 2x", 400, 300);
    // The first candidate finishes last
    h.renderer.delay("a.jpg", Duration::from_millis(50));
    h.renderer.delay("b.jpg", Duration::from_millis(5));

    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    assert_eq!(
        h.attr(image, "srcset").as_deref(),
        Some("Copyright|a.jpg 1x, Copyright|b.jpg 2x")
    );
    assert_eq!(
        h.attr(image, CACHED_SRCSET_ATTRIBUTE).as_deref(),
        Some("a.jpg 1x, b.jpg 2x")
    );
    assert_eq!(h.attr(image, "src").as_deref(), Some("fallback.jpg"));
    assert_eq!(h.attr(image, CACHED_SRC_ATTRIBUTE), None);
    assert_eq!(h.orchestrator.state(image), ParseState::Parsed);
}

#[tokio::test(start_paused = true)]
async fn test_srcset_candidates_render_concurrently() {
    let h = Harness::new();
    h.srcset_image("fallback.jpg", "a.jpg 1x, b.jpg 2x, c.jpg 3x", 400, 300);
    for source in ["a.jpg", "b.jpg", "c.jpg"] {
        h.renderer.delay(source, Duration::from_millis(100));
    }

    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    let calls = h.renderer.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.started == calls[0].started));
}

#[tokio::test(start_paused = true)]
async fn test_failed_candidate_fails_whole_image() {
    let h = Harness::new();
    let image = h.srcset_image("fallback.jpg", "a.jpg 1x, bad.jpg 2x", 400, 300);
    h.renderer.fail("bad.jpg");

    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    assert_eq!(h.orchestrator.state(image), ParseState::Error);
    assert_eq!(h.attr(image, PARSE_STATE_ATTRIBUTE).as_deref(), Some("error"));
    assert_eq!(h.attr(image, "srcset").as_deref(), Some("a.jpg 1x, bad.jpg 2x"));
    assert_eq!(h.attr(image, CACHED_SRCSET_ATTRIBUTE), None);
    assert_eq!(h.orchestrator.metrics().snapshot().renders_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_errored_image_is_retried_on_next_scan() {
    let h = Harness::new();
    let image = h.image("broken.jpg", 300, 300);
    h.renderer.fail("broken.jpg");

    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;
    assert_eq!(h.orchestrator.state(image), ParseState::Error);
    assert_eq!(h.attr(image, "src").as_deref(), Some("broken.jpg"));

    h.image("other.jpg", 300, 300);
    h.settle().await;

    assert_eq!(
        h.renderer.sources(),
        vec!["broken.jpg", "broken.jpg", "other.jpg"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_src_is_an_error() {
    let h = Harness::new();
    let image = h.image("", 300, 300);

    h.orchestrator.bootstrap(InstallMode::Live);
    h.settle().await;

    assert_eq!(h.orchestrator.state(image), ParseState::Error);
    assert_eq!(h.renderer.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_container_is_a_no_op() {
    let h = Harness::with(
        Options {
            advanced: Advanced {
                location: "#gallery".to_string(),
                ..Advanced::default()
            },
            ..Options::default()
        },
        Timing::default(),
    );
    let image = h.image("photo.jpg", 300, 300);

    assert!(!h.orchestrator.bootstrap(InstallMode::Preview));
    h.settle().await;

    assert_eq!(
        h.attr(h.document.body(), MODE_ATTRIBUTE).as_deref(),
        Some("preview")
    );
    assert_eq!(h.orchestrator.container(), None);
    assert_eq!(h.orchestrator.state(image), ParseState::Unset);
    assert_eq!(h.renderer.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_only_images_inside_container_are_processed() {
    let document = Arc::new(MemoryDocument::new());
    let gallery = document.create_element("section");
    document.set_attribute(gallery, "id", "gallery");
    document.append_child(document.body(), gallery);

    let inside = document.create_image("inside.jpg", Dimensions::new(300, 300));
    document.append_child(gallery, inside);
    let outside = document.create_image("outside.jpg", Dimensions::new(300, 300));
    document.append_child(document.body(), outside);

    let renderer = ScriptedRenderer::new();
    let orchestrator = Orchestrator::new(
        document.clone(),
        renderer.clone(),
        Options {
            advanced: Advanced {
                location: "section#gallery".to_string(),
                ..Advanced::default()
            },
            ..Options::default()
        },
        Timing::default(),
    );

    assert!(orchestrator.bootstrap(InstallMode::Live));
    assert_eq!(orchestrator.container(), Some(gallery));
    assert!(orchestrator.wait_idle(Duration::from_secs(1)).await);

    assert_eq!(orchestrator.state(inside), ParseState::Parsed);
    assert_eq!(orchestrator.state(outside), ParseState::Unset);
    assert_eq!(renderer.sources(), vec!["inside.jpg"]);
}
