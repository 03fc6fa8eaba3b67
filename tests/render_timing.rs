use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use pms_lib::{
    FireReason, PageEvent, RenderOutcome, RenderScheduler, RenderTiming, RenderWatch,
    ResponseStage,
};
use tokio::time::{sleep_until, Instant};

const PAGE: &str = "http://example.test/";

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn started(id: &str) -> PageEvent {
    PageEvent::RequestStarted {
        id: id.into(),
        url: format!("{PAGE}{id}.js"),
    }
}

fn finished(id: &str, stage: ResponseStage) -> PageEvent {
    PageEvent::ResponseReceived {
        id: id.into(),
        stage,
    }
}

/// Replay events at fixed offsets from `base` on tokio's clock.
fn timeline(base: Instant, events: Vec<(u64, PageEvent)>) -> BoxStream<'static, PageEvent> {
    stream::iter(events)
        .then(move |(offset, event)| async move {
            sleep_until(base + ms(offset)).await;
            event
        })
        .boxed()
}

#[tokio::test(start_paused = true)]
async fn quiet_period_fires_after_last_resource() {
    let base = Instant::now();
    let mut watch = RenderWatch::new(PAGE, RenderTiming::default());
    watch.start(base);
    let mut events = timeline(
        base,
        vec![
            (0, started("a")),
            (40, started("b")),
            (80, finished("a", ResponseStage::End)),
            (100, finished("b", ResponseStage::End)),
        ],
    );

    let outcome = watch.run(&mut events).await;

    assert_eq!(outcome, RenderOutcome::Fired(FireReason::Quiet));
    assert_eq!(Instant::now() - base, ms(600));
    assert_eq!(watch.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn ceiling_fires_while_resource_hangs() {
    let base = Instant::now();
    let mut watch = RenderWatch::new(PAGE, RenderTiming::default());
    watch.start(base);
    let mut events = timeline(base, vec![(10, started("stuck"))]);

    let outcome = watch.run(&mut events).await;

    assert_eq!(outcome, RenderOutcome::Fired(FireReason::Ceiling));
    assert_eq!(Instant::now() - base, ms(2000));
    assert_eq!(watch.outstanding(), 1);
}

#[tokio::test(start_paused = true)]
async fn intermediate_stage_does_not_settle_page() {
    let base = Instant::now();
    let mut watch = RenderWatch::new(PAGE, RenderTiming::default());
    watch.start(base);
    let mut events = timeline(
        base,
        vec![
            (0, started("a")),
            (100, finished("a", ResponseStage::Start)),
            (900, finished("a", ResponseStage::End)),
        ],
    );

    let outcome = watch.run(&mut events).await;

    assert_eq!(outcome, RenderOutcome::Fired(FireReason::Quiet));
    assert_eq!(Instant::now() - base, ms(1400));
}

#[tokio::test(start_paused = true)]
async fn late_completion_loses_to_ceiling() {
    let base = Instant::now();
    let mut watch = RenderWatch::new(PAGE, RenderTiming::default());
    watch.start(base);
    let mut events = timeline(
        base,
        vec![(0, started("slow")), (1800, finished("slow", ResponseStage::End))],
    );

    let outcome = watch.run(&mut events).await;

    assert_eq!(outcome, RenderOutcome::Fired(FireReason::Ceiling));
    assert_eq!(Instant::now() - base, ms(2000));
    assert_eq!(watch.fired(), Some(FireReason::Ceiling));
}

#[tokio::test(start_paused = true)]
async fn document_failure_ends_wait_immediately() {
    let base = Instant::now();
    let mut watch = RenderWatch::new(PAGE, RenderTiming::default());
    watch.start(base);
    let mut events = timeline(
        base,
        vec![
            (
                0,
                PageEvent::RequestStarted {
                    id: "doc".into(),
                    url: PAGE.into(),
                },
            ),
            (
                30,
                PageEvent::RequestFailed {
                    id: "doc".into(),
                    error: "net::ERR_CONNECTION_RESET".into(),
                },
            ),
        ],
    );

    let outcome = watch.run(&mut events).await;

    assert!(matches!(outcome, RenderOutcome::DocumentFailed { .. }));
    assert_eq!(Instant::now() - base, ms(30));
}

#[test]
fn scheduler_fires_only_once() {
    let now = Instant::now();
    let mut scheduler = RenderScheduler::new(RenderTiming::default());
    scheduler.start(now);
    scheduler.quiescent(now);

    assert_eq!(scheduler.poll(now + ms(500)), Some(FireReason::Quiet));
    assert_eq!(scheduler.poll(now + ms(2000)), None);
    assert_eq!(scheduler.fire(FireReason::Ceiling), None);
    assert_eq!(scheduler.fired(), Some(FireReason::Quiet));
    assert_eq!(scheduler.next_deadline(), None);
}
