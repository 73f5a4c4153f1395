use super::*;

use async_trait::async_trait;
use client_core::{
    error::TransportError, CrawlerControlPlane, EventStream, EventStreamConnector,
};
use futures::{stream, StreamExt};
use shared::protocol::{StopRequest, StopResponse};
use tokio::sync::{oneshot, Mutex};

/// Replays a fixed list of events, then holds the stream open.
struct ReplayConnector {
    events: Vec<&'static str>,
}

#[async_trait]
impl EventStreamConnector for ReplayConnector {
    async fn open(&self, _query: &SearchQuery) -> Result<EventStream, TransportError> {
        let events: Vec<Result<String, TransportError>> = self
            .events
            .iter()
            .map(|event| Ok(event.to_string()))
            .collect();
        Ok(stream::iter(events).chain(stream::pending()).boxed())
    }
}

/// Answers stop calls after a delay and records them once answered.
#[derive(Default)]
struct SlowControl {
    completed: Mutex<Vec<StopRequest>>,
}

#[async_trait]
impl CrawlerControlPlane for SlowControl {
    async fn stop(&self, request: &StopRequest) -> Result<StopResponse, TransportError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.completed.lock().await.push(request.clone());
        Ok(StopResponse {
            status: "success".to_string(),
        })
    }
}

async fn start(
    events: Vec<&'static str>,
    query: SearchQuery,
) -> (
    Arc<SlowControl>,
    Arc<SessionController>,
    broadcast::Receiver<SessionEvent>,
    Option<SearchQuery>,
) {
    let control = Arc::new(SlowControl::default());
    let controller = SessionController::new_with_dependencies(
        Arc::new(ReplayConnector { events }),
        control.clone(),
        64,
    );
    let receiver = controller.subscribe_events();
    let mode = query.mode();
    controller.start_search(query).await.expect("start");
    let active = controller.active_query(mode).await;
    (control, controller, receiver, active)
}

#[tokio::test]
async fn no_route_session_returns_after_backend_stop_completes() {
    let (control, controller, events, query) =
        start(vec!["__NO_DATA__"], SearchQuery::train_code("2025-05-01", "G101")).await;

    tokio::time::timeout(
        Duration::from_secs(5),
        watch(
            &controller,
            events,
            SearchMode::TrainCode,
            query,
            std::future::pending::<()>(),
        ),
    )
    .await
    .expect("watch should finish")
    .expect("watch result");

    let completed = control.completed.lock().await.clone();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].mode(), SearchMode::TrainCode);
}

#[tokio::test]
async fn empty_batch_without_monitoring_returns_after_backend_stop() {
    let query = SearchQuery {
        auto_monitor: false,
        ..SearchQuery::stations("2025-05-01", "北京", "上海")
    };
    let (control, controller, events, active) = start(vec!["[]"], query).await;

    tokio::time::timeout(
        Duration::from_secs(5),
        watch(
            &controller,
            events,
            SearchMode::Stations,
            active,
            std::future::pending::<()>(),
        ),
    )
    .await
    .expect("watch should finish")
    .expect("watch result");

    assert_eq!(control.completed.lock().await.len(), 1);
}

#[tokio::test]
async fn shutdown_signal_stops_backend_before_returning() {
    let (control, controller, events, query) = start(
        vec![r#"[{"train_code":"G101","second_class":"50","first_class":"有"}]"#],
        SearchQuery::stations("2025-05-01", "北京", "上海"),
    )
    .await;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let watcher = tokio::spawn({
        let controller = controller.clone();
        async move { watch(&controller, events, SearchMode::Stations, query, stop_rx).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(()).expect("watcher listening");

    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .expect("watch should finish")
        .expect("watch task")
        .expect("watch result");

    assert_eq!(control.completed.lock().await.len(), 1);
    assert!(controller.state(SearchMode::Stations).await.is_idle());
}

#[tokio::test]
async fn upstream_error_is_reported_after_stopping() {
    let (control, controller, events, query) = start(
        vec![r#"{"error":"crawler crashed"}"#],
        SearchQuery::train_code("2025-05-01", "G101"),
    )
    .await;

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        watch(
            &controller,
            events,
            SearchMode::TrainCode,
            query,
            std::future::pending::<()>(),
        ),
    )
    .await
    .expect("watch should finish")
    .expect_err("upstream error");

    assert!(err.to_string().contains("crawler crashed"));
    assert_eq!(control.completed.lock().await.len(), 1);
}
