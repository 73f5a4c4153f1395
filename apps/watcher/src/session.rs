use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use client_core::{
    transport::STOP_REQUEST_TIMEOUT, SessionController, SessionEvent, SessionState,
};
use shared::{
    domain::{SearchMode, SearchQuery},
    offers::{group_by_train, visible_offers, AvailabilityLevel},
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

/// How long to wait for an automatic stop to reach the backend before exiting.
pub const AUTO_STOP_GRACE: Duration = STOP_REQUEST_TIMEOUT.saturating_add(Duration::from_secs(1));

/// Prints session updates until the search ends or `shutdown` resolves.
///
/// Returns only after the backend stop call of the ending session has completed,
/// so the caller may tear down the runtime right away.
pub async fn watch<F>(
    controller: &Arc<SessionController>,
    mut events: broadcast::Receiver<SessionEvent>,
    mode: SearchMode,
    query: Option<SearchQuery>,
    shutdown: F,
) -> Result<()>
where
    F: Future,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let outcome = controller.stop_search(mode).await;
                info!(?outcome, "search stopped by user");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged { mode: changed, state }) if changed == mode => {
                    render(query.as_ref(), &state);
                    if state.is_idle() {
                        wait_for_backend_stop(&mut events, mode, AUTO_STOP_GRACE).await;
                        return Ok(());
                    }
                }
                Ok(SessionEvent::UpstreamError { mode: failed, message, .. }) if failed == mode => {
                    controller.stop_search(mode).await;
                    bail!("backend reported an error: {message}");
                }
                Ok(SessionEvent::StreamEnded { mode: ended, .. }) if ended == mode => {
                    warn!("backend closed the ticket stream");
                    controller.stop_search(mode).await;
                    return Ok(());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed session events"),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn wait_for_backend_stop(
    events: &mut broadcast::Receiver<SessionEvent>,
    mode: SearchMode,
    grace: Duration,
) {
    let stopped = tokio::time::timeout(grace, async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::BackendStopped {
                    mode: stopped,
                    acknowledged,
                }) if stopped == mode => return Some(acknowledged),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    match stopped {
        Ok(Some(true)) => info!(%mode, "backend crawler stopped"),
        Ok(Some(false)) => warn!(%mode, "backend did not acknowledge the stop"),
        Ok(None) => {}
        Err(_) => warn!(%mode, "gave up waiting for the backend stop"),
    }
}

fn render(query: Option<&SearchQuery>, state: &SessionState) {
    match state {
        SessionState::Idle => println!("search finished"),
        SessionState::Loading => println!("searching..."),
        SessionState::NoData => println!("no such route or train on this date"),
        SessionState::Monitoring { updated_at } => {
            println!("[{}] no tickets yet, still monitoring", updated_at.format("%H:%M:%S"));
        }
        SessionState::Results { offers, updated_at } => {
            println!("[{}] {} offers", updated_at.format("%H:%M:%S"), offers.len());
            let Some(query) = query else {
                return;
            };
            let visible: Vec<_> = visible_offers(query, offers).into_iter().cloned().collect();
            for group in group_by_train(&visible, query.seat_class) {
                let primary = &group.primary;
                println!(
                    "{:<8} {} -> {}  {}-{} ({})  {} {} {}  [{} classes]",
                    group.train_code,
                    primary.origin,
                    primary.destination,
                    primary.departs_at,
                    primary.arrives_at,
                    primary.duration,
                    primary.seat_class,
                    primary.availability,
                    level_marker(AvailabilityLevel::of(&primary.availability)),
                    group.offer_count(),
                );
                if !group.is_collapsible() {
                    continue;
                }
                for other in &group.others {
                    println!(
                        "{:<8} {} {} {}",
                        "",
                        other.seat_class,
                        other.availability,
                        level_marker(AvailabilityLevel::of(&other.availability)),
                    );
                }
            }
        }
    }
}

fn level_marker(level: AvailabilityLevel) -> &'static str {
    match level {
        AvailabilityLevel::Plenty => "[+]",
        AvailabilityLevel::Few => "[~]",
        AvailabilityLevel::None => "[-]",
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
