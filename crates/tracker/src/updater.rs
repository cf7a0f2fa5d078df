use crate::error::panic_message;
use crate::UpdateFailure;
use futures::future::join_all;
use futures::FutureExt;
use livedev_clients::{DocumentUpdate, Session, UpdateError, Updater};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Runs every updater registered for the document's language on every
/// session, all concurrently. Failures are collected, never propagated.
pub(crate) async fn fan_out(
    update: &DocumentUpdate,
    sessions: &[Arc<Session>],
    timeout: Duration,
) -> Vec<UpdateFailure> {
    let calls = sessions.iter().flat_map(|session| {
        session
            .client()
            .updaters_for(&update.language)
            .iter()
            .enumerate()
            .map(move |(index, updater)| {
                run_one(updater.as_ref(), index, update, session.as_ref(), timeout)
            })
    });

    join_all(calls).await.into_iter().flatten().collect()
}

async fn run_one(
    updater: &dyn Updater,
    index: usize,
    update: &DocumentUpdate,
    session: &Session,
    timeout: Duration,
) -> Option<UpdateFailure> {
    let call = AssertUnwindSafe(updater.update(update, session)).catch_unwind();
    let error = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(Ok(()))) => return None,
        Ok(Ok(Err(err))) => err,
        Ok(Err(payload)) => UpdateError::Panicked {
            message: panic_message(payload.as_ref()),
        },
        Err(_) => UpdateError::Timeout { after: timeout },
    };

    log::warn!(
        "{} ({}) updater #{index} failed for {}: {error}",
        session.id(),
        session.client().id(),
        update.document.path().display()
    );
    Some(UpdateFailure {
        session: session.id(),
        client: session.client().id().to_string(),
        updater: index,
        error,
    })
}
