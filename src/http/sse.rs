use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::engine::BridgeHandle;

pub type NotificationStream = Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

/// Server-Sent Events stream of relay notifications.
///
/// Event names follow the notification channel (`engine`, `file-request`);
/// the data is the notification line without its terminator. A client that
/// falls behind skips the messages it missed.
pub fn notifications(bridge: &BridgeHandle) -> NotificationStream {
    let receiver = bridge.notifications().subscribe();

    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(message) => Some(Ok(Event::default()
                .event(message.channel().as_str())
                .data(message.text()))),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                log::warn!("[SSE] client lagged, {} notifications dropped", skipped);
                None
            }
        }
    });

    Sse::new(Box::pin(stream) as Pin<Box<_>>).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("bridge-keepalive"),
    )
}
