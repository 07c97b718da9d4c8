pub mod auth;
pub mod files;
pub mod search;

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::kernel::jobs::CrawlEvent;

/// Adapt a job invocation's progress channel into the wire framing:
/// `event: <name>` + single-line JSON `data:`.
pub(crate) fn event_stream(
    rx: tokio::sync::mpsc::Receiver<CrawlEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|event| {
        let sse_event = Event::default()
            .event(event.name())
            .json_data(event.data())
            .unwrap_or_else(|_| Event::default().event(event.name()).data("{}"));
        Ok(sse_event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
