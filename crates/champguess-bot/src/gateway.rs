// WebSocket gateway for the chat bridge.

use std::fmt;

use futures_util::sink::{Sink, SinkExt};
use futures_util::stream::{Stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::protocol::{GatewayEvent, OutboundMessage};

pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("gateway listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve bridge connections one at a time until either channel closes.
///
/// Inbound text frames are parsed as [`GatewayEvent`]s and forwarded through
/// `events`; everything received on `outbound` is written back as JSON text
/// frames. Replies produced while no bridge is connected are dropped.
pub async fn run(
    listener: TcpListener,
    events: mpsc::Sender<GatewayEvent>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    debug!("no bridge connected, dropping reply for channel {}", msg.channel_id);
                    continue;
                }
                None => break,
            },
        };
        let addr = addr.to_string();

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("websocket handshake failed for {addr}: {e}");
                continue;
            }
        };
        info!("bridge connected from {addr}");

        let (write, read) = ws_stream.split();
        let result = serve_connection(read, write, &events, &mut outbound, &addr).await;
        info!("bridge {addr} disconnected");
        if result.is_err() {
            break;
        }
    }

    info!("gateway shutting down");
    Ok(())
}

/// Pump one connection: inbound frames to `events`, `outbound` to the sink.
///
/// Returns `Err(())` when either channel is closed, telling the caller to
/// stop accepting connections. A closed or failed socket returns `Ok(())`.
pub async fn serve_connection<St, Si>(
    mut read: St,
    mut write: Si,
    events: &mpsc::Sender<GatewayEvent>,
    outbound: &mut mpsc::Receiver<OutboundMessage>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                        Ok(event) => {
                            if events.send(event).await.is_err() {
                                return Err(());
                            }
                        }
                        Err(e) => warn!("unparseable event from {addr}: {e}"),
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("bridge {addr} sent close frame");
                    return Ok(());
                }
                Some(Err(e)) => {
                    warn!("websocket error from {addr}: {e}");
                    return Ok(());
                }
                None => return Ok(()),
                Some(Ok(_)) => {}
            },
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    let _ = write.close().await;
                    return Err(());
                };
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("failed to encode reply for {}: {e}", msg.channel_id);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    warn!("failed to write to bridge {addr}: {e}");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures_util::stream;

    use crate::protocol::Reply;

    /// Sink that records every frame written to it.
    #[derive(Default)]
    struct RecordingSink(Vec<Message>);

    impl Sink<Message> for RecordingSink {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
            self.get_mut().0.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    fn event_json(text: &str) -> String {
        format!(
            r#"{{"type":"message","text":"{text}","user":{{"id":"1","name":"momo"}},"channel":{{"id":"c1"}}}}"#
        )
    }

    #[tokio::test]
    async fn inbound_events_forwarded_in_order() {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (_out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(16);
        let frames = vec![
            Ok(Message::Text(event_json("ahri").into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Text("not json".into())),
            Ok(Message::Text(event_json("lux").into())),
        ];
        let mut sink = RecordingSink::default();

        serve_connection(stream::iter(frames), &mut sink, &events_tx, &mut out_rx, "test")
            .await
            .unwrap();

        let first = events_rx.recv().await.unwrap();
        let second = events_rx.recv().await.unwrap();
        assert!(matches!(first, GatewayEvent::Message { ref text, .. } if text == "ahri"));
        assert!(matches!(second, GatewayEvent::Message { ref text, .. } if text == "lux"));
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_frame_ends_connection() {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (_out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(16);
        let frames = vec![
            Ok(Message::Close(None)),
            Ok(Message::Text(event_json("late").into())),
        ];
        let mut sink = RecordingSink::default();

        let result =
            serve_connection(stream::iter(frames), &mut sink, &events_tx, &mut out_rx, "test").await;
        assert!(result.is_ok());
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn outbound_replies_written_as_json() {
        let (events_tx, _events_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        out_tx
            .send(OutboundMessage::new(
                "c1",
                Reply::TimedOut {
                    round_id: 3,
                    answer: "Ahri".into(),
                },
            ))
            .await
            .unwrap();
        drop(out_tx);
        let mut sink = RecordingSink::default();

        let result = serve_connection(
            stream::pending::<Result<Message, WsError>>(),
            &mut sink,
            &events_tx,
            &mut out_rx,
            "test",
        )
        .await;

        // Outbound channel closed after the reply went out.
        assert!(result.is_err());
        assert_eq!(sink.0.len(), 1);
        let Message::Text(text) = &sink.0[0] else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["channel_id"], "c1");
        assert_eq!(value["reply"]["type"], "timed_out");
        assert_eq!(value["reply"]["answer"], "Ahri");
    }

    #[tokio::test]
    async fn closed_event_channel_stops_gateway() {
        let (events_tx, events_rx) = mpsc::channel(16);
        drop(events_rx);
        let (_out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(16);
        let frames = vec![Ok(Message::Text(event_json("orphan").into()))];
        let mut sink = RecordingSink::default();

        let result =
            serve_connection(stream::iter(frames), &mut sink, &events_tx, &mut out_rx, "test").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn round_trip_over_real_socket() {
        use tokio_tungstenite::connect_async;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(16);
        let server = tokio::spawn(run(listener, events_tx, out_rx));

        let (mut client, _) = connect_async(format!("ws://127.0.0.1:{port}"))
            .await
            .unwrap();
        client
            .send(Message::Text(event_json("teemo").into()))
            .await
            .unwrap();
        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.channel().id, "c1");

        out_tx
            .send(OutboundMessage::new(
                "c1",
                Reply::Leaderboard { entries: vec![] },
            ))
            .await
            .unwrap();
        let frame = client.next().await.unwrap().unwrap();
        let Message::Text(text) = frame else {
            panic!("expected text frame");
        };
        assert!(text.as_str().contains("leaderboard"));

        drop(out_tx);
        let _ = client.close(None).await;
        server.await.unwrap().unwrap();
    }
}
