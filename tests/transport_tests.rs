// WebSocket transport against a local server
//
// The server side is a plain tokio-tungstenite acceptor on a loopback port,
// so these tests exercise the real socket writer and reader tasks.

use astra_live::{EncodedChunk, SessionSetup, Transport, TransportEvent, WebSocketTransport};
use futures::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

/// What the server saw once it was allowed to read
struct ServerLog {
    setup: String,
    audio_frames: usize,
    saw_close: bool,
}

/// Accept one client, read its setup, optionally answer setupComplete, then
/// stop reading until `resume` fires and count what arrives afterwards
async fn spawn_server(
    reply_setup: bool,
) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<ServerLog>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (resume_tx, resume_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let setup = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            other => panic!("expected setup, got {:?}", other),
        };

        if reply_setup {
            ws.send(Message::Text(r#"{"setupComplete": {}}"#.to_string()))
                .await
                .unwrap();
        }

        let _ = resume_rx.await;

        let mut audio_frames = 0;
        let mut saw_close = false;
        let read_all = async {
            while let Some(msg) = ws.next().await {
                match msg {
                    Ok(Message::Text(text)) if text.contains("realtimeInput") => audio_frames += 1,
                    Ok(Message::Close(_)) => {
                        saw_close = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        };
        let _ = tokio::time::timeout(Duration::from_secs(5), read_all).await;

        ServerLog {
            setup,
            audio_frames,
            saw_close,
        }
    });

    (format!("ws://{}/live", addr), resume_tx, server)
}

fn frame() -> EncodedChunk {
    EncodedChunk::from_samples(&vec![0.3; 4096], 16000)
}

#[tokio::test]
async fn test_connect_sends_setup_and_reports_open() {
    let (endpoint, resume, server) = spawn_server(true).await;
    let transport = WebSocketTransport::new(endpoint, "");

    let (mut connection, mut events) = transport
        .connect(&SessionSetup::audio("test-model"))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap();
    assert_eq!(event, Some(TransportEvent::Open));

    connection.send_audio(frame()).unwrap();
    connection.send_audio(frame()).unwrap();
    // Let the writer hand both frames to the socket
    tokio::time::sleep(Duration::from_millis(100)).await;

    let _ = resume.send(());
    connection.close().await.unwrap();
    assert!(connection.is_closed());

    let log = server.await.unwrap();
    assert!(log.setup.contains("models/test-model"));
    assert_eq!(log.audio_frames, 2);
    assert!(log.saw_close);
}

#[tokio::test]
async fn test_close_abandons_backlog_when_peer_stalls() {
    let (endpoint, resume, server) = spawn_server(false).await;
    let transport = WebSocketTransport::new(endpoint, "");

    let (mut connection, _events) = transport
        .connect(&SessionSetup::audio("test-model"))
        .await
        .unwrap();

    // ~33MB queued against a peer that is not reading
    const QUEUED: usize = 3000;
    for _ in 0..QUEUED {
        connection.send_audio(frame()).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    connection.close().await.unwrap();
    let took = started.elapsed();

    assert!(connection.is_closed());
    assert!(took < Duration::from_secs(3), "close() took {:?}", took);
    assert!(connection.send_audio(frame()).is_err());

    // Whatever was already in socket buffers may arrive; the queue may not
    let _ = resume.send(());
    let log = server.await.unwrap();
    assert!(
        log.audio_frames < QUEUED / 2,
        "{} queued frames still reached the server after close()",
        log.audio_frames
    );
}
