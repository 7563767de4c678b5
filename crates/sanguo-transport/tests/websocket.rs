//! Integration tests for the WebSocket transport against a real client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use sanguo_transport::{
        Connection, Transport, TransportError, WebSocketConnection, WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn pair() -> (WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("bound address");

        let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server = accept.await.expect("accept task");
        (server, client)
    }

    #[tokio::test]
    async fn test_text_frames_flow_both_ways() {
        let (server, mut client) = pair().await;
        assert!(server.id().get() > 0);
        assert!(server.peer_addr().ip().is_loopback());

        server.send(br#"{"type":"ping"}"#).await.expect("send");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg, Message::text(r#"{"type":"ping"}"#));

        client.send(Message::text(r#"{"type":"pong"}"#)).await.unwrap();
        let received = server.recv().await.expect("recv").expect("frame");
        assert_eq!(received, br#"{"type":"pong"}"#);
    }

    #[tokio::test]
    async fn test_send_is_not_blocked_by_pending_recv() {
        let (server, mut client) = pair().await;
        let server = Arc::new(server);

        // Park a reader in recv; nothing is coming from the client yet.
        let reader = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), server.send(b"notification"))
            .await
            .expect("send must not wait for the reader")
            .expect("send");
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"notification");

        client.send(Message::text("late")).await.unwrap();
        let got = reader.await.unwrap().unwrap();
        assert_eq!(got.as_deref(), Some(&b"late"[..]));
    }

    #[tokio::test]
    async fn test_each_accept_gets_a_fresh_id() {
        let (a, _ca) = pair().await;
        let (b, _cb) = pair().await;
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_bind_failure_names_the_address() {
        let err = WebSocketTransport::bind("not-an-address").await.err().expect("bind must fail");
        assert!(matches!(err, TransportError::Bind { .. }));
        assert!(err.to_string().contains("not-an-address"));
    }

    #[tokio::test]
    async fn test_client_close_yields_none() {
        let (server, mut client) = pair().await;
        client.close(None).await.unwrap();
        let got = server.recv().await.expect("clean close");
        assert!(got.is_none());
    }
}
