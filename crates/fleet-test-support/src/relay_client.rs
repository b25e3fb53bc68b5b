// relay_client: a lightweight agent/viewer simulator for relay integration tests.
//
// Connects to a real axum router over a WebSocket, exchanging the binary
// relay frame format on `Message::Binary` frames. Tests bind the router to
// a random port and drive it exactly as a real agent or viewer would.

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use relay_protocol::{Frame, RelayCodec};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct RelayTestClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
    codec: RelayCodec,
}

impl RelayTestClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self {
            write,
            read,
            codec: RelayCodec::new(),
        })
    }

    pub async fn connect_with_bearer(
        url: &str,
        token: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        use tokio_tungstenite::tungstenite::handshake::client::generate_key;
        use tokio_tungstenite::tungstenite::http::Request;

        let uri: tokio_tungstenite::tungstenite::http::Uri = url.parse()?;
        let host = uri.host().unwrap_or("localhost").to_owned();
        let host_header = match uri.port_u16() {
            Some(p) => format!("{host}:{p}"),
            None => host,
        };
        let request = Request::builder()
            .uri(url)
            .header("Host", host_header)
            .header("Authorization", format!("Bearer {token}"))
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .body(())?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let (write, read) = ws_stream.split();
        Ok(Self {
            write,
            read,
            codec: RelayCodec::new(),
        })
    }

    pub async fn send_frame(&mut self, frame: Frame) -> Result<(), Box<dyn std::error::Error>> {
        use tokio_util::codec::Encoder;
        let mut buf = BytesMut::new();
        self.codec.encode(frame, &mut buf)?;
        self.write.send(Message::Binary(buf.freeze())).await?;
        Ok(())
    }

    /// Receive the next decoded frame, skipping ping/pong control frames.
    pub async fn recv_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        use tokio_util::codec::Decoder;
        loop {
            match self.read.next().await {
                Some(Ok(Message::Binary(bytes))) => {
                    let mut buf = BytesMut::from(&bytes[..]);
                    if let Some(frame) = self.codec.decode(&mut buf)? {
                        return Ok(frame);
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
