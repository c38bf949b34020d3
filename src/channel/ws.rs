use futures::StreamExt;
use log::trace;

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use super::{ChannelError, Connection, Transport};

/// Derives the live updates URL from the dashboard base URL
pub fn updates_url(base_url: &str) -> Result<String, ChannelError> {
    let base = base_url.trim().trim_end_matches('/');

    if let Some(rest) = base.strip_prefix("https://") {
        Ok(format!("wss://{}/ws/updates", rest))
    } else if let Some(rest) = base.strip_prefix("http://") {
        Ok(format!("ws://{}/ws/updates", rest))
    } else {
        Err(ChannelError::Url(base_url.to_string()))
    }
}

/// [Transport] over a websocket
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(base_url: &str) -> Result<Self, ChannelError> {
        Ok(Self {
            url: updates_url(base_url)?,
        })
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError> {
        let (stream, _) = connect_async(self.url.as_str()).await?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Connection for WsConnection {
    async fn next_text(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    trace!("close frame: {:?}", frame);
                    return None;
                },
                Ok(other) => {
                    trace!("ignored frame: {:?}", other);
                },
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
