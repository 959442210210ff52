//! TCP and WebSocket transports behind one reader/writer pair.
//!
//! Both transports carry the same newline-delimited text.  The reader yields
//! raw chunks that the connection manager feeds into a
//! [`LineBuffer`](satellite_core::LineBuffer); the writer sends complete
//! lines.
//!
//! Over WebSocket each text frame holds one or more whole lines.  A frame
//! that does not end in `\n` is terminated here so a line never straddles two
//! frames in the buffer.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{ClientError, ConnectionDetails};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_CHUNK: usize = 4096;

pub enum TransportReader {
    Tcp(OwnedReadHalf),
    WebSocket(SplitStream<WsStream>),
}

pub enum TransportWriter {
    Tcp(OwnedWriteHalf),
    WebSocket(SplitSink<WsStream, Message>),
}

/// Opens the transport described by `details`.
pub async fn open(
    details: &ConnectionDetails,
) -> Result<(TransportReader, TransportWriter), ClientError> {
    match details {
        ConnectionDetails::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            stream.set_nodelay(true)?;
            let (read_half, write_half) = stream.into_split();
            Ok((
                TransportReader::Tcp(read_half),
                TransportWriter::Tcp(write_half),
            ))
        }
        ConnectionDetails::WebSocket { url } => {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ClientError::InvalidUrl(url.clone()));
            }
            let (stream, _response) = connect_async(url.as_str()).await?;
            let (sink, stream) = stream.split();
            Ok((
                TransportReader::WebSocket(stream),
                TransportWriter::WebSocket(sink),
            ))
        }
    }
}

impl TransportReader {
    /// Reads the next chunk of text.
    ///
    /// Returns `Ok(None)` when the peer closed the connection.  Control frames
    /// yield an empty chunk: they still count as traffic for the idle check.
    /// Cancel safe.
    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, ClientError> {
        match self {
            TransportReader::Tcp(reader) => {
                let mut buf = vec![0u8; READ_CHUNK];
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(buf))
            }
            TransportReader::WebSocket(stream) => match stream.next().await {
                None | Some(Ok(Message::Close(_))) => Ok(None),
                Some(Ok(Message::Text(text))) => Ok(Some(terminated(text.into_bytes()))),
                Some(Ok(Message::Binary(bytes))) => Ok(Some(terminated(bytes))),
                Some(Ok(other)) => {
                    debug!("websocket control frame: {other:?}");
                    Ok(Some(Vec::new()))
                }
                Some(Err(e)) => Err(e.into()),
            },
        }
    }
}

impl TransportWriter {
    /// Sends one newline-terminated line.
    pub async fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
        match self {
            TransportWriter::Tcp(writer) => {
                writer.write_all(line.as_bytes()).await?;
                Ok(())
            }
            TransportWriter::WebSocket(sink) => {
                sink.send(Message::Text(line.to_string())).await?;
                Ok(())
            }
        }
    }

    /// Closes the write side; errors are irrelevant at this point.
    pub async fn close(&mut self) {
        match self {
            TransportWriter::Tcp(writer) => {
                let _ = writer.shutdown().await;
            }
            TransportWriter::WebSocket(sink) => {
                let _ = sink.close().await;
            }
        }
    }
}

fn terminated(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.last().is_some_and(|b| *b != b'\n') {
        bytes.push(b'\n');
    }
    bytes
}

// ── Tests ─────────────────────────────────────────────────────────────────────
