//! Interactive Client
//!
//! Line-oriented terminal client: every input line is sent as a text
//! message and every message from the server is printed. On shutdown it
//! says goodbye with a going-away close frame.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_tungstenite::tungstenite::{
    self,
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};

/// Bound on writing the close frame
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_millis(10);

/// Time given to the server to answer the close frame
const CLOSE_WAIT: Duration = Duration::from_millis(10);

/// Errors that can occur in the client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connect to `url` and relay between `input`, the server and `output`
/// until the server goes away or `shutdown` resolves.
pub async fn run<R, W, F>(url: &str, input: R, mut output: W, shutdown: F) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let (socket, _) = tokio_tungstenite::connect_async(url).await?;
    tracing::info!(url, "Connected");

    let (mut write, mut read) = socket.split();
    let mut lines = input.lines();
    let mut input_open = true;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let close = Message::Close(Some(CloseFrame {
                    code: CloseCode::Away,
                    reason: "Bye".into(),
                }));
                match tokio::time::timeout(CLOSE_WRITE_TIMEOUT, write.send(close)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!(error = %e, "Failed to send close frame"),
                    Err(_) => tracing::debug!("Timed out sending close frame"),
                }
                tokio::time::sleep(CLOSE_WAIT).await;
                return Ok(());
            }
            line = lines.next_line(), if input_open => match line? {
                Some(line) => write.send(Message::Text(line)).await?,
                None => input_open = false,
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => print_message(&mut output, &text).await?,
                Some(Ok(Message::Binary(data))) => {
                    print_message(&mut output, &String::from_utf8_lossy(&data)).await?
                }
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(frame) if !matches!(frame.code, CloseCode::Normal | CloseCode::Away) => {
                            tracing::warn!(code = %frame.code, reason = %frame.reason, "Server closed the connection");
                        }
                        _ => tracing::info!("Server closed the connection"),
                    }
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => return Ok(()),
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

/// Run against the terminal, stopping on Ctrl-C
pub async fn run_interactive(url: &str) -> Result<(), ClientError> {
    let input = BufReader::new(tokio::io::stdin());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };
    run(url, input, tokio::io::stdout(), shutdown).await
}

async fn print_message<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output
        .write_all(format!("Received message: {text}\n").as_bytes())
        .await?;
    output.flush().await
}
