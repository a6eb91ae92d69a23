//! One client conversation: welcome, then prompt, read, reply until exit or EOF

use crate::commands::{CommandHandler, Flow, WELCOME};
use crate::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Line-oriented command session over any async byte stream
pub struct CommandSession<R, W> {
    reader: BufReader<R>,
    writer: W,
    handler: CommandHandler,
    prompt: String,
    commands_handled: u64,
}

impl<R, W> CommandSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, handler: CommandHandler, prompt: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            handler,
            prompt: prompt.into(),
            commands_handled: 0,
        }
    }

    pub fn commands_handled(&self) -> u64 {
        self.commands_handled
    }

    /// Run until the client says exit or closes its end.
    ///
    /// Command failures are answered in-band; only transport errors end the
    /// session early.
    pub async fn run(&mut self) -> Result<()> {
        self.writer.write_all(WELCOME.as_bytes()).await?;
        let mut buffer = String::new();

        loop {
            self.writer.write_all(self.prompt.as_bytes()).await?;
            self.writer.flush().await?;

            buffer.clear();
            if self.reader.read_line(&mut buffer).await? == 0 {
                info!("Client closed the connection");
                break;
            }

            let command = buffer.trim();
            debug!("Received: {:?}", command);
            self.commands_handled += 1;
            if self.handler.handle_line(command, &mut self.writer).await? == Flow::Exit {
                info!("Client said good-bye");
                break;
            }
        }
        Ok(())
    }
}
