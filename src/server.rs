//! TCP front end. One client is served at a time; later connections wait in
//! the listen backlog until the current session ends.

use crate::clock::Clock;
use crate::commands::CommandHandler;
use crate::robot::SharedRobot;
use crate::session::CommandSession;
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

pub struct CommandServer {
    listener: TcpListener,
    handler: CommandHandler,
    prompt: String,
}

impl CommandServer {
    pub async fn bind(
        host: &str,
        port: u16,
        robot: SharedRobot,
        clock: Arc<dyn Clock>,
        prompt: impl Into<String>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        info!("Listening for commands on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            handler: CommandHandler::new(robot, clock),
            prompt: prompt.into(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve clients forever. Only a failing listener ends this.
    pub async fn serve(&self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            self.serve_client(stream, peer).await;
        }
    }

    /// Serve a single connection, stopping the buggy before and after it.
    pub async fn serve_client(&self, stream: TcpStream, peer: SocketAddr) {
        info!("Client connected from {}", peer);
        self.park().await;

        let (reader, writer) = stream.into_split();
        let mut session =
            CommandSession::new(reader, writer, self.handler.clone(), self.prompt.clone());
        match session.run().await {
            Ok(()) => info!(
                "Client {} disconnected after {} commands",
                peer,
                session.commands_handled()
            ),
            Err(e) => warn!("Session with {} ended: {}", peer, e),
        }

        self.park().await;
    }

    async fn park(&self) {
        let mut robot = self.handler.robot().lock().await;
        robot.halt();
        robot.lights_off();
    }
}
