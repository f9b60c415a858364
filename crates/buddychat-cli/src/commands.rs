//! Interactive menu for the buddychat CLI
//!
//! The menu reads choices from the local input channel and, while idle,
//! also watches for inbound connections so it can ask for a decision. A
//! chat session borrows the same input channel until it ends.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use buddychat_core::{
    BuddyError, DirectoryResponse, HandshakeOutcome, LocalIdentity, PeerSession,
    PresenceStatus, SessionError, SessionEvent,
};

use crate::app::BuddyChatApp;
use crate::error::Result;

const MENU: &str = "\n\nSelect one of these options: \n\
  R - Register user id\n\
  L - Login as user id\n\
  A - Add buddy\n\
  D - Delete buddy\n\
  M - Message buddy\n\
  S - Buddy status\n\
  X - Exit application";

const CHAT_INSTRUCTIONS: &str = "Enter your text to send to buddy.  Enter q to quit.";

// ----------------------------------------------------------------------------
// Menu Choices
// ----------------------------------------------------------------------------

/// One menu selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Register,
    Login,
    AddBuddy,
    DeleteBuddy,
    Status,
    Message,
    Accept,
    Reject,
    Exit,
}

impl MenuChoice {
    /// Parse a typed choice, ignoring case and surrounding whitespace
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "R" => Some(MenuChoice::Register),
            "L" => Some(MenuChoice::Login),
            "A" => Some(MenuChoice::AddBuddy),
            "D" => Some(MenuChoice::DeleteBuddy),
            "S" => Some(MenuChoice::Status),
            "M" => Some(MenuChoice::Message),
            "Y" => Some(MenuChoice::Accept),
            "N" => Some(MenuChoice::Reject),
            "X" => Some(MenuChoice::Exit),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Menu
// ----------------------------------------------------------------------------

/// Menu loop over one output writer
pub struct Menu<'a, W: Write> {
    app: &'a BuddyChatApp,
    input: mpsc::Receiver<String>,
    out: W,
}

impl<'a, W: Write> Menu<'a, W> {
    pub fn new(app: &'a BuddyChatApp, input: mpsc::Receiver<String>, out: W) -> Self {
        Self { app, input, out }
    }

    /// Give back the writer (tests inspect what was printed)
    pub fn into_writer(self) -> W {
        self.out
    }

    /// Run until `X` or end of local input
    pub async fn run(&mut self) -> Result<()> {
        let pending = Arc::clone(self.app.pending());
        self.print_menu()?;

        loop {
            tokio::select! {
                line = self.input.recv() => {
                    let line = match line {
                        Some(line) => line,
                        None => {
                            debug!("Local input closed, leaving menu");
                            break;
                        }
                    };
                    match MenuChoice::parse(&line) {
                        Some(MenuChoice::Exit) => break,
                        Some(choice) => self.dispatch(choice).await?,
                        None => writeln!(self.out, "Invalid input!")?,
                    }
                    self.print_menu()?;
                }
                _ = pending.arrived() => {
                    // A signal can outlive the connection it announced
                    if !pending.is_empty() {
                        write!(self.out, "\nDo you want to accept an incoming connection (y/n)? ")?;
                        self.out.flush()?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn dispatch(&mut self, choice: MenuChoice) -> Result<()> {
        match choice {
            MenuChoice::Register => self.register().await,
            MenuChoice::Login => self.login().await,
            MenuChoice::AddBuddy => self.add_buddy().await,
            MenuChoice::DeleteBuddy => self.delete_buddy().await,
            MenuChoice::Status => self.buddy_status(),
            MenuChoice::Message => self.message_buddy().await,
            MenuChoice::Accept => self.accept_connection().await,
            MenuChoice::Reject => self.reject_connection().await,
            MenuChoice::Exit => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Directory Requests
    // ------------------------------------------------------------------------

    async fn register(&mut self) -> Result<()> {
        let user_id = match self.ask("Enter user id: ").await? {
            Some(user_id) => user_id,
            None => return Ok(()),
        };
        writeln!(self.out, "Registering user id: {}", user_id)?;

        let response = self.app.directory().register(&user_id).await;
        if let Some(response) = self.report(response)? {
            if response.is_success() {
                self.app
                    .state()
                    .set_identity(LocalIdentity::new(user_id, PresenceStatus::Online));
            }
        }
        Ok(())
    }

    async fn login(&mut self) -> Result<()> {
        let user_id = match self.ask("Enter user id: ").await? {
            Some(user_id) => user_id,
            None => return Ok(()),
        };
        writeln!(self.out, "User id set to: {}", user_id)?;
        self.app
            .state()
            .set_identity(LocalIdentity::new(user_id, PresenceStatus::Online));
        Ok(())
    }

    async fn add_buddy(&mut self) -> Result<()> {
        let (user_id, buddy_id) = match self.ask_buddy().await? {
            Some(ids) => ids,
            None => return Ok(()),
        };
        let response = self.app.directory().add_buddy(&user_id, &buddy_id).await;
        self.report(response)?;
        Ok(())
    }

    async fn delete_buddy(&mut self) -> Result<()> {
        let (user_id, buddy_id) = match self.ask_buddy().await? {
            Some(ids) => ids,
            None => return Ok(()),
        };
        let response = self.app.directory().delete_buddy(&user_id, &buddy_id).await;
        self.report(response)?;
        Ok(())
    }

    fn buddy_status(&mut self) -> Result<()> {
        writeln!(self.out, "My buddy list:")?;
        for record in self.app.state().peers().iter() {
            writeln!(self.out, "{}", record)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Peer Sessions
    // ------------------------------------------------------------------------

    async fn message_buddy(&mut self) -> Result<()> {
        let (_, buddy_id) = match self.ask_buddy().await? {
            Some(ids) => ids,
            None => return Ok(()),
        };

        let record = match PeerSession::lookup(self.app.state(), &buddy_id) {
            Ok(record) => record,
            Err(BuddyError::Session(SessionError::PeerUnknown { .. })) => {
                writeln!(self.out, "Buddy not found in list!")?;
                return Ok(());
            }
            Err(BuddyError::Session(SessionError::PeerOffline { .. })) => {
                writeln!(self.out, "Buddy is not online!")?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        writeln!(self.out, "Attempting to connect...")?;
        let max_line = self.app.config().peer.max_line_length;
        let mut session = match PeerSession::connect(&record, max_line).await {
            Ok(session) => session,
            Err(e) => {
                writeln!(self.out, "Error connecting to buddy: {}", e)?;
                return Ok(());
            }
        };

        match session.await_acceptance().await {
            Ok(HandshakeOutcome::Accepted) => {
                writeln!(self.out, "Buddy accepted connection.")?;
                self.chat(&mut session).await
            }
            Ok(HandshakeOutcome::Rejected) => {
                writeln!(self.out, "Buddy rejected connection.")?;
                Ok(())
            }
            Err(e) => {
                writeln!(self.out, "Error connecting to buddy: {}", e)?;
                Ok(())
            }
        }
    }

    async fn accept_connection(&mut self) -> Result<()> {
        let incoming = match self.app.pending().take() {
            Some(incoming) => incoming,
            None => {
                writeln!(self.out, "No pending connection!")?;
                return Ok(());
            }
        };

        let peer = incoming.peer_addr.to_string();
        debug!("Accepting {} after {:?}", peer, incoming.waited());
        let max_line = self.app.config().peer.max_line_length;
        match PeerSession::accept(incoming.stream, &peer, max_line).await {
            Ok(mut session) => {
                writeln!(self.out, "Connection accepted.")?;
                self.chat(&mut session).await
            }
            Err(e) => {
                writeln!(self.out, "Error in connection: {}", e)?;
                Ok(())
            }
        }
    }

    async fn reject_connection(&mut self) -> Result<()> {
        match self.app.pending().take() {
            Some(incoming) => {
                let peer = incoming.peer_addr.to_string();
                debug!("Rejecting {} after {:?}", peer, incoming.waited());
                PeerSession::reject(incoming.stream, &peer).await;
            }
            None => writeln!(self.out, "No pending connection!")?,
        }
        Ok(())
    }

    /// Relay a session in MESSAGING until it ends, printing peer lines as
    /// they arrive
    async fn chat<S>(&mut self, session: &mut PeerSession<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        writeln!(self.out, "{}", CHAT_INSTRUCTIONS)?;
        write!(self.out, "> ")?;
        self.out.flush()?;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let ended = {
            let run = session.run(&mut self.input, events_tx);
            tokio::pin!(run);
            loop {
                tokio::select! {
                    ended = &mut run => break ended,
                    Some(event) = events_rx.recv() => show_event(&mut self.out, event)?,
                }
            }
        };
        while let Ok(event) = events_rx.try_recv() {
            show_event(&mut self.out, event)?;
        }

        match ended {
            Ok(end) => debug!("Session ended: {:?}", end),
            Err(e) => warn!("Session failed: {}", e),
        }
        writeln!(self.out, "Buddy connection closed.")?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn print_menu(&mut self) -> Result<()> {
        writeln!(self.out, "{}", MENU)?;
        write!(self.out, "{}", self.app.config().cli.prompt)?;
        self.out.flush()?;
        Ok(())
    }

    /// Prompt and read one trimmed line; `None` when input has closed
    async fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.out, "{}", prompt)?;
        self.out.flush()?;
        Ok(self.input.recv().await.map(|line| line.trim().to_string()))
    }

    /// Require a login, then prompt for a buddy id
    async fn ask_buddy(&mut self) -> Result<Option<(String, String)>> {
        let identity = match self.app.state().require_identity() {
            Ok(identity) => identity,
            Err(BuddyError::NotLoggedIn) => {
                writeln!(self.out, "Must register or login first!")?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self
            .ask("Enter buddy id: ")
            .await?
            .map(|buddy_id| (identity.user_id.clone(), buddy_id)))
    }

    /// Print a directory response or the reason there is none
    fn report(
        &mut self,
        response: buddychat_core::BuddyResult<DirectoryResponse>,
    ) -> Result<Option<DirectoryResponse>> {
        match response {
            Ok(response) => {
                writeln!(self.out, "{}", response)?;
                Ok(Some(response))
            }
            Err(e) => {
                writeln!(self.out, "Error sending TCP message: {}", e)?;
                Ok(None)
            }
        }
    }
}

fn show_event<W: Write>(out: &mut W, event: SessionEvent) -> Result<()> {
    match event {
        SessionEvent::MessageReceived(line) => {
            writeln!(out, "\nB: {}", line)?;
            write!(out, "> ")?;
            out.flush()?;
        }
        SessionEvent::PeerDisconnected => debug!("Buddy hung up"),
    }
    Ok(())
}
