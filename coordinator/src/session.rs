//! Per-connection session handling.
//!
//! One task per connected team client: a registration dialogue binds the
//! connection to a team identity, then a command loop feeds readiness
//! signals and raise attempts into the shared barrier and ledger.
//! Sessions read persisted budgets through the directory at bid time but
//! never write to it; budget mutation belongs to the coordinator alone.

use std::sync::Arc;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf,
};
use tracing::{info, warn};

use gavel_common::{AuctionError, Result, SessionId, Team, TeamId};
use gavel_directory::{CreateOutcome, Directory};
use gavel_protocol::{
    decode_line, encode_line, BidRejection, ClientMessage, RegistrationRejection, ServerMessage,
};

use crate::barrier::ReadinessBarrier;
use crate::coordinator::AuctionCoordinator;
use crate::ledger::{BidLedger, RaiseOutcome};
use crate::metrics::SharedMetrics;
use crate::registry::{SessionHandle, SessionRegistry};

/// Shared state a registered session needs to handle commands.
pub struct SessionContext {
    team: TeamId,
    registry: Arc<SessionRegistry>,
    ledger: Arc<BidLedger>,
    barrier: Arc<ReadinessBarrier>,
    directory: Arc<dyn Directory>,
    metrics: SharedMetrics,
}

impl SessionContext {
    /// Bind a team identity to the coordinator's shared state.
    pub fn new(team: TeamId, coordinator: &AuctionCoordinator) -> Self {
        Self {
            team,
            registry: coordinator.registry(),
            ledger: coordinator.ledger(),
            barrier: coordinator.barrier(),
            directory: coordinator.directory(),
            metrics: coordinator.metrics(),
        }
    }

    /// Handle one inbound command. Input errors and policy rejections
    /// are absorbed here; nothing propagates past the session boundary.
    pub async fn handle_message(&self, msg: ClientMessage) {
        match msg {
            ClientMessage::Ready => {
                if self.barrier.mark_ready(&self.team) {
                    if let Some(player) = self.barrier.current_item() {
                        self.registry
                            .unicast(&self.team, ServerMessage::ReadyAck { player });
                    }
                }
                // Ready from an ineligible team is a no-op; it already
                // received the ineligible notice for this round.
            }
            ClientMessage::Bid { amount } => self.handle_bid(amount).await,
            ClientMessage::Hello { .. } | ClientMessage::Register { .. } => {
                self.send_error("INVALID_MESSAGE", "session is already registered");
            }
        }
    }

    async fn handle_bid(&self, amount: u64) {
        // Always the persisted budget, never a cached copy: a resumed
        // session must see debits from earlier rounds.
        let budget = match self.directory.find_team(&self.team).await {
            Ok(Some(team)) => team.budget,
            Ok(None) => {
                self.send_error("UNKNOWN_TEAM", "no directory record for this team");
                return;
            }
            Err(e) => {
                warn!(team = %self.team, error = %e, "Budget lookup failed for bid");
                self.send_error(e.error_code(), "could not verify budget, bid not placed");
                return;
            }
        };

        match self.ledger.try_raise(&self.team, amount, budget) {
            RaiseOutcome::Accepted { amount, player } => {
                self.metrics.bid_accepted();
                self.registry.broadcast(ServerMessage::BidAccepted {
                    team: self.team.clone(),
                    amount,
                    player,
                });
            }
            RaiseOutcome::TooLow { current } => {
                self.metrics.bid_rejected();
                self.reject_bid(BidRejection::TooLow { current });
            }
            RaiseOutcome::OverBudget { available } => {
                self.metrics.bid_rejected();
                self.reject_bid(BidRejection::OverBudget { available });
            }
            RaiseOutcome::RoundClosed => {
                self.metrics.bid_rejected();
                self.reject_bid(BidRejection::RoundClosed);
            }
        }
    }

    fn reject_bid(&self, reason: BidRejection) {
        self.registry
            .unicast(&self.team, ServerMessage::BidRejected { reason });
    }

    fn send_error(&self, code: &str, message: &str) {
        self.registry.unicast(
            &self.team,
            ServerMessage::Error {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
    }
}

async fn send_direct<W: AsyncWrite + Unpin>(writer: &mut W, msg: &ServerMessage) -> Result<()> {
    let mut line = encode_line(msg).map_err(|e| AuctionError::SessionIo(e.to_string()))?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| AuctionError::SessionIo(e.to_string()))
}

async fn next_message<R: AsyncRead>(
    reader: &mut Lines<BufReader<ReadHalf<R>>>,
) -> Result<Option<ClientMessage>> {
    loop {
        let line = reader
            .next_line()
            .await
            .map_err(|e| AuctionError::SessionIo(e.to_string()))?;
        let Some(line) = line else {
            return Ok(None);
        };
        if line.trim().is_empty() {
            continue;
        }
        return Ok(Some(decode_line(&line).map_err(|e| {
            AuctionError::InvalidMessage {
                message: e.to_string(),
                field: None,
            }
        })?));
    }
}

/// Registration dialogue: HELLO, then REGISTER for a new identity.
///
/// Returns the bound team record, or None when the connection should be
/// closed without a session (bad handshake, invalid name).
async fn negotiate<S: AsyncRead + AsyncWrite>(
    reader: &mut Lines<BufReader<ReadHalf<S>>>,
    writer: &mut WriteHalf<S>,
    directory: &Arc<dyn Directory>,
) -> Result<Option<(Team, bool)>>
where
    ReadHalf<S>: AsyncRead + Unpin,
    WriteHalf<S>: AsyncWrite + Unpin,
{
    let hello = match next_message::<S>(reader).await {
        Ok(Some(msg)) => msg,
        Ok(None) => return Ok(None),
        Err(AuctionError::InvalidMessage { message, .. }) => {
            send_direct(
                writer,
                &ServerMessage::Error {
                    code: "INVALID_MESSAGE".to_string(),
                    message,
                },
            )
            .await?;
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let ClientMessage::Hello { team } = hello else {
        send_direct(
            writer,
            &ServerMessage::Error {
                code: "INVALID_MESSAGE".to_string(),
                message: "expected HELLO".to_string(),
            },
        )
        .await?;
        return Ok(None);
    };

    if !team.is_valid() {
        send_direct(
            writer,
            &ServerMessage::RegistrationRejected {
                reason: RegistrationRejection::InvalidName,
            },
        )
        .await?;
        return Ok(None);
    }

    if let Some(record) = directory.find_team(&team).await? {
        return Ok(Some((record, true)));
    }

    send_direct(writer, &ServerMessage::RegistrationRequired { team: team.clone() }).await?;

    let details = match next_message::<S>(reader).await {
        Ok(Some(ClientMessage::Register { owner, city, budget })) => (owner, city, budget),
        Ok(Some(_)) | Err(AuctionError::InvalidMessage { .. }) => {
            send_direct(
                writer,
                &ServerMessage::Error {
                    code: "INVALID_MESSAGE".to_string(),
                    message: "expected REGISTER with owner, city, budget".to_string(),
                },
            )
            .await?;
            return Ok(None);
        }
        Ok(None) => return Ok(None),
        Err(e) => return Err(e),
    };

    let record = Team::new(team.clone(), details.0, details.1, details.2);
    match directory.create_team(&record).await? {
        CreateOutcome::Created => Ok(Some((record, false))),
        // Lost a create race against another connection for the same
        // name; fall back to the stored record.
        CreateOutcome::Duplicate => {
            let record = directory.find_team(&team).await?.ok_or_else(|| {
                AuctionError::Directory(format!("team {team} vanished after duplicate create"))
            })?;
            Ok(Some((record, true)))
        }
    }
}

/// Run one session to completion over any byte stream.
///
/// The connection is unregistered from the registry and the barrier on
/// any exit path, so a disconnect can never wedge a round.
pub async fn run_session<S>(stream: S, coordinator: Arc<AuctionCoordinator>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half).lines();
    let mut writer = write_half;

    let registry = coordinator.registry();
    let barrier = coordinator.barrier();
    let metrics = coordinator.metrics();
    let directory = coordinator.directory();

    let Some((record, resumed)) = negotiate::<S>(&mut reader, &mut writer, &directory).await?
    else {
        return Ok(());
    };
    let team = record.name.clone();

    let session_id = SessionId::new();
    let (handle, mut rx) = SessionHandle::new(session_id);
    if let Err(e) = registry.register(team.clone(), handle) {
        metrics.session_rejected();
        let reason = match &e {
            AuctionError::RegistryFull { max } => RegistrationRejection::Full { max: *max },
            _ => RegistrationRejection::AlreadyConnected,
        };
        send_direct(&mut writer, &ServerMessage::RegistrationRejected { reason }).await?;
        info!(team = %team, error = %e, "Admission rejected");
        return Ok(());
    }
    metrics.session_admitted();

    // Writer task drains the registry channel for this session; it ends
    // when the handle is dropped at unregister.
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if send_direct(&mut writer, &msg).await.is_err() {
                break;
            }
        }
    });

    registry.unicast(
        &team,
        ServerMessage::Welcome {
            team: team.clone(),
            resumed,
            budget: record.budget,
        },
    );
    info!(team = %team, session = %session_id, resumed, "Session established");

    let ctx = SessionContext::new(team.clone(), &coordinator);
    loop {
        match next_message::<S>(&mut reader).await {
            Ok(Some(msg)) => ctx.handle_message(msg).await,
            Ok(None) => break,
            Err(AuctionError::InvalidMessage { message, .. }) => {
                // Local to this session; round state is untouched.
                ctx.send_error("INVALID_MESSAGE", &message);
            }
            Err(e) => {
                warn!(team = %team, error = %e, "Session read failed");
                break;
            }
        }
    }

    registry.unregister(&team, session_id);
    barrier.mark_departed(&team);
    writer_task.abort();
    info!(team = %team, session = %session_id, "Session closed");
    Ok(())
}
