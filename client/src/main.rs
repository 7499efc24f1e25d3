//! Gavel terminal client.
//!
//! Connects a team owner to the auction coordinator: renders server
//! events as console lines and turns typed commands into wire messages.
//!
//! Usage: `client <team-name> [addr]` (addr defaults to 127.0.0.1:7450).
//!
//! Commands:
//!   register <owner> <city> <budget>   first-time registration
//!   ready                              signal readiness for the round
//!   bid <amount>                       raise the current bid
//!   quit                               disconnect

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gavel_common::TeamId;
use gavel_protocol::{
    decode_line, encode_line, BidRejection, ClientMessage, RegistrationRejection, ServerMessage,
};

fn render(msg: &ServerMessage) {
    match msg {
        ServerMessage::Welcome {
            team,
            resumed,
            budget,
        } => {
            if *resumed {
                println!("Welcome back, {team}. Remaining budget: {budget}");
            } else {
                println!("Registered as {team}. Budget: {budget}");
            }
        }
        ServerMessage::RegistrationRequired { team } => {
            println!("{team} is not registered yet.");
            println!("Type: register <owner> <city> <budget>");
        }
        ServerMessage::RegistrationRejected { reason } => match reason {
            RegistrationRejection::Full { max } => {
                println!("Auction is full ({max} teams). Try again later.");
            }
            RegistrationRejection::InvalidName => {
                println!("That team name is not valid.");
            }
            RegistrationRejection::AlreadyConnected => {
                println!("This team is already connected from another client.");
            }
        },
        ServerMessage::ItemAnnounced {
            player,
            role,
            base_price,
        } => {
            println!("--- Up next: {player} ({role}), base price {base_price} ---");
            println!("Type 'ready' when you are set.");
        }
        ServerMessage::ReadyAck { player } => {
            println!("Ready for {player}. Waiting for the other teams...");
        }
        ServerMessage::Ineligible { player, reason } => {
            println!("You are sitting out the round for {player}: {reason}");
        }
        ServerMessage::RoundOpened {
            player,
            base_price,
            closes_at,
        } => {
            println!("Bidding open for {player} at base {base_price}, closes {closes_at}.");
            println!("Type 'bid <amount>'.");
        }
        ServerMessage::BidAccepted {
            team,
            amount,
            player,
        } => {
            println!("{team} bids {amount} for {player}.");
        }
        ServerMessage::BidRejected { reason } => match reason {
            BidRejection::TooLow { current } => {
                println!("Bid rejected: must exceed the current bid of {current}.");
            }
            BidRejection::OverBudget { available } => {
                println!("Bid rejected: only {available} left in your budget.");
            }
            BidRejection::RoundClosed => {
                println!("Bid rejected: bidding is closed.");
            }
        },
        ServerMessage::SaleResolved {
            player,
            team,
            amount,
        } => {
            println!("SOLD: {player} to {team} for {amount}.");
        }
        ServerMessage::SaleWon {
            player,
            amount,
            remaining_budget,
        } => {
            println!("You won {player} for {amount}! Remaining budget: {remaining_budget}");
        }
        ServerMessage::PlayerUnsold { player } => {
            println!("UNSOLD: no bids for {player}.");
        }
        ServerMessage::PlayerSkipped { player } => {
            println!("SKIPPED: nobody can afford {player}'s base price.");
        }
        ServerMessage::AuctionComplete => {
            println!("=== Auction complete. ===");
        }
        ServerMessage::Error { code, message } => {
            println!("Server error [{code}]: {message}");
        }
    }
}

/// Parse a typed console line into a wire message.
///
/// Owner names may contain spaces, so `register` takes the budget from
/// the last token and the city from the one before it.
fn parse_command(line: &str) -> Result<Option<ClientMessage>, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, rest)) = tokens.split_first() else {
        return Ok(None);
    };

    match head.to_ascii_lowercase().as_str() {
        "ready" => Ok(Some(ClientMessage::Ready)),
        "bid" => {
            let [amount] = rest else {
                return Err("usage: bid <amount>".to_string());
            };
            let amount = amount
                .parse()
                .map_err(|_| format!("'{amount}' is not an amount"))?;
            Ok(Some(ClientMessage::Bid { amount }))
        }
        "register" => {
            if rest.len() < 3 {
                return Err("usage: register <owner> <city> <budget>".to_string());
            }
            let budget = rest[rest.len() - 1]
                .parse()
                .map_err(|_| format!("'{}' is not a budget", rest[rest.len() - 1]))?;
            let city = rest[rest.len() - 2].to_string();
            let owner = rest[..rest.len() - 2].join(" ");
            Ok(Some(ClientMessage::Register {
                owner,
                city,
                budget,
            }))
        }
        "quit" | "exit" => Err("quit".to_string()),
        other => Err(format!("unknown command '{other}'")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(team_name) = args.next() else {
        bail!("usage: client <team-name> [addr]");
    };
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:7450".to_string());

    let team = TeamId::new(&team_name);
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("cannot reach coordinator at {addr}"))?;
    let (read_half, mut writer) = stream.into_split();

    let mut hello = encode_line(&ClientMessage::Hello { team })?;
    hello.push('\n');
    writer.write_all(hello.as_bytes()).await?;

    // Render server events until the coordinator closes the connection.
    let mut reader_task = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match decode_line::<ServerMessage>(&line) {
                Ok(msg) => render(&msg),
                Err(e) => eprintln!("unreadable server message: {e}"),
            }
        }
        println!("Disconnected from coordinator.");
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = &mut reader_task => break,
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Some(msg)) => {
                        let mut out = encode_line(&msg)?;
                        out.push('\n');
                        if writer.write_all(out.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) if e == "quit" => break,
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    Ok(())
}
