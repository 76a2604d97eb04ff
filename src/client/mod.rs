//! CLI client for broker operations.
//!
//! Provides one-shot commands that connect to the broker, perform a
//! single request, print the result, and exit. Covers session
//! queries, capture/paste, and turn registry lookups.

mod broker_client;
mod format;

use crate::cli::ClientAction;
use broker_client::BrokerClient;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("broker: {0}")]
    Broker(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the client command.
///
/// Connects to the broker, performs the requested action, prints the
/// result, and returns. Called from `main.rs` for `Command::Client`.
pub async fn run(action: ClientAction) -> Result<(), ClientError> {
    let mut broker = BrokerClient::connect().await?;

    match action {
        ClientAction::ListSessions => {
            let sessions = broker.list_sessions().await?;
            format::print_sessions(&sessions);
        }
        ClientAction::ListTurns { session, limit } => {
            let turns = broker.list_turns(&session, limit).await?;
            format::print_turns(&turns);
        }
        ClientAction::GetTurn {
            turn_id,
            metadata_only,
        } => {
            let result = broker.get_turn(&turn_id).await?;
            format::print_turn(&turn_id, &result, metadata_only)?;
        }
        ClientAction::Capture { session } => {
            let result = broker.capture(&session).await?;
            format::print_capture(&result);
        }
        ClientAction::CaptureByID { turn_id } => {
            let result = broker.capture_by_id(&turn_id).await?;
            format::print_capture(&result);
        }
        ClientAction::Paste { session } => {
            broker.paste(&session).await?;
            format::print_paste(&session);
        }
    }

    Ok(())
}
