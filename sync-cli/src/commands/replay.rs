//! Run a full session against a scripted transcript.
//!
//! A transcript is a JSON file holding the collaborator responses in the
//! order the session will ask for them:
//!
//! ```json
//! {
//!   "server":  { "key": "k", "server": "im.example/nim1", "ts": 1700, "pts": 90 },
//!   "history": [ { "new_pts": 100, "more": 0, "messages": [] } ],
//!   "polls":   [ { "ts": 1701, "updates": [[4, 1, 0, 55, 1000, "", "hi"]] } ]
//! }
//! ```
//!
//! The run ends when the poll batches are used up.

use anyhow::{bail, Context, Result};
use lpsync_client::{
    Credentials, ErrorKind, MockTransport, SessionConfig, StreamError, SyncSession,
};
use lpsync_types::{Message, Permissions, UserId};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::config::{load_resume_point, save_resume_point};

/// Scripted collaborator responses.
#[derive(Debug, Deserialize)]
pub struct Transcript {
    /// Response to the server descriptor request.
    pub server: Value,
    /// History pages in request order (`null` for an absent page).
    #[serde(default)]
    pub history: Vec<Value>,
    /// Poll batches in request order.
    #[serde(default)]
    pub polls: Vec<Value>,
}

impl Transcript {
    /// Load a transcript from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read transcript {}", path.display()))?;
        serde_json::from_str(&contents).context("Invalid transcript")
    }

    /// A mock transport that answers with this transcript.
    pub fn into_transport(self) -> MockTransport {
        let transport = MockTransport::new();
        transport.queue_server(self.server);
        for page in self.history {
            transport.queue_history(page);
        }
        for batch in self.polls {
            transport.queue_poll(batch);
        }
        transport
    }
}

/// Options for one replay.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// User the session runs as.
    pub user_id: i64,
    /// Whether the credentials carry the messages permission.
    pub messages_permission: bool,
    /// Ignore the persisted resume point.
    pub fresh: bool,
}

/// Run the replay command.
pub async fn run(
    data_dir: &Path,
    transcript: &Path,
    mut config: SessionConfig,
    options: &ReplayOptions,
) -> Result<()> {
    let transport = Transcript::load(transcript).await?.into_transport();

    let permissions = if options.messages_permission {
        Permissions::MESSAGES
    } else {
        Permissions::NONE
    };
    let credentials = Credentials::new(UserId::new(options.user_id), permissions);

    if !options.fresh {
        if let Some(resume) = load_resume_point(data_dir).await? {
            tracing::info!(
                "Resuming from pts={} (max message id {:?})",
                resume.sequence_number,
                resume.max_message_id
            );
            config = config.with_resume(resume);
        }
    }

    let session = SyncSession::new(transport.clone(), &credentials, config)
        .context("Cannot start session")?;
    let mut stream = session.subscribe();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut delivered = 0usize;
    // Cleared once messages were skipped; the next run must replay the gap
    let mut gapless = true;

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                tracing::info!("Interrupted, cancelling session");
                interrupted = true;
                session.cancel();
            }
            item = stream.next() => match item {
                Some(Ok(message)) => {
                    print_message(&message);
                    delivered += 1;
                    match stream.resume_point() {
                        Some(resume) if gapless => save_resume_point(data_dir, &resume).await?,
                        _ => {}
                    }
                }
                Some(Err(StreamError::Lagged(skipped))) => {
                    tracing::warn!(
                        "Output fell behind, {} message(s) skipped, resume point frozen",
                        skipped
                    );
                    gapless = false;
                }
                Some(Err(error)) => break Some(error),
                None => break None,
            }
        }
    };

    // Everything the worker emitted has been printed, so its own position
    // (which also covers empty pages) is safe to keep
    if gapless {
        save_resume_point(data_dir, &session.resume_point()).await?;
    }

    match outcome {
        None => {
            println!("cancelled after {} message(s)", delivered);
            Ok(())
        }
        Some(error) if is_exhausted(&error, &transport) => {
            println!("transcript exhausted after {} message(s)", delivered);
            Ok(())
        }
        Some(error) => bail!("Session failed: {}", error),
    }
}

fn print_message(message: &Message) {
    println!(
        "{} {} {}: {}",
        message.id, message.timestamp, message.from_user_id, message.body
    );
}

/// The session reached live polling and ran out of scripted batches.
fn is_exhausted(error: &StreamError, transport: &MockTransport) -> bool {
    error.kind() == Some(ErrorKind::Transport)
        && transport.pending_polls() == 0
        && !transport.poll_requests().is_empty()
}
