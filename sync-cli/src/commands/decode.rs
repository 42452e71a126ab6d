//! Decode a single wire event.

use anyhow::{bail, Context, Result};
use lpsync_core::{decode, DomainEvent};
use lpsync_types::WireEvent;

/// Run the decode command.
pub fn run(input: &str) -> Result<()> {
    let event: WireEvent =
        serde_json::from_str(input).context("Event must be a JSON array")?;

    match decode(&event) {
        DomainEvent::NewMessage(message) => {
            println!("new message {}", message.id);
            println!("  from:  {}", message.from_user_id);
            println!("  date:  {}", message.timestamp);
            println!("  flags: {}", message.flags);
            if !message.title.is_empty() {
                println!("  title: {}", message.title);
            }
            println!("  body:  {}", message.body);
            if let Some(attachments) = message.attachments {
                println!("  attachments: {}", attachments);
            }
        }
        DomainEvent::Ignored(code) => {
            println!("ignored {:?} (code {})", code, code as i64);
        }
        DomainEvent::DecodeError(error) => bail!("Decode error: {}", error),
    }

    Ok(())
}
