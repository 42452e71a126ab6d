//! Show or reset the persisted resume point.

use anyhow::Result;
use std::path::Path;

use crate::config::{clear_resume_point, load_resume_point};

/// Run the state command.
pub async fn run(data_dir: &Path, reset: bool) -> Result<()> {
    if reset {
        if clear_resume_point(data_dir).await? {
            println!("Resume point cleared.");
        } else {
            println!("No resume point stored.");
        }
        return Ok(());
    }

    match load_resume_point(data_dir).await? {
        Some(resume) => {
            println!("Resume point:");
            println!("  Sequence cursor: {}", resume.sequence_number);
            match resume.max_message_id {
                Some(id) => println!("  Max message id:  {}", id),
                None => println!("  Max message id:  none"),
            }
        }
        None => {
            println!("No resume point stored.");
            println!();
            println!("Run 'lpsync replay <transcript>' to create one.");
        }
    }

    Ok(())
}
