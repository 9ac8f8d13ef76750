//! Message sources for the demo binary.
//!
//! Two kinds of producer feed the channel:
//! - **Synthetic**: cycles through clicks, keys, and ticks with a short pause
//!   between writes, standing in for a UI event source
//! - **Script**: replays a JSON-lines file, one message per line

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use msgpump::{ChannelWriter, Message, Tick};
use tracing::{debug, info};

/// Pause between synthetic writes.
const SYNTHETIC_INTERVAL: Duration = Duration::from_millis(5);

/// The `seq`-th message of synthetic producer `id`.
pub fn synthetic_message(id: usize, seq: usize) -> Message {
    match seq % 3 {
        0 => Message::click(id as i32, seq as i32),
        1 => Message::key(char::from(b'a' + (seq % 26) as u8)),
        _ => Message::Tick(Tick::now()),
    }
}

/// Write `count` synthetic messages. Returns how many were accepted.
pub async fn run_synthetic(writer: ChannelWriter, id: usize, count: usize) -> Result<usize> {
    for seq in 0..count {
        writer
            .write(synthetic_message(id, seq))
            .with_context(|| format!("producer {} failed to write message {}", id, seq))?;
        tokio::time::sleep(SYNTHETIC_INTERVAL).await;
    }
    debug!(producer = id, count, "synthetic producer finished");
    Ok(count)
}

/// Parse a JSON-lines script. Blank lines and lines starting with `#` are skipped.
pub fn parse_script(source: &str) -> Result<Vec<Message>> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line.trim())
                .with_context(|| format!("invalid message on line {}", n + 1))
        })
        .collect()
}

/// Replay a script file into the channel. Returns how many were written.
pub async fn run_script(writer: ChannelWriter, path: &Path) -> Result<usize> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read script {}", path.display()))?;
    let messages = parse_script(&source)?;
    let count = messages.len();

    for message in messages {
        writer.write(message).context("script producer failed to write")?;
    }
    info!(path = %path.display(), count, "script replayed");
    Ok(count)
}
