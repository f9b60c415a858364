//! Local input task
//!
//! Typed lines are read on a dedicated OS thread and forwarded over a
//! bounded channel, so neither the menu nor an outbound relay ever blocks
//! the runtime on the terminal. End of input closes the channel.

use std::io::BufRead;

use tokio::sync::mpsc;
use tracing::debug;

/// Forward lines from `reader` until it ends or the receiver is dropped
pub fn spawn_line_reader<R>(reader: R, capacity: usize) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    std::thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    debug!("Input read failed: {}", e);
                    break;
                }
            };
            let line = line.trim_end_matches('\r').to_string();
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
        debug!("Local input closed");
    });
    rx
}

/// Line reader over the process's standard input
pub fn spawn_stdin_reader(capacity: usize) -> mpsc::Receiver<String> {
    spawn_line_reader(std::io::BufReader::new(std::io::stdin()), capacity)
}
