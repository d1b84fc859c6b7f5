//! Inspect a child's exit status, distinguishing exit codes from signals.
//!
//! Run with: cargo run --example exit_status

use childproc::{popen, ExitStatus};

fn main() -> childproc::Result<()> {
    let result = popen(vec!["sh".into(), "-c".into(), "exit 3".into()], vec![])?;
    match result.exit_status {
        ExitStatus::Exited(0) => println!("success"),
        ExitStatus::Exited(code) => println!("exited with code {code}"),
        ExitStatus::Signalled(sig) => println!("killed by signal {sig}"),
    }
    Ok(())
}
