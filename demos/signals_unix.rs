//! Deliver a signal to a child running in its own process group.
//!
//! Run with: cargo run --example signals_unix

#![cfg(unix)]

use childproc::{OutputRedirection, ProcessHandle};

fn main() -> childproc::Result<()> {
    let handle = ProcessHandle::new(
        vec!["sleep".into(), "30".into()],
        vec![],
        OutputRedirection::None,
        false,
        true,
        None,
    );
    handle.launch()?;
    println!("spawned pid {}, sending SIGTERM", handle.pid());
    handle.signal(libc::SIGTERM);
    let result = handle.wait()?;
    println!("exit: {}", result.exit_status);
    Ok(())
}
