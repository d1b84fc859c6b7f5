//! Stream output as it arrives instead of waiting for the whole capture.
//!
//! Run with: cargo run --example streaming

use std::sync::Arc;

use childproc::{OutputRedirection, ProcessHandle};

fn main() -> childproc::Result<()> {
    env_logger::init();

    let handle = ProcessHandle::new(
        vec![
            "sh".into(),
            "-c".into(),
            "for i in 1 2 3; do echo line $i; sleep 0.1; done".into(),
        ],
        vec![],
        OutputRedirection::Stream {
            on_stdout: Some(Arc::new(|chunk: &[u8]| {
                print!("{}", String::from_utf8_lossy(chunk));
            })),
            on_stderr: None,
            merge_stderr: false,
        },
        false,
        false,
        None,
    );
    handle.launch()?;
    let result = handle.wait()?;
    println!("exit: {}", result.exit_status);
    Ok(())
}
