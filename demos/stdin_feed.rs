//! Feed a child's stdin after launch, then read its output back.
//!
//! Run with: cargo run --example stdin_feed

use std::io::Write;

use childproc::{OutputRedirection, ProcessHandle};

fn main() -> childproc::Result<()> {
    let handle = ProcessHandle::new(
        vec!["cat".into()],
        vec![],
        OutputRedirection::Collect { merge_stderr: false },
        false,
        false,
        None,
    );
    let mut stdin = handle.launch()?;
    stdin.write_all(b"fed from the parent\n")?;
    drop(stdin); // close stdin so `cat` sees EOF

    let result = handle.wait()?;
    println!("child echoed: {}", result.stdout_str()?.trim());
    Ok(())
}
