// Manage spawnpoints against an engine that supports multiple sessions

use anyhow::Result;
use dbgp_client::{DbgpConfig, DbgpError, DbgpSession};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("dbgp_client=debug")
        .init();

    let mut args = std::env::args().skip(1);
    let uri = args.next().unwrap_or_else(|| "file:///tmp/worker.tcl".to_string());
    let line: u32 = args.next().and_then(|l| l.parse().ok()).unwrap_or(10);

    // Connect to a DBGP proxy or an engine listening for the IDE
    let session = DbgpSession::connect("127.0.0.1", 9000, DbgpConfig::default()).await?;
    session.add_termination_listener(Arc::new(|id: u64, error: Option<&DbgpError>| match error {
        Some(e) => println!("✗ Session {} ended: {}", id, e),
        None => println!("✓ Session {} ended", id),
    }));

    let spawnpoint = session.set_spawnpoint(&uri, line, true).await?;
    println!("🎯 Spawnpoint {} at {}:{}", spawnpoint.id, spawnpoint.filename, spawnpoint.line_number);

    session.update_spawnpoint(&spawnpoint.id, Some(false), None).await?;
    for sp in session.list_spawnpoints().await? {
        println!(
            "   {} {}:{} ({})",
            sp.id,
            sp.filename,
            sp.line_number,
            if sp.enabled { "enabled" } else { "disabled" }
        );
    }

    session.remove_spawnpoint(&spawnpoint.id).await?;
    println!("✓ Spawnpoint removed");

    session.request_termination().await;
    session.wait_terminated().await;
    Ok(())
}
