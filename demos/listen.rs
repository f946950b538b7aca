// Wait for one engine, step through a few lines and dump the stack
//
// Start an engine against port 9000, e.g.
//   php -dxdebug.mode=debug -dxdebug.start_with_request=yes script.php

use dbgp_client::{DbgpConfig, DbgpServer, SessionStatus, StreamMode, TracingPacketLogger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("dbgp_client=debug")
        .init();

    let server = DbgpServer::bind("127.0.0.1:9000", DbgpConfig::default()).await?;
    println!("🔌 Waiting for an engine on {}...\n", server.local_addr()?);

    let session = server.accept().await?;
    session.add_packet_logger(Arc::new(TracingPacketLogger));
    if let Some(init) = session.init_packet() {
        println!(
            "✓ {} engine connected: {}",
            init.language.as_deref().unwrap_or("unknown"),
            init.fileuri.as_deref().unwrap_or("?")
        );
    }

    session.redirect_stdout(StreamMode::Copy).await?;

    for _ in 0..5 {
        let status = session.step_into().await?;
        if status.status != SessionStatus::Break {
            println!("Engine is {}, stopping", status.status);
            break;
        }

        let frames = session.stack_get(None).await?;
        if let Some(top) = frames.first() {
            println!("→ {}:{} {}", top.filename, top.line_number, top.location.as_deref().unwrap_or(""));
        }

        for variable in session.context_get(None, None).await? {
            println!("    {} = {}", variable.name, variable.value.as_deref().unwrap_or("…"));
        }
    }

    println!("\n🧹 Detaching...");
    session.detach().await?;
    session.request_termination().await;
    session.wait_terminated().await;
    println!("✓ Session closed");

    Ok(())
}
