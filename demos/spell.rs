//! Streaming call against an in-process engine.
//!
//! Demonstrates:
//! - Pairing a runtime with an engine over `InprocTransport`
//! - Session start/stop
//! - Pulling a streamed result step by step
//! - Collapsed results from `call`
//!
//! Usage:
//!   cargo run --example spell
//!   cargo run --example spell -- "hello world"
//!   RUST_LOG=callmux=trace cargo run --example spell

// ============================================================================
// Imports
// ============================================================================

use anyhow::Context;
use callmux::{InprocTransport, InstructionType, Packet, PacketType, Runtime, Transport};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("callmux=info")),
        )
        .with_target(false)
        .init();

    let text = std::env::args().nth(1).unwrap_or_else(|| "abc".to_string());

    println!("=== spell ===\n");

    let (client, engine) = InprocTransport::pair();
    let engine = spawn_engine(engine);

    let runtime = Runtime::new(client);
    runtime.start().await.context("start session")?;
    println!("[Session] started");

    // ========================================================================
    // Streamed
    // ========================================================================

    {
        let mut letters = runtime.call_stream("spell", json!(text))?;
        while let Some(letter) = letters.next().await {
            println!("  step: {}", letter?);
        }
    }

    // ========================================================================
    // Collapsed
    // ========================================================================

    let all = runtime.call("spell", json!(text)).await?;
    println!("[Call] {all}");

    match runtime.call("shout", json!(text)).await {
        Ok(value) => println!("[Call] unexpected {value}"),
        Err(e) => println!("[Call] failed as expected: {e}"),
    }

    runtime.stop().await.context("stop session")?;
    println!("[Session] stopped");

    drop(runtime);
    engine.await.context("engine task")?;
    Ok(())
}

// ============================================================================
// Engine
// ============================================================================

/// Answers `spell` with one step per character until the client goes away.
fn spawn_engine(engine: InprocTransport) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(Some(packet)) = engine.recv().await {
            let Ok(txid) = packet.txid() else {
                continue;
            };

            match (packet.packet_type, packet.instruction_type) {
                (PacketType::Connect | PacketType::Disconnect, _) => {
                    engine.send_wait(Packet::respond_ok(txid)).await;
                }
                (PacketType::Execute, Some(InstructionType::CallFunction))
                    if packet.headers.get(1) == Some(&json!("spell")) =>
                {
                    let text = packet
                        .body
                        .get("in")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let count = text.chars().count();

                    if count == 0 {
                        engine
                            .send_wait(Packet::respond_execute_ok(txid, 0, true, Value::Null))
                            .await;
                        continue;
                    }

                    for (i, c) in text.chars().enumerate() {
                        let out = json!(c.to_string());
                        let step = Packet::respond_execute_ok(txid, i as u64, i + 1 == count, out);
                        engine.send_wait(step).await;
                    }
                }
                (PacketType::Execute, _) => {
                    engine
                        .send_wait(Packet::respond_execute_err(txid, 0, "unknown instruction"))
                        .await;
                }
                _ => {}
            }
        }
    })
}
