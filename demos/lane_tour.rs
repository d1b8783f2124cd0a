//! # Example: lane_tour
//!
//! Walks every execution lane the engine offers.
//!
//! Shows how to:
//! - Pin a scope to a lane with [`taskgrove::ScopeBuilder::lane`]
//! - Override the lane per task with [`taskgrove::Scope::spawn_on`]
//! - Observe lane behavior: strict ordering on `single:*`, the inline
//!   first poll of `unconfined`
//! - Watch the run through the built-in [`LogWriter`] subscriber
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► Engine::builder().with_subscribers([LogWriter]).build()
//!   ├─► scope "tour"
//!   │     ├─► spawn_on(Main)       reports its thread
//!   │     ├─► spawn_on(CpuBound)   reports its thread
//!   │     ├─► spawn_on(IoBound)    reports its thread
//!   │     ├─► 3 × launch_on(single:ledger)    strict FIFO, one worker
//!   │     └─► spawn_on(Unconfined) first poll inline, rest on io
//!   └─► engine.shutdown()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example lane_tour --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use taskgrove::{Engine, Lane, LogWriter, Subscribe, TaskError};

fn here() -> String {
    std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    println!("=== lane_tour ===\n");

    // 1. Engine with the stdout subscriber attached, so every lifecycle
    //    event of the tour is visible below.
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let engine = Engine::builder().with_subscribers(subs).build()?;
    let scope = engine.scope("tour").build();

    // 2. One probe per pooled lane: each reports the thread it polls on.
    for lane in [Lane::Main, Lane::CpuBound, Lane::IoBound] {
        let label = lane.as_label();
        let probe = scope.spawn_on(lane, |cx| async move {
            cx.checkpoint()?;
            Ok::<String, TaskError>(here())
        });
        println!("[probe] {label:<4} polled on '{}'", probe.wait().await?);
    }

    // 3. Named single lane: one worker, dispatch order, never overlapping.
    println!("\n[ledger] three deposits, strict order:");
    let mut deposits = Vec::new();
    for n in 1..=3 {
        deposits.push(scope.launch_on(Lane::single("ledger"), move |cx| async move {
            cx.checkpoint()?;
            println!("[ledger]   deposit #{n} on '{}'", here());
            std::thread::sleep(Duration::from_millis(20));
            println!("[ledger]   deposit #{n} booked");
            Ok(())
        }));
    }
    for deposit in deposits {
        deposit.wait().await?;
    }

    // 4. Unconfined: the body starts on this very thread, then hops to the
    //    io pool at its first suspend point.
    let stages = scope.spawn_on(Lane::Unconfined, |cx| async move {
        let before = here();
        cx.sleep(Duration::from_millis(50)).await?;
        Ok::<(String, String), TaskError>((before, here()))
    });
    let (before, after) = stages.wait().await?;
    println!("\n[unconfined] first poll on '{before}', resumed on '{after}'");

    engine.shutdown().await?;
    println!("\n=== done ===");
    Ok(())
}
