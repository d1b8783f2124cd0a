//! # Example: cancel_and_cooperate
//!
//! Cooperative cancellation, from the outside in.
//!
//! Shows how to:
//! - Cancel a task tree with [`taskgrove::TaskHandle::cancel_with`]
//! - Observe requests at checkpoints ([`taskgrove::TaskContext::sleep`],
//!   [`taskgrove::TaskContext::checkpoint`])
//! - See a checkpoint-free body run to its natural end yet settle `Cancelled`
//! - Get the terminal [`Outcome`] through `invoke_on_completion`
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► parent task ──► child task        both beat at checkpoints
//!   ├─► stubborn task                     no checkpoints at all
//!   ├─► sleep 500ms
//!   ├─► parent.cancel_with("plans changed")
//!   │       parent and child are both marked, then their tokens fire;
//!   │       each stops at its next checkpoint
//!   ├─► stubborn.cancel()
//!   │       its body finishes anyway, but the value is discarded
//!   └─► engine.shutdown()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example cancel_and_cooperate
//! ```

use std::time::Duration;

use taskgrove::{CancelReason, Engine, Outcome, TaskError};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let engine = Engine::builder().build()?;
    let scope = engine.scope("demo").build();

    // 1. Parent and child both beat at checkpoints; the parent just waits
    //    on its child.
    let parent = scope.launch(|cx| async move {
        let child = cx.launch(|cx| async move {
            let mut beat = 0u32;
            loop {
                cx.sleep(Duration::from_millis(150)).await?;
                beat += 1;
                println!("[child]  beat #{beat}");
            }
        })?;
        child.join(&cx).await
    });
    parent.invoke_on_completion(|outcome| match outcome {
        Outcome::Cancelled(reason) => println!("[parent] settled: cancelled ({reason})"),
        other => println!("[parent] settled: {other:?}"),
    });

    // 2. A body with no checkpoints: the request cannot interrupt it.
    let stubborn = scope.spawn(|_cx| async move {
        println!("[stubborn] computing, no checkpoints...");
        tokio::time::sleep(Duration::from_millis(700)).await;
        println!("[stubborn] finished its work anyway");
        Ok::<u64, TaskError>(41 * 2)
    });

    tokio::time::sleep(Duration::from_millis(500)).await;

    // 3. One call sweeps the parent's whole tree.
    println!("[main] cancelling the parent tree");
    parent.cancel_with(CancelReason::user().with_message("plans changed"));
    stubborn.cancel();

    match parent.wait().await {
        Err(e) if e.is_cancellation() => println!("[main] parent: {e}"),
        other => println!("[main] parent: {other:?}"),
    }
    match stubborn.wait().await {
        Err(e) if e.is_cancellation() => println!("[main] stubborn: {e}"),
        other => println!("[main] stubborn: {other:?}"),
    }

    engine.shutdown().await?;
    println!("=== done ===");
    Ok(())
}
