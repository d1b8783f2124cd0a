//! # Example: fail_fast_vs_supervisor
//!
//! Runs a failing workload under both scope policies, side by side.
//!
//! Shows how to:
//! - Pick a policy with [`taskgrove::ScopeBuilder::policy`]
//! - Get failure reports through [`taskgrove::ScopeBuilder::on_failure`]
//! - See [`Policy::FailFast`] sweep the siblings of a failed task
//! - See [`Policy::Supervisor`] contain the failure to one task
//!
//! ## Flow
//! ```text
//! scope "pipeline" (FailFast)          scope "jobs" (Supervisor)
//!   ├─► fetch    loops, healthy          ├─► job-1  Ok(100)
//!   ├─► decode   fails after 300ms       ├─► job-2  Err("bad input")
//!   └─► persist  loops, healthy          └─► job-3  Ok(300)
//!
//! decode fails ─► whole scope swept     job-2 fails ─► job-1/3 unaffected
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example fail_fast_vs_supervisor
//! ```

use std::time::Duration;

use taskgrove::{Engine, Policy, TaskError};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let engine = Engine::builder().build()?;

    // --- FailFast: one broken stage stops the whole pipeline ---
    println!("=== FailFast pipeline ===");
    let pipeline = engine
        .scope("pipeline")
        .policy(Policy::FailFast)
        .on_failure(|task, error| println!("[pipeline] task {task} failed: {error}"))
        .build();

    let fetch = pipeline.launch(|cx| async move {
        loop {
            cx.sleep(Duration::from_millis(50)).await?;
            println!("[fetch] batch ready");
        }
    });
    let decode = pipeline.launch(|cx| async move {
        cx.sleep(Duration::from_millis(300)).await?;
        Err(TaskError::failed("unsupported codec"))
    });
    let persist = pipeline.launch(|cx| async move {
        loop {
            cx.sleep(Duration::from_millis(80)).await?;
            println!("[persist] flushed");
        }
    });

    for (name, handle) in [("fetch", fetch), ("decode", decode), ("persist", persist)] {
        match handle.wait().await {
            Ok(()) => println!("[pipeline] {name}: completed"),
            Err(e) if e.is_cancellation() => println!("[pipeline] {name}: swept ({e})"),
            Err(e) => println!("[pipeline] {name}: failed ({e})"),
        }
    }
    assert!(pipeline.is_cancelled());

    // --- Supervisor: failures stay with the task that raised them ---
    println!("\n=== Supervisor jobs ===");
    let jobs = engine
        .scope("jobs")
        .policy(Policy::Supervisor)
        .on_failure(|task, error| println!("[jobs] task {task} failed: {error}"))
        .build();

    let mut handles = Vec::new();
    for n in 1..=3u32 {
        handles.push(jobs.spawn(move |cx| async move {
            cx.sleep(Duration::from_millis(40 * u64::from(n))).await?;
            if n == 2 {
                return Err(TaskError::failed("bad input"));
            }
            Ok::<u32, TaskError>(n * 100)
        }));
    }
    for handle in handles {
        match handle.wait().await {
            Ok(v) => println!("[jobs] result: {v}"),
            Err(e) => println!("[jobs] error: {e}"),
        }
    }
    assert!(!jobs.is_cancelled());

    engine.shutdown().await?;
    println!("\n=== done ===");
    Ok(())
}
