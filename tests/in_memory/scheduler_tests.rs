//! Engine workers driven by the real scheduler.

use std::time::Duration;

use eyre::{ensure, eyre};
use rstest::rstest;
use stakeflow::{
    config::EngineConfig,
    task::domain::{Amount, TaskMetadata, TaskStatus},
    worker::TickReport,
};
use tokio::sync::broadcast::Receiver;

use super::helpers::{TestEngine, execution_config};

async fn report_from(
    reports: &mut Receiver<TickReport>,
    worker: &str,
) -> eyre::Result<TickReport> {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let report = reports.recv().await?;
            if report.worker == worker {
                return Ok::<_, eyre::Report>(report);
            }
        }
    })
    .await
    .map_err(|_| eyre!("no report from {worker}"))?
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn started_engine_advances_tasks_and_shuts_down() -> eyre::Result<()> {
    let harness = TestEngine::build(EngineConfig {
        stop_timeout_secs: 2,
        ..execution_config()
    })?;
    harness.ledger.seed_boost(Amount::from_whole(4));
    let task = harness
        .engine
        .create_unboost_task("4", "0xpayee", TaskMetadata::new())
        .await?;

    let mut reports = harness.engine.start()?;
    report_from(&mut reports, "unboost").await?;

    ensure!(harness.status(task.id()).await? == TaskStatus::Queued);
    ensure!(!harness.engine.toggle_worker("unboost")?);

    let summary = harness.engine.shutdown().await?;
    ensure!(summary.aborted == 0);
    ensure!(!harness.engine.is_running());
    Ok(())
}
