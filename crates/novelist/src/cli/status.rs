//! Status command handler.

use anyhow::Context;
use novelist_core::{NovelistConfig, RunId};
use novelist_pipeline::RunReport;
use novelist_storage::FileRunStore;
use tracing::instrument;

/// Handle `novelist status`: print the stored view of a run.
///
/// Reads only the state directory, so no API key is needed.
#[instrument(skip(config))]
pub async fn handle_status_command(run_id: &str, config: &NovelistConfig) -> anyhow::Result<()> {
    let run_id: RunId = run_id
        .parse()
        .with_context(|| format!("Invalid run id '{}'", run_id))?;
    let store = FileRunStore::new(config.run.state_dir.clone());
    let report = RunReport::load(&store, &run_id).await?;
    print!("{}", report);
    Ok(())
}
