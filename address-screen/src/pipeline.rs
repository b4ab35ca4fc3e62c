//! End-to-end screening of one CSV file

use crate::categories::CategoryCatalog;
use crate::client::{HttpRiskClient, RiskClient};
use crate::config::Config;
use crate::csv_io::{read_addresses, write_rows};
use crate::error::Result;
use crate::mapper::RecordMapper;
use crate::runner::BatchRunner;
use crate::types::RunSummary;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Screen `input` with the HTTP client and write the enriched CSV to `output`
pub async fn screen_file(
    config: &Config,
    input: &Path,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    config.validate()?;
    let client = HttpRiskClient::new(config)?;
    let catalog = CategoryCatalog::load(config.category_source, &client).await?;
    screen_file_with(config, Arc::new(client), catalog, input, output, cancel).await
}

/// Same as [`screen_file`] with an explicit client and catalog
pub async fn screen_file_with(
    config: &Config,
    client: Arc<dyn RiskClient>,
    catalog: CategoryCatalog,
    input: &Path,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    info!("Starting address screening: {} -> {}", input.display(), output.display());

    // All input problems surface before the first API call
    let batch = read_addresses(input, &config.address_column)?;
    let mapper = RecordMapper::new(&batch.columns, catalog, config.include_indirect)?;
    if batch.is_empty() {
        warn!("No addresses found in {}", input.display());
    }

    let runner = BatchRunner::new(config, client)?;
    let report = runner.run_until_cancelled(&batch.records, cancel).await?;

    let rows = mapper.map_all(&batch.records, &report.outcomes);
    write_rows(output, mapper.header(), &rows)?;

    let summary = report.summary;
    if summary.errors > 0 {
        warn!(
            "{} addresses failed to screen - check output file for details",
            summary.errors
        );
    }
    Ok(summary)
}
