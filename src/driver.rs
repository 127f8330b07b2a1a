//! Single-process driver.
//!
//! [`prepare`] creates the output dataset and partitions the input;
//! [`run_local`] stands in for a distributed scheduler and feeds every block
//! to [`process_block`] within one process.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use blockwise_view::Numeric;

use crate::config::RunConfig;
use crate::executor::{process_block, BlockJob, BlockOutcome, WorkerContext};
use crate::grid::{create, GridBlock};
use crate::storage::{DatasetAttributes, StorageFactory};
use crate::Result;

/// Counts of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub blocks: usize,
    pub written: usize,
    pub skipped: usize,
}

/// Read the input attributes, create the output dataset and partition the
/// array into compute blocks numbered on the output storage grid.
///
/// The output keeps the input's dimensions; its block size and the compute
/// block size come from `config`.
pub fn prepare<T: Numeric>(
    factory: &dyn StorageFactory<T>,
    config: &RunConfig,
) -> Result<Vec<GridBlock>> {
    config.validate()?;
    let reader = factory.open_reader(&config.input_location)?;
    let input = reader.read_attributes(&config.input_dataset)?;

    let output = DatasetAttributes::new(
        input.dimensions.clone(),
        config.output_block_size_for(&input.block_size),
    )?;
    let writer = factory.open_writer(&config.output_location)?;
    writer.create_dataset(&config.output_dataset, &output)?;

    let grid_block_size = config.grid_block_size_for(&output.block_size);
    let blocks = create(&output.dimensions, &grid_block_size, &output.block_size)?;
    tracing::info!(
        dimensions = ?output.dimensions,
        ?grid_block_size,
        out_block_size = ?output.block_size,
        blocks = blocks.len(),
        "partitioned input"
    );
    Ok(blocks)
}

/// Process `blocks` with one shared [`WorkerContext`].
///
/// Stops at the first failing block and returns its error.
pub fn run_local<T: Numeric>(
    context: &WorkerContext<T>,
    job: &BlockJob,
    blocks: &[GridBlock],
) -> Result<RunSummary> {
    #[cfg(feature = "parallel")]
    let outcomes = blocks
        .par_iter()
        .map(|block| process_block(context, job, block))
        .collect::<Result<Vec<_>>>()?;
    #[cfg(not(feature = "parallel"))]
    let outcomes = blocks
        .iter()
        .map(|block| process_block(context, job, block))
        .collect::<Result<Vec<_>>>()?;

    let written = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, BlockOutcome::Written { .. }))
        .count();
    let summary = RunSummary {
        blocks: blocks.len(),
        written,
        skipped: blocks.len() - written,
    };
    tracing::info!(?summary, "run finished");
    Ok(summary)
}
