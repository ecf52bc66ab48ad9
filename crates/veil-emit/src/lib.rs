/*! Everything the pipeline leaves behind besides the final text.
 *
 * Snapshots go to disk one file per step so any two stages can be diffed, and a run report sums up
 * what each pass did, either for a terminal or as JSON for other tools.
 */

pub mod output;
pub mod report;
pub mod snapshots;

pub use output::{JsonFormatter, OutputFormat, OutputFormatter, TextFormatter};
pub use report::{PassSummary, RunReport};
pub use snapshots::SnapshotWriter;
