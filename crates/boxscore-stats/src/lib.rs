// Box-score import pipeline and shooting statistics.
//
// CSV text flows through `validate` (typed rows), `notation` (quarter
// strings to counts), `resolver` (teams, players, games) and `aggregator`
// (transactional writes). `rollup` and `metrics` serve the read side.

pub mod aggregator;
pub mod edit;
pub mod error;
pub mod metrics;
pub mod notation;
pub mod resolver;
pub mod rollup;
pub mod roster;
pub mod validate;

pub use aggregator::{GameImportResult, ImportOptions, StatsAggregator};
pub use error::{ImportError, ImportIssue};
pub use metrics::ShootingSummary;
pub use notation::{NotationMapping, ShotCounts};
pub use roster::{import_roster, ImportResult};
