pub mod backup;
pub mod migration;
pub mod tracker;

pub use backup::{BackupService, ExportDocument, ImportDocument, ImportSummary};
pub use migration::{MigrationService, MigrationStats};
pub use tracker::{ModuleOutcome, TrackerService};
