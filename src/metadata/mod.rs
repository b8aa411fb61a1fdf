mod journal;
mod reconcile;
mod record;

pub use journal::{load_journal, parse_journal, save_journal};
pub use reconcile::{ReconcileReport, reconcile};
pub use record::{DownloadTicket, EpisodeMetadata, MetadataMap};
