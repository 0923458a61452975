//! Collecting training data from mitmproxy traffic dumps.
//!
//! A dump is a sequence of tnetstring encoded flow dicts ([tnetstring]). The
//! HTTP ones with a response become [HttpFlow]s, which a [Collector] turns into
//! users and thumbnail images. [export()] writes those out as the csv tables
//! and jpg files the training loader reads.
//!
//! ```no_run
//! # fn main() -> Result<(), instafly::Error> {
//! use instafly::dump::{collect, CollectorConfig};
//! let summary = collect("flows.dump", "users.csv", "media.csv", "img", CollectorConfig::default())?;
//! println!("{} users, {} images", summary.users, summary.images);
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod export;
pub mod flow;
pub mod tnetstring;

use std::path::Path;

use tracing::info;

pub use collector::{is_profile_path, CollectedImage, Collector, CollectorConfig, Media, User};
pub use export::{
    export, image_file_name, is_safe_media_id, save_images, write_media_csv, write_users_csv,
    ExportSummary,
};
pub use flow::{flows_from_bytes, read_flows, HttpFlow};
pub use tnetstring::{DumpError, Value};

/// Reads `dump`, collects everything it contains and exports it.
pub fn collect<P, U, M, D>(
    dump: P,
    users_csv: U,
    media_csv: M,
    image_dir: D,
    cfg: CollectorConfig,
) -> Result<ExportSummary, crate::Error>
where
    P: AsRef<Path>,
    U: AsRef<Path>,
    M: AsRef<Path>,
    D: AsRef<Path>,
{
    let flows = read_flows(dump.as_ref())?;
    info!(flows = flows.len(), dump = %dump.as_ref().display(), "read dump");
    let mut collector = Collector::new(cfg);
    collector.handle_all(&flows);
    export(&collector, users_csv, media_csv, image_dir)
}
