use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::collector::{CollectedImage, Collector};
use crate::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub users: usize,
    pub images: usize,
}

const USER_COLUMNS: [&str; 3] = ["id", "name", "followed_by"];
const MEDIA_COLUMNS: [&str; 5] = ["id", "likes", "owner", "path", "like_rate"];

#[derive(Serialize)]
struct UserRow<'a> {
    id: &'a str,
    name: &'a str,
    followed_by: u64,
}

#[derive(Serialize)]
struct MediaRow<'a> {
    id: &'a str,
    likes: u64,
    owner: &'a str,
    path: String,
    like_rate: f32,
}

/// File name an image is stored under, relative to the image directory.
pub fn image_file_name(media_id: &str) -> String {
    format!("{media_id}.jpg")
}

/// Whether `media_id` can be used as a file name stem. Ids come from the
/// recorded JSON, so anything that could name another directory is refused.
pub fn is_safe_media_id(media_id: &str) -> bool {
    !media_id.is_empty()
        && media_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn exportable_images(collector: &Collector) -> impl Iterator<Item = &CollectedImage> {
    collector.images().filter(|image| {
        let safe = is_safe_media_id(&image.id);
        if !safe {
            warn!(media = %image.id, "skipping image with unusable id");
        }
        safe
    })
}

fn csv_writer<P: AsRef<Path>>(path: P, columns: &[&str]) -> Result<csv::Writer<std::fs::File>, Error> {
    // headers are written up front so an empty table still has them
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(columns)?;
    Ok(wtr)
}

/// Writes every collected thumbnail body to `<dir>/<id>.jpg`, creating `dir`
/// if needed. Bodies are written as recorded. Images whose id fails
/// [is_safe_media_id] are skipped.
pub fn save_images<P: AsRef<Path>>(collector: &Collector, dir: P) -> Result<Vec<PathBuf>, Error> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::new();
    for image in exportable_images(collector) {
        let path = dir.join(image_file_name(&image.id));
        std::fs::write(&path, &image.content)?;
        paths.push(path);
    }
    Ok(paths)
}

/// Users table with columns `id,name,followed_by`.
pub fn write_users_csv<P: AsRef<Path>>(collector: &Collector, path: P) -> Result<usize, Error> {
    let mut wtr = csv_writer(path, &USER_COLUMNS)?;
    let mut n = 0;
    for u in collector.users() {
        wtr.serialize(UserRow {
            id: &u.id,
            name: &u.name,
            followed_by: u.followed_by,
        })?;
        n += 1;
    }
    wtr.flush()?;
    Ok(n)
}

/// Media table with columns `id,likes,owner,path,like_rate`. `path` is
/// relative to the image directory, which is what the training data loader
/// expects.
pub fn write_media_csv<P: AsRef<Path>>(collector: &Collector, path: P) -> Result<usize, Error> {
    let mut wtr = csv_writer(path, &MEDIA_COLUMNS)?;
    let mut n = 0;
    for image in exportable_images(collector) {
        wtr.serialize(MediaRow {
            id: &image.id,
            likes: image.likes,
            owner: &image.owner,
            path: image_file_name(&image.id),
            like_rate: collector.like_rate(image),
        })?;
        n += 1;
    }
    wtr.flush()?;
    Ok(n)
}

/// Saves images and both tables.
pub fn export<U, M, D>(
    collector: &Collector,
    users_csv: U,
    media_csv: M,
    image_dir: D,
) -> Result<ExportSummary, Error>
where
    U: AsRef<Path>,
    M: AsRef<Path>,
    D: AsRef<Path>,
{
    let images = save_images(collector, image_dir.as_ref())?.len();
    write_media_csv(collector, media_csv)?;
    let users = write_users_csv(collector, users_csv)?;
    info!(users, images, dir = %image_dir.as_ref().display(), "exported");
    Ok(ExportSummary { users, images })
}
