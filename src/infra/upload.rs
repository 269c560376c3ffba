use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use aws_sdk_s3::primitives::ByteStream;
use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info};

const DEVICE_DIR_PREFIX: &str = "device_id=";

/// One archive file and the S3 key it is uploaded under.
#[derive(Debug, PartialEq)]
struct PendingUpload {
    path: PathBuf,
    key: String,
}

/// Finds `<dir>/device_id=*/date=<date>.csv` files. Keys mirror the local
/// layout, with `.gz` appended when compressing.
fn plan_uploads(archive_dir: &Path, date: NaiveDate, gzip: bool) -> Result<Vec<PendingUpload>> {
    let target_filename = format!("date={}.csv", date.format("%Y-%m-%d"));
    let mut uploads = Vec::new();

    for entry in std::fs::read_dir(archive_dir)? {
        let entry = entry?;
        let dir_path = entry.path();
        let dir_name = entry.file_name();
        let dir_name = dir_name.to_str().unwrap_or("");
        if !dir_path.is_dir() || !dir_name.starts_with(DEVICE_DIR_PREFIX) {
            continue;
        }

        let path = dir_path.join(&target_filename);
        if !path.exists() {
            continue;
        }

        let key = if gzip {
            format!("{dir_name}/{target_filename}.gz")
        } else {
            format!("{dir_name}/{target_filename}")
        };
        uploads.push(PendingUpload { path, key });
    }

    uploads.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(uploads)
}

fn compress(contents: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(contents)?;
    Ok(encoder.finish()?)
}

/// Uploads every device's CSV for `date`, optionally gzip-compressed.
/// Returns the number of files uploaded.
#[tracing::instrument(skip_all, fields(bucket = %bucket, archive_dir = %archive_dir.display(), date = %date, gzip = gzip))]
pub async fn upload_archive_for_date(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    archive_dir: &Path,
    date: NaiveDate,
    gzip: bool,
) -> Result<usize> {
    let uploads = plan_uploads(archive_dir, date, gzip)?;

    for upload in &uploads {
        let contents = std::fs::read(&upload.path)?;
        let body = if gzip { compress(&contents)? } else { contents };
        debug!(key = %upload.key, bytes = body.len(), "Uploading archive file");

        client
            .put_object()
            .bucket(bucket)
            .key(&upload.key)
            .body(ByteStream::from(body))
            .send()
            .await?;
    }

    info!(upload_count = uploads.len(), "S3 upload complete");
    Ok(uploads.len())
}
