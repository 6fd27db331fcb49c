//! Reconciliation between object storage and the metadata table.
//!
//! Uploads write the object before the record and deletes remove the object
//! before the record, so a crash or a failed call in between leaves either an
//! object nobody references or a record whose object is gone. The sweep finds
//! and removes both.

use chrono::{Duration, Utc};
use serde::Serialize;

use super::error::MediaError;
use super::model::{image_id_from_key, PageKey, IMAGE_PREFIX};
use super::store::ImageStores;

const SCAN_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Objects younger than this may belong to an upload still in flight
    pub grace: Duration,
    /// Report without deleting
    pub dry_run: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            grace: Duration::hours(1),
            dry_run: false,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub objects_checked: usize,
    pub records_checked: usize,
    /// Object keys with no record pointing at them
    pub orphan_objects: Vec<String>,
    /// Image ids whose object no longer exists
    pub dangling_records: Vec<String>,
    /// Lookups or deletes that failed; retried on the next run
    pub failures: usize,
    pub dry_run: bool,
}

pub async fn sweep(stores: &ImageStores, options: &SweepOptions) -> Result<SweepReport, MediaError> {
    let mut report = SweepReport {
        dry_run: options.dry_run,
        ..SweepReport::default()
    };
    sweep_orphan_objects(stores, options, &mut report).await?;
    sweep_dangling_records(stores, options, &mut report).await?;

    tracing::info!(
        "🧹 Sweep done: {} objects, {} records checked; {} orphan objects, {} dangling records, {} failures (dry_run={})",
        report.objects_checked,
        report.records_checked,
        report.orphan_objects.len(),
        report.dangling_records.len(),
        report.failures,
        report.dry_run,
    );
    Ok(report)
}

async fn sweep_orphan_objects(
    stores: &ImageStores,
    options: &SweepOptions,
    report: &mut SweepReport,
) -> Result<(), MediaError> {
    let cutoff = Utc::now() - options.grace;
    let mut continuation: Option<String> = None;

    loop {
        let listing = stores
            .objects
            .list_objects(IMAGE_PREFIX, continuation.take())
            .await?;

        for object in listing.objects {
            report.objects_checked += 1;

            // Unknown age counts as old: S3 always reports it
            if object.last_modified.map_or(false, |at| at > cutoff) {
                continue;
            }

            let referenced = match image_id_from_key(&object.key) {
                Some(image_id) => match stores.metadata.get_record(image_id).await {
                    Ok(record) => record.map_or(false, |record| record.s3_key == object.key),
                    Err(e) => {
                        tracing::error!("Failed to look up record for {}: {}", object.key, e);
                        report.failures += 1;
                        continue;
                    }
                },
                None => false,
            };
            if referenced {
                continue;
            }

            tracing::warn!("Orphan object {}", object.key);
            if !options.dry_run {
                if let Err(e) = stores.objects.delete_object(&object.key).await {
                    tracing::error!("Failed to delete orphan object {}: {}", object.key, e);
                    report.failures += 1;
                    continue;
                }
            }
            report.orphan_objects.push(object.key);
        }

        match listing.continuation {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }
    Ok(())
}

async fn sweep_dangling_records(
    stores: &ImageStores,
    options: &SweepOptions,
    report: &mut SweepReport,
) -> Result<(), MediaError> {
    let mut start: Option<PageKey> = None;

    loop {
        let page = stores.metadata.scan(SCAN_PAGE_SIZE, start.as_ref()).await?;

        for record in page.records {
            report.records_checked += 1;
            match stores.objects.object_exists(&record.s3_key).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("Failed to check object {}: {}", record.s3_key, e);
                    report.failures += 1;
                    continue;
                }
            }

            tracing::warn!("Record {} points at missing object {}", record.image_id, record.s3_key);
            if !options.dry_run {
                if let Err(e) = stores.metadata.delete_record(&record.image_id).await {
                    tracing::error!("Failed to delete dangling record {}: {}", record.image_id, e);
                    report.failures += 1;
                    continue;
                }
            }
            report.dangling_records.push(record.image_id);
        }

        match page.next {
            Some(next) => start = Some(next),
            None => break,
        }
    }
    Ok(())
}
