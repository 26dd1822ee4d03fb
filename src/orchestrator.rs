//! Library sync, reweight and thumbnail refresh passes.
//!
//! A sync run fetches the listing once, walks the eligible entries one at a
//! time with a courtesy pause after every detail request, and finally
//! recomputes the library statistics from the stored ratings. Items in a run
//! are scored against the statistics persisted by the previous run.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use psstore_client::{DefaultSku, ItemDetail, ListingEntry, PsError};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ScoringConfig, SyncConfig};
use crate::database_ops::catalog::{Catalog, Item, Library, NewItem};
use crate::scoring::value::{normalize_rating, normalize_rating_count};
use crate::scoring::{score_item, DiscountInfo, LibraryStats};
use crate::source::CatalogSource;
use crate::sync::{classify_entry, EntryStatus, SyncError};
use crate::thumbnails::ThumbnailStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub library_id: i64,
    pub total_results: u64,
    pub added: u32,
    pub updated: u32,
    pub skipped_bundle: u32,
    pub skipped_unreleased: u32,
    /// Entries dropped for a known-benign reason (no price block yet).
    pub skipped_expected: u32,
    pub failed: u32,
}

/// Outcome of a pass over already stored items (reweight, thumbnail refresh).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub library_id: i64,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Added,
    Updated,
}

#[derive(Clone)]
pub struct CatalogSync {
    catalog: Catalog,
    source: Arc<dyn CatalogSource>,
    thumbnails: Arc<dyn ThumbnailStore>,
    cfg: Arc<SyncConfig>,
}

impl CatalogSync {
    pub fn new(
        catalog: Catalog,
        source: Arc<dyn CatalogSource>,
        thumbnails: Arc<dyn ThumbnailStore>,
        cfg: SyncConfig,
    ) -> Self {
        Self {
            catalog,
            source,
            thumbnails,
            cfg: Arc::new(cfg),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Reconcile one library against the storefront.
    ///
    /// Only a failed listing fetch (after retries) or a failure to persist the
    /// final statistics fails the run. Per-item problems are logged and counted.
    #[instrument(skip(self))]
    pub async fn run_sync(&self, library_id: i64) -> Result<SyncReport, SyncError> {
        let library = self.load_library(library_id).await?;
        let stats = library.stats();
        info!(
            library_id,
            library = %library.name,
            source = self.source.name(),
            mean = stats.mean,
            stdev = stats.stdev,
            "sync started"
        );

        let listing = match self
            .with_retry("listing", &library.url, || self.source.fetch_listing(&library.url))
            .await
        {
            Ok(listing) => listing,
            Err(e) => {
                error!(library_id, url = %library.url, error = %e, "listing fetch failed; sync aborted");
                return Err(e);
            }
        };

        let mut report = SyncReport {
            library_id,
            total_results: listing.total_results,
            ..SyncReport::default()
        };
        let now = Utc::now();

        for decoded in listing.entries() {
            let entry = match decoded {
                Ok(entry) => entry,
                Err(bad) => {
                    let err = SyncError::InvalidEntry {
                        entry_id: bad.id,
                        reason: bad.reason,
                    };
                    warn!(library_id, error = %err, "skipping listing entry");
                    report.failed += 1;
                    continue;
                }
            };
            match classify_entry(&entry, now) {
                Ok(EntryStatus::Eligible) => {}
                Ok(EntryStatus::BundleComponent) => {
                    report.skipped_bundle += 1;
                    continue;
                }
                Ok(EntryStatus::Unreleased) => {
                    report.skipped_unreleased += 1;
                    continue;
                }
                Err(e) => {
                    warn!(library_id, item = %entry.name, error = %e, "skipping listing entry");
                    report.failed += 1;
                    continue;
                }
            }

            match self.sync_entry(&library, &stats, &entry).await {
                Ok(ItemOutcome::Added) => report.added += 1,
                Ok(ItemOutcome::Updated) => report.updated += 1,
                Err(e) if e.is_expected_skip() => {
                    debug!(library_id, item = %entry.name, reason = %e, "item skipped");
                    report.skipped_expected += 1;
                }
                Err(e) => {
                    warn!(library_id, item = %entry.name, external_id = %entry.id, error = %e, "item sync failed");
                    report.failed += 1;
                }
            }
        }

        let total = i64::try_from(listing.total_results).ok();
        let new_stats = self.recompute_statistics(library_id, total).await?;
        info!(
            library_id,
            added = report.added,
            updated = report.updated,
            skipped_bundle = report.skipped_bundle,
            skipped_unreleased = report.skipped_unreleased,
            skipped_expected = report.skipped_expected,
            failed = report.failed,
            mean = new_stats.mean,
            stdev = new_stats.stdev,
            "sync finished"
        );
        Ok(report)
    }

    /// Rescore every stored item against the library's current statistics,
    /// without touching the storefront.
    #[instrument(skip(self))]
    pub async fn reweight(&self, library_id: i64) -> Result<PassReport, SyncError> {
        let library = self.load_library(library_id).await?;
        let stats = library.stats();
        let mut report = PassReport {
            library_id,
            ..PassReport::default()
        };
        for mut item in self.catalog.list_items(library_id).await? {
            let scores = score_item(
                item.rating,
                item.rating_count,
                &item.discounts(),
                &stats,
                &self.cfg.scoring,
            );
            item.set_scores(&scores);
            match self.catalog.save_item(&mut item).await {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    warn!(library_id, item = %item.name, error = %e, "reweight failed for item");
                    report.failed += 1;
                }
            }
        }
        info!(library_id, updated = report.updated, failed = report.failed, "reweight finished");
        Ok(report)
    }

    /// Push every stored thumbnail URL through the thumbnail store again and
    /// keep the new references.
    #[instrument(skip(self))]
    pub async fn refresh_thumbnails(&self, library_id: i64) -> Result<PassReport, SyncError> {
        self.load_library(library_id).await?;
        let mut report = PassReport {
            library_id,
            ..PassReport::default()
        };
        for item in self.catalog.list_items(library_id).await? {
            let Some(source_url) = item.thumb_url.as_deref() else {
                report.skipped += 1;
                continue;
            };
            let stored = match self.thumbnails.store(source_url).await {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(library_id, item = %item.name, error = %e, "thumbnail upload failed");
                    report.failed += 1;
                    continue;
                }
            };
            match self.catalog.update_thumbnail_ref(item.id, &stored).await {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    warn!(library_id, item = %item.name, error = %e, "thumbnail reference not saved");
                    report.failed += 1;
                }
            }
        }
        info!(
            library_id,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "thumbnail refresh finished"
        );
        Ok(report)
    }

    async fn load_library(&self, library_id: i64) -> Result<Library, SyncError> {
        self.catalog
            .find_library(library_id)
            .await?
            .ok_or(SyncError::LibraryNotFound(library_id))
    }

    async fn sync_entry(
        &self,
        library: &Library,
        stats: &LibraryStats,
        entry: &ListingEntry,
    ) -> Result<ItemOutcome, SyncError> {
        let detail = self
            .with_retry("detail", &entry.url, || self.source.fetch_item_detail(&entry.url))
            .await;
        pause(self.cfg.throttle.item_spacing).await;
        let detail = detail?;
        let sku = detail
            .default_sku
            .as_ref()
            .ok_or_else(|| SyncError::MissingPriceBlock {
                item_id: detail.id.clone(),
            })?;

        // identity comes from the product detail; the listing only supplies the URL
        if let Some(mut item) = self.catalog.find_item(library.id, &detail.id).await? {
            populate(&mut item, &detail, sku, stats, &self.cfg.scoring);
            let mut tx = self.catalog.begin().await?;
            tx.save_item(&mut item).await?;
            tx.commit().await?;
            debug!(library_id = library.id, item_id = item.id, "item updated");
            return Ok(ItemOutcome::Updated);
        }

        let thumb_url = detail.thumbnail().or_else(|| entry.thumbnail());
        let thumb_store_ref = match thumb_url {
            Some(url) => Some(
                self.thumbnails
                    .store(url)
                    .await
                    .map_err(SyncError::Thumbnail)?,
            ),
            None => None,
        };

        let mut tx = self.catalog.begin().await?;
        let mut item = tx
            .create_skeleton_item(
                library.id,
                &NewItem {
                    external_id: &detail.id,
                    name: &detail.name,
                    detail_url: &entry.url,
                    thumb_url,
                    thumb_store_ref: thumb_store_ref.as_deref(),
                    age_rating: detail.age_limit.unwrap_or(0),
                },
            )
            .await?;
        for descriptor in &detail.content_descriptors {
            let stored = tx
                .get_or_create_descriptor(&descriptor.name, &descriptor.description)
                .await?;
            tx.get_or_create_item_descriptor_link(item.id, stored.id)
                .await?;
        }
        populate(&mut item, &detail, sku, stats, &self.cfg.scoring);
        tx.save_item(&mut item).await?;
        tx.commit().await?;
        debug!(library_id = library.id, item_id = item.id, "item added");
        Ok(ItemOutcome::Added)
    }

    async fn recompute_statistics(
        &self,
        library_id: i64,
        total_results: Option<i64>,
    ) -> Result<LibraryStats, SyncError> {
        let ratings = self.catalog.list_all_ratings(library_id).await?;
        let stats = LibraryStats::from_ratings(&ratings, &self.cfg.scoring);
        self.catalog
            .save_library_statistics(library_id, stats, Utc::now(), total_results)
            .await?;
        Ok(stats)
    }

    /// Retry retryable storefront failures with a doubling backoff.
    async fn with_retry<T, F, Fut>(&self, what: &'static str, url: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PsError>>,
    {
        let policy = &self.cfg.retry;
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < policy.retries => {
                    let backoff = policy.base_backoff.saturating_mul(1u32 << attempt.min(16));
                    warn!(
                        what,
                        url,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "store fetch failed; retrying"
                    );
                    pause(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Refresh every mutable field of `item` from a detail payload and rescore it.
fn populate(
    item: &mut Item,
    detail: &ItemDetail,
    sku: &DefaultSku,
    stats: &LibraryStats,
    cfg: &ScoringConfig,
) {
    let discounts = DiscountInfo::from_sku(sku);
    item.age_rating = detail.age_limit.unwrap_or(0);
    item.set_pricing(sku.price, &discounts);

    let (score, total) = detail
        .star_rating
        .as_ref()
        .map(|s| (s.score, s.total))
        .unwrap_or((None, None));
    item.rating = normalize_rating(score, cfg);
    item.rating_count = normalize_rating_count(total, cfg);

    let scores = score_item(item.rating, item.rating_count, &discounts, stats, cfg);
    item.set_scores(&scores);
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::database_ops::db::Db;
    use crate::thumbnails::PassthroughThumbnails;
    use serde_json::json;

    const FIXTURE_STATS: LibraryStats = LibraryStats {
        mean: 4.02023510971787,
        stdev: 0.81955041074842,
    };

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    async fn setup(
        source: FakeSource,
        stats: LibraryStats,
        thumbnails: Arc<dyn ThumbnailStore>,
    ) -> (CatalogSync, Arc<FakeSource>, i64) {
        let catalog = Catalog::new(Db::in_memory().await.unwrap());
        let lib = catalog.create_library("PS4", LIBRARY_URL, stats).await.unwrap();
        let source = Arc::new(source);
        let sync = CatalogSync::new(catalog, source.clone(), thumbnails, fast_config());
        (sync, source, lib.id)
    }

    fn fixture_source() -> FakeSource {
        FakeSource::new(json!({
            "total_results": 4,
            "links": [
                listing_entry("DS3", "DARK SOULS III", "2016-04-12T00:00:00Z"),
                listing_entry("DAI", "Dragon Age: Inquisition", "2014-11-18T00:00:00Z"),
                {
                    "id": "DS3-DLC", "name": "Ashes of Ariandel", "url": detail_url("DS3-DLC"),
                    "parent_name": "DARK SOULS III", "release_date": "2016-10-25T00:00:00Z"
                },
                listing_entry("FUTURE", "Not Out Yet", "2099-01-01T00:00:00Z")
            ]
        }))
        .with_detail(&detail_url("DS3"), dark_souls_detail())
        .with_detail(&detail_url("DAI"), dragon_age_detail())
    }

    #[tokio::test]
    async fn sync_scores_fixture_items_against_stored_statistics() {
        let (sync, source, lib) =
            setup(fixture_source(), FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;
        let report = sync.run_sync(lib).await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                library_id: lib,
                total_results: 4,
                added: 2,
                skipped_bundle: 1,
                skipped_unreleased: 1,
                ..SyncReport::default()
            }
        );
        assert_eq!(source.calls(&detail_url("DS3-DLC")), 0);
        assert_eq!(source.calls(&detail_url("FUTURE")), 0);

        let ds3 = sync.catalog().find_item(lib, "DS3").await.unwrap().unwrap();
        assert!(close(ds3.rating, 4.80));
        assert_eq!(ds3.rating_count, 10316);
        assert!(close(ds3.weighted_rating, 91.898), "{}", ds3.weighted_rating);
        assert_eq!((ds3.base_value_score, ds3.plus_value_score), (131, 131));
        assert_eq!((ds3.price, ds3.base_price, ds3.plus_price), (6999, 6999, 6999));
        assert_eq!(ds3.age_rating, 16);
        assert_eq!(ds3.thumb_url.as_deref(), Some("https://img.example/DS3-detail.png"));

        let dai = sync.catalog().find_item(lib, "DAI").await.unwrap().unwrap();
        assert!(close(dai.weighted_rating, 169.888), "{}", dai.weighted_rating);
        assert_eq!((dai.base_discount, dai.base_price), (60, 799));
        assert_eq!((dai.plus_discount, dai.plus_price), (70, 599));
        assert_eq!((dai.base_value_score, dai.plus_value_score), (3402, 4822));
        // no type 2 image in the detail payload, so the listing one is used
        assert_eq!(dai.thumb_url.as_deref(), Some("https://img.example/DAI-listing.png"));

        let library = sync.catalog().find_library(lib).await.unwrap().unwrap();
        assert!(close(library.rating_mean, (4.80 + 4.57) / 2.0));
        assert!(close(library.rating_stdev, 0.115));
        assert_eq!(library.total_results, 4);
        assert!(library.last_updated.is_some());
    }

    #[tokio::test]
    async fn repeated_syncs_are_idempotent() {
        let (sync, _source, lib) =
            setup(fixture_source(), FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;
        sync.run_sync(lib).await.unwrap();
        let first_stats = sync.catalog().find_library(lib).await.unwrap().unwrap().stats();

        let second = sync.run_sync(lib).await.unwrap();
        assert_eq!((second.added, second.updated), (0, 2));
        let second_stats = sync.catalog().find_library(lib).await.unwrap().unwrap().stats();
        assert_eq!(first_stats, second_stats);
        let after_second = sync.catalog().list_items(lib).await.unwrap();

        sync.run_sync(lib).await.unwrap();
        let after_third = sync.catalog().list_items(lib).await.unwrap();
        assert_eq!(after_second.len(), 2);
        for (a, b) in after_second.iter().zip(&after_third) {
            let mut b = b.clone();
            b.last_updated = a.last_updated;
            assert_eq!(a, &b);
        }
    }

    #[tokio::test]
    async fn failing_item_does_not_abort_the_run() {
        let source = FakeSource::new(json!({
            "total_results": 3,
            "links": [
                listing_entry("DS3", "DARK SOULS III", "2016-04-12T00:00:00Z"),
                listing_entry("BROKEN", "Broken", "2016-04-12T00:00:00Z"),
                listing_entry("DAI", "Dragon Age: Inquisition", "2014-11-18T00:00:00Z")
            ]
        }))
        .with_detail(&detail_url("DS3"), dark_souls_detail())
        .with_detail(&detail_url("DAI"), dragon_age_detail())
        .failing(&detail_url("BROKEN"), u32::MAX, 500);
        let (sync, _source, lib) =
            setup(source, FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;

        let report = sync.run_sync(lib).await.unwrap();
        assert_eq!((report.added, report.failed), (2, 1));
        assert!(sync.catalog().find_item(lib, "BROKEN").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_listing_entry_is_counted_and_skipped() {
        let source = FakeSource::new(json!({
            "total_results": 2,
            "links": [
                listing_entry("DS3", "DARK SOULS III", "2016-04-12T00:00:00Z"),
                { "id": "ODD", "name": "No detail url", "release_date": "2016-04-12T00:00:00Z" }
            ]
        }))
        .with_detail(&detail_url("DS3"), dark_souls_detail());
        let (sync, _source, lib) =
            setup(source, FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;

        let report = sync.run_sync(lib).await.unwrap();
        assert_eq!((report.added, report.failed), (1, 1));
        assert!(sync.catalog().find_item(lib, "DS3").await.unwrap().is_some());
        assert!(sync.catalog().find_library(lib).await.unwrap().unwrap().last_updated.is_some());
    }

    #[tokio::test]
    async fn items_are_keyed_by_the_detail_identity() {
        let mut detail = dark_souls_detail();
        detail["id"] = json!("EP0700-CUSA03365_00-DARKSOULS3000000");
        detail["name"] = json!("DARK SOULS\u{2122} III");
        let source = FakeSource::new(json!({
            "total_results": 1,
            "links": [listing_entry("DS3", "Dark Souls 3 (listing)", "2016-04-12T00:00:00Z")]
        }))
        .with_detail(&detail_url("DS3"), detail);
        let (sync, _source, lib) =
            setup(source, FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;

        sync.run_sync(lib).await.unwrap();
        let second = sync.run_sync(lib).await.unwrap();
        assert_eq!((second.added, second.updated), (0, 1));
        assert!(sync.catalog().find_item(lib, "DS3").await.unwrap().is_none());
        let stored = sync
            .catalog()
            .find_item(lib, "EP0700-CUSA03365_00-DARKSOULS3000000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "DARK SOULS\u{2122} III");
        assert_eq!(stored.detail_url, detail_url("DS3"));
    }

    #[tokio::test]
    async fn missing_price_block_is_an_expected_skip() {
        let source = FakeSource::new(json!({
            "total_results": 1,
            "links": [listing_entry("PRE", "Pre-order", "2016-04-12T00:00:00Z")]
        }))
        .with_detail(
            &detail_url("PRE"),
            json!({ "id": "PRE", "name": "Pre-order", "star_rating": { "score": 4.0, "total": 3 } }),
        );
        let (sync, _source, lib) =
            setup(source, FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;

        let report = sync.run_sync(lib).await.unwrap();
        assert_eq!((report.skipped_expected, report.failed, report.added), (1, 0, 0));
        assert!(sync.catalog().find_item(lib, "PRE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_failure_aborts_without_touching_statistics() {
        let source = fixture_source().failing(LIBRARY_URL, u32::MAX, 503);
        let (sync, _source, lib) =
            setup(source, FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;

        let err = sync.run_sync(lib).await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch(PsError::Http { status: 503, .. })));
        let library = sync.catalog().find_library(lib).await.unwrap().unwrap();
        assert!(library.last_updated.is_none());
        assert_eq!(library.stats(), FIXTURE_STATS);
    }

    #[tokio::test]
    async fn retryable_fetches_are_retried_and_permanent_ones_are_not() {
        let source = FakeSource::new(json!({
            "total_results": 2,
            "links": [
                listing_entry("DS3", "DARK SOULS III", "2016-04-12T00:00:00Z"),
                listing_entry("GONE", "Delisted", "2016-04-12T00:00:00Z")
            ]
        }))
        .with_detail(&detail_url("DS3"), dark_souls_detail())
        .failing(LIBRARY_URL, 1, 503)
        .failing(&detail_url("DS3"), 1, 429);
        let catalog = Catalog::new(Db::in_memory().await.unwrap());
        let lib = catalog.create_library("PS4", LIBRARY_URL, FIXTURE_STATS).await.unwrap();
        let source = Arc::new(source);
        let mut cfg = fast_config();
        cfg.retry.retries = 2;
        let sync = CatalogSync::new(catalog, source.clone(), Arc::new(PassthroughThumbnails), cfg);

        let report = sync.run_sync(lib.id).await.unwrap();
        assert_eq!((report.added, report.failed), (1, 1));
        assert_eq!(source.calls(LIBRARY_URL), 2);
        assert_eq!(source.calls(&detail_url("DS3")), 2);
        assert_eq!(source.calls(&detail_url("GONE")), 1);
    }

    #[tokio::test]
    async fn unknown_library_is_reported() {
        let (sync, _source, lib) =
            setup(fixture_source(), FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;
        assert!(matches!(
            sync.run_sync(lib + 1).await,
            Err(SyncError::LibraryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn descriptors_are_shared_and_never_duplicated() {
        let (sync, _source, lib) =
            setup(fixture_source(), FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;
        sync.run_sync(lib).await.unwrap();
        sync.run_sync(lib).await.unwrap();

        let pool = &sync.catalog().db().pool;
        let descriptors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_descriptors")
            .fetch_one(pool)
            .await
            .unwrap();
        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item_descriptors")
            .fetch_one(pool)
            .await
            .unwrap();
        assert_eq!((descriptors, links), (2, 3));

        let dai = sync.catalog().find_item(lib, "DAI").await.unwrap().unwrap();
        let attached = sync.catalog().item_descriptors(dai.id).await.unwrap();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].name, "Violence");
    }

    #[tokio::test]
    async fn thumbnail_failure_leaves_no_skeleton() {
        let (sync, _source, lib) =
            setup(fixture_source(), FIXTURE_STATS, Arc::new(BrokenThumbnails)).await;
        let report = sync.run_sync(lib).await.unwrap();
        assert_eq!((report.added, report.failed), (0, 2));
        assert!(sync.catalog().list_items(lib).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reweight_applies_current_statistics_without_fetching() {
        let (sync, source, lib) =
            setup(fixture_source(), FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;
        sync.run_sync(lib).await.unwrap();
        // the run replaced the statistics; put the fixture values back
        sync.catalog()
            .save_library_statistics(lib, FIXTURE_STATS, Utc::now(), None)
            .await
            .unwrap();
        let calls_before = source.calls(&detail_url("DS3"));

        let report = sync.reweight(lib).await.unwrap();
        assert_eq!((report.updated, report.failed), (2, 0));
        assert_eq!(source.calls(&detail_url("DS3")), calls_before);

        let ds3 = sync.catalog().find_item(lib, "DS3").await.unwrap().unwrap();
        assert!(close(ds3.weighted_rating, 91.898));
        assert_eq!(ds3.base_value_score, 131);
        let dai = sync.catalog().find_item(lib, "DAI").await.unwrap().unwrap();
        assert_eq!((dai.base_value_score, dai.plus_value_score), (3402, 4822));
        let library = sync.catalog().find_library(lib).await.unwrap().unwrap();
        assert_eq!(library.stats(), FIXTURE_STATS);
    }

    #[tokio::test]
    async fn refresh_thumbnails_replaces_stored_references() {
        let (sync, _source, lib) =
            setup(fixture_source(), FIXTURE_STATS, Arc::new(PassthroughThumbnails)).await;
        sync.run_sync(lib).await.unwrap();

        let refresher = CatalogSync::new(
            sync.catalog().clone(),
            Arc::new(FakeSource::new(json!({}))),
            Arc::new(PrefixThumbnails("cdn://")),
            fast_config(),
        );
        let report = refresher.refresh_thumbnails(lib).await.unwrap();
        assert_eq!((report.updated, report.failed, report.skipped), (2, 0, 0));
        let ds3 = sync.catalog().find_item(lib, "DS3").await.unwrap().unwrap();
        assert_eq!(
            ds3.thumb_store_ref.as_deref(),
            Some("cdn://https://img.example/DS3-detail.png")
        );
    }
}
