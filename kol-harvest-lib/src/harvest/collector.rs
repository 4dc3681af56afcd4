//! Sequential walk over the collection plan.
//!
//! One work item is in flight at a time. Each one is paced, fetched, normalized
//! and folded into the document before the next starts. A failed item becomes an
//! empty record list; nothing short of a setup error stops the run.

use super::checkpoint::{CheckpointSink, CollectionCheckpoint};
use super::client::LeaderboardSource;
use super::dataset::{CollectionStats, HarvestDocument, ProjectDataset, UserIndex};
use super::json_file;
use super::plan::{Category, CollectionPlan, Period, WorkItem};
use super::progress::Progress;
use super::rate::{ErrorKind, RateController};
use super::record::RankingRecord;
use chrono::Utc;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

const LOG_TARGET: &str = " collector";

#[derive(Debug, Default)]
struct RunCounters {
    completed: AtomicU64,
    failed: AtomicU64,
}

pub struct Collector<S> {
    source: S,
    rate: RateController,
    checkpoints: CheckpointSink,
    snapshot_path: Option<PathBuf>,
    previous: Option<HarvestDocument>,
    skip_complete: bool,
    progress: Arc<dyn Progress>,
}

impl<S: core::fmt::Debug> core::fmt::Debug for Collector<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collector")
            .field("source", &self.source)
            .field("rate", &self.rate)
            .field("checkpoints", &self.checkpoints)
            .field("snapshot_path", &self.snapshot_path)
            .field("has_previous", &self.previous.is_some())
            .field("skip_complete", &self.skip_complete)
            .field("progress", &"<dyn Progress>")
            .finish()
    }
}

impl<S: LeaderboardSource> Collector<S> {
    #[must_use]
    pub fn new(source: S, rate: RateController, progress: Arc<dyn Progress>) -> Self {
        Self {
            source,
            rate,
            checkpoints: CheckpointSink::disabled(),
            snapshot_path: None,
            previous: None,
            skip_complete: false,
            progress,
        }
    }

    /// Write a checkpoint after every work item.
    #[must_use]
    pub fn with_checkpoints(mut self, sink: CheckpointSink) -> Self {
        self.checkpoints = sink;
        self
    }

    /// Write the partial document to `path` after every project.
    #[must_use]
    pub fn with_snapshots(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Build on top of an earlier output document.
    ///
    /// Projects of `previous` that the plan does not walk are kept as they
    /// are. Planned projects are collected again.
    #[must_use]
    pub fn merge_into(mut self, previous: HarvestDocument) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Like [`Self::merge_into`], but also skip planned projects that
    /// `previous` already holds complete data for.
    #[must_use]
    pub fn resume_from(mut self, previous: HarvestDocument) -> Self {
        self.skip_complete = true;
        self.merge_into(previous)
    }

    /// Walk the whole plan and build the output document.
    pub async fn run(&self, plan: &CollectionPlan) -> HarvestDocument {
        let periods = plan.periods();
        let total_items = plan.work_items().len() as u64;

        let mut doc = HarvestDocument {
            last_update: Utc::now(),
            total_projects: plan.project_count(),
            total_durations: periods.len(),
            categories: plan.lists().iter().map(|list| (list.category, BTreeMap::new())).collect(),
            users: UserIndex::new(),
            stats: CollectionStats::default(),
        };
        self.keep_unplanned(plan, &mut doc);

        let counters = Arc::new(RunCounters::default());
        self.progress.set_phase("Collecting");
        let cb_counters = Arc::clone(&counters);
        self.progress.set_determinate(Box::new(move || {
            let completed = cb_counters.completed.load(Ordering::Relaxed);
            let failed = cb_counters.failed.load(Ordering::Relaxed);
            (total_items, completed, format!("{completed}/{total_items} leaderboards, {failed} failed"))
        }));

        let mut projects_fetched = 0usize;
        let mut last_checkpoint = None;

        for list in plan.lists() {
            for project_id in &list.projects {
                if let Some(dataset) = self.carry_over(list.category, project_id, periods) {
                    log::info!(target: LOG_TARGET, "Skipping {project_id}: already complete");
                    for (&period, records) in &dataset {
                        let _ = doc.users.fold(project_id, period, records);
                        doc.stats.add_data_points(records.len());
                    }
                    doc.stats.skipped_projects += 1;
                    let _ = counters.completed.fetch_add(periods.len() as u64, Ordering::Relaxed);
                    insert_dataset(&mut doc, list.category, project_id, dataset);
                    continue;
                }

                if projects_fetched > 0 {
                    pause(self.rate.between_projects(), "between projects").await;
                    if let Some(delay) = self.rate.between_batches(projects_fetched) {
                        self.progress
                            .println(&format!("Completed {projects_fetched} projects, pausing {}s before the next batch", delay.as_secs()));
                        pause(delay, "between batches").await;
                    }
                }

                log::info!(target: LOG_TARGET, "Collecting {project_id} ({})", list.category);

                let mut dataset = ProjectDataset::new();
                for (index, &period) in periods.iter().enumerate() {
                    let item = WorkItem {
                        project_id: project_id.clone(),
                        category: list.category,
                        period,
                    };

                    let records = self.collect_item(&item, &mut doc, &counters).await;
                    let _ = dataset.insert(period, records);

                    let checkpoint = CollectionCheckpoint {
                        current_project_id: project_id.clone(),
                        current_category: list.category,
                        completed_duration_count: index + 1,
                        total_duration_count: periods.len(),
                        timestamp: Utc::now(),
                    };
                    self.write_checkpoint(&checkpoint);
                    last_checkpoint = Some(checkpoint);
                }

                insert_dataset(&mut doc, list.category, project_id, dataset);
                projects_fetched += 1;
                self.write_snapshot(&mut doc);
            }
        }

        if let Some(mut checkpoint) = last_checkpoint.or_else(|| final_position(plan)) {
            checkpoint.timestamp = Utc::now();
            self.write_checkpoint(&checkpoint);
        }

        finalize(&mut doc);
        self.progress.done();

        log::info!(target: LOG_TARGET,
            "Collection finished: {} succeeded, {} failed, {} skipped projects",
            doc.stats.successful_requests,
            doc.stats.failed_requests,
            doc.stats.skipped_projects
        );

        doc
    }

    async fn collect_item(&self, item: &WorkItem, doc: &mut HarvestDocument, counters: &RunCounters) -> Vec<RankingRecord> {
        let delay = {
            let mut rng = rand::thread_rng();
            self.rate.next_delay(0, ErrorKind::None, &mut rng)
        };
        pause(delay, "before request").await;

        let records = match self.source.fetch(item).await {
            Ok(rows) => {
                let records = RankingRecord::from_rows(&rows);
                let _ = doc.users.fold(&item.project_id, item.period, &records);
                doc.stats.record_success(records.len());
                log::info!(target: LOG_TARGET, "{item}: {} records", records.len());
                records
            }
            Err(e) => {
                doc.stats.record_failure();
                let _ = counters.failed.fetch_add(1, Ordering::Relaxed);
                log::error!(target: LOG_TARGET, "{item}: giving up, {e}");
                Vec::new()
            }
        };

        let _ = counters.completed.fetch_add(1, Ordering::Relaxed);
        records
    }

    /// Copy every project of the previous document that the plan leaves out.
    fn keep_unplanned(&self, plan: &CollectionPlan, doc: &mut HarvestDocument) {
        let Some(previous) = &self.previous else {
            return;
        };

        for (&category, projects) in &previous.categories {
            for (project_id, dataset) in projects {
                if plan.contains(category, project_id) {
                    continue;
                }

                for (&period, records) in dataset {
                    let _ = doc.users.fold(project_id, period, records);
                    doc.stats.add_data_points(records.len());
                }
                insert_dataset(doc, category, project_id, dataset.clone());
                doc.total_projects += 1;
            }
        }

        if doc.total_projects > plan.project_count() {
            log::info!(target: LOG_TARGET, "Keeping {} projects from the previous output", doc.total_projects - plan.project_count());
        }
    }

    fn carry_over(&self, category: Category, project_id: &str, periods: &[Period]) -> Option<ProjectDataset> {
        if !self.skip_complete {
            return None;
        }

        let previous = self.previous.as_ref()?;
        if !previous.is_project_complete(category, project_id, periods) {
            return None;
        }

        let dataset = previous.project(category, project_id)?;
        Some(
            periods
                .iter()
                .map(|period| (*period, dataset.get(period).cloned().unwrap_or_default()))
                .collect(),
        )
    }

    fn write_checkpoint(&self, checkpoint: &CollectionCheckpoint) {
        if let Err(e) = self.checkpoints.write(checkpoint) {
            log::warn!(target: LOG_TARGET, "Could not write checkpoint: {e:#}");
        }
    }

    fn write_snapshot(&self, doc: &mut HarvestDocument) {
        let Some(path) = &self.snapshot_path else {
            return;
        };

        finalize(doc);
        if let Err(e) = json_file::save_atomic(doc, path) {
            log::warn!(target: LOG_TARGET, "Could not write snapshot to '{}': {e:#}", path.display());
        }
    }
}

/// Where a run that fetched nothing ends: the last planned project, fully done.
fn final_position(plan: &CollectionPlan) -> Option<CollectionCheckpoint> {
    let periods = plan.periods().len();
    plan.lists().iter().rev().find_map(|list| {
        list.projects.last().map(|project_id| CollectionCheckpoint {
            current_project_id: project_id.clone(),
            current_category: list.category,
            completed_duration_count: periods,
            total_duration_count: periods,
            timestamp: Utc::now(),
        })
    })
}

fn insert_dataset(doc: &mut HarvestDocument, category: Category, project_id: &str, dataset: ProjectDataset) {
    let _ = doc.categories.entry(category).or_default().insert(project_id.to_string(), dataset);
}

fn finalize(doc: &mut HarvestDocument) {
    doc.stats.unique_users = doc.users.len() as u64;
    doc.last_update = Utc::now();
}

async fn pause(delay: Duration, why: &str) {
    if delay.is_zero() {
        return;
    }

    log::debug!(target: LOG_TARGET, "Sleeping {}ms {why}", delay.as_millis());
    tokio::time::sleep(delay).await;
}
