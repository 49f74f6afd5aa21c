use crate::config::AppConfig;
use crate::flags::{CollectionFlag, RebuildTarget};
use crate::input::{read_jsonl, read_query};
use anyhow::{Context, Result};
use jobmatch_drift::{assess_distribution, DriftMonitor};
use jobmatch_indexer::{
    read_health_snapshot, AnchorInput, IngestionManager, PostingInput, RebuildOutcome,
    SourceDocument, VecSource,
};
use jobmatch_search::{MatchRequest, MatchResult, Stage2Mode, TwoStageMatcher};
use jobmatch_vector_store::{CollectionKind, StubEmbedder};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Data directory plus the loaded configuration, shared by every command.
pub(crate) struct AppContext {
    pub data_dir: PathBuf,
    pub config: AppConfig,
}

impl AppContext {
    async fn manager(&self) -> Result<IngestionManager> {
        IngestionManager::open(
            &self.data_dir,
            self.config.store.clone(),
            self.config.ingest.clone(),
        )
        .await
        .with_context(|| format!("Failed to open store at {}", self.data_dir.display()))
    }

    async fn monitor(&self) -> Result<DriftMonitor> {
        DriftMonitor::open(&self.data_dir, self.config.drift.clone())
            .await
            .context("Failed to open drift history")
    }
}

pub(crate) struct IngestOptions<'a> {
    pub path: &'a Path,
    pub text: bool,
    pub batch_size: usize,
    pub rebuild: bool,
}

pub(crate) async fn run_ingest_anchors(ctx: &AppContext, opts: IngestOptions<'_>) -> Result<Value> {
    let manager = ctx.manager().await?;
    let report = if opts.text {
        let documents: Vec<SourceDocument> = read_jsonl(opts.path)?;
        let mut source = VecSource::new(opts.path.display().to_string(), documents);
        let embedder = StubEmbedder::new(manager.store().dimension());
        manager
            .ingest_anchors_from_source(&mut source, &embedder, opts.batch_size.max(1))
            .await?
    } else {
        let batch: Vec<AnchorInput> = read_jsonl(opts.path)?;
        manager.ingest_anchors(batch).await?
    };
    let rebuild = if opts.rebuild {
        Some(manager.rebuild_index(CollectionKind::Anchors).await?)
    } else {
        None
    };
    Ok(json!({ "report": report, "rebuild": rebuild }))
}

pub(crate) async fn run_ingest_postings(
    ctx: &AppContext,
    opts: IngestOptions<'_>,
    month: &str,
) -> Result<Value> {
    let manager = ctx.manager().await?;
    let report = if opts.text {
        let documents: Vec<SourceDocument> = read_jsonl(opts.path)?;
        let mut source = VecSource::new(opts.path.display().to_string(), documents);
        let embedder = StubEmbedder::new(manager.store().dimension());
        manager
            .ingest_postings_from_source(&mut source, &embedder, month, opts.batch_size.max(1))
            .await?
    } else {
        let batch: Vec<PostingInput> = read_jsonl(opts.path)?;
        manager.ingest_postings(batch, month).await?
    };
    let rebuild = if opts.rebuild {
        Some(manager.rebuild_index(CollectionKind::Postings).await?)
    } else {
        None
    };
    Ok(json!({ "report": report, "rebuild": rebuild }))
}

pub(crate) async fn run_rebuild(ctx: &AppContext, target: RebuildTarget) -> Result<Value> {
    let manager = ctx.manager().await?;
    let mut outcomes: Vec<RebuildOutcome> = Vec::new();
    for kind in target.kinds() {
        let outcome = manager
            .rebuild_index(kind)
            .await
            .with_context(|| format!("Rebuild of {kind} failed"))?;
        outcomes.push(outcome);
    }
    Ok(serde_json::to_value(outcomes)?)
}

pub(crate) struct MatchOptions<'a> {
    pub query: &'a Path,
    pub resume_text: Option<String>,
    pub unrestricted: bool,
    pub top_categories: Option<usize>,
    pub top_jobs: Option<usize>,
    pub global_top: Option<usize>,
}

pub(crate) async fn run_match(ctx: &AppContext, opts: MatchOptions<'_>) -> Result<Value> {
    let query = read_query(opts.query)?;
    let manager = ctx.manager().await?;
    let matcher = TwoStageMatcher::new(Arc::clone(manager.store()), ctx.config.matcher.clone())?;

    let mut request = MatchRequest::new(query.embedding);
    request.resume_text = opts.resume_text.or(query.text);
    request.top_categories = opts.top_categories;
    request.top_jobs_per_category = opts.top_jobs;
    request.global_top = opts.global_top;
    if opts.unrestricted {
        request = request.with_stage2_mode(Stage2Mode::Unrestricted);
    }

    let report = matcher.match_report(request).await?;
    let explanations: Vec<String> = report.results.iter().map(MatchResult::explanation).collect();
    let mut data = serde_json::to_value(&report)?;
    if let Some(results) = data.get_mut("results").and_then(Value::as_array_mut) {
        for (entry, explanation) in results.iter_mut().zip(explanations) {
            if let Some(object) = entry.as_object_mut() {
                object.insert("explanation".to_string(), Value::String(explanation));
            }
        }
    }
    Ok(data)
}

pub(crate) async fn run_retire(ctx: &AppContext, month: &str, window: Option<u32>) -> Result<Value> {
    let manager = ctx.manager().await?;
    let report = manager.retire_partitions(month, window).await?;
    Ok(serde_json::to_value(report)?)
}

pub(crate) async fn run_rollback(ctx: &AppContext, collection: CollectionFlag) -> Result<Value> {
    let manager = ctx.manager().await?;
    let kind = collection.as_domain();
    let version = manager
        .rollback(kind)
        .await
        .with_context(|| format!("Rollback of {kind} failed"))?;
    Ok(json!({ "collection": kind, "version": version }))
}

pub(crate) async fn run_status(ctx: &AppContext) -> Result<Value> {
    let manager = ctx.manager().await?;
    let store = manager.store();
    let mut collections = Vec::with_capacity(CollectionKind::ALL.len());
    for kind in CollectionKind::ALL {
        let status = store.status(kind);
        let stale = status.is_stale();
        let mut value = serde_json::to_value(status)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("stale".to_string(), Value::Bool(stale));
        }
        collections.push(value);
    }
    let health = read_health_snapshot(&ctx.data_dir).await?;
    let drift_records = ctx.monitor().await?.history().len();

    Ok(json!({
        "data_dir": ctx.data_dir,
        "embedding_dimension": store.dimension(),
        "collections": collections,
        "partitions": store.partitions(),
        "health": health,
        "write_lock_wait_ms": manager.write_lock_wait_ms(),
        "drift_records": drift_records,
    }))
}

pub(crate) async fn run_drift_record(ctx: &AppContext, month: &str) -> Result<Value> {
    let manager = ctx.manager().await?;
    let status = manager.store().status(CollectionKind::Postings);
    if status.is_stale() {
        log::warn!(
            "Posting snapshot v{} lags the metadata table; run `jobmatch rebuild postings` first",
            status.snapshot_version
        );
    }
    let monitor = ctx.monitor().await?;
    let snapshot = manager.store().posting_snapshot();
    let summary = monitor.record_cycle(&snapshot, month).await?;
    Ok(serde_json::to_value(summary)?)
}

pub(crate) async fn run_drift_compare(
    ctx: &AppContext,
    category: &str,
    from: &str,
    to: &str,
) -> Result<Value> {
    let monitor = ctx.monitor().await?;
    let report = monitor.compute_drift(category, from, to)?;
    Ok(serde_json::to_value(report)?)
}

pub(crate) async fn run_drift_scan(ctx: &AppContext, month: &str) -> Result<Value> {
    let monitor = ctx.monitor().await?;
    let reports = monitor.scan_cycle(month)?;
    Ok(serde_json::to_value(reports)?)
}

pub(crate) async fn run_drift_distribution(ctx: &AppContext, month: Option<&str>) -> Result<Value> {
    let manager = ctx.manager().await?;
    let view = manager.store().postings().view();
    let postings = view
        .records
        .iter()
        .filter(|posting| month.map_or(true, |m| posting.ingestion_month == m))
        .map(AsRef::as_ref);
    let report = assess_distribution(postings, &ctx.config.drift);
    Ok(serde_json::to_value(report)?)
}
