//! # Batch Rasterizer
//!
//! Renders one scene per form-data row at full output resolution.
//!
//! ## Responsibilities
//! - **Isolation**: each [`BatchJob`] owns its scene copy and raster buffer.
//!   Jobs share only the read-only [`ImageCache`] and [`FontBook`].
//! - **Failure containment**: a job that errors (or panics) becomes
//!   [`JobOutcome::Failed`] with a reason; the remaining rows still run.
//! - **Cancellation**: a [`CancelToken`] per job, checked between layers.

use crate::assets::{ImageCache, TimeoutLoader};
use crate::config::RenderOptions;
use crate::error::RenderError;
use crate::placeholder::FormData;
use crate::render::{compose, RasterTarget, RenderContext, RenderReport};
use crate::scene::Scene;
use crate::text::FontBook;
use crate::AssetLoader;
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared flag that stops a render between layers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Row index, echoed in the outcome.
    pub index: usize,
    pub scene: Scene,
    pub form_data: FormData,
    pub options: RenderOptions,
    pub cancel: CancelToken,
}

impl BatchJob {
    pub fn new(index: usize, scene: Scene, form_data: FormData, options: RenderOptions) -> Self {
        Self {
            index,
            scene,
            form_data,
            options,
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Debug)]
pub enum JobOutcome {
    Rendered {
        index: usize,
        bytes: Vec<u8>,
        report: RenderReport,
    },
    Failed {
        index: usize,
        reason: String,
    },
}

impl JobOutcome {
    pub fn index(&self) -> usize {
        match self {
            JobOutcome::Rendered { index, .. } | JobOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, JobOutcome::Rendered { .. })
    }
}

/// Image cache for batch use, bounding every load by `options.image_timeout_ms`.
pub fn image_cache(loader: Arc<dyn AssetLoader>, options: &RenderOptions) -> ImageCache {
    if options.image_timeout_ms == 0 {
        return ImageCache::new(loader);
    }
    let timeout = Duration::from_millis(options.image_timeout_ms);
    ImageCache::new(Arc::new(TimeoutLoader::new(loader, timeout)))
}

/// Renders and encodes a single job.
pub fn render_job(
    job: &BatchJob,
    images: &ImageCache,
    fonts: &FontBook,
) -> Result<(Vec<u8>, RenderReport), RenderError> {
    job.scene.validate()?;
    let options = &job.options;
    let width = options.output_width(job.scene.background.width);
    let normalizer = job.scene.normalizer(width as f32)?;

    let mut target = RasterTarget::new(normalizer.surface())?;
    let ctx = RenderContext::new(normalizer, &job.form_data, images, fonts)
        .with_fallback_color(options.background_fallback)
        .with_cancel(&job.cancel);
    let report = compose(&job.scene, &ctx, &mut target)?;
    if job.cancel.is_cancelled() {
        return Err(RenderError::Cancelled);
    }

    let bytes = target.encode(options.format, options.quality)?;
    Ok((bytes, report))
}

fn run_job(job: &BatchJob, images: &ImageCache, fonts: &FontBook) -> JobOutcome {
    let index = job.index;
    if job.cancel.is_cancelled() {
        tracing::info!("Job {} cancelled before start", index);
        return JobOutcome::Failed {
            index,
            reason: RenderError::Cancelled.to_string(),
        };
    }

    let result = catch_unwind(AssertUnwindSafe(|| render_job(job, images, fonts)));
    match result {
        Ok(Ok((bytes, report))) => {
            for warning in &report.warnings {
                tracing::warn!("Job {}: {}", index, warning.message);
            }
            tracing::info!(
                "Job {} rendered ({} bytes, {} warnings)",
                index,
                bytes.len(),
                report.warnings.len()
            );
            JobOutcome::Rendered {
                index,
                bytes,
                report,
            }
        }
        Ok(Err(err)) => {
            tracing::error!("Job {} failed: {}", index, err);
            JobOutcome::Failed {
                index,
                reason: err.to_string(),
            }
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Job {} panicked: {}", index, reason);
            JobOutcome::Failed {
                index,
                reason: format!("Render panicked: {}", reason),
            }
        }
    }
}

/// Runs every job on the rayon pool; outcomes come back in job order.
pub fn run_batch(jobs: &[BatchJob], images: &ImageCache, fonts: &FontBook) -> Vec<JobOutcome> {
    tracing::info!("Starting batch of {} jobs", jobs.len());
    let outcomes: Vec<JobOutcome> = jobs
        .par_iter()
        .map(|job| run_job(job, images, fonts))
        .collect();
    let failed = outcomes.iter().filter(|o| !o.is_rendered()).count();
    tracing::info!(
        "Batch finished: {} rendered, {} failed",
        outcomes.len() - failed,
        failed
    );
    outcomes
}
