//! Virtual try-on request pipeline
//!
//! Each run goes `Validating -> RemoteAttempt -> LocalFallback -> Finalizing`
//! and ends in `Succeeded`, except a request missing an image which ends in
//! `Failed` before any network activity. Remote failures are never the final
//! outcome: the pipeline falls back to the unchanged person image.

use crate::config::TryOnConfig;
use crate::gateway::{with_timeout, Gateway, GatewayError};
use crate::models::{GarmentCategory, ResultSource, TryOnFailure, TryOnRequest, TryOnResult};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// File name prefix of every image written by the local fallback
pub const OUTPUT_PREFIX: &str = "virtual_try_on_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TryOnStage {
    Validating,
    RemoteAttempt,
    LocalFallback,
    Finalizing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TryOnProgress {
    pub stage: TryOnStage,
    pub percent: u8,
    pub phase: &'static str,
}

/// Human-readable label for a progress percentage
pub fn phase_label(percent: u8) -> &'static str {
    match percent {
        0..=29 => "analyzing",
        30..=59 => "matching",
        60..=89 => "compositing",
        _ => "finalizing",
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TryOnError {
    #[error("Try-on request was cancelled")]
    Cancelled,
}

// ============ Backends ============

/// What a remote backend produced. A run only counts as a remote success
/// when `image` points at an existing file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteOutcome {
    pub image: Option<PathBuf>,
    pub analysis: Option<String>,
}

/// The remote stage of the pipeline. A real compositing service plugs in here.
#[async_trait]
pub trait TryOnBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(
        &self,
        person_image: &Path,
        garment_image: &Path,
        category: GarmentCategory,
    ) -> Result<RemoteOutcome, GatewayError>;
}

/// Sends both photos to the gateway for a written style analysis. It never
/// returns an image, so results always come from the local fallback with the
/// analysis attached.
pub struct StyleAnalysisBackend {
    gateway: Arc<Gateway>,
}

impl StyleAnalysisBackend {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl TryOnBackend for StyleAnalysisBackend {
    fn name(&self) -> &str {
        "style-analysis"
    }

    async fn attempt(
        &self,
        person_image: &Path,
        garment_image: &Path,
        category: GarmentCategory,
    ) -> Result<RemoteOutcome, GatewayError> {
        let analysis = self
            .gateway
            .analyze_style(person_image, garment_image, category)
            .await?;
        Ok(RemoteOutcome {
            image: None,
            analysis: Some(analysis),
        })
    }
}

// ============ Pipeline ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TryOnHealth {
    pub available: bool,
    pub status: String,
    pub backend: String,
}

pub struct TryOnPipeline {
    backend: Arc<dyn TryOnBackend>,
    config: TryOnConfig,
    output_dir: PathBuf,
    sequence: AtomicU64,
}

fn non_empty(handle: &Option<PathBuf>) -> Option<&Path> {
    handle
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty())
}

/// The remote image, if the backend returned one that exists on disk
async fn usable_image(outcome: &RemoteOutcome) -> Option<PathBuf> {
    let image = outcome.image.as_ref()?;
    match tokio::fs::metadata(image).await {
        Ok(meta) if meta.is_file() => Some(image.clone()),
        _ => {
            warn!("[usable_image] remote image {} is not readable", image.display());
            None
        }
    }
}

fn enter(stage: TryOnStage) {
    debug!("[TryOnPipeline] -> {:?}", stage);
}

impl TryOnResult {
    /// The state a run ended in
    pub fn terminal_stage(&self) -> TryOnStage {
        if self.success {
            TryOnStage::Succeeded
        } else {
            TryOnStage::Failed
        }
    }
}

fn emit(progress: Option<&UnboundedSender<TryOnProgress>>, event: TryOnProgress) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}

impl TryOnPipeline {
    pub fn new(backend: Arc<dyn TryOnBackend>, config: TryOnConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            config,
            output_dir: output_dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Runs one request to completion.
    ///
    /// Progress events go to `progress` while the remote stage is pending,
    /// followed by a final 100% event. Cancelling `cancel` during the remote
    /// stage drops the pending call, stops progress and yields `Cancelled`.
    pub async fn run(
        &self,
        request: &TryOnRequest,
        progress: Option<&UnboundedSender<TryOnProgress>>,
        cancel: &CancellationToken,
    ) -> Result<TryOnResult, TryOnError> {
        let started = Instant::now();

        enter(TryOnStage::Validating);
        let (person, garment) = match (
            non_empty(&request.person_image),
            non_empty(&request.garment_image),
        ) {
            (Some(person), Some(garment)) => (person, garment),
            _ => {
                warn!("[TryOnPipeline::run] missing person or garment image");
                enter(TryOnStage::Failed);
                return Ok(TryOnResult::failed(
                    TryOnFailure::MissingInput,
                    started.elapsed(),
                ));
            }
        };
        if cancel.is_cancelled() {
            return Err(TryOnError::Cancelled);
        }

        enter(TryOnStage::RemoteAttempt);
        info!(
            "[TryOnPipeline::run] remote attempt via {} ({})",
            self.backend.name(),
            request.category.as_str()
        );
        let remote = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("[TryOnPipeline::run] cancelled during remote attempt");
                return Err(TryOnError::Cancelled);
            }
            outcome = self.remote_attempt(person, garment, request.category, progress) => outcome,
        };
        if cancel.is_cancelled() {
            return Err(TryOnError::Cancelled);
        }

        let (image, source, analysis) = match remote {
            Ok(outcome) => match usable_image(&outcome).await {
                Some(image) => (image, ResultSource::Remote, outcome.analysis),
                None => {
                    enter(TryOnStage::LocalFallback);
                    let image = self.local_fallback(person).await;
                    (image, ResultSource::LocalFallback, outcome.analysis)
                }
            },
            Err(e) => {
                warn!("[TryOnPipeline::run] remote attempt failed, using fallback: {}", e);
                enter(TryOnStage::LocalFallback);
                (self.local_fallback(person).await, ResultSource::LocalFallback, None)
            }
        };

        enter(TryOnStage::Finalizing);
        emit(
            progress,
            TryOnProgress {
                stage: TryOnStage::Finalizing,
                percent: 100,
                phase: phase_label(100),
            },
        );
        let processing_time = started.elapsed();
        enter(TryOnStage::Succeeded);
        info!(
            "[TryOnPipeline::run] succeeded via {:?} in {}ms",
            source,
            processing_time.as_millis()
        );

        Ok(TryOnResult {
            success: true,
            result_image: Some(image),
            error: None,
            processing_time,
            source: Some(source),
            analysis,
        })
    }

    async fn remote_attempt(
        &self,
        person: &Path,
        garment: &Path,
        category: GarmentCategory,
        progress: Option<&UnboundedSender<TryOnProgress>>,
    ) -> Result<RemoteOutcome, GatewayError> {
        let attempt = with_timeout(
            self.config.remote_timeout(),
            self.backend.attempt(person, garment, category),
        );
        tokio::pin!(attempt);

        let period = self.config.progress_interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        let cap = self.config.progress_cap.min(99);
        let mut percent: u8 = 0;

        loop {
            tokio::select! {
                result = &mut attempt => return result,
                _ = ticker.tick(), if percent < cap => {
                    percent = percent.saturating_add(self.config.progress_step.max(1)).min(cap);
                    emit(progress, TryOnProgress {
                        stage: TryOnStage::RemoteAttempt,
                        percent,
                        phase: phase_label(percent),
                    });
                }
            }
        }
    }

    /// Copies the person image into the output directory. If that fails the
    /// original path is returned, so the caller always gets a displayable image.
    async fn local_fallback(&self, person: &Path) -> PathBuf {
        let extension = person
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        let file_name = format!(
            "{}{}_{}.{}",
            OUTPUT_PREFIX,
            chrono::Utc::now().timestamp_millis(),
            self.sequence.fetch_add(1, Ordering::Relaxed),
            extension
        );
        let target = self.output_dir.join(file_name);

        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            warn!("[local_fallback] Failed to create output directory: {}", e);
            return person.to_path_buf();
        }
        match tokio::fs::copy(person, &target).await {
            Ok(_) => target,
            Err(e) => {
                warn!(
                    "[local_fallback] Failed to copy {}: {}",
                    person.display(),
                    e
                );
                person.to_path_buf()
            }
        }
    }

    /// Runs each garment against the same person photo, one after another,
    /// pausing between requests. Every garment yields exactly one result, in
    /// input order.
    pub async fn process_batch(
        &self,
        person_image: &Path,
        garment_images: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<TryOnResult>, TryOnError> {
        let mut results = Vec::with_capacity(garment_images.len());

        for (index, garment) in garment_images.iter().enumerate() {
            let request = TryOnRequest {
                person_image: Some(person_image.to_path_buf()),
                garment_image: Some(garment.clone()),
                category: GarmentCategory::default(),
            };
            let result = self.run(&request, None, cancel).await?;
            if !result.success {
                warn!(
                    "[process_batch] item {} failed: {:?}",
                    index, result.error
                );
            }
            results.push(result);

            if index + 1 < garment_images.len() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(TryOnError::Cancelled),
                    _ = tokio::time::sleep(self.config.batch_delay()) => {}
                }
            }
        }

        info!("[process_batch] processed {} items", results.len());
        Ok(results)
    }

    /// Deletes fallback images written by earlier runs
    pub async fn cleanup(&self) -> Result<usize, String> {
        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(format!("Failed to read output directory: {}", e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| format!("Failed to read output directory: {}", e))?
        {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(OUTPUT_PREFIX) {
                tokio::fs::remove_file(entry.path())
                    .await
                    .map_err(|e| format!("Failed to remove {:?}: {}", name, e))?;
                removed += 1;
            }
        }

        info!("[cleanup] removed {} try-on files", removed);
        Ok(removed)
    }

    pub fn health_check(&self) -> TryOnHealth {
        let available = std::fs::create_dir_all(&self.output_dir).is_ok();
        TryOnHealth {
            available,
            status: if available { "Ready" } else { "Unavailable" }.to_string(),
            backend: self.backend.name().to_string(),
        }
    }
}
