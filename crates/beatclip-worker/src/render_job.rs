//! Producing one second of output.
//!
//! Each failure class maps to one recovery action:
//! - overlay failure: re-render the same source without the caption
//! - source failure: blacklist, retry once with a new source, then the
//!   fallback frame
//! - keyword media failure or miss: bank selection for the same second
//! - capability unavailable or cancelled: returned to the runner
//!
//! A job selects from its own snapshot of the committed pool, so its choices
//! depend only on the seed and the blacklist as of dispatch. The runner
//! rejects outcomes whose snapshot went stale before commit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info, warn};

use beatclip_giphy::KeywordImageFetcher;
use beatclip_media::{Overlay, RenderError, RenderRequest, SecondRenderer};
use beatclip_models::{
    CaptionMode, PlanEntry, RenderResult, RenderStatus, SourceChoice, SourceEntry, SourceId,
};

use crate::source_pool::{second_rng, PoolError, SourcePool};
use crate::timeline::speed_multiplier;

/// Bank selections tried per second before the fallback frame.
const MAX_SOURCE_ATTEMPTS: usize = 2;

/// Everything needed to render one second, built just in time.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub second_index: usize,
    pub tempo: f64,
    pub plan_entry: Option<PlanEntry>,
    /// Checkpoint location of the artifact
    pub output: PathBuf,
    /// Committed pool as of dispatch
    pub pool: SourcePool,
}

/// Settings fixed for the whole run.
#[derive(Debug, Clone, Copy)]
pub struct JobSettings {
    pub seed: u64,
    pub base_tempo: f64,
    pub speed_min: f64,
    pub speed_max: f64,
    /// Source window read per second
    pub window_secs: f64,
    pub fetch_timeout: Duration,
}

/// Result of a second plus the sources it blacklisted.
#[derive(Debug, Clone)]
pub struct SecondOutcome {
    pub result: RenderResult,
    pub blacklisted: Vec<SourceId>,
    /// Durations probed while rendering
    pub probed: Vec<(SourceId, f64)>,
    /// Pool generation the selection ran against; `None` if the bank was
    /// never consulted
    pub pool_generation: Option<usize>,
    pub elapsed: Duration,
}

/// Shared handles for render tasks.
#[derive(Clone)]
pub struct RenderContext {
    pub renderer: Arc<dyn SecondRenderer>,
    pub fetcher: Option<Arc<dyn KeywordImageFetcher>>,
    pub settings: JobSettings,
}

/// A rendered source and how it went.
struct Rendered {
    path: PathBuf,
    offset: f64,
    overlay_dropped: bool,
}

fn overlay_for(entry: Option<&PlanEntry>) -> Option<Overlay> {
    let entry = entry?;
    let mode = match entry {
        PlanEntry::Phrase { .. } => CaptionMode::Phrase,
        PlanEntry::Karaoke { .. } => CaptionMode::Karaoke,
        PlanEntry::Keyword { .. } => return None,
    };
    entry
        .overlay_text()
        .filter(|t| !t.trim().is_empty())
        .map(|text| Overlay { text, mode })
}

impl RenderContext {
    /// Produce the artifact for one second.
    ///
    /// Only `Unavailable` and `Cancelled` escape; every other failure is
    /// absorbed into a degraded result.
    pub async fn execute(&self, mut job: RenderJob) -> Result<SecondOutcome, RenderError> {
        let started = Instant::now();
        let i = job.second_index;
        let mut rng = second_rng(self.settings.seed, i);
        let speed = speed_multiplier(
            job.tempo,
            self.settings.base_tempo,
            self.settings.speed_min,
            self.settings.speed_max,
        );
        let overlay = overlay_for(job.plan_entry.as_ref());
        let mut pool = std::mem::take(&mut job.pool);
        let pool_generation = Some(pool.generation());
        let mut blacklisted = Vec::new();
        let mut probed = Vec::new();

        if let Some(query) = job.plan_entry.as_ref().and_then(|e| e.keyword_query()) {
            if let Some(result) = self.try_keyword(&job, query, speed, &mut rng).await? {
                return Ok(SecondOutcome {
                    result,
                    blacklisted,
                    probed,
                    pool_generation: None,
                    elapsed: started.elapsed(),
                });
            }
        }

        for attempt in 1..=MAX_SOURCE_ATTEMPTS {
            let entry = match pool.select(&mut rng, i) {
                Ok(entry) => entry,
                Err(PoolError::PoolExhausted) => {
                    warn!(second = i, "Source pool exhausted, using fallback frame");
                    break;
                }
                Err(e) => return Err(RenderError::Unavailable(e.to_string())),
            };

            match self
                .render_source(&job, &entry, speed, overlay.clone(), &mut rng, &mut probed)
                .await
            {
                Ok(rendered) => {
                    let result = RenderResult {
                        second_index: i,
                        artifact_path: rendered.path,
                        status: RenderStatus::Ok,
                        overlay_dropped: rendered.overlay_dropped,
                        source: Some(SourceChoice::Bank {
                            id: entry.id,
                            path: entry.path,
                            offset: rendered.offset,
                        }),
                    };
                    return Ok(SecondOutcome {
                        result,
                        blacklisted,
                        probed,
                        pool_generation,
                        elapsed: started.elapsed(),
                    });
                }
                Err(e) if e.is_source_failure() => {
                    warn!(
                        second = i,
                        source = %entry.id,
                        attempt,
                        "Source failed, blacklisting: {}",
                        e
                    );
                    if pool.blacklist(&entry.id) {
                        blacklisted.push(entry.id);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let path = self.renderer.render_fallback(i, &job.output).await?;
        info!(second = i, "Substituted fallback frame");
        Ok(SecondOutcome {
            result: RenderResult {
                second_index: i,
                artifact_path: path,
                status: RenderStatus::Failed,
                overlay_dropped: overlay.is_some(),
                source: Some(SourceChoice::Fallback),
            },
            blacklisted,
            probed,
            pool_generation,
            elapsed: started.elapsed(),
        })
    }

    /// Render from keyword media; `None` sends the second to the bank.
    async fn try_keyword(
        &self,
        job: &RenderJob,
        query: &str,
        speed: f64,
        rng: &mut StdRng,
    ) -> Result<Option<RenderResult>, RenderError> {
        let Some(fetcher) = &self.fetcher else {
            return Ok(None);
        };
        let i = job.second_index;

        let handle = match tokio::time::timeout(self.settings.fetch_timeout, fetcher.fetch(query)).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!(second = i, query, "No keyword media, using bank");
                return Ok(None);
            }
            Err(_) => {
                warn!(second = i, query, "Keyword fetch timed out, using bank");
                return Ok(None);
            }
        };

        let duration = match self.renderer.probe_duration(&handle.path).await {
            Ok(duration) => duration,
            Err(e @ (RenderError::Unavailable(_) | RenderError::Cancelled)) => return Err(e),
            Err(e) => {
                warn!(second = i, query, "Keyword media unreadable, using bank: {}", e);
                return Ok(None);
            }
        };

        let offset = self.draw_offset(duration, rng);
        let request = RenderRequest {
            second_index: i,
            source: handle.path.clone(),
            offset,
            speed,
            overlay: None,
            output: job.output.clone(),
        };
        match self.renderer.render(&request).await {
            Ok(path) => Ok(Some(RenderResult {
                second_index: i,
                artifact_path: path,
                status: RenderStatus::Ok,
                overlay_dropped: false,
                source: Some(SourceChoice::Keyword {
                    query: query.to_string(),
                    path: handle.path,
                    offset,
                }),
            })),
            Err(e @ (RenderError::Unavailable(_) | RenderError::Cancelled)) => Err(e),
            Err(e) => {
                warn!(second = i, query, "Keyword media failed to render, using bank: {}", e);
                Ok(None)
            }
        }
    }

    /// Probe (if needed) and render a bank entry, dropping the overlay if
    /// only the overlay failed.
    async fn render_source(
        &self,
        job: &RenderJob,
        entry: &SourceEntry,
        speed: f64,
        overlay: Option<Overlay>,
        rng: &mut StdRng,
        probed: &mut Vec<(SourceId, f64)>,
    ) -> Result<Rendered, RenderError> {
        let duration = match entry.duration {
            Some(duration) => duration,
            None => {
                let duration = self.renderer.probe_duration(&entry.path).await?;
                probed.push((entry.id.clone(), duration));
                duration
            }
        };

        let offset = self.draw_offset(duration, rng);
        let request = RenderRequest {
            second_index: job.second_index,
            source: entry.path.clone(),
            offset,
            speed,
            overlay,
            output: job.output.clone(),
        };

        match self.renderer.render(&request).await {
            Ok(path) => Ok(Rendered {
                path,
                offset,
                overlay_dropped: false,
            }),
            Err(RenderError::OverlayFailed(reason)) => {
                warn!(
                    second = job.second_index,
                    source = %entry.id,
                    "Overlay failed, rendering without it: {}",
                    reason
                );
                let path = self.renderer.render(&request.without_overlay()).await?;
                Ok(Rendered {
                    path,
                    offset,
                    overlay_dropped: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Uniform offset that keeps the read window inside the clip.
    fn draw_offset(&self, duration: f64, rng: &mut StdRng) -> f64 {
        let max = (duration - self.settings.window_secs).max(0.0);
        if max.is_finite() && max > 0.0 {
            rng.random_range(0.0..=max)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_for_entries() {
        let phrase = PlanEntry::Phrase { text: "world".into() };
        assert_eq!(
            overlay_for(Some(&phrase)),
            Some(Overlay {
                text: "world".into(),
                mode: CaptionMode::Phrase
            })
        );

        let karaoke = PlanEntry::Karaoke {
            lines: vec!["LA LA".into(), "LONG".into()],
        };
        assert_eq!(overlay_for(Some(&karaoke)).unwrap().text, "LA LA\nLONG");

        let keyword = PlanEntry::Keyword { query: "sunset".into() };
        assert_eq!(overlay_for(Some(&keyword)), None);
        assert_eq!(overlay_for(None), None);
    }
}
