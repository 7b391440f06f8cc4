//! Distributes videos over per-device slots and records the results.
//!
//! Each selected device gets one slot for the whole run. Video `i` goes to
//! slot `i % D`; a slot runs its videos one after another. Results flow over
//! a channel to a single consumer, which appends each video path to
//! `<log_dir>/success` or `<log_dir>/fail`.

use crate::config::Config;
use crate::job::WorkerJob;
use crate::supervisor::{self, JobCommand, JobOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Runs one video on one device to completion.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_video(&self, video: &Path, device: usize) -> JobOutcome;
}

/// Runs each video in a worker process of the current executable.
pub struct ProcessRunner {
    exe: PathBuf,
    output_root: PathBuf,
    config: Config,
}

impl ProcessRunner {
    pub fn new(exe: PathBuf, output_root: PathBuf, config: Config) -> Self {
        Self {
            exe,
            output_root,
            config,
        }
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run_video(&self, video: &Path, device: usize) -> JobOutcome {
        let job = WorkerJob::new(video, device, &self.output_root, &self.config);
        let command =
            match JobCommand::worker(&self.exe, &job, &self.config.paths.library_dirs()) {
                Ok(command) => command,
                Err(e) => return JobOutcome::SpawnFailed(format!("{e:#}")),
            };
        supervisor::run(&command, self.config.run.timeout()).await
    }
}

/// Totals of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

struct Completion {
    video: PathBuf,
    device: usize,
    outcome: JobOutcome,
}

/// Schedules videos across device slots.
pub struct FleetOrchestrator {
    devices: Vec<usize>,
    log_dir: Option<PathBuf>,
}

impl FleetOrchestrator {
    /// One slot per entry of `devices`, in order.
    pub fn new(devices: Vec<usize>, log_dir: Option<PathBuf>) -> Result<Self> {
        if devices.is_empty() {
            anyhow::bail!("No devices to schedule on");
        }
        Ok(Self { devices, log_dir })
    }

    /// Videos of each slot, in run order.
    pub fn assign(&self, videos: &[PathBuf]) -> Vec<Vec<PathBuf>> {
        let mut slots = vec![Vec::new(); self.devices.len()];
        for (i, video) in videos.iter().enumerate() {
            slots[i % self.devices.len()].push(video.clone());
        }
        slots
    }

    /// Run every video once and wait for all slots to finish.
    pub async fn run(
        &self,
        videos: Vec<PathBuf>,
        runner: Arc<dyn JobRunner>,
    ) -> Result<RunSummary> {
        let videos = dedup_videos(videos);
        let total = videos.len();
        if let Some(dir) = &self.log_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
        }
        info!(
            "Scheduling {} videos on {} device(s): {:?}",
            total,
            self.devices.len(),
            self.devices
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();
        let mut slots = Vec::with_capacity(self.devices.len());
        for (slot, queue) in self.assign(&videos).into_iter().enumerate() {
            let device = self.devices[slot];
            let runner = runner.clone();
            let tx = tx.clone();
            slots.push(tokio::spawn(async move {
                for video in queue {
                    info!("Starting {:?} on device {}", video, device);
                    let outcome = runner.run_video(&video, device).await;
                    let completion = Completion {
                        video,
                        device,
                        outcome,
                    };
                    if tx.send(completion).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut summary = RunSummary {
            total,
            ..Default::default()
        };
        while let Some(done) = rx.recv().await {
            let success = done.outcome.is_success();
            if success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
                warn!(
                    "{:?} failed on device {}: {:?}",
                    done.video, done.device, done.outcome
                );
            }

            if let Some(dir) = &self.log_dir {
                let name = if success { "success" } else { "fail" };
                append_line(&dir.join(name), &done.video).await?;
            }

            info!(
                "[{}/{}] {} ok, {} failed, last: {:?}",
                summary.completed(),
                total,
                summary.succeeded,
                summary.failed,
                done.video
            );
        }

        for slot in slots {
            slot.await.context("Device slot task failed")?;
        }
        Ok(summary)
    }
}

/// Drop repeated paths, keeping the first occurrence.
pub fn dedup_videos(videos: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    videos
        .into_iter()
        .filter(|video| seen.insert(video.clone()))
        .collect()
}

async fn append_line(path: &Path, video: &Path) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {:?}", path))?;
    file.write_all(format!("{}\n", video.display()).as_bytes())
        .await
        .with_context(|| format!("Failed to append to {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<(PathBuf, usize)>>,
        active: Mutex<HashMap<usize, usize>>,
        max_active_per_device: Mutex<usize>,
        failing: HashSet<PathBuf>,
    }

    #[async_trait]
    impl JobRunner for FakeRunner {
        async fn run_video(&self, video: &Path, device: usize) -> JobOutcome {
            {
                let mut active = self.active.lock();
                let count = active.entry(device).or_insert(0);
                *count += 1;
                let mut max = self.max_active_per_device.lock();
                *max = (*max).max(*count);
            }
            self.calls.lock().push((video.to_path_buf(), device));

            // Uneven durations must not change the assignment.
            let millis = video.as_os_str().len() as u64 % 4 * 5;
            tokio::time::sleep(Duration::from_millis(millis)).await;

            *self.active.lock().entry(device).or_insert(1) -= 1;
            if self.failing.contains(video) {
                JobOutcome::Failed { code: Some(1) }
            } else {
                JobOutcome::Succeeded
            }
        }
    }

    fn videos(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_assign_round_robin() {
        let orchestrator = FleetOrchestrator::new(vec![0, 1, 2], None).unwrap();
        let slots = orchestrator.assign(&videos(&["a", "b", "c", "d", "e"]));
        assert_eq!(slots[0], videos(&["a", "d"]));
        assert_eq!(slots[1], videos(&["b", "e"]));
        assert_eq!(slots[2], videos(&["c"]));
    }

    #[test]
    fn test_no_devices_rejected() {
        assert!(FleetOrchestrator::new(vec![], None).is_err());
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let deduped = dedup_videos(videos(&["b", "a", "b", "c", "a"]));
        assert_eq!(deduped, videos(&["b", "a", "c"]));
    }

    #[tokio::test]
    async fn test_slots_are_bound_to_devices_and_sequential() {
        let runner = Arc::new(FakeRunner::default());
        let orchestrator = FleetOrchestrator::new(vec![4, 7], None).unwrap();
        let list = videos(&["v0", "video1", "v2", "vid3", "v4", "video5", "v6"]);

        let summary = orchestrator.run(list.clone(), runner.clone()).await.unwrap();
        assert_eq!(
            summary,
            RunSummary {
                total: 7,
                succeeded: 7,
                failed: 0
            }
        );

        let calls = runner.calls.lock();
        assert_eq!(calls.len(), 7);
        for (video, device) in calls.iter() {
            let i = list.iter().position(|v| v == video).unwrap();
            assert_eq!(*device, [4, 7][i % 2]);
        }
        assert_eq!(*runner.max_active_per_device.lock(), 1);
    }

    #[tokio::test]
    async fn test_results_are_logged_once_per_video() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let runner = Arc::new(FakeRunner {
            failing: ["b.mp4"].iter().map(PathBuf::from).collect(),
            ..Default::default()
        });
        let orchestrator = FleetOrchestrator::new(vec![0, 1], Some(log_dir.clone())).unwrap();

        let summary = orchestrator
            .run(videos(&["a.mp4", "b.mp4", "a.mp4", "c.mp4"]), runner.clone())
            .await
            .unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(runner.calls.lock().len(), 3);

        let success = std::fs::read_to_string(log_dir.join("success")).unwrap();
        let mut lines: Vec<&str> = success.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["a.mp4", "c.mp4"]);
        assert!(success.ends_with('\n'));
        assert_eq!(
            std::fs::read_to_string(log_dir.join("fail")).unwrap(),
            "b.mp4\n"
        );
    }
}
