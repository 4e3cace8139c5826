//! Background scheduler.
//!
//! Drives the engines on three timers:
//! - sync + close pass
//! - tracker refresh
//! - daily digest check
//!
//! All timers and the command channel are served by one task, so a batch
//! always runs to completion before the next one starts.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::services::digest::DigestSchedule;
use crate::services::engine::Engine;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Timer settings for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sync_interval: Duration,
    pub tracker_interval: Duration,
    pub digest_check_interval: Duration,

    /// Run the tracker refresh loop.
    pub tracker_enabled: bool,

    /// Run the sync and digest loops.
    pub notifier_enabled: bool,
}

impl SchedulerConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            sync_interval: Duration::from_secs(config.timings.sync_secs.max(1)),
            tracker_interval: Duration::from_secs(config.timings.tracker_secs.max(1)),
            digest_check_interval: Duration::from_secs(config.timings.notify_check_secs.max(1)),
            tracker_enabled: config.jira.update_tasks,
            notifier_enabled: config.notifier.enabled,
        }
    }
}

/// Commands that can be sent to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run a sync pass now.
    TriggerSync,

    /// Run a tracker refresh pass now.
    TriggerTrackerRefresh,

    /// Send the digest now, whether or not it is due.
    TriggerDigest,

    /// Stop the scheduler.
    Stop,
}

/// Lightweight handle for controlling the background scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    async fn send(&self, command: SchedulerCommand) -> Result<(), AppError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| AppError::internal("Scheduler not running"))
    }

    pub async fn trigger_sync(&self) -> Result<(), AppError> {
        self.send(SchedulerCommand::TriggerSync).await
    }

    pub async fn trigger_tracker_refresh(&self) -> Result<(), AppError> {
        self.send(SchedulerCommand::TriggerTrackerRefresh).await
    }

    pub async fn trigger_digest(&self) -> Result<(), AppError> {
        self.send(SchedulerCommand::TriggerDigest).await
    }

    pub async fn stop(&self) -> Result<(), AppError> {
        self.send(SchedulerCommand::Stop).await
    }
}

/// Owns the engine and the digest schedule for the lifetime of the loops.
pub struct Scheduler {
    engine: Engine,
    config: SchedulerConfig,
    schedule: DigestSchedule,
}

impl Scheduler {
    pub fn new(engine: Engine, config: SchedulerConfig) -> Self {
        Self {
            engine,
            config,
            schedule: DigestSchedule::default(),
        }
    }

    pub fn schedule(&self) -> &DigestSchedule {
        &self.schedule
    }

    /// Spawn the loops. Returns a handle for commands and the task handle,
    /// which completes after [`SchedulerHandle::stop`].
    pub fn start_background(
        engine: Engine,
        config: SchedulerConfig,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<SchedulerCommand>(16);
        let scheduler = Scheduler::new(engine, config);
        let task = tokio::spawn(scheduler.run(rx));

        (SchedulerHandle { command_tx: tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SchedulerCommand>) {
        match self.engine.load_digest_schedule().await {
            Ok(schedule) => self.schedule = schedule,
            Err(e) => log::warn!("Failed to load digest schedule, starting fresh: {}", e),
        }

        let mut sync_timer = time::interval(self.config.sync_interval);
        let mut tracker_timer = time::interval(self.config.tracker_interval);
        let mut digest_timer = time::interval(self.config.digest_check_interval);
        for timer in [&mut sync_timer, &mut tracker_timer, &mut digest_timer] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        log::info!(
            "Scheduler started: sync every {:?}, tracker every {:?}, digest check every {:?}",
            self.config.sync_interval,
            self.config.tracker_interval,
            self.config.digest_check_interval
        );

        loop {
            tokio::select! {
                _ = sync_timer.tick(), if self.config.notifier_enabled => {
                    self.run_sync_tick().await;
                }
                _ = tracker_timer.tick(), if self.config.tracker_enabled => {
                    self.run_tracker_tick().await;
                }
                _ = digest_timer.tick(), if self.config.notifier_enabled => {
                    self.run_digest_tick(false).await;
                }
                cmd = rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::TriggerSync) => {
                            log::info!("Manual sync triggered");
                            self.run_sync_tick().await;
                        }
                        Some(SchedulerCommand::TriggerTrackerRefresh) => {
                            log::info!("Manual tracker refresh triggered");
                            self.run_tracker_tick().await;
                        }
                        Some(SchedulerCommand::TriggerDigest) => {
                            log::info!("Manual digest triggered");
                            self.run_digest_tick(true).await;
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            log::info!("Scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }

        log::info!("Scheduler stopped");
    }

    /// One sync + close pass.
    pub async fn run_sync_tick(&self) {
        if let Err(e) = self.engine.sync_all().await {
            log::error!("Sync pass failed: {}", e);
        }
    }

    /// One tracker refresh pass.
    pub async fn run_tracker_tick(&self) {
        match self.engine.refresh_all_trackers().await {
            Ok(n) if n > 0 => log::info!("Refreshed tracker linkage of {} MR(s)", n),
            Ok(_) => {}
            Err(e) => log::error!("Tracker refresh failed: {}", e),
        }
    }

    /// Send the digest when due, or unconditionally when `force` is set.
    pub async fn run_digest_tick(&mut self, force: bool) {
        let now = Utc::now().timestamp();

        let result = if force {
            self.force_digest(now).await
        } else {
            self.engine
                .run_digest_if_due(&mut self.schedule, now)
                .await
                .map(|_| ())
        };

        if let Err(e) = result {
            log::error!("Digest pass failed: {}", e);
        }
    }

    async fn force_digest(&mut self, now: i64) -> Result<(), AppError> {
        self.engine.send_digest(now).await?;
        if let Some(local) = self.engine.settings.escalation.local(now) {
            self.schedule.mark_sent(local.date_naive());
            self.engine.save_digest_schedule(&self.schedule).await?;
        }
        Ok(())
    }
}
