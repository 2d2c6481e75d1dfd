//! Recurrence scheduler.
//!
//! Runs on a fixed tick, decides which schedules are due, and launches
//! pipeline runs subject to a concurrency cap. All next-run arithmetic
//! takes an explicit reference instant so the calendar logic is
//! testable without touching the wall clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::Store;
use crate::models::{Frequency, Scan, ScanDepth, ScheduledScan};
use crate::pipeline::Orchestrator;
use crate::registry::CancelRegistry;

/// Seam between the scheduler and the pipeline so ticks can be tested
/// with a recording fake.
#[async_trait]
pub trait ScanLauncher: Send + Sync {
    async fn launch(
        &self,
        scan_id: Uuid,
        target_url: String,
        depth: ScanDepth,
        token: CancellationToken,
    );
}

#[async_trait]
impl ScanLauncher for Orchestrator {
    async fn launch(
        &self,
        scan_id: Uuid,
        target_url: String,
        depth: ScanDepth,
        token: CancellationToken,
    ) {
        self.run(scan_id, target_url, depth, token).await;
    }
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    launcher: Arc<dyn ScanLauncher>,
    registry: Arc<CancelRegistry>,
    /// Max concurrent scans before a tick is skipped outright. Applies
    /// to the global active count but only gates scheduler triggers.
    cap: usize,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        launcher: Arc<dyn ScanLauncher>,
        registry: Arc<CancelRegistry>,
        cap: usize,
    ) -> Self {
        Self {
            store,
            launcher,
            registry,
            cap,
        }
    }

    /// Tick forever. Spawned once at startup.
    pub async fn run(self: Arc<Self>, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match self.tick(Utc::now()).await {
                Ok(0) => {}
                Ok(triggered) => {
                    tracing::info!("Scheduler tick triggered {} scan(s)", triggered);
                }
                Err(e) => {
                    tracing::error!("Scheduler tick failed: {}", e);
                }
            }
        }
    }

    /// One scheduler pass at instant `now`. Returns the number of scans
    /// triggered.
    pub async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let active = self.store.count_active_scans().await?;
        if active as usize >= self.cap {
            tracing::debug!(
                "Skipping scheduler tick: {} active scans (cap {})",
                active,
                self.cap
            );
            return Ok(0);
        }

        let mut triggered = 0;
        for mut schedule in self.store.list_schedules().await? {
            if !schedule.enabled {
                continue;
            }

            let due = match (schedule.next_run, schedule.last_run) {
                (Some(next_run), _) => now >= next_run,
                (None, Some(last_run)) => {
                    let expected = next_occurrence(&schedule, last_run);
                    if now >= expected {
                        true
                    } else {
                        // Repair the missing next_run without triggering
                        // so later ticks skip this recomputation.
                        schedule.next_run = Some(expected);
                        self.store.update_schedule(&schedule).await?;
                        continue;
                    }
                }
                // Never run before: fire immediately.
                (None, None) => true,
            };
            if !due {
                continue;
            }

            self.trigger(&mut schedule, now).await?;
            triggered += 1;
        }
        Ok(triggered)
    }

    async fn trigger(
        &self,
        schedule: &mut ScheduledScan,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        // Scheduled runs use the lightweight tier.
        let scan = Scan::new(schedule.target_url.clone(), ScanDepth::Shallow);
        self.store.create_scan(&scan).await?;

        let token = self.registry.register(scan.id);
        let launcher = self.launcher.clone();
        let target_url = scan.target_url.clone();
        let scan_id = scan.id;
        tokio::spawn(async move {
            launcher
                .launch(scan_id, target_url, ScanDepth::Shallow, token)
                .await;
        });

        tracing::info!(
            "Scheduled scan triggered for {} (schedule {}, scan {})",
            schedule.target_url,
            schedule.id,
            scan.id
        );

        // Next occurrence is computed from *now*, not from the slot that
        // just fired, so a backlog never amplifies.
        schedule.last_run = Some(now);
        schedule.next_run = Some(next_occurrence(schedule, now));
        self.store.update_schedule(schedule).await?;
        Ok(())
    }
}

/// First occurrence of the schedule strictly after `reference`.
pub fn next_occurrence(schedule: &ScheduledScan, reference: DateTime<Utc>) -> DateTime<Utc> {
    let (hour, minute) = schedule.clock_time();
    let today = reference.date_naive();

    match schedule.frequency {
        Frequency::Daily => {
            let candidate = at(today, hour, minute);
            if candidate > reference {
                candidate
            } else {
                at(today + ChronoDuration::days(1), hour, minute)
            }
        }
        Frequency::Weekly => match schedule.day_of_week {
            Some(target) => {
                let current = reference.weekday().num_days_from_sunday();
                let ahead = (target % 7 + 7 - current) % 7;
                let candidate = at(today + ChronoDuration::days(ahead as i64), hour, minute);
                if candidate > reference {
                    candidate
                } else {
                    candidate + ChronoDuration::days(7)
                }
            }
            // Legacy schedules without a stored weekday just add a week.
            None => at(today + ChronoDuration::days(7), hour, minute),
        },
        Frequency::Monthly => next_month_slot(schedule, reference, 1),
        Frequency::Quarterly => next_month_slot(schedule, reference, 3),
        Frequency::Annually => {
            let month = schedule.month.unwrap_or(1).clamp(1, 12);
            let day = schedule.day_of_month.unwrap_or(1);
            let candidate = at(clamped_date(reference.year(), month, day), hour, minute);
            if candidate > reference {
                candidate
            } else {
                at(clamped_date(reference.year() + 1, month, day), hour, minute)
            }
        }
    }
}

fn next_month_slot(
    schedule: &ScheduledScan,
    reference: DateTime<Utc>,
    months: u32,
) -> DateTime<Utc> {
    let (hour, minute) = schedule.clock_time();
    let day = schedule.day_of_month.unwrap_or(1);
    let candidate = at(clamped_date(reference.year(), reference.month(), day), hour, minute);
    if candidate > reference {
        candidate
    } else {
        let (year, month) = add_months(reference.year(), reference.month(), months);
        at(clamped_date(year, month, day), hour, minute)
    }
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    date.and_time(time).and_utc()
}

/// Date with the day clamped into the month's length (Feb 31 -> Feb 28).
fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = add_months(year, month, 1);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn add_months(year: i32, month: u32, delta: u32) -> (i32, u32) {
    let total = year * 12 + (month as i32 - 1) + delta as i32;
    (total.div_euclid(12), (total.rem_euclid(12) + 1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::TimeZone;

    use crate::db::memory::MemoryStore;
    use crate::models::ScanStatus;

    fn schedule(frequency: Frequency, time_of_day: &str) -> ScheduledScan {
        ScheduledScan {
            id: Uuid::new_v4(),
            target_url: "https://example.com".into(),
            frequency,
            time_of_day: time_of_day.into(),
            day_of_week: None,
            day_of_month: None,
            month: None,
            enabled: true,
            last_run: None,
            next_run: None,
            created_at: Utc::now(),
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn daily_keeps_today_until_time_passes() {
        let s = schedule(Frequency::Daily, "02:00");
        // 2026-03-10 is a Tuesday.
        assert_eq!(
            next_occurrence(&s, utc(2026, 3, 10, 1, 0)),
            utc(2026, 3, 10, 2, 0)
        );
        assert_eq!(
            next_occurrence(&s, utc(2026, 3, 10, 3, 0)),
            utc(2026, 3, 11, 2, 0)
        );
    }

    #[test]
    fn weekly_targets_wednesday() {
        let mut s = schedule(Frequency::Weekly, "02:00");
        s.day_of_week = Some(3); // Wednesday

        // Monday 2026-01-05 10:00 -> Wednesday 2026-01-07 02:00.
        assert_eq!(
            next_occurrence(&s, utc(2026, 1, 5, 10, 0)),
            utc(2026, 1, 7, 2, 0)
        );
        // Wednesday 01:00 the same week keeps that Wednesday.
        assert_eq!(
            next_occurrence(&s, utc(2026, 1, 7, 1, 0)),
            utc(2026, 1, 7, 2, 0)
        );
        // Wednesday 03:00 rolls a full week.
        assert_eq!(
            next_occurrence(&s, utc(2026, 1, 7, 3, 0)),
            utc(2026, 1, 14, 2, 0)
        );
    }

    #[test]
    fn weekly_without_weekday_adds_seven_days() {
        let s = schedule(Frequency::Weekly, "02:00");
        assert_eq!(
            next_occurrence(&s, utc(2026, 1, 5, 10, 0)),
            utc(2026, 1, 12, 2, 0)
        );
    }

    #[test]
    fn monthly_rolls_and_clamps() {
        let mut s = schedule(Frequency::Monthly, "02:00");
        s.day_of_month = Some(15);
        assert_eq!(
            next_occurrence(&s, utc(2026, 1, 10, 0, 0)),
            utc(2026, 1, 15, 2, 0)
        );
        assert_eq!(
            next_occurrence(&s, utc(2026, 1, 20, 0, 0)),
            utc(2026, 2, 15, 2, 0)
        );

        // Day 31 clamps inside February.
        s.day_of_month = Some(31);
        assert_eq!(
            next_occurrence(&s, utc(2026, 2, 1, 0, 0)),
            utc(2026, 2, 28, 2, 0)
        );
    }

    #[test]
    fn quarterly_rolls_three_months() {
        let mut s = schedule(Frequency::Quarterly, "02:00");
        s.day_of_month = Some(15);
        assert_eq!(
            next_occurrence(&s, utc(2026, 1, 20, 0, 0)),
            utc(2026, 4, 15, 2, 0)
        );
    }

    #[test]
    fn annually_rolls_a_year_when_passed() {
        let mut s = schedule(Frequency::Annually, "02:00");
        s.month = Some(6);
        s.day_of_month = Some(1);
        assert_eq!(
            next_occurrence(&s, utc(2026, 5, 1, 0, 0)),
            utc(2026, 6, 1, 2, 0)
        );
        assert_eq!(
            next_occurrence(&s, utc(2026, 7, 1, 0, 0)),
            utc(2027, 6, 1, 2, 0)
        );
    }

    // ── Tick behavior ────────────────────────────────────────────────

    #[derive(Default)]
    struct FakeLauncher {
        launched: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl ScanLauncher for FakeLauncher {
        async fn launch(
            &self,
            scan_id: Uuid,
            _target_url: String,
            _depth: ScanDepth,
            _token: CancellationToken,
        ) {
            self.launched.lock().unwrap().push(scan_id);
        }
    }

    fn scheduler_fixture(cap: usize) -> (Arc<MemoryStore>, Arc<FakeLauncher>, Scheduler) {
        let store = Arc::new(MemoryStore::new());
        let launcher = Arc::new(FakeLauncher::default());
        let scheduler = Scheduler::new(
            store.clone(),
            launcher.clone(),
            Arc::new(CancelRegistry::new()),
            cap,
        );
        (store, launcher, scheduler)
    }

    async fn insert_running_scans(store: &MemoryStore, count: usize) {
        for _ in 0..count {
            let mut scan = Scan::new("https://busy.example", ScanDepth::Shallow);
            scan.status = ScanStatus::Running;
            store.create_scan(&scan).await.unwrap();
        }
    }

    #[tokio::test]
    async fn tick_at_cap_evaluates_nothing() {
        let (store, _launcher, scheduler) = scheduler_fixture(2);
        insert_running_scans(&store, 2).await;

        // Overdue schedule that would otherwise fire.
        let mut due = schedule(Frequency::Daily, "02:00");
        due.next_run = Some(utc(2026, 1, 1, 2, 0));
        store.create_schedule(&due).await.unwrap();

        let triggered = scheduler.tick(utc(2026, 1, 2, 3, 0)).await.unwrap();
        assert_eq!(triggered, 0);

        // The schedule was not even touched.
        let stored = store.get_schedule(due.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run, due.next_run);
        assert!(stored.last_run.is_none());
    }

    #[tokio::test]
    async fn due_schedule_triggers_shallow_scan_and_advances() {
        let (store, launcher, scheduler) = scheduler_fixture(2);
        let mut due = schedule(Frequency::Daily, "02:00");
        due.next_run = Some(utc(2026, 1, 2, 2, 0));
        store.create_schedule(&due).await.unwrap();

        let now = utc(2026, 1, 2, 3, 0);
        let triggered = scheduler.tick(now).await.unwrap();
        assert_eq!(triggered, 1);

        let scans = store.list_scans(10).await.unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].depth, ScanDepth::Shallow);

        let stored = store.get_schedule(due.id).await.unwrap().unwrap();
        assert_eq!(stored.last_run, Some(now));
        // Computed from now: next day 02:00, not from the missed slot.
        assert_eq!(stored.next_run, Some(utc(2026, 1, 3, 2, 0)));

        // The pipeline was handed the created scan.
        tokio::task::yield_now().await;
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_next_run_is_repaired_without_triggering() {
        let (store, launcher, scheduler) = scheduler_fixture(2);
        let mut s = schedule(Frequency::Daily, "02:00");
        s.last_run = Some(utc(2026, 1, 2, 2, 0));
        store.create_schedule(&s).await.unwrap();

        // Expected next occurrence (2026-01-03 02:00) is still ahead.
        let triggered = scheduler.tick(utc(2026, 1, 2, 12, 0)).await.unwrap();
        assert_eq!(triggered, 0);

        let stored = store.get_schedule(s.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run, Some(utc(2026, 1, 3, 2, 0)));
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn never_run_schedule_fires_immediately() {
        let (store, _launcher, scheduler) = scheduler_fixture(2);
        let s = schedule(Frequency::Weekly, "02:00");
        store.create_schedule(&s).await.unwrap();

        let triggered = scheduler.tick(utc(2026, 1, 2, 3, 0)).await.unwrap();
        assert_eq!(triggered, 1);
    }

    #[tokio::test]
    async fn disabled_schedules_are_ignored() {
        let (store, _launcher, scheduler) = scheduler_fixture(2);
        let mut s = schedule(Frequency::Daily, "02:00");
        s.enabled = false;
        store.create_schedule(&s).await.unwrap();

        let triggered = scheduler.tick(utc(2026, 1, 2, 3, 0)).await.unwrap();
        assert_eq!(triggered, 0);
    }
}
