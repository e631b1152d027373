// Daily job table driven by a coarse polling loop.
//
// Each entry remembers when it last fired and when it fires next. Due tasks run
// one after another on the loop's own task, so a long collection delays every
// later entry. Days missed while the loop was busy are not replayed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Local, NaiveDateTime, NaiveTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall-clock local time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;
    async fn fire(&self);
}

struct Entry {
    at: NaiveTime,
    task: Arc<dyn Task>,
    next_fire: NaiveDateTime,
    last_fired: Option<NaiveDateTime>,
}

pub struct Scheduler {
    clock: Box<dyn Clock>,
    entries: Vec<Entry>,
}

/// First `at` strictly after `now`, or at `now` itself when `inclusive`.
fn next_occurrence(at: NaiveTime, now: NaiveDateTime, inclusive: bool) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now || (inclusive && today == now) {
        today
    } else {
        now.date()
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(at))
            .unwrap_or(NaiveDateTime::MAX)
    }
}

impl Scheduler {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            entries: Vec::new(),
        }
    }

    /// Register `task` to fire every day at local time `at`.
    pub fn every_day_at(&mut self, at: NaiveTime, task: Arc<dyn Task>) {
        let next_fire = next_occurrence(at, self.clock.now(), true);
        tracing::info!(task = task.name(), at = %at.format("%H:%M"), next = %next_fire, "Job registered");
        self.entries.push(Entry {
            at,
            task,
            next_fire,
            last_fired: None,
        });
    }

    #[allow(dead_code)]
    pub fn next_fire(&self, name: &str) -> Option<NaiveDateTime> {
        self.entries
            .iter()
            .find(|e| e.task.name() == name)
            .map(|e| e.next_fire)
    }

    #[allow(dead_code)]
    pub fn last_fired(&self, name: &str) -> Option<NaiveDateTime> {
        self.entries
            .iter()
            .find(|e| e.task.name() == name)
            .and_then(|e| e.last_fired)
    }

    /// Fire every entry whose time has come, in registration order.
    /// Returns how many tasks ran.
    pub async fn run_pending(&mut self) -> usize {
        let mut fired = 0;
        for i in 0..self.entries.len() {
            let now = self.clock.now();
            let entry = &self.entries[i];
            if now < entry.next_fire {
                continue;
            }

            let task = entry.task.clone();
            tracing::info!(task = task.name(), scheduled = %entry.next_fire, "Firing job");
            task.fire().await;
            fired += 1;

            let done = self.clock.now();
            let entry = &mut self.entries[i];
            entry.last_fired = Some(now);
            entry.next_fire = next_occurrence(entry.at, done.max(now), false);
            tracing::info!(task = task.name(), next = %entry.next_fire, "Job finished");
        }
        fired
    }

    /// Poll every `tick` until Ctrl-C.
    pub async fn run(self, tick: Duration) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(tick, ctrl_c).await;
    }

    /// Poll every `tick` until `shutdown` completes. A job still running at that
    /// point is dropped mid-run; its state file is only replaced on completion.
    pub async fn run_until(mut self, tick: Duration, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(jobs = self.entries.len(), tick_ms = tick.as_millis() as u64, "Scheduler started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received, exiting gracefully");
                    break;
                }
                _ = async {
                    interval.tick().await;
                    self.run_pending().await;
                } => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;
    use tokio::sync::Notify;

    use super::*;

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<NaiveDateTime>>);

    impl ManualClock {
        fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> Self {
            let t = NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap();
            Self(Arc::new(Mutex::new(t)))
        }

        fn advance(&self, by: chrono::Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> NaiveDateTime {
            *self.0.lock().unwrap()
        }
    }

    struct Counter {
        name: &'static str,
        fired: AtomicUsize,
    }

    impl Counter {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fired: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.fired.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Task for Counter {
        fn name(&self) -> &str {
            self.name
        }

        async fn fire(&self) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn five_pm() -> NaiveTime {
        NaiveTime::from_hms_opt(17, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn fires_once_per_crossing() {
        let clock = ManualClock::at(2024, 3, 1, 16, 59, 58);
        let mut scheduler = Scheduler::new(clock.clone());
        let job = Counter::new("headhunter");
        scheduler.every_day_at(five_pm(), job.clone());

        scheduler.run_pending().await;
        assert_eq!(job.count(), 0);

        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(scheduler.run_pending().await, 1);
        assert_eq!(job.count(), 1);

        for _ in 0..10 {
            clock.advance(chrono::Duration::seconds(1));
            scheduler.run_pending().await;
        }
        assert_eq!(job.count(), 1);

        clock.advance(chrono::Duration::hours(23) + chrono::Duration::minutes(59));
        scheduler.run_pending().await;
        assert_eq!(job.count(), 1);

        clock.advance(chrono::Duration::seconds(60));
        scheduler.run_pending().await;
        assert_eq!(job.count(), 2);
        assert_eq!(
            scheduler.next_fire("headhunter"),
            Some(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap().and_time(five_pm()))
        );
    }

    #[tokio::test]
    async fn registered_after_fire_time_waits_for_tomorrow() {
        let clock = ManualClock::at(2024, 3, 1, 18, 0, 0);
        let mut scheduler = Scheduler::new(clock.clone());
        let job = Counter::new("superjob");
        scheduler.every_day_at(five_pm(), job.clone());

        scheduler.run_pending().await;
        assert_eq!(job.count(), 0);
        assert_eq!(
            scheduler.next_fire("superjob"),
            Some(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap().and_time(five_pm()))
        );
    }

    #[tokio::test]
    async fn missed_days_are_not_replayed() {
        let clock = ManualClock::at(2024, 3, 1, 12, 0, 0);
        let mut scheduler = Scheduler::new(clock.clone());
        let job = Counter::new("headhunter");
        scheduler.every_day_at(five_pm(), job.clone());

        clock.advance(chrono::Duration::days(3));
        scheduler.run_pending().await;
        scheduler.run_pending().await;
        assert_eq!(job.count(), 1);
        assert_eq!(
            scheduler.last_fired("headhunter"),
            Some(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(12, 0, 0).unwrap())
        );
        assert_eq!(
            scheduler.next_fire("headhunter"),
            Some(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_time(five_pm()))
        );
    }

    struct Stuck {
        started: Notify,
    }

    #[async_trait]
    impl Task for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn fire(&self) {
            self.started.notify_one();
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn shutdown_is_seen_while_a_job_is_running() {
        let clock = ManualClock::at(2024, 3, 1, 17, 0, 0);
        let mut scheduler = Scheduler::new(clock);
        let job = Arc::new(Stuck {
            started: Notify::new(),
        });
        scheduler.every_day_at(five_pm(), job.clone());

        let stop = async {
            job.started.notified().await;
        };
        tokio::time::timeout(Duration::from_secs(5), scheduler.run_until(Duration::from_millis(10), stop))
            .await
            .expect("scheduler should stop while the job is in flight");
    }

    #[tokio::test]
    async fn independent_jobs_fire_at_their_own_times() {
        let clock = ManualClock::at(2024, 3, 1, 16, 0, 0);
        let mut scheduler = Scheduler::new(clock.clone());
        let hh = Counter::new("headhunter");
        let sj = Counter::new("superjob");
        scheduler.every_day_at(five_pm(), hh.clone());
        scheduler.every_day_at(NaiveTime::from_hms_opt(18, 0, 0).unwrap(), sj.clone());

        clock.advance(chrono::Duration::hours(1));
        scheduler.run_pending().await;
        assert_eq!((hh.count(), sj.count()), (1, 0));

        clock.advance(chrono::Duration::hours(1));
        scheduler.run_pending().await;
        assert_eq!((hh.count(), sj.count()), (1, 1));
    }
}
