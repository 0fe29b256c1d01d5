//! Fans a scenario out across simulated users and aggregates the outcome.
//!
//! Users run as tasks in a [`JoinSet`], bounded by a [`Semaphore`] sized to the
//! worker pool. Each user task owns an inner spawned task so that a panic is
//! observed as a [`JoinError`] instead of tearing the set down. The join loop
//! is wrapped in a backstop deadline; anything still running when it expires
//! is aborted. Whatever happens, the report always holds exactly
//! `concurrent_users * requests_per_user` results.

use async_trait::async_trait;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{self, Duration, Instant};
use tracing::{error, info, warn};

use crate::endpoint::Endpoint;
use crate::errors::RequestError;
use crate::issuer::{RequestIssuer, RequestResult};
use crate::metrics::WORKERS_ABANDONED_TOTAL;
use crate::percentiles::DEFAULT_MIN_PERCENTILE_SAMPLES;
use crate::scenario::ScenarioConfig;
use crate::stats::AggregateStats;
use crate::utils::deadline_after;
use crate::worker::{run_user, UserConfig};

/// Extra time granted after the worker deadline before tasks are aborted.
const BACKSTOP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub request_timeout: Duration,
    pub worker_timeout: Duration,
    /// Pool size; `None` runs every user at once.
    pub max_workers: Option<usize>,
    pub min_percentile_samples: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            worker_timeout: Duration::from_secs(120),
            max_workers: None,
            min_percentile_samples: DEFAULT_MIN_PERCENTILE_SAMPLES,
        }
    }
}

/// Result of one orchestrated run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadTestReport {
    pub endpoint: String,
    pub scenario: ScenarioConfig,
    #[serde(flatten)]
    pub stats: AggregateStats,
    /// Users that hit the deadline or panicked.
    pub abandoned_workers: usize,
    #[serde(skip)]
    pub results: Vec<RequestResult>,
}

/// Anything that can run a scenario against an endpoint.
#[async_trait]
pub trait LoadRunner: Send + Sync {
    async fn run(&self, endpoint: &Endpoint, scenario: &ScenarioConfig) -> LoadTestReport;
}

enum UserOutcome {
    Completed(Vec<RequestResult>),
    Panicked(String),
}

/// Aborts the wrapped task when dropped, so aborting the outer task also
/// stops the user it supervises.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct LoadOrchestrator {
    issuer: RequestIssuer,
    settings: OrchestratorSettings,
}

impl LoadOrchestrator {
    pub fn new(issuer: RequestIssuer, settings: OrchestratorSettings) -> Self {
        Self { issuer, settings }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    async fn execute(&self, endpoint: &Endpoint, scenario: &ScenarioConfig) -> LoadTestReport {
        let users = scenario.concurrent_users;
        let per_user = scenario.requests_per_user;
        let pool_size = self.settings.max_workers.unwrap_or(users).max(1);

        info!(
            endpoint = %endpoint.name,
            users,
            requests_per_user = per_user,
            pool_size,
            "Starting load run"
        );

        let start = Instant::now();
        let deadline = deadline_after(start, self.settings.worker_timeout);
        let endpoint_arc = Arc::new(endpoint.clone());
        let issuer = self.issuer.clone();
        let request_timeout = self.settings.request_timeout;
        let inter_request_delay = scenario.inter_request_delay;

        let (results, abandoned) = supervise(
            users,
            per_user,
            pool_size,
            deadline_after(deadline, BACKSTOP_GRACE),
            |user_id| {
                let config = UserConfig {
                    user_id,
                    requests_per_user: per_user,
                    inter_request_delay,
                    request_timeout,
                    deadline,
                };
                run_user(issuer.clone(), endpoint_arc.clone(), config)
            },
        )
        .await;
        WORKERS_ABANDONED_TOTAL.inc_by(abandoned as u64);

        let elapsed = start.elapsed();
        let stats = AggregateStats::compute(&results, elapsed, self.settings.min_percentile_samples);

        info!(
            endpoint = %endpoint.name,
            total = stats.total_requests,
            success_rate = stats.success_rate,
            rps = stats.requests_per_second,
            abandoned_workers = abandoned,
            "Load run complete"
        );

        LoadTestReport {
            endpoint: endpoint.name.clone(),
            scenario: *scenario,
            stats,
            abandoned_workers: abandoned,
            results,
        }
    }
}

#[async_trait]
impl LoadRunner for LoadOrchestrator {
    async fn run(&self, endpoint: &Endpoint, scenario: &ScenarioConfig) -> LoadTestReport {
        self.execute(endpoint, scenario).await
    }
}

/// Runs `users` user futures on a pool of `pool_size` and gathers exactly
/// `users * per_user` results. A user that panics is filled with
/// `WorkerPanicked`; one still running at `backstop` is aborted and filled
/// with `WorkerTimeout`. Returns the results and the number of such users.
async fn supervise<F, Fut>(
    users: usize,
    per_user: usize,
    pool_size: usize,
    backstop: Instant,
    mut make_user: F,
) -> (Vec<RequestResult>, usize)
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Vec<RequestResult>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(pool_size));
    let mut set = JoinSet::new();
    for user_id in 0..users {
        let semaphore = semaphore.clone();
        let user = make_user(user_id);

        set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (user_id, UserOutcome::Panicked(e.to_string())),
            };
            let mut handle = AbortOnDrop(tokio::spawn(user));
            let outcome = match (&mut handle.0).await {
                Ok(results) => UserOutcome::Completed(results),
                Err(e) => UserOutcome::Panicked(join_error_message(e)),
            };
            (user_id, outcome)
        });
    }

    let mut collected: Vec<Option<Vec<RequestResult>>> = vec![None; users];
    let mut abandoned = 0usize;

    let joined = time::timeout_at(
        backstop,
        collect(&mut set, &mut collected, per_user, &mut abandoned),
    )
    .await;

    if joined.is_err() {
        warn!(
            stragglers = set.len(),
            "Worker deadline expired, aborting remaining users"
        );
        set.shutdown().await;
    }

    let mut results = Vec::with_capacity(users * per_user);
    for (user_id, slot) in collected.into_iter().enumerate() {
        match slot {
            Some(mut user_results) => {
                pad_results(&mut user_results, user_id, per_user);
                results.extend(user_results);
            }
            None => {
                abandoned += 1;
                results.extend(
                    (0..per_user)
                        .map(|n| RequestResult::abandoned(RequestError::WorkerTimeout, user_id, n)),
                );
            }
        }
    }
    (results, abandoned)
}

async fn collect(
    set: &mut JoinSet<(usize, UserOutcome)>,
    collected: &mut [Option<Vec<RequestResult>>],
    per_user: usize,
    abandoned: &mut usize,
) {
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((user_id, UserOutcome::Completed(results))) => {
                collected[user_id] = Some(results);
            }
            Ok((user_id, UserOutcome::Panicked(message))) => {
                error!(user_id, message = %message, "User task panicked");
                *abandoned += 1;
                collected[user_id] = Some(
                    (0..per_user)
                        .map(|n| {
                            RequestResult::abandoned(
                                RequestError::WorkerPanicked {
                                    message: message.clone(),
                                },
                                user_id,
                                n,
                            )
                        })
                        .collect(),
                );
            }
            // Supervisor tasks contain no panicking code; a failure here leaves
            // the slot empty and it is filled as abandoned afterwards.
            Err(e) => error!(error = %e, "User supervisor task failed"),
        }
    }
}

fn pad_results(results: &mut Vec<RequestResult>, user_id: usize, per_user: usize) {
    results.truncate(per_user);
    let have = results.len();
    results.extend(
        (have..per_user).map(|n| RequestResult::abandoned(RequestError::WorkerTimeout, user_id, n)),
    );
}

fn join_error_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "cancelled".to_string();
    }
    match error.try_into_panic() {
        Ok(payload) => panic_message(payload),
        Err(e) => e.to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
