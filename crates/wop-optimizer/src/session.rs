//! Ask/tell session driving one remote optimization.
//!
//! A session is created against the service once, seeded with a design of
//! experiments, then iterated: [`OptimizationSession::ask`] uploads the
//! history and waits for the next suggestion, the caller evaluates it and
//! [`OptimizationSession::tell`]s the result back.

use std::time::Duration;
use tracing::{debug, info, warn};
use wop_types::{
    check_row, config_error, optimization_error, size_mismatch, History, OptimizationConfig,
    Status, TellOutcome, WopError, WopResult,
};

use crate::filter::{BestPoint, ConstraintFilter};
use crate::transport::{RemoteId, RemoteOutputs, Transport};

/// Fixed-interval polling budget for [`OptimizationSession::ask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Number of reads before giving up.
    pub max_attempts: u32,
    /// Pause between two reads.
    pub interval: Duration,
    /// Log a "still waiting" notice every this many attempts (0 disables it).
    pub notice_every: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(1),
            notice_every: 10,
        }
    }
}

impl PollSettings {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Read `WOP_POLL_ATTEMPTS` and `WOP_POLL_INTERVAL_MS`, falling back to
    /// the defaults for unset variables.
    pub fn from_env() -> WopResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with variables looked up through
    /// `var`.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> WopResult<Self> {
        let mut settings = Self::default();
        if let Some(attempts) = var("WOP_POLL_ATTEMPTS") {
            settings.max_attempts = attempts.parse().map_err(|_| {
                config_error!("WOP_POLL_ATTEMPTS must be a whole number, got {attempts:?}")
            })?;
        }
        if let Some(ms) = var("WOP_POLL_INTERVAL_MS") {
            let ms: u64 = ms.parse().map_err(|_| {
                config_error!("WOP_POLL_INTERVAL_MS must be a whole number, got {ms:?}")
            })?;
            settings.interval = Duration::from_millis(ms);
        }
        Ok(settings)
    }
}

/// Outcome of one ask round.
#[derive(Debug, Clone, PartialEq)]
pub struct AskResult {
    /// Next point to evaluate.
    pub suggestion: Option<Vec<f64>>,
    /// How the round ended.
    pub status: Status,
    /// Best input(s) found so far, one row per Pareto point for
    /// multi-objective problems. Only filled when requested.
    pub best: Option<Vec<Vec<f64>>>,
    /// Outputs matching `best`, row for row.
    pub best_values: Option<Vec<Vec<f64>>>,
}

/// Best point(s) reported by the remote solver.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBest {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<Vec<f64>>,
}

/// Stateful client for one remote optimization.
pub struct OptimizationSession<T: Transport> {
    transport: T,
    id: RemoteId,
    config: OptimizationConfig,
    history: History,
    status: Status,
    suggestion: Option<Vec<f64>>,
    best: Option<RemoteBest>,
    poll: PollSettings,
}

impl<T: Transport> OptimizationSession<T> {
    /// Create the remote optimization and a session bound to it.
    pub async fn create(transport: T, config: OptimizationConfig) -> WopResult<Self> {
        let id = transport.create(&config).await.map_err(|e| match e {
            WopError::Optimization(_) => e,
            other => WopError::Optimization(other.to_string()),
        })?;
        info!(
            "Created remote optimization {} ({}, {} variables, {} objectives, {} constraints)",
            id,
            config.kind(),
            config.dimension(),
            config.objective_count(),
            config.constraints().len()
        );

        Ok(Self {
            transport,
            id,
            config,
            history: History::new(),
            status: Status::Pending,
            suggestion: None,
            best: None,
            poll: PollSettings::default(),
        })
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn id(&self) -> &RemoteId {
        &self.id
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Last suggested point, cleared when a round fails.
    pub fn suggestion(&self) -> Option<&[f64]> {
        self.suggestion.as_deref()
    }

    /// Last best point(s) reported by the remote solver.
    pub fn best(&self) -> Option<&RemoteBest> {
        self.best.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Replace the history with a design of experiments.
    pub fn tell_doe(&mut self, x: Vec<Vec<f64>>, y: Vec<Vec<f64>>) -> WopResult<()> {
        let history = History::from_doe(x, y)?;
        history.check_widths(self.config.dimension(), self.config.output_width())?;

        info!("Seeded optimization {} with {} DOE points", self.id, history.len());
        self.history = history;
        self.status = Status::Pending;
        self.best = None;
        Ok(())
    }

    /// Record one observation locally; the next [`ask`](Self::ask) uploads it.
    ///
    /// Telling an input that is already in the history leaves the history
    /// unchanged and moves the session to [`Status::SolutionReached`].
    pub fn tell(&mut self, x: Vec<f64>, y: Vec<f64>) -> WopResult<TellOutcome> {
        check_row(
            self.history.len(),
            &x,
            &y,
            self.config.dimension(),
            self.config.output_width(),
        )?;

        let outcome = self.history.tell(x, y);
        match outcome {
            TellOutcome::Accepted => {
                debug!("Told point {} to optimization {}", self.history.len(), self.id);
            }
            TellOutcome::DuplicateObservation { index } => {
                warn!(
                    "Point already told as row {} with y = {:?}, solution reached",
                    index,
                    self.history.y()[index]
                );
                self.status = Status::SolutionReached;
            }
        }
        Ok(outcome)
    }

    /// Upload the history and wait for the next suggestion.
    ///
    /// With `with_best` the solver also reports its current feasible best
    /// (the Pareto set for multi-objective problems).
    pub async fn ask(&mut self, with_best: bool) -> WopResult<AskResult> {
        if self.history.is_empty() {
            return Err(WopError::EmptyHistory);
        }
        self.history.check_consistent()?;

        self.status = Status::Running;
        info!(
            "Asking optimization {} for a new point ({} observations)",
            self.id,
            self.history.len()
        );

        let outputs = match self.upload_and_poll(with_best).await {
            Ok(outputs) => outputs,
            Err(e) => {
                self.status = Status::RuntimeError;
                self.suggestion = None;
                return Err(e);
            }
        };

        let status = outputs.status;
        self.suggestion = outputs.x_suggested.clone();

        if status == Status::RuntimeError {
            warn!("Remote optimizer {} reported a runtime error", self.id);
            self.status = Status::RuntimeError;
            return Ok(AskResult {
                suggestion: outputs.x_suggested,
                status,
                best: None,
                best_values: None,
            });
        }

        if outputs.x_suggested.is_none()
            && matches!(status, Status::ValidPoint | Status::InvalidPoint)
        {
            self.status = Status::RuntimeError;
            return Err(optimization_error!(
                "Malformed server response: {status} round without x_suggested"
            ));
        }

        let (best, best_values) = if with_best {
            (outputs.x_best, outputs.y_best)
        } else {
            (None, None)
        };
        if let (Some(x), Some(y)) = (&best, &best_values) {
            self.best = Some(RemoteBest {
                x: x.clone(),
                y: y.clone(),
            });
        }

        info!("Optimization {} round finished: {}", self.id, status);
        self.status = Status::Pending;

        Ok(AskResult {
            suggestion: outputs.x_suggested,
            status,
            best,
            best_values,
        })
    }

    async fn upload_and_poll(&self, with_best: bool) -> WopResult<RemoteOutputs> {
        self.transport
            .update(&self.id, &self.history, with_best)
            .await?;

        let max_attempts = self.poll.max_attempts;
        for attempt in 1..=max_attempts {
            let outputs = self.transport.read(&self.id).await?;
            if outputs.status != Status::Running {
                debug!("Poll {} of {}: {}", attempt, max_attempts, outputs.status);
                return Ok(outputs);
            }

            if self.poll.notice_every > 0 && attempt % self.poll.notice_every == 0 {
                info!(
                    "Still waiting for optimization {} ({}/{} polls)",
                    self.id, attempt, max_attempts
                );
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.poll.interval).await;
            }
        }

        warn!(
            "Optimization {} still running after {} polls",
            self.id, max_attempts
        );
        Err(WopError::Timeout {
            attempts: max_attempts,
        })
    }

    /// Run up to `max_iterations` ask/evaluate/tell rounds and return the
    /// best feasible observation.
    ///
    /// `evaluate` maps a batch of inputs to their outputs. The best point is
    /// requested from the solver on the last round, or on every round with
    /// `with_best`. Remote failures stop the loop and leave the session in
    /// [`Status::RuntimeError`] instead of failing the call.
    pub async fn run<F>(
        &mut self,
        mut evaluate: F,
        max_iterations: usize,
        with_best: bool,
    ) -> WopResult<BestPoint>
    where
        F: FnMut(&[Vec<f64>]) -> Vec<Vec<f64>>,
    {
        for iteration in 0..max_iterations {
            let last = iteration + 1 == max_iterations;
            let round = match self.ask(with_best || last).await {
                Ok(round) => round,
                Err(e) if e.is_remote() => {
                    warn!("Stopping after iteration {}: {}", iteration, e);
                    break;
                }
                Err(e) => return Err(e),
            };

            match round.status {
                Status::SolutionReached => {
                    info!("Solution reached after {} iterations", iteration + 1);
                    self.status = Status::SolutionReached;
                    break;
                }
                Status::RuntimeError => break,
                Status::InvalidPoint => {
                    warn!("Remote optimizer flagged the suggestion as invalid");
                }
                _ => {}
            }

            let Some(x) = round.suggestion else {
                warn!("No suggestion returned at iteration {}, stopping", iteration);
                break;
            };
            let y = evaluate(std::slice::from_ref(&x))
                .into_iter()
                .next()
                .ok_or_else(|| size_mismatch!("evaluator returned no output for {x:?}"))?;

            if let TellOutcome::DuplicateObservation { .. } = self.tell(x, y)? {
                break;
            }
        }

        self.get_result()
    }

    /// Best feasible observation in the history.
    pub fn get_result(&self) -> WopResult<BestPoint> {
        ConstraintFilter::from_config(&self.config).best(&self.history)
    }

    /// Feasible non-dominated observations in the history.
    pub fn pareto_front(&self) -> Vec<BestPoint> {
        ConstraintFilter::from_config(&self.config).pareto_front(&self.history)
    }
}
