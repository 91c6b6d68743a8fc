//! Scheduler / runner
//!
//! Turns a corpus into jobs (one per test variant), dispatches them across
//! a fixed-size worker pool in deterministic corpus order, and accumulates
//! one outcome per job. Completion order may interleave freely; the sealed
//! [`ResultSet`] restores corpus order, so reports are reproducible
//! byte-for-byte for a given corpus, worker count, and shuffle seed.

use crate::corpus::TestCase;
use crate::error::{Error, Result};
use crate::harness;
use crate::host::{Host, SourceGoal};
use crate::includes::IncludeResolver;
use crate::metadata::{ExpectedError, TestMetadata, Variant};
use crate::outcome::{classify, Failure, Outcome, Verdict};
use crate::report::ResultSet;
use crate::sandbox::{ExecutionContext, Sandbox, SandboxConfig, SandboxResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Worker pool size.
    pub workers: usize,
    /// Wall-clock budget per (test, variant) run.
    pub test_timeout: Duration,
    /// Global budget for the whole run; on expiry workers stop accepting
    /// new work, in-flight runs drain, and the remainder is reported Skip.
    pub run_timeout: Option<Duration>,
    /// Feature names the host does not implement; declaring tests are
    /// skipped before any context is spawned.
    pub unsupported_features: Vec<String>,
    /// When non-empty, only tests declaring at least one of these features
    /// run; everything else is skipped.
    pub feature_filter: Vec<String>,
    /// Shuffle dispatch order with this seed. Reports stay corpus-ordered;
    /// this only shakes out cross-test state leaks.
    pub shuffle_seed: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            test_timeout: Duration::from_secs(10),
            run_timeout: None,
            unsupported_features: Vec::new(),
            feature_filter: Vec::new(),
            shuffle_seed: None,
        }
    }
}

/// One unit of work: a single (test, variant) execution.
struct Job {
    order: (usize, usize),
    test_id: String,
    source: String,
    includes: Vec<String>,
    variant: Variant,
    expects_async: bool,
    negative: Option<ExpectedError>,
}

/// Executes a corpus against a host.
pub struct Runner {
    sandbox: Sandbox,
    resolver: Arc<IncludeResolver>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(host: Arc<dyn Host>, resolver: Arc<IncludeResolver>, config: RunnerConfig) -> Self {
        let sandbox = Sandbox::new(
            host,
            SandboxConfig {
                timeout: config.test_timeout,
                ..SandboxConfig::default()
            },
        );
        Self {
            sandbox,
            resolver,
            config,
        }
    }

    /// Run the whole corpus to a sealed [`ResultSet`].
    ///
    /// Per-test defects become Crash outcomes; the only `Err` return is
    /// runner-level resource exhaustion.
    pub fn run(&self, corpus: &[TestCase]) -> Result<ResultSet> {
        let mut results = ResultSet::new();
        let mut jobs = Vec::new();

        for (index, test) in corpus.iter().enumerate() {
            self.plan(index, test, &mut jobs, &mut results);
        }

        tracing::info!(
            tests = corpus.len(),
            jobs = jobs.len(),
            workers = self.config.workers,
            "dispatching corpus"
        );

        if let Some(seed) = self.config.shuffle_seed {
            jobs.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let queue = Mutex::new(VecDeque::from(jobs));
        let deadline = self.config.run_timeout.map(|t| Instant::now() + t);
        let (sender, receiver) = mpsc::channel::<Outcome>();

        std::thread::scope(|scope| -> Result<()> {
            for worker in 0..self.config.workers.max(1) {
                let sender = sender.clone();
                let queue = &queue;
                std::thread::Builder::new()
                    .name(format!("cinnabar-worker-{}", worker))
                    .spawn_scoped(scope, move || loop {
                        if deadline.is_some_and(|d| Instant::now() >= d) {
                            break;
                        }
                        let job = {
                            let mut queue = queue.lock().expect("work queue poisoned");
                            queue.pop_front()
                        };
                        let Some(job) = job else { break };
                        let outcome = self.execute(&job);
                        if sender.send(outcome).is_err() {
                            break;
                        }
                    })
                    .map_err(|e| Error::WorkerPool(format!("failed to spawn worker: {}", e)))?;
            }
            Ok(())
        })?;
        drop(sender);

        while let Ok(outcome) = receiver.recv() {
            results.record(outcome);
        }

        // Global timeout: whatever was never dispatched is reported Skip,
        // so the report still enumerates every (test, variant) exactly
        // once.
        let leftover = queue
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for job in leftover {
            results.record(Outcome::skip(job.test_id, job.variant, job.order));
        }

        results.seal();
        Ok(results)
    }

    /// Resolve one test into jobs, or record its outcome immediately when
    /// it never gets to run (corpus defect or feature gate).
    fn plan(&self, index: usize, test: &TestCase, jobs: &mut Vec<Job>, results: &mut ResultSet) {
        let metadata = match test.metadata() {
            Ok(metadata) => metadata,
            Err(defect) => {
                tracing::warn!(id = %test.id, error = %defect, "corpus defect");
                results.record(Outcome {
                    test_id: test.id.clone(),
                    variant: Variant::Raw,
                    verdict: Verdict::Crash,
                    elapsed: Duration::ZERO,
                    failure: Some(Failure::Harness {
                        message: defect.to_string(),
                    }),
                    order: (index, 0),
                });
                return;
            }
        };

        let variants = metadata.variants();
        if self.should_skip(&metadata) {
            for (v, variant) in variants.into_iter().enumerate() {
                results.record(Outcome::skip(test.id.clone(), variant, (index, v)));
            }
            return;
        }

        for (v, variant) in variants.into_iter().enumerate() {
            jobs.push(Job {
                order: (index, v),
                test_id: test.id.clone(),
                source: test.source.clone(),
                includes: metadata.includes.clone(),
                variant,
                expects_async: metadata.is_async(),
                negative: metadata.negative.clone(),
            });
        }
    }

    fn should_skip(&self, metadata: &TestMetadata) -> bool {
        if metadata
            .features
            .iter()
            .any(|f| self.config.unsupported_features.contains(f))
        {
            return true;
        }
        if !self.config.feature_filter.is_empty() {
            return !metadata
                .features
                .iter()
                .any(|f| self.config.feature_filter.contains(f));
        }
        false
    }

    /// Run one job to its outcome. Never returns an error: every failure
    /// mode maps to a verdict.
    fn execute(&self, job: &Job) -> Outcome {
        tracing::debug!(id = %job.test_id, variant = %job.variant, "executing");

        let includes = match self.resolver.resolve(&job.includes) {
            Ok(text) => text,
            Err(missing) => {
                let (verdict, failure) =
                    classify(job.negative.as_ref(), &SandboxResult::Fault(missing));
                return Outcome {
                    test_id: job.test_id.clone(),
                    variant: job.variant,
                    verdict,
                    elapsed: Duration::ZERO,
                    failure,
                    order: job.order,
                };
            }
        };

        let source = harness::assemble(&job.source, &includes, job.variant, job.expects_async);
        let goal = if job.variant == Variant::Module {
            SourceGoal::Module
        } else {
            SourceGoal::Script
        };
        let context = ExecutionContext {
            id: format!("{} ({})", job.test_id, job.variant),
            source,
            goal,
            expects_async: job.expects_async,
        };

        let (raw, elapsed) = self.sandbox.run(context);
        let (verdict, failure) = classify(job.negative.as_ref(), &raw);
        if verdict == Verdict::Crash {
            tracing::warn!(id = %job.test_id, variant = %job.variant, "harness crash");
        }

        Outcome {
            test_id: job.test_id.clone(),
            variant: job.variant,
            verdict,
            elapsed,
            failure,
            order: job.order,
        }
    }
}
