//! Runs registered operation tests inside one session and reports results.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::context::OperationContext;
use crate::controller::TestController;
use crate::driver::{join_failure, IssueRouting, OperationOutcome, OperationTest, Verdict};
use crate::error::{HarnessError, SessionFault};
use crate::logging::init_logging;
use crate::settings::HarnessSettings;

/// Exit code when every test passed or was skipped.
pub const EXIT_OK: i32 = 0;
/// Exit code when at least one test failed.
pub const EXIT_FAILED: i32 = 1;
/// Exit code when the run itself could not be completed.
pub const EXIT_ABORTED: i32 = 2;

/// One reported result: a whole operation, or one of its sub-cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub service: String,
    pub operation: String,
    /// `request:<index>` for sub-cases, `None` for operation-level results.
    pub case: Option<String>,
    pub verdict: Verdict,
    pub routing: Option<IssueRouting>,
}

impl CaseResult {
    /// `service/operation` or `service/operation/request:<index>`.
    pub fn label(&self) -> String {
        match self.case {
            Some(ref case) => format!("{}/{}/{}", self.service, self.operation, case),
            None => format!("{}/{}", self.service, self.operation),
        }
    }
}

/// Aggregate of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub results: Vec<CaseResult>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunReport {
    pub fn from_results(results: Vec<CaseResult>) -> Self {
        let mut report = RunReport::default();
        for result in &results {
            match result.verdict {
                Verdict::Passed => report.passed += 1,
                Verdict::Failed(_) => report.failed += 1,
                Verdict::Skipped(_) => report.skipped += 1,
            }
        }
        report.results = results;
        report
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            EXIT_OK
        } else {
            EXIT_FAILED
        }
    }

    /// Results recorded for `operation`, in order.
    pub fn for_operation<'a>(&'a self, operation: &'a str) -> impl Iterator<Item = &'a CaseResult> {
        self.results.iter().filter(move |r| r.operation == operation)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Autotest: {}/{} passed ({} failed, {} skipped)",
            self.passed,
            self.total(),
            self.failed,
            self.skipped
        )?;
        for r in &self.results {
            if let Verdict::Failed(ref message) = r.verdict {
                writeln!(f, "  FAIL [{}]: {}", r.label(), message)?;
                if let Some(ref routing) = r.routing {
                    writeln!(f, "       route to {}", routing)?;
                }
            }
        }
        Ok(())
    }
}

/// Why a run did not complete normally.
#[derive(Debug, thiserror::Error)]
pub enum RunAbort {
    /// The session could not be opened; no test ran.
    #[error("session setup failed: {0}")]
    Setup(SessionFault),

    /// Every test ran but the session could not be closed.
    #[error("session teardown failed: {fault}")]
    Teardown { report: RunReport, fault: SessionFault },
}

enum Finished {
    Done(Result<OperationOutcome, HarnessError>),
    TimedOut(Duration),
}

/// Runs operation tests concurrently, each on its own task with its own
/// cancellation context.
pub struct Runner {
    controller: Arc<TestController>,
    tests: Vec<Arc<dyn OperationTest>>,
    timeout: Option<Duration>,
}

impl Runner {
    /// A runner using the controller's configured per-operation timeout.
    pub fn new(controller: Arc<TestController>) -> Self {
        let timeout = controller.settings().operation_timeout();
        Runner {
            controller,
            tests: Vec::new(),
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn add<T: OperationTest + 'static>(&mut self, test: T) -> &mut Self {
        self.tests.push(Arc::new(test));
        self
    }

    pub fn add_shared(&mut self, test: Arc<dyn OperationTest>) -> &mut Self {
        self.tests.push(test);
        self
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Open the session, run every test, close the session.
    pub async fn run(self) -> Result<RunReport, RunAbort> {
        self.controller
            .start_session()
            .await
            .map_err(RunAbort::Setup)?;

        let mut pending = Vec::with_capacity(self.tests.len());
        for test in &self.tests {
            let (cancel, ctx) = OperationContext::new();
            let controller = self.controller.clone();
            let task_test = test.clone();
            let timeout = self.timeout;
            let handle = tokio::spawn(async move {
                let run = task_test.run(controller, ctx);
                match timeout {
                    None => Finished::Done(run.await),
                    Some(limit) => match tokio::time::timeout(limit, run).await {
                        Ok(outcome) => Finished::Done(outcome),
                        Err(_) => {
                            cancel.cancel();
                            Finished::TimedOut(limit)
                        }
                    },
                }
            });
            pending.push((test.clone(), handle));
        }

        let mut results = Vec::new();
        for (test, handle) in pending {
            let finished = handle.await;
            record(&mut results, test.as_ref(), finished);
        }
        let report = RunReport::from_results(results);
        tracing::info!(
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            "run finished"
        );

        match self.controller.end_session().await {
            Ok(()) => Ok(report),
            Err(fault) => Err(RunAbort::Teardown { report, fault }),
        }
    }
}

fn record(
    results: &mut Vec<CaseResult>,
    test: &dyn OperationTest,
    finished: Result<Finished, tokio::task::JoinError>,
) {
    let result = |case: Option<String>, verdict: Verdict| CaseResult {
        service: test.service().to_string(),
        operation: test.operation().to_string(),
        case,
        verdict,
        routing: test.issue_routing().cloned(),
    };

    let operation_verdict = match finished {
        Ok(Finished::Done(Ok(OperationOutcome::Cases(cases)))) if !cases.is_empty() => {
            for case in cases {
                if let Verdict::Failed(ref message) = case.verdict {
                    tracing::warn!(
                        service = test.service(),
                        operation = test.operation(),
                        case = %case.name,
                        %message,
                        "sub-case failed"
                    );
                }
                results.push(result(Some(case.name), case.verdict));
            }
            return;
        }
        Ok(Finished::Done(Ok(OperationOutcome::Cases(_)))) => Verdict::Passed,
        Ok(Finished::Done(Ok(OperationOutcome::Skipped(reason)))) => Verdict::Skipped(reason),
        Ok(Finished::Done(Err(err))) => Verdict::Failed(err.to_string()),
        Ok(Finished::TimedOut(limit)) => Verdict::Failed(format!("timed out after {:?}", limit)),
        Err(join) => Verdict::Failed(join_failure(join)),
    };
    if let Verdict::Failed(ref message) = operation_verdict {
        tracing::error!(
            service = test.service(),
            operation = test.operation(),
            %message,
            "operation failed"
        );
    }
    results.push(result(None, operation_verdict));
}

/// Body of a generated test binary: load settings, initialize logging, run
/// the tests registered by `register`, print the report and return the
/// process exit code.
pub fn run_main<F>(register: F) -> i32
where
    F: FnOnce(&mut Runner),
{
    let settings = match HarnessSettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {}", err);
            return EXIT_ABORTED;
        }
    };
    init_logging(&settings.log_filter);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: cannot start runtime: {}", err);
            return EXIT_ABORTED;
        }
    };

    let controller = Arc::new(TestController::from_settings(settings));
    let mut runner = Runner::new(controller);
    register(&mut runner);

    match runtime.block_on(runner.run()) {
        Ok(report) => {
            print!("{}", report);
            report.exit_code()
        }
        Err(RunAbort::Teardown { report, fault }) => {
            print!("{}", report);
            eprintln!("error: session teardown failed: {}", fault);
            EXIT_ABORTED
        }
        Err(abort) => {
            eprintln!("error: {}", abort);
            EXIT_ABORTED
        }
    }
}

/// Generate `fn main()` for a `harness = false` test target.
///
/// Each argument is a function taking `&mut Runner` that registers the
/// operation tests of one service.
///
/// ```ignore
/// fn limits(runner: &mut autotest_harness::Runner) {
///     runner.add(list_limits());
/// }
///
/// autotest_harness::autotest_main!(limits);
/// ```
#[macro_export]
macro_rules! autotest_main {
    ($($register:path),+ $(,)?) => {
        fn main() {
            let code = $crate::run_main(|runner: &mut $crate::Runner| {
                $( $register(runner); )+
            });
            ::std::process::exit(code);
        }
    };
}
