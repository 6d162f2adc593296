//! Per-operation test templates.
//!
//! A generated test declares its operation once, as a [`UnaryOperation`] or
//! a [`ListOperation`], and the template does the rest: enablement check,
//! client construction, corpus fetch and decode, then one sub-case per
//! record (attach retry policy, dispatch, validate).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use autotest_wire::TestingConfig;
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

use crate::context::OperationContext;
use crate::controller::TestController;
use crate::error::{ClientError, DispatchFault, HarnessError, SessionFault};
use crate::factory::{ClientFactory, ClientFactoryRegistry};
use crate::polymorphic::PolymorphicUnmarshalSpec;
use crate::request_info::{
    parse_corpus, unmarshal_polymorphic_request_info, unmarshal_request_info, RequestInfo,
};
use crate::retry::{attach_retry_policy, RetryAttachment};
use crate::sdk::{ConfigurationProvider, OciRequest, PaginatedRequest, PaginatedResponse};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type DispatchFn<C, R, P> =
    Arc<dyn Fn(Arc<C>, R) -> BoxFuture<Result<P, DispatchFault>> + Send + Sync>;

// ──────────────────────────────────────────────
// Results
// ──────────────────────────────────────────────

/// Outcome of one test or sub-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed(String),
    Skipped(String),
}

impl Verdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Failed(_))
    }
}

/// One sub-case, named `request:<index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    pub name: String,
    pub verdict: Verdict,
}

/// What running one operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Skipped(String),
    Cases(Vec<CaseOutcome>),
}

/// Who owns failures of an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueRouting {
    pub tag: String,
    pub email: String,
    pub jira_project: String,
    pub ops_jira_project: String,
}

impl IssueRouting {
    pub fn new(
        tag: impl Into<String>,
        email: impl Into<String>,
        jira_project: impl Into<String>,
        ops_jira_project: impl Into<String>,
    ) -> Self {
        IssueRouting {
            tag: tag.into(),
            email: email.into(),
            jira_project: jira_project.into(),
            ops_jira_project: ops_jira_project.into(),
        }
    }
}

impl fmt::Display for IssueRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tag={} email={} jiraProject={} opsJiraProject={}",
            self.tag, self.email, self.jira_project, self.ops_jira_project
        )
    }
}

/// One operation test, runnable by the [`Runner`](crate::Runner).
#[async_trait]
pub trait OperationTest: Send + Sync {
    fn service(&self) -> &str;

    fn operation(&self) -> &str;

    fn issue_routing(&self) -> Option<&IssueRouting> {
        None
    }

    /// Run every sub-case. Errors raised before sub-cases start (enablement
    /// query, client construction, corpus fetch or decode) fail the whole
    /// operation.
    async fn run(
        &self,
        controller: Arc<TestController>,
        ctx: OperationContext,
    ) -> Result<OperationOutcome, HarnessError>;
}

// ──────────────────────────────────────────────
// Shared declaration
// ──────────────────────────────────────────────

struct Declaration<C, R> {
    service: String,
    client_kind: String,
    operation: String,
    factory: Arc<ClientFactory<C>>,
    polymorphic: Option<PolymorphicUnmarshalSpec<R>>,
    retry: RetryAttachment,
    routing: Option<IssueRouting>,
}

enum Prepared<C, R> {
    Skip(String),
    Run {
        client: Arc<C>,
        requests: Vec<RequestInfo<R>>,
    },
}

impl<C, R> Declaration<C, R>
where
    C: Send + Sync + 'static,
    R: OciRequest,
{
    fn new(service: &str, client_kind: &str, operation: &str, factory: Arc<ClientFactory<C>>) -> Self {
        Declaration {
            service: service.to_string(),
            client_kind: client_kind.to_string(),
            operation: operation.to_string(),
            factory,
            polymorphic: None,
            retry: RetryAttachment::default(),
            routing: None,
        }
    }

    async fn prepare(&self, controller: &TestController) -> Result<Prepared<C, R>, HarnessError> {
        if !controller
            .is_api_enabled(&self.service, &self.operation)
            .await?
        {
            let reason = format!("{} is not enabled by the testing service", self.operation);
            tracing::info!(service = %self.service, operation = %self.operation, "skipped");
            return Ok(Prepared::Skip(reason));
        }

        let factory = self.factory.clone();
        let client = controller
            .create_client_for_operation(
                &self.service,
                &self.client_kind,
                &self.operation,
                |provider, config| factory(provider, config),
            )
            .await?;

        let body = controller
            .get_requests(&self.service, &self.operation)
            .await?;
        let records = parse_corpus(&body)?;
        let requests = match self.polymorphic {
            Some(ref spec) => unmarshal_polymorphic_request_info(&records, spec)?,
            None => unmarshal_request_info(&records)?,
        };
        tracing::info!(
            service = %self.service,
            operation = %self.operation,
            cases = requests.len(),
            "running operation"
        );
        Ok(Prepared::Run {
            client: Arc::new(client),
            requests,
        })
    }

    fn span(&self, case: &str) -> tracing::Span {
        tracing::info_span!("case", service = %self.service, operation = %self.operation, case)
    }
}

fn boxed_dispatch<C, R, P, D, Fut>(dispatch: D) -> DispatchFn<C, R, P>
where
    C: 'static,
    R: 'static,
    P: 'static,
    D: Fn(Arc<C>, R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, DispatchFault>> + Send + 'static,
{
    Arc::new(
        move |client: Arc<C>, request: R| -> BoxFuture<Result<P, DispatchFault>> {
            Box::pin(dispatch(client, request))
        },
    )
}

/// A spawned sub-case. Dropping it aborts the task, so sub-cases never
/// outlive the operation that started them (a per-operation timeout drops
/// the whole `run` future).
struct CaseTask {
    name: String,
    handle: JoinHandle<Verdict>,
}

impl CaseTask {
    fn spawn<F>(name: String, case: F, span: tracing::Span) -> Self
    where
        F: Future<Output = Verdict> + Send + 'static,
    {
        CaseTask {
            handle: tokio::spawn(case.instrument(span)),
            name,
        }
    }
}

impl Drop for CaseTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Await every spawned sub-case, keeping record order.
async fn run_cases(cases: Vec<CaseTask>) -> Vec<CaseOutcome> {
    let mut outcomes = Vec::with_capacity(cases.len());
    for mut case in cases {
        let verdict = match (&mut case.handle).await {
            Ok(verdict) => verdict,
            Err(err) => {
                let message = join_failure(err);
                tracing::error!(case = %case.name, %message, "sub-case aborted");
                Verdict::Failed(message)
            }
        };
        outcomes.push(CaseOutcome {
            name: std::mem::take(&mut case.name),
            verdict,
        });
    }
    outcomes
}

/// Failure text for a task that did not return.
pub(crate) fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("task did not complete: {}", err);
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("panicked: {}", message)
}

fn verdict_of(validation: Result<String, SessionFault>) -> Verdict {
    match validation {
        Ok(message) if message.is_empty() => Verdict::Passed,
        Ok(message) => Verdict::Failed(message),
        Err(err) => Verdict::Failed(format!("validation failed: {}", err)),
    }
}

// ──────────────────────────────────────────────
// Unary operations
// ──────────────────────────────────────────────

/// An operation dispatched once per record.
pub struct UnaryOperation<C, R, P> {
    decl: Declaration<C, R>,
    dispatch: DispatchFn<C, R, P>,
}

impl<C, R, P> UnaryOperation<C, R, P>
where
    C: Send + Sync + 'static,
    R: OciRequest,
    P: Serialize + Send + Sync + 'static,
{
    pub fn new<F, D, Fut>(
        service: &str,
        client_kind: &str,
        operation: &str,
        factory: F,
        dispatch: D,
    ) -> Self
    where
        F: Fn(&dyn ConfigurationProvider, &TestingConfig) -> Result<C, ClientError>
            + Send
            + Sync
            + 'static,
        D: Fn(Arc<C>, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, DispatchFault>> + Send + 'static,
    {
        UnaryOperation {
            decl: Declaration::new(service, client_kind, operation, Arc::new(factory)),
            dispatch: boxed_dispatch(dispatch),
        }
    }

    /// Declare the operation with the factory registered for it.
    pub fn from_registry<D, Fut>(
        registry: &ClientFactoryRegistry,
        service: &str,
        client_kind: &str,
        operation: &str,
        dispatch: D,
    ) -> Result<Self, ClientError>
    where
        D: Fn(Arc<C>, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, DispatchFault>> + Send + 'static,
    {
        let factory = registry.factory::<C>(service, operation)?;
        Ok(UnaryOperation {
            decl: Declaration::new(service, client_kind, operation, factory),
            dispatch: boxed_dispatch(dispatch),
        })
    }

    /// Decode requests through `spec`.
    pub fn polymorphic(mut self, spec: PolymorphicUnmarshalSpec<R>) -> Self {
        self.decl.polymorphic = Some(spec);
        self
    }

    pub fn retry(mut self, attachment: RetryAttachment) -> Self {
        self.decl.retry = attachment;
        self
    }

    pub fn routing(mut self, routing: IssueRouting) -> Self {
        self.decl.routing = Some(routing);
        self
    }
}

async fn unary_case<C, R, P>(
    controller: Arc<TestController>,
    ctx: OperationContext,
    client: Arc<C>,
    dispatch: DispatchFn<C, R, P>,
    retry: RetryAttachment,
    container_id: String,
    mut request: R,
) -> Verdict
where
    R: OciRequest,
    P: Serialize + Send + Sync + 'static,
{
    attach_retry_policy(&mut request, controller.retry_policy(retry));
    let submitted = request.clone();
    let (response, fault) = match ctx.guard(dispatch(client, request)).await {
        Ok(response) => (Some(response), None),
        Err(DispatchFault::Cancelled) => return Verdict::Failed(DispatchFault::Cancelled.to_string()),
        Err(fault) => {
            tracing::debug!(container_id = %container_id, %fault, "dispatch fault");
            (None, Some(fault))
        }
    };
    verdict_of(
        controller
            .validate_result(&container_id, &submitted, response.as_ref(), fault.as_ref())
            .await,
    )
}

#[async_trait]
impl<C, R, P> OperationTest for UnaryOperation<C, R, P>
where
    C: Send + Sync + 'static,
    R: OciRequest,
    P: Serialize + Send + Sync + 'static,
{
    fn service(&self) -> &str {
        &self.decl.service
    }

    fn operation(&self) -> &str {
        &self.decl.operation
    }

    fn issue_routing(&self) -> Option<&IssueRouting> {
        self.decl.routing.as_ref()
    }

    async fn run(
        &self,
        controller: Arc<TestController>,
        ctx: OperationContext,
    ) -> Result<OperationOutcome, HarnessError> {
        let (client, requests) = match self.decl.prepare(&controller).await? {
            Prepared::Skip(reason) => return Ok(OperationOutcome::Skipped(reason)),
            Prepared::Run { client, requests } => (client, requests),
        };

        let cases = requests
            .into_iter()
            .enumerate()
            .map(|(index, info)| {
                let name = format!("request:{}", index);
                let case = unary_case(
                    controller.clone(),
                    ctx.clone(),
                    client.clone(),
                    self.dispatch.clone(),
                    self.decl.retry,
                    info.container_id,
                    info.request,
                );
                let span = self.decl.span(&name);
                CaseTask::spawn(name, case, span)
            })
            .collect();
        Ok(OperationOutcome::Cases(run_cases(cases).await))
    }
}

// ──────────────────────────────────────────────
// List operations
// ──────────────────────────────────────────────

/// A paginated operation. Every record is driven to the last page and the
/// collected pages are validated as one aggregate, together with the request
/// as the pagination driver left it (cursor on the last page requested).
pub struct ListOperation<C, R, P> {
    decl: Declaration<C, R>,
    dispatch: DispatchFn<C, R, P>,
}

impl<C, R, P> ListOperation<C, R, P>
where
    C: Send + Sync + 'static,
    R: PaginatedRequest,
    P: PaginatedResponse + Serialize + Send + Sync + 'static,
{
    pub fn new<F, D, Fut>(
        service: &str,
        client_kind: &str,
        operation: &str,
        factory: F,
        dispatch: D,
    ) -> Self
    where
        F: Fn(&dyn ConfigurationProvider, &TestingConfig) -> Result<C, ClientError>
            + Send
            + Sync
            + 'static,
        D: Fn(Arc<C>, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, DispatchFault>> + Send + 'static,
    {
        ListOperation {
            decl: Declaration::new(service, client_kind, operation, Arc::new(factory)),
            dispatch: boxed_dispatch(dispatch),
        }
    }

    pub fn from_registry<D, Fut>(
        registry: &ClientFactoryRegistry,
        service: &str,
        client_kind: &str,
        operation: &str,
        dispatch: D,
    ) -> Result<Self, ClientError>
    where
        D: Fn(Arc<C>, R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, DispatchFault>> + Send + 'static,
    {
        let factory = registry.factory::<C>(service, operation)?;
        Ok(ListOperation {
            decl: Declaration::new(service, client_kind, operation, factory),
            dispatch: boxed_dispatch(dispatch),
        })
    }

    pub fn polymorphic(mut self, spec: PolymorphicUnmarshalSpec<R>) -> Self {
        self.decl.polymorphic = Some(spec);
        self
    }

    pub fn retry(mut self, attachment: RetryAttachment) -> Self {
        self.decl.retry = attachment;
        self
    }

    pub fn routing(mut self, routing: IssueRouting) -> Self {
        self.decl.routing = Some(routing);
        self
    }
}

async fn list_case<C, R, P>(
    controller: Arc<TestController>,
    ctx: OperationContext,
    client: Arc<C>,
    dispatch: DispatchFn<C, R, P>,
    retry: RetryAttachment,
    container_id: String,
    mut request: R,
) -> Verdict
where
    C: Send + Sync + 'static,
    R: PaginatedRequest,
    P: PaginatedResponse + Serialize + Send + Sync + 'static,
{
    attach_retry_policy(&mut request, controller.retry_policy(retry));
    let pages = controller
        .generate_list_responses(&mut request, &ctx, |page_request| {
            dispatch(client.clone(), page_request)
        })
        .await;
    if pages.fault == Some(DispatchFault::Cancelled) {
        return Verdict::Failed(DispatchFault::Cancelled.to_string());
    }
    tracing::debug!(
        container_id = %container_id,
        pages = pages.responses.len(),
        complete = pages.is_complete(),
        "list collected"
    );
    verdict_of(
        controller
            .validate_result(
                &container_id,
                &request,
                Some(&pages.responses),
                pages.fault.as_ref(),
            )
            .await,
    )
}

#[async_trait]
impl<C, R, P> OperationTest for ListOperation<C, R, P>
where
    C: Send + Sync + 'static,
    R: PaginatedRequest,
    P: PaginatedResponse + Serialize + Send + Sync + 'static,
{
    fn service(&self) -> &str {
        &self.decl.service
    }

    fn operation(&self) -> &str {
        &self.decl.operation
    }

    fn issue_routing(&self) -> Option<&IssueRouting> {
        self.decl.routing.as_ref()
    }

    async fn run(
        &self,
        controller: Arc<TestController>,
        ctx: OperationContext,
    ) -> Result<OperationOutcome, HarnessError> {
        let (client, requests) = match self.decl.prepare(&controller).await? {
            Prepared::Skip(reason) => return Ok(OperationOutcome::Skipped(reason)),
            Prepared::Run { client, requests } => (client, requests),
        };

        let cases = requests
            .into_iter()
            .enumerate()
            .map(|(index, info)| {
                let name = format!("request:{}", index);
                let case = list_case(
                    controller.clone(),
                    ctx.clone(),
                    client.clone(),
                    self.dispatch.clone(),
                    self.decl.retry,
                    info.container_id,
                    info.request,
                );
                let span = self.decl.span(&name);
                CaseTask::spawn(name, case, span)
            })
            .collect();
        Ok(OperationOutcome::Cases(run_cases(cases).await))
    }
}
