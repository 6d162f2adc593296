//! Shared fixtures: a fake SDK for a small "widgets" service and an
//! in-memory testing service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autotest_harness::{
    BaseClient, ClientError, ConfigurationProvider, DispatchFault, HarnessSettings,
    ListOperation, OciRequest, PaginatedRequest, PaginatedResponse, PolymorphicDecoder,
    PolymorphicUnmarshalSpec, RequestMetadata, RetryPolicy, Runner, ServiceClient, SessionFault,
    SessionHandle, StaticConfigurationProvider, TestController, TestingConfig, TestingService,
    UnaryOperation,
};
use autotest_wire::ValidationSubmission;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ──────────────────────────────────────────────
// Fake SDK
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Widget {
    pub id: String,
    pub lifecycle_state: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetWidgetRequest {
    pub widget_id: String,
    #[serde(skip)]
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetWidgetResponse {
    pub widget: Widget,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListWidgetsRequest {
    pub compartment_id: String,
    pub page: Option<String>,
    pub limit: Option<u32>,
    #[serde(skip)]
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListWidgetsResponse {
    pub items: Vec<Widget>,
    pub opc_next_page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNewDatabaseDetails {
    pub db_name: String,
    pub admin_password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseFromBackupDetails {
    pub backup_id: String,
}

/// The `CreateDatabaseBase` hierarchy, discriminated by `source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source")]
pub enum CreateDatabaseBase {
    #[serde(rename = "NONE")]
    New(CreateNewDatabaseDetails),
    #[serde(rename = "DB_BACKUP")]
    FromBackup(CreateDatabaseFromBackupDetails),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDatabaseRequest {
    pub opc_retry_token: Option<String>,
    #[serde(skip_deserializing)]
    pub create_new_database_details: Option<CreateDatabaseBase>,
    #[serde(skip)]
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDatabaseResponse {
    pub db_name: String,
    pub source: String,
}

macro_rules! oci_request {
    ($($ty:ty),+) => {
        $(
            impl OciRequest for $ty {
                fn request_metadata(&self) -> &RequestMetadata {
                    &self.metadata
                }
                fn request_metadata_mut(&mut self) -> &mut RequestMetadata {
                    &mut self.metadata
                }
            }
        )+
    };
}

oci_request!(GetWidgetRequest, ListWidgetsRequest, CreateDatabaseRequest);

impl PaginatedRequest for ListWidgetsRequest {
    fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }
    fn set_page(&mut self, page: Option<String>) {
        self.page = page;
    }
}

impl PaginatedResponse for ListWidgetsResponse {
    fn next_page(&self) -> Option<&str> {
        self.opc_next_page.as_deref()
    }
}

/// One call that reached the fake cloud.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub operation: &'static str,
    pub host: String,
    pub page: Option<String>,
    pub retry_policy: Option<Arc<RetryPolicy>>,
    pub details: Option<CreateDatabaseBase>,
}

/// Backing store behind every fake client.
#[derive(Debug, Default)]
pub struct FakeCloud {
    pub widgets: Mutex<HashMap<String, Widget>>,
    pub pages: Mutex<HashMap<Option<String>, ListWidgetsResponse>>,
    pub dispatched: Mutex<Vec<Dispatched>>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeCloud::default())
    }

    pub fn with_widget(self: Arc<Self>, id: &str, state: &str) -> Arc<Self> {
        self.widgets.lock().unwrap().insert(
            id.to_string(),
            Widget {
                id: id.to_string(),
                lifecycle_state: state.to_string(),
            },
        );
        self
    }

    /// The page answered for cursor `token`; `None` is the first page.
    pub fn with_page(self: Arc<Self>, token: Option<&str>, ids: &[&str], next: Option<&str>) -> Arc<Self> {
        let page = ListWidgetsResponse {
            items: ids
                .iter()
                .map(|id| Widget {
                    id: id.to_string(),
                    lifecycle_state: "ACTIVE".into(),
                })
                .collect(),
            opc_next_page: next.map(str::to_string),
        };
        self.pages
            .lock()
            .unwrap()
            .insert(token.map(str::to_string), page);
        self
    }

    pub fn dispatched(&self) -> Vec<Dispatched> {
        self.dispatched.lock().unwrap().clone()
    }

    fn log(&self, entry: Dispatched) {
        self.dispatched.lock().unwrap().push(entry);
    }
}

#[derive(Debug)]
pub struct WidgetClient {
    pub base: BaseClient,
    cloud: Arc<FakeCloud>,
}

impl WidgetClient {
    fn entry(&self, operation: &'static str, metadata: &RequestMetadata) -> Dispatched {
        Dispatched {
            operation,
            host: self.base.host().to_string(),
            page: None,
            retry_policy: metadata.retry_policy.clone(),
            details: None,
        }
    }

    pub async fn get_widget(&self, request: GetWidgetRequest) -> Result<GetWidgetResponse, DispatchFault> {
        self.cloud.log(self.entry("GetWidget", &request.metadata));
        match request.widget_id.as_str() {
            "explode" => panic!("widget {} exploded", request.widget_id),
            "hang" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            _ => {}
        }
        let found = self.cloud.widgets.lock().unwrap().get(&request.widget_id).cloned();
        match found {
            Some(widget) => Ok(GetWidgetResponse { widget }),
            None => Err(DispatchFault::Service {
                status: 404,
                code: "NotAuthorizedOrNotFound".into(),
                message: format!("widget {} not found", request.widget_id),
                opc_request_id: Some("opc-1".into()),
            }),
        }
    }

    pub async fn list_widgets(&self, request: ListWidgetsRequest) -> Result<ListWidgetsResponse, DispatchFault> {
        let mut entry = self.entry("ListWidgets", &request.metadata);
        entry.page = request.page.clone();
        self.cloud.log(entry);
        let page = self.cloud.pages.lock().unwrap().get(&request.page).cloned();
        page.ok_or_else(|| DispatchFault::Transport(format!("no page {:?}", request.page)))
    }

    pub async fn create_database(
        &self,
        request: CreateDatabaseRequest,
    ) -> Result<CreateDatabaseResponse, DispatchFault> {
        let mut entry = self.entry("CreateDatabase", &request.metadata);
        entry.details = request.create_new_database_details.clone();
        self.cloud.log(entry);
        match request.create_new_database_details {
            Some(CreateDatabaseBase::New(details)) => Ok(CreateDatabaseResponse {
                db_name: details.db_name,
                source: "NONE".into(),
            }),
            Some(CreateDatabaseBase::FromBackup(_)) => Ok(CreateDatabaseResponse {
                db_name: String::new(),
                source: "DB_BACKUP".into(),
            }),
            None => Err(DispatchFault::Service {
                status: 400,
                code: "InvalidParameter".into(),
                message: "details are required".into(),
                opc_request_id: None,
            }),
        }
    }
}

pub fn widget_factory(
    cloud: Arc<FakeCloud>,
) -> impl Fn(&dyn ConfigurationProvider, &TestingConfig) -> Result<WidgetClient, ClientError>
       + Send
       + Sync
       + 'static {
    move |_provider: &dyn ConfigurationProvider, config: &TestingConfig| {
        let mut base = BaseClient::for_service("widgets");
        base.configure(config);
        Ok(WidgetClient {
            base,
            cloud: cloud.clone(),
        })
    }
}

pub fn get_widget_op(
    cloud: Arc<FakeCloud>,
) -> UnaryOperation<WidgetClient, GetWidgetRequest, GetWidgetResponse> {
    UnaryOperation::new(
        "widgets",
        "WidgetClient",
        "GetWidget",
        widget_factory(cloud),
        |client: Arc<WidgetClient>, request: GetWidgetRequest| async move {
            client.get_widget(request).await
        },
    )
}

pub fn list_widgets_op(
    cloud: Arc<FakeCloud>,
) -> ListOperation<WidgetClient, ListWidgetsRequest, ListWidgetsResponse> {
    ListOperation::new(
        "widgets",
        "WidgetClient",
        "ListWidgets",
        widget_factory(cloud),
        |client: Arc<WidgetClient>, request: ListWidgetsRequest| async move {
            client.list_widgets(request).await
        },
    )
}

pub fn create_database_spec() -> PolymorphicUnmarshalSpec<CreateDatabaseRequest> {
    PolymorphicUnmarshalSpec::new().base(
        "CreateNewDatabaseDetails",
        PolymorphicDecoder::new("CreateDatabaseBase", "source")
            .variant("NONE", CreateDatabaseBase::New)
            .variant("DB_BACKUP", CreateDatabaseBase::FromBackup),
        |request: &mut CreateDatabaseRequest, details| {
            request.create_new_database_details = Some(details)
        },
    )
}

pub fn create_database_op(
    cloud: Arc<FakeCloud>,
) -> UnaryOperation<WidgetClient, CreateDatabaseRequest, CreateDatabaseResponse> {
    UnaryOperation::new(
        "database",
        "DatabaseClient",
        "CreateDatabase",
        widget_factory(cloud),
        |client: Arc<WidgetClient>, request: CreateDatabaseRequest| async move {
            client.create_database(request).await
        },
    )
    .polymorphic(create_database_spec())
}

// ──────────────────────────────────────────────
// In-memory testing service
// ──────────────────────────────────────────────

type OperationKey = (String, String);

/// A [`TestingService`] answering from fixed tables and recording calls.
#[derive(Debug, Default)]
pub struct ScriptedService {
    config: TestingConfig,
    corpora: HashMap<OperationKey, Value>,
    disabled: Vec<OperationKey>,
    messages: HashMap<String, String>,
    fail_open: bool,
    fail_close: bool,
    failing_enablement: Vec<OperationKey>,
    failing_requests: Vec<OperationKey>,
    validation_delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    submissions: Mutex<Vec<ValidationSubmission>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        ScriptedService {
            config: TestingConfig::for_region("us-phoenix-1"),
            ..ScriptedService::default()
        }
    }

    pub fn config(mut self, config: TestingConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable `(service, operation)` with `corpus` as its request payload.
    pub fn operation(mut self, service: &str, operation: &str, corpus: Value) -> Self {
        self.corpora
            .insert((service.to_string(), operation.to_string()), corpus);
        self
    }

    pub fn disabled(mut self, service: &str, operation: &str) -> Self {
        self.disabled
            .push((service.to_string(), operation.to_string()));
        self
    }

    /// Answer validation of `container_id` with `message`.
    pub fn reject(mut self, container_id: &str, message: &str) -> Self {
        self.messages
            .insert(container_id.to_string(), message.to_string());
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Answer the enablement query for `(service, operation)` with a 500.
    pub fn failing_enablement(mut self, service: &str, operation: &str) -> Self {
        self.failing_enablement
            .push((service.to_string(), operation.to_string()));
        self
    }

    /// Answer the corpus fetch for `(service, operation)` with a 500.
    pub fn failing_requests(mut self, service: &str, operation: &str) -> Self {
        self.failing_requests
            .push((service.to_string(), operation.to_string()));
        self
    }

    /// Sleep for `delay` before recording each validation.
    pub fn slow_validation(mut self, delay: Duration) -> Self {
        self.validation_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<ValidationSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission(&self, container_id: &str) -> ValidationSubmission {
        self.submissions()
            .into_iter()
            .find(|s| s.container_id == container_id)
            .unwrap_or_else(|| panic!("no submission for {}", container_id))
    }

    fn note(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TestingService for ScriptedService {
    async fn open_session(&self, run_id: &str) -> Result<SessionHandle, SessionFault> {
        self.note(format!("startSession {}", run_id));
        if self.fail_open {
            return Err(SessionFault::Transport {
                endpoint: "startSession".into(),
                message: "connection refused".into(),
            });
        }
        Ok(SessionHandle {
            session_id: "scripted-1".into(),
            base_url: "memory://scripted".into(),
            token: None,
            config: self.config.clone(),
        })
    }

    async fn close_session(&self, session: &SessionHandle) -> Result<(), SessionFault> {
        self.note(format!("endSession {}", session.session_id));
        if self.fail_close {
            return Err(SessionFault::Status {
                endpoint: "endSession".into(),
                status: 503,
            });
        }
        Ok(())
    }

    async fn is_api_enabled(
        &self,
        _session: &SessionHandle,
        service: &str,
        operation: &str,
    ) -> Result<bool, SessionFault> {
        self.note(format!("isApiEnabled {}/{}", service, operation));
        let key = (service.to_string(), operation.to_string());
        if self.failing_enablement.contains(&key) {
            return Err(SessionFault::Status {
                endpoint: "isApiEnabled".into(),
                status: 500,
            });
        }
        Ok(!self.disabled.contains(&key) && self.corpora.contains_key(&key))
    }

    async fn get_requests(
        &self,
        _session: &SessionHandle,
        service: &str,
        operation: &str,
    ) -> Result<Vec<u8>, SessionFault> {
        self.note(format!("request {}/{}", service, operation));
        let key = (service.to_string(), operation.to_string());
        if self.failing_requests.contains(&key) {
            return Err(SessionFault::Status {
                endpoint: "request".into(),
                status: 500,
            });
        }
        let corpus = self
            .corpora
            .get(&key)
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        Ok(corpus.to_string().into_bytes())
    }

    async fn validate_result(
        &self,
        _session: &SessionHandle,
        submission: &ValidationSubmission,
    ) -> Result<String, SessionFault> {
        if let Some(delay) = self.validation_delay {
            tokio::time::sleep(delay).await;
        }
        self.note(format!("response {}", submission.container_id));
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(self
            .messages
            .get(&submission.container_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ──────────────────────────────────────────────
// Wiring
// ──────────────────────────────────────────────

pub fn controller(service: Arc<ScriptedService>, settings: HarnessSettings) -> Arc<TestController> {
    Arc::new(TestController::new(
        service,
        Arc::new(StaticConfigurationProvider {
            tenancy: "ocid1.tenancy.oc1..test".into(),
            user: "ocid1.user.oc1..test".into(),
            fingerprint: "00:11:22".into(),
            region: "us-phoenix-1".into(),
        }),
        settings,
    ))
}

pub fn runner(service: Arc<ScriptedService>, settings: HarnessSettings) -> Runner {
    Runner::new(controller(service, settings))
}
