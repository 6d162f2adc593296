//! autotest-harness: the engine behind generated SDK regression tests.
//!
//! A run opens one session with the external testing service
//! ([`TestController`]), then every registered operation test asks whether
//! it is enabled, fetches its request corpus, decodes it into typed
//! [`RequestInfo`] records (routing polymorphic fields through a
//! [`PolymorphicUnmarshalSpec`]), dispatches each record through the SDK
//! (directly, or page by page via [`generate_list_responses`]) and submits
//! the outcome for validation.
//!
//! Generated test files only declare operations; see [`UnaryOperation`],
//! [`ListOperation`] and [`autotest_main!`].

pub mod context;
pub mod controller;
pub mod driver;
pub mod error;
pub mod factory;
pub mod logging;
pub mod pagination;
pub mod polymorphic;
pub mod request_info;
pub mod retry;
pub mod runner;
pub mod sdk;
pub mod service;
pub mod settings;

pub use autotest_wire::TestingConfig;
pub use context::{CancelHandle, OperationContext};
pub use controller::{SessionPhase, TestController};
pub use driver::{
    BoxFuture, CaseOutcome, IssueRouting, ListOperation, OperationOutcome, OperationTest,
    UnaryOperation, Verdict,
};
pub use error::{ClientError, DecodeError, DispatchFault, HarnessError, SessionFault, SettingsError};
pub use factory::{ClientFactory, ClientFactoryRegistry};
pub use logging::init_logging;
pub use pagination::{generate_list_responses, ListResponses};
pub use polymorphic::{PolymorphicDecoder, PolymorphicUnmarshalSpec};
pub use request_info::{
    parse_corpus, unmarshal_polymorphic_request_info, unmarshal_request_info, RequestInfo,
};
pub use retry::{attach_retry_policy, retry_policy_for_tests, RetryAttachment, RetryPolicy};
pub use runner::{run_main, CaseResult, RunAbort, RunReport, Runner};
pub use sdk::{
    BaseClient, ConfigurationProvider, EnvConfigurationProvider, OciRequest, PaginatedRequest,
    PaginatedResponse, RequestMetadata, ServiceClient, StaticConfigurationProvider,
};
pub use service::http::HttpTestingService;
pub use service::{SessionHandle, TestingService};
pub use settings::HarnessSettings;
