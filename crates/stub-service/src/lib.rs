//! autotest-stub-service: a local stand-in for the SDK testing service.
//!
//! Answers the session, enablement, request and validation endpoints from a
//! [`StubCorpus`] and records every validation it receives, so engine tests
//! can run end to end over real HTTP.

pub mod corpus;
pub mod server;

pub use corpus::{CorpusError, Expectation, ExpectedFault, OperationCorpus, StubCorpus, StubRecord};
pub use server::{router, serve, spawn, RecordedSubmission, RunningStub, StubState, SERVICE_PATH};
