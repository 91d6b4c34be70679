//! The alert engine (spec.md §4.4): rule evaluation, dispatch to
//! notification channels, and the read-side CRUD/summary services the
//! HTTP façade calls.

pub mod adapters;
pub mod channel_service;
pub mod conditions;
pub mod dispatcher;
pub mod evaluator;
pub mod rule_service;
pub mod service;
pub mod summary;

pub use channel_service::ChannelService;
pub use dispatcher::{AlertPayload, Dispatcher, TestResult};
pub use evaluator::Evaluator;
pub use rule_service::RuleService;
pub use service::AlertService;
pub use summary::{DriftSummaryService, SecuritySummaryService};
