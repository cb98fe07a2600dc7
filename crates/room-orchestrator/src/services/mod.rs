//! Business logic services for the room orchestrator.
//!
//! Handlers stay thin; the decisions live here:
//!
//! - `account_pool` - reserve a free pooled host account
//! - `room_allocator` - create the provider meeting and persist the room
//! - `lifecycle` - the webhook-driven room state machine
//! - `join_broker` - per-request start-vs-join decision
//! - `presence` - live viewer counts
//! - `provider` - gateway to the external meeting API
//! - `notifier` - injected notification fanout seam

pub mod account_pool;
pub mod join_broker;
pub mod lifecycle;
pub mod notifier;
pub mod presence;
pub mod provider;
pub mod room_allocator;

pub use account_pool::{AccountPoolService, AcquiredAccount};
pub use join_broker::JoinBrokerService;
pub use lifecycle::LifecycleService;
pub use notifier::mock::RecordingNotifier;
pub use notifier::{NotificationSender, NoticeAudience, SessionStartedNotice, TracingNotifier};
pub use presence::PresenceService;
pub use provider::mock::MockProviderClient;
pub use provider::{HttpProviderClient, ProviderClient};
pub use room_allocator::{AllocationPolicy, RoomAllocatorService};
