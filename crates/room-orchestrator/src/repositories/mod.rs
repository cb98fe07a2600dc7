//! Database repositories for the room orchestrator.
//!
//! All queries use parameterized statements. Rooms, registrants, and the
//! webhook ledger are owned by this core; sessions, users, and
//! registrations belong to the course CRUD layer and are read-only here
//! apart from the session's room-related fields.

pub mod accounts;
pub mod presence;
pub mod rooms;
pub mod sessions;
pub mod users;
pub mod webhook_events;

pub use accounts::AccountsRepository;
pub use presence::PresenceRepository;
pub use rooms::{NewRoom, RoomsRepository};
pub use sessions::SessionsRepository;
pub use users::UsersRepository;
pub use webhook_events::WebhookEventsRepository;
