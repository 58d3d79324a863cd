mod dispatcher;
mod registry;
pub mod websocket;

pub use dispatcher::{BroadcastDispatcher, DispatchReport};
pub use registry::{RegistrationResult, SubscriberHandle, SubscriberId, SubscriptionRegistry};
pub use websocket::{handle_websocket, SyncState};
