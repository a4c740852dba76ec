use serde::{Deserialize, Serialize};

use crate::application::ApplicationState;
use crate::auth::Role;
use crate::transitions::Action;

pub const EVENT_APPLICATION_TRANSITIONED: &str = "application.transitioned";

/// Emitted after a transition has been persisted. `audit_hash` covers the
/// history entry the transition appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplicationTransitioned {
    pub event_id: String,
    pub event_type: String,
    pub application_number: String,
    pub from_state: ApplicationState,
    pub to_state: ApplicationState,
    pub action: Action,
    pub actor_id: String,
    pub actor_role: Role,
    pub occurred_at_ms: i64,
    pub audit_hash: String,
}
