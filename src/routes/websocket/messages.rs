use serde::Deserialize;
use uuid::Uuid;

use crate::services::broadcaster::ViewerRole;

/// Query parameters of the live socket
#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    #[serde(default)]
    pub role: ViewerRole,
}

/// A relayed bus payload or locally generated message, sent as-is
#[derive(actix::Message)]
#[rtype(result = "()")]
pub struct Outbound(pub String);

/// The viewer is registered with the broadcaster
#[derive(actix::Message)]
#[rtype(result = "()")]
pub struct Joined {
    pub connection_id: Uuid,
}

/// Close the socket; the viewer was dropped or its feed ended
#[derive(actix::Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub reason: &'static str,
}
