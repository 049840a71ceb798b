use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::cluster::balancer::BalancerError;
use crate::cluster::store::StoreError;
use crate::db::match_repository::RepositoryError;
use crate::models::common::ApiResponse;

/// Every way a match command, submission or query can be refused.
#[derive(Debug, Error)]
pub enum LiveMatchError {
    #[error("match {match_id} is not owned by this instance")]
    NotOwned { match_id: Uuid, owner: Option<String> },
    #[error("lease for match {match_id} was lost")]
    LeaseLost { match_id: Uuid },
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("match {0} has finished")]
    MatchTerminal(Uuid),
    #[error("match {0} not found")]
    MatchNotFound(Uuid),
    #[error("persistence failed: {0}")]
    Durability(#[from] RepositoryError),
    #[error("coordination failed: {0}")]
    Coordination(#[from] StoreError),
    #[error("no healthy instance is available")]
    NoHealthyInstance,
}

impl LiveMatchError {
    /// Stable machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            LiveMatchError::NotOwned { .. } | LiveMatchError::LeaseLost { .. } => {
                "match_not_owned_by_this_instance"
            }
            LiveMatchError::InvalidEvent(_) => "invalid_event",
            LiveMatchError::InvalidTransition(_) => "invalid_transition",
            LiveMatchError::MatchTerminal(_) => "match_terminal",
            LiveMatchError::MatchNotFound(_) => "match_not_found",
            LiveMatchError::Durability(_) => "durability_failure",
            LiveMatchError::Coordination(_) => "coordination_failure",
            LiveMatchError::NoHealthyInstance => "no_healthy_instance",
        }
    }

    /// Failures on our side, as opposed to requests that were refused.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            LiveMatchError::Durability(_) | LiveMatchError::Coordination(_) | LiveMatchError::NoHealthyInstance
        )
    }

    pub fn owner_hint(&self) -> Option<&str> {
        match self {
            LiveMatchError::NotOwned { owner, .. } => owner.as_deref(),
            _ => None,
        }
    }
}

impl From<BalancerError> for LiveMatchError {
    fn from(error: BalancerError) -> Self {
        match error {
            BalancerError::Store(e) => LiveMatchError::Coordination(e),
            BalancerError::NoHealthyInstance => LiveMatchError::NoHealthyInstance,
            BalancerError::InvalidThresholds(message) => LiveMatchError::InvalidEvent(message),
        }
    }
}

/// Structured detail returned with every error response
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_instance_id: Option<String>,
}

impl ResponseError for LiveMatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            LiveMatchError::NotOwned { .. } | LiveMatchError::LeaseLost { .. } => StatusCode::CONFLICT,
            LiveMatchError::InvalidEvent(_)
            | LiveMatchError::InvalidTransition(_)
            | LiveMatchError::MatchTerminal(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LiveMatchError::MatchNotFound(_) => StatusCode::NOT_FOUND,
            LiveMatchError::Durability(_)
            | LiveMatchError::Coordination(_)
            | LiveMatchError::NoHealthyInstance => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = ErrorDetail {
            reason: self.reason(),
            owner_instance_id: self.owner_hint().map(str::to_string),
        };
        HttpResponse::build(self.status_code()).json(ApiResponse::failure(self.to_string(), self.reason(), detail))
    }
}
