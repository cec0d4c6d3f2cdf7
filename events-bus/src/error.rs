use thiserror::Error;

use crate::bus::SubscriptionId;

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EventBusError>;
