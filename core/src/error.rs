use crate::orders::OrderStatus;
use crate::types::{OrderId, Points, ProductId, UserId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    #[error("unknown order {0}")]
    UnknownOrder(OrderId),

    #[error("unknown product {0}")]
    UnknownProduct(ProductId),

    #[error("order {id} is {status}, expected pending")]
    NotPending { id: OrderId, status: OrderStatus },

    #[error("order {id} is {status}, expected approving")]
    NotApproving { id: OrderId, status: OrderStatus },

    #[error("insufficient points: need {required}, have {available}")]
    InsufficientPoints { required: Points, available: Points },

    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("user {0} is not authorized for admin operations")]
    NotAuthorized(UserId),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
