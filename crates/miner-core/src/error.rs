//! Aggregate error for calls that can fail in more than one way.

use thiserror::Error;

use crate::address::InvalidAddressError;
use crate::block::TemplateError;
use crate::provider::SubmitError;
use crate::session::SessionStateError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MinerError {
    #[error(transparent)]
    InvalidAddress(#[from] InvalidAddressError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    SessionState(#[from] SessionStateError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
}
