use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid balance: {0:?}")]
    InvalidBalance(String),

    #[error("Invalid channel status: {0:?}")]
    InvalidChannelStatus(String),

    #[error("Invalid address kind: {0:?}")]
    InvalidAddressKind(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
