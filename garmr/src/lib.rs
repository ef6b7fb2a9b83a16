pub mod codec;
pub mod config;
pub mod creds;
pub mod crypto;
pub mod kdc;
pub mod mk_req;
pub mod msgs;
pub mod testutils;
pub mod time;

#[derive(thiserror::Error, Debug)]
pub enum GarmrError {
    #[error("received empty request packet")]
    EmptyRequest,

    #[error("unrecognized message type {0:#04x}")]
    UnrecognizedMessage(u8),

    #[error("request did not supply a ticket")]
    NoTicketSupplied,

    #[error("no support for key type {0}")]
    UnsupportedKeyType(creds::KeyType),

    #[error("no support for encryption type {0}")]
    UnsupportedEType(creds::EType),

    #[error(transparent)]
    Codec(#[from] codec::Error),

    #[error(transparent)]
    Crypto(#[from] crypto::Error),

    #[error(transparent)]
    Creds(#[from] creds::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = GarmrError> = std::result::Result<T, E>;
