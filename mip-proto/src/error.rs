use thiserror::Error;

/// Crate-wide error type.
///
/// Maps to the recovery policy in `spec.md` §7: `Parse`/`Ttl`/`Unresolved`
/// are always recovered locally (drop, maybe log); `Io` bubbles up to the
/// caller, who logs and keeps running; `Protocol` tells the caller to close
/// the offending peer socket without affecting anything else.
#[derive(Debug, Error)]
pub enum MipError {
    #[error("malformed frame or local message: {0}")]
    Parse(String),

    #[error("no route or ARP binding for MIP {0}")]
    Unresolved(u8),

    #[error("TTL exhausted")]
    TtlExhausted,

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation from local peer: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, MipError>;
