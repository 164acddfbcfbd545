//! Error taxonomy shared by the controller and cloud adapters.
//!
//! [`FailureKind`] is the classification the allocation state machine and
//! cloud adapter actually switch on (§7/§7a); [`SharedError`] is the concrete
//! `thiserror` enum produced at the point of origin. `classify` maps one to
//! the other so call sites never have to match on concrete variants.

use thiserror::Error;

/// The five error kinds the allocation state machine and reconcilers branch
/// on. Concrete errors (`SharedError`, `ControllerError`, agent kernel
/// errors) each classify into one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry with the default exponential back-off: store conflicts,
    /// rate-limited cloud calls, HTTP 5xx, transient network errors.
    Transient,
    /// Node agent absent, unreachable, or not ready. Allocation moves to
    /// `NodeError` and is relocated to a different node.
    NodeUnreachable,
    /// Cloud provider returned a 4xx with a reason (address gone, quota
    /// exceeded). Allocation moves to `Error` and enters the long retry loop.
    AllocationBusiness,
    /// Address not in any allowed pool, unknown provider, unknown allocation
    /// type. Moves to `Error`, then `Failed` once retries exhaust.
    DataInvariantViolated,
    /// Unrecoverable: observer deadline breach, missing required
    /// environment. The owning process exits.
    Fatal,
}

#[derive(Error, Debug)]
pub enum SharedError {
    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error("watcher error: {0}")]
    Watcher(#[from] kube::runtime::watcher::Error),

    #[error("finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<SharedError>>),

    #[error("cloud adapter HTTP error: {0}")]
    CloudHttp(#[from] reqwest::Error),

    #[error("cloud provider rejected the request ({status}): {message}")]
    CloudRejected { status: u16, message: String },

    #[error("node agent RPC error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("data invariant violated: {0}")]
    DataInvariantViolated(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SharedError {
    /// Maps a concrete error onto the kind the state machine switches on.
    /// §7a: cloud 5xx/network => Transient, cloud 4xx => AllocationBusiness,
    /// RPC failures => NodeUnreachable, explicit invariant breaks =>
    /// DataInvariantViolated.
    pub fn classify(&self) -> FailureKind {
        match self {
            SharedError::Kube(e) => classify_kube_error(e),
            SharedError::Watcher(_) => FailureKind::Transient,
            SharedError::Finalizer(_) => FailureKind::Transient,
            SharedError::CloudHttp(e) => {
                if e.is_timeout() || e.is_connect() {
                    FailureKind::Transient
                } else if let Some(status) = e.status() {
                    classify_http_status(status.as_u16())
                } else {
                    FailureKind::Transient
                }
            }
            SharedError::CloudRejected { status, .. } => classify_http_status(*status),
            SharedError::Rpc(status) => classify_tonic_status(status),
            SharedError::DataInvariantViolated(_) => FailureKind::DataInvariantViolated,
            SharedError::Other(_) => FailureKind::Transient,
        }
    }
}

fn classify_kube_error(e: &kube::Error) -> FailureKind {
    match e {
        kube::Error::Api(api_err) if api_err.code == 409 => FailureKind::Transient,
        kube::Error::Api(api_err) if (500..600).contains(&api_err.code) => FailureKind::Transient,
        kube::Error::Api(_) => FailureKind::DataInvariantViolated,
        _ => FailureKind::Transient,
    }
}

fn classify_http_status(status: u16) -> FailureKind {
    if (500..600).contains(&status) || status == 429 {
        FailureKind::Transient
    } else {
        FailureKind::AllocationBusiness
    }
}

fn classify_tonic_status(status: &tonic::Status) -> FailureKind {
    use tonic::Code;
    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Aborted => FailureKind::NodeUnreachable,
        Code::ResourceExhausted | Code::Unknown => FailureKind::Transient,
        _ => FailureKind::NodeUnreachable,
    }
}

pub type Result<T, E = SharedError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_rejected_4xx_is_allocation_business() {
        let e = SharedError::CloudRejected {
            status: 404,
            message: "address not found".into(),
        };
        assert_eq!(e.classify(), FailureKind::AllocationBusiness);
    }

    #[test]
    fn cloud_rejected_5xx_is_transient() {
        let e = SharedError::CloudRejected {
            status: 503,
            message: "upstream unavailable".into(),
        };
        assert_eq!(e.classify(), FailureKind::Transient);
    }

    #[test]
    fn data_invariant_violation_classifies_directly() {
        let e = SharedError::DataInvariantViolated("unknown provider".into());
        assert_eq!(e.classify(), FailureKind::DataInvariantViolated);
    }

    #[test]
    fn rpc_unavailable_is_node_unreachable() {
        let e = SharedError::Rpc(tonic::Status::unavailable("dial failed"));
        assert_eq!(e.classify(), FailureKind::NodeUnreachable);
    }
}
