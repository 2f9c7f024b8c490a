use thiserror::Error;

///Capture-level failures. These are the only errors that abort a build.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture could not be resolved: {0}")]
    Unresolved(String),
    #[error("Atom stream unavailable: {0}")]
    AtomsUnavailable(String),
}

///Rejection of a single atom by the state mutator. Recorded per atom as an
/// aborted behavior; the build continues.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Unknown {kind} handle {handle:#x}")]
    UnknownHandle { kind: &'static str, handle: u64 },
    #[error("Unsupported call: {0}")]
    Unsupported(&'static str),
    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Graph build was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use crate::{BuildError, CaptureError, MutationError};

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(CaptureError: Send, Sync);
        assert_impl_all!(MutationError: Send, Sync);
        assert_impl_all!(BuildError: Send, Sync);
    }
}
