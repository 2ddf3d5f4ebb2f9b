use depth_calib_core::{AffineSolveError, AnchorId};

fn join_ids(ids: &[AnchorId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors returned by a calibration attempt. All of them are retryable.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("missing anchors: local [{}], remote [{}]", join_ids(.local), join_ids(.remote))]
    MissingAnchors {
        local: Vec<AnchorId>,
        remote: Vec<AnchorId>,
    },
    #[error("invalid anchor coordinates (depth read failed): [{}]", join_ids(.invalid))]
    InvalidAnchors { invalid: Vec<AnchorId> },
    #[error(transparent)]
    Solve(#[from] AffineSolveError),
}
