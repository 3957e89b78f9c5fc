use thiserror::Error;

/// Errors raised during model construction and solving.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unsupported constraint sense {0:?} (expected \"==\", \"<=\" or \">=\")")]
    UnsupportedSense(String),

    #[error("no flow variable for edge ({from}, {to}) at timestep {t}")]
    MissingFlowVariable { from: String, to: String, t: usize },

    #[error("no {kind} variable for {uid}")]
    MissingVariable { kind: &'static str, uid: String },

    #[error("entity {uid}: {reason}")]
    InvalidEntity { uid: String, reason: String },

    #[error("profile for {uid} has {got} values but the horizon has {want} timesteps")]
    ProfileLength { uid: String, got: usize, want: usize },

    #[error("problem is infeasible")]
    Infeasible,

    #[error("problem is unbounded")]
    Unbounded,

    #[error("failed to write LP file: {0}")]
    LpFile(#[from] std::io::Error),
}

impl From<minilp::Error> for ModelError {
    fn from(err: minilp::Error) -> Self {
        match err {
            minilp::Error::Infeasible => ModelError::Infeasible,
            minilp::Error::Unbounded => ModelError::Unbounded,
        }
    }
}

impl ModelError {
    pub fn invalid_entity(uid: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::InvalidEntity {
            uid: uid.into(),
            reason: reason.into(),
        }
    }
}
