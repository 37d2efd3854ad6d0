use serde::{Deserialize, Serialize};

/// State of an ask/tell session, also the status code the remote solver
/// reports for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Status {
    #[default]
    Pending,
    Running,
    ValidPoint,
    InvalidPoint,
    RuntimeError,
    SolutionReached,
}

impl Status {
    /// Whether a `run` loop must stop on this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::RuntimeError | Self::SolutionReached)
    }

    pub fn code(self) -> i8 {
        match self {
            Self::Pending => -1,
            Self::ValidPoint => 0,
            Self::InvalidPoint => 1,
            Self::RuntimeError => 2,
            Self::SolutionReached => 3,
            Self::Running => 4,
        }
    }
}

impl From<Status> for i8 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl TryFrom<i8> for Status {
    type Error = String;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(Self::Pending),
            0 => Ok(Self::ValidPoint),
            1 => Ok(Self::InvalidPoint),
            2 => Ok(Self::RuntimeError),
            3 => Ok(Self::SolutionReached),
            4 => Ok(Self::Running),
            other => Err(format!("unknown optimization status code {other}")),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ValidPoint => "valid point",
            Self::InvalidPoint => "invalid point",
            Self::RuntimeError => "runtime error",
            Self::SolutionReached => "solution reached",
        };
        f.write_str(label)
    }
}
