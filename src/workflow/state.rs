use serde::Serialize;

/// Where a session is in the pipeline.
///
/// `NoOp`, `Released`, `Cancelled` and `Failed` are terminal; every path
/// ends with the registry slot released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Admitted,
    IssueLookup,
    Branching,
    Running,
    DiffCheck,
    NoOp,
    Committing,
    Pushing,
    PrCreation,
    Reporting,
    Released,
    Cancelled,
    Failed,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            WorkflowState::Admitted => "admitted",
            WorkflowState::IssueLookup => "issue lookup",
            WorkflowState::Branching => "branching",
            WorkflowState::Running => "running",
            WorkflowState::DiffCheck => "diff check",
            WorkflowState::NoOp => "no-op",
            WorkflowState::Committing => "committing",
            WorkflowState::Pushing => "pushing",
            WorkflowState::PrCreation => "creating PR",
            WorkflowState::Reporting => "reporting",
            WorkflowState::Released => "released",
            WorkflowState::Cancelled => "cancelled",
            WorkflowState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}
