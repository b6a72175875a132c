use std::fmt;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    AssignmentsParseError,
    VersionConflict,
    RepoIdentityMismatch,
    LockContention,
    WorkspaceLocked,
    NotAGitRepository,
    MissingUser,
    WriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::AssignmentsParseError => "E1002",
            Self::RepoIdentityMismatch => "E1003",
            Self::NotAGitRepository => "E1004",
            Self::MissingUser => "E1005",
            Self::VersionConflict => "E2001",
            Self::LockContention => "E2002",
            Self::WorkspaceLocked => "E2003",
            Self::WriteFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::AssignmentsParseError => "Assignments file parse error",
            Self::RepoIdentityMismatch => "Assignments file belongs to a different repository",
            Self::NotAGitRepository => "Not inside a git repository",
            Self::MissingUser => "User identity required",
            Self::VersionConflict => "Assignments changed concurrently",
            Self::LockContention => "Assignments lock contention",
            Self::WorkspaceLocked => "Workspace locked by another process",
            Self::WriteFailed => "Assignments file write failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in the dibs config.toml and retry."),
            Self::AssignmentsParseError => {
                Some("Inspect the assignments.json file; it is never auto-repaired.")
            }
            Self::RepoIdentityMismatch => {
                Some("The shared path collides with another repository; check repository ids.")
            }
            Self::NotAGitRepository => Some("Run dibs from inside a git checkout."),
            Self::MissingUser => Some("Set --user, DIBS_USER, or USER (interactive only)."),
            Self::VersionConflict => Some("Re-run the command; it re-reads the latest state."),
            Self::LockContention => {
                Some("Retry after the other dibs process releases the assignments lock.")
            }
            Self::WorkspaceLocked => {
                Some("Wait for the running agent, or `dibs unlock --force` if it crashed.")
            }
            Self::WriteFailed => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
