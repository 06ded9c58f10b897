// Well-known names and defaults shared across the engine.

/// Replacement text used when a secret is found in log output.
pub const MASK: &str = "***";

/// Secret lines shorter than this are never registered for masking.
pub const DEFAULT_MIN_SECRET_LENGTH: usize = 4;

/// Engine configuration read from the process environment.
pub mod settings {
    pub const MIN_SECRET_LENGTH: &str = "CONVEYOR_MIN_SECRET_LENGTH";
    pub const PRINT_LOG_TO_STDOUT: &str = "CONVEYOR_PRINT_LOG_TO_STDOUT";
    pub const DEBUG: &str = "CONVEYOR_DEBUG";
    pub const PLATFORM: &str = "CONVEYOR_PLATFORM";
    pub const LOG_FILTER: &str = "CONVEYOR_LOG";
}

/// Environment variables CI platforms set for their jobs.
pub mod platform {
    pub mod github {
        pub const NAME: &str = "github";
        pub const DETECT: &str = "GITHUB_ACTIONS";
        pub const WORKSPACE: &str = "GITHUB_WORKSPACE";
    }

    pub mod gitlab {
        pub const NAME: &str = "gitlab";
        pub const DETECT: &str = "GITLAB_CI";
        pub const PROJECT_DIR: &str = "CI_PROJECT_DIR";
    }

    pub mod buildkite {
        pub const NAME: &str = "buildkite";
        pub const DETECT: &str = "BUILDKITE";
        pub const CHECKOUT_PATH: &str = "BUILDKITE_BUILD_CHECKOUT_PATH";
    }

    pub mod local {
        pub const NAME: &str = "local";
    }
}
