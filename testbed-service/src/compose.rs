// Compose Command
// Builds invocations of the multi-service runtime (docker-compose / docker compose)

use std::path::{Path, PathBuf};

use crate::config::{ComposeConfig, ComposeProgram};
use crate::executor::Invocation;

/// A resolved compose front end bound to a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    program: String,
    /// Leading arguments, e.g. `compose` for the docker plugin
    prefix: Vec<String>,
    file: Option<PathBuf>,
    project: Option<String>,
    working_dir: PathBuf,
}

impl ComposeCommand {
    /// The standalone `docker-compose` binary
    pub fn standalone(working_dir: impl AsRef<Path>) -> Self {
        Self {
            program: "docker-compose".to_string(),
            prefix: Vec::new(),
            file: None,
            project: None,
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    /// The `docker compose` plugin
    pub fn plugin(docker_program: &str, working_dir: impl AsRef<Path>) -> Self {
        Self {
            program: docker_program.to_string(),
            prefix: vec!["compose".to_string()],
            file: None,
            project: None,
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    /// Pick the front end described by the config. `auto` prefers the
    /// standalone binary when it is on PATH.
    pub fn resolve(config: &ComposeConfig, docker_program: &str, working_dir: &Path) -> Self {
        let mut compose = match config.program {
            ComposeProgram::DockerCompose => Self::standalone(working_dir),
            ComposeProgram::Docker => Self::plugin(docker_program, working_dir),
            ComposeProgram::Auto => {
                if which::which("docker-compose").is_ok() {
                    Self::standalone(working_dir)
                } else {
                    Self::plugin(docker_program, working_dir)
                }
            }
        };

        if let Some(file) = &config.file {
            compose = compose.with_file(file.clone());
        }
        if let Some(project) = &config.project {
            compose = compose.with_project(project.clone());
        }
        compose
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Invocation of `<compose> [-f file] [-p project] <args...>` in the workspace
    pub fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut invocation = Invocation::new(self.program.clone())
            .args(self.prefix.iter().cloned())
            .current_dir(&self.working_dir);

        if let Some(file) = &self.file {
            invocation = invocation.arg("-f").arg(file.to_string_lossy().to_string());
        }
        if let Some(project) = &self.project {
            invocation = invocation.arg("-p").arg(project.clone());
        }

        invocation.args(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_invocation() {
        let compose = ComposeCommand::standalone("/srv/testbed");
        let invocation = compose.invocation(["build", "host"]);

        assert_eq!(invocation.command_line(), "docker-compose build host");
        assert_eq!(invocation.working_dir.as_deref(), Some(Path::new("/srv/testbed")));
    }

    #[test]
    fn test_plugin_invocation_with_file_and_project() {
        let compose = ComposeCommand::plugin("docker", "/srv/testbed")
            .with_file("deploy/compose.yaml")
            .with_project("lastoftrust");

        let invocation = compose.invocation(["up", "-d"]);

        assert_eq!(
            invocation.command_line(),
            "docker compose -f deploy/compose.yaml -p lastoftrust up -d"
        );
    }

    #[test]
    fn test_resolve_explicit_program() {
        let config = ComposeConfig {
            program: ComposeProgram::Docker,
            file: None,
            project: Some("tlot".to_string()),
        };

        let compose = ComposeCommand::resolve(&config, "podman", Path::new("/w"));

        assert_eq!(compose.invocation(["ps"]).command_line(), "podman compose -p tlot ps");
    }

    #[test]
    fn test_resolve_standalone_program() {
        let config = ComposeConfig {
            program: ComposeProgram::DockerCompose,
            file: Some(PathBuf::from("deploy/compose.yaml")),
            project: None,
        };

        let compose = ComposeCommand::resolve(&config, "docker", Path::new("/w"));

        assert_eq!(
            compose.invocation(["down"]).command_line(),
            "docker-compose -f deploy/compose.yaml down"
        );
    }
}
