//! Scripted stand-ins for the external tools (unix only).
//!
//! A [`FakeTool`] is rendered as a `/bin/sh` script. It knows the two
//! command lines the orchestrator builds: `--save-dir <dir>` is exposed to
//! the steps as the save directory, and the last argument as the output path.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Stdout(String),
    Stderr(String),
    Sleep(Duration),
    CreateInSaveDir(String),
    CreateOutput,
    RecordArgs(PathBuf),
    RecordPid(PathBuf),
    SpawnChild(PathBuf),
    Hang,
}

/// Builder for a fake tool script.
///
/// # Example
///
/// ```rust,ignore
/// use segfetch_core::testing::FakeTool;
///
/// let fetcher = FakeTool::new()
///     .stdout("Vid 1280x720 | 50.00%")
///     .create_in_save_dir("raw_video.ts")
///     .write(dir.path(), "fetcher")?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct FakeTool {
    steps: Vec<Step>,
    exit_code: i32,
}

impl FakeTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print a line on stdout.
    pub fn stdout(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::Stdout(line.into()));
        self
    }

    /// Print a line on stderr.
    pub fn stderr(mut self, line: impl Into<String>) -> Self {
        self.steps.push(Step::Stderr(line.into()));
        self
    }

    pub fn sleep(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    /// Create a file in the directory given after `--save-dir`.
    pub fn create_in_save_dir(mut self, name: impl Into<String>) -> Self {
        self.steps.push(Step::CreateInSaveDir(name.into()));
        self
    }

    /// Create the file named by the last argument.
    pub fn create_output(mut self) -> Self {
        self.steps.push(Step::CreateOutput);
        self
    }

    /// Append the arguments, one per line, to `path`.
    pub fn record_args(mut self, path: impl Into<PathBuf>) -> Self {
        self.steps.push(Step::RecordArgs(path.into()));
        self
    }

    /// Write the script's process id to `path`.
    pub fn record_pid(mut self, path: impl Into<PathBuf>) -> Self {
        self.steps.push(Step::RecordPid(path.into()));
        self
    }

    /// Start a long-running background child and write its process id to `path`.
    pub fn spawn_child(mut self, path: impl Into<PathBuf>) -> Self {
        self.steps.push(Step::SpawnChild(path.into()));
        self
    }

    /// Never exit on its own.
    pub fn hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Renders the script text.
    pub fn script(&self) -> String {
        let mut script = String::from(
            "#!/bin/sh\n\
             SAVE_DIR=.\n\
             LAST=\n\
             prev=\n\
             for arg in \"$@\"; do\n\
             \x20 if [ \"$prev\" = \"--save-dir\" ]; then SAVE_DIR=\"$arg\"; fi\n\
             \x20 prev=\"$arg\"\n\
             \x20 LAST=\"$arg\"\n\
             done\n",
        );
        for step in &self.steps {
            let line = match step {
                Step::Stdout(text) => format!("printf '%s\\n' {}", quote(text)),
                Step::Stderr(text) => format!("printf '%s\\n' {} >&2", quote(text)),
                Step::Sleep(duration) => format!("sleep {:.3}", duration.as_secs_f64()),
                Step::CreateInSaveDir(name) => {
                    format!("printf 'media' > \"$SAVE_DIR\"/{}", quote(name))
                }
                Step::CreateOutput => "printf 'media' > \"$LAST\"".to_string(),
                Step::RecordArgs(path) => format!(
                    "for arg in \"$@\"; do printf '%s\\n' \"$arg\"; done >> {}",
                    quote(&path.to_string_lossy())
                ),
                Step::RecordPid(path) => {
                    format!("echo $$ > {}", quote(&path.to_string_lossy()))
                }
                Step::SpawnChild(path) => {
                    format!("sleep 3600 &\necho $! > {}", quote(&path.to_string_lossy()))
                }
                Step::Hang => "exec sleep 3600".to_string(),
            };
            script.push_str(&line);
            script.push('\n');
        }
        script.push_str(&format!("exit {}\n", self.exit_code));
        script
    }

    /// Writes the script as an executable file `dir/name` and returns its path.
    pub fn write(&self, dir: &Path, name: &str) -> io::Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, self.script())?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }
}

/// Single-quotes `text` for the shell.
fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("50%"), "'50%'");
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_script_steps() {
        let script = FakeTool::new()
            .stdout("50%")
            .create_in_save_dir("raw_video.ts")
            .exit_code(3)
            .script();
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("printf '%s\\n' '50%'\n"));
        assert!(script.contains("> \"$SAVE_DIR\"/'raw_video.ts'\n"));
        assert!(script.ends_with("exit 3\n"));
    }

    #[test]
    fn test_spawn_child_step() {
        let script = FakeTool::new().spawn_child("/tmp/child").hang().script();
        assert!(script.contains("sleep 3600 &\necho $! > '/tmp/child'\nexec sleep 3600\n"));
    }

    #[tokio::test]
    async fn test_written_script_runs() {
        let temp = tempfile::TempDir::new().unwrap();
        let save_dir = temp.path().join("save");
        std::fs::create_dir_all(&save_dir).unwrap();
        let tool = FakeTool::new()
            .stdout("hello")
            .create_in_save_dir("raw_video.ts")
            .write(temp.path(), "tool")
            .unwrap();

        let status = tokio::process::Command::new(&tool)
            .arg("--save-dir")
            .arg(&save_dir)
            .stdout(std::process::Stdio::null())
            .status()
            .await
            .unwrap();

        assert!(status.success());
        assert!(save_dir.join("raw_video.ts").is_file());
    }
}
