//! Subprocess execution utilities.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    own_group: bool,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            own_group: false,
        }
    }

    /// Create a builder from a command line split into words.
    ///
    /// The first word is the program, the rest are leading arguments.
    pub fn from_words(words: &[String]) -> Result<Self> {
        let Some((program, args)) = words.split_first() else {
            bail!("empty command");
        };
        Ok(ProcessBuilder::new(program).args(args))
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set several environment variables; later values win.
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Spawn the process as the leader of a new process group, so the
    /// whole tree can be signalled at once.
    pub fn own_process_group(mut self) -> Self {
        self.own_group = true;
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the explicitly set environment.
    pub fn get_envs(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory, if set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the Command. Stdio is left for the caller to configure.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        #[cfg(unix)]
        if self.own_group {
            cmd.process_group(0);
        }

        cmd
    }

    /// Execute the command and wait for completion.
    pub async fn exec(&self) -> Result<Output> {
        let mut cmd = self.command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        Ok(output)
    }

    /// Execute and require success.
    pub async fn exec_and_check(&self) -> Result<Output> {
        let output = self.exec().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "`{}` failed with exit code {:?}\n{}",
                self.display_command(),
                output.status.code(),
                stderr.trim_end()
            );
        }
        Ok(output)
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Lines of a child's output stream.
///
/// Bytes that are not valid UTF-8 are replaced rather than ending the
/// stream, so the pipe stays drained for the life of the child.
pub struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    pub fn new(reader: R) -> Self {
        OutputLines {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Next line without its `\n` or `\r\n` terminator; `None` at end of
    /// stream.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }

        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Resolve the program of a command line, preferring a project-local
/// `node_modules/.bin` install over PATH.
pub fn resolve_program(project_root: &Path, program: &str) -> PathBuf {
    let local = project_root.join("node_modules").join(".bin").join(program);
    if local.is_file() {
        return local;
    }

    find_executable(program).unwrap_or_else(|| PathBuf::from(program))
}

/// Resolve a configured command line against the project.
pub fn resolve_command(project_root: &Path, words: &[String]) -> Result<ProcessBuilder> {
    let builder = ProcessBuilder::from_words(words)?;
    let program = resolve_program(project_root, &builder.get_program().to_string_lossy());
    Ok(ProcessBuilder::new(program).args(builder.get_args()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_builder() {
        let output = ProcessBuilder::new("echo").arg("hello").exec().await.unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_and_check_reports_stderr() {
        let err = ProcessBuilder::new("sh")
            .args(["-c", "echo broken >&2; exit 2"])
            .exec_and_check()
            .await
            .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("exit code Some(2)"));
        assert!(message.contains("broken"));
    }

    #[tokio::test]
    async fn test_output_lines_survive_invalid_utf8() {
        let input: &[u8] = b"before\r\n\xff\xfe\n\nafter";
        let mut lines = OutputLines::new(input);

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("before"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("\u{fffd}\u{fffd}"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("after"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("esbuild").args(["src/index.ts", "--bundle"]);

        assert_eq!(pb.display_command(), "esbuild src/index.ts --bundle");
    }

    #[test]
    fn test_from_words() {
        let words = vec!["vite".to_string(), "build".to_string()];
        let pb = ProcessBuilder::from_words(&words).unwrap();
        assert_eq!(pb.get_program(), Path::new("vite"));
        assert_eq!(pb.get_args(), ["build"]);

        assert!(ProcessBuilder::from_words(&[]).is_err());
    }
}
