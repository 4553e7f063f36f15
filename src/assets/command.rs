//! External compressor programs.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Substituted with the input file path in compressor arguments.
pub const INPUT: &str = "{input}";

/// A compressor that runs a program and takes its stdout as the result.
///
/// The input is passed either as an argument (via the [`INPUT`]
/// placeholder) or on stdin.
#[derive(Clone, Debug)]
pub struct CommandCompressor {
    name: String,
    program: String,
    args: Vec<String>,
    stdin: bool,
}

impl CommandCompressor {
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: false,
        }
    }

    /// Feeds the input file on stdin.
    pub fn with_stdin(mut self) -> Self {
        self.stdin = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `csstidy <input> <options>`
    pub fn csstidy(options: &str) -> Self {
        let args = std::iter::once(INPUT).chain(options.split_whitespace());
        Self::new("csstidy", "csstidy", args)
    }

    /// YUI Compressor in CSS mode.
    pub fn yui_css(jar: &Path) -> Self {
        Self::java("yui_css_compressor", jar, ["--type", "css"]).with_stdin()
    }

    /// YUI Compressor in JavaScript mode.
    pub fn yui_js(jar: &Path) -> Self {
        Self::java("yui_js_compressor", jar, ["--type", "js"]).with_stdin()
    }

    /// Google Closure Compiler.
    pub fn closure(jar: &Path, options: &str) -> Self {
        let args = ["--js", INPUT].into_iter().chain(options.split_whitespace());
        Self::java("gclosure_compiler", jar, args)
    }

    fn java<'a>(name: &str, jar: &Path, args: impl IntoIterator<Item = &'a str>) -> Self {
        let mut all = vec!["-jar".to_owned(), jar.display().to_string()];
        all.extend(args.into_iter().map(str::to_owned));
        Self::new(name, "java", all)
    }

    /// Compresses `input` into a temporary file.
    ///
    /// Fails when the program cannot start, exits non-zero, or produces
    /// more bytes than it was given.
    pub async fn compress(&self, input: &Path) -> Result<NamedTempFile> {
        let input_len = tokio::fs::metadata(input).await?.len().max(1);
        let input_arg = input.to_string_lossy();

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(self.args.iter().map(|a| a.replace(INPUT, &input_arg)))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.stdin {
            cmd.stdin(std::fs::File::open(input)?);
        } else {
            cmd.stdin(Stdio::null());
        }
        debug!(compressor = %self.name, command = ?cmd.as_std(), "running compressor");

        let output = cmd.output().await.map_err(|e| self.error(format!("cannot run {}: {e}", self.program)))?;
        if !output.status.success() {
            return Err(self.error(format!(
                "{}\n{}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let compressed = output.stdout;
        info!(
            compressor = %self.name,
            "compression rate: {}%",
            compressed.len() as u64 * 100 / input_len
        );
        if compressed.len() as u64 > input_len {
            return Err(self.error("output larger than input, compression skipped".into()));
        }

        write_temp(&compressed, input)
    }

    fn error(&self, message: String) -> Error {
        Error::Compress { compressor: self.name.clone(), message }
    }
}

/// Writes `content` to a named temp file that keeps `like`'s extension.
pub(crate) fn write_temp(content: &[u8], like: &Path) -> Result<NamedTempFile> {
    let suffix = like
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut file = tempfile::Builder::new().prefix("tsu-asset-").suffix(&suffix).tempfile()?;
    file.write_all(content)?;
    file.flush()?;
    Ok(file)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn input(content: &str) -> NamedTempFile {
        write_temp(content.as_bytes(), Path::new("style.css")).unwrap()
    }

    #[tokio::test]
    async fn test_stdout_becomes_output() {
        let src = input("a { color : red }");
        let strip = CommandCompressor::new("strip", "tr", ["-d", " "]).with_stdin();
        let out = strip.compress(src.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(out.path()).unwrap(), "a{color:red}");
        assert_eq!(out.path().extension().unwrap(), "css");
    }

    #[tokio::test]
    async fn test_input_placeholder_is_substituted() {
        let src = input("body{}");
        let cat = CommandCompressor::new("cat", "cat", [INPUT]);
        let out = cat.compress(src.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(out.path()).unwrap(), "body{}");
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let src = input("x");
        let err = CommandCompressor::new("false", "false", Vec::<String>::new())
            .compress(src.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Compress { ref compressor, .. } if compressor == "false"));
    }

    #[tokio::test]
    async fn test_growing_output_is_rejected() {
        let src = input("abc");
        let double = CommandCompressor::new("double", "sh", ["-c", "cat \"$0\" \"$0\"", INPUT]);
        let err = double.compress(src.path()).await.unwrap_err();
        assert!(err.to_string().contains("compression skipped"));
    }

    #[test]
    fn test_presets() {
        let closure = CommandCompressor::closure(Path::new("c.jar"), "--warning_level QUIET");
        assert_eq!(closure.args, ["-jar", "c.jar", "--js", INPUT, "--warning_level", "QUIET"]);
        assert!(!closure.stdin);

        let yui = CommandCompressor::yui_css(Path::new("y.jar"));
        assert_eq!(yui.args, ["-jar", "y.jar", "--type", "css"]);
        assert!(yui.stdin);
    }
}
