//! Build argument inspection.
//!
//! The worker never rewrites the tool's options. It only needs three things
//! from a request's command line: the source directory (to name documents),
//! the output directory (to validate the request) and the doctree directory
//! (the cache domain). Value-taking options are known so that positionals
//! are located correctly.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Short options that take a value, either separate (`-b html`), attached
/// (`-bhtml`) or last in a group of switches (`-Ed dir`).
const SHORT_FLAGS_WITH_VALUES: &[char] = &['M', 'b', 't', 'd', 'j', 'c', 'D', 'A', 'w'];

/// Long options that take a value, either separate or `--name=value`.
const LONG_FLAGS_WITH_VALUES: &[&str] = &[
    "--builder",
    "--tag",
    "--doctree-dir",
    "--jobs",
    "--conf-dir",
    "--define",
    "--html-define",
    "--warning-file",
];

/// Length of the hex prefix used in internally keyed doctree directories.
const DOCTREE_KEY_LEN: usize = 16;

/// Errors from validating build arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("request arguments must include the {0}")]
    Missing(&'static str),

    #[error("option {0} expects a value")]
    MissingValue(String),
}

/// The parts of a build command line the worker cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArgs {
    pub source_dir: String,
    pub output_dir: String,
    pub filenames: Vec<String>,
    /// `-b`/`--builder`, falling back to the make-mode builder `-M`.
    pub builder: Option<String>,
    pub conf_dir: Option<String>,
    /// Client-specified `-d`/`--doctree-dir`.
    pub doctree_dir: Option<PathBuf>,
    arguments: Vec<String>,
}

/// Where a build keeps its doctrees and the exact argv to run it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBuild {
    pub doctree_dir: PathBuf,
    pub arguments: Vec<String>,
}

impl BuildArgs {
    /// Inspect a build command line.
    pub fn parse(arguments: &[String]) -> Result<Self, ArgsError> {
        let mut positionals: Vec<String> = Vec::new();
        let mut builder = None;
        let mut make_mode_builder = None;
        let mut conf_dir = None;
        let mut doctree_dir = None;

        let mut iter = arguments.iter();
        let mut options_done = false;

        while let Some(arg) = iter.next() {
            if options_done || arg == "-" || !arg.starts_with('-') {
                positionals.push(arg.clone());
                continue;
            }
            if arg == "--" {
                options_done = true;
                continue;
            }

            let (name, value) = if arg.starts_with("--") {
                let (flag, inline) = match arg.split_once('=') {
                    Some((flag, value)) => (flag, Some(value.to_string())),
                    None => (arg.as_str(), None),
                };
                if !LONG_FLAGS_WITH_VALUES.contains(&flag) {
                    continue;
                }
                let value = match inline {
                    Some(value) => value,
                    None => next_value(&mut iter, flag)?,
                };
                (flag.to_string(), value)
            } else {
                // Grouped flags: letters before the first value-taking one
                // are switches, the rest of the token is its value.
                let group = &arg[1..];
                let Some((index, short)) = group
                    .char_indices()
                    .find(|(_, c)| SHORT_FLAGS_WITH_VALUES.contains(c))
                else {
                    continue;
                };
                let attached = &group[index + short.len_utf8()..];
                let value = if attached.is_empty() {
                    next_value(&mut iter, arg)?
                } else {
                    attached.to_string()
                };
                (format!("-{short}"), value)
            };

            match name.as_str() {
                "-b" | "--builder" => builder = Some(value),
                "-M" => make_mode_builder = Some(value),
                "-c" | "--conf-dir" => conf_dir = Some(value),
                "-d" | "--doctree-dir" => doctree_dir = Some(PathBuf::from(value)),
                _ => {}
            }
        }

        let mut positionals = positionals.into_iter();
        let source_dir = positionals
            .next()
            .filter(|dir| !dir.is_empty())
            .ok_or(ArgsError::Missing("source directory"))?;
        let output_dir = positionals
            .next()
            .filter(|dir| !dir.is_empty())
            .ok_or(ArgsError::Missing("output directory"))?;

        Ok(Self {
            source_dir,
            output_dir,
            filenames: positionals.collect(),
            builder: builder.or(make_mode_builder),
            conf_dir,
            doctree_dir,
            arguments: arguments.to_vec(),
        })
    }

    /// Key for a worker-managed doctree directory, derived from the source
    /// directory, configuration directory and builder.
    ///
    /// Format: `dt_<16 hex chars>`
    pub fn doctree_key(&self) -> String {
        let source = absolutize(Path::new(&self.source_dir));
        let conf = self
            .conf_dir
            .as_deref()
            .map(|dir| absolutize(Path::new(dir)))
            .unwrap_or_else(|| source.clone());
        let builder = self.builder.as_deref().unwrap_or("default");

        let mut hasher = Sha256::new();
        hasher.update(source.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(conf.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(builder.as_bytes());
        let digest = hex::encode(hasher.finalize());

        format!("dt_{}", &digest[..DOCTREE_KEY_LEN])
    }

    /// Resolve the doctree directory and the argv for the tool.
    ///
    /// A client-specified doctree directory is used as is. Otherwise a keyed
    /// directory under `worker_root` is chosen and `-d <dir>` is prepended.
    pub fn stage(&self, worker_root: &Path) -> StagedBuild {
        match &self.doctree_dir {
            Some(dir) => StagedBuild {
                doctree_dir: dir.clone(),
                arguments: self.arguments.clone(),
            },
            None => {
                let dir = worker_root.join(self.doctree_key());
                let mut arguments = Vec::with_capacity(self.arguments.len() + 2);
                arguments.push("-d".to_string());
                arguments.push(dir.to_string_lossy().into_owned());
                arguments.extend(self.arguments.iter().cloned());
                StagedBuild {
                    doctree_dir: dir,
                    arguments,
                }
            }
        }
    }
}

fn next_value<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> Result<String, ArgsError> {
    iter.next()
        .cloned()
        .ok_or_else(|| ArgsError::MissingValue(flag.to_string()))
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_positionals_after_options() {
        let parsed = BuildArgs::parse(&argv(&["-b", "html", "-a", "-j", "auto", "docs", "out", "index.rst"])).unwrap();
        assert_eq!(parsed.source_dir, "docs");
        assert_eq!(parsed.output_dir, "out");
        assert_eq!(parsed.filenames, vec!["index.rst"]);
        assert_eq!(parsed.builder.as_deref(), Some("html"));
        assert!(parsed.doctree_dir.is_none());
    }

    #[test]
    fn test_options_mixed_with_positionals() {
        let parsed = BuildArgs::parse(&argv(&["docs", "-d", "cache/doctrees", "out", "-W"])).unwrap();
        assert_eq!(parsed.source_dir, "docs");
        assert_eq!(parsed.output_dir, "out");
        assert_eq!(parsed.doctree_dir, Some(PathBuf::from("cache/doctrees")));
    }

    #[test]
    fn test_attached_and_inline_values() {
        let parsed = BuildArgs::parse(&argv(&["-bhtml", "--conf-dir=conf", "--doctree-dir=dt", "src", "build"])).unwrap();
        assert_eq!(parsed.builder.as_deref(), Some("html"));
        assert_eq!(parsed.conf_dir.as_deref(), Some("conf"));
        assert_eq!(parsed.doctree_dir, Some(PathBuf::from("dt")));
    }

    #[test]
    fn test_make_mode_builder_used_when_no_builder() {
        let parsed = BuildArgs::parse(&argv(&["-M", "latexpdf", "src", "build"])).unwrap();
        assert_eq!(parsed.builder.as_deref(), Some("latexpdf"));
    }

    #[test]
    fn test_double_dash_ends_options() {
        let parsed = BuildArgs::parse(&argv(&["--", "-odd-source", "out"])).unwrap();
        assert_eq!(parsed.source_dir, "-odd-source");
    }

    #[test]
    fn test_boolean_flags_do_not_consume() {
        let parsed = BuildArgs::parse(&argv(&["-E", "-vv", "--keep-going", "docs", "out"])).unwrap();
        assert_eq!(parsed.source_dir, "docs");
        assert_eq!(parsed.output_dir, "out");
    }

    #[test]
    fn test_missing_output_dir() {
        let err = BuildArgs::parse(&argv(&["-b", "html", "docs"])).unwrap_err();
        assert_eq!(err, ArgsError::Missing("output directory"));
    }

    #[test]
    fn test_missing_source_dir() {
        let err = BuildArgs::parse(&[]).unwrap_err();
        assert_eq!(err, ArgsError::Missing("source directory"));
    }

    #[test]
    fn test_dangling_value_flag() {
        let err = BuildArgs::parse(&argv(&["docs", "out", "-d"])).unwrap_err();
        assert_eq!(err, ArgsError::MissingValue("-d".to_string()));
    }

    #[test]
    fn test_grouped_short_flags() {
        let parsed = BuildArgs::parse(&argv(&["-Ed", "dt", "docs", "out"])).unwrap();
        assert_eq!(parsed.doctree_dir, Some(PathBuf::from("dt")));
        assert_eq!(parsed.source_dir, "docs");
        assert_eq!(parsed.output_dir, "out");

        let attached = BuildArgs::parse(&argv(&["-aEbhtml", "docs", "out"])).unwrap();
        assert_eq!(attached.builder.as_deref(), Some("html"));
        assert_eq!(attached.source_dir, "docs");

        let switches = BuildArgs::parse(&argv(&["-aEnqW", "docs", "out"])).unwrap();
        assert_eq!(switches.source_dir, "docs");
        assert!(switches.builder.is_none());
    }

    #[test]
    fn test_grouped_short_flag_missing_value() {
        let err = BuildArgs::parse(&argv(&["docs", "out", "-Ed"])).unwrap_err();
        assert_eq!(err, ArgsError::MissingValue("-Ed".to_string()));
    }

    #[test]
    fn test_stage_with_client_doctree_dir() {
        let args = argv(&["-d", "dt", "docs", "out"]);
        let staged = BuildArgs::parse(&args).unwrap().stage(Path::new("/worker"));
        assert_eq!(staged.doctree_dir, PathBuf::from("dt"));
        assert_eq!(staged.arguments, args);
    }

    #[test]
    fn test_stage_with_keyed_doctree_dir() {
        let args = argv(&["-b", "html", "docs", "out"]);
        let parsed = BuildArgs::parse(&args).unwrap();
        let staged = parsed.stage(Path::new("/worker"));

        let key = parsed.doctree_key();
        assert!(key.starts_with("dt_"));
        assert_eq!(key.len(), 3 + DOCTREE_KEY_LEN);
        assert_eq!(staged.doctree_dir, Path::new("/worker").join(&key));
        assert_eq!(staged.arguments[0], "-d");
        assert_eq!(staged.arguments[1], staged.doctree_dir.to_string_lossy());
        assert_eq!(&staged.arguments[2..], args.as_slice());
    }

    #[test]
    fn test_doctree_key_depends_on_builder() {
        let html = BuildArgs::parse(&argv(&["-b", "html", "docs", "out"])).unwrap();
        let latex = BuildArgs::parse(&argv(&["-b", "latex", "docs", "out"])).unwrap();
        let html_again = BuildArgs::parse(&argv(&["docs", "other-out", "-b", "html"])).unwrap();

        assert_ne!(html.doctree_key(), latex.doctree_key());
        assert_eq!(html.doctree_key(), html_again.doctree_key());
    }
}
