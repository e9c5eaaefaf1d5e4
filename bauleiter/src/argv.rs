//! Rewriting of the original invocation for remote build jobs
//!
//! The command line of `build-pkg-condor` mirrors the one of `build-pkg` plus
//! matrix and orchestration flags. Each remote job runs `build-pkg` with the
//! original arguments minus everything the orchestration layer handles itself;
//! the job matrix appends one concrete environment and architecture per job.
//!
//! Rewriting happens in two steps. [`tokenize`] turns the raw arguments into
//! typed [`Token`]s, deciding flag vs. value from a fixed arity table, and
//! [`ArgvRewriter`] then filters tokens by [`Category`].
//!
//! Value rule for ambiguous tokens: flags with a fixed arity consume exactly
//! that many following tokens, even if one of them starts with `-`. The
//! variadic `--arch` stops at the first token starting with `-`. Unknown
//! flags take no values; their arguments stay positional and are forwarded in
//! place, which preserves them either way. The last argument is always the
//! source package descriptor and is never consumed as a value.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment selection, followed by family and codename
pub const ENV_FLAG: &str = "--env";
/// Architecture selection, followed by one or more architectures
pub const ARCH_FLAG: &str = "--arch";
/// Backport before building
pub const BACKPORT_FLAG: &str = "--backport";
/// Source inclusion policy, followed by `yes` or `no`
pub const SOURCE_INCLUDE_FLAG: &str = "--source-include";
/// Build directory base, followed by a path
pub const BUILD_BASEDIR_FLAG: &str = "--build-basedir";
/// Chroot base directory, followed by a path
pub const CHROOT_BASEDIR_FLAG: &str = "--chroot-basedir";
/// Global configuration file option, followed by a path
pub const CONFIG_FLAGS: [&str; 2] = ["-c", "--config"];
/// Prefix of flags consumed by the orchestration layer, each with one value
pub const ORCHESTRATION_PREFIX: &str = "--condor-";
/// End of options marker
pub const SEPARATOR: &str = "--";

/// Command name of the matrix submission
pub const SUBMIT_COMMAND: &str = "build-pkg-condor";
/// Command name run on the execute node
pub const REMOTE_COMMAND: &str = "build-pkg";

/// Number of values a flag takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Boolean switch or unknown flag
    None,
    /// Exactly this many values
    Exactly(usize),
    /// Values up to the next token starting with `-`
    UntilFlag,
}

/// Arity of a flag by name
pub fn arity(flag: &str) -> Arity {
    match flag {
        ENV_FLAG => Arity::Exactly(2),
        ARCH_FLAG => Arity::UntilFlag,
        BUILD_BASEDIR_FLAG | CHROOT_BASEDIR_FLAG | SOURCE_INCLUDE_FLAG => Arity::Exactly(1),
        BACKPORT_FLAG => Arity::None,
        f if CONFIG_FLAGS.contains(&f) => Arity::Exactly(1),
        f if f.starts_with(ORCHESTRATION_PREFIX) => Arity::Exactly(1),
        _ => Arity::None,
    }
}

/// One classified element of the original invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Program path (first argument)
    Program(String),
    /// The submission command name
    Command(String),
    /// A flag with the values it consumed
    Flag {
        /// Flag name including dashes
        name: String,
        /// Consumed values
        values: Vec<String>,
        /// Written as `--name=value`
        inline: bool,
    },
    /// The `--` end of options marker
    Separator,
    /// Anything else
    Positional(String),
}

/// What happens to a token when re-issuing the invocation remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Replaced per job by the job matrix
    Matrix,
    /// Consumed by the orchestration layer
    Orchestration,
    /// Only meaningful on the submit machine
    Local,
    /// The command name, renamed for the remote side
    Command,
    /// Passed through unchanged
    Forward,
}

impl Token {
    /// Category of this token
    pub fn category(&self) -> Category {
        match self {
            Token::Program(_) | Token::Separator => Category::Matrix,
            Token::Command(_) => Category::Command,
            Token::Positional(_) => Category::Forward,
            Token::Flag { name, .. } => match name.as_str() {
                ENV_FLAG | ARCH_FLAG | SOURCE_INCLUDE_FLAG | BUILD_BASEDIR_FLAG
                | CHROOT_BASEDIR_FLAG => Category::Matrix,
                BACKPORT_FLAG => Category::Local,
                n if n.starts_with(ORCHESTRATION_PREFIX) => Category::Orchestration,
                _ => Category::Forward,
            },
        }
    }

    fn render_into(&self, out: &mut Vec<String>) {
        match self {
            Token::Program(s) | Token::Command(s) | Token::Positional(s) => out.push(s.clone()),
            Token::Separator => out.push(SEPARATOR.to_string()),
            Token::Flag { name, values, inline: true } => {
                out.push(format!("{}={}", name, values.join("")));
            }
            Token::Flag { name, values, inline: false } => {
                out.push(name.clone());
                out.extend(values.iter().cloned());
            }
        }
    }
}

/// A tokenized invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// All tokens except the descriptor, in original order
    pub tokens: Vec<Token>,
    /// The final argument: path to the source package descriptor
    pub descriptor: String,
}

/// Classify raw arguments (including the program path) into tokens
pub fn tokenize(args: &[String], command: &str) -> Result<Invocation, ArgvError> {
    let (program, rest) = args.split_first().ok_or(ArgvError::Empty)?;
    let (descriptor, body) = rest.split_last().ok_or(ArgvError::MissingDescriptor)?;
    if descriptor.starts_with('-') {
        return Err(ArgvError::MissingDescriptor);
    }

    let mut tokens = vec![Token::Program(program.clone())];
    let mut seen_command = false;
    let mut options_ended = false;
    let mut i = 0;

    while i < body.len() {
        let arg = &body[i];
        i += 1;

        if options_ended {
            tokens.push(Token::Positional(arg.clone()));
            continue;
        }
        if arg == SEPARATOR {
            options_ended = true;
            tokens.push(Token::Separator);
            continue;
        }

        if arg.starts_with('-') && arg.len() > 1 {
            if let Some((name, value)) = arg.split_once('=').filter(|_| arg.starts_with("--")) {
                tokens.push(Token::Flag {
                    name: name.to_string(),
                    values: vec![value.to_string()],
                    inline: true,
                });
                continue;
            }

            let values = match arity(arg) {
                Arity::None => Vec::new(),
                Arity::Exactly(n) => {
                    if i + n > body.len() {
                        return Err(ArgvError::MissingValue {
                            flag: arg.clone(),
                            expected: n,
                        });
                    }
                    let values = body[i..i + n].to_vec();
                    i += n;
                    values
                }
                Arity::UntilFlag => {
                    let start = i;
                    while i < body.len() && !body[i].starts_with('-') {
                        i += 1;
                    }
                    if start == i {
                        return Err(ArgvError::MissingValue {
                            flag: arg.clone(),
                            expected: 1,
                        });
                    }
                    body[start..i].to_vec()
                }
            };
            tokens.push(Token::Flag {
                name: arg.clone(),
                values,
                inline: false,
            });
            continue;
        }

        if !seen_command && arg == command {
            seen_command = true;
            tokens.push(Token::Command(arg.clone()));
        } else {
            tokens.push(Token::Positional(arg.clone()));
        }
    }

    Ok(Invocation {
        tokens,
        descriptor: descriptor.clone(),
    })
}

/// The reusable part of every remote job's invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenArgs {
    /// Program to run on the execute node
    pub executable: String,
    /// Arguments forwarded to every job, command name first
    pub arguments: Vec<String>,
    /// Source package descriptor split off the end of the invocation
    pub descriptor: PathBuf,
}

impl RewrittenArgs {
    /// Check that the split-off descriptor is the one the request names
    pub fn ensure_descriptor(&self, expected: &Path) -> Result<(), ArgvError> {
        if self.descriptor != expected {
            return Err(ArgvError::DescriptorNotLast {
                expected: expected.to_path_buf(),
                found: self.descriptor.clone(),
            });
        }
        Ok(())
    }
}

/// Turns a submission invocation into a remote build invocation
#[derive(Debug, Clone)]
pub struct ArgvRewriter {
    command: String,
    remote_command: String,
}

impl Default for ArgvRewriter {
    fn default() -> Self {
        Self::new(SUBMIT_COMMAND, REMOTE_COMMAND)
    }
}

impl ArgvRewriter {
    /// Rewrite `command` to `remote_command`
    pub fn new(command: impl Into<String>, remote_command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            remote_command: remote_command.into(),
        }
    }

    /// Rewrite the full original argument list (program path first)
    pub fn rewrite(&self, args: &[String]) -> Result<RewrittenArgs, ArgvError> {
        let invocation = tokenize(args, &self.command)?;

        let mut executable = None;
        let mut arguments = Vec::new();
        let mut seen_command = false;

        for token in &invocation.tokens {
            match (token, token.category()) {
                (Token::Program(program), _) => executable = Some(program.clone()),
                (_, Category::Command) => {
                    seen_command = true;
                    arguments.push(self.remote_command.clone());
                }
                (_, Category::Forward) => token.render_into(&mut arguments),
                (_, category) => debug!("Dropping {:?} ({:?})", token, category),
            }
        }

        if !seen_command {
            return Err(ArgvError::MissingCommand(self.command.clone()));
        }

        Ok(RewrittenArgs {
            executable: executable.ok_or(ArgvError::Empty)?,
            arguments,
            descriptor: PathBuf::from(invocation.descriptor),
        })
    }
}

/// Argument rewriting error types
#[derive(Debug, thiserror::Error)]
pub enum ArgvError {
    /// No arguments at all
    #[error("Empty command line")]
    Empty,

    /// The invocation does not end in a descriptor path
    #[error("Missing source package descriptor as last argument")]
    MissingDescriptor,

    /// The submission command name is absent
    #[error("Command '{0}' not found in command line")]
    MissingCommand(String),

    /// A flag has fewer values than it takes
    #[error("Flag {flag} expects {expected} value(s)")]
    MissingValue {
        /// The flag
        flag: String,
        /// Number of values it takes
        expected: usize,
    },

    /// The last argument is not the requested descriptor
    #[error("Source package descriptor must be the last argument: expected {expected:?}, found {found:?}")]
    DescriptorNotLast {
        /// Descriptor named by the parsed request
        expected: PathBuf,
        /// Final argument of the invocation
        found: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_tokenize_classifies_flags_and_values() {
        let invocation = tokenize(
            &args("bauleiter -c site.yml build-pkg-condor --env debian bullseye --arch amd64 i386 --backport --condor-logdir /tmp/logs foo.dsc"),
            SUBMIT_COMMAND,
        )
        .unwrap();

        assert_eq!(
            invocation.tokens,
            vec![
                Token::Program("bauleiter".to_string()),
                Token::Flag {
                    name: "-c".to_string(),
                    values: vec!["site.yml".to_string()],
                    inline: false,
                },
                Token::Command("build-pkg-condor".to_string()),
                Token::Flag {
                    name: "--env".to_string(),
                    values: vec!["debian".to_string(), "bullseye".to_string()],
                    inline: false,
                },
                Token::Flag {
                    name: "--arch".to_string(),
                    values: vec!["amd64".to_string(), "i386".to_string()],
                    inline: false,
                },
                Token::Flag { name: "--backport".to_string(), values: vec![], inline: false },
                Token::Flag {
                    name: "--condor-logdir".to_string(),
                    values: vec!["/tmp/logs".to_string()],
                    inline: false,
                },
            ]
        );
        assert_eq!(invocation.descriptor, "foo.dsc");
    }

    #[test]
    fn test_arch_run_never_consumes_descriptor() {
        let invocation =
            tokenize(&args("bauleiter build-pkg-condor --arch amd64 foo.dsc"), SUBMIT_COMMAND).unwrap();

        assert_eq!(invocation.descriptor, "foo.dsc");
        assert!(invocation.tokens.contains(&Token::Flag {
            name: "--arch".to_string(),
            values: vec!["amd64".to_string()],
            inline: false,
        }));
    }

    #[test]
    fn test_fixed_arity_consumes_dash_values() {
        let invocation = tokenize(
            &args("bauleiter build-pkg-condor --condor-request-memory -1 foo.dsc"),
            SUBMIT_COMMAND,
        )
        .unwrap();

        assert_eq!(
            invocation.tokens[2],
            Token::Flag {
                name: "--condor-request-memory".to_string(),
                values: vec!["-1".to_string()],
                inline: false,
            }
        );
    }

    #[test]
    fn test_missing_values() {
        let result = tokenize(&args("bauleiter build-pkg-condor --env debian foo.dsc"), SUBMIT_COMMAND);
        assert!(matches!(
            result,
            Err(ArgvError::MissingValue { expected: 2, .. })
        ));

        let result = tokenize(
            &args("bauleiter build-pkg-condor --arch --backport foo.dsc"),
            SUBMIT_COMMAND,
        );
        assert!(matches!(result, Err(ArgvError::MissingValue { expected: 1, .. })));
    }

    #[test]
    fn test_missing_descriptor() {
        assert!(matches!(
            tokenize(&args("bauleiter"), SUBMIT_COMMAND),
            Err(ArgvError::MissingDescriptor)
        ));
        assert!(matches!(
            tokenize(&args("bauleiter build-pkg-condor --backport"), SUBMIT_COMMAND),
            Err(ArgvError::MissingDescriptor)
        ));
        assert!(matches!(tokenize(&[], SUBMIT_COMMAND), Err(ArgvError::Empty)));
    }

    #[test]
    fn test_rewrite_drops_matrix_and_orchestration_flags() {
        let rewritten = ArgvRewriter::default()
            .rewrite(&args(
                "/usr/bin/bauleiter -c site.yml build-pkg-condor --env debian bullseye --env ubuntu jammy \
                 --arch amd64 i386 --build-basedir /tmp/build --backport --source-include yes \
                 --condor-nice-user no --condor-request-memory 2000 --result-dir /srv/results \
                 --chroot-basedir /srv/chroots -- pool/foo_1.0.dsc",
            ))
            .unwrap();

        assert_eq!(rewritten.executable, "/usr/bin/bauleiter");
        assert_eq!(
            rewritten.arguments,
            args("-c site.yml build-pkg --result-dir /srv/results")
        );
        assert_eq!(rewritten.descriptor, PathBuf::from("pool/foo_1.0.dsc"));
    }

    #[test]
    fn test_rewrite_keeps_unknown_tokens_in_order() {
        let rewritten = ArgvRewriter::default()
            .rewrite(&args(
                "bauleiter --debug build-pkg-condor --zeta 1 --arch amd64 --alpha --beta=2 extra foo.dsc",
            ))
            .unwrap();

        assert_eq!(
            rewritten.arguments,
            args("--debug build-pkg --zeta 1 --alpha --beta=2 extra")
        );
    }

    #[test]
    fn test_rewrite_inline_matrix_flags() {
        let rewritten = ArgvRewriter::default()
            .rewrite(&args(
                "bauleiter build-pkg-condor --build-basedir=/tmp/b --condor-logdir=/tmp/l --source-include=no foo.dsc",
            ))
            .unwrap();

        assert_eq!(rewritten.arguments, args("build-pkg"));
    }

    #[test]
    fn test_rewrite_requires_command() {
        let result = ArgvRewriter::default().rewrite(&args("bauleiter genpkgs foo.dsc"));
        assert!(matches!(result, Err(ArgvError::MissingCommand(_))));
    }

    #[test]
    fn test_only_first_command_token_is_renamed() {
        let rewritten = ArgvRewriter::default()
            .rewrite(&args("bauleiter build-pkg-condor --tag build-pkg-condor foo.dsc"))
            .unwrap();

        assert_eq!(rewritten.arguments, args("build-pkg --tag build-pkg-condor"));
    }

    #[test]
    fn test_config_value_named_like_command() {
        let rewritten = ArgvRewriter::default()
            .rewrite(&args("bauleiter -c build-pkg-condor build-pkg-condor --backport foo.dsc"))
            .unwrap();

        assert_eq!(rewritten.arguments, args("-c build-pkg-condor build-pkg"));

        let result = ArgvRewriter::default().rewrite(&args("bauleiter --config build-pkg-condor foo.dsc"));
        assert!(matches!(result, Err(ArgvError::MissingCommand(_))));
    }

    #[test]
    fn test_ensure_descriptor() {
        let rewritten = ArgvRewriter::default()
            .rewrite(&args("bauleiter build-pkg-condor foo.dsc"))
            .unwrap();

        assert!(rewritten.ensure_descriptor(Path::new("foo.dsc")).is_ok());
        assert!(matches!(
            rewritten.ensure_descriptor(Path::new("bar.dsc")),
            Err(ArgvError::DescriptorNotLast { .. })
        ));
    }
}
