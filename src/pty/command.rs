use portable_pty::CommandBuilder;

/// Program run on the slave side when no command was given: a shell that
/// reaps its own (non-existent) children and exits. Resolved through `PATH`,
/// Termux has no `/bin/sh`.
const FALLBACK_PROGRAM: &str = "sh";
const FALLBACK_ARGS: [&str; 2] = ["-c", "wait"];

/// Build the child command line from the user-supplied words, which must
/// already have the device-handle argument stripped.
pub fn build_command(command: &[String]) -> CommandBuilder {
    let mut cmd = match command.split_first() {
        Some((program, args)) => {
            let mut cmd = CommandBuilder::new(program);
            cmd.args(args);
            cmd
        }
        None => {
            let mut cmd = CommandBuilder::new(FALLBACK_PROGRAM);
            cmd.args(FALLBACK_ARGS);
            cmd
        }
    };
    if let Ok(cwd) = std::env::current_dir() {
        cmd.cwd(cwd);
    }
    cmd
}

/// Human-readable rendering of a command line for diagnostics.
pub fn describe_command(command: &[String]) -> String {
    if command.is_empty() {
        return format!("{} {}", FALLBACK_PROGRAM, FALLBACK_ARGS.join(" "));
    }
    command.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn argv(cmd: &CommandBuilder) -> Vec<&OsStr> {
        cmd.get_argv().iter().map(|arg| arg.as_os_str()).collect()
    }

    #[test]
    fn uses_given_program_and_args() {
        let words = vec!["picocom".to_string(), "-b".to_string(), "9600".to_string()];
        let cmd = build_command(&words);
        assert_eq!(argv(&cmd), vec!["picocom", "-b", "9600"]);
        assert_eq!(describe_command(&words), "picocom -b 9600");
    }

    #[test]
    fn empty_command_waits_and_exits() {
        let cmd = build_command(&[]);
        assert_eq!(argv(&cmd), vec!["sh", "-c", "wait"]);
        assert_eq!(describe_command(&[]), "sh -c wait");
    }
}
