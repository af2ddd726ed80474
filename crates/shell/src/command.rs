// Command-line assembly for remote shells.

use fleet::{CommandRequest, PathStyle, TargetPath};

/// Single-quotes `value` for a POSIX shell.
pub(crate) fn quote_posix(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Double-quotes `value` for `cmd.exe`. `cmd` has no escape for `"` inside
/// quotes; paths cannot contain one anyway.
pub(crate) fn quote_windows(value: &str) -> String {
    format!("\"{value}\"")
}

/// Full command line for a remote session, with the working directory
/// change folded in.
pub(crate) fn remote_command_line(request: &CommandRequest) -> String {
    match &request.cwd {
        None => request.command.clone(),
        Some(cwd) => match cwd.style() {
            PathStyle::Posix => format!("cd {} && {}", quote_posix(cwd.as_str()), request.command),
            PathStyle::Windows => {
                format!("cd /d {} && {}", quote_windows(cwd.as_str()), request.command)
            }
        },
    }
}

/// Command that creates `path` on a remote node.
pub(crate) fn make_dir_command(path: &TargetPath, parents: bool, exist_ok: bool) -> String {
    match path.style() {
        PathStyle::Posix => {
            let quoted = quote_posix(path.as_str());
            match (parents, exist_ok) {
                (true, true) => format!("mkdir -p {quoted}"),
                (true, false) => format!("[ ! -e {quoted} ] && mkdir -p {quoted}"),
                (false, true) => format!("[ -d {quoted} ] || mkdir {quoted}"),
                (false, false) => format!("mkdir {quoted}"),
            }
        }
        // cmd's mkdir always creates intermediate directories.
        PathStyle::Windows => {
            let quoted = quote_windows(path.as_str());
            if exist_ok {
                format!("if not exist {quoted} mkdir {quoted}")
            } else {
                format!("mkdir {quoted}")
            }
        }
    }
}
