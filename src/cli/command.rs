//! Shell command parsing
//!
//! A line is split on whitespace; the first word (case-insensitive) selects
//! the command. Arity and port checks happen here, before the core is asked
//! to do anything.

use thiserror::Error;

use crate::ssh::DEFAULT_PORT;

/// One parsed shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Connect {
        host: String,
        username: String,
        password: String,
        port: u16,
    },
    ConnectKey {
        host: String,
        username: String,
        key_path: String,
        port: u16,
    },
    Disconnect,
    Ls { path: Option<String> },
    Lls { path: Option<String> },
    Pwd,
    Upload { local: String, remote: String },
    Download { remote: String, local: String },
    Delete { path: String },
    Mkdir { path: String },
    Rmdir { path: String },
    Bookmarks,
    BookmarkSave { name: String },
    BookmarkDelete { name: String },
    Open { name: String, secret: Option<String> },
    Help,
    Quit,
}

/// Shell parse errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Unknown command: {0}\nType 'help' for available commands")]
    Unknown(String),
}

const USAGE_CONNECT: &str = "connect <host> <username> <password> [port]";
const USAGE_CONNECTKEY: &str = "connectkey <host> <username> <keypath> [port]";
const USAGE_UPLOAD: &str = "upload <local_file> <remote_file>";
const USAGE_DOWNLOAD: &str = "download <remote_file> <local_file>";
const USAGE_DELETE: &str = "delete <remote_file>";
const USAGE_MKDIR: &str = "mkdir <remote_directory>";
const USAGE_RMDIR: &str = "rmdir <remote_directory>";
const USAGE_BOOKMARK: &str = "bookmark <save|delete> <name>";
const USAGE_OPEN: &str = "open <name> [password]";

fn parse_port(arg: Option<&&str>) -> Result<u16, CommandError> {
    match arg {
        None => Ok(DEFAULT_PORT),
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| CommandError::InvalidPort(raw.to_string())),
    }
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<CliCommand>, CommandError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = parts.first() else {
        return Ok(None);
    };
    let args = &parts[1..];
    let owned = |i: usize| args[i].to_string();

    let command = match first.to_lowercase().as_str() {
        "connect" => {
            if args.len() < 3 {
                return Err(CommandError::Usage(USAGE_CONNECT));
            }
            CliCommand::Connect {
                host: owned(0),
                username: owned(1),
                password: owned(2),
                port: parse_port(args.get(3))?,
            }
        }
        "connectkey" => {
            if args.len() < 3 {
                return Err(CommandError::Usage(USAGE_CONNECTKEY));
            }
            CliCommand::ConnectKey {
                host: owned(0),
                username: owned(1),
                key_path: owned(2),
                port: parse_port(args.get(3))?,
            }
        }
        "disconnect" => CliCommand::Disconnect,
        "ls" => CliCommand::Ls {
            path: args.first().map(|s| s.to_string()),
        },
        "lls" => CliCommand::Lls {
            path: args.first().map(|s| s.to_string()),
        },
        "pwd" => CliCommand::Pwd,
        "upload" => {
            if args.len() < 2 {
                return Err(CommandError::Usage(USAGE_UPLOAD));
            }
            CliCommand::Upload {
                local: owned(0),
                remote: owned(1),
            }
        }
        "download" => {
            if args.len() < 2 {
                return Err(CommandError::Usage(USAGE_DOWNLOAD));
            }
            CliCommand::Download {
                remote: owned(0),
                local: owned(1),
            }
        }
        "delete" => match args.first() {
            Some(path) => CliCommand::Delete { path: path.to_string() },
            None => return Err(CommandError::Usage(USAGE_DELETE)),
        },
        "mkdir" => match args.first() {
            Some(path) => CliCommand::Mkdir { path: path.to_string() },
            None => return Err(CommandError::Usage(USAGE_MKDIR)),
        },
        "rmdir" => match args.first() {
            Some(path) => CliCommand::Rmdir { path: path.to_string() },
            None => return Err(CommandError::Usage(USAGE_RMDIR)),
        },
        "bookmarks" => CliCommand::Bookmarks,
        "bookmark" => match (args.first().map(|s| s.to_lowercase()).as_deref(), args.get(1)) {
            (Some("save"), Some(name)) => CliCommand::BookmarkSave { name: name.to_string() },
            (Some("delete"), Some(name)) => CliCommand::BookmarkDelete { name: name.to_string() },
            _ => return Err(CommandError::Usage(USAGE_BOOKMARK)),
        },
        "open" => match args.first() {
            Some(name) => CliCommand::Open {
                name: name.to_string(),
                secret: args.get(1).map(|s| s.to_string()),
            },
            None => return Err(CommandError::Usage(USAGE_OPEN)),
        },
        "help" => CliCommand::Help,
        "quit" | "exit" => CliCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

/// Text printed by `help`
pub const HELP_TEXT: &str = "\
Available commands:
  connect <host> <username> <password> [port] - Connect using password authentication
  connectkey <host> <username> <keypath> [port] - Connect using SSH key authentication
  disconnect - Disconnect from server
  ls [path] - List directory contents
  lls [path] - List local directory contents
  pwd - Print working directory
  upload <local_file> <remote_file> - Upload file to server
  download <remote_file> <local_file> - Download file from server
  delete <remote_file> - Delete file on server
  mkdir <remote_directory> - Create directory on server
  rmdir <remote_directory> - Remove directory on server
  bookmarks - List saved bookmarks
  bookmark save <name> - Save the current connection as a bookmark
  bookmark delete <name> - Delete a bookmark
  open <name> [password] - Connect using a bookmark
  help - Show this help message
  quit - Exit the application";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line() {
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse(""), Ok(None));
    }

    #[test]
    fn test_connect_default_port() {
        assert_eq!(
            parse("connect example.com alice s3cret").unwrap(),
            Some(CliCommand::Connect {
                host: "example.com".to_string(),
                username: "alice".to_string(),
                password: "s3cret".to_string(),
                port: 22,
            })
        );
    }

    #[test]
    fn test_connectkey_with_port() {
        assert_eq!(
            parse("CONNECTKEY h u /home/u/.ssh/id_ed25519 2222").unwrap(),
            Some(CliCommand::ConnectKey {
                host: "h".to_string(),
                username: "u".to_string(),
                key_path: "/home/u/.ssh/id_ed25519".to_string(),
                port: 2222,
            })
        );
    }

    #[test]
    fn test_invalid_port() {
        assert_eq!(
            parse("connect h u p abc"),
            Err(CommandError::InvalidPort("abc".to_string()))
        );
        assert_eq!(
            parse("connect h u p 70000").unwrap_err().to_string(),
            "Invalid port number: 70000"
        );
    }

    #[test]
    fn test_usage_errors() {
        assert_eq!(
            parse("connect h u").unwrap_err().to_string(),
            "Usage: connect <host> <username> <password> [port]"
        );
        assert_eq!(parse("upload a"), Err(CommandError::Usage(USAGE_UPLOAD)));
        assert_eq!(parse("download"), Err(CommandError::Usage(USAGE_DOWNLOAD)));
        assert_eq!(parse("rmdir"), Err(CommandError::Usage(USAGE_RMDIR)));
        assert_eq!(parse("bookmark rename x"), Err(CommandError::Usage(USAGE_BOOKMARK)));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("ls").unwrap(), Some(CliCommand::Ls { path: None }));
        assert_eq!(
            parse("ls /var/log").unwrap(),
            Some(CliCommand::Ls {
                path: Some("/var/log".to_string())
            })
        );
        assert_eq!(parse("exit").unwrap(), Some(CliCommand::Quit));
        assert_eq!(parse("Quit").unwrap(), Some(CliCommand::Quit));
        assert_eq!(
            parse("open prod").unwrap(),
            Some(CliCommand::Open {
                name: "prod".to_string(),
                secret: None
            })
        );
    }

    #[test]
    fn test_unknown_command() {
        let err = parse("frobnicate now").unwrap_err();
        assert_eq!(err, CommandError::Unknown("frobnicate".to_string()));
        assert!(err.to_string().contains("Type 'help'"));
    }
}
