//! Console commands.
//!
//! One command per line, the first word selects it and the rest of the line
//! is its argument:
//!
//! | Command               | Effect                                   |
//! |-----------------------|------------------------------------------|
//! | `host`                | start (or restart) the local server      |
//! | `stop`                | stop the local server                    |
//! | `status`              | log a status report                      |
//! | `connect [address]`   | connect, `localhost` when omitted        |
//! | `disconnect`          | disconnect the client                    |
//! | `say <message>`       | send a chat line                         |
//! | `kick <name>`         | kick a peer by display name              |
//! | `name <name>`         | change the display name                  |
//! | `quit` / `exit`       | shut the session down                    |

use std::str::FromStr;

use thiserror::Error;

/// A parsed console command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the local server.
    Host,
    /// Stop the local server.
    Stop,
    /// Log a status report.
    Status,
    /// Connect to an address (may be empty).
    Connect(String),
    /// Disconnect the client.
    Disconnect,
    /// Send a chat line.
    Say(String),
    /// Kick a peer by name.
    Kick(String),
    /// Change the display name.
    Name(String),
    /// Shut down.
    Quit,
}

/// Why a console line could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The line was blank.
    #[error("empty command")]
    Empty,
    /// The first word is not a command.
    #[error("unknown command \"{0}\"")]
    Unknown(String),
    /// The command needs an argument.
    #[error("usage: {0}")]
    MissingArgument(&'static str),
}

impl Command {
    /// Parses one console line.
    ///
    /// # Errors
    ///
    /// See [`CommandError`].
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        let (word, argument) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let required = |usage: &'static str| {
            if argument.is_empty() {
                Err(CommandError::MissingArgument(usage))
            } else {
                Ok(argument.to_owned())
            }
        };

        match word.to_ascii_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "stop" => Ok(Self::Stop),
            "status" => Ok(Self::Status),
            "connect" => Ok(Self::Connect(argument.to_owned())),
            "disconnect" => Ok(Self::Disconnect),
            "say" => required("say <message>").map(Self::Say),
            "kick" => required("kick <name>").map(Self::Kick),
            "name" => required("name <name>").map(Self::Name),
            "quit" | "exit" => Ok(Self::Quit),
            _ => Err(CommandError::Unknown(word.to_owned())),
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        Self::parse(line)
    }
}
