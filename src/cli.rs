use clap::Parser;
use thiserror::Error;

/// Follow live patient vitals and AI risk summaries from the terminal.
#[derive(Debug, Parser)]
#[command(name = "cardiolink", version, about)]
pub struct Cli {
    /// Doctor account email.
    #[arg(long, env = "CARDIOLINK_EMAIL")]
    pub email: String,

    /// Doctor account password.
    #[arg(long, env = "CARDIOLINK_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Patient to select first instead of the first one listed.
    #[arg(long)]
    pub patient: Option<String>,

    /// Run one manual analysis as soon as the selected patient has data.
    #[arg(long)]
    pub analyze_on_start: bool,
}

/// A line typed at the dashboard prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(String),
    Analyze,
    Patients,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: select <patient-id>")]
    MissingPatient,

    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),
}

pub const HELP: &str = "Commands: select <id>, analyze, patients, help, quit";

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "select" | "s" => {
                let id = words.next().ok_or(CommandError::MissingPatient)?;
                Self::Select(id.to_string())
            }
            "analyze" | "a" => Self::Analyze,
            "patients" | "p" | "ls" => Self::Patients,
            "help" | "h" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(Command::parse("select p1"), Ok(Some(Command::Select("p1".into()))));
        assert_eq!(Command::parse("  S   p2  "), Ok(Some(Command::Select("p2".into()))));
        assert_eq!(Command::parse("analyze"), Ok(Some(Command::Analyze)));
        assert_eq!(Command::parse("ls"), Ok(Some(Command::Patients)));
        assert_eq!(Command::parse("QUIT"), Ok(Some(Command::Quit)));
        assert_eq!(Command::parse("?"), Ok(Some(Command::Help)));
    }

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(Command::parse("   "), Ok(None));
    }

    #[test]
    fn bad_input_reported() {
        assert_eq!(Command::parse("select"), Err(CommandError::MissingPatient));
        assert_eq!(
            Command::parse("reboot now"),
            Err(CommandError::Unknown("reboot".into()))
        );
    }

    #[test]
    fn cli_reads_flags() {
        let cli = Cli::try_parse_from([
            "cardiolink",
            "--email",
            "doc@example.com",
            "--password",
            "pw",
            "--patient",
            "p2",
            "--analyze-on-start",
        ])
        .unwrap();
        assert_eq!(cli.email, "doc@example.com");
        assert_eq!(cli.patient.as_deref(), Some("p2"));
        assert!(cli.analyze_on_start);
    }
}
