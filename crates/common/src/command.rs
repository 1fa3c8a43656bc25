//! Vocabulary understood by the Fast DDS Spy interactive prompt.
//!
//! Each command has a canonical keyword followed by its accepted aliases.
//! The empty line is an alias of `exit`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCommand {
    Participant,
    DataWriter,
    DataReader,
    Topic,
    Print,
    Exit,
    Help,
}

impl ToolCommand {
    pub const ALL: [ToolCommand; 7] = [
        ToolCommand::Participant,
        ToolCommand::DataWriter,
        ToolCommand::DataReader,
        ToolCommand::Topic,
        ToolCommand::Print,
        ToolCommand::Exit,
        ToolCommand::Help,
    ];

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ToolCommand::Participant => &["participants", "participant"],
            ToolCommand::DataWriter => &["datawriters", "datawriter"],
            ToolCommand::DataReader => &["datareaders", "datareader"],
            ToolCommand::Topic => &["topics", "topic"],
            ToolCommand::Print => &["print"],
            ToolCommand::Exit => &["exit", "quit", "q", ""],
            ToolCommand::Help => &["help", "man", "h"],
        }
    }

    /// Canonical spelling used when the harness builds a command itself.
    pub fn keyword(self) -> &'static str {
        self.aliases()[0]
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        let word = word.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.aliases().iter().any(|a| *a == word))
    }

    /// Number of arguments the prompt expects after the keyword.
    pub fn arity(self) -> usize {
        match self {
            ToolCommand::Print => 1,
            _ => 0,
        }
    }

    /// Query commands only print and return to the prompt.
    pub fn is_query(self) -> bool {
        matches!(
            self,
            ToolCommand::Participant
                | ToolCommand::DataWriter
                | ToolCommand::DataReader
                | ToolCommand::Topic
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: ToolCommand,
    pub arguments: Vec<String>,
}

impl ParsedCommand {
    /// The prompt rejects `print` without exactly one topic name; other
    /// commands ignore trailing words.
    pub fn is_well_formed(&self) -> bool {
        match self.command {
            ToolCommand::Print => self.arguments.len() == self.command.arity(),
            _ => true,
        }
    }
}

/// Splits a prompt line on whitespace and resolves its first word.
pub fn parse_command_line(line: &str) -> Option<ParsedCommand> {
    let mut words = line.split_whitespace();
    let head = words.next().unwrap_or("");
    let command = ToolCommand::from_keyword(head)?;
    Some(ParsedCommand {
        command,
        arguments: words.map(str::to_string).collect(),
    })
}
