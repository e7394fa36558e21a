//! Chat input parsing and the command table.

/// Result of parsing an input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// Regular chat message.
    Message(String),
    /// Slash command.
    Command(Invocation),
}

/// A slash command as typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Lower-cased command name without the slash.
    pub name: String,
    /// Whitespace separated arguments.
    pub args: Vec<String>,
    /// Everything after the name, untouched.
    pub full_args: String,
}

impl Invocation {
    /// Argument at `index`, or an empty string.
    pub fn arg(&self, index: usize) -> &str {
        self.args.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Parse an input line into a message or command.
pub fn parse_input(input: &str) -> ChatInput {
    let trimmed = input.trim();

    let Some(without_slash) = trimmed.strip_prefix('/') else {
        return ChatInput::Message(trimmed.to_string());
    };

    let (name, rest) = match without_slash.find(char::is_whitespace) {
        Some(pos) => (&without_slash[..pos], &without_slash[pos..]),
        None => (without_slash, ""),
    };
    let full_args = rest.strip_prefix(char::is_whitespace).unwrap_or(rest);

    ChatInput::Command(Invocation {
        name: name.to_lowercase(),
        args: full_args.split_whitespace().map(str::to_string).collect(),
        full_args: full_args.to_string(),
    })
}

/// Every command the room understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// List commands.
    Help,
    /// Pick or change a nickname.
    Nick,
    /// Change the nick color.
    Color,
    /// Refused on purpose; not an alias of `Color`.
    Colour,
    /// Rebind to an exported identity id.
    Import,
    /// Toggle away.
    Afk,
    /// Set the status line.
    Status,
    /// Data protection info, export and erase.
    Gdpr,
    /// Set or clear the announcement.
    Announce,
    /// Ban a user by name.
    Ban,
    /// Mute a user by name.
    Timeout,
    /// Delete one message.
    Delete,
    /// Reload emotes.
    Emotes,
}

impl CommandKind {
    /// Resolve a lower-cased name or alias.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "help" | "h" | "commands" => CommandKind::Help,
            "nick" | "chrat" | "nickname" | "name" => CommandKind::Nick,
            "color" => CommandKind::Color,
            "colour" => CommandKind::Colour,
            "import" => CommandKind::Import,
            "afk" => CommandKind::Afk,
            "status" | "me" => CommandKind::Status,
            "gdpr" => CommandKind::Gdpr,
            "announce" | "announcement" => CommandKind::Announce,
            "ban" => CommandKind::Ban,
            "timeout" | "to" => CommandKind::Timeout,
            "delete" => CommandKind::Delete,
            "emotes" | "emote" => CommandKind::Emotes,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Help => "help",
            CommandKind::Nick => "nick",
            CommandKind::Color => "color",
            CommandKind::Colour => "colour",
            CommandKind::Import => "import",
            CommandKind::Afk => "afk",
            CommandKind::Status => "status",
            CommandKind::Gdpr => "gdpr",
            CommandKind::Announce => "announce",
            CommandKind::Ban => "ban",
            CommandKind::Timeout => "timeout",
            CommandKind::Delete => "delete",
            CommandKind::Emotes => "emotes",
        }
    }

    /// Check if only moderators may run this.
    pub fn is_moderator_only(&self) -> bool {
        matches!(
            self,
            CommandKind::Announce
                | CommandKind::Ban
                | CommandKind::Timeout
                | CommandKind::Delete
                | CommandKind::Emotes
        )
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// Command information for help display.
pub struct CommandInfo {
    /// Command kind.
    pub kind: CommandKind,
    /// Command aliases.
    pub aliases: &'static [&'static str],
    /// Command syntax.
    pub syntax: &'static str,
    /// Command description.
    pub description: &'static str,
}

/// Help entries, user commands first.
pub fn command_help() -> Vec<CommandInfo> {
    vec![
        CommandInfo {
            kind: CommandKind::Help,
            aliases: &["h", "commands"],
            syntax: "/help",
            description: "View this list.",
        },
        CommandInfo {
            kind: CommandKind::Nick,
            aliases: &["chrat", "nickname", "name"],
            syntax: "/nick <nickname>",
            description: "Change your nickname to <nickname>.",
        },
        CommandInfo {
            kind: CommandKind::Color,
            aliases: &[],
            syntax: "/color <#RRGGBB>",
            description: "Change your nickname's color to hex #RRGGBB.",
        },
        CommandInfo {
            kind: CommandKind::Import,
            aliases: &[],
            syntax: "/import <guid>",
            description: "Import a GUID exported earlier to reclaim your nickname. Must match exactly!",
        },
        CommandInfo {
            kind: CommandKind::Afk,
            aliases: &[],
            syntax: "/afk",
            description: "Toggle AFK status in the user listing.",
        },
        CommandInfo {
            kind: CommandKind::Status,
            aliases: &["me"],
            syntax: "/status <text>",
            description: "Set your status in the user listing.",
        },
        CommandInfo {
            kind: CommandKind::Gdpr,
            aliases: &[],
            syntax: "/gdpr <info|ip|export|delete>",
            description: "See what we store, get a copy of your data, or wipe it.",
        },
        CommandInfo {
            kind: CommandKind::Announce,
            aliases: &["announcement"],
            syntax: "/announce <text>",
            description: "Send an announcement to all users. Leave blank to clear.",
        },
        CommandInfo {
            kind: CommandKind::Ban,
            aliases: &[],
            syntax: "/ban <user>",
            description: "Permanently ban the user with that nickname.",
        },
        CommandInfo {
            kind: CommandKind::Timeout,
            aliases: &["to"],
            syntax: "/timeout <user> [seconds]",
            description: "Mute a user and remove their recent messages.",
        },
        CommandInfo {
            kind: CommandKind::Delete,
            aliases: &[],
            syntax: "/delete <id>",
            description: "Delete the message with that id.",
        },
        CommandInfo {
            kind: CommandKind::Emotes,
            aliases: &["emote"],
            syntax: "/emotes [set id]",
            description: "Load an emote set. Leave blank to reload from config.",
        },
    ]
}

/// Format the help text. Moderator commands are listed only for moderators.
pub fn format_help(is_moderator: bool) -> String {
    let entry = |info: &CommandInfo| {
        let mut line = info.syntax.to_string();
        if !info.aliases.is_empty() {
            line.push_str(&format!(" (also /{})", info.aliases.join(", /")));
        }
        format!("{} : {}", line, info.description)
    };

    let help = command_help();
    let mut lines: Vec<String> = help
        .iter()
        .filter(|info| !info.kind.is_moderator_only())
        .map(entry)
        .collect();

    if is_moderator {
        lines.push(String::new());
        lines.push("--- Moderator Commands ---".to_string());
        lines.extend(
            help.iter()
                .filter(|info| info.kind.is_moderator_only())
                .map(entry),
        );
    }

    lines.join("\n")
}
