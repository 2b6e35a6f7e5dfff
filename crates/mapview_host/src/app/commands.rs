use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HostCommand {
    GrandTour { area: Option<String> },
    Snap,
    Goto { scene: String },
    Cancel,
    Status,
    Rooms { area: Option<String> },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandParseError {
    pub(crate) reason: String,
    pub(crate) usage: String,
}

impl CommandParseError {
    fn new(reason: impl Into<String>, usage: &str) -> Self {
        Self {
            reason: reason.into(),
            usage: usage.to_string(),
        }
    }
}

type ParseFn = fn(&[String]) -> Result<HostCommand, CommandParseError>;

struct CommandSpec {
    name: &'static str,
    help: &'static str,
    arg_schema: &'static str,
    parse: ParseFn,
}

const BUILTIN_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "grand_tour",
        help: "Capture every scene that has no exported tile yet",
        arg_schema: "[area]",
        parse: parse_grand_tour,
    },
    CommandSpec {
        name: "snap",
        help: "Capture the active scene",
        arg_schema: "",
        parse: parse_snap,
    },
    CommandSpec {
        name: "goto",
        help: "Load a scene as the player would",
        arg_schema: "<scene_id>",
        parse: parse_goto,
    },
    CommandSpec {
        name: "cancel",
        help: "Stop the running tour at the next scene boundary",
        arg_schema: "",
        parse: parse_cancel,
    },
    CommandSpec {
        name: "status",
        help: "Show capture progress",
        arg_schema: "",
        parse: parse_status,
    },
    CommandSpec {
        name: "rooms",
        help: "List rooms known to the room registry",
        arg_schema: "[area]",
        parse: parse_rooms,
    },
    CommandSpec {
        name: "help",
        help: "List commands",
        arg_schema: "",
        parse: parse_help,
    },
    CommandSpec {
        name: "quit",
        help: "Stop any capture and exit",
        arg_schema: "",
        parse: parse_quit,
    },
];

pub(crate) struct CommandRegistry {
    specs: &'static [CommandSpec],
    lookup_by_lower_name: HashMap<String, usize>,
}

impl CommandRegistry {
    pub(crate) fn with_host_builtins() -> Self {
        let lookup_by_lower_name = BUILTIN_COMMANDS
            .iter()
            .enumerate()
            .map(|(index, spec)| (spec.name.to_ascii_lowercase(), index))
            .collect();
        Self {
            specs: BUILTIN_COMMANDS,
            lookup_by_lower_name,
        }
    }

    fn lookup(&self, input_name: &str) -> Option<&CommandSpec> {
        let index = self
            .lookup_by_lower_name
            .get(&input_name.to_ascii_lowercase())?;
        self.specs.get(*index)
    }

    /// `(name, help, arg_schema)` in registration order.
    pub(crate) fn iter_specs_in_order(
        &self,
    ) -> impl Iterator<Item = (&'static str, &'static str, &'static str)> + '_ {
        self.specs
            .iter()
            .map(|spec| (spec.name, spec.help, spec.arg_schema))
    }

    pub(crate) fn help_lines(&self) -> Vec<String> {
        self.iter_specs_in_order()
            .map(|(name, help, arg_schema)| {
                if arg_schema.is_empty() {
                    format!("{name} - {help}")
                } else {
                    format!("{name} {arg_schema} - {help}")
                }
            })
            .collect()
    }

    /// `Ok(None)` for blank lines.
    pub(crate) fn parse_line(&self, raw_line: &str) -> Result<Option<HostCommand>, String> {
        let tokens = tokenize_line(raw_line.trim())?;
        let Some((command_name, args)) = tokens.split_first() else {
            return Ok(None);
        };
        let Some(spec) = self.lookup(command_name) else {
            return Err(format!("unknown command '{command_name}'. try: help"));
        };
        (spec.parse)(args)
            .map(Some)
            .map_err(|error| format!("{}. usage: {}", error.reason, error.usage))
    }
}

fn tokenize_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            _ => {
                current.push(ch);
                has_token = true;
            }
        }
    }

    if in_quotes {
        return Err("unterminated quoted string".to_string());
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_grand_tour(args: &[String]) -> Result<HostCommand, CommandParseError> {
    optional_single_arg(args, "grand_tour [area]")
        .map(|area| HostCommand::GrandTour { area })
}

fn parse_snap(args: &[String]) -> Result<HostCommand, CommandParseError> {
    require_no_args(args, "snap")?;
    Ok(HostCommand::Snap)
}

fn parse_goto(args: &[String]) -> Result<HostCommand, CommandParseError> {
    match args {
        [scene] => Ok(HostCommand::Goto {
            scene: scene.clone(),
        }),
        _ => Err(CommandParseError::new(
            "expected exactly one argument <scene_id>",
            "goto <scene_id>",
        )),
    }
}

fn parse_cancel(args: &[String]) -> Result<HostCommand, CommandParseError> {
    require_no_args(args, "cancel")?;
    Ok(HostCommand::Cancel)
}

fn parse_status(args: &[String]) -> Result<HostCommand, CommandParseError> {
    require_no_args(args, "status")?;
    Ok(HostCommand::Status)
}

fn parse_rooms(args: &[String]) -> Result<HostCommand, CommandParseError> {
    optional_single_arg(args, "rooms [area]").map(|area| HostCommand::Rooms { area })
}

fn parse_help(args: &[String]) -> Result<HostCommand, CommandParseError> {
    require_no_args(args, "help")?;
    Ok(HostCommand::Help)
}

fn parse_quit(args: &[String]) -> Result<HostCommand, CommandParseError> {
    require_no_args(args, "quit")?;
    Ok(HostCommand::Quit)
}

fn optional_single_arg(args: &[String], usage: &str) -> Result<Option<String>, CommandParseError> {
    match args {
        [] => Ok(None),
        [value] => Ok(Some(value.clone())),
        _ => Err(CommandParseError::new("expected at most one argument", usage)),
    }
}

fn require_no_args(args: &[String], usage: &str) -> Result<(), CommandParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(CommandParseError::new("command takes no arguments", usage))
    }
}
