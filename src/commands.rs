use crate::navigation::ViewKind;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Identities whose kebab form must not be derived from their casing.
const NAME_OVERRIDES: &[(&str, &str)] = &[("PS", "ps"), ("ComposeLS", "compose-ls")];

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct KeyChord {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyChord {
    pub const fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    pub const fn plain(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::NONE)
    }

    pub const fn char(c: char) -> Self {
        Self::plain(KeyCode::Char(c))
    }

    pub const fn ctrl(c: char) -> Self {
        Self::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    /// Shift is folded into the character itself, so `G` arrives as `G`
    /// regardless of whether the terminal reports SHIFT.
    pub fn from_event(event: &KeyEvent) -> Self {
        let modifiers = event.modifiers & (KeyModifiers::CONTROL | KeyModifiers::ALT);
        let code = match event.code {
            KeyCode::Char(c) if modifiers.contains(KeyModifiers::CONTROL) => {
                KeyCode::Char(c.to_ascii_lowercase())
            }
            other => other,
        };
        Self { code, modifiers }
    }

    pub fn label(&self) -> String {
        let key = match self.code {
            KeyCode::Char(' ') => "Space".to_string(),
            KeyCode::Char(c) => c.to_string(),
            KeyCode::Enter => "Enter".to_string(),
            KeyCode::Esc => "Esc".to_string(),
            KeyCode::Up => "Up".to_string(),
            KeyCode::Down => "Down".to_string(),
            KeyCode::Left => "Left".to_string(),
            KeyCode::Right => "Right".to_string(),
            KeyCode::Home => "Home".to_string(),
            KeyCode::End => "End".to_string(),
            KeyCode::PageUp => "PgUp".to_string(),
            KeyCode::PageDown => "PgDn".to_string(),
            KeyCode::Backspace => "Backspace".to_string(),
            KeyCode::Tab => "Tab".to_string(),
            KeyCode::F(n) => format!("F{n}"),
            other => format!("{other:?}"),
        };
        let mut label = String::new();
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            label.push_str("Ctrl-");
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            label.push_str("Alt-");
        }
        label.push_str(&key);
        label
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Scope {
    Global,
    View(ViewKind),
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::View(view) => write!(f, "{view}"),
        }
    }
}

/// Static declaration of one command. `identity` is the declared handler
/// name the canonical `:name` is derived from.
#[derive(Debug, Clone)]
pub struct CommandSpec<H> {
    pub identity: &'static str,
    pub scope: Scope,
    pub keys: &'static [KeyChord],
    pub description: &'static str,
    pub handler: H,
}

#[derive(Debug, Clone)]
pub struct Command<H> {
    pub name: String,
    pub identity: &'static str,
    pub scope: Scope,
    pub keys: &'static [KeyChord],
    pub description: &'static str,
    pub handler: H,
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("command name '{name}' registered twice in {scope} scope")]
    DuplicateName { name: String, scope: Scope },
    #[error("key '{key}' bound twice in {scope} scope")]
    DuplicateKey { key: String, scope: Scope },
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ResolveError {
    #[error("unknown command: {name}")]
    Unknown { name: String },
    #[error("{name} is not available in {view}")]
    NotAvailable { name: String, view: ViewKind },
}

#[derive(Debug, Clone)]
pub struct CommandRegistry<H> {
    commands: Vec<Command<H>>,
    keys: HashMap<(Scope, KeyChord), usize>,
    names: HashMap<ViewKind, HashMap<String, usize>>,
}

impl<H> CommandRegistry<H> {
    /// Computes every canonical name once and builds the key and name maps.
    /// Global names are merged into each view's name map; a view command
    /// with the same name takes precedence.
    pub fn build(specs: impl IntoIterator<Item = CommandSpec<H>>) -> Result<Self, RegistryError> {
        let mut commands = Vec::new();
        let mut keys = HashMap::new();
        let mut scoped_names: HashMap<Scope, HashMap<String, usize>> = HashMap::new();

        for spec in specs {
            let index = commands.len();
            let name = canonical_name(spec.identity);

            let names = scoped_names.entry(spec.scope).or_default();
            if names.insert(name.clone(), index).is_some() {
                return Err(RegistryError::DuplicateName {
                    name,
                    scope: spec.scope,
                });
            }
            for key in spec.keys {
                if keys.insert((spec.scope, *key), index).is_some() {
                    return Err(RegistryError::DuplicateKey {
                        key: key.label(),
                        scope: spec.scope,
                    });
                }
            }

            commands.push(Command {
                name,
                identity: spec.identity,
                scope: spec.scope,
                keys: spec.keys,
                description: spec.description,
                handler: spec.handler,
            });
        }

        let globals = scoped_names.get(&Scope::Global).cloned().unwrap_or_default();
        let names = ViewKind::ALL
            .into_iter()
            .map(|view| {
                let mut merged = globals.clone();
                if let Some(own) = scoped_names.get(&Scope::View(view)) {
                    merged.extend(own.iter().map(|(name, index)| (name.clone(), *index)));
                }
                (view, merged)
            })
            .collect();

        Ok(Self {
            commands,
            keys,
            names,
        })
    }

    pub fn resolve_key(&self, view: ViewKind, chord: KeyChord) -> Option<&Command<H>> {
        self.keys
            .get(&(Scope::View(view), chord))
            .or_else(|| self.keys.get(&(Scope::Global, chord)))
            .and_then(|index| self.commands.get(*index))
    }

    pub fn resolve_name(&self, view: ViewKind, name: &str) -> Result<&Command<H>, ResolveError> {
        if let Some(command) = self
            .names
            .get(&view)
            .and_then(|names| names.get(name))
            .and_then(|index| self.commands.get(*index))
        {
            return Ok(command);
        }

        if self.commands.iter().any(|command| command.name == name) {
            Err(ResolveError::NotAvailable {
                name: name.to_string(),
                view,
            })
        } else {
            Err(ResolveError::Unknown {
                name: name.to_string(),
            })
        }
    }

    /// Everything reachable from `view`, view commands first, sorted by name.
    pub fn commands_for(&self, view: ViewKind) -> Vec<&Command<H>> {
        let mut visible = self
            .names
            .get(&view)
            .map(|names| {
                names
                    .values()
                    .filter_map(|index| self.commands.get(*index))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        visible.sort_by(|left, right| {
            (left.scope == Scope::Global)
                .cmp(&(right.scope == Scope::Global))
                .then_with(|| left.name.cmp(&right.name))
        });
        visible
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|command| command.name.as_str())
    }
}

/// What the text after `:` asks for.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CommandLine {
    Empty,
    Quit,
    ForceQuit,
    Help,
    /// Anything after the name is ignored.
    Named { name: String },
}

impl CommandLine {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix(':').unwrap_or(trimmed).trim();
        let Some(head) = trimmed.split_whitespace().next() else {
            return Self::Empty;
        };
        match head {
            "q" | "quit" => Self::Quit,
            "q!" | "quit!" => Self::ForceQuit,
            "h" | "help" => Self::Help,
            name => Self::Named {
                name: name.to_ascii_lowercase(),
            },
        }
    }
}

pub fn canonical_name(identity: &str) -> String {
    if let Some((_, name)) = NAME_OVERRIDES.iter().find(|(declared, _)| *declared == identity) {
        return (*name).to_string();
    }
    kebab_case(identity)
}

/// `ToggleFollow` → `toggle-follow`; runs of capitals stay one word, so
/// `HTTPServer` → `http-server`.
fn kebab_case(identity: &str) -> String {
    let chars = identity.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(identity.len() + 4);
    for (index, c) in chars.iter().copied().enumerate() {
        if matches!(c, '_' | '-' | ' ') {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }
        if c.is_uppercase() {
            let previous = index.checked_sub(1).and_then(|at| chars.get(at)).copied();
            let next = chars.get(index + 1).copied();
            let boundary = match previous {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
