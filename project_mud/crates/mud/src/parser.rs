use std::fmt;

use registry::EntityId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Attack,
    Skill,
    Flee,
    Take,
    Drop,
    Go,
    Look,
    Inventory,
    Status,
    Say,
    Who,
    Quit,
    Help,
    Save,
    Delete,
    Edit,
    Rename,
}

impl Verb {
    pub fn from_word(word: &str) -> Option<Verb> {
        let verb = match word {
            "attack" | "kill" | "k" | "공격" => Verb::Attack,
            "skill" | "special" | "기술" => Verb::Skill,
            "flee" | "run" | "도망" => Verb::Flee,
            "take" | "get" | "pick" | "줍기" => Verb::Take,
            "drop" | "버리기" => Verb::Drop,
            "go" | "move" | "walk" | "이동" => Verb::Go,
            "look" | "l" | "보기" | "\u{3142}" => Verb::Look,
            "inventory" | "inv" | "i" | "가방" | "인벤" => Verb::Inventory,
            "status" | "score" | "st" | "상태" => Verb::Status,
            "say" | "'" | "말" => Verb::Say,
            "who" | "접속자" => Verb::Who,
            "quit" | "exit" | "종료" => Verb::Quit,
            "help" | "?" | "도움말" => Verb::Help,
            "save" | "저장" => Verb::Save,
            "delete" | "purge" | "삭제" => Verb::Delete,
            "edit" | "편집" => Verb::Edit,
            "rename" | "이름" => Verb::Rename,
            _ => return None,
        };
        Some(verb)
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Verb::Save | Verb::Delete | Verb::Edit | Verb::Rename)
    }

    pub fn needs_edit_mode(self) -> bool {
        matches!(self, Verb::Delete | Verb::Rename)
    }

    fn target_rule(self) -> TargetRule {
        use LexKind::*;
        match self {
            Verb::Attack => TargetRule::Required(Scope::Area, &[Creature, Player]),
            Verb::Skill => TargetRule::Optional(Scope::Area, &[Creature, Player]),
            Verb::Take => TargetRule::Required(Scope::Area, &[Item]),
            Verb::Drop => TargetRule::Required(Scope::Carried, &[Item]),
            Verb::Go => TargetRule::Required(Scope::Area, &[Exit]),
            Verb::Look => TargetRule::Optional(Scope::Both, &[Creature, Player, Item, Other]),
            Verb::Delete => TargetRule::Required(Scope::Both, &[Creature, Item, Other]),
            Verb::Rename => TargetRule::Named(Scope::Both, &[Creature, Player, Item, Other]),
            Verb::Say => TargetRule::Text,
            Verb::Flee
            | Verb::Inventory
            | Verb::Status
            | Verb::Who
            | Verb::Quit
            | Verb::Help
            | Verb::Save
            | Verb::Edit => TargetRule::None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::Attack => "attack",
            Verb::Skill => "skill",
            Verb::Flee => "flee",
            Verb::Take => "take",
            Verb::Drop => "drop",
            Verb::Go => "go",
            Verb::Look => "look",
            Verb::Inventory => "inventory",
            Verb::Status => "status",
            Verb::Say => "say",
            Verb::Who => "who",
            Verb::Quit => "quit",
            Verb::Help => "help",
            Verb::Save => "save",
            Verb::Delete => "delete",
            Verb::Edit => "edit",
            Verb::Rename => "rename",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// What the player carries.
    Carried,
    /// What is in the player's area, exits included.
    Area,
    Both,
}

#[derive(Debug, Clone, Copy)]
enum TargetRule {
    None,
    Text,
    Required(Scope, &'static [LexKind]),
    Optional(Scope, &'static [LexKind]),
    /// Target word followed by free text.
    Named(Scope, &'static [LexKind]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LexKind {
    Creature,
    Player,
    Item,
    Exit,
    Other,
}

/// One nameable thing the parser may resolve a noun to. For exits `id` is
/// the destination area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconEntry {
    pub id: EntityId,
    pub name: String,
    pub keywords: Vec<String>,
    pub kind: LexKind,
}

impl LexiconEntry {
    pub fn new(id: EntityId, name: impl Into<String>, keywords: Vec<String>, kind: LexKind) -> Self {
        Self {
            id,
            name: name.into(),
            keywords,
            kind,
        }
    }

    fn exact(&self, word: &str) -> bool {
        self.name.to_lowercase() == word || self.keywords.iter().any(|k| k.to_lowercase() == word)
    }

    fn prefix(&self, word: &str) -> bool {
        self.name.to_lowercase().starts_with(word) || self.keywords.iter().any(|k| k.to_lowercase().starts_with(word))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Valid,
    InvalidVerb,
    InvalidTarget,
    MissingTarget,
    UnavailableAdminOnly,
    UnavailableEditModeOnly,
}

impl ParseStatus {
    pub fn is_valid(self) -> bool {
        self == ParseStatus::Valid
    }

    /// Canned reply for a rejected command.
    pub fn message(self, verb: Option<Verb>, word: &str) -> String {
        match self {
            ParseStatus::Valid => String::new(),
            ParseStatus::InvalidVerb => format!("Unknown command: {}. Type 'help' for a list.", word),
            ParseStatus::InvalidTarget => format!("You don't see '{}' here.", word),
            ParseStatus::MissingTarget => match verb {
                Some(Verb::Say) => "Say what?".to_string(),
                Some(Verb::Rename) => "Rename what to what?".to_string(),
                Some(v) => format!("What do you want to {}?", v),
                None => "What?".to_string(),
            },
            ParseStatus::UnavailableAdminOnly => "Only administrators can do that.".to_string(),
            ParseStatus::UnavailableEditModeOnly => "You must be in edit mode to do that.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub status: ParseStatus,
    pub verb: Option<Verb>,
    pub direct: Option<EntityId>,
    pub indirect: Option<EntityId>,
    /// Free text for `say`/`rename`, or the offending word on rejection.
    pub text: String,
}

impl ParseResult {
    fn valid(verb: Verb) -> Self {
        Self {
            status: ParseStatus::Valid,
            verb: Some(verb),
            direct: None,
            indirect: None,
            text: String::new(),
        }
    }

    fn reject(status: ParseStatus, verb: Option<Verb>, word: impl Into<String>) -> Self {
        Self {
            status,
            verb,
            direct: None,
            indirect: None,
            text: word.into(),
        }
    }

    pub fn rejection_message(&self) -> String {
        self.status.message(self.verb, &self.text)
    }
}

/// Turns a line of player text into zero, one, or many interpretations.
/// Several results mean the noun was ambiguous.
pub trait CommandParser: Send + Sync {
    fn parse(
        &self,
        text: &str,
        player_lexicon: &[LexiconEntry],
        area_lexicon: &[LexiconEntry],
        is_admin: bool,
        edit_mode: bool,
    ) -> Vec<ParseResult>;
}

/// Verb alias table plus prefix matching of nouns on names and keywords.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordParser;

impl KeywordParser {
    fn resolve(
        word: &str,
        scope: Scope,
        kinds: &[LexKind],
        player_lexicon: &[LexiconEntry],
        area_lexicon: &[LexiconEntry],
    ) -> Vec<EntityId> {
        let pool: Vec<&LexiconEntry> = match scope {
            Scope::Carried => player_lexicon.iter().collect(),
            Scope::Area => area_lexicon.iter().collect(),
            Scope::Both => player_lexicon.iter().chain(area_lexicon.iter()).collect(),
        };
        let pool: Vec<&LexiconEntry> = pool.into_iter().filter(|e| kinds.contains(&e.kind)).collect();

        // An exact hit beats any number of prefix hits.
        let exact: Vec<EntityId> = pool.iter().filter(|e| e.exact(word)).map(|e| e.id).collect();
        let mut ids = if exact.is_empty() {
            pool.iter().filter(|e| e.prefix(word)).map(|e| e.id).collect()
        } else {
            exact
        };
        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| seen.insert(*id));
        ids
    }

    fn with_targets(verb: Verb, word: &str, ids: Vec<EntityId>, text: String) -> Vec<ParseResult> {
        if ids.is_empty() {
            return vec![ParseResult::reject(ParseStatus::InvalidTarget, Some(verb), word)];
        }
        ids.into_iter()
            .map(|id| ParseResult {
                direct: Some(id),
                text: text.clone(),
                ..ParseResult::valid(verb)
            })
            .collect()
    }
}

impl CommandParser for KeywordParser {
    fn parse(
        &self,
        text: &str,
        player_lexicon: &[LexiconEntry],
        area_lexicon: &[LexiconEntry],
        is_admin: bool,
        edit_mode: bool,
    ) -> Vec<ParseResult> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let word = parts.next().unwrap_or("").to_lowercase();
        let rest = parts.next().unwrap_or("").trim();

        let Some(verb) = Verb::from_word(&word) else {
            // A bare exit name walks through it.
            let exits = Self::resolve(&word, Scope::Area, &[LexKind::Exit], player_lexicon, area_lexicon);
            if rest.is_empty() && !exits.is_empty() {
                return Self::with_targets(Verb::Go, &word, exits, String::new());
            }
            return vec![ParseResult::reject(ParseStatus::InvalidVerb, None, word)];
        };

        if verb.is_admin() && !is_admin {
            return vec![ParseResult::reject(ParseStatus::UnavailableAdminOnly, Some(verb), word)];
        }
        if verb.needs_edit_mode() && !edit_mode {
            return vec![ParseResult::reject(ParseStatus::UnavailableEditModeOnly, Some(verb), word)];
        }

        match verb.target_rule() {
            TargetRule::None => vec![ParseResult::valid(verb)],
            TargetRule::Text => {
                if rest.is_empty() {
                    vec![ParseResult::reject(ParseStatus::MissingTarget, Some(verb), word)]
                } else {
                    vec![ParseResult {
                        text: rest.to_string(),
                        ..ParseResult::valid(verb)
                    }]
                }
            }
            TargetRule::Optional(_, _) if rest.is_empty() => vec![ParseResult::valid(verb)],
            TargetRule::Required(_, _) | TargetRule::Named(_, _) if rest.is_empty() => {
                vec![ParseResult::reject(ParseStatus::MissingTarget, Some(verb), word)]
            }
            TargetRule::Required(scope, kinds) | TargetRule::Optional(scope, kinds) => {
                let noun = rest.to_lowercase();
                let ids = Self::resolve(&noun, scope, kinds, player_lexicon, area_lexicon);
                Self::with_targets(verb, &noun, ids, String::new())
            }
            TargetRule::Named(scope, kinds) => {
                let mut parts = rest.splitn(2, char::is_whitespace);
                let noun = parts.next().unwrap_or("").to_lowercase();
                let new_name = parts.next().unwrap_or("").trim().to_string();
                if new_name.is_empty() {
                    return vec![ParseResult::reject(ParseStatus::MissingTarget, Some(verb), word)];
                }
                let ids = Self::resolve(&noun, scope, kinds, player_lexicon, area_lexicon);
                Self::with_targets(verb, &noun, ids, new_name)
            }
        }
    }
}
