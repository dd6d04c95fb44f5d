//! Hover help for Prolog source tokens.
//!
//! Maps a token classification, plus whatever the highlighter learned about
//! the token, to a short description. `None` means no tooltip at all.

use std::collections::HashMap;

/// Token classes produced by the editor's highlighter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenType {
    GoalBuiltIn,
    GoalGlobal,
    GoalAutoload,
    GoalImported,
    GoalRecursion,
    GoalLocal,
    GoalDynamic,
    GoalUndefined,
    HeadUnreferenced,
    File,
    FileNoDepends,
    Error,
    Singleton,
    Codes,
    Chars,
    String,
    QAtom,
    Tag,
    Head,
    Control,
    Fullstop,
    Var,
    Int,
    Float,
    Number,
    Atom,
    Functor,
    Comment,
    Neck,
    Operator,
    Sep,
    ListOpen,
    ListClose,
    DictOpen,
    DictClose,
    Other(std::string::String),
}

impl TokenType {
    pub fn parse(name: &str) -> Self {
        match name {
            "goal_built_in" => TokenType::GoalBuiltIn,
            "goal_global" => TokenType::GoalGlobal,
            "goal_autoload" => TokenType::GoalAutoload,
            "goal_imported" => TokenType::GoalImported,
            "goal_recursion" => TokenType::GoalRecursion,
            "goal_local" => TokenType::GoalLocal,
            "goal_dynamic" => TokenType::GoalDynamic,
            "goal_undefined" => TokenType::GoalUndefined,
            "head_unreferenced" => TokenType::HeadUnreferenced,
            "file" => TokenType::File,
            "file_no_depends" => TokenType::FileNoDepends,
            "error" => TokenType::Error,
            "singleton" => TokenType::Singleton,
            "codes" => TokenType::Codes,
            "chars" => TokenType::Chars,
            "string" => TokenType::String,
            "qatom" => TokenType::QAtom,
            "tag" => TokenType::Tag,
            "head" => TokenType::Head,
            "control" => TokenType::Control,
            "fullstop" => TokenType::Fullstop,
            "var" => TokenType::Var,
            "int" => TokenType::Int,
            "float" => TokenType::Float,
            "number" => TokenType::Number,
            "atom" => TokenType::Atom,
            "functor" => TokenType::Functor,
            "comment" => TokenType::Comment,
            "neck" => TokenType::Neck,
            "operator" => TokenType::Operator,
            "sep" => TokenType::Sep,
            "list_open" => TokenType::ListOpen,
            "list_close" => TokenType::ListClose,
            "dict_open" => TokenType::DictOpen,
            "dict_close" => TokenType::DictClose,
            other => TokenType::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TokenType::GoalBuiltIn => "goal_built_in",
            TokenType::GoalGlobal => "goal_global",
            TokenType::GoalAutoload => "goal_autoload",
            TokenType::GoalImported => "goal_imported",
            TokenType::GoalRecursion => "goal_recursion",
            TokenType::GoalLocal => "goal_local",
            TokenType::GoalDynamic => "goal_dynamic",
            TokenType::GoalUndefined => "goal_undefined",
            TokenType::HeadUnreferenced => "head_unreferenced",
            TokenType::File => "file",
            TokenType::FileNoDepends => "file_no_depends",
            TokenType::Error => "error",
            TokenType::Singleton => "singleton",
            TokenType::Codes => "codes",
            TokenType::Chars => "chars",
            TokenType::String => "string",
            TokenType::QAtom => "qatom",
            TokenType::Tag => "tag",
            TokenType::Head => "head",
            TokenType::Control => "control",
            TokenType::Fullstop => "fullstop",
            TokenType::Var => "var",
            TokenType::Int => "int",
            TokenType::Float => "float",
            TokenType::Number => "number",
            TokenType::Atom => "atom",
            TokenType::Functor => "functor",
            TokenType::Comment => "comment",
            TokenType::Neck => "neck",
            TokenType::Operator => "operator",
            TokenType::Sep => "sep",
            TokenType::ListOpen => "list_open",
            TokenType::ListClose => "list_close",
            TokenType::DictOpen => "dict_open",
            TokenType::DictClose => "dict_close",
            TokenType::Other(name) => name,
        }
    }
}

/// Extra knowledge about a token, as far as the highlighter has it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichedToken {
    pub text: String,
    pub arity: Option<u32>,
    /// File a predicate is imported or autoloaded from
    pub file: Option<String>,
    /// Resolved path of a file token
    pub path: Option<String>,
    /// What the parser expected at a syntax error
    pub expected: Option<String>,
    pub summary: Option<String>,
    pub info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Plain(String),
    /// `name/arity`
    PredName(String),
    FilePath(String),
    Strong(String),
    Remark(String),
    /// Placeholder for predicate documentation fetched by the editor.
    TokenInfo(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverContent {
    pub segments: Vec<Segment>,
}

impl HoverContent {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Plain(text.into())],
        }
    }

    pub fn to_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Plain(t)
                | Segment::PredName(t)
                | Segment::FilePath(t)
                | Segment::Strong(t)
                | Segment::TokenInfo(t) => t.clone(),
                Segment::Remark(t) => format!(" ({t})"),
            })
            .collect()
    }
}

/// Display names learned for file paths, e.g. `library(lists)` for the
/// absolute path of `lists.pl`.
#[derive(Debug, Default)]
pub struct PathTranslations {
    names: HashMap<String, String>,
}

impl PathTranslations {
    pub fn add(&mut self, path: &str, text: &str) {
        self.names.insert(path.to_string(), text.to_string());
    }

    /// The learned name for `file`, else its last path segment.
    pub fn display_name<'a>(&'a self, file: &'a str) -> &'a str {
        if let Some(name) = self.names.get(file) {
            return name;
        }
        match file.rfind('/') {
            Some(0) | None => file,
            Some(i) => &file[i + 1..],
        }
    }
}

#[derive(Debug, Default)]
pub struct HoverProvider {
    paths: PathTranslations,
}

impl HoverProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> &PathTranslations {
        &self.paths
    }

    pub fn lookup(
        &mut self,
        token: &TokenType,
        enriched: Option<&EnrichedToken>,
    ) -> Option<HoverContent> {
        use TokenType::*;

        let fixed = match token {
            GoalRecursion => "Recursive call",
            GoalLocal => "Locally defined predicate",
            GoalDynamic => "Dynamic predicate",
            GoalUndefined => "Undefined predicate",
            HeadUnreferenced => "Predicate is not called",
            Singleton => "Variable appearing only once",
            Codes => "List of Unicode code points (integers)",
            Chars => "List of one-character atoms",
            String => "Packed string (SWI7, use `text` for a list of codes)",
            QAtom => "Quoted atom",
            Tag => "Tag of a SWI7 dict",
            Head | Control | Fullstop | Var | Int | Float | Number | Atom | Functor | Comment
            | Neck | Operator | Sep | ListOpen | ListClose | DictOpen | DictClose => return None,
            GoalBuiltIn => return Some(self.goal(enriched, "Built-in predicate", None)),
            GoalGlobal => return Some(self.goal(enriched, "Global predicate", None)),
            GoalAutoload => {
                return Some(self.goal(enriched, "Autoloaded predicate", Some("autoload from")))
            }
            GoalImported => {
                return Some(self.goal(enriched, "Imported predicate", Some("imported from")))
            }
            File => return Some(self.file(enriched, false)),
            FileNoDepends => return Some(self.file(enriched, true)),
            Error => {
                return Some(match enriched.and_then(|e| e.expected.as_deref()) {
                    Some(expected) => HoverContent {
                        segments: vec![
                            Segment::Plain("error: ".into()),
                            Segment::Strong(expected.into()),
                            Segment::Plain(" expected".into()),
                        ],
                    },
                    None => HoverContent::plain("error"),
                })
            }
            Other(name) => return Some(fallback(name, enriched)),
        };
        Some(HoverContent::plain(fixed))
    }

    fn goal(
        &self,
        enriched: Option<&EnrichedToken>,
        generic: &str,
        origin: Option<&str>,
    ) -> HoverContent {
        let Some(data) = enriched else {
            return HoverContent::plain(generic);
        };
        let mut segments = vec![Segment::PredName(pred_name(data))];
        if let Some(origin) = origin {
            let file = data.file.as_deref().unwrap_or_default();
            segments.push(Segment::Plain(format!(" ({origin} ")));
            segments.push(Segment::Plain(self.paths.display_name(file).to_string()));
            segments.push(Segment::Plain("): ".into()));
        }
        segments.push(Segment::TokenInfo(token_info(data)));
        HoverContent { segments }
    }

    fn file(&mut self, enriched: Option<&EnrichedToken>, no_depends: bool) -> HoverContent {
        let Some(path) = enriched.and_then(|e| e.path.as_deref().map(|p| (e, p))) else {
            return HoverContent::plain(if no_depends {
                "File name (does not resolve any dependencies)"
            } else {
                "File name"
            });
        };
        let (data, path) = path;
        self.paths.add(path, &data.text);
        let mut segments = vec![
            Segment::Plain("File: ".into()),
            Segment::FilePath(path.to_string()),
        ];
        if no_depends {
            segments.push(Segment::Remark("does not resolve any dependencies".into()));
        }
        HoverContent { segments }
    }
}

fn pred_name(data: &EnrichedToken) -> String {
    format!("{}/{}", data.text, data.arity.unwrap_or(0))
}

fn token_info(data: &EnrichedToken) -> String {
    data.summary.clone().unwrap_or_default()
}

fn fallback(name: &str, enriched: Option<&EnrichedToken>) -> HoverContent {
    match enriched.and_then(|e| e.summary.as_deref().map(|s| (e, s))) {
        Some((e, summary)) if e.info.as_deref() == Some("ask") => HoverContent {
            segments: vec![
                Segment::Plain(summary.to_string()),
                Segment::TokenInfo(token_info(e)),
            ],
        },
        Some((_, summary)) => HoverContent::plain(summary),
        None => HoverContent::plain(name),
    }
}

/// A classified span of goal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    pub kind: TokenType,
    pub enriched: Option<EnrichedToken>,
}

const BUILT_INS: &[&str] = &[
    "true", "fail", "false", "is", "member", "memberchk", "append", "length", "between", "nth0",
    "nth1", "msort", "sort", "findall", "forall", "aggregate_all", "format", "write", "writeln",
    "print", "nl", "read", "read_term", "atom_length", "atom_codes", "atom_chars", "sub_atom",
    "succ", "plus", "number_codes", "functor", "arg", "copy_term", "assert", "asserta",
    "assertz", "retract", "call", "not", "once", "ignore", "catch", "throw", "halt",
];

/// Classify goal text well enough to drive hover help in a line editor.
pub fn classify(goal: &str) -> Vec<Token> {
    let chars: Vec<(usize, char)> = goal.char_indices().collect();
    let end_of = |i: usize| chars.get(i).map_or(goal.len(), |(b, _)| *b);
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (start, c) = chars[i];
        let mut j = i + 1;
        let kind = if c.is_whitespace() {
            i += 1;
            continue;
        } else if c.is_ascii_uppercase() || c == '_' {
            while j < chars.len() && (chars[j].1.is_alphanumeric() || chars[j].1 == '_') {
                j += 1;
            }
            TokenType::Var
        } else if c.is_ascii_digit() {
            while j < chars.len() && chars[j].1.is_ascii_digit() {
                j += 1;
            }
            let fraction = j + 1 < chars.len() && chars[j].1 == '.' && chars[j + 1].1.is_ascii_digit();
            if fraction {
                j += 1;
                while j < chars.len() && chars[j].1.is_ascii_digit() {
                    j += 1;
                }
                TokenType::Float
            } else {
                TokenType::Int
            }
        } else if c.is_alphabetic() {
            while j < chars.len() && (chars[j].1.is_alphanumeric() || chars[j].1 == '_') {
                j += 1;
            }
            let name = &goal[start..end_of(j)];
            let call = chars.get(j).is_some_and(|(_, c)| *c == '(');
            if call || BUILT_INS.contains(&name) {
                TokenType::Functor
            } else {
                TokenType::Atom
            }
        } else if c == '"' || c == '\'' || c == '`' {
            while j < chars.len() && chars[j].1 != c {
                j += 1;
            }
            let closed = j < chars.len();
            if closed {
                j += 1;
            }
            match (c, closed) {
                (_, false) => TokenType::Error,
                ('"', _) => TokenType::String,
                ('\'', _) => TokenType::QAtom,
                _ => TokenType::Codes,
            }
        } else {
            match c {
                ',' | '|' => TokenType::Sep,
                '(' | ')' => TokenType::Control,
                '[' => TokenType::ListOpen,
                ']' => TokenType::ListClose,
                '{' => TokenType::DictOpen,
                '}' => TokenType::DictClose,
                '.' if j == chars.len() => TokenType::Fullstop,
                '%' => {
                    j = chars.len();
                    TokenType::Comment
                }
                _ => {
                    while j < chars.len() && is_symbol_char(chars[j].1) {
                        j += 1;
                    }
                    TokenType::Operator
                }
            }
        };
        tokens.push(Token {
            start,
            end: end_of(j),
            kind,
            enriched: None,
        });
        i = j;
    }

    resolve_goals(goal, &mut tokens);
    mark_singletons(goal, &mut tokens);
    tokens
}

fn is_symbol_char(c: char) -> bool {
    "+-*/\\^<>=~:.?@#&$".contains(c)
}

/// Turn functors into goals with their arity, built-ins marked as such.
fn resolve_goals(goal: &str, tokens: &mut [Token]) {
    for idx in 0..tokens.len() {
        if tokens[idx].kind != TokenType::Functor {
            continue;
        }
        let text = goal[tokens[idx].start..tokens[idx].end].to_string();
        let arity = arity_at(goal, tokens, idx);
        tokens[idx].kind = if BUILT_INS.contains(&text.as_str()) {
            TokenType::GoalBuiltIn
        } else {
            TokenType::GoalUndefined
        };
        tokens[idx].enriched = Some(EnrichedToken {
            text,
            arity: Some(arity),
            ..Default::default()
        });
    }
}

/// Count top-level arguments of the compound starting at `idx`.
fn arity_at(goal: &str, tokens: &[Token], idx: usize) -> u32 {
    let opens = |t: &Token| &goal[t.start..t.end] == "(" || t.kind == TokenType::ListOpen;
    let closes = |t: &Token| &goal[t.start..t.end] == ")" || t.kind == TokenType::ListClose;
    match tokens.get(idx + 1) {
        Some(t) if t.start == tokens[idx].end && &goal[t.start..t.end] == "(" => {}
        _ => return 0,
    }
    let mut depth = 0usize;
    let mut arity = 1;
    for t in &tokens[idx + 1..] {
        if opens(t) {
            depth += 1;
        } else if closes(t) {
            depth -= 1;
            if depth == 0 {
                break;
            }
        } else if depth == 1 && &goal[t.start..t.end] == "," {
            arity += 1;
        }
    }
    arity
}

fn mark_singletons(goal: &str, tokens: &mut [Token]) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for t in tokens.iter().filter(|t| t.kind == TokenType::Var) {
        *counts.entry(&goal[t.start..t.end]).or_default() += 1;
    }
    for t in tokens.iter_mut().filter(|t| t.kind == TokenType::Var) {
        let name = &goal[t.start..t.end];
        if !name.starts_with('_') && counts.get(name) == Some(&1) {
            t.kind = TokenType::Singleton;
        }
    }
}

/// Token covering byte offset `pos`, if any.
pub fn token_at(tokens: &[Token], pos: usize) -> Option<&Token> {
    tokens.iter().find(|t| t.start <= pos && pos < t.end)
}
