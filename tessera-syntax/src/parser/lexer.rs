//! Lexer for Tessera source files
//!
//! Tokenizes the application-description language.
//!
//! Key features:
//! - Line oriented: a run of line breaks collapses into one `Newline` token
//! - Keywords win over identifiers of the same length
//! - `//` comments are skipped
//! - Code is captured verbatim: the rest of the line after `=` / `+=`
//!   becomes one `CodeLine`, and an indented block after a trailing
//!   `:` / `+:` becomes one `CodeBlock`
//! - Never fails: unknown characters become `Invalid` tokens

use logos::Logos;
use std::fmt;
use std::ops::Range;
use tessera_core::{LineIndex, ParserOptions, Span};

/// Token text, inline for the short words that dominate a source file
pub type TokenText = smartstring::alias::String;

/// Token kinds
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\f\r]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    // ============================================================
    // Structural
    // ============================================================
    #[token("\n")]
    Newline,

    #[token("#")]
    Hash,
    #[token("@")]
    At,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("/")]
    Slash,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("*")]
    Star,
    #[token("-")]
    Minus,

    // Field modifiers
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("^")]
    Caret,
    #[token("$")]
    Dollar,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("~")]
    Tilde,

    // Code markers
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("+:")]
    PlusColon,

    #[token("->")]
    Arrow,
    #[token("<-")]
    InheritReplace,
    #[token("<+")]
    InheritMerge,
    #[token("!!")]
    BangBang,

    // ============================================================
    // Keywords
    // ============================================================
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("as")]
    As,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Field types
    #[token("str")]
    Str,
    #[token("longtext")]
    LongText,
    #[token("html")]
    Html,
    #[token("richhtml")]
    RichHtml,
    #[token("int")]
    Int,
    #[token("float")]
    Float,
    #[token("decimal")]
    Decimal,
    #[token("date")]
    Date,
    #[token("datetime")]
    DateTime,
    #[token("created")]
    Created,
    #[token("updated")]
    Updated,
    #[token("file")]
    File,
    #[token("image")]
    Image,
    #[token("pdf")]
    Pdf,
    #[token("audio")]
    Audio,
    #[token("video")]
    Video,
    #[token("archive")]
    Archive,
    #[token("slug")]
    Slug,
    #[token("bool")]
    Bool,
    #[token("one")]
    One,
    #[token("onetoone")]
    OneToOne,
    #[token("many")]
    Many,

    // File annotations
    #[token("ci")]
    Ci,
    #[token("theme")]
    Theme,
    #[token("languages")]
    Languages,
    #[token("static")]
    Static,
    #[token("tasks")]
    Tasks,
    #[token("sockets")]
    Sockets,
    #[token("docker")]
    Docker,

    // Model annotations
    #[token("admin")]
    Admin,
    #[token("api")]
    Api,
    #[token("rest")]
    Rest,
    #[token("ordering")]
    Ordering,
    #[token("validate")]
    Validate,
    #[token("pre_save")]
    PreSave,
    #[token("post_save")]
    PostSave,
    #[token("pre_delete")]
    PreDelete,
    #[token("post_delete")]
    PostDelete,
    #[token("m2m_changed")]
    M2mChanged,
    #[token("tree")]
    Tree,
    #[token("date_hierarchy")]
    DateHierarchy,
    #[token("mixin")]
    Mixin,
    #[token("sortable")]
    Sortable,
    #[token("unique")]
    Unique,
    #[token("polymorphic")]
    Polymorphic,

    // Page annotations
    #[token("crud")]
    Crud,
    #[token("list")]
    List,
    #[token("detail")]
    Detail,
    #[token("create")]
    Create,
    #[token("edit")]
    Edit,
    #[token("delete")]
    Delete,
    #[token("stream")]
    Stream,
    #[token("react")]
    React,
    #[token("vue")]
    Vue,
    #[token("svelte")]
    Svelte,
    #[token("markdown")]
    Markdown,
    #[token("menu")]
    Menu,
    #[token("login")]
    Login,
    #[token("get")]
    Get,
    #[token("post")]
    Post,
    #[token("error")]
    ErrorPage,
    #[token("priority")]
    Priority,
    #[token("child")]
    Child,

    // Auth methods
    #[token("token")]
    Token,
    #[token("session")]
    Session,
    #[token("basic")]
    Basic,
    #[token("jwt")]
    Jwt,

    // List styles
    #[token("table")]
    Table,
    #[token("stacked")]
    Stacked,

    // ============================================================
    // Values
    // ============================================================
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[regex(r"[0-9]+")]
    IntLit,

    #[regex(r"[0-9]+\.[0-9]+")]
    FloatLit,

    /// Quoted string literal: "..."
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLit,

    /// Opening quote with no closing quote on the same line
    #[regex(r#""([^"\\\n]|\\.)*"#)]
    UnterminatedString,

    /// Help text: `...`
    #[regex(r"`[^`\n]*`")]
    HelpText,

    // ============================================================
    // Produced by the driver, never by the automaton
    // ============================================================
    CodeLine,
    CodeBlock,
    Invalid,
    Eof,
}

impl TokenKind {
    /// The exact text of punctuation and keyword tokens
    pub fn fixed_text(self) -> Option<&'static str> {
        use TokenKind::*;
        let text = match self {
            Newline | Ident | IntLit | FloatLit | StringLit | UnterminatedString | HelpText
            | CodeLine | CodeBlock | Invalid | Eof => return None,
            Hash => "#",
            At => "@",
            LBracket => "[",
            RBracket => "]",
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            Colon => ":",
            Comma => ",",
            Dot => ".",
            Slash => "/",
            Lt => "<",
            Gt => ">",
            Star => "*",
            Minus => "-",
            Bang => "!",
            Question => "?",
            Caret => "^",
            Dollar => "$",
            Percent => "%",
            Amp => "&",
            Tilde => "~",
            Eq => "=",
            PlusEq => "+=",
            PlusColon => "+:",
            Arrow => "->",
            InheritReplace => "<-",
            InheritMerge => "<+",
            BangBang => "!!",
            Import => "import",
            From => "from",
            As => "as",
            True => "true",
            False => "false",
            Str => "str",
            LongText => "longtext",
            Html => "html",
            RichHtml => "richhtml",
            Int => "int",
            Float => "float",
            Decimal => "decimal",
            Date => "date",
            DateTime => "datetime",
            Created => "created",
            Updated => "updated",
            File => "file",
            Image => "image",
            Pdf => "pdf",
            Audio => "audio",
            Video => "video",
            Archive => "archive",
            Slug => "slug",
            Bool => "bool",
            One => "one",
            OneToOne => "onetoone",
            Many => "many",
            Ci => "ci",
            Theme => "theme",
            Languages => "languages",
            Static => "static",
            Tasks => "tasks",
            Sockets => "sockets",
            Docker => "docker",
            Admin => "admin",
            Api => "api",
            Rest => "rest",
            Ordering => "ordering",
            Validate => "validate",
            PreSave => "pre_save",
            PostSave => "post_save",
            PreDelete => "pre_delete",
            PostDelete => "post_delete",
            M2mChanged => "m2m_changed",
            Tree => "tree",
            DateHierarchy => "date_hierarchy",
            Mixin => "mixin",
            Sortable => "sortable",
            Unique => "unique",
            Polymorphic => "polymorphic",
            Crud => "crud",
            List => "list",
            Detail => "detail",
            Create => "create",
            Edit => "edit",
            Delete => "delete",
            Stream => "stream",
            React => "react",
            Vue => "vue",
            Svelte => "svelte",
            Markdown => "markdown",
            Menu => "menu",
            Login => "login",
            Get => "get",
            Post => "post",
            ErrorPage => "error",
            Priority => "priority",
            Child => "child",
            Token => "token",
            Session => "session",
            Basic => "basic",
            Jwt => "jwt",
            Table => "table",
            Stacked => "stacked",
        };
        Some(text)
    }

    pub fn is_keyword(self) -> bool {
        self.fixed_text()
            .is_some_and(|t| t.starts_with(|c: char| c.is_ascii_alphabetic()))
    }

    /// Identifier or keyword: anything usable where a name is expected
    pub fn is_name(self) -> bool {
        self == TokenKind::Ident || self.is_keyword()
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.fixed_text() {
            return write!(f, "'{}'", text);
        }
        let name = match self {
            TokenKind::Newline => "newline",
            TokenKind::Ident => "identifier",
            TokenKind::IntLit => "integer",
            TokenKind::FloatLit => "float",
            TokenKind::StringLit => "string",
            TokenKind::UnterminatedString => "unterminated string",
            TokenKind::HelpText => "help text",
            TokenKind::CodeLine => "code line",
            TokenKind::CodeBlock => "code block",
            TokenKind::Invalid => "invalid token",
            _ => "end of file",
        };
        write!(f, "{}", name)
    }
}

/// A token with its text and location in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: TokenText,
    pub span: Span,
}

impl Token {
    /// How the token reads in an "expected X, found Y" message
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Ident => format!("identifier '{}'", self.text),
            TokenKind::IntLit | TokenKind::FloatLit => format!("number {}", self.text),
            TokenKind::StringLit => format!("string \"{}\"", self.text),
            TokenKind::Invalid => format!("invalid token '{}'", self.text),
            kind => kind.to_string(),
        }
    }
}

/// Tokenize with default options
pub fn tokenize(source: &str) -> Vec<Token> {
    tokenize_with(source, &ParserOptions::default())
}

/// Tokenize a source file. Always ends with an `Eof` token.
pub fn tokenize_with(source: &str, options: &ParserOptions) -> Vec<Token> {
    let index = LineIndex::new(source);
    let mut tokens: Vec<Token> = Vec::new();
    let mut lex = TokenKind::lexer(source);

    let push = |tokens: &mut Vec<Token>, kind: TokenKind, text: &str, range: Range<usize>| {
        tokens.push(Token {
            kind,
            text: TokenText::from(text),
            span: index.span(range),
        });
    };

    while let Some(result) = lex.next() {
        let range = lex.span();
        let slice = lex.slice();

        let kind = match result {
            Ok(kind) => kind,
            Err(()) => {
                push(&mut tokens, TokenKind::Invalid, slice, range);
                continue;
            }
        };

        match kind {
            TokenKind::Newline => {
                if let Some(last) = tokens.last_mut().filter(|t| t.kind == TokenKind::Newline) {
                    last.span.end = index.position(range.end);
                } else {
                    push(&mut tokens, TokenKind::Newline, "\n", range);
                }
            }
            TokenKind::StringLit => {
                let text = unescape_string(&slice[1..slice.len() - 1]);
                push(&mut tokens, kind, &text, range);
            }
            TokenKind::UnterminatedString => {
                push(&mut tokens, TokenKind::Invalid, slice, range);
            }
            TokenKind::HelpText => {
                push(&mut tokens, kind, &slice[1..slice.len() - 1], range);
            }
            TokenKind::Eq | TokenKind::PlusEq => {
                push(&mut tokens, kind, slice, range.clone());
                let rest = lex.remainder();
                let line_len = rest.find('\n').unwrap_or(rest.len());
                let line = &rest[..line_len];
                let code = line.trim();
                if !code.is_empty() {
                    let lead = line.len() - line.trim_start().len();
                    let start = range.end + lead;
                    push(&mut tokens, TokenKind::CodeLine, code, start..start + code.len());
                }
                lex.bump(line_len);
            }
            TokenKind::Colon | TokenKind::PlusColon => {
                push(&mut tokens, kind, slice, range.clone());
                if let Some(block) = scan_block(source, range.start, range.end, options.tab_width) {
                    push(&mut tokens, TokenKind::CodeBlock, &block.text, range.end..block.end);
                    lex.bump(block.end - range.end);
                }
            }
            _ => push(&mut tokens, kind, slice, range),
        }
    }

    let end = index.position(source.len());
    tokens.push(Token {
        kind: TokenKind::Eof,
        text: TokenText::new(),
        span: Span::point(end),
    });
    tokens
}

struct Block {
    text: String,
    /// Byte offset just past the last non-blank character
    end: usize,
}

/// Look for an indented block after a marker ending at `marker_end`.
fn scan_block(source: &str, marker_start: usize, marker_end: usize, tab_width: usize) -> Option<Block> {
    let rest = &source[marker_end..];
    let line_len = rest.find('\n')?;
    let tail = rest[..line_len].trim();
    if !tail.is_empty() && !tail.starts_with("//") {
        return None;
    }

    let owner_start = source[..marker_start].rfind('\n').map_or(0, |i| i + 1);
    let owner_indent = indent_width(&source[owner_start..], tab_width);

    let body_start = marker_end + line_len + 1;
    let mut lines: Vec<&str> = Vec::new();
    let mut content_lines = 0;
    let mut end = marker_end;
    let mut offset = body_start;

    while offset < source.len() {
        let line_end = source[offset..].find('\n').map_or(source.len(), |i| offset + i);
        let line = source[offset..line_end].trim_end_matches('\r');
        if !line.trim().is_empty() {
            if indent_width(line, tab_width) <= owner_indent {
                break;
            }
            content_lines = lines.len() + 1;
            end = offset + line.trim_end().len();
        }
        lines.push(line);
        offset = line_end + 1;
    }

    if content_lines == 0 {
        return None;
    }
    lines.truncate(content_lines);

    let common = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_width(l, tab_width))
        .min()
        .unwrap_or(0);

    let text = lines
        .iter()
        .map(|l| strip_indent(l, common, tab_width))
        .collect::<Vec<_>>()
        .join("\n");

    Some(Block { text, end })
}

/// Leading whitespace width, tabs expanded to the next tab stop
fn indent_width(line: &str, tab_width: usize) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += tab_width - width % tab_width,
            _ => break,
        }
    }
    width
}

fn strip_indent(line: &str, columns: usize, tab_width: usize) -> &str {
    if line.trim().is_empty() {
        return "";
    }
    let mut width = 0;
    for (i, c) in line.char_indices() {
        if width >= columns {
            return &line[i..];
        }
        match c {
            ' ' => width += 1,
            '\t' => width += tab_width - width % tab_width,
            _ => return &line[i..],
        }
    }
    ""
}

/// Unescape a string literal
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }

    result
}
