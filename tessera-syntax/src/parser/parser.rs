//! Tessera Parser
//!
//! Recursive descent parser that converts tokens into AST.
//!
//! Every decision is made by peeking at most two tokens ahead. A failing
//! production reports one diagnostic and the enclosing statement loop skips
//! to the next line (or to the `}` closing the current block), so one typo
//! never costs more than its own statement.

use crate::parser::ast::*;
use crate::parser::lexer::{tokenize_with, Token, TokenKind};
use std::collections::BTreeSet;
use tessera_core::{Diagnostic, DiagnosticSink, ParserOptions, Position, Span};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Parser error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        span: Span,
        expected: String,
        found: String,
    },

    #[error("unexpected end of file, expected {expected}")]
    UnexpectedEof { span: Span, expected: String },

    #[error("unclosed '{delimiter}'")]
    Unclosed { span: Span, delimiter: &'static str },

    #[error("invalid token '{text}'")]
    InvalidToken { span: Span, text: String },

    #[error("{message}")]
    InvalidSyntax { span: Span, message: String },

    #[error("nesting deeper than {limit} levels")]
    TooDeep { span: Span, limit: usize },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::Unclosed { span, .. }
            | ParseError::InvalidToken { span, .. }
            | ParseError::InvalidSyntax { span, .. }
            | ParseError::TooDeep { span, .. } => *span,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.span(), self.to_string())
    }

    fn at_eof(&self) -> bool {
        matches!(self, ParseError::UnexpectedEof { .. } | ParseError::Unclosed { .. })
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Top-level sections, in the order they must appear
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    FileAnnotations,
    PageImport,
    Pages,
    ModelImport,
    Collections,
}

impl Section {
    fn describe(self) -> &'static str {
        match self {
            Section::FileAnnotations => "file annotations",
            Section::PageImport => "the page import",
            Section::Pages => "pages",
            Section::ModelImport => "the model import",
            Section::Collections => "collections",
        }
    }
}

/// Parser state
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    /// End of the last consumed token that was not a newline
    last_end: Position,
    options: &'a ParserOptions,
    sink: &'a mut dyn DiagnosticSink,
    depth: usize,
    reported: usize,
    eof_reported: bool,
    /// Lines holding an invalid token; other errors there are follow-ons
    invalid_lines: BTreeSet<usize>,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token>, options: &'a ParserOptions, sink: &'a mut dyn DiagnosticSink) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let end = tokens.last().map(|t| t.span.end).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: Default::default(),
                span: Span::point(end),
            });
        }
        Self {
            tokens,
            pos: 0,
            last_end: Position::default(),
            options,
            sink,
            depth: 0,
            reported: 0,
            eof_reported: false,
            invalid_lines: BTreeSet::new(),
        }
    }

    /// Parse the entire source file
    pub fn parse_file(&mut self) -> SourceFile {
        debug!(tokens = self.tokens.len(), "parsing source file");
        self.drop_invalid_tokens();

        let mut file = SourceFile::default();
        let mut section = Section::FileAnnotations;

        loop {
            self.skip_newlines();
            let header = self.current().span;
            let kind = match (self.peek(), self.nth(1)) {
                (TokenKind::Eof, _) => break,
                (TokenKind::At, _) => Section::FileAnnotations,
                (TokenKind::Import, TokenKind::LBracket) => Section::PageImport,
                (TokenKind::Import, TokenKind::Hash) => Section::ModelImport,
                (TokenKind::LBracket, _) => Section::Pages,
                (TokenKind::Hash, _) => Section::Collections,
                _ => {
                    let start = self.pos;
                    let err = self.unexpected("'@', '[', '#' or 'import'");
                    self.report(err);
                    self.recover(start);
                    continue;
                }
            };

            if kind < section {
                self.report(ParseError::InvalidSyntax {
                    span: header,
                    message: format!("{} must come before {}", kind.describe(), section.describe()),
                });
            } else {
                section = kind;
            }

            match kind {
                Section::FileAnnotations => {
                    if let Some(node) = self.statement(Self::file_annotation) {
                        file.annotations.push(node);
                    }
                }
                Section::PageImport => {
                    if let Some(node) = self.statement(Self::page_import) {
                        self.set_import(&mut file.page_imports, node, "page");
                    }
                }
                Section::ModelImport => {
                    if let Some(node) = self.statement(Self::model_import) {
                        self.set_import(&mut file.model_imports, node, "model");
                    }
                }
                Section::Pages => {
                    let page = self.page();
                    file.pages.push(page);
                }
                Section::Collections => {
                    let collection = self.collection();
                    file.collections.push(collection);
                }
            }
        }

        debug!(
            annotations = file.annotations.len(),
            pages = file.pages.len(),
            collections = file.collections.len(),
            diagnostics = self.reported,
            "parsed source file"
        );
        file
    }

    fn set_import(&mut self, slot: &mut Option<Node<ImportList>>, node: Node<ImportList>, what: &str) {
        if slot.is_some() {
            self.report(ParseError::InvalidSyntax {
                span: node.span,
                message: format!("duplicate {} import", what),
            });
        } else {
            *slot = Some(node);
        }
    }

    // ========================================
    // Imports
    // ========================================

    fn page_import(&mut self) -> ParseResult<Node<ImportList>> {
        let start = self.start();
        self.expect(TokenKind::Import)?;
        let open = self.expect(TokenKind::LBracket)?;
        let mut names = vec![self.expect_name("page name")?];
        while self.eat(TokenKind::Comma) {
            self.skip_newlines();
            names.push(self.expect_name("page name")?);
        }
        self.close(TokenKind::RBracket, &open, "',' or ']'")?;
        let from = self.import_source()?;
        Ok(Node::new(ImportList { names, from }, self.span_from(start)))
    }

    fn model_import(&mut self) -> ParseResult<Node<ImportList>> {
        let start = self.start();
        self.expect(TokenKind::Import)?;
        let mut names = Vec::new();
        loop {
            self.expect(TokenKind::Hash)?;
            names.push(self.expect_name("model name")?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        let from = self.import_source()?;
        Ok(Node::new(ImportList { names, from }, self.span_from(start)))
    }

    fn import_source(&mut self) -> ParseResult<Option<QualifiedName>> {
        if self.eat(TokenKind::From) {
            Ok(Some(self.qualified_name("module name")?))
        } else {
            Ok(None)
        }
    }

    // ========================================
    // Collections
    // ========================================

    fn collection(&mut self) -> Node<CollectionDecl> {
        let start = self.start();
        let mut decl = CollectionDecl::default();
        self.statement(|p| p.collection_header(&mut decl));

        loop {
            self.skip_newlines();
            if self.at_declaration_boundary() {
                break;
            }
            if self.at(TokenKind::At) {
                if let Some(node) = self.statement(Self::model_annotation) {
                    decl.annotations.push(node);
                }
            } else if let Some(node) = self.statement(Self::field) {
                decl.fields.push(node);
            }
        }

        trace!(
            name = %decl.name,
            fields = decl.fields.len(),
            annotations = decl.annotations.len(),
            "parsed collection"
        );
        Node::new(decl, self.span_from(start))
    }

    fn collection_header(&mut self, decl: &mut CollectionDecl) -> ParseResult<()> {
        self.expect(TokenKind::Hash)?;
        decl.name = self.expect_name("collection name")?;
        decl.inherits = self.inheritance()?;
        if self.at(TokenKind::StringLit) {
            let singular = self.advance().text.to_string();
            let plural = self.optional_string();
            decl.verbose_name = Some(VerboseName { singular, plural });
        }
        Ok(())
    }

    fn inheritance(&mut self) -> ParseResult<Option<Inheritance>> {
        let mode = match self.peek() {
            TokenKind::InheritReplace => InheritMode::Replace,
            TokenKind::InheritMerge => InheritMode::Merge,
            _ => return Ok(None),
        };
        self.advance();
        self.eat(TokenKind::Hash);
        let base = self.expect_name("base name")?;
        Ok(Some(Inheritance { mode, base }))
    }

    fn field(&mut self) -> ParseResult<Node<FieldDecl>> {
        let start = self.start();

        let mut modifiers = BTreeSet::new();
        while let Some(modifier) = modifier_for(self.peek()) {
            self.advance();
            modifiers.insert(modifier);
        }

        let name = self.expect_name("field name")?;

        let body = match self.peek() {
            TokenKind::Colon => {
                self.advance();
                if self.at(TokenKind::CodeBlock) {
                    Some(FieldBody::Code(self.code_block()?))
                } else {
                    Some(FieldBody::Spec(self.field_spec()?))
                }
            }
            TokenKind::Eq => {
                self.advance();
                Some(FieldBody::Code(self.code_line()?))
            }
            TokenKind::PlusEq => {
                self.advance();
                Some(FieldBody::Extend(self.code_line()?))
            }
            TokenKind::PlusColon => {
                self.advance();
                Some(FieldBody::Extend(self.code_block()?))
            }
            _ => None,
        };

        let verbose_name = self.optional_string();
        let help_text = if self.at(TokenKind::HelpText) {
            Some(self.advance().text.to_string())
        } else {
            None
        };

        Ok(Node::new(
            FieldDecl {
                modifiers,
                name,
                body,
                verbose_name,
                help_text,
            },
            self.span_from(start),
        ))
    }

    fn field_spec(&mut self) -> ParseResult<FieldSpec> {
        let kind = self.peek();
        let spec = match kind {
            TokenKind::Str => {
                self.advance();
                let size = if self.at(TokenKind::LParen) {
                    let open = self.advance();
                    let size = self.expect_u32()?;
                    self.close(TokenKind::RParen, &open, "')'")?;
                    Some(size)
                } else {
                    None
                };
                let choices = self.choices()?;
                FieldSpec::Text { size, choices }
            }
            TokenKind::Int => {
                self.advance();
                FieldSpec::Integer {
                    choices: self.choices()?,
                }
            }
            TokenKind::Decimal => {
                let start = self.start();
                self.advance();
                let args = if self.at(TokenKind::LParen) {
                    self.paren_list(Self::expect_u32)?
                } else {
                    Vec::new()
                };
                if args.len() > 2 {
                    return Err(ParseError::InvalidSyntax {
                        span: self.span_from(start),
                        message: "decimal takes at most two arguments".to_string(),
                    });
                }
                FieldSpec::Decimal {
                    digits: args.first().copied(),
                    places: args.get(1).copied(),
                }
            }
            TokenKind::Image => {
                self.advance();
                let sizes = if self.at(TokenKind::LParen) {
                    self.paren_list(Self::image_size)?
                } else {
                    Vec::new()
                };
                FieldSpec::Image { sizes }
            }
            TokenKind::Slug => {
                self.advance();
                let sources = if self.at(TokenKind::LParen) {
                    self.paren_list(|p| p.expect_name("field name"))?
                } else {
                    Vec::new()
                };
                FieldSpec::Slug { sources }
            }
            TokenKind::Bool => {
                self.advance();
                let default = if self.at(TokenKind::LParen) {
                    let open = self.advance();
                    let value = self.expect_bool()?;
                    self.close(TokenKind::RParen, &open, "')'")?;
                    Some(value)
                } else {
                    None
                };
                FieldSpec::Boolean { default }
            }
            TokenKind::One | TokenKind::OneToOne | TokenKind::Many => {
                self.advance();
                let relation = match kind {
                    TokenKind::One => RelationKind::One,
                    TokenKind::OneToOne => RelationKind::OneToOne,
                    _ => RelationKind::Many,
                };
                FieldSpec::Relation(self.relation(relation)?)
            }
            _ => {
                let simple = match kind {
                    TokenKind::LongText => FieldSpec::LongText,
                    TokenKind::Html => FieldSpec::Html,
                    TokenKind::RichHtml => FieldSpec::RichHtml,
                    TokenKind::Float => FieldSpec::Float,
                    TokenKind::Date => FieldSpec::Date,
                    TokenKind::DateTime => FieldSpec::DateTime,
                    TokenKind::Created => FieldSpec::CreatedAt,
                    TokenKind::Updated => FieldSpec::UpdatedAt,
                    TokenKind::File => FieldSpec::File,
                    TokenKind::Pdf => FieldSpec::TypedFile(FileKind::Pdf),
                    TokenKind::Audio => FieldSpec::TypedFile(FileKind::Audio),
                    TokenKind::Video => FieldSpec::TypedFile(FileKind::Video),
                    TokenKind::Archive => FieldSpec::TypedFile(FileKind::Archive),
                    _ => return Err(self.unexpected("field type")),
                };
                self.advance();
                simple
            }
        };
        Ok(spec)
    }

    fn choices(&mut self) -> ParseResult<Vec<Choice>> {
        if !self.at(TokenKind::LBracket) {
            return Ok(Vec::new());
        }
        self.delimited(TokenKind::RBracket, Self::choice)
    }

    fn choice(&mut self) -> ParseResult<Choice> {
        let value = match self.peek() {
            TokenKind::StringLit => Value::String(self.advance().text.to_string()),
            TokenKind::Minus | TokenKind::IntLit => self.number()?,
            kind if kind.is_name() => {
                Value::Name(QualifiedName::new(vec![self.advance().text.to_string()]))
            }
            _ => return Err(self.unexpected("choice")),
        };
        let label = if self.eat(TokenKind::Colon) {
            Some(self.expect_string()?)
        } else {
            None
        };
        Ok(Choice { value, label })
    }

    fn image_size(&mut self) -> ParseResult<ImageSize> {
        let name = self.expect_name("image size name")?;
        let open = self.expect(TokenKind::LParen)?;
        let width = self.expect_u32()?;
        self.expect(TokenKind::Comma)?;
        let height = self.expect_u32()?;
        self.close(TokenKind::RParen, &open, "')'")?;
        let mut filters = Vec::new();
        while self.peek().is_name() {
            filters.push(self.advance().text.to_string());
        }
        Ok(ImageSize {
            name,
            width,
            height,
            filters,
        })
    }

    fn relation(&mut self, kind: RelationKind) -> ParseResult<RelationSpec> {
        let cascade = self.eat(TokenKind::BangBang);
        let mut target = None;
        let mut related_name = None;
        if self.at(TokenKind::LBracket) {
            let open = self.advance();
            if !self.at(TokenKind::RBracket) && !self.at(TokenKind::Arrow) {
                target = Some(self.model_target()?);
            }
            if self.eat(TokenKind::Arrow) {
                related_name = Some(self.expect_name("related name")?);
            }
            self.close(TokenKind::RBracket, &open, "'->' or ']'")?;
        }
        Ok(RelationSpec {
            kind,
            cascade,
            target,
            related_name,
        })
    }

    // ========================================
    // Pages
    // ========================================

    fn page(&mut self) -> Node<PageDecl> {
        let start = self.start();
        let mut decl = PageDecl::default();
        self.statement(|p| p.page_header(&mut decl));

        loop {
            self.skip_newlines();
            if self.at_declaration_boundary() {
                break;
            }
            if self.at(TokenKind::At) {
                if let Some(node) = self.statement(Self::page_annotation) {
                    decl.annotations.push(node);
                }
            } else {
                self.statement(|p| p.page_member(&mut decl.body));
            }
        }

        trace!(
            name = %decl.name,
            annotations = decl.annotations.len(),
            "parsed page"
        );
        Node::new(decl, self.span_from(start))
    }

    fn page_header(&mut self, decl: &mut PageDecl) -> ParseResult<()> {
        let open = self.expect(TokenKind::LBracket)?;
        decl.name = self.expect_name("page name")?;
        decl.inherits = self.inheritance()?;
        if self.eat(TokenKind::As) {
            decl.alias = Some(self.expect_name("alias")?);
        }
        if self.eat(TokenKind::Colon) {
            decl.url = Some(self.url_pattern()?);
        }
        self.close(TokenKind::RBracket, &open, "']'")?;

        decl.content = match self.peek() {
            TokenKind::StringLit => Some(PageContent::Template(self.advance().text.to_string())),
            TokenKind::Eq | TokenKind::Colon => Some(PageContent::Code(self.code()?)),
            _ => None,
        };
        Ok(())
    }

    fn url_pattern(&mut self) -> ParseResult<UrlPattern> {
        self.expect(TokenKind::Slash)?;
        let mut url = UrlPattern::default();
        loop {
            if self.at(TokenKind::RBracket) {
                url.trailing_slash = !url.segments.is_empty();
                break;
            }
            url.segments.push(self.url_segment()?);
            if !self.eat(TokenKind::Slash) {
                break;
            }
        }
        Ok(url)
    }

    fn url_segment(&mut self) -> ParseResult<UrlSegment> {
        if self.at(TokenKind::Lt) {
            let open = self.advance();
            let first = self.expect_name("parameter name")?;
            let (name, converter) = if self.eat(TokenKind::Colon) {
                (self.expect_name("parameter name")?, Some(first))
            } else {
                (first, None)
            };
            self.close(TokenKind::Gt, &open, "'>'")?;
            return Ok(UrlSegment::Param { name, converter });
        }

        if !is_url_piece(self.peek()) {
            return Err(self.unexpected("URL segment"));
        }
        let mut text = self.advance().text.to_string();
        // Literal segments are made of adjacent tokens: `blog-posts`, `feed.xml`
        while is_url_piece(self.peek()) && self.current().span.start.offset == self.last_end.offset {
            text.push_str(&self.advance().text);
        }
        Ok(UrlSegment::Literal(text))
    }

    /// One member of a page body: field, function or trailing code block
    pub(crate) fn page_member(&mut self, body: &mut PageBody) -> ParseResult<()> {
        let start = self.start();

        if self.eat(TokenKind::Colon) {
            let code = self.code_block()?;
            let span = self.span_from(start);
            if body.code.is_some() {
                return Err(ParseError::InvalidSyntax {
                    span,
                    message: "page code is already defined".to_string(),
                });
            }
            body.code = Some(Node::new(code, span));
            return Ok(());
        }

        let name = self.expect_name("page member name")?;
        match self.peek() {
            TokenKind::LParen => {
                let params = self.paren_list(|p| p.expect_name("parameter name"))?;
                let code = if matches!(self.peek(), TokenKind::Eq | TokenKind::Colon) {
                    Some(self.code()?)
                } else {
                    None
                };
                body.functions.push(Node::new(
                    PageFunction {
                        name,
                        params,
                        body: code,
                    },
                    self.span_from(start),
                ));
            }
            TokenKind::Eq | TokenKind::Colon => {
                let code = self.code()?;
                body.fields.push(Node::new(PageField { name, code }, self.span_from(start)));
            }
            _ => return Err(self.unexpected("'=', ':' or '('")),
        }
        Ok(())
    }

    // ========================================
    // Shared productions
    // ========================================

    pub(crate) fn qualified_name(&mut self, what: &str) -> ParseResult<QualifiedName> {
        let mut parts = vec![self.expect_name(what)?];
        while self.at(TokenKind::Dot) && self.nth(1).is_name() {
            self.advance();
            parts.push(self.advance().text.to_string());
        }
        Ok(QualifiedName::new(parts))
    }

    pub(crate) fn model_target(&mut self) -> ParseResult<ModelTarget> {
        if self.eat(TokenKind::Hash) {
            Ok(ModelTarget::Local(self.expect_name("model name")?))
        } else if self.peek().is_name() {
            Ok(ModelTarget::External(self.qualified_name("model name")?))
        } else {
            Err(self.unexpected("'#' or model name"))
        }
    }

    /// `= code` or `:` followed by an indented block
    pub(crate) fn code(&mut self) -> ParseResult<Code> {
        match self.peek() {
            TokenKind::Eq => {
                self.advance();
                self.code_line()
            }
            TokenKind::Colon => {
                self.advance();
                self.code_block()
            }
            _ => Err(self.unexpected("'=' or ':'")),
        }
    }

    fn code_line(&mut self) -> ParseResult<Code> {
        let token = self.expect(TokenKind::CodeLine)?;
        Ok(Code::line(token.text.as_str()))
    }

    fn code_block(&mut self) -> ParseResult<Code> {
        let token = self.expect(TokenKind::CodeBlock)?;
        Ok(Code::block(token.text.as_str()))
    }

    pub(crate) fn value(&mut self) -> ParseResult<Value> {
        match self.peek() {
            TokenKind::StringLit => Ok(Value::String(self.advance().text.to_string())),
            TokenKind::True => {
                self.advance();
                Ok(Value::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Value::Bool(false))
            }
            TokenKind::Minus | TokenKind::IntLit | TokenKind::FloatLit => self.number(),
            kind if kind.is_name() => Ok(Value::Name(self.qualified_name("value")?)),
            _ => Err(self.unexpected("value")),
        }
    }

    fn number(&mut self) -> ParseResult<Value> {
        let negative = self.eat(TokenKind::Minus);
        let token = self.current().clone();
        match token.kind {
            TokenKind::IntLit => {
                self.advance();
                let value = parse_int(&token)?;
                Ok(Value::Integer(if negative { -value } else { value }))
            }
            TokenKind::FloatLit => {
                self.advance();
                let value: f64 = token.text.parse().map_err(|_| ParseError::InvalidSyntax {
                    span: token.span,
                    message: format!("invalid number '{}'", token.text),
                })?;
                Ok(Value::Float(if negative { -value } else { value }))
            }
            _ => Err(self.unexpected("number")),
        }
    }

    pub(crate) fn signed_int(&mut self) -> ParseResult<i64> {
        let negative = self.eat(TokenKind::Minus);
        let value = self.expect_int()?;
        Ok(if negative { -value } else { value })
    }

    /// `name, -name, *` with line breaks allowed after commas
    pub(crate) fn field_list(&mut self) -> ParseResult<FieldList> {
        let mut entries = vec![self.field_list_entry()?];
        while self.eat(TokenKind::Comma) {
            self.skip_newlines();
            entries.push(self.field_list_entry()?);
        }
        Ok(FieldList { entries })
    }

    fn field_list_entry(&mut self) -> ParseResult<FieldListEntry> {
        let negated = self.eat(TokenKind::Minus);
        let target = if self.eat(TokenKind::Star) {
            FieldRef::All
        } else {
            FieldRef::Name(self.expect_name("field name or '*'")?)
        };
        Ok(FieldListEntry { negated, target })
    }

    pub(crate) fn name_list(&mut self, what: &str) -> ParseResult<Vec<String>> {
        let mut names = vec![self.expect_name(what)?];
        while self.eat(TokenKind::Comma) {
            self.skip_newlines();
            names.push(self.expect_name(what)?);
        }
        Ok(names)
    }

    /// `( item, item, ... )`
    pub(crate) fn paren_list<T>(&mut self, item: impl FnMut(&mut Self) -> ParseResult<T>) -> ParseResult<Vec<T>> {
        if !self.at(TokenKind::LParen) {
            return Err(self.unexpected("'('"));
        }
        self.delimited(TokenKind::RParen, item)
    }

    /// Comma separated items between the current opener and `close`.
    /// Line breaks and a trailing comma are allowed.
    fn delimited<T>(
        &mut self,
        close: TokenKind,
        mut item: impl FnMut(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<Vec<T>> {
        let open = self.advance();
        let mut items = Vec::new();
        let expected = format!("',' or {}", close);
        loop {
            self.skip_newlines();
            if self.at(close) {
                self.advance();
                return Ok(items);
            }
            items.push(item(self)?);
            self.skip_newlines();
            if !self.eat(TokenKind::Comma) {
                self.close(close, &open, &expected)?;
                return Ok(items);
            }
        }
    }

    /// `{ item* }` with items separated by newlines or commas.
    /// A failing item is reported and skipped; the block carries on.
    pub(crate) fn brace_body(&mut self, mut item: impl FnMut(&mut Self) -> ParseResult<()>) -> ParseResult<()> {
        let span = self.current().span;
        self.nested(span, |p| {
            let open = p.expect(TokenKind::LBrace)?;
            loop {
                while matches!(p.peek(), TokenKind::Newline | TokenKind::Comma) {
                    p.advance();
                }
                match p.peek() {
                    TokenKind::RBrace => {
                        p.advance();
                        return Ok(());
                    }
                    // A new declaration ends the block even without its `}`
                    _ if p.at_line_start_boundary() => {
                        p.report(ParseError::Unclosed {
                            span: open.span,
                            delimiter: "{",
                        });
                        return Ok(());
                    }
                    TokenKind::Eof => {
                        p.report(ParseError::Unclosed {
                            span: open.span,
                            delimiter: "{",
                        });
                        return Ok(());
                    }
                    _ => {
                        let start = p.pos;
                        if let Err(err) = item(p) {
                            p.report(err);
                            p.recover(start);
                        }
                    }
                }
            }
        })
    }

    fn nested<T>(&mut self, span: Span, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= self.options.max_nesting {
            return Err(ParseError::TooDeep {
                span,
                limit: self.options.max_nesting,
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ========================================
    // Statements and recovery
    // ========================================

    /// Run one line-terminated statement. On failure the error is reported
    /// and the parser skips to the next statement.
    fn statement<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> Option<T> {
        let start = self.pos;
        match f(self) {
            Ok(value) => {
                self.finish_statement();
                Some(value)
            }
            Err(err) => {
                self.report(err);
                self.recover(start);
                None
            }
        }
    }

    fn finish_statement(&mut self) {
        match self.peek() {
            TokenKind::Newline => {
                self.advance();
            }
            // A block already runs to the end of its last line
            TokenKind::Eof if self.prev_kind() == Some(TokenKind::CodeBlock) => {}
            // An unclosed block stopped at the next declaration
            _ if self.prev_kind() == Some(TokenKind::Newline) => {}
            _ => {
                let start = self.pos;
                let err = self.unexpected("newline");
                self.report(err);
                self.recover(start);
            }
        }
    }

    /// Skip to a newline (consumed) or a `}` (kept) at the current depth.
    /// An unmatched opener is abandoned once a line dedents back to the
    /// column the failed statement started at, and a declaration at the
    /// start of a line is never skipped.
    fn recover(&mut self, start: usize) {
        let from = self.pos;
        let column = self.tokens.get(start).map_or(0, |t| t.span.start.column);
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                _ if self.pos > start && self.at_line_start_boundary() => break,
                TokenKind::Newline if depth == 0 || self.next_line_dedents(column) => {
                    self.advance();
                    break;
                }
                TokenKind::RBrace if depth == 0 => break,
                TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            self.advance();
        }
        // Always make progress
        if self.pos == start && !self.at(TokenKind::Eof) {
            self.advance();
        }
        trace!(skipped = self.pos - from, "synchronized");
    }

    fn report(&mut self, err: ParseError) {
        let follow_on = !matches!(err, ParseError::InvalidToken { .. })
            && self.invalid_lines.contains(&err.span().start.line);
        if follow_on {
            trace!(error = %err, "suppressed after invalid token");
            return;
        }
        // Only a real end of input silences later end-of-input errors
        if err.at_eof() && self.at(TokenKind::Eof) {
            if self.eof_reported {
                return;
            }
            self.eof_reported = true;
        }

        self.reported += 1;
        let limit = self.options.max_diagnostics;
        if self.reported > limit {
            if self.reported == limit + 1 {
                warn!(limit, "diagnostic limit reached, dropping further diagnostics");
            }
            return;
        }
        trace!(error = %err, "reporting diagnostic");
        self.sink.report(err.to_diagnostic());
    }

    fn drop_invalid_tokens(&mut self) {
        let tokens = std::mem::take(&mut self.tokens);
        let (invalid, valid): (Vec<_>, Vec<_>) = tokens
            .into_iter()
            .partition(|t| t.kind == TokenKind::Invalid);
        self.tokens = valid;
        for token in invalid {
            self.invalid_lines.insert(token.span.start.line);
            self.report(ParseError::InvalidToken {
                span: token.span,
                text: token.text.to_string(),
            });
        }
    }

    fn at_declaration_boundary(&self) -> bool {
        match self.peek() {
            TokenKind::Eof | TokenKind::Hash | TokenKind::LBracket => true,
            TokenKind::Import => matches!(self.nth(1), TokenKind::LBracket | TokenKind::Hash),
            _ => false,
        }
    }

    fn at_line_start_boundary(&self) -> bool {
        self.peek() != TokenKind::Eof
            && self.prev_kind().is_none_or(|k| k == TokenKind::Newline)
            && self.at_declaration_boundary()
    }

    /// Whether the line after the current newline starts at or left of
    /// `column`, apart from a closer at exactly `column`
    fn next_line_dedents(&self, column: usize) -> bool {
        let Some(next) = self.tokens.get(self.pos + 1) else {
            return true;
        };
        match next.kind {
            TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket => next.span.start.column < column,
            _ => next.span.start.column <= column,
        }
    }

    // ========================================
    // Token utilities
    // ========================================

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek(&self) -> TokenKind {
        self.current().kind
    }

    pub(crate) fn current_span(&self) -> Span {
        self.current().span
    }

    pub(crate) fn current_text(&self) -> &str {
        &self.current().text
    }

    fn nth(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn prev_kind(&self) -> Option<TokenKind> {
        self.pos.checked_sub(1).map(|i| self.tokens[i].kind)
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
            if token.kind != TokenKind::Newline {
                self.last_end = token.span.end;
            }
        }
        token
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    /// Close a delimiter opened by `open`; EOF is reported at the opener.
    pub(crate) fn close(&mut self, kind: TokenKind, open: &Token, expected: &str) -> ParseResult<()> {
        if self.eat(kind) {
            return Ok(());
        }
        if self.at(TokenKind::Eof) {
            return Err(ParseError::Unclosed {
                span: open.span,
                delimiter: open.kind.fixed_text().unwrap_or("("),
            });
        }
        Err(self.unexpected(expected))
    }

    /// Identifier or any keyword, as text
    pub(crate) fn expect_name(&mut self, what: &str) -> ParseResult<String> {
        if self.peek().is_name() {
            Ok(self.advance().text.to_string())
        } else {
            Err(self.unexpected(what))
        }
    }

    pub(crate) fn expect_string(&mut self) -> ParseResult<String> {
        Ok(self.expect(TokenKind::StringLit)?.text.to_string())
    }

    fn optional_string(&mut self) -> Option<String> {
        if self.at(TokenKind::StringLit) {
            Some(self.advance().text.to_string())
        } else {
            None
        }
    }

    pub(crate) fn expect_int(&mut self) -> ParseResult<i64> {
        let token = self.expect(TokenKind::IntLit)?;
        parse_int(&token)
    }

    fn expect_u32(&mut self) -> ParseResult<u32> {
        let token = self.current().clone();
        let value = self.expect_int()?;
        u32::try_from(value).map_err(|_| ParseError::InvalidSyntax {
            span: token.span,
            message: format!("number '{}' is too large", token.text),
        })
    }

    pub(crate) fn expect_bool(&mut self) -> ParseResult<bool> {
        match self.peek() {
            TokenKind::True => {
                self.advance();
                Ok(true)
            }
            TokenKind::False => {
                self.advance();
                Ok(false)
            }
            _ => Err(self.unexpected("'true' or 'false'")),
        }
    }

    pub(crate) fn start(&self) -> Position {
        self.current().span.start
    }

    /// Span from `start` to the end of the last consumed token
    pub(crate) fn span_from(&self, start: Position) -> Span {
        let end = if self.last_end.offset >= start.offset {
            self.last_end
        } else {
            start
        };
        Span::new(start, end)
    }

    fn skip_newlines(&mut self) {
        while self.at(TokenKind::Newline) {
            self.advance();
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        match token.kind {
            TokenKind::Eof => ParseError::UnexpectedEof {
                span: token.span,
                expected: expected.to_string(),
            },
            _ => ParseError::UnexpectedToken {
                span: token.span,
                expected: expected.to_string(),
                found: token.describe(),
            },
        }
    }
}

fn modifier_for(kind: TokenKind) -> Option<FieldModifier> {
    match kind {
        TokenKind::Bang | TokenKind::BangBang => Some(FieldModifier::Unique),
        TokenKind::Question => Some(FieldModifier::Nullable),
        TokenKind::Caret => Some(FieldModifier::Indexed),
        TokenKind::Dollar => Some(FieldModifier::Static),
        TokenKind::Percent => Some(FieldModifier::Computed),
        TokenKind::Amp => Some(FieldModifier::Reference),
        TokenKind::Tilde => Some(FieldModifier::Hidden),
        _ => None,
    }
}

fn is_url_piece(kind: TokenKind) -> bool {
    kind.is_name() || matches!(kind, TokenKind::IntLit | TokenKind::FloatLit | TokenKind::Minus | TokenKind::Dot)
}

fn parse_int(token: &Token) -> ParseResult<i64> {
    token.text.parse().map_err(|_| ParseError::InvalidSyntax {
        span: token.span,
        message: format!("integer '{}' is out of range", token.text),
    })
}

/// Parse a source string, reporting diagnostics into `sink`
pub fn parse_with(source: &str, options: &ParserOptions, sink: &mut dyn DiagnosticSink) -> SourceFile {
    let tokens = tokenize_with(source, options);
    let mut parser = Parser::new(tokens, options, sink);
    parser.parse_file()
}
