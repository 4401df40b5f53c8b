//! Annotation productions
//!
//! `@name (args)? { properties }?` at file, collection and page level.
//! Property keys are matched by text, so any keyword can be a key.

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parser::{ParseError, ParseResult, Parser};
use tessera_core::Span;

impl<'a> Parser<'a> {
    // ========================================
    // File annotations
    // ========================================

    pub(crate) fn file_annotation(&mut self) -> ParseResult<Node<FileAnnotation>> {
        let start = self.start();
        self.expect(TokenKind::At)?;

        let annotation = match self.peek() {
            TokenKind::Ci => {
                self.advance();
                let mut spec = CiSpec {
                    provider: self.optional_paren_name()?,
                    ..CiSpec::default()
                };
                if self.at(TokenKind::LBrace) {
                    self.brace_body(|p| p.ci_property(&mut spec))?;
                }
                FileAnnotation::Ci(spec)
            }
            TokenKind::Theme => {
                self.advance();
                let mut spec = ThemeSpec {
                    name: self.optional_paren_name()?,
                    ..ThemeSpec::default()
                };
                if self.at(TokenKind::LBrace) {
                    self.brace_body(|p| {
                        let key = p.expect_name("theme setting")?;
                        p.expect(TokenKind::Colon)?;
                        let value = p.value()?;
                        spec.settings.push(Setting { key, value });
                        Ok(())
                    })?;
                }
                FileAnnotation::Theme(spec)
            }
            TokenKind::Languages => {
                self.advance();
                let languages = self.paren_list(|p| match p.peek() {
                    TokenKind::StringLit => p.expect_string(),
                    _ => p.expect_name("language code"),
                })?;
                FileAnnotation::Languages(languages)
            }
            TokenKind::Static => {
                self.advance();
                let entries = self.paren_list(|p| {
                    let path = p.expect_string()?;
                    let mount = if p.eat(TokenKind::Arrow) {
                        Some(p.expect_string()?)
                    } else {
                        None
                    };
                    Ok(StaticEntry { path, mount })
                })?;
                FileAnnotation::Static(entries)
            }
            TokenKind::Tasks => {
                self.advance();
                FileAnnotation::Tasks(self.service_toggle()?)
            }
            TokenKind::Sockets => {
                self.advance();
                FileAnnotation::Sockets(self.service_toggle()?)
            }
            TokenKind::Docker => {
                self.advance();
                FileAnnotation::Docker(self.service_toggle()?)
            }
            _ => return Err(self.unknown_annotation("file")),
        };

        Ok(Node::new(annotation, self.span_from(start)))
    }

    fn ci_property(&mut self, spec: &mut CiSpec) -> ParseResult<()> {
        let start = self.start();
        let (key, span) = self.property_key()?;
        match key.as_str() {
            "image" => {
                self.expect(TokenKind::Colon)?;
                spec.image = Some(self.expect_string()?);
            }
            "branches" => {
                self.expect(TokenKind::Colon)?;
                spec.branches.extend(self.name_list("branch name")?);
            }
            "stage" => {
                let name = self.expect_name("stage name")?;
                let script = self.code()?;
                spec.stages.push(Node::new(CiStage { name, script }, self.span_from(start)));
            }
            _ => return Err(unknown_property("CI", &key, span)),
        }
        Ok(())
    }

    fn service_toggle(&mut self) -> ParseResult<ServiceToggle> {
        Ok(ServiceToggle {
            backend: self.optional_paren_name()?,
        })
    }

    // ========================================
    // Model annotations
    // ========================================

    pub(crate) fn model_annotation(&mut self) -> ParseResult<Node<ModelAnnotation>> {
        let start = self.start();
        self.expect(TokenKind::At)?;

        let kind = self.peek();
        let annotation = match kind {
            TokenKind::Admin => {
                self.advance();
                let mut spec = AdminSpec::default();
                if self.at(TokenKind::LBrace) {
                    self.brace_body(|p| p.admin_property(&mut spec))?;
                }
                ModelAnnotation::Admin(spec)
            }
            TokenKind::Api => {
                self.advance();
                ModelAnnotation::Api
            }
            TokenKind::Rest => {
                self.advance();
                let mut spec = RestSpec::default();
                if self.at(TokenKind::LBrace) {
                    self.brace_body(|p| p.rest_property(&mut spec))?;
                }
                ModelAnnotation::Rest(spec)
            }
            TokenKind::Ordering => {
                self.advance();
                let terms = self.paren_list(|p| {
                    let descending = p.eat(TokenKind::Minus);
                    let field = p.expect_name("field name")?;
                    Ok(OrderingTerm { field, descending })
                })?;
                ModelAnnotation::Ordering(terms)
            }
            TokenKind::Validate
            | TokenKind::PreSave
            | TokenKind::PostSave
            | TokenKind::PreDelete
            | TokenKind::PostDelete => {
                self.advance();
                let code = self.code()?;
                match kind {
                    TokenKind::Validate => ModelAnnotation::Validate(code),
                    TokenKind::PreSave => ModelAnnotation::PreSave(code),
                    TokenKind::PostSave => ModelAnnotation::PostSave(code),
                    TokenKind::PreDelete => ModelAnnotation::PreDelete(code),
                    _ => ModelAnnotation::PostDelete(code),
                }
            }
            TokenKind::M2mChanged => {
                self.advance();
                let field = self.optional_paren_name()?;
                let code = self.code()?;
                ModelAnnotation::M2mChanged { field, code }
            }
            TokenKind::Tree => {
                self.advance();
                ModelAnnotation::Tree(self.tree_spec()?)
            }
            TokenKind::DateHierarchy => {
                self.advance();
                ModelAnnotation::DateHierarchy(self.paren_name("field name")?)
            }
            TokenKind::Mixin => {
                self.advance();
                ModelAnnotation::Mixin(self.paren_list(|p| p.qualified_name("mixin"))?)
            }
            TokenKind::Sortable => {
                self.advance();
                ModelAnnotation::Sortable(self.paren_name("field name")?)
            }
            TokenKind::Unique => {
                self.advance();
                ModelAnnotation::Unique(self.paren_list(|p| p.expect_name("field name"))?)
            }
            _ => return Err(self.unknown_annotation("collection")),
        };

        Ok(Node::new(annotation, self.span_from(start)))
    }

    fn admin_property(&mut self, spec: &mut AdminSpec) -> ParseResult<()> {
        let start = self.start();
        let (key, span) = self.property_key()?;
        match key.as_str() {
            "list" => {
                self.expect(TokenKind::Colon)?;
                spec.list = Some(self.field_list()?);
            }
            "search" => {
                self.expect(TokenKind::Colon)?;
                spec.search.extend(self.name_list("field name")?);
            }
            "filter" => {
                self.expect(TokenKind::Colon)?;
                spec.filters.extend(self.name_list("field name")?);
            }
            "readonly" => {
                self.expect(TokenKind::Colon)?;
                spec.readonly.extend(self.name_list("field name")?);
            }
            "inline" => {
                self.expect(TokenKind::Colon)?;
                spec.inlines.push(self.model_target()?);
                while self.eat(TokenKind::Comma) {
                    spec.inlines.push(self.model_target()?);
                }
            }
            "fieldset" => {
                let title = self.expect_string()?;
                self.expect(TokenKind::Colon)?;
                let fields = self.name_list("field name")?;
                spec.fieldsets.push(Node::new(Fieldset { title, fields }, self.span_from(start)));
            }
            _ => return Err(unknown_property("admin", &key, span)),
        }
        Ok(())
    }

    fn rest_property(&mut self, spec: &mut RestSpec) -> ParseResult<()> {
        let start = self.start();
        let (key, span) = self.property_key()?;
        match key.as_str() {
            "i18n" => spec.i18n = true,
            "query" => spec.query = Some(self.code()?),
            "read" | "write" | "fields" => {
                let mode = match key.as_str() {
                    "read" => AccessMode::ReadOnly,
                    "write" => AccessMode::WriteOnly,
                    _ => AccessMode::ReadWrite,
                };
                self.expect(TokenKind::Colon)?;
                let fields = self.field_list()?;
                spec.field_lists.push(RestFieldList { mode, fields });
            }
            "auth" => {
                self.expect(TokenKind::Colon)?;
                spec.auth.push(self.auth_method()?);
                while self.eat(TokenKind::Comma) {
                    spec.auth.push(self.auth_method()?);
                }
            }
            "inline" => {
                let name = self.expect_name("inline name")?;
                self.expect(TokenKind::Colon)?;
                let target = self.model_target()?;
                let fields = if self.at(TokenKind::LParen) {
                    let open = self.advance();
                    let fields = self.field_list()?;
                    self.close(TokenKind::RParen, &open, "',' or ')'")?;
                    Some(fields)
                } else {
                    None
                };
                spec.inlines.push(Node::new(
                    InlineResource { name, target, fields },
                    self.span_from(start),
                ));
            }
            "annotate" => {
                let name = self.expect_name("annotation name")?;
                let code = self.code()?;
                spec.annotations.push(Node::new(Annotate { name, code }, self.span_from(start)));
            }
            "count" => {
                self.expect(TokenKind::Colon)?;
                spec.counts.extend(self.name_list("relation name")?);
            }
            _ => return Err(unknown_property("REST", &key, span)),
        }
        Ok(())
    }

    fn auth_method(&mut self) -> ParseResult<AuthMethod> {
        let method = match self.peek() {
            TokenKind::Token => {
                self.advance();
                let model = if self.at(TokenKind::LParen) {
                    let open = self.advance();
                    let target = self.model_target()?;
                    self.close(TokenKind::RParen, &open, "')'")?;
                    Some(target)
                } else {
                    None
                };
                AuthMethod::Token { model }
            }
            TokenKind::Session => {
                self.advance();
                AuthMethod::Session
            }
            TokenKind::Basic => {
                self.advance();
                AuthMethod::Basic
            }
            TokenKind::Jwt => {
                self.advance();
                AuthMethod::Jwt
            }
            kind if kind.is_name() => AuthMethod::Custom(self.qualified_name("auth method")?),
            _ => return Err(self.unexpected("auth method")),
        };
        Ok(method)
    }

    fn tree_spec(&mut self) -> ParseResult<TreeSpec> {
        let mut spec = TreeSpec::default();
        if !self.at(TokenKind::LParen) {
            return Ok(spec);
        }
        let start = self.start();
        for name in self.paren_list(|p| p.expect_name("parent field or 'polymorphic'"))? {
            if name == "polymorphic" {
                spec.polymorphic = true;
            } else if spec.parent.is_none() {
                spec.parent = Some(name);
            } else {
                return Err(ParseError::InvalidSyntax {
                    span: self.span_from(start),
                    message: "tree takes a single parent field".to_string(),
                });
            }
        }
        Ok(spec)
    }

    // ========================================
    // Page annotations
    // ========================================

    pub(crate) fn page_annotation(&mut self) -> ParseResult<Node<PageAnnotation>> {
        let start = self.start();
        self.expect(TokenKind::At)?;

        let kind = self.peek();
        let annotation = match kind {
            TokenKind::Crud
            | TokenKind::List
            | TokenKind::Detail
            | TokenKind::Create
            | TokenKind::Edit
            | TokenKind::Delete => {
                self.advance();
                let spec = self.crud_spec()?;
                match kind {
                    TokenKind::Crud => PageAnnotation::Crud(spec),
                    TokenKind::List => PageAnnotation::List(spec),
                    TokenKind::Detail => PageAnnotation::Detail(spec),
                    TokenKind::Create => PageAnnotation::Create(spec),
                    TokenKind::Edit => PageAnnotation::Edit(spec),
                    _ => PageAnnotation::Delete(spec),
                }
            }
            TokenKind::Stream => {
                self.advance();
                let mut spec = StreamSpec {
                    targets: self.paren_list(Self::model_target)?,
                    channel: None,
                    events: Vec::new(),
                };
                if self.at(TokenKind::LBrace) {
                    self.brace_body(|p| p.stream_property(&mut spec))?;
                }
                PageAnnotation::Stream(spec)
            }
            TokenKind::React | TokenKind::Vue | TokenKind::Svelte => {
                self.advance();
                let framework = match kind {
                    TokenKind::React => Framework::React,
                    TokenKind::Vue => Framework::Vue,
                    _ => Framework::Svelte,
                };
                PageAnnotation::Embed(self.embed_spec(framework)?)
            }
            TokenKind::Html | TokenKind::Markdown => {
                self.advance();
                let format = if kind == TokenKind::Html {
                    RawFormat::Html
                } else {
                    RawFormat::Markdown
                };
                let name = self.optional_paren_name()?;
                let content = if self.at(TokenKind::StringLit) {
                    PageContent::Template(self.expect_string()?)
                } else {
                    PageContent::Code(self.code()?)
                };
                PageAnnotation::Raw(RawBlock { format, name, content })
            }
            TokenKind::Menu => {
                self.advance();
                let name = self.optional_paren_name()?;
                let items = self.menu_items()?;
                PageAnnotation::Menu(MenuSpec { name, items })
            }
            TokenKind::Login => {
                self.advance();
                let permissions = if self.at(TokenKind::LParen) {
                    self.paren_list(|p| p.qualified_name("permission"))?
                } else {
                    Vec::new()
                };
                PageAnnotation::Auth(AuthGuard { permissions })
            }
            TokenKind::Get => {
                self.advance();
                PageAnnotation::Get(self.code()?)
            }
            TokenKind::Post => {
                self.advance();
                PageAnnotation::Post(self.code()?)
            }
            TokenKind::ErrorPage => {
                self.advance();
                let open = self.expect(TokenKind::LParen)?;
                let status_start = self.start();
                let status = self.expect_int()?;
                let status = u16::try_from(status).map_err(|_| ParseError::InvalidSyntax {
                    span: self.span_from(status_start),
                    message: format!("invalid status code {}", status),
                })?;
                self.close(TokenKind::RParen, &open, "')'")?;
                PageAnnotation::ErrorPage(status)
            }
            TokenKind::Priority => {
                self.advance();
                let priority = if self.at(TokenKind::LParen) {
                    let open = self.advance();
                    let value = self.signed_int()?;
                    self.close(TokenKind::RParen, &open, "')'")?;
                    Some(value)
                } else {
                    None
                };
                PageAnnotation::Priority(priority)
            }
            _ => return Err(self.unknown_annotation("page")),
        };

        Ok(Node::new(annotation, self.span_from(start)))
    }

    fn crud_spec(&mut self) -> ParseResult<CrudSpec> {
        let open = self.expect(TokenKind::LParen)?;
        let target = self.model_target()?;
        self.close(TokenKind::RParen, &open, "')'")?;

        let mut spec = CrudSpec::new(target);
        if self.at(TokenKind::LBrace) {
            self.brace_body(|p| p.crud_property(&mut spec))?;
        }
        Ok(spec)
    }

    fn crud_property(&mut self, spec: &mut CrudSpec) -> ParseResult<()> {
        let start = self.start();
        let (key, span) = self.property_key()?;
        match key.as_str() {
            "filter" => spec.filter = Some(self.code()?),
            "lookup" => spec.lookup = Some(self.code()?),
            "can_edit" => spec.can_edit = Some(self.code()?),
            "theme" | "item" | "pk" | "block" => {
                self.expect(TokenKind::Colon)?;
                let value = Some(self.expect_name("name")?);
                match key.as_str() {
                    "theme" => spec.theme = value,
                    "item" => spec.item_name = value,
                    "pk" => spec.pk = value,
                    _ => spec.block = value,
                }
            }
            "url" => {
                self.expect(TokenKind::Colon)?;
                spec.url = Some(self.expect_string()?);
            }
            "fields" => {
                self.expect(TokenKind::Colon)?;
                spec.fields = Some(self.field_list()?);
            }
            "columns" => {
                self.expect(TokenKind::Colon)?;
                spec.list_fields = Some(self.field_list()?);
            }
            "skip" => {
                self.expect(TokenKind::Colon)?;
                spec.skip.insert(self.crud_view()?);
                while self.eat(TokenKind::Comma) {
                    spec.skip.insert(self.crud_view()?);
                }
            }
            "header" => {
                self.expect(TokenKind::Colon)?;
                spec.show_header = Some(self.expect_bool()?);
            }
            "style" => {
                self.expect(TokenKind::Colon)?;
                let style = match self.peek() {
                    TokenKind::Table => ListStyle::Table,
                    TokenKind::Stacked => ListStyle::Stacked,
                    TokenKind::Polymorphic => ListStyle::Polymorphic,
                    _ => return Err(self.unexpected("'table', 'stacked' or 'polymorphic'")),
                };
                self.advance();
                spec.list_style = Some(style);
            }
            "next" => {
                let event = self.expect_name("event name")?;
                let target = if self.eat(TokenKind::Arrow) {
                    NextTarget::Url(self.expect_string()?)
                } else {
                    NextTarget::Code(self.code()?)
                };
                spec.next.push(Node::new(NextPage { event, target }, self.span_from(start)));
            }
            "view" => {
                let view = self.crud_view()?;
                let mut body = PageBody::default();
                self.brace_body(|p| p.page_member(&mut body))?;
                spec.views.push(Node::new(ViewOverride { view, body }, self.span_from(start)));
            }
            _ => return Err(unknown_property("CRUD", &key, span)),
        }
        Ok(())
    }

    fn crud_view(&mut self) -> ParseResult<CrudView> {
        let (name, span) = self.property_key()?;
        CrudView::from_name(&name).ok_or_else(|| ParseError::InvalidSyntax {
            span,
            message: format!(
                "unknown view '{}', expected list, detail, create, edit or delete",
                name
            ),
        })
    }

    fn stream_property(&mut self, spec: &mut StreamSpec) -> ParseResult<()> {
        let (key, span) = self.property_key()?;
        match key.as_str() {
            "channel" => {
                self.expect(TokenKind::Colon)?;
                spec.channel = Some(self.expect_name("channel name")?);
            }
            "events" => {
                self.expect(TokenKind::Colon)?;
                spec.events.extend(self.name_list("event name")?);
            }
            _ => return Err(unknown_property("stream", &key, span)),
        }
        Ok(())
    }

    fn embed_spec(&mut self, framework: Framework) -> ParseResult<EmbedSpec> {
        let open = self.expect(TokenKind::LParen)?;
        let component = self.expect_name("component name")?;
        let mut child = false;
        if self.eat(TokenKind::Comma) {
            let (flag, span) = self.property_key()?;
            if flag != "child" {
                return Err(ParseError::InvalidSyntax {
                    span,
                    message: format!("unknown component option '{}'", flag),
                });
            }
            child = true;
        }
        self.close(TokenKind::RParen, &open, "',' or ')'")?;
        Ok(EmbedSpec {
            framework,
            component,
            child,
        })
    }

    fn menu_items(&mut self) -> ParseResult<Vec<Node<MenuItem>>> {
        let mut items = Vec::new();
        self.brace_body(|p| {
            items.push(p.menu_item()?);
            Ok(())
        })?;
        Ok(items)
    }

    fn menu_item(&mut self) -> ParseResult<Node<MenuItem>> {
        let start = self.start();
        let label = self.expect_string()?;
        let args = if self.at(TokenKind::LParen) {
            self.paren_list(Self::value)?
        } else {
            Vec::new()
        };
        let target = if self.eat(TokenKind::Arrow) {
            match self.peek() {
                TokenKind::StringLit => Some(MenuTarget::Url(self.expect_string()?)),
                TokenKind::LBracket => {
                    let open = self.advance();
                    let page = self.expect_name("page name")?;
                    self.close(TokenKind::RBracket, &open, "']'")?;
                    Some(MenuTarget::Page(page))
                }
                _ => return Err(self.unexpected("URL string or '[page]'")),
            }
        } else {
            None
        };
        let children = if self.at(TokenKind::LBrace) {
            self.menu_items()?
        } else {
            Vec::new()
        };
        Ok(Node::new(
            MenuItem {
                label,
                args,
                target,
                children,
            },
            self.span_from(start),
        ))
    }

    // ========================================
    // Helpers
    // ========================================

    fn property_key(&mut self) -> ParseResult<(String, Span)> {
        let span = self.current_span();
        let key = self.expect_name("property name")?;
        Ok((key, span))
    }

    /// `(name)` or nothing
    fn optional_paren_name(&mut self) -> ParseResult<Option<String>> {
        if self.at(TokenKind::LParen) {
            Ok(Some(self.paren_name("name")?))
        } else {
            Ok(None)
        }
    }

    fn paren_name(&mut self, what: &str) -> ParseResult<String> {
        let open = self.expect(TokenKind::LParen)?;
        let name = self.expect_name(what)?;
        self.close(TokenKind::RParen, &open, "')'")?;
        Ok(name)
    }

    fn unknown_annotation(&self, scope: &str) -> ParseError {
        if self.peek().is_name() {
            ParseError::InvalidSyntax {
                span: self.current_span(),
                message: format!("unknown {} annotation '@{}'", scope, self.current_text()),
            }
        } else {
            self.unexpected("annotation name")
        }
    }
}

fn unknown_property(scope: &str, key: &str, span: Span) -> ParseError {
    ParseError::InvalidSyntax {
        span,
        message: format!("unknown {} property '{}'", scope, key),
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parser::parse_with;
    use tessera_core::{Diagnostic, ParserOptions};

    fn parse(source: &str) -> (SourceFile, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let file = parse_with(source, &ParserOptions::default(), &mut diagnostics);
        (file, diagnostics)
    }

    fn parse_ok(source: &str) -> SourceFile {
        let (file, diagnostics) = parse(source);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {:?}", diagnostics);
        file
    }

    fn model_annotations(source: &str) -> Vec<ModelAnnotation> {
        parse_ok(source).collections[0]
            .inner
            .annotations
            .iter()
            .map(|a| a.inner.clone())
            .collect()
    }

    fn page_annotations(source: &str) -> Vec<PageAnnotation> {
        parse_ok(source).pages[0]
            .inner
            .annotations
            .iter()
            .map(|a| a.inner.clone())
            .collect()
    }

    #[test]
    fn test_file_annotations() {
        let src = r##"@ci(gitlab) {
    image: "python:3.12"
    branches: main, develop
    stage test = pytest -q
    stage lint:
        ruff check .
        mypy .
}
@theme(dark) {
    primary: "#ff0000"
    radius: 4
}
@languages(en, "pt-br")
@static("assets" -> "/static", "media")
@tasks(celery)
@sockets
@docker
"##;
        let file = parse_ok(src);
        let annotations: Vec<_> = file.annotations.iter().map(|a| &a.inner).collect();
        assert_eq!(annotations.len(), 7);

        match annotations[0] {
            FileAnnotation::Ci(ci) => {
                assert_eq!(ci.provider.as_deref(), Some("gitlab"));
                assert_eq!(ci.image.as_deref(), Some("python:3.12"));
                assert_eq!(ci.branches, vec!["main".to_string(), "develop".to_string()]);
                assert_eq!(ci.stages.len(), 2);
                assert_eq!(ci.stages[0].inner.script, Code::line("pytest -q"));
                assert_eq!(ci.stages[1].inner.script, Code::block("ruff check .\nmypy ."));
            }
            other => panic!("unexpected annotation {:?}", other),
        }
        match annotations[1] {
            FileAnnotation::Theme(theme) => {
                assert_eq!(theme.name.as_deref(), Some("dark"));
                assert_eq!(theme.settings[0].value, Value::String("#ff0000".into()));
                assert_eq!(theme.settings[1].value, Value::Integer(4));
            }
            other => panic!("unexpected annotation {:?}", other),
        }
        assert_eq!(
            annotations[2],
            &FileAnnotation::Languages(vec!["en".into(), "pt-br".into()])
        );
        assert_eq!(
            annotations[3],
            &FileAnnotation::Static(vec![
                StaticEntry { path: "assets".into(), mount: Some("/static".into()) },
                StaticEntry { path: "media".into(), mount: None },
            ])
        );
        assert_eq!(
            annotations[4],
            &FileAnnotation::Tasks(ServiceToggle { backend: Some("celery".into()) })
        );
        assert_eq!(annotations[5], &FileAnnotation::Sockets(ServiceToggle::default()));
        assert_eq!(annotations[6], &FileAnnotation::Docker(ServiceToggle::default()));
    }

    #[test]
    fn test_default_rest() {
        let annotations = model_annotations("#Article\n  @rest\n");
        assert_eq!(annotations, vec![ModelAnnotation::Rest(RestSpec::default())]);
    }

    #[test]
    fn test_rest_properties() {
        let src = r#"#Article
  @rest {
    i18n
    query = Article.objects.published()
    read: id, created
    fields: *, -secret
    auth: token(#ApiKey), session, myapp.auth.Custom
    inline comments: #Comment (id, body)
    annotate score = F("votes") * 2
    count: comments, likes
  }
"#;
        let annotations = model_annotations(src);
        let ModelAnnotation::Rest(rest) = &annotations[0] else {
            panic!("expected @rest, got {:?}", annotations[0]);
        };
        assert!(rest.i18n);
        assert_eq!(rest.query, Some(Code::line("Article.objects.published()")));
        assert_eq!(rest.field_lists.len(), 2);
        assert_eq!(rest.field_lists[0].mode, AccessMode::ReadOnly);
        assert_eq!(rest.field_lists[1].mode, AccessMode::ReadWrite);
        assert_eq!(rest.field_lists[1].fields.entries, vec![
            FieldListEntry { negated: false, target: FieldRef::All },
            FieldListEntry { negated: true, target: FieldRef::Name("secret".into()) },
        ]);
        assert_eq!(rest.auth, vec![
            AuthMethod::Token { model: Some(ModelTarget::Local("ApiKey".into())) },
            AuthMethod::Session,
            AuthMethod::Custom(QualifiedName::new(vec!["myapp".into(), "auth".into(), "Custom".into()])),
        ]);
        let inline = &rest.inlines[0].inner;
        assert_eq!(inline.name, "comments");
        assert_eq!(inline.target, ModelTarget::Local("Comment".into()));
        assert_eq!(inline.fields.as_ref().unwrap().names().collect::<Vec<_>>(), vec!["id", "body"]);
        assert_eq!(rest.annotations[0].inner.code, Code::line("F(\"votes\") * 2"));
        assert_eq!(rest.counts, vec!["comments".to_string(), "likes".to_string()]);
    }

    #[test]
    fn test_admin() {
        let src = r#"#Article
  @admin {
    list: title, author, -body
    search: title, body
    filter: author
    readonly: created
    inline: #Comment, media.Attachment
    fieldset "Content": title, body
  }
"#;
        let annotations = model_annotations(src);
        let ModelAnnotation::Admin(admin) = &annotations[0] else {
            panic!("expected @admin, got {:?}", annotations[0]);
        };
        assert_eq!(admin.list.as_ref().unwrap().entries.len(), 3);
        assert_eq!(admin.search.len(), 2);
        assert_eq!(admin.filters, vec!["author".to_string()]);
        assert_eq!(admin.readonly, vec!["created".to_string()]);
        assert_eq!(admin.inlines.len(), 2);
        assert_eq!(admin.fieldsets[0].inner.title, "Content");
    }

    #[test]
    fn test_simple_model_annotations() {
        let src = "#Node\n  @api\n  @ordering(-created, title)\n  @tree(parent, polymorphic)\n  @date_hierarchy(created)\n  @mixin(core.mixins.Timestamped)\n  @sortable(position)\n  @unique(slug, site)\n";
        let annotations = model_annotations(src);
        assert_eq!(annotations, vec![
            ModelAnnotation::Api,
            ModelAnnotation::Ordering(vec![
                OrderingTerm { field: "created".into(), descending: true },
                OrderingTerm { field: "title".into(), descending: false },
            ]),
            ModelAnnotation::Tree(TreeSpec { parent: Some("parent".into()), polymorphic: true }),
            ModelAnnotation::DateHierarchy("created".into()),
            ModelAnnotation::Mixin(vec![QualifiedName::new(vec!["core".into(), "mixins".into(), "Timestamped".into()])]),
            ModelAnnotation::Sortable("position".into()),
            ModelAnnotation::Unique(vec!["slug".into(), "site".into()]),
        ]);
    }

    #[test]
    fn test_hook_annotations() {
        let src = "#Order\n  @validate:\n    if self.total < 0:\n        raise Invalid()\n  @pre_save = self.touch()\n  @post_save = notify(self)\n  @pre_delete = archive(self)\n  @post_delete = log(self)\n  @m2m_changed(tags) = reindex(self)\n";
        let annotations = model_annotations(src);
        assert_eq!(annotations.len(), 6);
        assert_eq!(
            annotations[0],
            ModelAnnotation::Validate(Code::block("if self.total < 0:\n    raise Invalid()"))
        );
        assert_eq!(annotations[1], ModelAnnotation::PreSave(Code::line("self.touch()")));
        assert_eq!(
            annotations[5],
            ModelAnnotation::M2mChanged { field: Some("tags".into()), code: Code::line("reindex(self)") }
        );
    }

    #[test]
    fn test_crud_family_shares_spec() {
        let src = r#"[articles: /articles]
  @crud(#Article) {
    filter = published=True
    theme: compact
    url: "items"
    item: article
    fields: title, body
    columns: title, -*
    pk: slug
    skip: delete, edit
    block: content
    lookup = slug
    can_edit = request.user.is_staff
    header: false
    style: stacked
    next create -> "/thanks"
    next edit = reverse("article", pk)
    view detail {
      title = "Article"
      comments(request):
        return load(request)
    }
  }
  @list(blog.Post)
  @detail(#Post)
  @create(#Post)
  @edit(#Post)
  @delete(#Post)
"#;
        let annotations = page_annotations(src);
        assert_eq!(annotations.len(), 6);
        let (view, crud) = annotations[0].crud().unwrap();
        assert_eq!(view, None);
        assert_eq!(crud.target, ModelTarget::Local("Article".into()));
        assert_eq!(crud.filter, Some(Code::line("published=True")));
        assert_eq!(crud.theme.as_deref(), Some("compact"));
        assert_eq!(crud.url.as_deref(), Some("items"));
        assert_eq!(crud.item_name.as_deref(), Some("article"));
        assert_eq!(crud.pk.as_deref(), Some("slug"));
        assert_eq!(crud.block.as_deref(), Some("content"));
        assert!(crud.skip.contains(&CrudView::Delete) && crud.skip.contains(&CrudView::Edit));
        assert_eq!(crud.list_fields.as_ref().unwrap().entries[1], FieldListEntry { negated: true, target: FieldRef::All });
        assert_eq!(crud.lookup, Some(Code::line("slug")));
        assert_eq!(crud.can_edit, Some(Code::line("request.user.is_staff")));
        assert_eq!(crud.show_header, Some(false));
        assert_eq!(crud.list_style, Some(ListStyle::Stacked));
        assert_eq!(crud.next.len(), 2);
        assert_eq!(crud.next[0].inner.target, NextTarget::Url("/thanks".into()));
        assert_eq!(crud.views.len(), 1);
        let detail = &crud.views[0].inner;
        assert_eq!(detail.view, CrudView::Detail);
        assert_eq!(detail.body.fields.len(), 1);
        assert_eq!(detail.body.functions.len(), 1);

        let views: Vec<_> = annotations[1..].iter().map(|a| a.crud().unwrap().0).collect();
        assert_eq!(views, vec![
            Some(CrudView::List),
            Some(CrudView::Detail),
            Some(CrudView::Create),
            Some(CrudView::Edit),
            Some(CrudView::Delete),
        ]);
        assert_eq!(
            annotations[1].crud().unwrap().1.target,
            ModelTarget::External(QualifiedName::new(vec!["blog".into(), "Post".into()]))
        );
    }

    #[test]
    fn test_other_page_annotations() {
        let src = r#"[live: /live]
  @stream(#Message, #Room) {
    channel: chat
    events: created, deleted
  }
  @react(Chat, child)
  @html(banner) = <b>hi</b>
  @markdown "live/intro.md"
  @login(app.view_live, app.chat)
  @get = handle_get(request)
  @post:
    save(request)
  @error(404)
  @priority(-2)
  @priority
"#;
        let annotations = page_annotations(src);
        assert_eq!(annotations.len(), 10);
        assert_eq!(
            annotations[0],
            PageAnnotation::Stream(StreamSpec {
                targets: vec![ModelTarget::Local("Message".into()), ModelTarget::Local("Room".into())],
                channel: Some("chat".into()),
                events: vec!["created".into(), "deleted".into()],
            })
        );
        assert_eq!(
            annotations[1],
            PageAnnotation::Embed(EmbedSpec { framework: Framework::React, component: "Chat".into(), child: true })
        );
        assert_eq!(
            annotations[2],
            PageAnnotation::Raw(RawBlock {
                format: RawFormat::Html,
                name: Some("banner".into()),
                content: PageContent::Code(Code::line("<b>hi</b>")),
            })
        );
        assert_eq!(
            annotations[3],
            PageAnnotation::Raw(RawBlock {
                format: RawFormat::Markdown,
                name: None,
                content: PageContent::Template("live/intro.md".into()),
            })
        );
        match &annotations[4] {
            PageAnnotation::Auth(guard) => assert_eq!(guard.permissions.len(), 2),
            other => panic!("unexpected annotation {:?}", other),
        }
        assert_eq!(annotations[5], PageAnnotation::Get(Code::line("handle_get(request)")));
        assert_eq!(annotations[6], PageAnnotation::Post(Code::block("save(request)")));
        assert_eq!(annotations[7], PageAnnotation::ErrorPage(404));
        assert_eq!(annotations[8], PageAnnotation::Priority(Some(-2)));
        assert_eq!(annotations[9], PageAnnotation::Priority(None));
    }

    #[test]
    fn test_menu() {
        let src = r#"[nav]
  @menu(main) {
    "Home" -> "/"
    "Blog" -> [blog] {
      "Latest"("recent", 5) -> "/blog/latest"
      "Archive"
    }
  }
"#;
        let annotations = page_annotations(src);
        let PageAnnotation::Menu(menu) = &annotations[0] else {
            panic!("expected @menu, got {:?}", annotations[0]);
        };
        assert_eq!(menu.name.as_deref(), Some("main"));
        assert_eq!(menu.items.len(), 2);
        assert_eq!(menu.items[0].inner.target, Some(MenuTarget::Url("/".into())));
        let blog = &menu.items[1].inner;
        assert_eq!(blog.target, Some(MenuTarget::Page("blog".into())));
        assert_eq!(blog.children.len(), 2);
        assert_eq!(blog.children[0].inner.args, vec![Value::String("recent".into()), Value::Integer(5)]);
        assert!(blog.children[1].inner.target.is_none());
    }

    #[test]
    fn test_menu_nesting_limit() {
        let options = ParserOptions {
            max_nesting: 2,
            ..ParserOptions::default()
        };
        let src = "[nav]\n  @menu {\n    \"a\" {\n      \"b\" {\n        \"c\"\n      }\n    }\n  }\n  x = 1\n";
        let mut diagnostics = Vec::new();
        let file = parse_with(src, &options, &mut diagnostics);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "nesting deeper than 2 levels");
        // The rest of the page still parses
        assert_eq!(file.pages[0].inner.body.fields.len(), 1);
    }

    #[test]
    fn test_unknown_annotation() {
        let (file, diagnostics) = parse("#A\n  @nonsense\n  a: int\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "unknown collection annotation '@nonsense'");
        assert_eq!(file.collections[0].inner.fields.len(), 1);
    }

    #[test]
    fn test_bad_property_recovers_inside_block() {
        let src = "#A\n  @rest {\n    bogus: 1\n    i18n\n  }\n  b: int\n";
        let (file, diagnostics) = parse(src);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "unknown REST property 'bogus'");
        assert_eq!(diagnostics[0].line, 3);
        let a = &file.collections[0].inner;
        assert_eq!(a.annotations[0].inner, ModelAnnotation::Rest(RestSpec { i18n: true, ..RestSpec::default() }));
        assert_eq!(a.fields.len(), 1);
    }

    #[test]
    fn test_unclosed_brace_reported_at_opener() {
        let (file, diagnostics) = parse("#A\n  @admin {\n    search: title\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "unclosed '{'");
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 9));
        assert_eq!(file.collections[0].inner.annotations.len(), 1);
    }

    #[test]
    fn test_keyword_as_annotation_argument() {
        let annotations = model_annotations("#A\n  @unique(date, list, import)\n  @ordering(-str)\n");
        assert_eq!(
            annotations[0],
            ModelAnnotation::Unique(vec!["date".into(), "list".into(), "import".into()])
        );
    }
}
