//! Abstract Syntax Tree for Tessera source files
//!
//! This module defines all AST nodes. Nodes are plain data: they are built
//! once by the parser and never mutated afterwards.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tessera_core::Span;

/// A node with source location information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node<T> {
    pub inner: T,
    pub span: Span,
}

impl<T> Node<T> {
    pub fn new(inner: T, span: Span) -> Self {
        Self { inner, span }
    }
}

/// Root AST node - represents one source file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceFile {
    /// File-level annotations (`@ci`, `@theme`, ...)
    pub annotations: Vec<Node<FileAnnotation>>,

    /// `import [a, b] from ...`
    pub page_imports: Option<Node<ImportList>>,

    pub pages: Vec<Node<PageDecl>>,

    /// `import #A, #B from ...`
    pub model_imports: Option<Node<ImportList>>,

    pub collections: Vec<Node<CollectionDecl>>,
}

impl SourceFile {
    pub fn collection(&self, name: &str) -> Option<&CollectionDecl> {
        self.collections
            .iter()
            .map(|c| &c.inner)
            .find(|c| c.name == name)
    }

    pub fn page(&self, name: &str) -> Option<&PageDecl> {
        self.pages.iter().map(|p| &p.inner).find(|p| p.name == name)
    }
}

// ============================================================
// Shared pieces
// ============================================================

/// Dotted name: `app.models.User`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct QualifiedName {
    pub parts: Vec<String>,
}

impl QualifiedName {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    /// Last component
    pub fn name(&self) -> &str {
        self.parts.last().map_or("", String::as_str)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportList {
    pub names: Vec<String>,
    pub from: Option<QualifiedName>,
}

/// Literal or name used as an argument
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Name(QualifiedName),
}

/// How a code fragment was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeMode {
    /// `= expr` on one line
    Line,
    /// Indented block after `:`
    Block,
}

/// Verbatim target-language code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Code {
    pub mode: CodeMode,
    pub text: String,
}

impl Code {
    pub fn line(text: impl Into<String>) -> Self {
        Self { mode: CodeMode::Line, text: text.into() }
    }

    pub fn block(text: impl Into<String>) -> Self {
        Self { mode: CodeMode::Block, text: text.into() }
    }
}

/// `<-` replaces the base, `<+` merges into it. The generator decides what
/// that means; the parser only records which marker was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritMode {
    Replace,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inheritance {
    pub mode: InheritMode,
    pub base: String,
}

/// Reference to a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTarget {
    /// `#User`
    Local(String),
    /// `auth.models.User`
    External(QualifiedName),
}

/// `a, -b, *, -*`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldList {
    pub entries: Vec<FieldListEntry>,
}

impl FieldList {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match &e.target {
            FieldRef::Name(name) if !e.negated => Some(name.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldListEntry {
    pub negated: bool,
    pub target: FieldRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRef {
    All,
    Name(String),
}

// ============================================================
// Collections
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionDecl {
    pub name: String,
    pub inherits: Option<Inheritance>,
    pub verbose_name: Option<VerboseName>,
    pub fields: Vec<Node<FieldDecl>>,
    pub annotations: Vec<Node<ModelAnnotation>>,
}

impl CollectionDecl {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().map(|f| &f.inner).find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerboseName {
    pub singular: String,
    pub plural: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldModifier {
    Unique,
    Nullable,
    Indexed,
    Static,
    Computed,
    Reference,
    Hidden,
}

impl FieldModifier {
    pub fn sigil(self) -> &'static str {
        match self {
            FieldModifier::Unique => "!",
            FieldModifier::Nullable => "?",
            FieldModifier::Indexed => "^",
            FieldModifier::Static => "$",
            FieldModifier::Computed => "%",
            FieldModifier::Reference => "&",
            FieldModifier::Hidden => "~",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDecl {
    pub modifiers: BTreeSet<FieldModifier>,
    pub name: String,
    pub body: Option<FieldBody>,
    pub verbose_name: Option<String>,
    pub help_text: Option<String>,
}

impl FieldDecl {
    pub fn has_modifier(&self, modifier: FieldModifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    pub fn spec(&self) -> Option<&FieldSpec> {
        match &self.body {
            Some(FieldBody::Spec(spec)) => Some(spec),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldBody {
    /// `name: type`
    Spec(FieldSpec),
    /// `name = expr` or `name:` + block
    Code(Code),
    /// `name += expr` or `name +:` + block
    Extend(Code),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSpec {
    Text { size: Option<u32>, choices: Vec<Choice> },
    LongText,
    Html,
    RichHtml,
    Integer { choices: Vec<Choice> },
    Float,
    Decimal { digits: Option<u32>, places: Option<u32> },
    Date,
    DateTime,
    CreatedAt,
    UpdatedAt,
    File,
    Image { sizes: Vec<ImageSize> },
    TypedFile(FileKind),
    Slug { sources: Vec<String> },
    Boolean { default: Option<bool> },
    Relation(RelationSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub value: Value,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Audio,
    Video,
    Archive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    One,
    OneToOne,
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationSpec {
    pub kind: RelationKind,
    /// `!!`: delete dependents with the target
    pub cascade: bool,
    pub target: Option<ModelTarget>,
    pub related_name: Option<String>,
}

// ============================================================
// Model annotations
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelAnnotation {
    Admin(AdminSpec),
    Api,
    Rest(RestSpec),
    Ordering(Vec<OrderingTerm>),
    Validate(Code),
    PreSave(Code),
    PostSave(Code),
    PreDelete(Code),
    PostDelete(Code),
    M2mChanged { field: Option<String>, code: Code },
    Tree(TreeSpec),
    DateHierarchy(String),
    Mixin(Vec<QualifiedName>),
    Sortable(String),
    Unique(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdminSpec {
    pub list: Option<FieldList>,
    pub search: Vec<String>,
    pub filters: Vec<String>,
    pub readonly: Vec<String>,
    pub inlines: Vec<ModelTarget>,
    pub fieldsets: Vec<Node<Fieldset>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fieldset {
    pub title: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestSpec {
    pub i18n: bool,
    pub query: Option<Code>,
    pub field_lists: Vec<RestFieldList>,
    pub auth: Vec<AuthMethod>,
    pub inlines: Vec<Node<InlineResource>>,
    pub annotations: Vec<Node<Annotate>>,
    pub counts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestFieldList {
    pub mode: AccessMode,
    pub fields: FieldList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Token { model: Option<ModelTarget> },
    Session,
    Basic,
    Jwt,
    Custom(QualifiedName),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineResource {
    pub name: String,
    pub target: ModelTarget,
    pub fields: Option<FieldList>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotate {
    pub name: String,
    pub code: Code,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderingTerm {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeSpec {
    pub parent: Option<String>,
    pub polymorphic: bool,
}

// ============================================================
// Pages
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageDecl {
    pub name: String,
    pub inherits: Option<Inheritance>,
    pub alias: Option<String>,
    pub url: Option<UrlPattern>,
    pub content: Option<PageContent>,
    pub body: PageBody,
    pub annotations: Vec<Node<PageAnnotation>>,
}

/// `/blog/<int:id>/`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlPattern {
    /// Empty for the root URL
    pub segments: Vec<UrlSegment>,
    pub trailing_slash: bool,
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            match segment {
                UrlSegment::Literal(text) => write!(f, "/{}", text)?,
                UrlSegment::Param { name, converter: Some(conv) } => write!(f, "/<{}:{}>", conv, name)?,
                UrlSegment::Param { name, converter: None } => write!(f, "/<{}>", name)?,
            }
        }
        if self.trailing_slash {
            write!(f, "/")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlSegment {
    Literal(String),
    Param { name: String, converter: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageContent {
    /// Template path
    Template(String),
    Code(Code),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageBody {
    pub fields: Vec<Node<PageField>>,
    pub functions: Vec<Node<PageFunction>>,
    /// Trailing free-form block
    pub code: Option<Node<Code>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageField {
    pub name: String,
    pub code: Code,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Option<Code>,
}

// ============================================================
// Page annotations
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageAnnotation {
    Crud(CrudSpec),
    List(CrudSpec),
    Detail(CrudSpec),
    Create(CrudSpec),
    Edit(CrudSpec),
    Delete(CrudSpec),
    Stream(StreamSpec),
    Embed(EmbedSpec),
    Raw(RawBlock),
    Menu(MenuSpec),
    Auth(AuthGuard),
    Get(Code),
    Post(Code),
    ErrorPage(u16),
    Priority(Option<i64>),
}

impl PageAnnotation {
    /// The shared CRUD body of `@crud`, `@list`, `@detail`, `@create`,
    /// `@edit` and `@delete`. `None` view means `@crud`.
    pub fn crud(&self) -> Option<(Option<CrudView>, &CrudSpec)> {
        match self {
            PageAnnotation::Crud(spec) => Some((None, spec)),
            PageAnnotation::List(spec) => Some((Some(CrudView::List), spec)),
            PageAnnotation::Detail(spec) => Some((Some(CrudView::Detail), spec)),
            PageAnnotation::Create(spec) => Some((Some(CrudView::Create), spec)),
            PageAnnotation::Edit(spec) => Some((Some(CrudView::Edit), spec)),
            PageAnnotation::Delete(spec) => Some((Some(CrudView::Delete), spec)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudView {
    List,
    Detail,
    Create,
    Edit,
    Delete,
}

impl CrudView {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "list" => Some(CrudView::List),
            "detail" => Some(CrudView::Detail),
            "create" => Some(CrudView::Create),
            "edit" => Some(CrudView::Edit),
            "delete" => Some(CrudView::Delete),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CrudView::List => "list",
            CrudView::Detail => "detail",
            CrudView::Create => "create",
            CrudView::Edit => "edit",
            CrudView::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrudSpec {
    pub target: ModelTarget,
    pub filter: Option<Code>,
    pub theme: Option<String>,
    pub url: Option<String>,
    pub item_name: Option<String>,
    pub fields: Option<FieldList>,
    pub list_fields: Option<FieldList>,
    pub pk: Option<String>,
    pub skip: BTreeSet<CrudView>,
    pub block: Option<String>,
    pub lookup: Option<Code>,
    pub can_edit: Option<Code>,
    pub show_header: Option<bool>,
    pub list_style: Option<ListStyle>,
    pub next: Vec<Node<NextPage>>,
    pub views: Vec<Node<ViewOverride>>,
}

impl CrudSpec {
    pub fn new(target: ModelTarget) -> Self {
        Self {
            target,
            filter: None,
            theme: None,
            url: None,
            item_name: None,
            fields: None,
            list_fields: None,
            pk: None,
            skip: BTreeSet::new(),
            block: None,
            lookup: None,
            can_edit: None,
            show_header: None,
            list_style: None,
            next: Vec::new(),
            views: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStyle {
    Table,
    Stacked,
    Polymorphic,
}

/// Where to go after a CRUD event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextPage {
    pub event: String,
    pub target: NextTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextTarget {
    Code(Code),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewOverride {
    pub view: CrudView,
    pub body: PageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSpec {
    pub targets: Vec<ModelTarget>,
    pub channel: Option<String>,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    React,
    Vue,
    Svelte,
}

/// Client-side component mounted in the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedSpec {
    pub framework: Framework,
    pub component: String,
    pub child: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RawFormat {
    Html,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawBlock {
    pub format: RawFormat,
    pub name: Option<String>,
    pub content: PageContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MenuSpec {
    pub name: Option<String>,
    pub items: Vec<Node<MenuItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuItem {
    pub label: String,
    pub args: Vec<Value>,
    pub target: Option<MenuTarget>,
    pub children: Vec<Node<MenuItem>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuTarget {
    Url(String),
    Page(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthGuard {
    pub permissions: Vec<QualifiedName>,
}

// ============================================================
// File annotations
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAnnotation {
    Ci(CiSpec),
    Theme(ThemeSpec),
    Languages(Vec<String>),
    Static(Vec<StaticEntry>),
    Tasks(ServiceToggle),
    Sockets(ServiceToggle),
    Docker(ServiceToggle),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CiSpec {
    pub provider: Option<String>,
    pub image: Option<String>,
    pub branches: Vec<String>,
    pub stages: Vec<Node<CiStage>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CiStage {
    pub name: String,
    pub script: Code,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThemeSpec {
    pub name: Option<String>,
    pub settings: Vec<Setting>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setting {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticEntry {
    pub path: String,
    pub mount: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceToggle {
    pub backend: Option<String>,
}
