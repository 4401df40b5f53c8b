use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tessera_syntax::{parse, tokenize};

const SOURCE: &str = r#"@ci(gitlab) {
    image: "python:3.12"
    stage test = pytest -q
}
@languages(en, de)

import [base] from shared.pages

[home: /]
  title = "Home"

[articles <- base: /articles/<slug:slug>/]
  @crud(#Article) {
    fields: title, body, author
    skip: delete
    next create -> "/thanks"
  }
  @login(blog.view_article)
  context(request):
    return {"now": now()}

import #User from accounts.models

#Article "article" "articles"
  !title: str(200) "Title" `Shown in lists`
  ^slug: slug(title)
  body: richhtml
  author: one!![#User -> articles]
  status: int[1: "Draft", 2: "Published"]
  price: decimal(10, 2)
  cover: image(thumb(120, 80) crop, large(1200, 800))
  created: created
  %word_count = len(self.body.split())
  @rest {
    fields: *, -status
    auth: token, session
  }
  @ordering(-created)
  @validate:
    if not self.title:
        raise ValueError("title")

#Comment
  article: one[#Article -> comments]
  body: longtext
"#;

fn source_of(copies: usize) -> String {
    let mut out = String::with_capacity(SOURCE.len() * copies);
    for i in 0..copies {
        // Rename collections so every copy is a fresh declaration
        out.push_str(&SOURCE.replace("#Comment", &format!("#Comment{}", i)));
    }
    out
}

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("syntax/tokenize_min", |b| {
        b.iter(|| {
            let tokens = tokenize(black_box(SOURCE));
            black_box(tokens.len());
        });
    });
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("syntax/parse_min", |b| {
        b.iter(|| {
            let output = parse(black_box(SOURCE));
            black_box(output.file.collections.len());
        });
    });

    let large = source_of(50);
    c.bench_function("syntax/parse_large", |b| {
        b.iter(|| {
            let output = parse(black_box(&large));
            black_box(output.diagnostics.len());
        });
    });
}

criterion_group!(benches, bench_tokenize, bench_parse);
criterion_main!(benches);
