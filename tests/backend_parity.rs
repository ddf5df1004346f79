//! Interpreter and compiled backends, cached and live, must agree

use std::sync::Arc;

use indoc::indoc;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;

use quire::tree::{walk_nodes, Node};
use quire::{
    Backend, CompileErrorKind, CompileOptions, CompiledFileSet, CssRenamingMap, MessageCatalog,
    Record, RenamingMap, RenderError, Value,
};

const SHOP: &str = indoc! {r#"
    namespace shop
    template .page kind="html" {
        param user
        param items
        param? theme
        msg desc="Welcome line" { "Welcome back, " $user.name "!" }
        " <ul class=\"" css "list" "\">"
        for $item in $items {
            let $price = $item.price * 2
            call .row { param label = $item.label param price = $price }
        } ifempty { "<li>" msg desc="Empty cart" { "Nothing here" } "</li>" }
        "</ul>"
        if $user.vip { css $theme, "vip" } elif length($items) > 2 { "many" } else { "few" }
        " " print bidiStartEdge() " " print bidiMark() |escapeUri
        call .wrap { param body kind="html" { "<b>" $user.name "</b>" } }
        delcall shop.Promo allowemptydefault="true"
    }
    template .row { param label param price "<li>" $label ": " $price "</li>" }
    template .wrap { param body "[" $body "]" }
    deltemplate shop.Promo { " promo" }
"#};

fn compile(backend: Backend, caching: bool) -> CompiledFileSet {
    let sources = vec![("shop.tpl".to_string(), SHOP.to_string())];
    let options = CompileOptions::new()
        .with_backend(backend)
        .with_caching(caching);
    match CompiledFileSet::from_sources(&sources, options) {
        Ok(files) => files,
        Err(errors) => panic!("compile failed: {}", errors),
    }
}

fn msg_ids(files: &CompiledFileSet) -> Vec<u64> {
    let mut ids = Vec::new();
    walk_nodes(&files.registry().get("shop.page").unwrap().body, &mut |node| {
        if let Node::Msg(msg) = node {
            ids.push(msg.id);
        }
    });
    ids
}

fn data_sets() -> Vec<Record> {
    let item = |label: &str, price: i64| {
        Value::from(
            Record::new()
                .with("label", label)
                .with("price", Value::Int(price)),
        )
    };
    let user = |name: &str, vip: bool| Record::new().with("name", name).with("vip", vip);
    vec![
        Record::new()
            .with("user", user("<Ann>", false))
            .with("items", Value::List(vec![item("tea", 3), item("cake & jam", 5)])),
        Record::new()
            .with("user", user("Bo", true))
            .with("items", Value::List(vec![]))
            .with("theme", "dark"),
        Record::new()
            .with("user", user("Cy", false))
            .with(
                "items",
                Value::List(vec![item("a", 1), item("b", 2), item("c", 3)]),
            ),
    ]
}

struct Substitutions {
    catalog: Option<Arc<MessageCatalog>>,
    css_map: Option<Arc<dyn CssRenamingMap>>,
}

fn substitutions(ids: &[u64]) -> Vec<Substitutions> {
    let hebrew = ids.iter().enumerate().fold(
        MessageCatalog::new(Some("he")),
        |catalog, (i, id)| match i {
            0 => catalog.with_message(*id, "!{NAME} ,שלום"),
            _ => catalog.with_message(*id, "ריק"),
        },
    );
    let css: Arc<dyn CssRenamingMap> =
        Arc::new(RenamingMap::new().with("list", "l").with("vip", "v"));
    vec![
        Substitutions {
            catalog: None,
            css_map: None,
        },
        Substitutions {
            catalog: Some(Arc::new(hebrew)),
            css_map: None,
        },
        Substitutions {
            catalog: None,
            css_map: Some(css.clone()),
        },
    ]
}

fn render(files: &CompiledFileSet, subs: &Substitutions, data: &Record) -> String {
    let mut renderer = files.new_renderer("shop.page").with_data(data.clone());
    if let Some(catalog) = &subs.catalog {
        renderer = renderer.with_message_catalog(catalog.clone());
    }
    if let Some(map) = &subs.css_map {
        renderer = renderer.with_css_renaming_map(map.clone());
    }
    match renderer.render() {
        Ok(out) => out,
        Err(err) => panic!("render failed: {}", err),
    }
}

#[test]
fn test_all_configurations_agree() {
    let reference = compile(Backend::Interpreter, false);
    let ids = msg_ids(&reference);
    assert_eq!(ids.len(), 2);
    let variants = [
        compile(Backend::Interpreter, true),
        compile(Backend::Compiled, false),
        compile(Backend::Compiled, true),
    ];

    for subs in substitutions(&ids) {
        for data in data_sets() {
            let expected = render(&reference, &subs, &data);
            for files in &variants {
                assert_eq!(render(files, &subs, &data), expected);
            }
        }
    }
}

#[test]
fn test_reference_output() {
    let files = compile(Backend::Compiled, true);
    let subs = substitutions(&msg_ids(&files));
    let data = data_sets();
    assert_snapshot!(
        render(&files, &subs[0], &data[0]),
        @r#"Welcome back, &lt;Ann&gt;! <ul class="list"><li>tea: 6</li><li>cake &amp; jam: 10</li></ul>few left %E2%80%8E[<b>&lt;Ann&gt;</b>] promo"#
    );
    assert_snapshot!(
        render(&files, &subs[2], &data[1]),
        @r#"Welcome back, Bo! <ul class="l"><li>Nothing here</li></ul>dark-v left %E2%80%8E[<b>Bo</b>] promo"#
    );
}

#[test]
fn test_repeated_renders_are_deterministic() {
    let files = compile(Backend::Interpreter, true);
    let subs = substitutions(&msg_ids(&files));
    for subs in &subs {
        for data in data_sets() {
            assert_eq!(render(&files, subs, &data), render(&files, subs, &data));
        }
    }
}

#[test]
fn test_compiled_backend_reports_unsupported_features() {
    let sources = vec![(
        "a.tpl".to_string(),
        indoc! {r#"
            namespace ns
            template .a { print round(1, 2, 3) }
            template .b { print mystery() }
        "#}
        .to_string(),
    )];
    let options = CompileOptions::new().with_backend(Backend::Compiled);
    let errors = match CompiledFileSet::from_sources(&sources, options) {
        Err(errors) => errors,
        Ok(_) => panic!("expected unsupported features"),
    };
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e.kind, CompileErrorKind::UnsupportedFeature { .. })));

    let interpreted = CompiledFileSet::from_sources(&sources, CompileOptions::default()).unwrap();
    assert!(matches!(
        interpreted.new_renderer("ns.b").render(),
        Err(RenderError::Eval(_))
    ));
}

#[test]
fn test_deep_recursion_stops_on_a_small_stack() {
    let sources = vec![(
        "a.tpl".to_string(),
        r#"namespace ns template .loop { param n call .loop data="all" }"#.to_string(),
    )];
    for backend in [Backend::Interpreter, Backend::Compiled] {
        let sources = sources.clone();
        let result = std::thread::Builder::new()
            .stack_size(2 << 20)
            .spawn(move || {
                let files = CompiledFileSet::from_sources(
                    &sources,
                    CompileOptions::new().with_backend(backend),
                )
                .unwrap();
                files
                    .new_renderer("ns.loop")
                    .with_data(Record::new().with("n", Value::Int(1)))
                    .render()
            })
            .unwrap()
            .join()
            .unwrap();
        assert!(matches!(
            result,
            Err(RenderError::CallDepthExceeded { limit: 256, .. })
        ));
    }
}

#[test]
fn test_errors_match_between_backends() {
    let sources = vec![(
        "a.tpl".to_string(),
        indoc! {r#"
            namespace ns
            template .loop { call .loop }
            template .bad { for $x in 3 { $x } }
            template .needs { param who $who }
            template .caller { call .needs }
            template .ghost { call .missing }
        "#}
        .to_string(),
    )];
    for backend in [Backend::Interpreter, Backend::Compiled] {
        let files =
            CompiledFileSet::from_sources(&sources, CompileOptions::new().with_backend(backend))
                .unwrap();
        let render = |name: &str| files.new_renderer(name).render().unwrap_err().to_string();
        assert_eq!(
            render("ns.loop"),
            "call depth limit of 256 exceeded in template ns.loop"
        );
        assert_eq!(
            render("ns.bad"),
            "evaluation error: 'for' expects a list, found int"
        );
        assert_eq!(
            render("ns.caller"),
            "template ns.needs requires parameter 'who'"
        );
        assert_eq!(render("ns.ghost"), "template ns.missing is not defined");
    }
}
