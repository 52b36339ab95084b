//! End-to-end conformance scenarios, exercised against the public
//! `JsEngine` surface rather than any internal module. Numbered comments
//! below track the engine's design-note scenario list one for one.

use script_engine::JsEngine;
use script_engine::gherkin;
use script_engine::source::SourceBuffer;
use std::rc::Rc;

fn eval_str(engine: &JsEngine, src: &str) -> String {
    match engine.eval(src) {
        Ok(v) => script_engine::terms::to_js_string(&v),
        Err(e) => panic!("eval({src:?}) failed: {e}"),
    }
}

#[test]
fn scenario_1_closures() {
    let engine = JsEngine::new();
    let v = eval_str(&engine, "function mk(){ let n=0; return ()=>++n; } const c=mk(); c(); c(); c();");
    assert_eq!(v, "3");
}

#[test]
fn scenario_2_prototype_chain() {
    let engine = JsEngine::new();
    let v = eval_str(&engine, "const a={x:1}; const b=Object.create(a); b.hasOwnProperty('x');");
    assert_eq!(v, "false");
    let v2 = eval_str(&engine, "b.x;");
    assert_eq!(v2, "1");
}

#[test]
fn scenario_3_let_tdz() {
    let engine = JsEngine::new();
    let v = eval_str(&engine, "{ try { x; } catch(e){ var msg = e.name; } let x=1; } msg;");
    assert_eq!(v, "ReferenceError");
}

#[test]
fn scenario_4_regex_vs_division() {
    let engine = JsEngine::new();
    let v = eval_str(
        &engine,
        "const a=6; const b=3; const c=a/b/2; const re=/a\\/b/; c+':'+re.test('a/b');",
    );
    assert_eq!(v, "1:true");
}

#[test]
fn scenario_5_template_with_nested_braces() {
    let engine = JsEngine::new();
    let v = eval_str(&engine, "const o={a:1}; `x=${ ({b:o.a}).b }`;");
    assert_eq!(v, "x=1");
}

#[test]
fn scenario_6_destructuring_defaults_and_rest() {
    let engine = JsEngine::new();
    let v = eval_str(&engine, "const [a=10,b,...r] = [,2,3,4]; a+','+b+','+r.length;");
    assert_eq!(v, "10,2,2");
}

#[test]
fn scenario_7_date_field_normalization() {
    let engine = JsEngine::new();
    let v = eval_str(&engine, "const d=new Date(2021,0,32); d.getMonth()+'/'+d.getDate();");
    assert_eq!(v, "1/1");
}

#[test]
fn scenario_8_gherkin_parse() {
    let src = "@smoke\nFeature: Login\n\n  Scenario: happy path\n    Given a user\n    When they log in\n    Then it works\n";
    let buffer = Rc::new(SourceBuffer::new(src));
    let feature = gherkin::parse_feature(buffer).unwrap();
    assert_eq!(feature.tags.len(), 1);
    assert_eq!(feature.tags[0].name, "smoke");
    assert_eq!(feature.name, "Login");
    assert_eq!(feature.sections.len(), 1);
    let scenario = &feature.sections[0].scenario;
    assert_eq!(scenario.name, "happy path");
    assert_eq!(scenario.steps.len(), 3);
    assert_eq!(scenario.steps[0].prefix, "Given");
    assert_eq!(scenario.steps[0].text, "a user");
    assert_eq!(scenario.steps[1].prefix, "When");
    assert_eq!(scenario.steps[1].text, "they log in");
}

// ─── Universal invariants (spec §8) ───────────────────────────────────────

#[test]
fn lexer_round_trips_source_text() {
    let src = "  let x = 1; // comment\n/* block */ x += 2;\n";
    let buffer = Rc::new(SourceBuffer::new(src));
    let tokens = script_engine::lexer::Lexer::tokenize(buffer);
    let joined: String = tokens.iter().map(|t| t.text.as_ref()).collect();
    assert_eq!(joined, src);
}

#[test]
fn nan_and_signed_zero_invariants() {
    let engine = JsEngine::new();
    assert_eq!(eval_str(&engine, "NaN !== NaN;"), "true");
    assert_eq!(eval_str(&engine, "NaN != NaN;"), "true");
    assert_eq!(eval_str(&engine, "(0 === -0);"), "true");
    assert_eq!(eval_str(&engine, "1/0 === Infinity;"), "true");
    assert_eq!(eval_str(&engine, "1/-0 === -Infinity;"), "true");
}

#[test]
fn typeof_unbound_identifier_does_not_throw() {
    let engine = JsEngine::new();
    assert_eq!(eval_str(&engine, "typeof x;"), "undefined");
}

#[test]
fn const_reassignment_is_a_type_error_and_leaves_value_unchanged() {
    let engine = JsEngine::new();
    let err = engine.eval("const c = 1; c = 2;").unwrap_err();
    assert!(err.to_string().contains("TypeError"));
    let v = eval_str(&engine, "c;");
    assert_eq!(v, "1");
}

#[test]
fn catch_binds_the_exact_thrown_value_for_primitives_and_objects() {
    let engine = JsEngine::new();
    assert_eq!(eval_str(&engine, "let seen; try { throw 42; } catch(e){ seen = (e===42); } seen;"), "true");
    assert_eq!(
        eval_str(&engine, "const X={}; let seen; try { throw X; } catch(e){ seen = (e===X); } seen;"),
        "true"
    );
}

#[test]
fn json_round_trips_acyclic_values() {
    let engine = JsEngine::new();
    let v = eval_str(
        &engine,
        "JSON.stringify(JSON.parse(JSON.stringify({a:1,b:[1,2,'x'],c:null,d:true})));",
    );
    assert_eq!(v, r#"{"a":1,"b":[1,2,"x"],"c":null,"d":true}"#);
}

#[test]
fn for_in_yields_own_enumerable_keys_in_insertion_order() {
    let engine = JsEngine::new();
    let v = eval_str(&engine, "const o={b:1,a:2,c:3}; let keys=[]; for (const k in o) keys.push(k); keys.join(',');");
    assert_eq!(v, "b,a,c");
}

#[test]
fn parenthesizing_a_side_effect_free_expression_does_not_change_its_value() {
    let engine = JsEngine::new();
    let plain = eval_str(&engine, "1 + 2 * 3 - (4 / 2);");
    let engine2 = JsEngine::new();
    let parens = eval_str(&engine2, "(1 + 2 * 3 - (4 / 2));");
    assert_eq!(plain, parens);
}

// ─── Host bridge / engine surface ─────────────────────────────────────────

#[test]
fn set_and_get_round_trip_through_script() {
    let engine = JsEngine::new();
    engine.set("seed", script_engine::Value::Number(7.0));
    assert_eq!(eval_str(&engine, "seed * 6;"), "42");
}

#[test]
fn console_sink_receives_level_tagged_output() {
    use std::cell::RefCell;
    let engine = JsEngine::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let log2 = log.clone();
    engine.set_console_sink(move |level, message| log2.borrow_mut().push(format!("{level}:{message}")));
    engine.eval("console.log('a'); console.warn('b'); console.error('c');").unwrap();
    assert_eq!(log.borrow().as_slice(), ["log:a", "warn:b", "error:c"]);
}
