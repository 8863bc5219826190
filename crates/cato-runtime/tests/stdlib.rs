//! Builtins, methods and the `json` / `hashlib` modules

mod common;

use common::{assert_eq, assert_raises, assert_response, logs, run_on, run_with};
use cato_runtime::api::MemoryKv;
use cato_runtime::security::Limits;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Builtins
// ============================================================================

#[rstest]
#[case("len('héllo')", json!(5))]
#[case("len([1, 2, 3])", json!(3))]
#[case("len({'a': 1})", json!(1))]
#[case("len(range(0, 10, 3))", json!(4))]
#[case("list(range(5, 0, -2))", json!([5, 3, 1]))]
#[case("int('  42 ')", json!(42))]
#[case("int('ff', 16)", json!(255))]
#[case("int('0x1f', 0)", json!(31))]
#[case("int(3.9)", json!(3))]
#[case("int(-3.9)", json!(-3))]
#[case("float('1.5e3')", json!(1500.0))]
#[case("str(12) + str(1.0) + str(None)", json!("121.0None"))]
#[case("bool([]) or bool('x')", json!(true))]
#[case("list('abc')", json!(["a", "b", "c"]))]
#[case("tuple([1, 2])", json!([1, 2]))]
#[case("dict([('a', 1)], b=2)", json!({"a": 1, "b": 2}))]
#[case("list(enumerate(['a', 'b'], 1))", json!([[1, "a"], [2, "b"]]))]
#[case("list(zip([1, 2, 3], 'ab'))", json!([[1, "a"], [2, "b"]]))]
#[case("min(3, 1, 2)", json!(1))]
#[case("max([3, 1, 2])", json!(3))]
#[case("max(['a', 'bbb', 'cc'], key=len)", json!("bbb"))]
#[case("min([], default=0)", json!(0))]
#[case("sum([1, 2, 3])", json!(6))]
#[case("sum([0.5, 0.25], 1)", json!(1.75))]
#[case("abs(-7)", json!(7))]
#[case("round(2.5)", json!(2))]
#[case("round(3.5)", json!(4))]
#[case("round(3.14159, 2)", json!(3.14))]
#[case("round(1250, -2)", json!(1200))]
#[case("sorted([3, 1, 2], reverse=True)", json!([3, 2, 1]))]
#[case("list(reversed([1, 2, 3]))", json!([3, 2, 1]))]
#[case("repr('its')", json!("'its'"))]
#[case("repr(\"it's\")", json!("\"it's\""))]
#[case("any([0, '', 3])", json!(true))]
#[case("all([1, 'x', []])", json!(false))]
fn test_builtin_values(#[case] expr: &str, #[case] expected: serde_json::Value) {
    assert_response(&format!("response = {}", expr), expected);
}

#[test]
fn test_sorted_is_stable() {
    let source = "
def age(person):
    return person[1]
people = [('bo', 30), ('al', 25), ('cy', 30), ('di', 25)]
response = [p[0] for p in sorted(people, key=age)]
";
    assert_response(source, json!(["al", "di", "bo", "cy"]));
}

#[rstest]
#[case("int('abc')", "ValueError", "invalid literal for int() with base 10: 'abc'")]
#[case("float('abc')", "ValueError", "could not convert string to float: 'abc'")]
#[case("len(5)", "TypeError", "object of type 'int' has no len()")]
#[case("max([])", "ValueError", "max() iterable argument is empty")]
#[case("range(1, 2, 0)", "ValueError", "range() arg 3 must not be zero")]
#[case("sum(['a', 'b'], '')", "TypeError", "sum() can't sum strings [use ''.join(seq) instead]")]
#[case("sorted([1, 'a'])", "TypeError", "'<' not supported between instances of 'str' and 'int'")]
fn test_builtin_errors(#[case] expr: &str, #[case] kind: &str, #[case] message: &str) {
    assert_eq!(
        assert_raises(&format!("x = {}", expr), kind),
        format!("{}: {} (line 1)", kind, message)
    );
}

#[test]
fn test_exception_constructors() {
    let source = "
e = ValueError('bad', 2)
response = [str(e), repr(ValueError('x')), str(KeyError('k')), str(Exception())]
";
    assert_response(source, json!(["('bad', 2)", "ValueError('x')", "'k'", ""]));
}

// ============================================================================
// str / bytes methods
// ============================================================================

#[rstest]
#[case("'  pad  '.strip()", json!("pad"))]
#[case("'xxhixx'.strip('x')", json!("hi"))]
#[case("'  pad'.lstrip()", json!("pad"))]
#[case("'pad  '.rstrip()", json!("pad"))]
#[case("'MiXed'.lower() + 'MiXed'.upper()", json!("mixedMIXED"))]
#[case("'hello world'.capitalize()", json!("Hello world"))]
#[case("'hello wORLD'.title()", json!("Hello World"))]
#[case("'123'.isdigit() and not '12a'.isdigit()", json!(true))]
#[case("'abc'.isalpha() and not ''.isalpha()", json!(true))]
#[case("'a  b \\tc'.split()", json!(["a", "b", "c"]))]
#[case("'a,b,,c'.split(',')", json!(["a", "b", "", "c"]))]
#[case("'a b c'.split(' ', 1)", json!(["a", "b c"]))]
#[case("'-'.join(['a', 'b', 'c'])", json!("a-b-c"))]
#[case("'aaa'.replace('a', 'b', 2)", json!("bba"))]
#[case("'file.py'.endswith(('.py', '.txt'))", json!(true))]
#[case("'prefix'.startswith('pre')", json!(true))]
#[case("'héllo'.find('l')", json!(2))]
#[case("'hello'.find('z')", json!(-1))]
#[case("'banana'.count('an')", json!(2))]
#[case("'{} + {} = {total}'.format(1, 2, total=3)", json!("1 + 2 = 3"))]
#[case("'{0:>5}|{1:.1f}'.format('ab', 2.26)", json!("   ab|2.3"))]
#[case("'héllo'.encode().decode()", json!("héllo"))]
#[case("len('héllo'.encode('utf-8'))", json!(6))]
#[case("'ab'.encode().hex()", json!("6162"))]
fn test_str_methods(#[case] expr: &str, #[case] expected: serde_json::Value) {
    assert_response(&format!("response = {}", expr), expected);
}

#[test]
fn test_str_method_errors() {
    assert_eq!(
        assert_raises("'a'.split('')", "ValueError"),
        "ValueError: empty separator (line 1)"
    );
    assert_eq!(
        assert_raises("','.join(['a', 1])", "TypeError"),
        "TypeError: sequence item 1: expected str instance, int found (line 1)"
    );
    assert_raises("'é'.encode('ascii')", "ValueError");
    assert_raises("'x'.encode('rot13')", "LookupError");
    assert_raises("b'\\xff'.decode()", "UnicodeDecodeError");
}

// ============================================================================
// list / tuple methods
// ============================================================================

#[test]
fn test_list_methods() {
    let source = "
items = [3, 1, 2]
items.append(4)
items.extend((5, 6))
items.insert(0, 0)
last = items.pop()
first = items.pop(0)
items.remove(2)
position = items.index(4)
items.sort()
snapshot = items.copy()
items.reverse()
twos = [1, 2, 2].count(2)
items.clear()
response = [last, first, position, snapshot, twos, items]
";
    assert_response(source, json!([6, 0, 2, [1, 3, 4, 5], 2, []]));
}

#[test]
fn test_list_sort_with_key_and_reverse() {
    let source = "
words = ['pear', 'fig', 'banana']
words.sort(key=len, reverse=True)
response = words
";
    assert_response(source, json!(["banana", "pear", "fig"]));
}

#[rstest]
#[case("[].pop()", "IndexError", "pop from empty list")]
#[case("[1].pop(5)", "IndexError", "pop index out of range")]
#[case("[1].remove(2)", "ValueError", "list.remove(x): x not in list")]
#[case("[1].index(2)", "ValueError", "2 is not in list")]
#[case("(1,).index(2)", "ValueError", "tuple.index(x): x not in tuple")]
fn test_sequence_method_errors(#[case] expr: &str, #[case] kind: &str, #[case] message: &str) {
    assert_eq!(
        assert_raises(expr, kind),
        format!("{}: {} (line 1)", kind, message)
    );
}

#[test]
fn test_tuple_methods() {
    assert_response("t = (1, 2, 2, 3)\nresponse = [t.index(2), t.count(2)]", json!([1, 2]));
}

// ============================================================================
// dict methods
// ============================================================================

#[test]
fn test_dict_methods() {
    let source = "
d = {'a': 1, 'b': 2}
got = [d.get('a'), d.get('z'), d.get('z', 0), d.get('z', default='dflt')]
d.update({'c': 3}, d=4)
d.setdefault('a', 100)
d.setdefault('e', 5)
popped = [d.pop('b'), d.pop('missing', None)]
clone = d.copy()
clone['a'] = 'changed'
response = {
    'got': got,
    'keys': list(d.keys()),
    'values': d.values(),
    'items': d.items(),
    'popped': popped,
    'original_a': d['a'],
}
d.clear()
";
    assert_response(
        source,
        json!({
            "got": [1, null, 0, "dflt"],
            "keys": ["a", "c", "d", "e"],
            "values": [1, 3, 4, 5],
            "items": [["a", 1], ["c", 3], ["d", 4], ["e", 5]],
            "popped": [2, null],
            "original_a": 1,
        }),
    );
}

#[test]
fn test_missing_key() {
    assert_eq!(
        assert_raises("d = {'a': 1}\nd['b']", "KeyError"),
        "KeyError: 'b' (line 2)"
    );
    assert_raises("{}.pop('x')", "KeyError");
}

// ============================================================================
// json
// ============================================================================

#[test]
fn test_json_round_trip() {
    let source = r#"
data = json.loads('{"name": "cato", "tags": ["a", "b"], "n": 1.5, "ok": true, "none": null}')
data['tags'].append('c')
response = json.loads(json.dumps(data))
"#;
    assert_response(
        source,
        json!({"name": "cato", "tags": ["a", "b", "c"], "n": 1.5, "ok": true, "none": null}),
    );
}

#[rstest]
#[case("json.dumps({'b': 1, 'a': [True, None]})", r#"{"b": 1, "a": [true, null]}"#)]
#[case("json.dumps({'b': 1, 'a': 2}, sort_keys=True)", r#"{"a": 2, "b": 1}"#)]
#[case("json.dumps([1, 2], indent=2)", "[\n  1,\n  2\n]")]
#[case("json.dumps({'a': 1}, separators=(',', ':'))", r#"{"a":1}"#)]
#[case("json.dumps('é')", r#""\u00e9""#)]
#[case("json.dumps('é', ensure_ascii=False)", "\"é\"")]
#[case("json.dumps((1, 'x'))", r#"[1, "x"]"#)]
fn test_json_dumps(#[case] expr: &str, #[case] expected: &str) {
    assert_response(&format!("response = {}", expr), json!(expected));
}

#[test]
fn test_json_errors() {
    assert_raises("json.loads('{bad')", "ValueError");
    assert_eq!(
        assert_raises("json.dumps(b'x')", "TypeError"),
        "TypeError: Object of type bytes is not JSON serializable (line 1)"
    );
}

#[test]
fn test_import_allowed_modules() {
    let source = "
import json as j
from hashlib import sha256 as digest
from json import dumps
response = [dumps(j.loads('[1]')), digest(b'').hexdigest()[:8]]
";
    assert_response(source, json!(["[1]", "e3b0c442"]));
    assert_eq!(
        assert_raises("from json import load", "ImportError"),
        "ImportError: cannot import name 'load' from 'json' (line 1)"
    );
}

// ============================================================================
// hashlib
// ============================================================================

#[rstest]
#[case(
    "sha256",
    "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
)]
#[case("sha224", "ea09ae9cc6768c50fcee903ed054556e5bfc8347907f12598aa24193")]
fn test_hashlib_hexdigest(#[case] algorithm: &str, #[case] expected: &str) {
    assert_response(
        &format!("response = hashlib.{}('hello'.encode()).hexdigest()", algorithm),
        json!(expected),
    );
}

#[test]
fn test_hash_update_and_copy() {
    let source = "
h = hashlib.sha256()
h.update(b'hel')
partial = h.copy()
h.update(b'lo')
response = [h.hexdigest() == hashlib.sha256(b'hello').hexdigest(), partial.hexdigest() == hashlib.sha256(b'hel').hexdigest(), len(h.digest())]
";
    assert_response(source, json!([true, true, 32]));
}

#[test]
fn test_hash_requires_bytes() {
    assert_eq!(
        assert_raises("hashlib.sha256('text')", "TypeError"),
        "TypeError: Strings must be encoded before hashing (line 1)"
    );
}

// ============================================================================
// Request and platform scripts
// ============================================================================

#[test]
fn test_request_accessors() {
    let source = "
response = {
    'name': request.get('name'),
    'missing': request.get('missing', 'fallback'),
    'keyword': request.get('missing', default=7),
    'direct': request['count'],
    'has': 'name' in request,
    'size': len(request),
    'keys': list(request.keys()),
}
";
    let outcome = run_with(
        source,
        json!({"name": "cato", "count": 3}),
        Limits::default(),
    )
    .unwrap();
    assert_eq!(
        outcome.result,
        Some(json!({
            "name": "cato",
            "missing": "fallback",
            "keyword": 7,
            "direct": 3,
            "has": true,
            "size": 2,
            "keys": ["name", "count"],
        }))
    );
}

#[test]
fn test_request_copy_is_mutable() {
    let source = "
data = request.copy()
data['extra'] = True
response = data
";
    let outcome = run_with(source, json!({"a": 1}), Limits::default()).unwrap();
    assert_eq!(outcome.result, Some(json!({"a": 1, "extra": true})));
}

#[test]
fn test_visits_counter_script() {
    let kv = Arc::new(MemoryKv::new());
    let source = "visits = int(db.get(\"visits\") or 0) + 1; db.set(\"visits\", str(visits)); response = {\"message\": \"Hello\", \"total_visits\": visits}";
    for expected in 1..=3 {
        let outcome = run_on(
            source,
            json!({"action": "hello"}),
            Limits::default(),
            kv.clone(),
        )
        .unwrap();
        assert_eq!(
            outcome.result,
            Some(json!({"message": "Hello", "total_visits": expected}))
        );
        assert_eq!(outcome.logs, "");
    }
}

#[test]
fn test_crud_script() {
    let source = r#"
items = json.loads(db.get('items') or '[]')
action = request.get('action')
if action == 'add':
    items.append({'id': len(items) + 1, 'text': request.get('text')})
elif action == 'delete':
    items = [i for i in items if i['id'] != request.get('id')]
db.set('items', json.dumps(items))
print('items:', len(items))
response = {'items': items}
"#;
    let kv = Arc::new(MemoryKv::new());
    let call = |payload: serde_json::Value| {
        run_on(source, payload, Limits::default(), kv.clone()).unwrap()
    };

    call(json!({"action": "add", "text": "first"}));
    call(json!({"action": "add", "text": "second"}));
    let outcome = call(json!({"action": "delete", "id": 1}));

    assert_eq!(
        outcome.result,
        Some(json!({"items": [{"id": 2, "text": "second"}]}))
    );
    assert_eq!(outcome.logs, "items: 1\n");
}

#[test]
fn test_auth_script() {
    let source = r#"
def hash_password(password):
    return hashlib.sha256(password.encode()).hexdigest()

action = request.get('action')
username = request.get('username')
key = 'user:' + username
if action == 'register':
    if db.get(key):
        response = {'error': 'User exists'}
    else:
        db.set(key, hash_password(request.get('password')))
        response = {'ok': True}
elif action == 'login':
    stored = db.get(key)
    response = {'ok': stored is not None and stored == hash_password(request.get('password'))}
"#;
    let kv = Arc::new(MemoryKv::new());
    let call = |payload: serde_json::Value| {
        run_on(source, payload, Limits::default(), kv.clone())
            .unwrap()
            .result
    };

    assert_eq!(
        call(json!({"action": "register", "username": "ana", "password": "pw"})),
        Some(json!({"ok": true}))
    );
    assert_eq!(
        call(json!({"action": "register", "username": "ana", "password": "pw"})),
        Some(json!({"error": "User exists"}))
    );
    assert_eq!(
        call(json!({"action": "login", "username": "ana", "password": "pw"})),
        Some(json!({"ok": true}))
    );
    assert_eq!(
        call(json!({"action": "login", "username": "ana", "password": "nope"})),
        Some(json!({"ok": false}))
    );
    assert_eq!(
        kv.snapshot().get("user:ana").map(String::as_str),
        Some("30c952fab122c3f9759f02a6d95c3758b246b4fee239957b2d4fee46e26170c4")
    );
}

#[test]
fn test_db_values_must_be_strings() {
    assert_eq!(
        assert_raises("db.set('n', 1)", "TypeError"),
        "TypeError: db value must be str, not int (line 1)"
    );
    assert_eq!(logs("print(db.get('never'), db.get('never', 'd'))"), "None d\n");
}
