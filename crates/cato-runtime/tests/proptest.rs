//! Property tests: the front end never panics and pure scripts are
//! deterministic

mod common;

use cato_runtime::api::ExecError;
use cato_runtime::{parse_program, Lexer};
use common::run;
use proptest::prelude::*;
use serde_json::json;

/// Source-like text: mostly dialect tokens, indentation and newlines
fn script_like() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        Just("def ".to_string()),
        Just("if ".to_string()),
        Just("else:".to_string()),
        Just("for x in ".to_string()),
        Just("while ".to_string()),
        Just("return ".to_string()),
        Just("try:".to_string()),
        Just("except ".to_string()),
        Just("\n".to_string()),
        Just("    ".to_string()),
        Just("\t".to_string()),
        Just("(".to_string()),
        Just(")".to_string()),
        Just("[".to_string()),
        Just("]".to_string()),
        Just("{".to_string()),
        Just("}".to_string()),
        Just(":".to_string()),
        Just(",".to_string()),
        Just("=".to_string()),
        Just("**".to_string()),
        Just("'".to_string()),
        Just("\"\"\"".to_string()),
        Just("f'{".to_string()),
        Just("\\".to_string()),
        "[a-z_]{1,6}",
        "[0-9]{1,25}",
        "[0-9]+\\.[0-9]*e?[0-9]{0,4}",
        "[ -~]{0,4}",
    ];
    prop::collection::vec(piece, 0..40).prop_map(|pieces| pieces.concat())
}

// ===== FRONT END =====

proptest! {
    #[test]
    fn lexer_never_panics(source in any::<String>()) {
        let _ = Lexer::new(&source).tokenize();
    }

    #[test]
    fn parser_never_panics_on_arbitrary_text(source in any::<String>()) {
        let _ = parse_program(&source);
    }

    #[test]
    fn parser_never_panics_on_script_like_text(source in script_like()) {
        let _ = parse_program(&source);
    }

    #[test]
    fn compile_errors_carry_a_line(source in script_like()) {
        if let Err(diagnostics) = parse_program(&source) {
            prop_assert!(!diagnostics.is_empty());
            let lines = source.matches('\n').count() as u32 + 2;
            for diagnostic in diagnostics {
                prop_assert!(diagnostic.span.line >= 1);
                prop_assert!(diagnostic.span.line <= lines, "{} > {}", diagnostic.span.line, lines);
            }
        }
    }
}

// ===== EVALUATION =====

/// Integer expression over a fixed set of names
fn int_expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (-1000i64..1000).prop_map(|n| format!("({})", n)),
        Just("a".to_string()),
        Just("b".to_string()),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        (inner.clone(), prop::sample::select(vec!["+", "-", "*", "//", "%"]), inner)
            .prop_map(|(l, op, r)| format!("({} {} {})", l, op, r))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pure_scripts_are_deterministic(expr in int_expr(), a in -50i64..50, b in 1i64..50) {
        let source = format!("a = {}\nb = {}\nresponse = [{}, str({})]", a, b, expr, expr);
        let first = run(&source);
        let second = run(&source);
        match (first, second) {
            (Ok(x), Ok(y)) => {
                prop_assert_eq!(x.result, y.result);
                prop_assert_eq!(x.steps, y.steps);
            }
            (Err(x), Err(y)) => prop_assert_eq!(x, y),
            (x, y) => prop_assert!(false, "diverged: {:?} vs {:?}", x, y),
        }
    }

    #[test]
    fn integer_addition_matches_checked(a in (i64::MIN + 1).., b in (i64::MIN + 1)..) {
        let result = run(&format!("a = {}\nb = {}\nresponse = a + b", a, b));
        match a.checked_add(b) {
            Some(sum) => prop_assert_eq!(result.unwrap().result, Some(json!(sum))),
            None => prop_assert!(matches!(
                result,
                Err(ExecError::Runtime { ref kind, .. }) if kind == "OverflowError"
            ), "expected OverflowError, got {:?}", result),
        }
    }

    #[test]
    fn floor_division_identity(a in -100_000i64..100_000, b in -1_000i64..1_000) {
        prop_assume!(b != 0);
        let source = format!("a = {}\nb = {}\nresponse = (a // b) * b + a % b", a, b);
        prop_assert_eq!(run(&source).unwrap().result, Some(json!(a)));
    }

    #[test]
    fn modulo_takes_divisor_sign(a in -100_000i64..100_000, b in -1_000i64..1_000) {
        prop_assume!(b != 0);
        let outcome = run(&format!("response = ({}) % ({})", a, b)).unwrap();
        let r = outcome.result.and_then(|v| v.as_i64()).unwrap();
        prop_assert!(r == 0 || (r < 0) == (b < 0));
        prop_assert!(r.abs() < b.abs());
    }

    #[test]
    fn sorted_matches_std(items in prop::collection::vec(-1000i64..1000, 0..60)) {
        let literal = items.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
        let outcome = run(&format!("response = sorted([{}])", literal)).unwrap();
        let mut expected = items.clone();
        expected.sort();
        prop_assert_eq!(outcome.result, Some(json!(expected)));
    }
}
