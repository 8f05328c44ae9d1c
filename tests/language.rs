//! End-to-end behavior tests: each case drives a full session (scan →
//! parse → resolve → interpret) with captured output.

use std::cell::RefCell;
use std::io;
use std::io::Write;
use std::rc::Rc;

use quill::session::Session;
use quill::value::Value;

/// Clonable sink so the test can read what the interpreter wrote.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).expect("interpreter output is UTF-8")
    }
}

fn capture_session() -> (Session, SharedBuf) {
    let buf = SharedBuf::default();
    let session = Session::with_io(Box::new(buf.clone()), Box::new(io::empty()));
    (session, buf)
}

/// Run one script in a fresh session; returns (echo value, printed output,
/// rendered diagnostics).
fn run(source: &str) -> (Option<Value>, String, Vec<String>) {
    let (mut session, buf) = capture_session();
    let value = session.run(source);
    let errors = session
        .diagnostics()
        .errors()
        .iter()
        .map(ToString::to_string)
        .collect();
    (value, buf.contents(), errors)
}

fn run_output(source: &str) -> String {
    let (_, output, errors) = run(source);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    output
}

fn run_errors(source: &str) -> (String, Vec<String>) {
    let (_, output, errors) = run(source);
    assert!(!errors.is_empty(), "expected errors for {:?}", source);
    (output, errors)
}

// ───────────────────────── values and operators ─────────────────────────

#[test]
fn integral_numbers_drop_the_point() {
    let (value, _, _) = run("6.0;");
    assert_eq!(value.expect("echo").to_string(), "6");

    let (value, _, _) = run("6.5;");
    assert_eq!(value.expect("echo").to_string(), "6.5");

    assert_eq!(run_output("print 2 + 4;"), "6\n");
    assert_eq!(run_output("print 1 / 4;"), "0.25\n");
}

#[test]
fn bare_expression_statements_echo_their_value() {
    let (value, _, _) = run("1 + 2;");
    assert_eq!(value, Some(Value::Number(3.0)));

    // print produces output, not an echo
    let (value, output, _) = run("print 3;");
    assert_eq!(value, None);
    assert_eq!(output, "3\n");
}

#[test]
fn string_concatenation_but_no_coercion() {
    assert_eq!(run_output("print \"a\" + \"b\";"), "ab\n");

    let (output, errors) = run_errors("print \"a\" + 1;");
    assert_eq!(output, "");
    assert!(errors[0].contains("Operands must be numbers or strings."));
}

#[test]
fn arithmetic_requires_numbers() {
    let (_, errors) = run_errors("1 - nil;");
    assert!(errors[0].contains("Operands must be numbers."));

    let (_, errors) = run_errors("-\"x\";");
    assert!(errors[0].contains("Operand must be a number."));
}

#[test]
fn equality_is_value_equality_and_nil_only_equals_itself() {
    assert_eq!(run_output("print 1 == 1;"), "true\n");
    assert_eq!(run_output("print \"a\" == \"a\";"), "true\n");
    assert_eq!(run_output("print 1 == \"1\";"), "false\n");
    assert_eq!(run_output("print nil == nil;"), "true\n");
    assert_eq!(run_output("print nil == false;"), "false\n");
    assert_eq!(run_output("print 1 != 2;"), "true\n");
}

#[test]
fn numeric_zero_is_falsy() {
    assert_eq!(
        run_output("if (0) { print \"yes\"; } else { print \"no\"; }"),
        "no\n"
    );
    assert_eq!(run_output("print !0;"), "true\n");
    assert_eq!(run_output("print !1;"), "false\n");
}

#[test]
fn empty_string_is_truthy() {
    assert_eq!(
        run_output("if (\"\") { print \"t\"; } else { print \"f\"; }"),
        "t\n"
    );
}

#[test]
fn logical_operators_return_operand_values() {
    assert_eq!(run_output("print \"a\" or \"b\";"), "a\n");
    assert_eq!(run_output("print nil or \"b\";"), "b\n");
    assert_eq!(run_output("print nil and \"b\";"), "nil\n");
    assert_eq!(run_output("print 1 and 2;"), "2\n");

    // short-circuit: the right side must not run
    assert_eq!(
        run_output("var x = 0; true or (x = 1); print x;"),
        "0\n"
    );
}

#[test]
fn division_follows_ieee_semantics() {
    assert_eq!(run_output("print 1 / 0 > 1000000;"), "true\n");
}

// ───────────────────────── variables and scoping ─────────────────────────

#[test]
fn nested_block_shadows_without_error() {
    assert_eq!(
        run_output("var a = 1; { var a = 2; print a; } print a;"),
        "2\n1\n"
    );
}

#[test]
fn closures_capture_by_reference() {
    assert_eq!(
        run_output("var x = 1; fun f() { return x; } x = 2; print f();"),
        "2\n"
    );
}

#[test]
fn closures_share_their_defining_frame() {
    let source = "
        fun make() {
            var count = 0;
            fun tick() { count = count + 1; return count; }
            return tick;
        }
        var a = make();
        var b = make();
        print a();
        print a();
        print b();
    ";
    assert_eq!(run_output(source), "1\n2\n1\n");
}

#[test]
fn free_variables_resolve_against_the_defining_scope() {
    let source = "
        var a = \"global\";
        {
            fun show() { print a; }
            var a = \"block\";
            show();
        }
    ";
    assert_eq!(run_output(source), "global\n");
}

#[test]
fn anonymous_functions_are_values() {
    assert_eq!(
        run_output("var twice = fun (x) { return x + x; }; print twice(4);"),
        "8\n"
    );
    assert_eq!(
        run_output("var f = fun (x) { return x; }; print f;"),
        "<fn anonymous>\n"
    );
}

// ───────────────────────── loops ─────────────────────────

#[test]
fn continue_skips_the_body_but_runs_the_increment() {
    assert_eq!(
        run_output("for (var i = 0; i < 3; i = i + 1) { if (i == 1) continue; print i; }"),
        "0\n2\n"
    );
}

#[test]
fn break_ends_the_loop() {
    assert_eq!(
        run_output("for (var i = 0; i < 10; i = i + 1) { if (i == 2) break; print i; }"),
        "0\n1\n"
    );
}

#[test]
fn loop_finally_runs_after_a_never_entered_body() {
    assert_eq!(
        run_output("while (false) { } finally { print \"done\"; }"),
        "done\n"
    );
}

#[test]
fn loop_finally_runs_exactly_once_after_break() {
    let source = "
        var i = 0;
        while (true) {
            i = i + 1;
            if (i == 3) break;
        } finally print i;
    ";
    assert_eq!(run_output(source), "3\n");
}

#[test]
fn for_loop_finally_runs_after_exhaustion() {
    assert_eq!(
        run_output("for (var i = 0; i < 2; i = i + 1) print i; finally print \"end\";"),
        "0\n1\nend\n"
    );
}

#[test]
fn return_unwinds_through_loops_and_blocks() {
    let source = "
        fun find() {
            for (var i = 0; i < 10; i = i + 1) {
                if (i == 4) { return i; }
            }
            return -1;
        }
        print find();
    ";
    assert_eq!(run_output(source), "4\n");
}

#[test]
fn while_with_counter() {
    assert_eq!(
        run_output("var i = 0; while (i < 3) { print i; i = i + 1; }"),
        "0\n1\n2\n"
    );
}

// ───────────────────────── functions and calls ─────────────────────────

#[test]
fn functions_return_nil_without_an_explicit_return() {
    assert_eq!(run_output("fun f() { } print f();"), "nil\n");
}

#[test]
fn recursion_works() {
    assert_eq!(
        run_output("fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);"),
        "55\n"
    );
}

#[test]
fn arity_mismatch_is_a_runtime_error() {
    let (_, errors) = run_errors("fun f(a, b) { } f(1);");
    assert!(errors[0].contains("Expected 2 arguments but got 1."));
}

#[test]
fn calling_a_non_callable_is_a_runtime_error() {
    let (_, errors) = run_errors("\"no\"();");
    assert!(errors[0].contains("Can only call functions and classes."));
}

#[test]
fn functions_render_with_their_name() {
    assert_eq!(run_output("fun greet() { } print greet;"), "<fn greet>\n");
    assert_eq!(run_output("print clock;"), "<native fn>\n");
}

// ───────────────────────── classes ─────────────────────────

#[test]
fn properties_are_created_on_first_assignment() {
    assert_eq!(
        run_output("class Box { } var b = Box(); b.v = 7; print b.v;"),
        "7\n"
    );
}

#[test]
fn undefined_property_is_a_runtime_error() {
    let (_, errors) = run_errors("class Box { } print Box().missing;");
    assert!(errors[0].contains("Undefined property 'missing'."));
}

#[test]
fn properties_on_non_instances_are_runtime_errors() {
    let (_, errors) = run_errors("var x = 1; x.field = 2;");
    assert!(errors[0].contains("Only instances have properties."));
}

#[test]
fn methods_see_this() {
    let source = "
        class Counter {
            init() { this.n = 0; }
            bump() { this.n = this.n + 1; return this.n; }
        }
        var c = Counter();
        c.bump();
        print c.bump();
    ";
    assert_eq!(run_output(source), "2\n");
}

#[test]
fn initializer_always_yields_the_instance() {
    let source = "
        class Foo {
            init() { this.x = 1; return; }
        }
        var f = Foo();
        print f.x;
        print Foo();
    ";
    assert_eq!(run_output(source), "1\nFoo instance\n");
}

#[test]
fn class_arity_follows_init() {
    assert_eq!(
        run_output("class P { init(x, y) { this.x = x; this.y = y; } } print P(3, 4).x;"),
        "3\n"
    );

    let (_, errors) = run_errors("class P { init(x, y) { } } P(1);");
    assert!(errors[0].contains("Expected 2 arguments but got 1."));
}

#[test]
fn classes_and_instances_render_by_name() {
    assert_eq!(run_output("class Foo { } print Foo;"), "Foo\n");
    assert_eq!(run_output("class Foo { } print Foo();"), "Foo instance\n");
}

#[test]
fn subclass_methods_shadow_superclass_methods() {
    let source = "
        class A { who() { print \"A\"; } }
        class B < A { who() { print \"B\"; } }
        B().who();
    ";
    assert_eq!(run_output(source), "B\n");
}

#[test]
fn inherited_methods_come_from_the_chain() {
    let source = "
        class A { who() { print \"A\"; } }
        class B < A { }
        B().who();
    ";
    assert_eq!(run_output(source), "A\n");
}

#[test]
fn super_resolves_against_the_static_superclass() {
    // `super` in B::test binds to A even when the receiver is a C
    let source = "
        class A { method() { print \"A method\"; } }
        class B < A {
            method() { print \"B method\"; }
            test() { super.method(); }
        }
        class C < B { }
        C().test();
    ";
    assert_eq!(run_output(source), "A method\n");
}

#[test]
fn bound_methods_remember_their_receiver() {
    let source = "
        class Cake {
            flavor() { return this.kind; }
        }
        var cake = Cake();
        cake.kind = \"chocolate\";
        var m = cake.flavor;
        print m();
    ";
    assert_eq!(run_output(source), "chocolate\n");
}

#[test]
fn superclass_must_be_a_class() {
    let (_, errors) = run_errors("var NotAClass = 1; class Sub < NotAClass { }");
    assert!(errors[0].contains("Superclass must be a class."));
}

// ───────────────────────── error layering ─────────────────────────

#[test]
fn runtime_errors_abort_but_prior_output_stands() {
    let (value, output, errors) = run("print 1; 1 - nil; print 2;");
    assert_eq!(value, None);
    assert_eq!(output, "1\n");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Operands must be numbers."));
}

#[test]
fn static_errors_suppress_execution_entirely() {
    // parse error in the second statement: nothing at all runs
    let (value, output, errors) = run("print \"first\"; var = 3;");
    assert_eq!(value, None);
    assert_eq!(output, "");
    assert!(!errors.is_empty());
}

#[test]
fn lex_errors_suppress_execution_but_are_all_reported() {
    let (value, output, errors) = run("print 1; @ #");
    assert_eq!(value, None);
    assert_eq!(output, "");
    assert_eq!(errors.len(), 2);
}

#[test]
fn runtime_error_messages_carry_the_line() {
    let (_, errors) = run_errors("var a = 1;\nvar b = 2;\na + \"x\";");
    assert!(errors[0].contains("[line 3]"), "got: {}", errors[0]);
}

// ───────────────────────── sessions ─────────────────────────

#[test]
fn repl_state_persists_across_runs() {
    let (mut session, buf) = capture_session();

    assert!(session.run("var x = 10;").is_none());
    assert!(session.diagnostics().errors().is_empty());

    session.run("fun show() { print x; }");
    session.run("x = 11;");
    session.run("show();");

    assert!(session.diagnostics().errors().is_empty());
    assert_eq!(buf.contents(), "11\n");

    // echo still works line by line
    let value = session.run("x + 1;");
    assert_eq!(value, Some(Value::Number(12.0)));
}

#[test]
fn pure_scripts_are_deterministic_across_fresh_sessions() {
    let source = "
        fun square(n) { return n * n; }
        var total = 0;
        for (var i = 1; i < 5; i = i + 1) { total = total + square(i); }
        print total;
    ";

    let first = run_output(source);
    let second = run_output(source);

    assert_eq!(first, "30\n");
    assert_eq!(first, second);
}

#[test]
fn empty_source_runs_to_nothing() {
    let (value, output, errors) = run("");
    assert_eq!(value, None);
    assert_eq!(output, "");
    assert!(errors.is_empty());
}

// ───────────────────────── natives ─────────────────────────

#[test]
fn clock_returns_a_number() {
    let (value, _, errors) = run("clock() > 0;");
    assert!(errors.is_empty());
    assert_eq!(value, Some(Value::Bool(true)));
}

#[test]
fn clock_rejects_arguments() {
    let (_, errors) = run_errors("clock(1);");
    assert!(errors[0].contains("Expected 0 arguments but got 1."));
}

#[test]
fn input_reads_a_line_and_prints_the_prompt() {
    let buf = SharedBuf::default();
    let stdin: &[u8] = b"world\n";
    let mut session = Session::with_io(Box::new(buf.clone()), Box::new(stdin));

    session.run("print \"hello \" + input(\"name? \");");

    assert!(session.diagnostics().errors().is_empty());
    assert_eq!(buf.contents(), "name? hello world\n");
}

#[test]
fn input_yields_nil_at_end_of_input() {
    let (value, _, errors) = run("input() == nil;");
    assert!(errors.is_empty());
    assert_eq!(value, Some(Value::Bool(true)));
}
