use quill::scanner::Scanner;
use quill::token::{Token, TokenType};

fn assert_token_sequence(source: &str, expected: &[(TokenType, &str)]) {
    let scanner = Scanner::new(source);
    let tokens: Vec<Token> = scanner.filter_map(Result::ok).collect();

    assert_eq!(
        tokens.len(),
        expected.len(),
        "token count mismatch for {:?}",
        source
    );

    for (actual, (expected_type, expected_lexeme)) in tokens.iter().zip(expected.iter()) {
        assert_eq!(actual.token_type, *expected_type);
        assert_eq!(actual.lexeme, *expected_lexeme);
    }
}

#[test]
fn symbols() {
    assert_token_sequence(
        "({*.,+*})",
        &[
            (TokenType::LEFT_PAREN, "("),
            (TokenType::LEFT_BRACE, "{"),
            (TokenType::STAR, "*"),
            (TokenType::DOT, "."),
            (TokenType::COMMA, ","),
            (TokenType::PLUS, "+"),
            (TokenType::STAR, "*"),
            (TokenType::RIGHT_BRACE, "}"),
            (TokenType::RIGHT_PAREN, ")"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn operators_longest_match() {
    assert_token_sequence(
        "! != = == < <= > >= !==",
        &[
            (TokenType::BANG, "!"),
            (TokenType::BANG_EQUAL, "!="),
            (TokenType::EQUAL, "="),
            (TokenType::EQUAL_EQUAL, "=="),
            (TokenType::LESS, "<"),
            (TokenType::LESS_EQUAL, "<="),
            (TokenType::GREATER, ">"),
            (TokenType::GREATER_EQUAL, ">="),
            // `!==` greedily lexes as `!=` then `=`
            (TokenType::BANG_EQUAL, "!="),
            (TokenType::EQUAL, "="),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn keywords_and_identifiers() {
    assert_token_sequence(
        "and class else false finally fun for if nil or print return super this true var while break continue whilex",
        &[
            (TokenType::AND, "and"),
            (TokenType::CLASS, "class"),
            (TokenType::ELSE, "else"),
            (TokenType::FALSE, "false"),
            (TokenType::FINALLY, "finally"),
            (TokenType::FUN, "fun"),
            (TokenType::FOR, "for"),
            (TokenType::IF, "if"),
            (TokenType::NIL, "nil"),
            (TokenType::OR, "or"),
            (TokenType::PRINT, "print"),
            (TokenType::RETURN, "return"),
            (TokenType::SUPER, "super"),
            (TokenType::THIS, "this"),
            (TokenType::TRUE, "true"),
            (TokenType::VAR, "var"),
            (TokenType::WHILE, "while"),
            (TokenType::BREAK, "break"),
            (TokenType::CONTINUE, "continue"),
            // keyword prefixes stay identifiers
            (TokenType::IDENTIFIER, "whilex"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn number_literals_carry_values() {
    let tokens: Vec<Token> = Scanner::new("12 3.5 0.0")
        .filter_map(Result::ok)
        .collect();

    let numbers: Vec<f64> = tokens
        .iter()
        .filter_map(|t| match t.token_type {
            TokenType::NUMBER(n) => Some(n),
            _ => None,
        })
        .collect();

    assert_eq!(numbers, vec![12.0, 3.5, 0.0]);
}

#[test]
fn trailing_dot_is_not_a_fraction() {
    assert_token_sequence(
        "12.",
        &[
            (TokenType::NUMBER(12.0), "12"),
            (TokenType::DOT, "."),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn string_literal_contents_exclude_quotes() {
    let tokens: Vec<Token> = Scanner::new("\"hello world\"")
        .filter_map(Result::ok)
        .collect();

    assert_eq!(tokens.len(), 2);
    match &tokens[0].token_type {
        TokenType::STRING(s) => assert_eq!(s, "hello world"),
        other => panic!("expected string token, got {:?}", other),
    }
}

#[test]
fn multiline_string_tracks_lines() {
    let tokens: Vec<Token> = Scanner::new("\"a\nb\"\nx")
        .filter_map(Result::ok)
        .collect();

    // string starts on line 1, identifier lands on line 3
    assert_eq!(tokens[0].line, 2); // token reported at the line the scan ended on
    assert_eq!(tokens[1].lexeme, "x");
    assert_eq!(tokens[1].line, 3);
}

#[test]
fn comments_and_whitespace_are_skipped() {
    assert_token_sequence(
        "// full line\nvar x; // trailing\n// unterminated comment at eof",
        &[
            (TokenType::VAR, "var"),
            (TokenType::IDENTIFIER, "x"),
            (TokenType::SEMICOLON, ";"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn unexpected_chars_are_errors_but_scanning_continues() {
    let results: Vec<_> = Scanner::new(",.$(#").collect();

    // COMMA, DOT, error($), LEFT_PAREN, error(#), EOF
    assert_eq!(results.len(), 6);

    let error_count = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(error_count, 2);

    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            err.to_string().contains("Unexpected character"),
            "unexpected message: {}",
            err
        );
    }

    let kinds: Vec<TokenType> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|t| t.token_type.clone())
        .collect();

    assert_eq!(
        kinds,
        vec![
            TokenType::COMMA,
            TokenType::DOT,
            TokenType::LEFT_PAREN,
            TokenType::EOF
        ]
    );
}

#[test]
fn unterminated_string_reports_and_still_reaches_eof() {
    let results: Vec<_> = Scanner::new("var s = \"oops").collect();

    let errors: Vec<String> = results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .map(ToString::to_string)
        .collect();

    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Unterminated string."));

    // the sequence still terminates with EOF
    let last = results
        .iter()
        .rev()
        .find_map(|r| r.as_ref().ok())
        .expect("an EOF token");
    assert_eq!(last.token_type, TokenType::EOF);
}

#[test]
fn empty_source_yields_only_eof() {
    assert_token_sequence("", &[(TokenType::EOF, "")]);
}
