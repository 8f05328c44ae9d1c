//! The explicit embedding value that replaces process-wide interpreter
//! state: one [`Session`] owns the interpreter (globals + resolution
//! table), the persistent resolver scope stack, the expression-id
//! generator, and the diagnostics sink.  A REPL keeps one session alive
//! across lines; dropping the session ends its world.

use std::io::{BufRead, Write};

use log::info;

use crate::ast::ExprIdGen;
use crate::error::Diagnostics;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::{initial_scopes, Resolver, ScopeStack};
use crate::scanner::Scanner;
use crate::token::Token;
use crate::value::Value;

pub struct Session {
    interpreter: Interpreter,
    scopes: ScopeStack,
    ids: ExprIdGen,
    diagnostics: Diagnostics,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Session wired to the process's stdout/stdin.
    pub fn new() -> Self {
        Self::with_interpreter(Interpreter::new())
    }

    /// Session with injected I/O streams (embedders, tests).
    pub fn with_io(out: Box<dyn Write>, input: Box<dyn BufRead>) -> Self {
        Self::with_interpreter(Interpreter::with_io(out, input))
    }

    fn with_interpreter(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            scopes: initial_scopes(),
            ids: ExprIdGen::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Drive one source text through scan → parse → resolve → interpret.
    ///
    /// Any static error suppresses execution entirely; a runtime error
    /// abandons the remaining statements.  Either way every error ends up
    /// in [`Self::diagnostics`].  The return value is the final
    /// statement's value when it was a bare expression — the REPL echo.
    pub fn run(&mut self, source: &str) -> Option<Value> {
        info!("Session run over {} bytes", source.len());

        self.diagnostics.clear();

        // 1. scan — errors are collected, scanning always finishes
        let mut tokens: Vec<Token> = Vec::new();
        for result in Scanner::new(source) {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => self.diagnostics.report(error),
            }
        }

        // 2. parse
        let statements = Parser::new(&tokens, &mut self.ids, &mut self.diagnostics).parse();

        if self.diagnostics.had_errors() {
            return None;
        }

        // 3. resolve
        Resolver::new(
            &mut self.interpreter,
            &mut self.diagnostics,
            &mut self.scopes,
        )
        .resolve(&statements);

        if self.diagnostics.had_errors() {
            return None;
        }

        // 4. interpret
        match self.interpreter.interpret(&statements) {
            Ok(value) => value,
            Err(error) => {
                self.diagnostics.report(error);
                None
            }
        }
    }

    /// Everything reported during the most recent [`Self::run`].
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}
