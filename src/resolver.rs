//! Static resolver pass for the **Quill** interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (a stack of `HashMap<String, bool>` tracking
//!    declared/defined).
//! 2. Report static errors (redeclaration, forward-read in an initializer,
//!    `return`/`this`/`super` misuse, self-inheritance).  Reporting never
//!    aborts the pass: the rest of the tree is still resolved so every
//!    error in a source surfaces in one run.
//! 3. Record, for each variable occurrence, its hop distance to the frame
//!    that binds it — written into the interpreter's resolution table.  No
//!    match in any scope means the occurrence resolves dynamically against
//!    the globals frame at run time.
//!
//! The scope stack is seeded with (and keeps) one top-level scope so that
//! top-level bindings resolve to distances like any other, redeclaration at
//! the top level is caught, and a REPL session accumulates its bindings
//! across lines.  The stack lives in the session; the resolver borrows it
//! per run.

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::error::{Diagnostics, QuillError};
use crate::interpreter::Interpreter;
use crate::token::Token;
use log::{debug, info};
use std::collections::HashMap;
use std::rc::Rc;

/// The persistent scope stack.  Entries map a name to whether its
/// initializer has finished (`false` = declared, `true` = defined).
pub type ScopeStack = Vec<HashMap<String, bool>>;

/// Seed stack for a fresh session: just the top-level scope.
pub fn initial_scopes() -> ScopeStack {
    vec![HashMap::new()]
}

/// What kind of function body are we inside?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

/// What kind of class body are we inside?  Used to validate `this`/`super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// One resolution pass.  Borrows the interpreter (to record binding
/// distances), the diagnostics sink, and the session's scope stack.
pub struct Resolver<'a> {
    interpreter: &'a mut Interpreter,
    diagnostics: &'a mut Diagnostics,
    scopes: &'a mut ScopeStack,
    current_function: FunctionType,
    current_class: ClassType,
}

impl<'a> Resolver<'a> {
    pub fn new(
        interpreter: &'a mut Interpreter,
        diagnostics: &'a mut Diagnostics,
        scopes: &'a mut ScopeStack,
    ) -> Self {
        info!("Resolver instantiated");

        Resolver {
            interpreter,
            diagnostics,
            scopes,
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    /// Walk all top-level statements, skipping entries lost to parse
    /// recovery.
    pub fn resolve(&mut self, statements: &[Option<Stmt>]) {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        for stmt in statements.iter().flatten() {
            self.resolve_stmt(stmt);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr);
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define, so the
                // initializer cannot read the name it is initializing
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(&name.lexeme);
            }

            Stmt::Block(statements) => {
                self.begin_scope();
                for s in statements {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While {
                condition,
                body,
                increment,
                finally,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
                if let Some(expr) = increment {
                    self.resolve_expr(expr);
                }
                if let Some(stmt) = finally.as_deref() {
                    self.resolve_stmt(stmt);
                }
            }

            Stmt::Break | Stmt::Continue => {}

            Stmt::Function(decl) => {
                // a function name is visible inside its own body
                if let Some(name) = &decl.name {
                    self.declare(name);
                    self.define(&name.lexeme);
                }
                self.resolve_function(decl, FunctionType::Function);
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.diagnostics.report(QuillError::resolve(
                        keyword,
                        "Can't return from top-level code.",
                    ));
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.diagnostics.report(QuillError::resolve(
                            keyword,
                            "Can't return a value from an initializer.",
                        ));
                    }
                    self.resolve_expr(expr);
                }
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) {
        self.declare(name);
        self.define(&name.lexeme);

        if let Some(superclass) = superclass {
            if let Expr::Variable {
                name: super_name, ..
            } = superclass
            {
                if super_name.lexeme == name.lexeme {
                    self.diagnostics.report(QuillError::resolve(
                        super_name,
                        "A class cannot inherit from itself.",
                    ));
                }
            }

            self.resolve_expr(superclass);

            // synthetic scope binding `super` around every method body
            self.begin_scope();
            self.define("super");
        }

        // synthetic scope binding `this`
        self.begin_scope();
        self.define("this");

        let enclosing_class = self.current_class;
        self.current_class = if superclass.is_some() {
            ClassType::Subclass
        } else {
            ClassType::Class
        };

        for method in methods {
            let declaration = if method
                .name
                .as_ref()
                .is_some_and(|token| token.lexeme == "init")
            {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };

            self.resolve_function(method, declaration);
        }

        self.current_class = enclosing_class;

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => {
                self.resolve_expr(inner);
            }

            Expr::Unary { right, .. } => {
                self.resolve_expr(right);
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable { id, name } => {
                // Cannot read a name inside its own initializer.
                if let Some(scope) = self.scopes.last() {
                    if scope.get(name.lexeme.as_str()) == Some(&false) {
                        self.diagnostics.report(QuillError::resolve(
                            name,
                            "Can't read local variable in its own initializer.",
                        ));
                    }
                }

                self.resolve_local(*id, name);
            }

            Expr::Assign { id, name, value } => {
                // first resolve the RHS, then bind the LHS
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.diagnostics.report(QuillError::resolve(
                        keyword,
                        "Can't use 'this' outside of a class.",
                    ));
                    return;
                }

                self.resolve_local(*id, keyword);
            }

            Expr::Super { id, keyword, .. } => {
                if self.current_class == ClassType::None {
                    self.diagnostics.report(QuillError::resolve(
                        keyword,
                        "Cannot use 'super' outside of a class.",
                    ));
                } else if self.current_class == ClassType::Class {
                    self.diagnostics.report(QuillError::resolve(
                        keyword,
                        "Cannot use 'super' in a class with no superclass.",
                    ));
                }

                self.resolve_local(*id, keyword);
            }

            Expr::Function(decl) => {
                self.resolve_function(decl, FunctionType::Function);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body.  The body
    /// statements share the parameter scope, exactly as the evaluator runs
    /// them in one call frame.
    fn resolve_function(&mut self, decl: &FunctionDecl, declaration: FunctionType) {
        let enclosing = self.current_function;
        self.current_function = declaration;

        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(&param.lexeme);
        }
        for stmt in &decl.body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.current_function = enclosing;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(name.lexeme.as_str()) {
                self.diagnostics.report(QuillError::resolve(
                    name,
                    "A variable with this name already exists in this scope.",
                ));
                return;
            }

            scope.insert(name.lexeme.clone(), false);
        }
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding-distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this occurrence as a local at depth `d` (innermost = 0), or
    /// leave it unrecorded — meaning global — if no scope knows the name.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(name.lexeme.as_str()) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);

                self.interpreter.resolve_local(id, depth);
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }
}
