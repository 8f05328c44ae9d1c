//! The tree-walking evaluator.
//!
//! Executes a resolved statement sequence against the mutable environment
//! chain.  Every statement yields a [`Completion`] so that non-local
//! control transfer (`break` / `continue` / `return`) is ordinary data flow
//! rather than unwinding: each block and loop inspects the tag of every
//! sub-statement and short-circuits accordingly.
//!
//! Runtime failures are `Err(QuillError::Runtime { .. })` and abort the
//! current `interpret` call at the point of failure; output produced by
//! earlier statements stands.
//!
//! The interpreter owns the globals frame (pre-populated with the `clock`
//! and `input` natives), the resolution side-table written by the resolver,
//! and injected output/input streams so embedders and tests can capture
//! all I/O.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use chrono::Utc;
use log::{debug, info};

use crate::ast::{Expr, ExprId, FunctionDecl, LiteralValue, Stmt};
use crate::environment::Environment;
use crate::error::{QuillError, Result};
use crate::token::{Token, TokenType};
use crate::value::{Class, Function, Instance, Native, Value};

/// The outcome of executing one statement.
///
/// `Value` is produced by bare expression statements so an embedding REPL
/// can echo them; `Empty` is "ran, nothing to report".  The three signal
/// variants travel up through blocks until something absorbs them: loops
/// absorb `Break`/`Continue`, function-call boundaries absorb `Return`.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// An ordinary value, from a bare expression statement.
    Value(Value),

    /// No value.
    Empty,

    /// `break` travelling towards the nearest enclosing loop.
    Break,

    /// `continue` travelling towards the nearest enclosing loop.
    Continue,

    /// `return` travelling towards the nearest function-call boundary.
    Return(Value),
}

/// Falsy: `nil`, `false`, and numeric zero.  Everything else — including
/// the empty string — is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0,
        _ => true,
    }
}

// ───────────────────────── native functions ─────────────────────────

/// `clock()` → current wall-clock time in milliseconds.
fn native_clock(_interpreter: &mut Interpreter, _args: &[Value]) -> Result<Value> {
    Ok(Value::Number(Utc::now().timestamp_millis() as f64))
}

/// `input()` / `input(prompt)` → one line from the input stream, without
/// its trailing newline.  End of input yields `nil`.
fn native_input(interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
    if let Some(prompt) = args.first() {
        write!(interpreter.out, "{}", prompt)?;
        interpreter.out.flush()?;
    }

    let mut line = String::new();
    if interpreter.input.read_line(&mut line)? == 0 {
        return Ok(Value::Nil);
    }

    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }

    Ok(Value::Str(line))
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<ExprId, usize>,
    out: Box<dyn Write>,
    input: Box<dyn BufRead>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter wired to the process's stdout/stdin.
    pub fn new() -> Self {
        Self::with_io(
            Box::new(io::stdout()),
            Box::new(io::BufReader::new(io::stdin())),
        )
    }

    /// Interpreter with injected streams: `print` and the `input` prompt go
    /// to `out`, the `input` native reads from `input`.
    pub fn with_io(out: Box<dyn Write>, input: Box<dyn BufRead>) -> Self {
        info!("Initializing interpreter");

        let globals = Rc::new(RefCell::new(Environment::new()));

        {
            let mut frame = globals.borrow_mut();

            frame
                .define(
                    "clock",
                    Value::Native(Rc::new(Native {
                        name: "clock",
                        params: 0..=0,
                        func: native_clock,
                    })),
                )
                .expect("globals start empty");

            frame
                .define(
                    "input",
                    Value::Native(Rc::new(Native {
                        name: "input",
                        params: 0..=1,
                        func: native_input,
                    })),
                )
                .expect("globals start empty");
        }

        // Top-level code runs one frame above the natives, so user
        // declarations never collide with them.
        let environment = Rc::new(RefCell::new(Environment::with_enclosing(globals.clone())));

        Self {
            globals,
            environment,
            locals: HashMap::new(),
            out,
            input,
        }
    }

    /// Record that the expression `id` binds `depth` frames up from its use
    /// site.  Called by the resolver; absence means "globals frame".
    pub fn resolve_local(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    /// Execute a program.  Returns the value of the final statement when it
    /// was a bare expression (the REPL echo), `None` otherwise.
    pub fn interpret(&mut self, statements: &[Option<Stmt>]) -> Result<Option<Value>> {
        debug!("Interpreting {} statements", statements.len());

        let mut last: Option<Value> = None;

        for statement in statements.iter().flatten() {
            last = match self.execute(statement)? {
                Completion::Value(value) => Some(value),
                _ => None,
            };
        }

        Ok(last)
    }

    // ───────────────────────── statements ─────────────────────────

    fn execute(&mut self, stmt: &Stmt) -> Result<Completion> {
        match stmt {
            Stmt::Expression(expr) => Ok(Completion::Value(self.evaluate(expr)?)),

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;

                writeln!(self.out, "{}", value)?;

                Ok(Completion::Empty)
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                self.environment
                    .borrow_mut()
                    .define(&name.lexeme, value)
                    .map_err(|msg| QuillError::runtime(name.line, msg))?;

                Ok(Completion::Empty)
            }

            Stmt::Block(statements) => {
                let env = Rc::new(RefCell::new(Environment::with_enclosing(
                    self.environment.clone(),
                )));

                self.execute_block(statements, env)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                // The chosen branch's completion propagates verbatim, so a
                // top-level `if (c) 42;` still echoes in a REPL.
                if is_truthy(&self.evaluate(condition)?) {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Completion::Empty)
                }
            }

            Stmt::While {
                condition,
                body,
                increment,
                finally,
            } => self.execute_while(condition, body, increment.as_ref(), finally.as_deref()),

            Stmt::Break => Ok(Completion::Break),

            Stmt::Continue => Ok(Completion::Continue),

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                Ok(Completion::Return(value))
            }

            Stmt::Function(decl) => {
                let function = Value::Function(Rc::new(Function::new(
                    decl.clone(),
                    self.environment.clone(),
                    false,
                )));

                if let Some(name) = &decl.name {
                    debug!("Defining function '{}'", name.lexeme);

                    self.environment
                        .borrow_mut()
                        .define(&name.lexeme, function)
                        .map_err(|msg| QuillError::runtime(name.line, msg))?;
                }

                Ok(Completion::Empty)
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    /// Run `statements` in `environment`, restoring the previous frame on
    /// every exit path.  The first signal completion stops the sequence and
    /// propagates unchanged; later statements are not executed.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<Completion> {
        let previous = std::mem::replace(&mut self.environment, environment);

        let result = self.run_sequence(statements);

        self.environment = previous;

        result
    }

    fn run_sequence(&mut self, statements: &[Stmt]) -> Result<Completion> {
        for statement in statements {
            match self.execute(statement)? {
                signal @ (Completion::Break | Completion::Continue | Completion::Return(_)) => {
                    return Ok(signal)
                }
                _ => {}
            }
        }

        Ok(Completion::Empty)
    }

    fn execute_while(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        increment: Option<&Expr>,
        finally: Option<&Stmt>,
    ) -> Result<Completion> {
        while is_truthy(&self.evaluate(condition)?) {
            match self.execute(body)? {
                // `break` ends the loop; the `finally` clause below still runs.
                Completion::Break => break,

                // `return` unwinds past the loop, its increment, and its
                // `finally` clause, towards the function-call boundary.
                ret @ Completion::Return(_) => return Ok(ret),

                // Anything else — including `continue` — finished the body;
                // run the end-of-loop increment before retesting.
                _ => {
                    if let Some(expr) = increment {
                        self.evaluate(expr)?;
                    }
                }
            }
        }

        // Runs exactly once, whether the condition ran dry or `break` fired.
        if let Some(stmt) = finally {
            if let ret @ Completion::Return(_) = self.execute(stmt)? {
                return Ok(ret);
            }
        }

        Ok(Completion::Empty)
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> Result<Completion> {
        debug!("Declaring class '{}'", name.lexeme);

        let superclass_value: Option<Rc<Class>> = match superclass {
            Some(expr) => {
                let line = match expr {
                    Expr::Variable { name, .. } => name.line,
                    _ => name.line,
                };

                match self.evaluate(expr)? {
                    Value::Class(class) => Some(class),
                    _ => {
                        return Err(QuillError::runtime(line, "Superclass must be a class."));
                    }
                }
            }
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::Nil)
            .map_err(|msg| QuillError::runtime(name.line, msg))?;

        // Methods of a subclass capture a synthetic frame binding `super`,
        // mirroring the resolver's scope nesting.
        let method_closure = match &superclass_value {
            Some(class) => Rc::new(RefCell::new(Environment::nested_with(
                "super",
                Value::Class(class.clone()),
                self.environment.clone(),
            ))),
            None => self.environment.clone(),
        };

        let mut method_map: HashMap<String, Rc<Function>> = HashMap::new();

        for decl in methods {
            if let Some(method_name) = &decl.name {
                let is_initializer = method_name.lexeme == "init";

                method_map.insert(
                    method_name.lexeme.clone(),
                    Rc::new(Function::new(
                        decl.clone(),
                        method_closure.clone(),
                        is_initializer,
                    )),
                );
            }
        }

        let class = Value::Class(Rc::new(Class::new(
            name.lexeme.clone(),
            superclass_value,
            method_map,
        )));

        self.environment
            .borrow_mut()
            .assign(&name.lexeme, class)
            .map_err(|msg| QuillError::runtime(name.line, msg))?;

        Ok(Completion::Empty)
    }

    // ───────────────────────── expressions ─────────────────────────

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::Str(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => self.evaluate_logical(left, operator, right),

            Expr::Variable { id, name } => self.lookup_variable(name, *id),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(distance) => {
                        self.environment
                            .borrow_mut()
                            .assign_at(&name.lexeme, value.clone(), *distance)
                    }
                    None => self.globals.borrow_mut().assign(&name.lexeme, value.clone()),
                }
                .map_err(|msg| QuillError::runtime(name.line, msg))?;

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.evaluate(argument)?);
                }

                self.call_value(callee, args, paren)
            }

            Expr::Get { object, name } => {
                let object = self.evaluate(object)?;

                match object {
                    Value::Instance(instance) => Instance::get(&instance, &name.lexeme)
                        .ok_or_else(|| {
                            QuillError::runtime(
                                name.line,
                                format!("Undefined property '{}'.", name.lexeme),
                            )
                        }),
                    _ => Err(QuillError::runtime(
                        name.line,
                        "Only instances have properties.",
                    )),
                }
            }

            Expr::Set {
                object,
                name,
                value,
            } => {
                let object = self.evaluate(object)?;

                match object {
                    Value::Instance(instance) => {
                        let value = self.evaluate(value)?;

                        instance.borrow_mut().set(&name.lexeme, value.clone());

                        Ok(value)
                    }
                    _ => Err(QuillError::runtime(
                        name.line,
                        "Only instances have properties.",
                    )),
                }
            }

            Expr::This { id, keyword } => self.lookup_variable(keyword, *id),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),

            Expr::Function(decl) => Ok(Value::Function(Rc::new(Function::new(
                decl.clone(),
                self.environment.clone(),
                false,
            )))),
        }
    }

    /// Resolved references read at their recorded depth; everything else
    /// falls back to the globals frame.
    fn lookup_variable(&self, name: &Token, id: ExprId) -> Result<Value> {
        let result = match self.locals.get(&id) {
            Some(distance) => self.environment.borrow().get_at(&name.lexeme, *distance),
            None => self.globals.borrow().get(&name.lexeme),
        };

        result.map_err(|msg| QuillError::runtime(name.line, msg))
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> Result<Value> {
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(QuillError::runtime(
                    operator.line,
                    "Operand must be a number.",
                )),
            },

            TokenType::BANG => Ok(Value::Bool(!is_truthy(&right))),

            _ => Err(QuillError::runtime(operator.line, "Invalid unary operator.")),
        }
    }

    fn evaluate_logical(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value> {
        let left = self.evaluate(left)?;

        // `or` keeps a truthy left operand; `and` keeps a falsy one.  The
        // operand value itself — not a coerced boolean — is the result.
        if operator.token_type == TokenType::OR {
            if is_truthy(&left) {
                return Ok(left);
            }
        } else if !is_truthy(&left) {
            return Ok(left);
        }

        self.evaluate(right)
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> Result<Value> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                // Concatenation needs two strings; there is no coercion.
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
                _ => Err(QuillError::runtime(
                    operator.line,
                    "Operands must be numbers or strings.",
                )),
            },

            TokenType::MINUS => {
                let (a, b) = numeric_operands(operator, &left, &right)?;
                Ok(Value::Number(a - b))
            }

            TokenType::STAR => {
                let (a, b) = numeric_operands(operator, &left, &right)?;
                Ok(Value::Number(a * b))
            }

            TokenType::SLASH => {
                // IEEE-754 semantics: dividing by zero produces an infinity.
                let (a, b) = numeric_operands(operator, &left, &right)?;
                Ok(Value::Number(a / b))
            }

            TokenType::GREATER => {
                let (a, b) = numeric_operands(operator, &left, &right)?;
                Ok(Value::Bool(a > b))
            }

            TokenType::GREATER_EQUAL => {
                let (a, b) = numeric_operands(operator, &left, &right)?;
                Ok(Value::Bool(a >= b))
            }

            TokenType::LESS => {
                let (a, b) = numeric_operands(operator, &left, &right)?;
                Ok(Value::Bool(a < b))
            }

            TokenType::LESS_EQUAL => {
                let (a, b) = numeric_operands(operator, &left, &right)?;
                Ok(Value::Bool(a <= b))
            }

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left == right)),

            TokenType::BANG_EQUAL => Ok(Value::Bool(left != right)),

            _ => Err(QuillError::runtime(
                operator.line,
                "Invalid binary operator.",
            )),
        }
    }

    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> Result<Value> {
        let distance = self
            .locals
            .get(&id)
            .copied()
            .ok_or_else(|| QuillError::runtime(keyword.line, "Cannot use 'super' here."))?;

        let superclass = self
            .environment
            .borrow()
            .get_at("super", distance)
            .map_err(|msg| QuillError::runtime(keyword.line, msg))?;

        let Value::Class(superclass) = superclass else {
            return Err(QuillError::runtime(keyword.line, "Cannot use 'super' here."));
        };

        // `this` sits one frame inside the `super` frame.
        let this_distance = distance
            .checked_sub(1)
            .ok_or_else(|| QuillError::runtime(keyword.line, "Cannot use 'super' here."))?;

        let receiver = self
            .environment
            .borrow()
            .get_at("this", this_distance)
            .map_err(|msg| QuillError::runtime(keyword.line, msg))?;

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Function(Rc::new(found.bind(receiver)))),
            None => Err(QuillError::runtime(
                method.line,
                "Method not found in superclass.",
            )),
        }
    }

    // ───────────────────────── call dispatch ─────────────────────────

    fn call_value(&mut self, callee: Value, args: Vec<Value>, paren: &Token) -> Result<Value> {
        match callee {
            Value::Function(function) => {
                if args.len() != function.arity() {
                    return Err(QuillError::runtime(
                        paren.line,
                        format!(
                            "Expected {} arguments but got {}.",
                            function.arity(),
                            args.len()
                        ),
                    ));
                }

                self.call_function(&function, args)
            }

            Value::Native(native) => {
                if !native.accepts(args.len()) {
                    return Err(QuillError::runtime(
                        paren.line,
                        format!(
                            "Expected {} arguments but got {}.",
                            native.arity(),
                            args.len()
                        ),
                    ));
                }

                debug!("Calling native '{}'", native.name);

                (native.func)(self, &args)
            }

            Value::Class(class) => {
                if args.len() != class.arity() {
                    return Err(QuillError::runtime(
                        paren.line,
                        format!("Expected {} arguments but got {}.", class.arity(), args.len()),
                    ));
                }

                self.call_class(&class, args)
            }

            _ => Err(QuillError::runtime(
                paren.line,
                "Can only call functions and classes.",
            )),
        }
    }

    /// Invoke a user function: fresh frame enclosing the *captured* closure
    /// (not the caller's environment — that is what makes capture lexical),
    /// parameters bound by position, body run as a block.
    fn call_function(&mut self, function: &Function, args: Vec<Value>) -> Result<Value> {
        debug!("Calling function '{}'", function.name());

        let env = Rc::new(RefCell::new(Environment::with_enclosing(
            function.closure().clone(),
        )));

        for (param, value) in function.decl().params.iter().zip(args) {
            env.borrow_mut()
                .define(&param.lexeme, value)
                .map_err(|msg| QuillError::runtime(param.line, msg))?;
        }

        let completion = self.execute_block(&function.decl().body, env)?;

        if function.is_initializer() {
            // Construction always yields the bound instance, whatever the
            // body produced.
            let line = function.decl().name.as_ref().map(|t| t.line).unwrap_or(0);

            return function
                .closure()
                .borrow()
                .get_at("this", 0)
                .map_err(|msg| QuillError::runtime(line, msg));
        }

        match completion {
            Completion::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }

    /// Invoke a class as a constructor: allocate the instance, then run a
    /// bound `init` if the class chain has one (its return value is
    /// discarded — construction always yields the instance).
    fn call_class(&mut self, class: &Rc<Class>, args: Vec<Value>) -> Result<Value> {
        debug!("Instantiating class '{}'", class.name);

        let instance = Rc::new(RefCell::new(Instance::new(class.clone())));

        if let Some(initializer) = class.find_method("init") {
            let bound = initializer.bind(Value::Instance(instance.clone()));

            self.call_function(&bound, args)?;
        }

        Ok(Value::Instance(instance))
    }
}

/// Both operands must be numbers; the error names the operator's line.
fn numeric_operands(operator: &Token, left: &Value, right: &Value) -> Result<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(QuillError::runtime(
            operator.line,
            "Operands must be numbers.",
        )),
    }
}
