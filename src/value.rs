//! Runtime value model: the closed sum type every expression evaluates to,
//! plus the callable/instance structures behind it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::rc::Rc;

use crate::ast::FunctionDecl;
use crate::environment::Environment;
use crate::error::Result;
use crate::interpreter::Interpreter;

/// Every value a Quill expression can produce.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    Function(Rc<Function>),
    Native(Rc<Native>),
    Class(Rc<Class>),
    Instance(Rc<RefCell<Instance>>),
}

impl PartialEq for Value {
    /// Value equality for scalars and strings, identity for everything
    /// that lives behind an `Rc`.  `nil` equals only itself.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => {
                // 6.0 → "6", 6.5 → "6.5"
                if n.fract() == 0.0 && n.is_finite() {
                    let mut buf: itoa::Buffer = itoa::Buffer::new();
                    write!(f, "{}", buf.format(*n as i64))
                } else {
                    write!(f, "{}", n)
                }
            }

            Value::Str(s) => write!(f, "{}", s),

            Value::Function(function) => write!(f, "<fn {}>", function.name()),

            Value::Native(_) => write!(f, "<native fn>"),

            Value::Class(class) => write!(f, "{}", class.name),

            Value::Instance(instance) => {
                write!(f, "{} instance", instance.borrow().class().name)
            }
        }
    }
}

/// A user-defined function or method: the shared declaration plus the
/// environment frame captured at its definition site.
#[derive(Clone)]
pub struct Function {
    decl: Rc<FunctionDecl>,
    closure: Rc<RefCell<Environment>>,
    is_initializer: bool,
}

impl Function {
    pub fn new(
        decl: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            decl,
            closure,
            is_initializer,
        }
    }

    pub fn decl(&self) -> &FunctionDecl {
        &self.decl
    }

    pub fn closure(&self) -> &Rc<RefCell<Environment>> {
        &self.closure
    }

    pub fn is_initializer(&self) -> bool {
        self.is_initializer
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }

    pub fn name(&self) -> &str {
        match &self.decl.name {
            Some(token) => &token.lexeme,
            None => "anonymous",
        }
    }

    /// Produce the method-with-receiver copy: same declaration, closure
    /// wrapped in a one-binding frame mapping `this` to the instance.
    pub fn bind(&self, instance: Value) -> Function {
        let env = Environment::nested_with("this", instance, self.closure.clone());

        Function {
            decl: self.decl.clone(),
            closure: Rc::new(RefCell::new(env)),
            is_initializer: self.is_initializer,
        }
    }
}

// Closures point back into the environment graph, which may point back at
// this function; keep Debug shallow.
impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}

/// A host-provided primitive.  `params` is the accepted argument-count
/// range: `input` reports arity 0 but also takes an optional prompt.
pub struct Native {
    pub name: &'static str,
    pub params: RangeInclusive<usize>,
    pub func: fn(&mut Interpreter, &[Value]) -> Result<Value>,
}

impl Native {
    /// The arity quoted in argument-count mismatch errors.
    pub fn arity(&self) -> usize {
        *self.params.start()
    }

    pub fn accepts(&self, count: usize) -> bool {
        self.params.contains(&count)
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// A class descriptor: constructing it is calling it.
pub struct Class {
    pub name: String,
    superclass: Option<Rc<Class>>,
    methods: HashMap<String, Rc<Function>>,
}

impl Class {
    pub fn new(
        name: String,
        superclass: Option<Rc<Class>>,
        methods: HashMap<String, Rc<Function>>,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
        }
    }

    /// Method lookup walks the superclass chain; first match wins, so a
    /// subclass method shadows its ancestor's.
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }

        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.find_method(name))
    }

    /// A class called as a constructor has the arity of its `init` method,
    /// or 0 when it has none.
    pub fn arity(&self) -> usize {
        self.find_method("init")
            .map(|init| init.arity())
            .unwrap_or(0)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// One object: a class reference plus its property map.  Properties are
/// created on first assignment.
pub struct Instance {
    class: Rc<Class>,
    fields: HashMap<String, Value>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    /// Property read: own fields first, then a receiver-bound method from
    /// the class chain.  `None` means undefined property.
    ///
    /// Takes the shared handle rather than `&self` because a found method
    /// must be bound to this exact instance.
    pub fn get(this: &Rc<RefCell<Instance>>, name: &str) -> Option<Value> {
        if let Some(value) = this.borrow().fields.get(name) {
            return Some(value.clone());
        }

        let class = this.borrow().class.clone();

        class
            .find_method(name)
            .map(|method| Value::Function(Rc::new(method.bind(Value::Instance(this.clone())))))
    }

    /// Property write: unconditional, creating the field if absent.
    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}

// Fields may reference this very instance; keep Debug shallow.
impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &self.fields.len())
            .finish()
    }
}
