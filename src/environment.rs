use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// One lexical scope frame: a name→value mapping plus a shared link to the
/// enclosing frame.  Frames are shared (`Rc<RefCell<..>>`) because several
/// closures may keep the same frame alive, and a write through any of them
/// must be visible through all of them.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Frame pre-seeded with a single binding.  Used for the synthetic
    /// `this` / `super` scopes, where the binding can never collide.
    pub fn nested_with(name: &str, value: Value, enclosing: Rc<RefCell<Environment>>) -> Self {
        let mut values = HashMap::new();
        values.insert(name.to_string(), value);

        Environment {
            values,
            enclosing: Some(enclosing),
        }
    }

    /// Introduce a new binding in *this* frame.  A name may be defined at
    /// most once per frame; redefinition is an error.
    pub fn define(&mut self, name: &str, value: Value) -> Result<(), String> {
        if self.values.contains_key(name) {
            return Err(format!("Variable '{}' already exists.", name));
        }

        self.values.insert(name.to_string(), value);

        Ok(())
    }

    /// Look a name up, walking the enclosing chain outwards.
    pub fn get(&self, name: &str) -> Result<Value, String> {
        if let Some(value) = self.values.get(name) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(format!("Undefined variable '{}'.", name))
        }
    }

    /// Overwrite an existing binding, walking the enclosing chain outwards.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), String> {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(format!("Undefined variable '{}'.", name))
        }
    }

    /// Read directly from the frame exactly `distance` hops up the chain.
    /// The distance comes from the resolver; a missing frame or binding
    /// means the static and dynamic scope models disagree, surfaced as an
    /// ordinary undefined-variable failure.
    pub fn get_at(&self, name: &str, distance: usize) -> Result<Value, String> {
        if distance == 0 {
            self.values
                .get(name)
                .cloned()
                .ok_or_else(|| format!("Undefined variable '{}'.", name))
        } else {
            match &self.enclosing {
                Some(enclosing) => enclosing.borrow().get_at(name, distance - 1),
                None => Err(format!("Undefined variable '{}'.", name)),
            }
        }
    }

    /// Write directly into the frame exactly `distance` hops up the chain.
    pub fn assign_at(&mut self, name: &str, value: Value, distance: usize) -> Result<(), String> {
        if distance == 0 {
            match self.values.get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(format!("Undefined variable '{}'.", name)),
            }
        } else {
            match &self.enclosing {
                Some(enclosing) => enclosing.borrow_mut().assign_at(name, value, distance - 1),
                None => Err(format!("Undefined variable '{}'.", name)),
            }
        }
    }
}
