//! spec.md §4.3 / §9 "Dynamic dispatch of user code": "The worker side
//! executes arbitrary functions by name. The scheduler does not interpret
//! functions". Real function dispatch (the client library's serialized
//! arguments, the Python/numeric runtime) is out of scope per §1; this
//! module holds only the built-ins needed to exercise the rest of the system
//! end-to-end (SPEC_FULL.md §G).

use std::collections::HashMap;

/// A function this worker can execute. Each registers one arity (spec.md §3
/// "Function table": "Arity must agree across all registrations").
pub trait BuiltinFunction: Send + Sync {
    fn arity(&self) -> u32;
    fn call(&self, args: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, String>;
}

/// Returns its single argument unchanged.
struct Identity;

impl BuiltinFunction for Identity {
    fn arity(&self) -> u32 {
        1
    }

    fn call(&self, args: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, String> {
        match args {
            [only] => Ok(vec![only.clone()]),
            _ => Err(format!("id expects exactly 1 argument, got {}", args.len())),
        }
    }
}

/// Concatenates every argument's bytes, in order, into a single output.
struct Concat;

impl BuiltinFunction for Concat {
    fn arity(&self) -> u32 {
        1
    }

    fn call(&self, args: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, String> {
        if args.is_empty() {
            return Err("concat expects at least 1 argument, got 0".to_string());
        }
        let mut out = Vec::with_capacity(args.iter().map(Vec::len).sum());
        for a in args {
            out.extend_from_slice(a);
        }
        Ok(vec![out])
    }
}

pub struct FunctionRegistry {
    functions: HashMap<String, Box<dyn BuiltinFunction>>,
}

impl FunctionRegistry {
    /// The built-ins every `rt-worker` process registers with the scheduler
    /// at startup (SPEC_FULL.md §G).
    pub fn with_builtins() -> Self {
        let mut functions: HashMap<String, Box<dyn BuiltinFunction>> = HashMap::new();
        functions.insert("id".to_string(), Box::new(Identity));
        functions.insert("concat".to_string(), Box::new(Concat));
        Self { functions }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.functions.iter().map(|(name, f)| (name.as_str(), f.arity()))
    }

    pub fn call(&self, name: &str, args: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, String> {
        let f = self.functions.get(name).ok_or_else(|| format!("unknown function {name:?}"))?;
        f.call(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_echoes_its_single_argument() {
        let reg = FunctionRegistry::with_builtins();
        let out = reg.call("id", &[vec![0xAB]]).unwrap();
        assert_eq!(out, vec![vec![0xAB]]);
    }

    #[test]
    fn id_rejects_wrong_arg_count() {
        let reg = FunctionRegistry::with_builtins();
        assert!(reg.call("id", &[]).is_err());
        assert!(reg.call("id", &[vec![1], vec![2]]).is_err());
    }

    #[test]
    fn concat_joins_all_arguments_in_order() {
        let reg = FunctionRegistry::with_builtins();
        let out = reg.call("concat", &[vec![1, 2], vec![3], vec![4, 5]]).unwrap();
        assert_eq!(out, vec![vec![1, 2, 3, 4, 5]]);
    }

    #[test]
    fn unknown_function_is_an_error() {
        let reg = FunctionRegistry::with_builtins();
        assert!(reg.call("bogus", &[]).is_err());
    }
}
