//! Call-site and return prototypes.
//!
//! These capture what the prototype-recovery collaborators know about a
//! call's parameters and the function's own return value. Liveness consults
//! them to decide how much of each argument or return value is consumed.

/// What is known about the callee of one call site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSpec {
    /// The callee's input prototype is locked (every argument is real).
    pub input_locked: bool,
    /// Parameter recovery is running on this call site.
    pub input_active: bool,
    /// Bytes of each argument the callee is known to consume, indexed by
    /// argument position (0 is the first argument after the call target).
    /// Zero means no hint.
    pub param_hints: Vec<u32>,
}

impl CallSpec {
    /// Creates a spec with an unlocked prototype and no hints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a spec whose input prototype is locked.
    #[must_use]
    pub fn locked() -> Self {
        Self {
            input_locked: true,
            ..Self::default()
        }
    }

    /// Sets the per-argument byte-consumption hints.
    #[must_use]
    pub fn with_hints(mut self, hints: Vec<u32>) -> Self {
        self.param_hints = hints;
        self
    }

    /// Returns `true` if every argument must be treated as fully consumed.
    #[must_use]
    pub const fn consumes_everything(&self) -> bool {
        self.input_locked || self.input_active
    }

    /// Returns the byte-consumption hint for argument `arg` (0 if none).
    #[must_use]
    pub fn hint(&self, arg: usize) -> u32 {
        self.param_hints.get(arg).copied().unwrap_or(0)
    }
}

/// What is known about the function's own return value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnPrototype {
    /// The return type is locked.
    pub output_locked: bool,
    /// Return recovery is running on this function.
    pub output_active: bool,
    /// Bytes of the return value known to be consumed by callers (0 if unknown).
    pub return_bytes_consumed: u32,
}

impl ReturnPrototype {
    /// Returns `true` if return values must be treated as fully consumed.
    #[must_use]
    pub const fn consumes_everything(&self) -> bool {
        self.output_locked || self.output_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_spec_hints() {
        let spec = CallSpec::new().with_hints(vec![1, 0, 4]);
        assert!(!spec.consumes_everything());
        assert_eq!(spec.hint(0), 1);
        assert_eq!(spec.hint(1), 0);
        assert_eq!(spec.hint(2), 4);
        assert_eq!(spec.hint(7), 0);
        assert!(CallSpec::locked().consumes_everything());
    }

    #[test]
    fn test_return_prototype() {
        let proto = ReturnPrototype::default();
        assert!(!proto.consumes_everything());
        let active = ReturnPrototype {
            output_active: true,
            ..ReturnPrototype::default()
        };
        assert!(active.consumes_everything());
    }
}
