//! Fault injection primitives used by the mock transport.

#[derive(Debug, Clone)]
pub enum When {
    Always,
    Never,
    /// Fail the next `n` calls, then behave normally. Useful for driving
    /// retry-budget scenarios (transient failures that recover).
    Times(u32),
}

/// A fault is an error that is returned based on the [`When`]
#[derive(Clone, Debug)]
pub struct Fault {
    pub when: When,
}

impl Fault {
    /// Consumes one trigger and reports whether this call should fail.
    pub fn should_fail(&mut self) -> bool {
        match self.when {
            When::Always => true,
            When::Never => false,
            When::Times(0) => false,
            When::Times(n) => {
                self.when = When::Times(n - 1);
                true
            }
        }
    }
}

impl Default for Fault {
    fn default() -> Self {
        Self { when: When::Never }
    }
}
