use crate::assertions::Outcome;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub type Procedure = Arc<dyn Fn(&mut Outcome) + Send + Sync + 'static>;

/// A named test unit. Immutable once registered.
#[derive(Clone)]
pub struct TestUnit {
    name: String,
    procedure: Procedure,
}

impl TestUnit {
    pub fn new(name: impl Into<String>, procedure: Procedure) -> Self {
        Self {
            name: name.into(),
            procedure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn procedure(&self) -> Procedure {
        Arc::clone(&self.procedure)
    }

    /// Runs the body in the calling context, without any isolation.
    pub fn invoke(&self, outcome: &mut Outcome) {
        (self.procedure)(outcome)
    }
}

impl fmt::Debug for TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUnit").field("name", &self.name).finish()
    }
}

/// Ordered collection of units, filled by the registration closure handed to
/// [`crate::run`]. Moving the registry into the engine freezes it.
#[derive(Debug, Default)]
pub struct Registry {
    units: Vec<TestUnit>,
    names: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, procedure: F) -> &mut Self
    where
        F: Fn(&mut Outcome) + Send + Sync + 'static,
    {
        let name = name.into();

        if let Err(e) = self.units.try_reserve(1) {
            eprintln!("Couldn't allocate memory for unit '{}': {}. Aborting.", name, e);
            std::process::exit(2);
        }

        if !self.names.insert(name.clone()) {
            tracing::warn!("unit '{}' is registered more than once; every copy will run", name);
        }

        self.units.push(TestUnit::new(name, Arc::new(procedure)));
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TestUnit> {
        self.units.get(index)
    }

    /// Units in registration order. Can be called any number of times.
    pub fn iter(&self) -> std::slice::Iter<'_, TestUnit> {
        self.units.iter()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a TestUnit;
    type IntoIter = std::slice::Iter<'a, TestUnit>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::Status;

    fn names(registry: &Registry) -> Vec<&str> {
        registry.iter().map(TestUnit::name).collect()
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get(0).is_none());
    }

    #[test]
    fn test_iteration_follows_registration_order() {
        let mut registry = Registry::new();
        for name in ["zeta", "alpha", "mid", "beta"] {
            registry.register(name, |_| {});
        }
        assert_eq!(names(&registry), vec!["zeta", "alpha", "mid", "beta"]);
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut registry = Registry::new();
        registry.register("one", |_| {}).register("two", |_| {});

        let first: Vec<_> = names(&registry);
        let second: Vec<_> = (&registry).into_iter().map(TestUnit::name).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_names_are_kept() {
        let mut registry = Registry::new();
        registry.register("same", |_| {});
        registry.register("same", |t| t.force_fail("x.rs", 1));

        assert_eq!(registry.len(), 2);
        assert_eq!(names(&registry), vec!["same", "same"]);

        let mut outcome = Outcome::new();
        registry.get(1).unwrap().invoke(&mut outcome);
        assert_eq!(outcome.status, Status::ForcedFail);
    }

    #[test]
    fn test_many_registrations() {
        let mut registry = Registry::new();
        for i in 0..1000 {
            registry.register(format!("unit_{}", i), |_| {});
        }
        assert_eq!(registry.len(), 1000);
        for (i, unit) in registry.iter().enumerate() {
            assert_eq!(unit.name(), format!("unit_{}", i));
        }
    }

    #[test]
    fn test_procedure_is_shared() {
        let mut registry = Registry::new();
        registry.register("shared", |t| {
            t.assert(false, "false", "y.rs", 2);
        });
        let unit = registry.get(0).unwrap();
        let procedure = unit.procedure();

        let mut outcome = Outcome::new();
        procedure(&mut outcome);
        assert_eq!(outcome.status, Status::Fail);
        assert_eq!(Arc::strong_count(&procedure), 2);
    }
}
