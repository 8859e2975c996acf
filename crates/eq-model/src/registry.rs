//! Element factory registry.
//!
//! Front ends build elements by type name through a registry value that they
//! own and pass around explicitly; there is no process-wide table, so tests
//! can run independent registries side by side.

use crate::element::{DofRef, Element};
use crate::error::{ModelError, ModelResult};
use crate::springs::{LinearSpring, SofteningSpring};
use eq_core::Real;
use std::collections::BTreeMap;

/// Arguments handed to an element factory.
#[derive(Clone, Debug, Default)]
pub struct ElementArgs {
    pub dofs: Vec<DofRef>,
    pub params: BTreeMap<String, Real>,
}

impl ElementArgs {
    pub fn param(&self, name: &str) -> ModelResult<Real> {
        self.params
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::MissingParameter(name.to_string()))
    }

    fn two_dofs(&self, type_name: &str) -> ModelResult<(DofRef, DofRef)> {
        match self.dofs.as_slice() {
            [i, j] => Ok((*i, *j)),
            other => Err(ModelError::InvalidElement {
                what: format!("{type_name} needs 2 DOFs, got {}", other.len()),
            }),
        }
    }
}

pub type ElementFactory =
    Box<dyn Fn(&ElementArgs) -> ModelResult<Box<dyn Element>> + Send + Sync>;

/// Named element factories.
#[derive(Default)]
pub struct ElementRegistry {
    factories: BTreeMap<String, ElementFactory>,
}

impl ElementRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the reference springs.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            "LinearSpring".to_string(),
            Box::new(|args: &ElementArgs| -> ModelResult<Box<dyn Element>> {
                let (i, j) = args.two_dofs("LinearSpring")?;
                Ok(Box::new(LinearSpring::new(i, j, args.param("k")?)))
            }),
        );
        registry.factories.insert(
            "SofteningSpring".to_string(),
            Box::new(|args: &ElementArgs| -> ModelResult<Box<dyn Element>> {
                let (i, j) = args.two_dofs("SofteningSpring")?;
                let spring = SofteningSpring::new(i, j, args.param("k0")?, args.param("f_y")?)?;
                Ok(Box::new(spring))
            }),
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ElementFactory) -> ModelResult<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(ModelError::DuplicateElementType(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ElementFactory> {
        self.factories.get(name)
    }

    /// Build an element of a registered type.
    pub fn create(&self, name: &str, args: &ElementArgs) -> ModelResult<Box<dyn Element>> {
        let factory = self
            .lookup(name)
            .ok_or_else(|| ModelError::UnknownElementType(name.to_string()))?;
        factory(args)
    }

    /// Remove every registered factory.
    pub fn clear(&mut self) {
        self.factories.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eq_core::NodeId;

    fn spring_args(k: Real) -> ElementArgs {
        ElementArgs {
            dofs: vec![(NodeId::from_index(0), 0), (NodeId::from_index(1), 0)],
            params: BTreeMap::from([("k".to_string(), k)]),
        }
    }

    #[test]
    fn builtin_registry_creates_springs() {
        let registry = ElementRegistry::with_builtin();
        let spring = registry.create("LinearSpring", &spring_args(5.0)).unwrap();
        assert_eq!(spring.type_name(), "LinearSpring");
        assert_eq!(spring.initial_stiffness()[(0, 0)], 5.0);
    }

    #[test]
    fn unknown_type_and_missing_parameter() {
        let registry = ElementRegistry::with_builtin();
        assert!(matches!(
            registry.create("Truss", &spring_args(1.0)),
            Err(ModelError::UnknownElementType(_))
        ));
        assert!(matches!(
            registry.create("SofteningSpring", &spring_args(1.0)),
            Err(ModelError::MissingParameter(_))
        ));
    }

    #[test]
    fn registries_are_independent() {
        let mut a = ElementRegistry::with_builtin();
        let b = ElementRegistry::with_builtin();
        a.clear();
        assert!(a.is_empty());
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ElementRegistry::new();
        let factory = || -> ElementFactory {
            Box::new(|args: &ElementArgs| -> ModelResult<Box<dyn Element>> {
                Ok(Box::new(LinearSpring::new(args.dofs[0], args.dofs[1], 1.0)))
            })
        };
        registry.register("Custom", factory()).unwrap();
        assert!(matches!(
            registry.register("Custom", factory()),
            Err(ModelError::DuplicateElementType(_))
        ));
        assert!(registry.lookup("Custom").is_some());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Custom"]);
    }
}
